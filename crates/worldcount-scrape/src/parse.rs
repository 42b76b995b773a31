//! Status page parsers.
//!
//! The pages are matched with regular expressions rather than a DOM: only a
//! handful of well-marked elements matter, and a row that does not look as
//! expected is dropped instead of failing the whole page.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use worldcount_core::sample::WorldObservation;

const ROW_CLASS: &str = "server-list__row";
const WORLD_LINK_CLASS: &str = "server-list__world-link";

static GLOBAL_COUNT: LazyLock<Regex> =
  LazyLock::new(|| compile(r"(?i)([0-9][0-9,]*)\s*(?:people playing|players online)"));
static ROW: LazyLock<Regex> = LazyLock::new(|| compile(r"(?is)<tr\b([^>]*)>(.*?)</tr>"));
static CELL: LazyLock<Regex> = LazyLock::new(|| compile(r"(?is)<td\b[^>]*>(.*?)</td>"));
static LINK: LazyLock<Regex> = LazyLock::new(|| compile(r"(?is)<a\b([^>]*)>(.*?)</a>"));
static CLASS_ATTR: LazyLock<Regex> = LazyLock::new(|| {
  compile(r#"(?i)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
});
static WORLD_NAME: LazyLock<Regex> = LazyLock::new(|| compile(r"Old School ([0-9]+)"));
static NUMBER: LazyLock<Regex> = LazyLock::new(|| compile(r"[0-9][0-9,]*"));
static TAG: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)<[^>]*>"));
static ENTITY: LazyLock<Regex> =
  LazyLock::new(|| compile(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);"));

fn compile(pattern: &str) -> Regex {
  Regex::new(pattern).expect("static pattern compiles")
}

// ─── Global count ────────────────────────────────────────────────────────────

/// The first "N people playing" / "N players online" figure on the page.
pub fn parse_global_count(page: &str) -> Option<u32> {
  let caps = GLOBAL_COUNT.captures(page)?;
  parse_number(&caps[1])
}

// ─── World list ──────────────────────────────────────────────────────────────

/// Every well-formed server list row on the page, in page order.
pub fn parse_world_list(page: &str) -> Vec<WorldObservation> {
  ROW
    .captures_iter(page)
    .filter(|row| has_class(&row[1], ROW_CLASS))
    .filter_map(|row| parse_row(&row[2]))
    .collect()
}

/// Cells: world link, players, location, membership, activity.
fn parse_row(row: &str) -> Option<WorldObservation> {
  let cells: Vec<&str> = CELL
    .captures_iter(row)
    .filter_map(|c| c.get(1).map(|m| m.as_str()))
    .collect();
  if cells.len() < 5 {
    return None;
  }

  let link = LINK
    .captures_iter(cells[0])
    .find(|a| has_class(&a[1], WORLD_LINK_CLASS))?;
  let name = text(&link[2]);
  let world_number = parse_number(&WORLD_NAME.captures(&name)?[1])?;

  let players = text(cells[1]);
  let player_count = match NUMBER.find(&players) {
    Some(m) => parse_number(m.as_str())?,
    // "Offline" and similar.
    None => 0,
  };

  let is_f2p = text(cells[3]).to_lowercase().contains("free");

  Some(WorldObservation::new(
    world_number,
    player_count,
    text(cells[2]),
    is_f2p,
    text(cells[4]),
  ))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Whether an element's attribute text lists `class` among its classes.
fn has_class(attrs: &str, class: &str) -> bool {
  CLASS_ATTR.captures(attrs).is_some_and(|c| {
    let value = c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3));
    value.is_some_and(|v| v.as_str().split_whitespace().any(|name| name == class))
  })
}

fn parse_number(digits: &str) -> Option<u32> {
  digits.replace(',', "").parse().ok()
}

/// Visible text of an HTML fragment: tags dropped, entities decoded,
/// whitespace collapsed.
fn text(fragment: &str) -> String {
  let stripped = TAG.replace_all(fragment, "");
  let decoded = ENTITY.replace_all(&stripped, decode_entity);
  decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entity(caps: &Captures<'_>) -> String {
  let name = &caps[1];
  let decoded = match name {
    "amp" => Some('&'),
    "lt" => Some('<'),
    "gt" => Some('>'),
    "quot" => Some('"'),
    "apos" => Some('\''),
    "nbsp" => Some(' '),
    _ => {
      let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
      } else {
        name.strip_prefix('#').and_then(|dec| dec.parse().ok())
      };
      code.and_then(char::from_u32)
    }
  };
  match decoded {
    Some(c) => c.to_string(),
    None => caps[0].to_owned(),
  }
}
