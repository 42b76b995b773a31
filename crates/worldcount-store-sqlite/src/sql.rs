//! Translation of a [`HistoryQuery`] into a parameterized SQLite query.
//!
//! Every query has the same two layers. The inner *source* yields one
//! `(ts, n)` row per sampled instant of the selected fact stream, already
//! restricted to the time range. The outer layer either passes those rows
//! through (raw and tail shapes) or groups them into buckets. Values are
//! always bound as parameters; only fixed fragments are spliced into the text.

use rusqlite::types::Value;
use worldcount_core::query::{
  Aggregation, Bucket, HistoryQuery, Shape, Stream, TimeRange,
};

use crate::encode::{encode_lower_bound, encode_upper_bound};

/// How the first result column is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeColumn {
  /// Stored timestamp text.
  Stamped,
  /// Bucket start as Unix seconds.
  Epoch,
}

/// A ready-to-run series query.
#[derive(Debug)]
pub struct SeriesSql {
  pub sql:     String,
  pub params:  Vec<Value>,
  pub time:    TimeColumn,
  /// Rows come back newest first and must be reversed before returning.
  pub reverse: bool,
}

/// Numbered parameter list; `bind` returns the placeholder for a value.
#[derive(Default)]
struct Binder {
  params: Vec<Value>,
}

impl Binder {
  fn bind(&mut self, value: Value) -> String {
    self.params.push(value);
    format!("?{}", self.params.len())
  }
}

pub fn build(query: &HistoryQuery) -> SeriesSql {
  let mut b = Binder::default();

  match query.shape {
    Shape::Tail { limit } => {
      let source = source(&query.stream, &TimeRange::default(), &mut b);
      let limit = b.bind(Value::Integer(i64::from(limit)));
      SeriesSql {
        sql:     format!("SELECT ts, n FROM ({source}) ORDER BY ts DESC LIMIT {limit}"),
        params:  b.params,
        time:    TimeColumn::Stamped,
        reverse: true,
      }
    }
    Shape::Raw { range } => {
      let source = source(&query.stream, &range, &mut b);
      SeriesSql {
        sql:     format!("SELECT ts, n FROM ({source}) ORDER BY ts ASC"),
        params:  b.params,
        time:    TimeColumn::Stamped,
        reverse: false,
      }
    }
    Shape::Bucketed { range, bucket, agg } => {
      let source = source(&query.stream, &range, &mut b);
      let start = bucket_start(bucket, &mut b);
      let value = aggregate(agg);
      SeriesSql {
        sql:     format!(
          "SELECT {start} AS bucket, {value} AS n FROM ({source})
           GROUP BY bucket ORDER BY bucket ASC"
        ),
        params:  b.params,
        time:    TimeColumn::Epoch,
        reverse: false,
      }
    }
  }
}

/// One `(ts, n)` row per sampled instant of `stream` inside `range`.
fn source(stream: &Stream, range: &TimeRange, b: &mut Binder) -> String {
  let mut conds: Vec<String> = vec![];

  let (sql, ts_col, group_by) = match stream {
    Stream::Global => (
      "SELECT timestamp AS ts, count AS n FROM global_samples".to_owned(),
      "timestamp",
      "",
    ),
    Stream::Worlds(filter) => {
      // A single world reports its own count; anything broader sums all
      // matching worlds per scrape.
      let n = if filter.world.is_some() {
        "ws.player_count"
      } else {
        "SUM(ws.player_count)"
      };
      let mut sql = format!(
        "SELECT se.timestamp AS ts, {n} AS n
         FROM world_samples ws
         JOIN scrape_events se ON se.id = ws.scrape_id"
      );
      if filter.needs_details() {
        sql.push_str(" JOIN world_details det ON det.id = ws.detail_id");
      }

      if let Some(world) = filter.world {
        let p = b.bind(Value::Integer(i64::from(world)));
        conds.push(format!("ws.world_number = {p}"));
      }
      if let Some(location_id) = filter.location_id {
        let p = b.bind(Value::Integer(location_id));
        conds.push(format!("det.location_id = {p}"));
      }
      if let Some(is_f2p) = filter.is_f2p {
        let p = b.bind(Value::Integer(i64::from(is_f2p)));
        conds.push(format!("det.is_f2p = {p}"));
      }

      let group_by = if filter.world.is_some() { "" } else { " GROUP BY se.id" };
      (sql, "se.timestamp", group_by)
    }
  };

  if let Some(start) = range.start {
    let p = b.bind(Value::Text(encode_lower_bound(start)));
    conds.push(format!("{ts_col} >= {p}"));
  }
  if let Some(end) = range.end {
    let p = b.bind(Value::Text(encode_upper_bound(end)));
    conds.push(format!("{ts_col} <= {p}"));
  }

  let where_clause = if conds.is_empty() {
    String::new()
  } else {
    format!(" WHERE {}", conds.join(" AND "))
  };

  format!("{sql}{where_clause}{group_by}")
}

/// Bucket start of the `ts` column, as Unix seconds.
fn bucket_start(bucket: Bucket, b: &mut Binder) -> String {
  let expr = match bucket {
    // Fixed-width, epoch-aligned.
    Bucket::Minutes(m) => {
      let w = b.bind(Value::Integer(i64::from(m) * 60));
      return format!("(CAST(strftime('%s', ts) AS INTEGER) / {w}) * {w}");
    }
    // Calendar truncation.
    Bucket::Hour => "strftime('%s', strftime('%Y-%m-%d %H:00:00', ts))",
    Bucket::Day => "strftime('%s', ts, 'start of day')",
    Bucket::Week => "strftime('%s', ts, 'start of day', '-6 days', 'weekday 0')",
    Bucket::Month => "strftime('%s', ts, 'start of month')",
  };
  format!("CAST({expr} AS INTEGER)")
}

fn aggregate(agg: Aggregation) -> &'static str {
  match agg {
    Aggregation::Max => "MAX(n)",
    // SQLite's ROUND() rounds halves away from zero.
    Aggregation::Avg => "CAST(ROUND(AVG(n)) AS INTEGER)",
  }
}
