//! Fetching and parsing of the two public status pages.
//!
//! [`parse`] holds the pure page parsers; [`Scraper`] downloads the pages and
//! feeds them through the parsers.

mod client;
pub mod error;
pub mod parse;

pub use client::{ScrapeConfig, Scraper};
pub use error::{Error, Result};
