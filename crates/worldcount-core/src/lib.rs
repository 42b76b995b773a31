//! Core types and trait definitions for the worldcount population tracker.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Every other crate in the workspace depends on it.

pub mod dimension;
pub mod error;
pub mod query;
pub mod sample;
pub mod series;
pub mod store;

pub use error::{Error, Result};
