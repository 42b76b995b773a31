//! JSON REST API for worldcount.
//!
//! Exposes an axum [`Router`] backed by any [`SampleStore`]. The API is
//! read-only; samples arrive through the ingestion scheduler, never over HTTP.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", worldcount_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod history;
pub mod latest;
pub mod metadata;

use std::sync::Arc;

use axum::{Router, routing::get};
use worldcount_core::store::SampleStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: SampleStore + 'static,
{
  Router::new()
    .route("/latest", get(latest::handler::<S>))
    .route("/metadata", get(metadata::handler::<S>))
    .route("/history", get(history::handler::<S>))
    .with_state(store)
}
