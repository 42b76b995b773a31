//! `GET /latest`: the newest global count with the F2P/members split.

use std::sync::Arc;

use axum::{Json, extract::State};
use worldcount_core::{series::LatestSnapshot, store::SampleStore};

use crate::error::ApiError;

/// `GET /latest`; 404 until the first global count is recorded.
pub async fn handler<S: SampleStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<LatestSnapshot>, ApiError> {
  store
    .latest()
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound("no data".to_owned()))
}
