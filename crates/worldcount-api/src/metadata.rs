//! `GET /metadata`: known locations, activities and worlds, for building
//! filter controls.

use std::sync::Arc;

use axum::{Json, extract::State};
use worldcount_core::{dimension::Metadata, store::SampleStore};

use crate::error::ApiError;

pub async fn handler<S: SampleStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Metadata>, ApiError> {
  let metadata = store.metadata().await.map_err(ApiError::store)?;
  Ok(Json(metadata))
}
