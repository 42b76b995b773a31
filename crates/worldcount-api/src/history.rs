//! `GET /history`: a time series of player counts.
//!
//! | Parameter     | Notes |
//! |---------------|-------|
//! | `start`/`end` | Inclusive bounds, RFC 3339 or `YYYY-MM-DD[ HH:MM[:SS]]` (UTC) |
//! | `limit`       | Newest N raw points when no range or unit is given (default 288) |
//! | `unit`        | `minute`, `hour`, `day`, `week` or `month` |
//! | `step`        | Minutes per bucket for `unit=minute` (default 5) |
//! | `agg`         | `max` (default) or `avg` |
//! | `world_id`    | One world's own count |
//! | `location_id` | Sum of the worlds at one location |
//! | `is_f2p`      | Sum of free (`1`) or members (`0`) worlds |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State, rejection::QueryRejection},
};
use chrono::Utc;
use worldcount_core::{
  query::{HistoryParams, HistoryQuery},
  series::SeriesPoint,
  store::SampleStore,
};

use crate::error::ApiError;

pub async fn handler<S: SampleStore>(
  State(store): State<Arc<S>>,
  params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<SeriesPoint>>, ApiError> {
  let Query(params) = params?;
  let query = HistoryQuery::from_params(&params, Utc::now())?;
  let points = store.history(&query).await.map_err(ApiError::store)?;
  Ok(Json(points))
}
