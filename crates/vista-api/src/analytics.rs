//! Handlers for the admin analytics endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/paths` | `?path=<path>`, required |
//! | `GET`  | `/top` | `?window=all_time&limit=10` |
//! | `GET`  | `/totals` | Sums over every summary row |
//! | `GET`  | `/daily` | `?days=30`, optional `&path=<path>` |

use axum::{
  Json,
  extract::{Query, State, rejection::QueryRejection},
};
use serde::Deserialize;
use vista_core::{
  store::AnalyticsStore,
  summary::{DailyViews, PathAnalytics, TopPath, WindowedCounts},
  window::Window,
};
use vista_engine::query::QueryService;

use crate::error::ApiError;

const DEFAULT_TOP_LIMIT: usize = 10;
const DEFAULT_DAILY_DAYS: u32 = 30;

// ─── Path ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PathParams {
  pub path: Option<String>,
}

/// `GET /paths?path=<path>`
pub async fn path<S>(
  State(query): State<QueryService<S>>,
  params: Result<Query<PathParams>, QueryRejection>,
) -> Result<Json<PathAnalytics>, ApiError>
where
  S: AnalyticsStore + 'static,
{
  let Query(params) = params?;
  let path = params
    .path
    .filter(|p| !p.is_empty())
    .ok_or_else(|| ApiError::BadRequest("missing `path` parameter".into()))?;
  Ok(Json(query.get_path_analytics(&path).await?))
}

// ─── Top ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TopParams {
  /// `today`, `this_week`, `this_month` or `all_time`; camelCase also works.
  pub window: Option<String>,
  pub limit:  Option<usize>,
}

/// `GET /top[?window=<window>][&limit=<n>]`
pub async fn top<S>(
  State(query): State<QueryService<S>>,
  params: Result<Query<TopParams>, QueryRejection>,
) -> Result<Json<Vec<TopPath>>, ApiError>
where
  S: AnalyticsStore + 'static,
{
  let Query(params) = params?;
  let window = match params.window.as_deref() {
    Some(w) => Window::parse(w).map_err(|e| ApiError::BadRequest(e.to_string()))?,
    None => Window::AllTime,
  };
  let limit = params.limit.unwrap_or(DEFAULT_TOP_LIMIT);
  Ok(Json(query.get_top_paths(window, limit).await?))
}

// ─── Totals ───────────────────────────────────────────────────────────────────

/// `GET /totals`
pub async fn totals<S>(
  State(query): State<QueryService<S>>,
) -> Result<Json<WindowedCounts>, ApiError>
where
  S: AnalyticsStore + 'static,
{
  Ok(Json(query.get_global_totals().await?))
}

// ─── Daily ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DailyParams {
  pub path: Option<String>,
  pub days: Option<u32>,
}

/// `GET /daily[?path=<path>][&days=<n>]`
pub async fn daily<S>(
  State(query): State<QueryService<S>>,
  params: Result<Query<DailyParams>, QueryRejection>,
) -> Result<Json<Vec<DailyViews>>, ApiError>
where
  S: AnalyticsStore + 'static,
{
  let Query(params) = params?;
  let days = params.days.unwrap_or(DEFAULT_DAILY_DAYS);
  if days == 0 {
    return Err(ApiError::BadRequest("`days` must be at least 1".into()));
  }
  let path = params.path.filter(|p| !p.is_empty());
  Ok(Json(query.get_daily_views(path.as_deref(), days).await?))
}
