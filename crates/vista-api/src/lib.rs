//! HTTP surface for Vista.
//!
//! Three pieces, mounted independently by the caller:
//!
//! - [`capture::track_views`], middleware that reports page views served by
//!   a host application;
//! - [`ingest_router`], `POST /events` for notifications from a proxy;
//! - [`analytics_router`], the JSON read API over a [`QueryService`].
//!
//! Auth and TLS are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! Router::new()
//!   .nest("/admin/analytics", vista_api::analytics_router(pipeline.query()))
//!   .merge(vista_api::ingest_router(pipeline.capture()))
//! ```

pub mod analytics;
pub mod capture;
pub mod error;
pub mod events;

use axum::{
  Router,
  routing::{get, post},
};
use vista_core::store::AnalyticsStore;
use vista_engine::{capture::Capture, query::QueryService};

pub use capture::{AuthenticatedUser, track_views};
pub use error::ApiError;

/// Build the read-only analytics router for `query`.
pub fn analytics_router<S>(query: QueryService<S>) -> Router<()>
where
  S: AnalyticsStore + 'static,
{
  Router::new()
    .route("/paths", get(analytics::path::<S>))
    .route("/top", get(analytics::top::<S>))
    .route("/totals", get(analytics::totals::<S>))
    .route("/daily", get(analytics::daily::<S>))
    .with_state(query)
}

/// Build the `POST /events` ingest router.
pub fn ingest_router(capture: Capture) -> Router<()> {
  Router::new()
    .route("/events", post(events::ingest))
    .with_state(capture)
}
