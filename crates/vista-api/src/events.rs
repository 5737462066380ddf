//! Handler for `POST /events`.
//!
//! Accepts a "request completed" notification from a reverse proxy or
//! sidecar and runs it through the same capture path as the middleware.
//!
//! ```json
//! {
//!   "method": "GET",
//!   "status": 200,
//!   "path": "/posts/hello",
//!   "headers": { "referer": "https://example.com/" },
//!   "remote_addr": "203.0.113.7",
//!   "session_id": "3f0c…",
//!   "view_name": "blog/post-details",
//!   "title": "Hello"
//! }
//! ```

use std::{collections::HashMap, net::IpAddr, sync::Arc};

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use vista_engine::capture::{Capture, DisplayTitle, RequestCompleted, ViewMetadata};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct EventBody {
  pub method:      String,
  pub status:      u16,
  pub path:        String,
  #[serde(default)]
  pub headers:     HashMap<String, String>,
  pub remote_addr: Option<IpAddr>,
  pub session_id:  Option<String>,
  pub user_id:     Option<i64>,
  pub view_name:   Option<String>,
  /// Title of the rendered content, if the reporter knows it.
  pub title:       Option<String>,
}

impl From<EventBody> for RequestCompleted {
  fn from(body: EventBody) -> Self {
    let view = (body.view_name.is_some() || body.title.is_some()).then(|| {
      ViewMetadata {
        view_name: body.view_name,
        content:   body
          .title
          .map(|t| Arc::new(t) as Arc<dyn DisplayTitle>),
      }
    });
    RequestCompleted {
      method: body.method,
      status: body.status,
      path: body.path,
      headers: body.headers.into_iter().collect(),
      remote_addr: body.remote_addr,
      session_id: body.session_id,
      user_id: body.user_id,
      view,
    }
  }
}

/// `POST /events`. Always `202 Accepted` once the body parses; `400` with a
/// JSON error otherwise.
pub async fn ingest(
  State(capture): State<Capture>,
  body: Result<Json<EventBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let Json(body) = body?;
  let outcome = capture.observe(body.into()).await;
  Ok((StatusCode::ACCEPTED, Json(json!({ "outcome": outcome }))))
}
