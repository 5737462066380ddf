//! Page-view capture middleware for host applications.
//!
//! ```rust,ignore
//! let app = Router::new()
//!   .route("/posts/{slug}", get(show_post))
//!   .layer(axum::middleware::from_fn_with_state(
//!     pipeline.capture(),
//!     vista_api::capture::track_views,
//!   ));
//! ```
//!
//! Handlers describe what they rendered by returning an
//! `Extension(ViewMetadata)`. An upstream auth layer may insert
//! [`AuthenticatedUser`] into the request extensions.

use std::net::SocketAddr;

use axum::{
  extract::{ConnectInfo, Request, State},
  http::{HeaderMap, HeaderValue, header},
  middleware::Next,
  response::Response,
};
use uuid::Uuid;
use vista_core::view::is_valid_session_id;
use vista_engine::capture::{Capture, CaptureOutcome, RequestCompleted, ViewMetadata};

/// Cookie carrying the visitor's session identifier.
pub const SESSION_COOKIE: &str = "vista_session";

/// The signed-in user for the current request, if the host knows one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub i64);

/// Run the inner service, then report the exchange to `capture`.
///
/// A visitor without a session cookie gets a fresh one on the first response
/// that counts as a page view.
pub async fn track_views(
  State(capture): State<Capture>,
  req: Request,
  next: Next,
) -> Response {
  let existing = session_from_cookies(req.headers());
  let session_id = existing
    .clone()
    .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

  let method = req.method().as_str().to_owned();
  let path = req.uri().path().to_owned();
  let headers = header_pairs(req.headers());
  let remote_addr = req
    .extensions()
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| addr.ip());
  let user_id = req
    .extensions()
    .get::<AuthenticatedUser>()
    .map(|AuthenticatedUser(id)| *id);

  let mut response = next.run(req).await;

  let completed = RequestCompleted {
    method,
    status: response.status().as_u16(),
    path,
    headers,
    remote_addr,
    session_id: Some(session_id.clone()),
    user_id,
    view: response.extensions().get::<ViewMetadata>().cloned(),
  };
  let outcome = capture.observe(completed).await;

  if existing.is_none() && outcome != CaptureOutcome::Skipped {
    match HeaderValue::from_str(&format!(
      "{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax"
    )) {
      Ok(cookie) => {
        response.headers_mut().append(header::SET_COOKIE, cookie);
      }
      Err(e) => tracing::warn!(error = %e, "could not encode session cookie"),
    }
  }
  response
}

/// The session id from the request's `Cookie` headers, if present and usable.
///
/// An oversized value is ignored, so the visitor is issued a fresh cookie.
pub fn session_from_cookies(headers: &HeaderMap) -> Option<String> {
  headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(name, _)| *name == SESSION_COOKIE)
    .map(|(_, value)| value.trim().to_owned())
    .filter(|value| is_valid_session_id(value))
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
  headers
    .iter()
    .filter_map(|(name, value)| {
      value
        .to_str()
        .ok()
        .map(|v| (name.as_str().to_owned(), v.to_owned()))
    })
    .collect()
}
