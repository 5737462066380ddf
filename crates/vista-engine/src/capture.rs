//! Event capture: turning completed requests into view facts.
//!
//! [`Capture::observe`] is called from the request task once a response is
//! known. It decides whether the request counts as a page view, builds the
//! fact and hands it to the channel. It never fails the request: malformed
//! optional fields become `None` and anything else is logged and skipped.

use std::{fmt, net::IpAddr, sync::Arc};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vista_core::{
  view::{
    MAX_CLIENT_IP_LEN, MAX_PATH_LEN, MAX_REFERRER_LEN, MAX_TITLE_LEN,
    NewViewFact, is_valid_session_id,
  },
  window::Clock,
};

use crate::channel::{SendOutcome, ViewSender};

// ─── Titles ──────────────────────────────────────────────────────────────────

/// Content rendered by a view that can name itself.
pub trait DisplayTitle: Send + Sync {
  fn display_title(&self) -> Option<&str>;
}

impl DisplayTitle for String {
  fn display_title(&self) -> Option<&str> { Some(self) }
}

impl DisplayTitle for &'static str {
  fn display_title(&self) -> Option<&str> { Some(self) }
}

/// What the response rendered, when the host application says.
#[derive(Clone, Default)]
pub struct ViewMetadata {
  /// Template or view identifier, e.g. `blog/post-details`.
  pub view_name: Option<String>,
  /// The primary content object of the view.
  pub content:   Option<Arc<dyn DisplayTitle>>,
}

impl ViewMetadata {
  pub fn named(view_name: impl Into<String>) -> Self {
    Self {
      view_name: Some(view_name.into()),
      content:   None,
    }
  }

  pub fn with_content(mut self, content: Arc<dyn DisplayTitle>) -> Self {
    self.content = Some(content);
    self
  }
}

impl fmt::Debug for ViewMetadata {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ViewMetadata")
      .field("view_name", &self.view_name)
      .field(
        "content",
        &self.content.as_ref().and_then(|c| c.display_title()),
      )
      .finish()
  }
}

/// Labels for well-known view identifiers.
const VIEW_TITLES: &[(&str, &str)] = &[
  ("blog/posts", "Blog Posts"),
  ("blog/post-details", "Post Details"),
  ("blog/contact", "Contact"),
  ("index", "Home"),
];

/// Pick a title from the view's content, then from its identifier.
pub fn title_for_view(view: &ViewMetadata) -> Option<String> {
  let from_content = view
    .content
    .as_ref()
    .and_then(|c| c.display_title())
    .and_then(clean_title);
  if from_content.is_some() {
    return from_content;
  }

  let name = view.view_name.as_deref()?;
  let label = VIEW_TITLES
    .iter()
    .find(|(id, _)| *id == name)
    .map(|(_, label)| (*label).to_owned())
    .unwrap_or_else(|| name.replace('/', " - ").replace('-', " "));
  clean_title(&label)
}

/// Strip control characters, trim and truncate. Empty titles are `None`.
pub fn clean_title(raw: &str) -> Option<String> {
  let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
  let trimmed = cleaned.trim();
  if trimmed.is_empty() {
    return None;
  }
  Some(truncate_chars(trimmed, MAX_TITLE_LEN).trim_end().to_owned())
}

fn truncate_chars(s: &str, max: usize) -> &str {
  match s.char_indices().nth(max) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// A completed HTTP exchange, as reported by the web layer.
#[derive(Debug, Clone, Default)]
pub struct RequestCompleted {
  pub method:      String,
  pub status:      u16,
  /// Request target; a query string or fragment is ignored.
  pub path:        String,
  pub headers:     Vec<(String, String)>,
  pub remote_addr: Option<IpAddr>,
  pub session_id:  Option<String>,
  pub user_id:     Option<i64>,
  pub view:        Option<ViewMetadata>,
}

impl RequestCompleted {
  /// First value of header `name`, compared case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// The path without query string or fragment.
  pub fn bare_path(&self) -> &str {
    let end = self.path.find(['?', '#']).unwrap_or(self.path.len());
    &self.path[..end]
  }

  /// Forwarded client address, falling back to the socket address.
  pub fn client_ip(&self) -> Option<String> {
    let forwarded = self
      .header("x-forwarded-for")
      .and_then(|v| v.split(',').next())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .or_else(|| {
        self
          .header("x-real-ip")
          .map(str::trim)
          .filter(|v| !v.is_empty())
      });

    let ip = match forwarded {
      Some(ip) => ip.to_owned(),
      None => self.remote_addr?.to_string(),
    };
    (ip.chars().count() <= MAX_CLIENT_IP_LEN).then_some(ip)
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Which requests count as page views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapturePolicy {
  /// Paths starting with any of these are ignored.
  pub excluded_prefixes: Vec<String>,
  /// Paths containing any of these are ignored.
  pub excluded_segments: Vec<String>,
  /// Paths equal to any of these are ignored.
  pub excluded_paths:    Vec<String>,
}

impl Default for CapturePolicy {
  fn default() -> Self {
    let owned = |xs: &[&str]| -> Vec<String> {
      xs.iter().map(|s| (*s).to_owned()).collect()
    };
    Self {
      excluded_prefixes: owned(&["/admin", "/api"]),
      excluded_segments: owned(&[
        "/webjars",
        "/css",
        "/js",
        "/images",
        "/user-images",
        "/favicon.ico",
      ]),
      excluded_paths:    owned(&["/", "/login", "/logout", "/error"]),
    }
  }
}

impl CapturePolicy {
  /// Whether a request with this method, status and bare path is a view.
  pub fn qualifies(&self, method: &str, status: u16, path: &str) -> bool {
    method.eq_ignore_ascii_case("GET")
      && status == 200
      && !path.is_empty()
      && path.chars().count() <= MAX_PATH_LEN
      && !self.excluded_paths.iter().any(|p| p == path)
      && !self.excluded_prefixes.iter().any(|p| path.starts_with(p.as_str()))
      && !self.excluded_segments.iter().any(|s| path.contains(s.as_str()))
  }
}

// ─── Capture ─────────────────────────────────────────────────────────────────

/// What happened to an observed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureOutcome {
  /// Not a page view, or the fact could not be built.
  Skipped,
  Queued,
  /// The channel refused the fact.
  Dropped,
}

/// Request-side entry point of the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Capture {
  policy: Arc<CapturePolicy>,
  sender: ViewSender,
  clock:  Arc<dyn Clock>,
}

impl Capture {
  pub fn new(
    policy: CapturePolicy,
    sender: ViewSender,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      policy: Arc::new(policy),
      sender,
      clock,
    }
  }

  pub fn policy(&self) -> &CapturePolicy { &self.policy }

  /// Build the fact for `req`, or `None` when it is not a page view.
  pub fn build(&self, req: &RequestCompleted) -> Option<NewViewFact> {
    let path = req.bare_path();
    if !self.policy.qualifies(&req.method, req.status, path) {
      return None;
    }

    // Oversized or blank ids are replaced, not trusted.
    let session_id = req
      .session_id
      .clone()
      .filter(|s| is_valid_session_id(s))
      .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    let mut fact = match NewViewFact::new(path, session_id, self.clock.now()) {
      Ok(fact) => fact,
      Err(e) => {
        tracing::error!(path, error = %e, "could not build view fact");
        return None;
      }
    };
    fact.title = req.view.as_ref().and_then(title_for_view);
    fact.referrer = req
      .header("referer")
      .map(|r| truncate_chars(r, MAX_REFERRER_LEN).to_owned());
    fact.user_agent = req.header("user-agent").map(str::to_owned);
    fact.client_ip = req.client_ip();
    fact.user_id = req.user_id;
    Some(fact)
  }

  /// Capture `req` if it is a page view. Never fails.
  pub async fn observe(&self, req: RequestCompleted) -> CaptureOutcome {
    let Some(fact) = self.build(&req) else {
      return CaptureOutcome::Skipped;
    };

    let path = fact.path.clone();
    match self.sender.send(fact).await {
      SendOutcome::Queued => {
        tracing::debug!(path = %path, "captured view");
        CaptureOutcome::Queued
      }
      SendOutcome::Dropped | SendOutcome::Closed => CaptureOutcome::Dropped,
    }
  }
}

impl fmt::Debug for Capture {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Capture")
      .field("policy", &self.policy)
      .field("sender", &self.sender)
      .finish_non_exhaustive()
  }
}
