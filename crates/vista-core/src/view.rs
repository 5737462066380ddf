//! View facts, the fundamental unit of the Vista analytics store.
//!
//! A view fact records that a path was viewed by a session at a point in time.
//! Facts are never updated or deleted; every rollup is derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Longest path accepted into the fact log.
pub const MAX_PATH_LEN: usize = 500;
/// Longest title stored with a fact.
pub const MAX_TITLE_LEN: usize = 500;
/// Longest referrer stored with a fact.
pub const MAX_REFERRER_LEN: usize = 1000;
/// Longest client address stored with a fact (textual IPv6 upper bound).
pub const MAX_CLIENT_IP_LEN: usize = 45;
/// Longest session identifier accepted into the fact log.
pub const MAX_SESSION_ID_LEN: usize = 64;

/// Whether `id` can identify a visitor: non-blank and at most
/// [`MAX_SESSION_ID_LEN`] characters.
pub fn is_valid_session_id(id: &str) -> bool {
  !id.trim().is_empty() && id.chars().count() <= MAX_SESSION_ID_LEN
}

// ─── ViewFact ────────────────────────────────────────────────────────────────

/// An immutable record of a single page view. Once written, no field is ever
/// updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFact {
  pub id:         Uuid,
  pub path:       String,
  pub title:      Option<String>,
  pub referrer:   Option<String>,
  pub user_agent: Option<String>,
  /// Diagnostic only; never used for visitor uniqueness.
  pub client_ip:  Option<String>,
  /// Identifies a unique visitor within a window.
  pub session_id: String,
  pub user_id:    Option<i64>,
  /// Set at capture time, not at persistence time.
  pub created_at: DateTime<Utc>,
}

// ─── NewViewFact ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::AnalyticsStore::append`]. The identifier is
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewViewFact {
  pub path:       String,
  pub title:      Option<String>,
  pub referrer:   Option<String>,
  pub user_agent: Option<String>,
  pub client_ip:  Option<String>,
  pub session_id: String,
  pub user_id:    Option<i64>,
  pub created_at: DateTime<Utc>,
}

impl NewViewFact {
  /// Build a fact with every optional field unset.
  ///
  /// Rejects an empty path or session id; both are required to count a view.
  /// Session ids longer than [`MAX_SESSION_ID_LEN`] are rejected too.
  pub fn new(
    path: impl Into<String>,
    session_id: impl Into<String>,
    created_at: DateTime<Utc>,
  ) -> Result<Self> {
    let path = path.into();
    let session_id = session_id.into();
    if path.is_empty() {
      return Err(Error::EmptyPath);
    }
    if session_id.is_empty() {
      return Err(Error::EmptySession);
    }
    let session_len = session_id.chars().count();
    if session_len > MAX_SESSION_ID_LEN {
      return Err(Error::SessionTooLong(session_len));
    }
    Ok(Self {
      path,
      title: None,
      referrer: None,
      user_agent: None,
      client_ip: None,
      session_id,
      user_id: None,
      created_at,
    })
  }

  /// Attach the store-assigned identifier.
  pub fn into_fact(self, id: Uuid) -> ViewFact {
    ViewFact {
      id,
      path: self.path,
      title: self.title,
      referrer: self.referrer,
      user_agent: self.user_agent,
      client_ip: self.client_ip,
      session_id: self.session_id,
      user_id: self.user_id,
      created_at: self.created_at,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_rejects_empty_required_fields() {
    let now = Utc::now();
    assert!(matches!(NewViewFact::new("", "s1", now), Err(Error::EmptyPath)));
    assert!(matches!(
      NewViewFact::new("/posts/a", "", now),
      Err(Error::EmptySession)
    ));
  }

  #[test]
  fn new_rejects_oversized_session() {
    let now = Utc::now();
    let max = "s".repeat(MAX_SESSION_ID_LEN);
    assert!(NewViewFact::new("/posts/a", max.as_str(), now).is_ok());
    assert!(matches!(
      NewViewFact::new("/posts/a", format!("{max}s"), now),
      Err(Error::SessionTooLong(65))
    ));
    assert!(!is_valid_session_id("   "));
    assert!(is_valid_session_id(&max));
  }

  #[test]
  fn into_fact_keeps_every_field() {
    let now = Utc::now();
    let mut input = NewViewFact::new("/posts/a", "s1", now).unwrap();
    input.title = Some("A".into());
    input.user_id = Some(7);

    let id = Uuid::new_v4();
    let fact = input.clone().into_fact(id);
    assert_eq!(fact.id, id);
    assert_eq!(fact.path, input.path);
    assert_eq!(fact.title.as_deref(), Some("A"));
    assert_eq!(fact.user_id, Some(7));
    assert_eq!(fact.created_at, now);
  }
}
