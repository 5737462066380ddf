//! Rollup types derived from the fact log.
//!
//! Every counter here is a derived value. It equals the matching aggregate
//! over the fact log at the instant it was computed and is never incremented
//! in place.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::window::Window;

// ─── Counters ────────────────────────────────────────────────────────────────

/// View and unique-visitor counts over every window, plus the latest view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowedCounts {
  pub total_views:                u64,
  pub views_today:                u64,
  pub views_this_week:            u64,
  pub views_this_month:           u64,
  pub unique_visitors_total:      u64,
  pub unique_visitors_today:      u64,
  pub unique_visitors_this_week:  u64,
  pub unique_visitors_this_month: u64,
  pub last_viewed_at:             Option<DateTime<Utc>>,
}

impl WindowedCounts {
  pub fn views(&self, window: Window) -> u64 {
    match window {
      Window::Today => self.views_today,
      Window::ThisWeek => self.views_this_week,
      Window::ThisMonth => self.views_this_month,
      Window::AllTime => self.total_views,
    }
  }

  pub fn unique_visitors(&self, window: Window) -> u64 {
    match window {
      Window::Today => self.unique_visitors_today,
      Window::ThisWeek => self.unique_visitors_this_week,
      Window::ThisMonth => self.unique_visitors_this_month,
      Window::AllTime => self.unique_visitors_total,
    }
  }

  /// Add `other`'s counters into `self` and keep the later `last_viewed_at`.
  ///
  /// Summing unique visitors across paths counts a session once per path it
  /// visited; that is what the global totals report.
  pub fn absorb(&mut self, other: &WindowedCounts) {
    self.total_views += other.total_views;
    self.views_today += other.views_today;
    self.views_this_week += other.views_this_week;
    self.views_this_month += other.views_this_month;
    self.unique_visitors_total += other.unique_visitors_total;
    self.unique_visitors_today += other.unique_visitors_today;
    self.unique_visitors_this_week += other.unique_visitors_this_week;
    self.unique_visitors_this_month += other.unique_visitors_this_month;
    self.last_viewed_at = self.last_viewed_at.max(other.last_viewed_at);
  }
}

// ─── PathSummary ─────────────────────────────────────────────────────────────

/// The stored rollup row for one path; `path` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSummary {
  pub path:        String,
  #[serde(flatten)]
  pub counts:      WindowedCounts,
  /// The clock instant the counters were derived at.
  pub computed_at: DateTime<Utc>,
}

impl PathSummary {
  /// A zeroed summary, as created lazily for a path's first fact.
  pub fn empty(path: impl Into<String>, computed_at: DateTime<Utc>) -> Self {
    Self {
      path: path.into(),
      counts: WindowedCounts::default(),
      computed_at,
    }
  }
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// Where a [`PathAnalytics`] answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsSource {
  /// The stored rollup row.
  Summary,
  /// Derived on read from the fact log; nothing was persisted.
  Live,
}

/// Per-path analytics as returned to presentation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathAnalytics {
  pub path:        String,
  #[serde(flatten)]
  pub counts:      WindowedCounts,
  pub computed_at: DateTime<Utc>,
  pub source:      AnalyticsSource,
}

impl From<PathSummary> for PathAnalytics {
  fn from(s: PathSummary) -> Self {
    Self {
      path:        s.path,
      counts:      s.counts,
      computed_at: s.computed_at,
      source:      AnalyticsSource::Summary,
    }
  }
}

/// One entry of a most-viewed listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopPath {
  pub path:  String,
  pub views: u64,
  /// Human label derived from the path shape.
  pub title: String,
}

impl TopPath {
  pub fn new(path: impl Into<String>, views: u64) -> Self {
    let path = path.into();
    let title = title_from_path(&path);
    Self { path, views, title }
  }
}

/// Views for one local calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyViews {
  pub date:  NaiveDate,
  pub views: u64,
}

/// Derive a display label from a path.
///
/// `/posts/<slug>` yields the slug as words, category and tag listings are
/// prefixed, and anything else is humanised as-is.
pub fn title_from_path(path: &str) -> String {
  if path.is_empty() {
    return "Unknown".to_owned();
  }
  if path == "/posts" || path == "/" {
    return "Blog Home".to_owned();
  }
  if let Some(slug) = path.strip_prefix("/posts/") {
    return humanize(slug);
  }
  if let Some(rest) = path.strip_prefix("/categories/") {
    return format!("Category: {}", humanize(&rest.replace("/posts", "")));
  }
  if let Some(rest) = path.strip_prefix("/tags/") {
    return format!("Tag: {}", humanize(&rest.replace("/posts", "")));
  }
  humanize(path.strip_prefix('/').unwrap_or(path))
}

fn humanize(slug: &str) -> String {
  slug.replace(['-', '_'], " ").trim().to_owned()
}
