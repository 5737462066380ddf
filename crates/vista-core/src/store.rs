//! The `AnalyticsStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `vista-store-sqlite`).
//! It covers two logical tables: the append-only fact log and the per-path
//! summary rows. The engine depends on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  summary::{DailyViews, PathSummary, WindowedCounts},
  view::{NewViewFact, ViewFact},
  window::{Window, WindowBounds},
};

/// Abstraction over a Vista analytics store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait AnalyticsStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Fact log: append-only writes ───────────────────────────────────────

  /// Durably record a view fact and return it with its assigned id.
  fn append(
    &self,
    fact: NewViewFact,
  ) -> impl Future<Output = Result<ViewFact, Self::Error>> + Send + '_;

  // ── Fact log: aggregates ───────────────────────────────────────────────

  /// Number of facts for `path` (all paths when `None`) created at or after
  /// `since` (all time when `None`).
  fn count_views<'a>(
    &'a self,
    path: Option<&'a str>,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Number of distinct session ids, scoped like [`Self::count_views`].
  fn count_unique_visitors<'a>(
    &'a self,
    path: Option<&'a str>,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Latest `created_at` recorded for `path`.
  fn last_viewed_at<'a>(
    &'a self,
    path: &'a str,
  ) -> impl Future<Output = Result<Option<DateTime<Utc>>, Self::Error>> + Send + 'a;

  /// Every windowed counter for `path` (all paths when `None`) evaluated
  /// against `bounds`, read in one consistent snapshot.
  fn tally<'a>(
    &'a self,
    path: Option<&'a str>,
    bounds: &'a WindowBounds,
  ) -> impl Future<Output = Result<WindowedCounts, Self::Error>> + Send + 'a;

  /// Every distinct path present in the fact log.
  fn distinct_paths(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Views grouped by calendar date at `utc_offset_secs`, newest first.
  fn daily_views<'a>(
    &'a self,
    path: Option<&'a str>,
    since: DateTime<Utc>,
    utc_offset_secs: i32,
  ) -> impl Future<Output = Result<Vec<DailyViews>, Self::Error>> + Send + 'a;

  // ── Summary rows ──────────────────────────────────────────────────────

  /// The stored summary for `path`, if one has been created.
  fn get_summary<'a>(
    &'a self,
    path: &'a str,
  ) -> impl Future<Output = Result<Option<PathSummary>, Self::Error>> + Send + 'a;

  /// Insert or overwrite the summary keyed on its unique path.
  ///
  /// Must be atomic: two concurrent upserts for a path that has no row yet
  /// both succeed and leave exactly one row.
  fn upsert_summary(
    &self,
    summary: PathSummary,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Paths of every stored summary, in ascending order.
  fn summary_paths(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Up to `limit` summaries ordered by `window` views, descending; ties are
  /// broken by path, ascending.
  fn top_summaries(
    &self,
    window: Window,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<PathSummary>, Self::Error>> + Send + '_;

  /// Column-wise sums over every stored summary.
  fn summary_totals(
    &self,
  ) -> impl Future<Output = Result<WindowedCounts, Self::Error>> + Send + '_;
}
