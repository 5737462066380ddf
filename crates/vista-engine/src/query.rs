//! Read side: per-path analytics, rankings, totals and daily series.
//!
//! Reads come from stored summaries where they exist, so results may lag the
//! fact log until the next recompute or reconciliation. Errors propagate.

use std::{fmt, sync::Arc};

use vista_core::{
  store::AnalyticsStore,
  summary::{AnalyticsSource, DailyViews, PathAnalytics, TopPath, WindowedCounts},
  window::{Clock, Window},
};

use crate::{Error, Result};

/// Largest `limit` accepted by [`QueryService::get_top_paths`].
pub const MAX_TOP_LIMIT: usize = 1000;
/// Longest range accepted by [`QueryService::get_daily_views`].
pub const MAX_DAILY_DAYS: u32 = 366;

pub struct QueryService<S> {
  store: Arc<S>,
  clock: Arc<dyn Clock>,
}

impl<S> Clone for QueryService<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      clock: Arc::clone(&self.clock),
    }
  }
}

impl<S> fmt::Debug for QueryService<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryService").finish_non_exhaustive()
  }
}

impl<S: AnalyticsStore> QueryService<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    Self { store, clock }
  }

  /// The stored summary for `path`, or a live derivation when none exists.
  ///
  /// A live answer is not persisted. Unknown paths yield zero counters.
  pub async fn get_path_analytics(&self, path: &str) -> Result<PathAnalytics> {
    if let Some(summary) =
      self.store.get_summary(path).await.map_err(Error::store)?
    {
      return Ok(summary.into());
    }

    let bounds = self.clock.bounds();
    let counts = self
      .store
      .tally(Some(path), &bounds)
      .await
      .map_err(Error::store)?;
    Ok(PathAnalytics {
      path: path.to_owned(),
      counts,
      computed_at: bounds.now,
      source: AnalyticsSource::Live,
    })
  }

  /// The most viewed paths in `window`, at most `limit` of them.
  pub async fn get_top_paths(
    &self,
    window: Window,
    limit: usize,
  ) -> Result<Vec<TopPath>> {
    if limit == 0 {
      return Ok(Vec::new());
    }
    let summaries = self
      .store
      .top_summaries(window, limit.min(MAX_TOP_LIMIT))
      .await
      .map_err(Error::store)?;
    Ok(
      summaries
        .into_iter()
        .map(|s| {
          let views = s.counts.views(window);
          TopPath::new(s.path, views)
        })
        .collect(),
    )
  }

  /// Sums over every stored summary.
  pub async fn get_global_totals(&self) -> Result<WindowedCounts> {
    self.store.summary_totals().await.map_err(Error::store)
  }

  /// Views per local day over the last `days` days including today, newest
  /// first. Days without views are omitted.
  pub async fn get_daily_views(
    &self,
    path: Option<&str>,
    days: u32,
  ) -> Result<Vec<DailyViews>> {
    let bounds = self.clock.bounds();
    let since = self.clock.start_of_last_days(days.clamp(1, MAX_DAILY_DAYS));
    self
      .store
      .daily_views(path, since, bounds.utc_offset_secs)
      .await
      .map_err(Error::store)
  }
}
