//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that lexicographic comparison in SQL matches
//! chronological order. Counters are stored as `INTEGER`. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use uuid::Uuid;
use vista_core::{
  summary::{DailyViews, PathSummary, WindowedCounts},
  window::Window,
};

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

/// SQLite date-function modifier shifting UTC to a fixed local offset.
pub fn encode_offset_modifier(utc_offset_secs: i32) -> String {
  format!("{utc_offset_secs:+} seconds")
}

// ─── Counters ─────────────────────────────────────────────────────────────────

pub fn encode_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

pub fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── Window ───────────────────────────────────────────────────────────────────

/// The `path_summaries` column holding view counts for `window`.
pub fn views_column(window: Window) -> &'static str {
  match window {
    Window::Today => "views_today",
    Window::ThisWeek => "views_this_week",
    Window::ThisMonth => "views_this_month",
    Window::AllTime => "total_views",
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// The eight counter columns plus the latest-view timestamp, in the column
/// order shared by tally queries and `path_summaries`.
pub struct RawCounts {
  pub counts:         [i64; 8],
  pub last_viewed_at: Option<String>,
}

impl RawCounts {
  /// Read eight counters then a timestamp starting at column `offset`.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    let mut counts = [0_i64; 8];
    for (i, slot) in counts.iter_mut().enumerate() {
      *slot = row.get::<_, Option<i64>>(offset + i)?.unwrap_or(0);
    }
    Ok(Self {
      counts,
      last_viewed_at: row.get(offset + 8)?,
    })
  }

  pub fn into_counts(self) -> Result<WindowedCounts> {
    let [total, today, week, month, u_total, u_today, u_week, u_month] =
      self.counts.map(decode_count);
    Ok(WindowedCounts {
      total_views:                total,
      views_today:                today,
      views_this_week:            week,
      views_this_month:           month,
      unique_visitors_total:      u_total,
      unique_visitors_today:      u_today,
      unique_visitors_this_week:  u_week,
      unique_visitors_this_month: u_month,
      last_viewed_at:             self
        .last_viewed_at
        .as_deref()
        .map(decode_dt)
        .transpose()?,
    })
  }
}

/// Raw values read directly from a `path_summaries` row.
pub struct RawSummary {
  pub path:        String,
  pub counts:      RawCounts,
  pub computed_at: String,
}

impl RawSummary {
  /// Column list matching [`RawSummary::from_row`].
  pub const COLUMNS: &'static str = "path,
    total_views, views_today, views_this_week, views_this_month,
    unique_visitors_total, unique_visitors_today,
    unique_visitors_this_week, unique_visitors_this_month,
    last_viewed_at, computed_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      path:        row.get(0)?,
      counts:      RawCounts::from_row(row, 1)?,
      computed_at: row.get(10)?,
    })
  }

  pub fn into_summary(self) -> Result<PathSummary> {
    Ok(PathSummary {
      path:        self.path,
      counts:      self.counts.into_counts()?,
      computed_at: decode_dt(&self.computed_at)?,
    })
  }
}

/// Raw values from a daily grouping row.
pub struct RawDailyViews {
  pub date:  String,
  pub views: i64,
}

impl RawDailyViews {
  pub fn into_daily(self) -> Result<DailyViews> {
    Ok(DailyViews {
      date:  decode_date(&self.date)?,
      views: decode_count(self.views),
    })
  }
}
