//! Wall-clock-relative counting windows.
//!
//! Window boundaries are never stored. They are recomputed from a [`Clock`]
//! every time counters are derived, so a rollup computed late on one day is
//! stale for "today" as soon as local midnight passes.

use std::sync::{Mutex, PoisonError};

use chrono::{
  DateTime, Datelike as _, Days, FixedOffset, Local, NaiveDate, NaiveTime,
  Offset as _, TimeDelta, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{Error, Result};

// ─── Window ──────────────────────────────────────────────────────────────────

/// A counting window.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Window {
  Today,
  #[serde(alias = "thisWeek")]
  #[strum(to_string = "this_week", serialize = "thisWeek")]
  ThisWeek,
  #[serde(alias = "thisMonth")]
  #[strum(to_string = "this_month", serialize = "thisMonth")]
  ThisMonth,
  #[serde(alias = "allTime")]
  #[strum(to_string = "all_time", serialize = "allTime")]
  AllTime,
}

impl Window {
  /// Parse a window name, accepting both `snake_case` and `camelCase`.
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownWindow(s.to_owned()))
  }
}

// ─── Boundaries ──────────────────────────────────────────────────────────────

/// The start instant of every bounded window, evaluated at `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
  pub now:             DateTime<Utc>,
  /// Local midnight of the current calendar day.
  pub start_of_day:    DateTime<Utc>,
  /// Local midnight of the most recent Monday.
  pub start_of_week:   DateTime<Utc>,
  /// Local midnight of the first day of the current month.
  pub start_of_month:  DateTime<Utc>,
  /// Offset of the evaluating zone at `now`; used to group by local date.
  pub utc_offset_secs: i32,
}

impl WindowBounds {
  /// Compute boundaries in the time zone carried by `now`.
  pub fn at<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
    let tz = now.timezone();
    let today = now.date_naive();
    let monday =
      today - Days::new(u64::from(today.weekday().num_days_from_monday()));
    let first = today - Days::new(u64::from(today.day0()));

    Self {
      now:             now.with_timezone(&Utc),
      start_of_day:    local_midnight(&tz, today),
      start_of_week:   local_midnight(&tz, monday),
      start_of_month:  local_midnight(&tz, first),
      utc_offset_secs: now.offset().fix().local_minus_utc(),
    }
  }

  /// Lower bound for `window`; `None` means unbounded.
  pub fn since(&self, window: Window) -> Option<DateTime<Utc>> {
    match window {
      Window::Today => Some(self.start_of_day),
      Window::ThisWeek => Some(self.start_of_week),
      Window::ThisMonth => Some(self.start_of_month),
      Window::AllTime => None,
    }
  }
}

/// Local midnight `days - 1` calendar days before the date of `now`, i.e. the
/// start of a range covering `days` days including today. `0` behaves as `1`.
pub fn start_of_last_days<Tz: TimeZone>(
  now: &DateTime<Tz>,
  days: u32,
) -> DateTime<Utc> {
  let back = Days::new(u64::from(days.saturating_sub(1)));
  let first = now.date_naive().checked_sub_days(back).unwrap_or(NaiveDate::MIN);
  local_midnight(&now.timezone(), first)
}

/// The first valid instant at or after local midnight of `date`.
///
/// Zones that skip midnight for daylight saving have no such local time; the
/// next hour that exists is used instead.
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
  let midnight = date.and_time(NaiveTime::MIN);
  (0..=3)
    .find_map(|h| {
      tz.from_local_datetime(&(midnight + TimeDelta::hours(h)))
        .earliest()
    })
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_else(|| midnight.and_utc())
}

// ─── Clock ───────────────────────────────────────────────────────────────────

/// Source of "now" for window evaluation.
pub trait Clock: Send + Sync {
  /// Window boundaries evaluated at the current instant.
  fn bounds(&self) -> WindowBounds;

  /// See [`start_of_last_days`].
  fn start_of_last_days(&self, days: u32) -> DateTime<Utc>;

  fn now(&self) -> DateTime<Utc> { self.bounds().now }
}

/// The server's wall clock in its local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn bounds(&self) -> WindowBounds { WindowBounds::at(&Local::now()) }

  fn start_of_last_days(&self, days: u32) -> DateTime<Utc> {
    start_of_last_days(&Local::now(), days)
  }
}

/// A clock that only moves when told to. Used by tests and replay tooling.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
  pub fn new(now: DateTime<FixedOffset>) -> Self {
    Self { now: Mutex::new(now) }
  }

  pub fn set(&self, now: DateTime<FixedOffset>) {
    *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
  }

  pub fn advance(&self, by: TimeDelta) {
    let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
    *now += by;
  }

  pub fn local_now(&self) -> DateTime<FixedOffset> {
    *self.now.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Clock for ManualClock {
  fn bounds(&self) -> WindowBounds { WindowBounds::at(&self.local_now()) }

  fn start_of_last_days(&self, days: u32) -> DateTime<Utc> {
    start_of_last_days(&self.local_now(), days)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{LocalResult, NaiveDateTime};
  use strum::IntoEnumIterator as _;

  use super::*;

  fn at(offset_hours: i32, y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(offset_hours * 3600)
      .unwrap()
      .with_ymd_and_hms(y, m, d, h, min, 0)
      .unwrap()
  }

  #[test]
  fn bounds_midweek() {
    // Friday 16 October 2026, 15:30 at UTC+2.
    let b = WindowBounds::at(&at(2, 2026, 10, 16, 15, 30));

    assert_eq!(b.start_of_day, at(2, 2026, 10, 16, 0, 0));
    assert_eq!(b.start_of_week, at(2, 2026, 10, 12, 0, 0));
    assert_eq!(b.start_of_month, at(2, 2026, 10, 1, 0, 0));
    assert_eq!(b.utc_offset_secs, 7200);
    assert_eq!(b.since(Window::AllTime), None);
  }

  #[test]
  fn bounds_on_monday_start_today() {
    let b = WindowBounds::at(&at(0, 2026, 10, 12, 0, 0));
    assert_eq!(b.start_of_week, b.start_of_day);
  }

  #[test]
  fn week_can_start_in_previous_month() {
    // Thursday 1 October 2026; Monday was 28 September.
    let b = WindowBounds::at(&at(-5, 2026, 10, 1, 9, 0));
    assert_eq!(b.start_of_week, at(-5, 2026, 9, 28, 0, 0));
    assert_eq!(b.start_of_month, b.start_of_day);
    assert!(b.start_of_week < b.start_of_month);
  }

  #[test]
  fn boundaries_use_local_not_utc_midnight() {
    // 01:00 at UTC+3 is still the previous day in UTC.
    let b = WindowBounds::at(&at(3, 2026, 10, 16, 1, 0));
    assert_eq!(
      b.start_of_day,
      Utc.with_ymd_and_hms(2026, 10, 15, 21, 0, 0).unwrap()
    );
  }

  #[test]
  fn last_days_range_includes_today() {
    let now = at(0, 2026, 10, 16, 12, 0);
    let b = WindowBounds::at(&now);
    assert_eq!(start_of_last_days(&now, 1), b.start_of_day);
    assert_eq!(start_of_last_days(&now, 7), at(0, 2026, 10, 10, 0, 0));
    assert_eq!(start_of_last_days(&now, 0), b.start_of_day);
  }

  /// Central European time for 2026 only: UTC+1, then UTC+2 from
  /// 29 March 01:00 UTC. Local 02:00..03:00 that day does not exist.
  #[derive(Debug, Clone, Copy)]
  struct Cet2026;

  impl Cet2026 {
    fn switch_utc() -> NaiveDateTime {
      NaiveDate::from_ymd_opt(2026, 3, 29)
        .unwrap()
        .and_hms_opt(1, 0, 0)
        .unwrap()
    }

    fn winter() -> FixedOffset { FixedOffset::east_opt(3600).unwrap() }

    fn summer() -> FixedOffset { FixedOffset::east_opt(7200).unwrap() }
  }

  impl TimeZone for Cet2026 {
    type Offset = FixedOffset;

    fn from_offset(_: &FixedOffset) -> Self { Cet2026 }

    fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
      self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
    }

    fn offset_from_local_datetime(
      &self,
      local: &NaiveDateTime,
    ) -> LocalResult<FixedOffset> {
      let gap_start = Self::switch_utc() + TimeDelta::hours(1);
      let gap_end = Self::switch_utc() + TimeDelta::hours(2);
      if *local < gap_start {
        LocalResult::Single(Self::winter())
      } else if *local < gap_end {
        LocalResult::None
      } else {
        LocalResult::Single(Self::summer())
      }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
      self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
      if *utc < Self::switch_utc() { Self::winter() } else { Self::summer() }
    }
  }

  #[test]
  fn last_days_range_across_dst_starts_at_local_midnight() {
    // Tuesday 31 March 2026, 12:00 CEST; 25 March was still CET.
    let now = Cet2026.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap();
    assert_eq!(
      start_of_last_days(&now, 7),
      Utc.with_ymd_and_hms(2026, 3, 24, 23, 0, 0).unwrap()
    );
    assert_eq!(
      WindowBounds::at(&now).start_of_day,
      Utc.with_ymd_and_hms(2026, 3, 30, 22, 0, 0).unwrap()
    );
  }

  #[test]
  fn window_parses_both_spellings() {
    assert_eq!(Window::parse("all_time").unwrap(), Window::AllTime);
    assert_eq!(Window::parse("allTime").unwrap(), Window::AllTime);
    assert_eq!(Window::parse("thisWeek").unwrap(), Window::ThisWeek);
    assert_eq!(Window::parse("today").unwrap(), Window::Today);
    assert!(matches!(Window::parse("fortnight"), Err(Error::UnknownWindow(_))));

    for w in Window::iter() {
      assert_eq!(Window::parse(&w.to_string()).unwrap(), w);
    }
  }

  #[test]
  fn window_serde_accepts_aliases() {
    let w: Window = serde_json::from_str("\"thisMonth\"").unwrap();
    assert_eq!(w, Window::ThisMonth);
    assert_eq!(serde_json::to_string(&Window::AllTime).unwrap(), "\"all_time\"");
  }

  #[test]
  fn manual_clock_advances() {
    let clock = ManualClock::new(at(0, 2026, 10, 16, 23, 59));
    let before = clock.bounds();
    clock.advance(TimeDelta::minutes(2));
    let after = clock.bounds();
    assert_eq!(after.start_of_day, before.start_of_day + TimeDelta::days(1));
  }
}
