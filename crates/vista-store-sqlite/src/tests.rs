//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, TimeZone as _, Utc};
use vista_core::{
  store::AnalyticsStore,
  summary::{PathSummary, WindowedCounts},
  view::NewViewFact,
  window::{Window, WindowBounds},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn view(path: &str, session: &str, at: DateTime<Utc>) -> NewViewFact {
  NewViewFact::new(path, session, at).unwrap()
}

/// Friday 16 October 2026, noon UTC.
fn bounds() -> WindowBounds { WindowBounds::at(&utc(2026, 10, 16, 12, 0, 0)) }

// ─── Fact log ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_assigns_id_and_keeps_fields() {
  let s = store().await;

  let mut input = view("/posts/a", "s1", utc(2026, 10, 16, 9, 0, 0));
  input.title = Some("Post A".into());
  input.referrer = Some("https://example.com/".into());
  input.client_ip = Some("203.0.113.7".into());
  input.user_id = Some(42);

  let fact = s.append(input.clone()).await.unwrap();
  assert_eq!(fact.path, "/posts/a");
  assert_eq!(fact.title.as_deref(), Some("Post A"));
  assert_eq!(fact.user_id, Some(42));
  assert_eq!(fact.created_at, input.created_at);

  let other = s.append(input).await.unwrap();
  assert_ne!(fact.id, other.id);
}

#[tokio::test]
async fn count_views_scoped_and_global() {
  let s = store().await;
  let at = utc(2026, 10, 16, 9, 0, 0);
  s.append(view("/posts/a", "s1", at)).await.unwrap();
  s.append(view("/posts/a", "s2", at)).await.unwrap();
  s.append(view("/posts/b", "s1", at)).await.unwrap();

  assert_eq!(s.count_views(Some("/posts/a"), None).await.unwrap(), 2);
  assert_eq!(s.count_views(Some("/posts/b"), None).await.unwrap(), 1);
  assert_eq!(s.count_views(Some("/missing"), None).await.unwrap(), 0);
  assert_eq!(s.count_views(None, None).await.unwrap(), 3);
}

#[tokio::test]
async fn count_views_since_is_inclusive() {
  let s = store().await;
  let boundary = utc(2026, 10, 16, 0, 0, 0);
  s.append(view("/p", "s1", boundary - TimeDelta::seconds(1))).await.unwrap();
  s.append(view("/p", "s1", boundary)).await.unwrap();
  s.append(view("/p", "s1", boundary + TimeDelta::hours(3))).await.unwrap();

  assert_eq!(s.count_views(Some("/p"), Some(boundary)).await.unwrap(), 2);
  assert_eq!(s.count_views(None, Some(boundary)).await.unwrap(), 2);
}

#[tokio::test]
async fn unique_visitors_count_distinct_sessions() {
  let s = store().await;
  let at = utc(2026, 10, 16, 9, 0, 0);
  s.append(view("/p", "same", at)).await.unwrap();
  s.append(view("/p", "same", at)).await.unwrap();
  assert_eq!(s.count_unique_visitors(Some("/p"), None).await.unwrap(), 1);

  s.append(view("/p", "other", at)).await.unwrap();
  assert_eq!(s.count_unique_visitors(Some("/p"), None).await.unwrap(), 2);

  // The same session on another path is one visitor globally.
  s.append(view("/q", "same", at)).await.unwrap();
  assert_eq!(s.count_unique_visitors(None, None).await.unwrap(), 2);
}

#[tokio::test]
async fn last_viewed_at_is_latest_fact() {
  let s = store().await;
  assert_eq!(s.last_viewed_at("/p").await.unwrap(), None);

  let late = utc(2026, 10, 16, 11, 0, 0);
  s.append(view("/p", "s1", late)).await.unwrap();
  s.append(view("/p", "s1", utc(2026, 10, 1, 8, 0, 0))).await.unwrap();

  assert_eq!(s.last_viewed_at("/p").await.unwrap(), Some(late));
}

#[tokio::test]
async fn tally_matches_individual_queries() {
  let s = store().await;
  let b = bounds();
  // Today, this week (Tuesday), this month (October 2nd), last month.
  s.append(view("/p", "s1", utc(2026, 10, 16, 8, 0, 0))).await.unwrap();
  s.append(view("/p", "s2", utc(2026, 10, 13, 8, 0, 0))).await.unwrap();
  s.append(view("/p", "s2", utc(2026, 10, 2, 8, 0, 0))).await.unwrap();
  s.append(view("/p", "s3", utc(2026, 9, 20, 8, 0, 0))).await.unwrap();
  s.append(view("/other", "s9", utc(2026, 10, 16, 8, 0, 0))).await.unwrap();

  let t = s.tally(Some("/p"), &b).await.unwrap();
  assert_eq!(
    t,
    WindowedCounts {
      total_views:                4,
      views_today:                1,
      views_this_week:            2,
      views_this_month:           3,
      unique_visitors_total:      3,
      unique_visitors_today:      1,
      unique_visitors_this_week:  2,
      unique_visitors_this_month: 2,
      last_viewed_at:             Some(utc(2026, 10, 16, 8, 0, 0)),
    }
  );

  for w in [Window::Today, Window::ThisWeek, Window::ThisMonth, Window::AllTime] {
    assert_eq!(
      t.views(w),
      s.count_views(Some("/p"), b.since(w)).await.unwrap(),
      "views {w}"
    );
    assert_eq!(
      t.unique_visitors(w),
      s.count_unique_visitors(Some("/p"), b.since(w)).await.unwrap(),
      "unique {w}"
    );
  }

  let global = s.tally(None, &b).await.unwrap();
  assert_eq!(global.total_views, 5);
  assert_eq!(global.unique_visitors_today, 2);
}

#[tokio::test]
async fn tally_of_unknown_path_is_zero() {
  let s = store().await;
  let t = s.tally(Some("/never"), &bounds()).await.unwrap();
  assert_eq!(t, WindowedCounts::default());
}

#[tokio::test]
async fn distinct_paths_lists_each_path_once() {
  let s = store().await;
  let at = utc(2026, 10, 16, 9, 0, 0);
  s.append(view("/b", "s1", at)).await.unwrap();
  s.append(view("/a", "s1", at)).await.unwrap();
  s.append(view("/b", "s2", at)).await.unwrap();

  assert_eq!(s.distinct_paths().await.unwrap(), vec!["/a", "/b"]);
}

#[tokio::test]
async fn daily_views_group_by_local_date() {
  let s = store().await;
  // 23:30 UTC on the 14th is already the 15th at UTC+2.
  s.append(view("/p", "s1", utc(2026, 10, 14, 23, 30, 0))).await.unwrap();
  s.append(view("/p", "s1", utc(2026, 10, 15, 10, 0, 0))).await.unwrap();
  s.append(view("/p", "s1", utc(2026, 10, 16, 10, 0, 0))).await.unwrap();
  s.append(view("/q", "s1", utc(2026, 10, 16, 10, 0, 0))).await.unwrap();

  let since = utc(2026, 10, 1, 0, 0, 0);
  let days = s.daily_views(Some("/p"), since, 7200).await.unwrap();
  let got: Vec<_> = days.iter().map(|d| (d.date, d.views)).collect();
  assert_eq!(
    got,
    vec![
      (NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(), 1),
      (NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(), 2),
    ]
  );

  let all = s.daily_views(None, since, 0).await.unwrap();
  assert_eq!(all.len(), 3);
  assert_eq!(all[0].views, 2);
}

// ─── Summary rows ────────────────────────────────────────────────────────────

fn summary(path: &str, total: u64, today: u64) -> PathSummary {
  PathSummary {
    path:        path.into(),
    counts:      WindowedCounts {
      total_views: total,
      views_today: today,
      views_this_week: today,
      views_this_month: today,
      unique_visitors_total: total,
      last_viewed_at: Some(utc(2026, 10, 16, 9, 0, 0)),
      ..Default::default()
    },
    computed_at: utc(2026, 10, 16, 12, 0, 0),
  }
}

#[tokio::test]
async fn get_summary_missing_returns_none() {
  let s = store().await;
  assert!(s.get_summary("/nothing").await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_creates_then_overwrites() {
  let s = store().await;

  s.upsert_summary(summary("/p", 3, 1)).await.unwrap();
  let first = s.get_summary("/p").await.unwrap().unwrap();
  assert_eq!(first, summary("/p", 3, 1));

  let mut next = summary("/p", 5, 2);
  next.counts.last_viewed_at = None;
  s.upsert_summary(next.clone()).await.unwrap();

  assert_eq!(s.get_summary("/p").await.unwrap().unwrap(), next);
  assert_eq!(s.summary_paths().await.unwrap(), vec!["/p"]);
}

#[tokio::test]
async fn concurrent_first_upserts_leave_one_row() {
  let s = Arc::new(store().await);

  let mut handles = Vec::new();
  for i in 1..=8 {
    let s = Arc::clone(&s);
    handles.push(tokio::spawn(async move {
      s.upsert_summary(summary("/fresh", i, 0)).await
    }));
  }
  for h in handles {
    h.await.unwrap().unwrap();
  }

  assert_eq!(s.summary_paths().await.unwrap(), vec!["/fresh"]);
  let row = s.get_summary("/fresh").await.unwrap().unwrap();
  assert!((1..=8).contains(&row.counts.total_views));
}

#[tokio::test]
async fn top_summaries_order_by_window_then_path() {
  let s = store().await;
  s.upsert_summary(summary("/b", 10, 1)).await.unwrap();
  s.upsert_summary(summary("/a", 10, 5)).await.unwrap();
  s.upsert_summary(summary("/c", 20, 0)).await.unwrap();

  let all: Vec<_> = s
    .top_summaries(Window::AllTime, 10)
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.path)
    .collect();
  assert_eq!(all, vec!["/c", "/a", "/b"]);

  let today: Vec<_> = s
    .top_summaries(Window::Today, 2)
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.path)
    .collect();
  assert_eq!(today, vec!["/a", "/b"]);

  assert!(s.top_summaries(Window::ThisWeek, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn summary_totals_sum_columns() {
  let s = store().await;
  assert_eq!(s.summary_totals().await.unwrap(), WindowedCounts::default());

  s.upsert_summary(summary("/a", 3, 1)).await.unwrap();
  let mut b = summary("/b", 1, 1);
  b.counts.last_viewed_at = Some(utc(2026, 10, 16, 11, 0, 0));
  s.upsert_summary(b).await.unwrap();

  let totals = s.summary_totals().await.unwrap();
  assert_eq!(totals.total_views, 4);
  assert_eq!(totals.views_today, 2);
  assert_eq!(totals.unique_visitors_total, 4);
  assert_eq!(totals.last_viewed_at, Some(utc(2026, 10, 16, 11, 0, 0)));
}

#[tokio::test]
async fn store_reopens_from_file() {
  let dir = std::env::temp_dir().join(format!("vista-{}", uuid::Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("vista.db");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.append(view("/p", "s1", utc(2026, 10, 16, 9, 0, 0))).await.unwrap();
  }

  let s = SqliteStore::open(&path).await.unwrap();
  assert_eq!(s.count_views(Some("/p"), None).await.unwrap(), 1);

  let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn window_bounds_in_other_zone_shift_today() {
  let s = store().await;
  // 22:30 UTC on the 15th is 00:30 on the 16th at UTC+2.
  s.append(view("/p", "s1", utc(2026, 10, 15, 22, 30, 0))).await.unwrap();

  let tz = FixedOffset::east_opt(7200).unwrap();
  let local = WindowBounds::at(&tz.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap());
  let in_utc = bounds();

  assert_eq!(s.tally(Some("/p"), &local).await.unwrap().views_today, 1);
  assert_eq!(s.tally(Some("/p"), &in_utc).await.unwrap().views_today, 0);
}
