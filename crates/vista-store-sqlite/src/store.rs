//! [`SqliteStore`], the SQLite implementation of [`AnalyticsStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use vista_core::{
  store::AnalyticsStore,
  summary::{DailyViews, PathSummary, WindowedCounts},
  view::{NewViewFact, ViewFact},
  window::{Window, WindowBounds},
};

use crate::{
  encode::{
    RawCounts, RawDailyViews, RawSummary, decode_count, decode_dt, encode_count,
    encode_dt, encode_offset_modifier, encode_uuid, views_column,
  },
  schema::SCHEMA,
  Result,
};

/// `WHERE` fragment scoping a fact query to `?1`, or to every path when the
/// bound value is `NULL`. Kept as two literals so the path index stays usable.
fn path_filter(path: Option<&str>) -> &'static str {
  if path.is_some() { "path = ?1" } else { "?1 IS NULL" }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vista analytics store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "opened analytics store");
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a single-value `COUNT` query over `view_facts`.
  async fn count_facts(
    &self,
    select: &'static str,
    path: Option<&str>,
    since: Option<DateTime<Utc>>,
  ) -> Result<u64> {
    let sql = format!(
      "SELECT {select} FROM view_facts
       WHERE {} AND (?2 IS NULL OR created_at >= ?2)",
      path_filter(path),
    );
    let path_owned = path.map(str::to_owned);
    let since_str = since.map(encode_dt);

    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &sql,
          rusqlite::params![path_owned, since_str],
          |row| row.get(0),
        )?)
      })
      .await?;

    Ok(decode_count(n))
  }
}

// ─── AnalyticsStore impl ─────────────────────────────────────────────────────

impl AnalyticsStore for SqliteStore {
  type Error = crate::Error;

  // ── Fact log ──────────────────────────────────────────────────────────────

  async fn append(&self, input: NewViewFact) -> Result<ViewFact> {
    let fact = input.into_fact(Uuid::new_v4());

    let fact_id_str    = encode_uuid(fact.id);
    let path           = fact.path.clone();
    let title          = fact.title.clone();
    let referrer       = fact.referrer.clone();
    let user_agent     = fact.user_agent.clone();
    let client_ip      = fact.client_ip.clone();
    let session_id     = fact.session_id.clone();
    let user_id        = fact.user_id;
    let created_at_str = encode_dt(fact.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO view_facts (
             fact_id, path, title, referrer, user_agent,
             client_ip, session_id, user_id, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            fact_id_str,
            path,
            title,
            referrer,
            user_agent,
            client_ip,
            session_id,
            user_id,
            created_at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(fact)
  }

  async fn count_views(
    &self,
    path:  Option<&str>,
    since: Option<DateTime<Utc>>,
  ) -> Result<u64> {
    self.count_facts("COUNT(*)", path, since).await
  }

  async fn count_unique_visitors(
    &self,
    path:  Option<&str>,
    since: Option<DateTime<Utc>>,
  ) -> Result<u64> {
    self.count_facts("COUNT(DISTINCT session_id)", path, since).await
  }

  async fn last_viewed_at(&self, path: &str) -> Result<Option<DateTime<Utc>>> {
    let path = path.to_owned();

    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT MAX(created_at) FROM view_facts WHERE path = ?1",
          rusqlite::params![path],
          |row| row.get(0),
        )?)
      })
      .await?;

    raw.as_deref().map(decode_dt).transpose()
  }

  async fn tally(
    &self,
    path:   Option<&str>,
    bounds: &WindowBounds,
  ) -> Result<WindowedCounts> {
    // One statement, so every counter comes from the same snapshot.
    let sql = format!(
      "SELECT
         COUNT(*),
         COUNT(CASE WHEN created_at >= ?2 THEN 1 END),
         COUNT(CASE WHEN created_at >= ?3 THEN 1 END),
         COUNT(CASE WHEN created_at >= ?4 THEN 1 END),
         COUNT(DISTINCT session_id),
         COUNT(DISTINCT CASE WHEN created_at >= ?2 THEN session_id END),
         COUNT(DISTINCT CASE WHEN created_at >= ?3 THEN session_id END),
         COUNT(DISTINCT CASE WHEN created_at >= ?4 THEN session_id END),
         MAX(created_at)
       FROM view_facts
       WHERE {}",
      path_filter(path),
    );
    let path_owned = path.map(str::to_owned);
    let day_str    = encode_dt(bounds.start_of_day);
    let week_str   = encode_dt(bounds.start_of_week);
    let month_str  = encode_dt(bounds.start_of_month);

    let raw: RawCounts = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &sql,
          rusqlite::params![path_owned, day_str, week_str, month_str],
          |row| RawCounts::from_row(row, 0),
        )?)
      })
      .await?;

    raw.into_counts()
  }

  async fn distinct_paths(&self) -> Result<Vec<String>> {
    let paths = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT DISTINCT path FROM view_facts ORDER BY path")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(paths)
  }

  async fn daily_views(
    &self,
    path:            Option<&str>,
    since:           DateTime<Utc>,
    utc_offset_secs: i32,
  ) -> Result<Vec<DailyViews>> {
    let sql = format!(
      "SELECT date(created_at, ?3) AS day, COUNT(*)
       FROM view_facts
       WHERE {} AND created_at >= ?2
       GROUP BY day
       ORDER BY day DESC",
      path_filter(path),
    );
    let path_owned = path.map(str::to_owned);
    let since_str  = encode_dt(since);
    let modifier   = encode_offset_modifier(utc_offset_secs);

    let raws: Vec<RawDailyViews> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![path_owned, since_str, modifier],
            |row| {
              Ok(RawDailyViews {
                date:  row.get(0)?,
                views: row.get(1)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDailyViews::into_daily).collect()
  }

  // ── Summary rows ──────────────────────────────────────────────────────────

  async fn get_summary(&self, path: &str) -> Result<Option<PathSummary>> {
    let sql = format!(
      "SELECT {} FROM path_summaries WHERE path = ?1",
      RawSummary::COLUMNS,
    );
    let path = path.to_owned();

    let raw: Option<RawSummary> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![path], RawSummary::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSummary::into_summary).transpose()
  }

  async fn upsert_summary(&self, summary: PathSummary) -> Result<()> {
    let c = summary.counts;
    let counts = [
      c.total_views,
      c.views_today,
      c.views_this_week,
      c.views_this_month,
      c.unique_visitors_total,
      c.unique_visitors_today,
      c.unique_visitors_this_week,
      c.unique_visitors_this_month,
    ]
    .map(encode_count);
    let last_viewed_str = c.last_viewed_at.map(encode_dt);
    let computed_str    = encode_dt(summary.computed_at);
    let path            = summary.path;

    // A racing first insert for the same path merges into an update instead
    // of violating the primary key.
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO path_summaries (
             path,
             total_views, views_today, views_this_week, views_this_month,
             unique_visitors_total, unique_visitors_today,
             unique_visitors_this_week, unique_visitors_this_month,
             last_viewed_at, computed_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT(path) DO UPDATE SET
             total_views                = excluded.total_views,
             views_today                = excluded.views_today,
             views_this_week            = excluded.views_this_week,
             views_this_month           = excluded.views_this_month,
             unique_visitors_total      = excluded.unique_visitors_total,
             unique_visitors_today      = excluded.unique_visitors_today,
             unique_visitors_this_week  = excluded.unique_visitors_this_week,
             unique_visitors_this_month = excluded.unique_visitors_this_month,
             last_viewed_at             = excluded.last_viewed_at,
             computed_at                = excluded.computed_at",
          rusqlite::params![
            path,
            counts[0],
            counts[1],
            counts[2],
            counts[3],
            counts[4],
            counts[5],
            counts[6],
            counts[7],
            last_viewed_str,
            computed_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  async fn summary_paths(&self) -> Result<Vec<String>> {
    let paths = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT path FROM path_summaries ORDER BY path")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(paths)
  }

  async fn top_summaries(
    &self,
    window: Window,
    limit:  usize,
  ) -> Result<Vec<PathSummary>> {
    let sql = format!(
      "SELECT {} FROM path_summaries
       ORDER BY {} DESC, path ASC
       LIMIT ?1",
      RawSummary::COLUMNS,
      views_column(window),
    );
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawSummary> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], RawSummary::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSummary::into_summary).collect()
  }

  async fn summary_totals(&self) -> Result<WindowedCounts> {
    let raw: RawCounts = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             SUM(total_views), SUM(views_today),
             SUM(views_this_week), SUM(views_this_month),
             SUM(unique_visitors_total), SUM(unique_visitors_today),
             SUM(unique_visitors_this_week), SUM(unique_visitors_this_month),
             MAX(last_viewed_at)
           FROM path_summaries",
          [],
          |row| RawCounts::from_row(row, 0),
        )?)
      })
      .await?;

    raw.into_counts()
  }
}
