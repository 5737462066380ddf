//! Vista analytics server.
//!
//! Configuration, router assembly and the helpers the `vista-server` binary
//! is built from.

use std::path::{Path, PathBuf};

use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use vista_core::store::AnalyticsStore;
use vista_engine::{Pipeline, config::EngineConfig};

/// Prefix of environment variables overriding the configuration file.
pub const ENV_PREFIX: &str = "VISTA";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and the
/// environment.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub engine:     EngineConfig,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/vista/vista.db") }

/// Layer `VISTA_*` environment variables over the optional file at `path`.
///
/// Nested keys are separated by `__`, e.g. `VISTA_ENGINE__WORKERS=8`.
pub fn load_config(path: &Path) -> Result<ServerConfig, config::ConfigError> {
  build_config(
    config::File::from(path).required(false),
    env_source(),
  )
}

fn env_source() -> config::Environment {
  config::Environment::with_prefix(ENV_PREFIX)
    .prefix_separator("_")
    .separator("__")
    .try_parsing(true)
}

fn build_config<F>(
  file: F,
  env: config::Environment,
) -> Result<ServerConfig, config::ConfigError>
where
  F: config::Source + Send + Sync + 'static,
{
  config::Config::builder()
    .add_source(file)
    .add_source(env)
    .build()?
    .try_deserialize()
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full HTTP surface: admin reads under `/admin/analytics` and ingest at
/// `/events`.
pub fn router<S>(pipeline: &Pipeline<S>) -> Router
where
  S: AnalyticsStore + 'static,
{
  Router::new()
    .nest("/admin/analytics", vista_api::analytics_router(pipeline.query()))
    .merge(vista_api::ingest_router(pipeline.capture()))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use tower::ServiceExt as _;
  use vista_core::window::SystemClock;
  use vista_engine::{capture::CapturePolicy, channel::OverflowPolicy, reconcile::ReconcileScope};
  use vista_store_sqlite::SqliteStore;

  use super::*;

  fn from_toml(
    toml: &str,
    env: &[(&str, &str)],
  ) -> Result<ServerConfig, config::ConfigError> {
    let vars = env
      .iter()
      .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
      .collect();
    build_config(
      config::File::from_str(toml, config::FileFormat::Toml),
      env_source().source(Some(vars)),
    )
  }

  #[test]
  fn empty_config_uses_defaults() {
    let cfg = from_toml("", &[]).unwrap();
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.engine, EngineConfig::default());
  }

  #[test]
  fn file_and_environment_layer() {
    let cfg = from_toml(
      r#"
        port       = 9000
        store_path = "/var/lib/vista/vista.db"

        [engine]
        channel_capacity = 64
        overflow         = { kind = "block", millis = 5 }

        [engine.reconcile]
        scope = "log_paths"

        [engine.capture]
        excluded_paths = ["/health"]
      "#,
      &[
        ("VISTA_PORT", "9100"),
        ("VISTA_ENGINE__WORKERS", "8"),
        ("VISTA_ENGINE__RECONCILE__INTERVAL_SECS", "0"),
      ],
    )
    .unwrap();

    assert_eq!(cfg.port, 9100);
    assert_eq!(cfg.store_path, PathBuf::from("/var/lib/vista/vista.db"));
    assert_eq!(cfg.engine.channel_capacity, 64);
    assert_eq!(cfg.engine.workers, 8);
    assert_eq!(cfg.engine.overflow, OverflowPolicy::Block { millis: 5 });
    assert_eq!(cfg.engine.reconcile.interval(), None);
    assert_eq!(cfg.engine.reconcile.scope, ReconcileScope::LogPaths);
    assert_eq!(cfg.engine.capture.excluded_paths, vec!["/health"]);
    assert_eq!(
      cfg.engine.capture.excluded_prefixes,
      CapturePolicy::default().excluded_prefixes
    );
  }

  #[test]
  fn tilde_expands_to_home() {
    let plain = Path::new("/tmp/vista.db");
    assert_eq!(expand_tilde(plain), plain);
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(
        expand_tilde(Path::new("~/vista.db")),
        PathBuf::from(home).join("vista.db")
      );
    }
  }

  #[tokio::test]
  async fn routes_are_mounted() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let mut engine = EngineConfig::default();
    engine.reconcile.interval_secs = 0;
    let pipeline = Pipeline::start(store, Arc::new(SystemClock), &engine);
    let app = router(&pipeline);

    let event = Request::builder()
      .method("POST")
      .uri("/events")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(
        r#"{"method":"GET","status":200,"path":"/posts/a","session_id":"s1"}"#,
      ))
      .unwrap();
    let resp = app.clone().oneshot(event).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let totals = Request::builder()
      .uri("/admin/analytics/totals")
      .body(Body::empty())
      .unwrap();
    let resp = app.oneshot(totals).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    assert_eq!(pipeline.shutdown().await.unwrap(), 1);
  }
}
