//! The Vista analytics pipeline.
//!
//! ```text
//! request task                 worker tasks
//! ────────────                 ────────────
//! [Capture] ── send ──► [bounded channel] ──► [Recomputer] ──► summary row
//!                                                  ▲
//!                          [Reconciler] ── timer ──┘
//! [QueryService] ◄── summary rows, or the fact log when no row exists
//! ```
//!
//! Capture builds a fact and hands it off without touching storage. Workers
//! append each fact and re-derive that path's counters from the fact log. The
//! reconciler re-derives every path on a schedule to heal rows left stale by
//! swallowed failures.

pub mod capture;
pub mod channel;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod reconcile;
pub mod recompute;
pub mod shutdown;
pub mod worker;

pub use error::{Error, Result};
pub use pipeline::Pipeline;
