//! Core types and trait definitions for the Vista page-view analytics engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod error;
pub mod store;
pub mod summary;
pub mod view;
pub mod window;

pub use error::{Error, Result};
