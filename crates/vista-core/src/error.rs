//! Error types for `vista-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown window: {0:?}")]
  UnknownWindow(String),

  #[error("view fact path must not be empty")]
  EmptyPath,

  #[error("view fact session id must not be empty")]
  EmptySession,

  #[error("view fact session id is {0} characters, longer than {max}", max = crate::view::MAX_SESSION_ID_LEN)]
  SessionTooLong(usize),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
