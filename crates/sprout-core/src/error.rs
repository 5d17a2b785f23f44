//! Error types for `sprout-core`.

use thiserror::Error;

use crate::tag::TagId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("tag not found: {0}")]
  TagNotFound(TagId),

  #[error("copies must be a positive integer, got {0}")]
  InvalidCopies(i64),

  #[error("invalid identity digest: {0:?}")]
  InvalidDigest(String),

  #[error("unknown source kind: {0:?}")]
  UnknownSourceKind(String),

  #[error("session not found: {0}")]
  SessionNotFound(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
