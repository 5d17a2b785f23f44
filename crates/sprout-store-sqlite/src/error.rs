//! Error type for `sprout-store-sqlite`.

use sprout_core::tag::TagId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sprout_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A print event or changeset referenced a tag that does not exist.
  #[error("tag not found: {0}")]
  TagNotFound(TagId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
