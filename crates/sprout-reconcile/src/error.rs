//! Error types for `sprout-reconcile`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The tag store failed. Fatal to the run; every group already applied
  /// stays committed.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error(transparent)]
  Source(#[from] sprout_sources::Error),

  #[error(transparent)]
  Core(#[from] sprout_core::Error),

  #[error("cannot read master list {}: {source}", path.display())]
  MasterList {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
