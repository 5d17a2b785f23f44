//! Error types for `sprout-sources`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The source file does not exist. The source is skipped.
  #[error("source file not found: {}", .0.display())]
  Missing(PathBuf),

  /// The file exists but is not valid at the container level (not a JSON
  /// array, CSV without a header, unreadable bytes). The source is skipped.
  #[error("cannot read {}: {reason}", path.display())]
  Unreadable { path: PathBuf, reason: String },

  #[error("I/O error on {}: {source}", path.display())]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("core error: {0}")]
  Core(#[from] sprout_core::Error),
}

impl Error {
  /// Map a failed open or read of `path` to `Missing` or `Unreadable`.
  pub(crate) fn from_read(path: &std::path::Path, e: std::io::Error) -> Self {
    if e.kind() == std::io::ErrorKind::NotFound {
      Self::Missing(path.to_owned())
    } else {
      Self::Unreadable { path: path.to_owned(), reason: e.to_string() }
    }
  }

  /// True for the two outcomes that skip a source without failing the run.
  pub fn is_skippable(&self) -> bool {
    matches!(self, Self::Missing(_) | Self::Unreadable { .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
