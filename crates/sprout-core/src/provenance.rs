//! Where a piece of tag information came from, and how far it is trusted.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// One of the four historical record sources, in descending trust order.
///
/// Live saves count as [`SourceKind::SavedIndex`] and live prints as
/// [`SourceKind::PrintLog`]; they are the same actions that produced those
/// files in the first place.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
  SavedIndex,
  PrintLog,
  CuratedList,
  RawHistory,
}

impl SourceKind {
  /// Every source, highest trust first. This is the merge order.
  pub const TRUST_ORDER: [SourceKind; 4] = [
    Self::SavedIndex,
    Self::PrintLog,
    Self::CuratedList,
    Self::RawHistory,
  ];

  /// Larger is more trusted.
  pub fn trust(self) -> u8 {
    match self {
      Self::SavedIndex => 4,
      Self::PrintLog => 3,
      Self::CuratedList => 2,
      Self::RawHistory => 1,
    }
  }

  /// Records from this source are confirmed on import alone.
  pub fn confirms_on_import(self) -> bool { matches!(self, Self::SavedIndex) }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::SavedIndex => "saved_index",
      Self::PrintLog => "print_log",
      Self::CuratedList => "curated_list",
      Self::RawHistory => "raw_history",
    }
  }
}

impl fmt::Display for SourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SourceKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "saved_index" => Ok(Self::SavedIndex),
      "print_log" => Ok(Self::PrintLog),
      "curated_list" => Ok(Self::CuratedList),
      "raw_history" => Ok(Self::RawHistory),
      other => Err(Error::UnknownSourceKind(other.to_owned())),
    }
  }
}
