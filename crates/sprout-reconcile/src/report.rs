//! The audit summary of a reconciliation run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sprout_core::{identity::ContentIdentity, provenance::SourceKind, tag::TagId};

/// How far a source got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SourceStatus {
  Scanned,
  Missing,
  Unreadable(String),
}

/// Counts for one source. `read = imported + duplicates + discarded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
  pub source:                 SourceKind,
  #[serde(flatten)]
  pub status:                 SourceStatus,
  pub read:                   usize,
  /// Records that created a new tag.
  pub imported:               usize,
  /// Well-formed records folded into an existing or just-created tag.
  pub duplicates:             usize,
  /// Malformed rows.
  pub discarded:              usize,
  pub events_added:           usize,
  pub events_already_present: usize,
  /// Groups that ended up with an image candidate.
  pub images_resolved:        usize,
  pub images_missing:         usize,
}

impl SourceReport {
  pub fn new(source: SourceKind) -> Self {
    Self {
      source,
      status: SourceStatus::Scanned,
      read: 0,
      imported: 0,
      duplicates: 0,
      discarded: 0,
      events_added: 0,
      events_already_present: 0,
      images_resolved: 0,
      images_missing: 0,
    }
  }

  pub fn is_balanced(&self) -> bool {
    self.read == self.imported + self.duplicates + self.discarded
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictField {
  ImagePath,
}

/// Which value survived a disagreement, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
  /// The stored value came from an equally or more trusted source.
  KeptStored,
  /// The incoming source is more trusted than the stored value's source.
  ReplacedByTrust,
  /// Records of one group disagreed; the representative record's value won.
  KeptRepresentative,
}

/// A field-level disagreement between records of one logical tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
  pub content:    ContentIdentity,
  pub tag_id:     TagId,
  pub field:      ConflictField,
  pub kept:       String,
  pub rejected:   String,
  /// The source whose records were being merged.
  pub source:     SourceKind,
  pub resolution: Resolution,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
  pub started_at:  DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub sources:     Vec<SourceReport>,
  pub conflicts:   Vec<Conflict>,
}

impl ReconcileReport {
  pub fn source(&self, kind: SourceKind) -> Option<&SourceReport> {
    self.sources.iter().find(|s| s.source == kind)
  }

  pub fn total_imported(&self) -> usize {
    self.sources.iter().map(|s| s.imported).sum()
  }

  pub fn total_events_added(&self) -> usize {
    self.sources.iter().map(|s| s.events_added).sum()
  }
}

impl fmt::Display for SourceStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Scanned => f.write_str("scanned"),
      Self::Missing => f.write_str("missing"),
      Self::Unreadable(reason) => write!(f, "unreadable: {reason}"),
    }
  }
}

impl fmt::Display for ReconcileReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
      f,
      "reconciliation {} .. {}",
      self.started_at.format("%Y-%m-%d %H:%M:%S"),
      self.finished_at.format("%H:%M:%S")
    )?;
    writeln!(
      f,
      "{:<14} {:>6} {:>8} {:>6} {:>9} {:>7} {:>7} {:>7} {:>7}",
      "source", "read", "imported", "dups", "discarded", "events", "present",
      "images", "no-img"
    )?;
    for s in &self.sources {
      if s.status != SourceStatus::Scanned {
        writeln!(f, "{:<14} {}", s.source.as_str(), s.status)?;
        continue;
      }
      writeln!(
        f,
        "{:<14} {:>6} {:>8} {:>6} {:>9} {:>7} {:>7} {:>7} {:>7}",
        s.source.as_str(),
        s.read,
        s.imported,
        s.duplicates,
        s.discarded,
        s.events_added,
        s.events_already_present,
        s.images_resolved,
        s.images_missing
      )?;
    }
    if self.conflicts.is_empty() {
      return writeln!(f, "no conflicts");
    }
    writeln!(f, "{} conflict(s):", self.conflicts.len())?;
    for c in &self.conflicts {
      writeln!(
        f,
        "  {} [{}] {:?} from {}: kept {:?}, rejected {:?}",
        c.tag_id,
        c.content.short(),
        c.resolution,
        c.source,
        c.kept,
        c.rejected
      )?;
    }
    Ok(())
  }
}
