//! The intermediate record shape every adapter produces, and the `Source`
//! trait adapters implement.

use chrono::{DateTime, Utc};
use sprout_core::{
  provenance::SourceKind,
  tag::{Copies, Formdata, Offset},
};

use crate::Result;

/// How a record describes its offset adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetSpec {
  /// The nudge is recorded on its own; `base` is the template's offsets as
  /// stored alongside, when present.
  Explicit { adjustment: Offset, base: Option<Offset> },
  /// Older records baked the nudge into the template offsets.
  Legacy { template_offsets: Offset },
  /// No offset information at all.
  Absent,
}

/// One well-formed entry of a source, before normalisation.
#[derive(Debug, Clone)]
pub struct SourceRecord {
  pub source:      SourceKind,
  /// Zero-based position of the entry inside its source.
  pub position:    usize,
  pub formdata:    Formdata,
  /// Template name, when the source records one.
  pub template:    Option<String>,
  pub offset:      OffsetSpec,
  /// Image path as recorded by the source.
  pub image:       Option<String>,
  pub occurred_at: Option<DateTime<Utc>>,
  /// Copies printed, for entries that stand for a print action.
  pub copies:      Option<Copies>,
  pub session_id:  Option<String>,
}

impl SourceRecord {
  /// A record with only formdata; the remaining fields start empty.
  pub fn new(source: SourceKind, position: usize, formdata: Formdata) -> Self {
    Self {
      source,
      position,
      formdata,
      template: None,
      offset: OffsetSpec::Absent,
      image: None,
      occurred_at: None,
      copies: None,
      session_id: None,
    }
  }
}

/// One item of a source's stream.
#[derive(Debug, Clone)]
pub enum SourceItem {
  Record(SourceRecord),
  /// A row that could not be understood. Counted and skipped.
  Malformed { position: usize, reason: String },
}

/// A lazy, finite, single-pass sequence of items.
pub type RecordStream = Box<dyn Iterator<Item = SourceItem> + Send>;

/// A historical record source.
///
/// `scan` consumes the adapter; a stream cannot be restarted. A missing file
/// yields [`Error::Missing`](crate::Error::Missing) and a file that is
/// unreadable as a whole yields
/// [`Error::Unreadable`](crate::Error::Unreadable).
pub trait Source: Send {
  fn kind(&self) -> SourceKind;

  fn scan(self: Box<Self>) -> Result<RecordStream>;
}
