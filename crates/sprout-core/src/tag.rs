//! Tag types: a logical plant label and its print history.
//!
//! The identity-bearing part of a tag ([`TagContent`]) is fixed once the tag
//! exists; changing any of it conceptually produces a different tag. The rest
//! only grows: print events are appended and `confirmed` only ever flips from
//! `false` to `true`.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  identity::{self, ContentIdentity, ExactIdentity},
  provenance::SourceKind,
};

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Store-assigned row identifier of a tag.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TagId(pub i64);

impl fmt::Display for TagId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

// ─── Formdata ────────────────────────────────────────────────────────────────

/// What the label says: field name → text, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Formdata(BTreeMap<String, String>);

impl Formdata {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
    self.0.insert(field.into(), value.into());
  }

  pub fn get(&self, field: &str) -> Option<&str> {
    self.0.get(field).map(String::as_str)
  }

  /// The value of `field`, or `""` when absent.
  pub fn text(&self, field: &str) -> &str { self.get(field).unwrap_or("") }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn values(&self) -> impl Iterator<Item = &str> {
    self.0.values().map(String::as_str)
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// True when there are no fields or every value is whitespace.
  pub fn is_blank(&self) -> bool { self.values().all(|v| v.trim().is_empty()) }

  /// Non-empty values in `fields` order, followed by nothing else.
  /// Used for display and for fuzzy matching.
  pub fn display_line(&self, fields: &[String]) -> String {
    fields
      .iter()
      .map(|f| self.text(f).trim())
      .filter(|v| !v.is_empty())
      .collect::<Vec<_>>()
      .join(" ")
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Formdata {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}

// ─── Offset ──────────────────────────────────────────────────────────────────

/// A manual nudge in pixels applied on top of a template's base offsets.
/// Serialised as a two-element array `[dx, dy]`.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Offset {
  pub dx: i32,
  pub dy: i32,
}

impl Offset {
  pub const ZERO: Offset = Offset { dx: 0, dy: 0 };

  pub const fn new(dx: i32, dy: i32) -> Self { Self { dx, dy } }

  /// Component-wise `self - base`.
  pub fn relative_to(self, base: Offset) -> Offset {
    Offset::new(self.dx - base.dx, self.dy - base.dy)
  }
}

impl From<[i32; 2]> for Offset {
  fn from([dx, dy]: [i32; 2]) -> Self { Self { dx, dy } }
}

impl From<Offset> for [i32; 2] {
  fn from(o: Offset) -> Self { [o.dx, o.dy] }
}

impl fmt::Display for Offset {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({}, {})", self.dx, self.dy)
  }
}

// ─── Template reference ──────────────────────────────────────────────────────

/// Which visual template rendered the tag. Only `name` takes part in
/// identity; the base offsets are kept for offset bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
  pub name:         String,
  #[serde(default)]
  pub base_offsets: Offset,
}

impl TemplateRef {
  pub fn named(name: impl Into<String>) -> Self {
    Self { name: name.into(), base_offsets: Offset::ZERO }
  }
}

// ─── Copies ──────────────────────────────────────────────────────────────────

/// A positive number of printed copies.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Copies(u32);

impl Copies {
  pub const ONE: Copies = Copies(1);

  /// Rejects zero, negative, and out-of-range counts.
  pub fn new(n: i64) -> Result<Self> {
    u32::try_from(n)
      .ok()
      .filter(|&n| n > 0)
      .map(Self)
      .ok_or(Error::InvalidCopies(n))
  }

  pub fn get(self) -> u32 { self.0 }

  /// Printing more than one copy at once marks a tag confirmed.
  pub fn confirms(self) -> bool { self.0 > 1 }
}

impl TryFrom<i64> for Copies {
  type Error = Error;

  fn try_from(n: i64) -> Result<Self> { Self::new(n) }
}

impl From<Copies> for i64 {
  fn from(c: Copies) -> Self { i64::from(c.0) }
}

impl fmt::Display for Copies {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ─── Print event ─────────────────────────────────────────────────────────────

/// One print action. Owned by exactly one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintEvent {
  pub copies:      Copies,
  pub occurred_at: DateTime<Utc>,
}

// ─── Tag content ─────────────────────────────────────────────────────────────

/// The identity-bearing, immutable part of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagContent {
  pub formdata: Formdata,
  pub template: TemplateRef,
  pub offset:   Offset,
}

impl TagContent {
  pub fn new(formdata: Formdata, template: TemplateRef, offset: Offset) -> Self {
    Self { formdata, template, offset }
  }

  pub fn content_identity(&self) -> ContentIdentity {
    identity::content_identity(&self.formdata, &self.template.name)
  }

  pub fn exact_identity(&self) -> ExactIdentity {
    identity::exact_identity(&self.formdata, &self.template.name, self.offset)
  }

  /// Same formdata (field-by-field exact string equality) and same template
  /// name. Offsets are ignored.
  pub fn equals_logically(&self, other: &TagContent) -> bool {
    self.formdata == other.formdata && self.template.name == other.template.name
  }

  /// Logically equal and rendered with the same offset adjustment.
  pub fn equals_exactly(&self, other: &TagContent) -> bool {
    self.equals_logically(other) && self.offset == other.offset
  }
}

// ─── Tag ─────────────────────────────────────────────────────────────────────

/// A persisted logical plant label plus its print history.
#[derive(Debug, Clone, Serialize)]
pub struct Tag {
  pub tag_id:       TagId,
  pub content:      TagContent,
  /// Most recent rendered bitmap, if one is known.
  pub image_path:   Option<String>,
  /// Which source supplied `image_path`.
  pub image_source: Option<SourceKind>,
  /// Which source first produced this tag.
  pub origin:       SourceKind,
  pub created_at:   DateTime<Utc>,
  confirmed:        bool,
  print_history:    Vec<PrintEvent>,
}

impl Tag {
  /// Rebuild a tag from persisted parts. A history containing a multi-copy
  /// print yields a confirmed tag even if `confirmed` is `false`.
  #[allow(clippy::too_many_arguments)]
  pub fn restore(
    tag_id: TagId,
    content: TagContent,
    image_path: Option<String>,
    image_source: Option<SourceKind>,
    origin: SourceKind,
    created_at: DateTime<Utc>,
    confirmed: bool,
    print_history: Vec<PrintEvent>,
  ) -> Self {
    let confirmed =
      confirmed || print_history.iter().any(|e| e.copies.confirms());
    Self {
      tag_id,
      content,
      image_path,
      image_source,
      origin,
      created_at,
      confirmed,
      print_history,
    }
  }

  pub fn is_confirmed(&self) -> bool { self.confirmed }

  /// Mark the tag confirmed. There is no way back.
  pub fn confirm(&mut self) { self.confirmed = true; }

  /// Append a print event; more than one copy confirms the tag.
  pub fn record_print(&mut self, copies: Copies, occurred_at: DateTime<Utc>) {
    self.print_history.push(PrintEvent { copies, occurred_at });
    if copies.confirms() {
      self.confirm();
    }
  }

  /// Chronological by insertion, not necessarily by timestamp.
  pub fn print_history(&self) -> &[PrintEvent] { &self.print_history }

  /// Sum of copies over the whole history.
  pub fn total_prints(&self) -> u64 {
    self
      .print_history
      .iter()
      .map(|e| u64::from(e.copies.get()))
      .sum()
  }

  pub fn content_identity(&self) -> ContentIdentity {
    self.content.content_identity()
  }

  pub fn exact_identity(&self) -> ExactIdentity { self.content.exact_identity() }

  pub fn equals_logically(&self, other: &Tag) -> bool {
    self.content.equals_logically(&other.content)
  }

  pub fn equals_exactly(&self, other: &Tag) -> bool {
    self.content.equals_exactly(&other.content)
  }
}

// ─── NewTag ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::TagStore::upsert`]. The id is assigned by the
/// store.
#[derive(Debug, Clone)]
pub struct NewTag {
  pub content:    TagContent,
  pub image_path: Option<String>,
  pub origin:     SourceKind,
  pub created_at: DateTime<Utc>,
  pub confirmed:  bool,
}

impl NewTag {
  /// A tag with no image, confirmed only if `origin` confirms on import.
  pub fn new(
    content: TagContent,
    origin: SourceKind,
    created_at: DateTime<Utc>,
  ) -> Self {
    Self {
      content,
      image_path: None,
      origin,
      created_at,
      confirmed: origin.confirms_on_import(),
    }
  }

  pub fn with_image(mut self, path: impl Into<String>) -> Self {
    self.image_path = Some(path.into());
    self
  }
}
