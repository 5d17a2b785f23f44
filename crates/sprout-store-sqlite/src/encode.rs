//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings with microsecond precision
//! so that lexical order is chronological. Formdata, template and offset are
//! stored as compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use sprout_core::{
  provenance::SourceKind,
  tag::{Copies, Formdata, NewTag, Offset, PrintEvent, Tag, TagContent, TagId, TemplateRef},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Search text ─────────────────────────────────────────────────────────────

/// Lowercased formdata values, one per line. Keys are left out so they never
/// match a query.
pub fn search_text(formdata: &Formdata) -> String {
  formdata
    .values()
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join("\n")
}

/// The needle a query is matched with, or `None` for a blank query.
pub fn search_needle(text: &str) -> Option<String> {
  let trimmed = text.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

/// In-memory equivalent of the indexed search predicate.
pub fn matches_needle(tag: &Tag, needle: &str) -> bool {
  tag
    .content
    .formdata
    .values()
    .any(|v| v.to_lowercase().contains(needle))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column values for inserting a [`NewTag`]. Built outside the connection
/// thread so encoding errors surface before any SQL runs.
pub struct TagRow {
  pub content_identity: String,
  pub exact_identity:   String,
  pub formdata:         String,
  pub template:         String,
  pub offset:           String,
  pub image_path:       Option<String>,
  pub image_source:     Option<&'static str>,
  pub origin:           &'static str,
  pub created_at:       String,
  pub confirmed:        bool,
  pub search_text:      String,
}

impl TagRow {
  pub fn encode(tag: &NewTag) -> Result<Self> {
    let content = &tag.content;
    Ok(Self {
      content_identity: content.content_identity().to_hex(),
      exact_identity:   content.exact_identity().to_hex(),
      formdata:         serde_json::to_string(&content.formdata)?,
      template:         serde_json::to_string(&content.template)?,
      offset:           serde_json::to_string(&content.offset)?,
      image_path:       tag.image_path.clone(),
      image_source:     tag.image_path.as_ref().map(|_| tag.origin.as_str()),
      origin:           tag.origin.as_str(),
      created_at:       encode_dt(tag.created_at),
      confirmed:        tag.confirmed,
      search_text:      search_text(&content.formdata),
    })
  }
}

/// Raw strings read directly from a `tags` row, plus its print events.
pub struct RawTag {
  pub tag_id:       i64,
  pub formdata:     String,
  pub template:     String,
  pub offset:       String,
  pub image_path:   Option<String>,
  pub image_source: Option<String>,
  pub origin:       String,
  pub created_at:   String,
  pub confirmed:    bool,
  pub events:       Vec<RawEvent>,
}

/// Raw values of one `print_events` row.
pub struct RawEvent {
  pub copies:      i64,
  pub occurred_at: String,
}

impl RawEvent {
  fn into_event(self) -> Result<PrintEvent> {
    Ok(PrintEvent {
      copies:      Copies::new(self.copies)?,
      occurred_at: decode_dt(&self.occurred_at)?,
    })
  }
}

impl RawTag {
  pub fn into_tag(self) -> Result<Tag> {
    let formdata: Formdata = serde_json::from_str(&self.formdata)?;
    let template: TemplateRef = serde_json::from_str(&self.template)?;
    let offset: Offset = serde_json::from_str(&self.offset)?;

    let image_source = self
      .image_source
      .as_deref()
      .map(str::parse::<SourceKind>)
      .transpose()?;
    let origin: SourceKind = self.origin.parse()?;

    let history = self
      .events
      .into_iter()
      .map(RawEvent::into_event)
      .collect::<Result<Vec<_>>>()?;

    Ok(Tag::restore(
      TagId(self.tag_id),
      TagContent::new(formdata, template, offset),
      self.image_path,
      image_source,
      origin,
      decode_dt(&self.created_at)?,
      self.confirmed,
      history,
    ))
  }
}
