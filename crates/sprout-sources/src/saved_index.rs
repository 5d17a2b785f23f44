//! The saved-label index: one entry per bitmap the user explicitly saved.

use std::{collections::BTreeMap, path::PathBuf};

use serde::Deserialize;
use serde_json::Value;
use sprout_core::{provenance::SourceKind, tag::Offset};

use crate::{
  Result,
  json::{self, RawTemplate},
  record::{RecordStream, Source, SourceItem, SourceRecord},
  time,
};

#[derive(Debug, Deserialize)]
struct RawSaved {
  formdata:          BTreeMap<String, Value>,
  #[serde(default)]
  label_template:    Option<RawTemplate>,
  #[serde(default)]
  offset_adjustment: Option<Offset>,
  #[serde(default)]
  filepath:          Option<String>,
  #[serde(default)]
  date_created:      Option<String>,
  #[serde(default)]
  session_id:        Option<String>,
}

#[derive(Debug, Clone)]
pub struct SavedIndexSource {
  path: PathBuf,
}

impl SavedIndexSource {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

impl Source for SavedIndexSource {
  fn kind(&self) -> SourceKind { SourceKind::SavedIndex }

  fn scan(self: Box<Self>) -> Result<RecordStream> {
    let items = json::read_array(&self.path)?;
    Ok(Box::new(items.into_iter().enumerate().map(|(position, value)| {
      match convert(position, value) {
        Ok(record) => SourceItem::Record(record),
        Err(reason) => SourceItem::Malformed { position, reason },
      }
    })))
  }
}

fn convert(position: usize, value: Value) -> Result<SourceRecord, String> {
  let raw: RawSaved = json::entry(value)?;
  let formdata = json::formdata(raw.formdata)?;
  if formdata.is_blank() {
    return Err("empty formdata".into());
  }

  let mut record =
    SourceRecord::new(SourceKind::SavedIndex, position, formdata);
  record.offset =
    json::offset_spec(raw.offset_adjustment, raw.label_template.as_ref());
  record.template = raw.label_template.and_then(|t| t.label);
  record.image = raw.filepath.filter(|p| !p.trim().is_empty());
  record.occurred_at =
    raw.date_created.as_deref().and_then(time::parse_timestamp);
  record.session_id = raw.session_id;
  Ok(record)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::record::OffsetSpec;

  fn scan(body: &str) -> Vec<SourceItem> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saved-label-index.json");
    std::fs::write(&path, body).unwrap();
    Box::new(SavedIndexSource::new(&path)).scan().unwrap().collect()
  }

  #[test]
  fn reads_current_and_legacy_entries() {
    let items = scan(
      r#"[
        {"formdata":{"main_text":"Tomato","midtext":"Cherokee Purple"},
         "offset_adjustment":[5,-2],
         "label_template":{"label":"default","offsets":[50,-20]},
         "filepath":"/labels/label_tomato_cherokee-purple_20240309-101112.png",
         "date_created":"2024-03-09T10:11:12.000123",
         "session_id":"s-1"},
        {"formdata":{"main_text":"Basil"},
         "label_template":{"label":"default","offsets":[55,-22]},
         "filepath":"/labels/label_basil_20240309-101113.png"}
      ]"#,
    );
    assert_eq!(items.len(), 2);

    let SourceItem::Record(first) = &items[0] else { panic!("malformed") };
    assert_eq!(first.source, SourceKind::SavedIndex);
    assert_eq!(first.template.as_deref(), Some("default"));
    assert_eq!(first.offset, OffsetSpec::Explicit {
      adjustment: Offset::new(5, -2),
      base:       Some(Offset::new(50, -20)),
    });
    assert_eq!(first.copies, None);
    assert_eq!(first.session_id.as_deref(), Some("s-1"));
    assert_eq!(
      first.occurred_at.map(|t| t.timestamp()),
      Some(chrono::Utc.with_ymd_and_hms(2024, 3, 9, 10, 11, 12).unwrap().timestamp())
    );

    let SourceItem::Record(second) = &items[1] else { panic!("malformed") };
    assert_eq!(second.offset, OffsetSpec::Legacy {
      template_offsets: Offset::new(55, -22),
    });
    assert_eq!(second.occurred_at, None);
  }

  #[test]
  fn bad_entries_are_malformed_not_fatal() {
    let items = scan(
      r#"[
        {"formdata":{"main_text":""}},
        {"no_formdata":true},
        "just a string",
        {"formdata":{"main_text":"Kale"}}
      ]"#,
    );
    let malformed: Vec<_> = items
      .iter()
      .filter_map(|i| match i {
        SourceItem::Malformed { position, .. } => Some(*position),
        SourceItem::Record(_) => None,
      })
      .collect();
    assert_eq!(malformed, vec![0, 1, 2]);
    assert!(matches!(&items[3], SourceItem::Record(r) if r.position == 3));
  }

  #[test]
  fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = Box::new(SavedIndexSource::new(dir.path().join("none.json")))
      .scan()
      .err()
      .unwrap();
    assert!(err.is_skippable());
  }
}
