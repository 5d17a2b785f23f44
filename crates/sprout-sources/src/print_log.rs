//! The print log: one entry per print action.

use std::{collections::BTreeMap, path::PathBuf};

use serde::Deserialize;
use serde_json::Value;
use sprout_core::{
  provenance::SourceKind,
  tag::{Copies, Offset},
};

use crate::{
  Result,
  json::{self, RawTemplate},
  record::{RecordStream, Source, SourceItem, SourceRecord},
  time,
};

#[derive(Debug, Deserialize)]
struct RawPrint {
  formdata:          BTreeMap<String, Value>,
  #[serde(default)]
  count:             Option<Value>,
  #[serde(default)]
  label_template:    Option<RawTemplate>,
  #[serde(default)]
  offset_adjustment: Option<Offset>,
  #[serde(default)]
  unix_time:         Option<Value>,
  #[serde(default)]
  time:              Option<String>,
  #[serde(default)]
  session_id:        Option<String>,
}

#[derive(Debug, Clone)]
pub struct PrintLogSource {
  path: PathBuf,
}

impl PrintLogSource {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

impl Source for PrintLogSource {
  fn kind(&self) -> SourceKind { SourceKind::PrintLog }

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

/// Absent count means one copy; anything but a positive integer is invalid.
fn copies(count: Option<&Value>) -> Result<Copies, String> {
  let Some(count) = count else { return Ok(Copies::ONE) };
  let n = count
    .as_i64()
    .ok_or_else(|| format!("count {count} is not an integer"))?;
  Copies::new(n).map_err(|e| e.to_string())
}

fn convert(position: usize, value: Value) -> Result<SourceRecord, String> {
  let raw: RawPrint = json::entry(value)?;
  let formdata = json::formdata(raw.formdata)?;
  if formdata.is_blank() {
    return Err("empty formdata".into());
  }
  let copies = copies(raw.count.as_ref())?;
  let occurred_at = raw
    .unix_time
    .as_ref()
    .and_then(json::unix_time)
    .or_else(|| raw.time.as_deref().and_then(time::parse_timestamp))
    .ok_or("no usable timestamp")?;

  let mut record = SourceRecord::new(SourceKind::PrintLog, position, formdata);
  record.offset =
    json::offset_spec(raw.offset_adjustment, raw.label_template.as_ref());
  record.template = raw.label_template.and_then(|t| t.label);
  record.occurred_at = Some(occurred_at);
  record.copies = Some(copies);
  record.session_id = raw.session_id;
  Ok(record)
}
