//! The curated plant list: flat objects, one per label, no template data.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use serde_json::Value;
use sprout_core::provenance::SourceKind;

use crate::{
  Result,
  images::ImageIndex,
  json,
  record::{RecordStream, Source, SourceItem, SourceRecord},
  time,
};

const PATH_KEY: &str = "path";
const DATE_KEY: &str = "date-created";

#[derive(Debug, Clone)]
pub struct PlantListSource {
  path:   PathBuf,
  images: Arc<ImageIndex>,
}

impl PlantListSource {
  /// Recorded image paths are checked against `images`.
  pub fn new(path: impl Into<PathBuf>, images: Arc<ImageIndex>) -> Self {
    Self { path: path.into(), images }
  }
}

impl Source for PlantListSource {
  fn kind(&self) -> SourceKind { SourceKind::CuratedList }

  fn scan(self: Box<Self>) -> Result<RecordStream> {
    let items = json::read_array(&self.path)?;
    let images = self.images;
    Ok(Box::new(items.into_iter().enumerate().map(move |(position, value)| {
      match convert(position, value, &images) {
        Ok(record) => SourceItem::Record(record),
        Err(reason) => SourceItem::Malformed { position, reason },
      }
    })))
  }
}

fn convert(
  position: usize,
  value: Value,
  images: &ImageIndex,
) -> Result<SourceRecord, String> {
  let mut fields: BTreeMap<String, Value> = json::entry(value)?;
  let path = match fields.remove(PATH_KEY) {
    Some(Value::String(p)) => Some(p),
    _ => None,
  };
  let date = match fields.remove(DATE_KEY) {
    Some(Value::String(d)) => Some(d),
    _ => None,
  };

  let formdata = json::formdata(fields)?;
  if formdata.is_blank() {
    return Err("empty formdata".into());
  }

  let mut record = SourceRecord::new(SourceKind::CuratedList, position, formdata);
  record.occurred_at = date.as_deref().and_then(time::parse_timestamp);
  // Without an image directory there is nothing to check against.
  record.image = path.filter(|p| {
    !p.trim().is_empty()
      && (images.dir().is_none() || images.contains_name_of(p))
  });
  Ok(record)
}
