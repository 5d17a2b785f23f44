//! The raw print history: a CSV with one row per label.
//!
//! Every column is a formdata field except the reserved ones: `count` or
//! `copies` (a print count) and `time` or `date` (when it happened). The
//! rows carry no image path, so the exact filename strategy is run against
//! the image directory, and a matched file's timestamp stands in for a
//! missing `time`.

use std::{path::PathBuf, sync::Arc};

use sprout_core::{
  provenance::SourceKind,
  tag::{Copies, Formdata},
};

use crate::{
  Error, Result, csv,
  images::{ImageIndex, ImageQuery, StrategyChain},
  record::{RecordStream, Source, SourceItem, SourceRecord},
  time,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
  Field,
  Copies,
  Time,
}

impl Column {
  fn classify(name: &str) -> Self {
    match name.trim().to_ascii_lowercase().as_str() {
      "count" | "copies" => Self::Copies,
      "time" | "date" => Self::Time,
      _ => Self::Field,
    }
  }
}

#[derive(Debug, Clone)]
pub struct RawHistorySource {
  path:   PathBuf,
  images: Arc<ImageIndex>,
}

impl RawHistorySource {
  pub fn new(path: impl Into<PathBuf>, images: Arc<ImageIndex>) -> Self {
    Self { path: path.into(), images }
  }
}

impl Source for RawHistorySource {
  fn kind(&self) -> SourceKind { SourceKind::RawHistory }

  fn scan(self: Box<Self>) -> Result<RecordStream> {
    let text = std::fs::read_to_string(&self.path)
      .map_err(|e| Error::from_read(&self.path, e))?;
    let mut rows = csv::parse_rows(&text).into_iter();

    let header: Vec<String> = rows
      .next()
      .filter(|h| h.iter().any(|c| !c.trim().is_empty()))
      .ok_or_else(|| Error::Unreadable {
        path:   self.path.clone(),
        reason: "missing header row".into(),
      })?
      .into_iter()
      .map(|c| c.trim().to_owned())
      .collect();

    let reader = RowReader {
      columns: header.iter().map(|c| Column::classify(c)).collect(),
      fields: header
        .iter()
        .filter(|c| Column::classify(c) == Column::Field)
        .cloned()
        .collect(),
      header,
      images: self.images,
      chain: StrategyChain::exact_only(),
    };

    Ok(Box::new(rows.enumerate().map(move |(position, row)| {
      match reader.convert(position, row) {
        Ok(record) => SourceItem::Record(record),
        Err(reason) => SourceItem::Malformed { position, reason },
      }
    })))
  }
}

struct RowReader {
  header:  Vec<String>,
  columns: Vec<Column>,
  /// Formdata columns in header order, for filename matching.
  fields:  Vec<String>,
  images:  Arc<ImageIndex>,
  chain:   StrategyChain,
}

impl RowReader {
  fn convert(
    &self,
    position: usize,
    row: Vec<String>,
  ) -> Result<SourceRecord, String> {
    if row.len() > self.header.len() {
      return Err(format!(
        "{} fields for {} columns",
        row.len(),
        self.header.len()
      ));
    }

    let mut formdata = Formdata::new();
    let mut copies = None;
    let mut occurred_at = None;
    for (i, name) in self.header.iter().enumerate() {
      let cell = row.get(i).map_or("", |c| c.trim());
      match self.columns[i] {
        Column::Field => formdata.insert(name.clone(), cell),
        Column::Copies if !cell.is_empty() => {
          let n: i64 =
            cell.parse().map_err(|_| format!("count {cell:?} is not an integer"))?;
          copies = Some(Copies::new(n).map_err(|e| e.to_string())?);
        }
        Column::Time if !cell.is_empty() => {
          occurred_at = Some(
            time::parse_timestamp(cell)
              .ok_or_else(|| format!("unrecognised time {cell:?}"))?,
          );
        }
        Column::Copies | Column::Time => {}
      }
    }
    if formdata.is_blank() {
      return Err("empty formdata".into());
    }

    let query = ImageQuery::new(&formdata, &self.fields, occurred_at);
    let image = self.chain.resolve(&self.images, &query);

    let mut record = SourceRecord::new(SourceKind::RawHistory, position, formdata);
    record.copies = copies;
    record.occurred_at = occurred_at.or(image.as_ref().map(|m| m.timestamp));
    record.image = image.map(|m| m.path);
    Ok(record)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn scan_with(body: &str, label_files: &[&str]) -> Result<Vec<SourceItem>> {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("labels");
    std::fs::create_dir(&labels).unwrap();
    for f in label_files {
      std::fs::write(labels.join(f), b"").unwrap();
    }
    let path = dir.path().join("print_history.csv");
    std::fs::write(&path, body).unwrap();
    let images = Arc::new(ImageIndex::scan(&labels).unwrap());
    Ok(Box::new(RawHistorySource::new(path, images)).scan()?.collect())
  }

  fn record(item: &SourceItem) -> &SourceRecord {
    match item {
      SourceItem::Record(r) => r,
      SourceItem::Malformed { reason, .. } => panic!("malformed: {reason}"),
    }
  }

  #[test]
  fn rows_become_records_with_matched_images() {
    let items = scan_with(
      "main_text,midtext,subtext,count\n\
       Tomato,Cherokee Purple,,2\n\
       \"Pepper, Hot\",Jalapeño,,\n",
      &[
        "label_tomato_cherokee-purple__20240309-101112.png",
        "label_tomato_cherokee-purple__20240301-090000.png",
      ],
    )
    .unwrap();
    assert_eq!(items.len(), 2);

    let tomato = record(&items[0]);
    assert_eq!(tomato.source, SourceKind::RawHistory);
    assert_eq!(tomato.copies, Some(Copies::new(2).unwrap()));
    assert_eq!(tomato.formdata.len(), 3, "count is not formdata");
    assert!(
      tomato
        .image
        .as_deref()
        .is_some_and(|p| p.ends_with("label_tomato_cherokee-purple__20240309-101112.png")),
      "newest exact match wins: {:?}",
      tomato.image
    );
    assert_eq!(
      tomato.occurred_at,
      Some(chrono::Utc.with_ymd_and_hms(2024, 3, 9, 10, 11, 12).unwrap()),
      "file timestamp stands in for the missing time"
    );

    let pepper = record(&items[1]);
    assert_eq!(pepper.formdata.get("main_text"), Some("Pepper, Hot"));
    assert_eq!(pepper.copies, None);
    assert_eq!(pepper.image, None);
    assert_eq!(pepper.occurred_at, None);
  }

  #[test]
  fn own_time_is_kept_and_bad_rows_are_malformed() {
    let items = scan_with(
      "main_text,time,copies\n\
       Basil,2024-05-01 08:00:00,1\n\
       Basil,not a time,1\n\
       Basil,,zero\n\
       Basil,,0\n\
       ,,\n\
       Basil,,1,extra\n",
      &[],
    )
    .unwrap();
    assert_eq!(items.len(), 6);
    assert_eq!(
      record(&items[0]).occurred_at,
      time::parse_timestamp("2024-05-01T08:00:00Z")
    );
    for item in &items[1..] {
      assert!(matches!(item, SourceItem::Malformed { .. }), "{item:?}");
    }
  }

  #[test]
  fn missing_header_is_unreadable() {
    let err = scan_with("", &[]).err().unwrap();
    assert!(matches!(err, Error::Unreadable { .. }));
  }
}
