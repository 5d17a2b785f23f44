//! The label filename contract.
//!
//! Saved bitmaps are named `label_<key>[_-]<YYYYMMDD-HHMMSS>.png`, where
//! `<key>` is the sanitised label fields joined by `_` (or by `-` in older
//! files). Matching compares *key tokens*: the non-empty `_`/`-` separated
//! segments, so both joiners give the same tokens.

use std::{
  path::{Path, PathBuf},
  sync::LazyLock,
};

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use sprout_core::tag::Formdata;

static LABEL_FILE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^label_(?P<key>.+?)[_-](?P<ts>[0-9]{8}-[0-9]{6})(?i:\.png)$")
    .expect("valid regex")
});

/// Drop everything that is not an ASCII letter, digit or whitespace, turn
/// spaces into `-`, and lowercase.
pub fn sanitize(s: &str) -> String {
  s.chars()
    .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
    .map(|c| if c == ' ' { '-' } else { c.to_ascii_lowercase() })
    .collect()
}

/// Split a sanitised key into its non-empty `_`/`-` segments.
pub fn key_tokens(key: &str) -> Vec<String> {
  key
    .split(['_', '-'])
    .filter(|t| !t.is_empty())
    .map(str::to_owned)
    .collect()
}

/// Tokens a label with these fields would carry in its filename.
pub fn label_tokens(formdata: &Formdata, fields: &[String]) -> Vec<String> {
  fields
    .iter()
    .flat_map(|f| key_tokens(&sanitize(formdata.text(f))))
    .collect()
}

/// A file in the image directory that follows the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFile {
  pub path:      PathBuf,
  pub tokens:    Vec<String>,
  pub timestamp: DateTime<Utc>,
}

impl LabelFile {
  /// `None` for files whose name does not follow the contract.
  pub fn parse(path: &Path) -> Option<Self> {
    let name = path.file_name()?.to_str()?;
    let caps = LABEL_FILE.captures(name)?;
    let timestamp =
      NaiveDateTime::parse_from_str(&caps["ts"], "%Y%m%d-%H%M%S").ok()?;
    Some(Self {
      path:      path.to_owned(),
      tokens:    key_tokens(&caps["key"]),
      timestamp: timestamp.and_utc(),
    })
  }

  pub fn file_name(&self) -> &str {
    self
      .path
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or_default()
  }

  /// The path as stored on a tag.
  pub fn display_path(&self) -> String { self.path.display().to_string() }
}
