//! Heuristic association of records with label bitmaps on disk.
//!
//! [`ImageIndex`] lists the image directory once per run. A
//! [`StrategyChain`] then tries each [`MatchStrategy`] in order and returns
//! the first hit. No hit is not an error; the tag is simply stored without an
//! image.

use std::{
  fmt,
  path::{Path, PathBuf},
};

use chrono::{DateTime, TimeDelta, Utc};
use sprout_core::tag::Formdata;
use tracing::{debug, warn};

use crate::{
  Error, Result,
  filename::{LabelFile, key_tokens, label_tokens, sanitize},
};

// ─── Index ───────────────────────────────────────────────────────────────────

/// Every contract-conforming label file in one directory.
#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
  dir:   Option<PathBuf>,
  files: Vec<LabelFile>,
}

impl ImageIndex {
  /// An index with no files, for runs without an image directory.
  pub fn empty() -> Self { Self::default() }

  /// List `dir`. A missing directory gives an empty index.
  pub fn scan(dir: &Path) -> Result<Self> {
    let entries = match std::fs::read_dir(dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        warn!(dir = %dir.display(), "image directory not found");
        return Ok(Self { dir: Some(dir.to_owned()), files: Vec::new() });
      }
      Err(source) => return Err(Error::Io { path: dir.to_owned(), source }),
    };

    let mut files = Vec::new();
    let mut ignored = 0usize;
    for entry in entries {
      let entry =
        entry.map_err(|source| Error::Io { path: dir.to_owned(), source })?;
      match LabelFile::parse(&entry.path()) {
        Some(file) => files.push(file),
        None => ignored += 1,
      }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(dir = %dir.display(), files = files.len(), ignored, "indexed label images");
    Ok(Self { dir: Some(dir.to_owned()), files })
  }

  pub fn from_files(files: Vec<LabelFile>) -> Self { Self { dir: None, files } }

  pub fn files(&self) -> &[LabelFile] { &self.files }

  pub fn len(&self) -> usize { self.files.len() }

  pub fn is_empty(&self) -> bool { self.files.is_empty() }

  /// Whether a file with the same name as `path` is in the index.
  pub fn contains_name_of(&self, path: &str) -> bool {
    let Some(name) = Path::new(path).file_name() else {
      return false;
    };
    self.files.iter().any(|f| f.path.file_name() == Some(name))
  }

  pub fn dir(&self) -> Option<&Path> { self.dir.as_deref() }
}

// ─── Query and match ─────────────────────────────────────────────────────────

/// What a strategy knows about the record it is looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageQuery {
  /// Key tokens of all label fields, in field order.
  pub tokens:  Vec<String>,
  /// Key tokens of the primary field alone.
  pub primary: Vec<String>,
  /// When the record was made, if known.
  pub at:      Option<DateTime<Utc>>,
}

impl ImageQuery {
  /// Build a query from formdata. The first of `fields` is the primary one.
  pub fn new(
    formdata: &Formdata,
    fields: &[String],
    at: Option<DateTime<Utc>>,
  ) -> Self {
    let primary = fields
      .first()
      .map(|f| key_tokens(&sanitize(formdata.text(f))))
      .unwrap_or_default();
    Self { tokens: label_tokens(formdata, fields), primary, at }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
  ExactFields,
  PrimaryField,
  NearestTimestamp,
}

impl fmt::Display for StrategyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::ExactFields => "exact-fields",
      Self::PrimaryField => "primary-field",
      Self::NearestTimestamp => "nearest-timestamp",
    })
  }
}

/// A resolved image and how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMatch {
  pub path:      String,
  pub timestamp: DateTime<Utc>,
  pub strategy:  StrategyKind,
}

// ─── Strategies ──────────────────────────────────────────────────────────────

pub trait MatchStrategy: Send + Sync {
  fn kind(&self) -> StrategyKind;

  fn find<'a>(
    &self,
    index: &'a ImageIndex,
    query: &ImageQuery,
  ) -> Option<&'a LabelFile>;
}

/// Newest file satisfying `pred`; ties go to the lexically last path.
fn newest<'a>(
  index: &'a ImageIndex,
  pred: impl Fn(&LabelFile) -> bool,
) -> Option<&'a LabelFile> {
  index
    .files()
    .iter()
    .filter(|&f| pred(f))
    .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.path.cmp(&b.path)))
}

/// File tokens equal the record's label-field tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactFields;

impl MatchStrategy for ExactFields {
  fn kind(&self) -> StrategyKind { StrategyKind::ExactFields }

  fn find<'a>(
    &self,
    index: &'a ImageIndex,
    query: &ImageQuery,
  ) -> Option<&'a LabelFile> {
    if query.tokens.is_empty() {
      return None;
    }
    newest(index, |f| f.tokens == query.tokens)
  }
}

/// File tokens start with the primary field's tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryField;

impl MatchStrategy for PrimaryField {
  fn kind(&self) -> StrategyKind { StrategyKind::PrimaryField }

  fn find<'a>(
    &self,
    index: &'a ImageIndex,
    query: &ImageQuery,
  ) -> Option<&'a LabelFile> {
    if query.primary.is_empty() {
      return None;
    }
    newest(index, |f| f.tokens.starts_with(&query.primary))
  }
}

/// The file closest in time among those from the record's calendar date,
/// accepted only when strictly closer than `window`.
#[derive(Debug, Clone, Copy)]
pub struct NearestTimestamp {
  pub window: TimeDelta,
}

impl MatchStrategy for NearestTimestamp {
  fn kind(&self) -> StrategyKind { StrategyKind::NearestTimestamp }

  fn find<'a>(
    &self,
    index: &'a ImageIndex,
    query: &ImageQuery,
  ) -> Option<&'a LabelFile> {
    let at = query.at?;
    index
      .files()
      .iter()
      .filter(|f| f.timestamp.date_naive() == at.date_naive())
      .map(|f| ((f.timestamp - at).abs(), f))
      .filter(|(gap, _)| *gap < self.window)
      .min_by(|(ga, a), (gb, b)| ga.cmp(gb).then(a.path.cmp(&b.path)))
      .map(|(_, f)| f)
  }
}

// ─── Chain ───────────────────────────────────────────────────────────────────

/// Ordered strategies; the first that finds a file wins.
pub struct StrategyChain {
  strategies: Vec<Box<dyn MatchStrategy>>,
}

impl StrategyChain {
  pub fn new(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
    Self { strategies }
  }

  /// Exact fields, then primary field, then nearest timestamp.
  pub fn standard(window: TimeDelta) -> Self {
    Self::new(vec![
      Box::new(ExactFields),
      Box::new(PrimaryField),
      Box::new(NearestTimestamp { window }),
    ])
  }

  /// Only the exact-fields strategy.
  pub fn exact_only() -> Self { Self::new(vec![Box::new(ExactFields)]) }

  pub fn resolve(
    &self,
    index: &ImageIndex,
    query: &ImageQuery,
  ) -> Option<ImageMatch> {
    self.strategies.iter().find_map(|s| {
      s.find(index, query).map(|file| ImageMatch {
        path:      file.display_path(),
        timestamp: file.timestamp,
        strategy:  s.kind(),
      })
    })
  }
}

impl fmt::Debug for StrategyChain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list()
      .entries(self.strategies.iter().map(|s| s.kind()))
      .finish()
  }
}
