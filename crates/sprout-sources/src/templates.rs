//! Template catalog: the named templates and their base offsets.
//!
//! Only names and base offsets are read; field geometry, fonts and base images
//! belong to the renderer.

use std::{collections::BTreeMap, path::Path};

use serde::Deserialize;
use sprout_core::tag::{Offset, TemplateRef};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RawTemplateFile {
  label:   String,
  #[serde(default)]
  offsets: Offset,
  #[serde(default)]
  fields:  Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
  name: String,
}

/// A template known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateInfo {
  pub template: TemplateRef,
  pub fields:   Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TemplateCatalog {
  templates:   BTreeMap<String, TemplateInfo>,
  default:     String,
  legacy_base: Offset,
}

impl TemplateCatalog {
  /// A catalog with no template files. Every template gets `legacy_base`.
  pub fn empty(default: impl Into<String>, legacy_base: Offset) -> Self {
    Self { templates: BTreeMap::new(), default: default.into(), legacy_base }
  }

  /// Read every `label_template*.json` in `dir`. Files that cannot be read
  /// or parsed are skipped with a warning; a missing directory gives an empty
  /// catalog.
  pub fn load(
    dir: Option<&Path>,
    default: impl Into<String>,
    legacy_base: Offset,
  ) -> Self {
    let mut catalog = Self::empty(default, legacy_base);
    let Some(dir) = dir else { return catalog };

    let entries = match std::fs::read_dir(dir) {
      Ok(entries) => entries,
      Err(e) => {
        warn!(dir = %dir.display(), error = %e, "template directory unavailable");
        return catalog;
      }
    };

    let mut paths: Vec<_> = entries
      .filter_map(|e| e.ok().map(|e| e.path()))
      .filter(|p| {
        p.file_name()
          .and_then(|n| n.to_str())
          .is_some_and(|n| n.starts_with("label_template") && n.ends_with(".json"))
      })
      .collect();
    paths.sort();

    for path in paths {
      let parsed = std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|s| {
          serde_json::from_str::<RawTemplateFile>(&s).map_err(|e| e.to_string())
        });
      match parsed {
        Ok(raw) => {
          debug!(template = %raw.label, path = %path.display(), "loaded template");
          catalog.insert(TemplateInfo {
            template: TemplateRef { name: raw.label, base_offsets: raw.offsets },
            fields:   raw.fields.into_iter().map(|f| f.name).collect(),
          });
        }
        Err(reason) => {
          warn!(path = %path.display(), %reason, "skipping unreadable template");
        }
      }
    }
    catalog
  }

  pub fn insert(&mut self, info: TemplateInfo) {
    self.templates.insert(info.template.name.clone(), info);
  }

  pub fn get(&self, name: &str) -> Option<&TemplateInfo> {
    self.templates.get(name)
  }

  pub fn default_name(&self) -> &str { &self.default }

  /// Field names `name` declares, if the catalog knows it and it lists any.
  pub fn fields(&self, name: &str) -> Option<&[String]> {
    self
      .get(name)
      .map(|t| t.fields.as_slice())
      .filter(|f| !f.is_empty())
  }

  /// Base offsets of `name`, or the legacy base for unknown templates.
  pub fn base_offsets(&self, name: &str) -> Offset {
    self
      .get(name)
      .map_or(self.legacy_base, |t| t.template.base_offsets)
  }

  /// A reference to `name` carrying its catalog base offsets.
  pub fn resolve(&self, name: &str) -> TemplateRef {
    TemplateRef { name: name.to_owned(), base_offsets: self.base_offsets(name) }
  }

  pub fn default_template(&self) -> TemplateRef { self.resolve(&self.default) }

  pub fn len(&self) -> usize { self.templates.len() }

  pub fn is_empty(&self) -> bool { self.templates.is_empty() }
}
