//! Run configuration, deserialised from `sprout.toml` and the environment.

use std::{path::PathBuf, sync::Arc};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use sprout_core::tag::Offset;
use sprout_sources::{
  ImageIndex, PlantListSource, PrintLogSource, RawHistorySource,
  SavedIndexSource, Source,
};

/// Locations of the four historical sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePaths {
  pub saved_index: PathBuf,
  pub print_log:   PathBuf,
  pub plant_list:  PathBuf,
  pub raw_history: PathBuf,
}

impl Default for SourcePaths {
  fn default() -> Self {
    Self {
      saved_index: "saved-label-index.json".into(),
      print_log:   "print-log.json".into(),
      plant_list:  "plantlist.json".into(),
      raw_history: "print_history.csv".into(),
    }
  }
}

/// Everything a reconciliation run, a fuzzy pass or a capture needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
  pub database:          PathBuf,
  /// Directory of saved label bitmaps.
  pub image_dir:         Option<PathBuf>,
  /// Directory of `label_template*.json` files.
  pub template_dir:      Option<PathBuf>,
  pub sources:           SourcePaths,
  /// Plain-text `<name> - <count>` list for the fuzzy pass.
  pub master_list:       Option<PathBuf>,
  pub default_template:  String,
  /// Template offsets every legacy template used.
  pub legacy_base:       Offset,
  /// Label fields in filename order; the first is the primary field.
  pub label_fields:      Vec<String>,
  pub fuzzy_threshold:   u8,
  pub image_window_secs: i64,
  pub session_ttl_secs:  i64,
}

impl Default for ReconcileConfig {
  fn default() -> Self {
    Self {
      database:          "sprout.db".into(),
      image_dir:         Some("labels".into()),
      template_dir:      None,
      sources:           SourcePaths::default(),
      master_list:       None,
      default_template:  "default".into(),
      legacy_base:       Offset::new(50, -20),
      label_fields:      ["main_text", "midtext", "subtext"]
        .map(String::from)
        .to_vec(),
      fuzzy_threshold:   70,
      image_window_secs: 3600,
      session_ttl_secs:  3600,
    }
  }
}

impl ReconcileConfig {
  pub fn image_window(&self) -> TimeDelta {
    TimeDelta::seconds(self.image_window_secs)
  }

  pub fn session_ttl(&self) -> TimeDelta {
    TimeDelta::seconds(self.session_ttl_secs)
  }

  /// The four configured sources, highest trust first.
  pub fn sources(&self, images: &Arc<ImageIndex>) -> Vec<Box<dyn Source>> {
    let paths = &self.sources;
    vec![
      Box::new(SavedIndexSource::new(&paths.saved_index)),
      Box::new(PrintLogSource::new(&paths.print_log)),
      Box::new(PlantListSource::new(&paths.plant_list, Arc::clone(images))),
      Box::new(RawHistorySource::new(&paths.raw_history, Arc::clone(images))),
    ]
  }
}
