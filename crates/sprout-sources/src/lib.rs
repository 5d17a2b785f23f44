//! Adapters for the four historical record sources, the template catalog, the
//! label filename contract, and the migration of old records to the current
//! shape.
//!
//! Each adapter implements [`Source`] and produces a lazy stream of
//! [`SourceItem`]s. Nothing here touches the store.

mod csv;
mod json;

pub mod error;
pub mod filename;
pub mod images;
pub mod normalize;
pub mod plant_list;
pub mod print_log;
pub mod raw_history;
pub mod record;
pub mod saved_index;
pub mod templates;
pub mod time;

pub use error::{Error, Result};
pub use images::{ImageIndex, ImageMatch, ImageQuery, StrategyChain};
pub use normalize::{NormalizedRecord, Normalizer};
pub use plant_list::PlantListSource;
pub use print_log::PrintLogSource;
pub use raw_history::RawHistorySource;
pub use record::{OffsetSpec, RecordStream, Source, SourceItem, SourceRecord};
pub use saved_index::SavedIndexSource;
pub use templates::{TemplateCatalog, TemplateInfo};
