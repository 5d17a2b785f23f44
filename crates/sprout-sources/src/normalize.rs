//! Migration of every record to the current shape.
//!
//! Adapters report offsets as the source wrote them ([`OffsetSpec`]). Before
//! the engine sees a record, [`Normalizer::normalize`] resolves the template,
//! turns legacy baked-in offsets into an adjustment, and fixes a timestamp.

use chrono::{DateTime, Utc};
use sprout_core::{
  provenance::SourceKind,
  tag::{Copies, Offset, TagContent, TemplateRef},
};

use crate::{
  record::{OffsetSpec, SourceRecord},
  templates::TemplateCatalog,
};

/// A record in the current shape: concrete template, offset and time.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
  pub source:      SourceKind,
  pub position:    usize,
  pub content:     TagContent,
  pub image:       Option<String>,
  /// The record's own timestamp, if it had one.
  pub occurred_at: Option<DateTime<Utc>>,
  /// `occurred_at`, or the run's start time.
  pub created_at:  DateTime<Utc>,
  pub copies:      Option<Copies>,
  pub session_id:  Option<String>,
}

#[derive(Debug, Clone)]
pub struct Normalizer<'a> {
  catalog:      &'a TemplateCatalog,
  label_fields: &'a [String],
  fallback:     DateTime<Utc>,
}

impl<'a> Normalizer<'a> {
  /// `fallback` stands in for records with no timestamp.
  pub fn new(
    catalog: &'a TemplateCatalog,
    label_fields: &'a [String],
    fallback: DateTime<Utc>,
  ) -> Self {
    Self { catalog, label_fields, fallback }
  }

  pub fn normalize(&self, record: SourceRecord) -> NormalizedRecord {
    let SourceRecord {
      source,
      position,
      mut formdata,
      template,
      offset,
      image,
      occurred_at,
      copies,
      session_id,
    } = record;

    let templated = template.as_deref().is_some_and(|n| !n.trim().is_empty());
    let name = template
      .filter(|n| !n.trim().is_empty())
      .unwrap_or_else(|| self.catalog.default_name().to_owned());

    // Empty fields are stored empty, so a record that omits them must gain
    // them to share an identity with one that wrote them out.
    let pad: &[String] = match self.catalog.fields(&name) {
      Some(fields) => fields,
      None if !templated => self.label_fields,
      None => &[],
    };
    for field in pad {
      if formdata.get(field).is_none() {
        formdata.insert(field.clone(), "");
      }
    }

    let catalog_base = self.catalog.base_offsets(&name);

    let (base_offsets, adjustment) = match offset {
      OffsetSpec::Explicit { adjustment, base } => {
        (base.unwrap_or(catalog_base), adjustment)
      }
      OffsetSpec::Legacy { template_offsets } => {
        (catalog_base, template_offsets.relative_to(catalog_base))
      }
      OffsetSpec::Absent => (catalog_base, Offset::ZERO),
    };

    NormalizedRecord {
      source,
      position,
      content: TagContent::new(
        formdata,
        TemplateRef { name, base_offsets },
        adjustment,
      ),
      image: image.filter(|p| !p.trim().is_empty()),
      occurred_at,
      created_at: occurred_at.unwrap_or(self.fallback),
      copies,
      session_id,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use sprout_core::tag::Formdata;

  use super::*;
  use crate::templates::TemplateInfo;

  fn catalog() -> TemplateCatalog {
    let mut c = TemplateCatalog::empty("default", Offset::new(50, -20));
    c.insert(TemplateInfo {
      template: TemplateRef { name: "herbs".into(), base_offsets: Offset::new(10, 5) },
      fields:   vec![],
    });
    c
  }

  fn fields() -> Vec<String> {
    ["main_text", "midtext", "subtext"].map(String::from).to_vec()
  }

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() }

  fn record(template: Option<&str>, offset: OffsetSpec) -> SourceRecord {
    let fd: Formdata = [("main_text", "Basil")].into_iter().collect();
    let mut r = SourceRecord::new(SourceKind::PrintLog, 0, fd);
    r.template = template.map(str::to_owned);
    r.offset = offset;
    r
  }

  #[test]
  fn legacy_offsets_subtract_the_catalog_base() {
    let (catalog, fields) = (catalog(), fields());
    let n = Normalizer::new(&catalog, &fields, now());

    let known = n.normalize(record(
      Some("herbs"),
      OffsetSpec::Legacy { template_offsets: Offset::new(13, 3) },
    ));
    assert_eq!(known.content.offset, Offset::new(3, -2));
    assert_eq!(known.content.template.base_offsets, Offset::new(10, 5));

    let unknown = n.normalize(record(
      Some("default"),
      OffsetSpec::Legacy { template_offsets: Offset::new(55, -22) },
    ));
    assert_eq!(unknown.content.offset, Offset::new(5, -2));
  }

  #[test]
  fn explicit_and_absent_offsets() {
    let (catalog, fields) = (catalog(), fields());
    let n = Normalizer::new(&catalog, &fields, now());

    let explicit = n.normalize(record(
      Some("herbs"),
      OffsetSpec::Explicit { adjustment: Offset::new(1, 2), base: None },
    ));
    assert_eq!(explicit.content.offset, Offset::new(1, 2));
    assert_eq!(explicit.content.template.base_offsets, Offset::new(10, 5));

    let absent = n.normalize(record(Some("herbs"), OffsetSpec::Absent));
    assert_eq!(absent.content.offset, Offset::ZERO);
  }

  #[test]
  fn missing_template_gets_default_and_empty_label_fields() {
    let (catalog, fields) = (catalog(), fields());
    let n = Normalizer::new(&catalog, &fields, now());

    let r = n.normalize(record(None, OffsetSpec::Absent));
    assert_eq!(r.content.template.name, "default");
    assert_eq!(r.content.formdata.get("midtext"), Some(""));
    assert_eq!(r.content.formdata.len(), 3);
    assert_eq!(r.created_at, now());
    assert_eq!(r.occurred_at, None);

    let templated = n.normalize(record(Some("herbs"), OffsetSpec::Absent));
    assert_eq!(templated.content.formdata.len(), 1, "recorded formdata is kept as is");
  }

  #[test]
  fn catalog_fields_pad_records_of_their_template() {
    let mut catalog = catalog();
    catalog.insert(TemplateInfo {
      template: TemplateRef { name: "seedling".into(), base_offsets: Offset::ZERO },
      fields:   vec!["main_text".into(), "sow_date".into()],
    });
    catalog.insert(TemplateInfo {
      template: TemplateRef { name: "default".into(), base_offsets: Offset::new(50, -20) },
      fields:   vec!["main_text".into(), "note".into()],
    });
    let fields = fields();
    let n = Normalizer::new(&catalog, &fields, now());

    let seedling = n.normalize(record(Some("seedling"), OffsetSpec::Absent));
    let keys: Vec<_> = seedling.content.formdata.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["main_text", "sow_date"]);
    assert_eq!(seedling.content.formdata.get("sow_date"), Some(""));

    // Template-less records take the default template's own field list.
    let plain = n.normalize(record(None, OffsetSpec::Absent));
    let keys: Vec<_> = plain.content.formdata.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["main_text", "note"]);
  }
}
