//! The priority-ordered merge.
//!
//! Sources are drained highest trust first. Within a source, records are
//! grouped by content identity in first-seen order and every group becomes a
//! single [`TagChangeset`], so a killed run leaves whole groups either
//! applied or not. Imported print events carry a deterministic origin key,
//! which is what makes a second run over the same inputs a no-op.

use std::{
  cmp::Reverse,
  collections::{BTreeSet, HashMap},
  sync::Arc,
};

use chrono::{DateTime, SecondsFormat, Utc};
use sprout_core::{
  identity::{ContentIdentity, Digest, ExactIdentity},
  provenance::SourceKind,
  store::{
    ChangeTarget, ImageOutcome, ImageUpdate, IndexEntry, NewPrintEvent,
    TagChangeset, TagStore,
  },
  tag::{Copies, NewTag, TagContent, TagId},
};
use sprout_sources::{
  ImageIndex, ImageQuery, NormalizedRecord, Normalizer, RecordStream, Source,
  SourceItem, StrategyChain, TemplateCatalog,
};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  config::ReconcileConfig,
  report::{
    Conflict, ConflictField, ReconcileReport, Resolution, SourceReport,
    SourceStatus,
  },
};

// ─── Known tags ──────────────────────────────────────────────────────────────

/// The store's identity index, kept current as the run creates tags.
#[derive(Debug, Default)]
struct KnownTags {
  exact:  HashMap<ExactIdentity, TagId>,
  newest: HashMap<ContentIdentity, (DateTime<Utc>, TagId)>,
}

impl KnownTags {
  fn from_index(entries: Vec<IndexEntry>) -> Self {
    let mut known = Self::default();
    for e in entries {
      known.insert(e.content, e.exact, e.created_at, e.tag_id);
    }
    known
  }

  fn insert(
    &mut self,
    content: ContentIdentity,
    exact: ExactIdentity,
    created_at: DateTime<Utc>,
    id: TagId,
  ) {
    self.exact.entry(exact).or_insert(id);
    let newest = self.newest.entry(content).or_insert((created_at, id));
    if (created_at, id) > *newest {
      *newest = (created_at, id);
    }
  }

  /// Same rendering first, then the newest offset variant.
  fn target(&self, content: &TagContent) -> Option<TagId> {
    self
      .exact
      .get(&content.exact_identity())
      .or_else(|| self.newest.get(&content.content_identity()).map(|(_, id)| id))
      .copied()
  }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

pub struct Reconciler<'a, S> {
  store:   &'a S,
  config:  &'a ReconcileConfig,
  catalog: &'a TemplateCatalog,
  images:  Arc<ImageIndex>,
  chain:   StrategyChain,
}

impl<'a, S: TagStore> Reconciler<'a, S> {
  pub fn new(
    store: &'a S,
    config: &'a ReconcileConfig,
    catalog: &'a TemplateCatalog,
    images: Arc<ImageIndex>,
  ) -> Self {
    Self {
      store,
      config,
      catalog,
      images,
      chain: StrategyChain::standard(config.image_window()),
    }
  }

  /// Merge `sources` into the store. They are processed in trust order
  /// whatever order they are given in.
  pub async fn run(
    &self,
    mut sources: Vec<Box<dyn Source>>,
  ) -> Result<ReconcileReport> {
    let started_at = Utc::now();
    let index = self.store.content_index().await.map_err(Error::store)?;
    let mut known = KnownTags::from_index(index);
    info!(tags = known.exact.len(), "loaded identity index");

    sources.sort_by_key(|s| Reverse(s.kind().trust()));
    let normalizer =
      Normalizer::new(self.catalog, &self.config.label_fields, started_at);

    let mut report = ReconcileReport {
      started_at,
      finished_at: started_at,
      sources: Vec::with_capacity(sources.len()),
      conflicts: Vec::new(),
    };

    for source in sources {
      let kind = source.kind();
      let mut summary = SourceReport::new(kind);

      let stream = match source.scan() {
        Ok(stream) => stream,
        Err(e) if e.is_skippable() => {
          warn!(source = %kind, error = %e, "skipping source");
          summary.status = match e {
            sprout_sources::Error::Missing(_) => SourceStatus::Missing,
            other => SourceStatus::Unreadable(other.to_string()),
          };
          report.sources.push(summary);
          continue;
        }
        Err(e) => return Err(e.into()),
      };

      for group in group_records(kind, stream, &normalizer, &mut summary) {
        self
          .merge(kind, group, &mut known, &mut summary, &mut report.conflicts)
          .await?;
      }

      info!(
        source = %kind,
        read = summary.read,
        imported = summary.imported,
        duplicates = summary.duplicates,
        discarded = summary.discarded,
        events = summary.events_added,
        "source merged"
      );
      report.sources.push(summary);
    }

    report.finished_at = Utc::now();
    Ok(report)
  }

  /// Apply one content-identity group as a single changeset.
  async fn merge(
    &self,
    kind: SourceKind,
    records: Vec<NormalizedRecord>,
    known: &mut KnownTags,
    summary: &mut SourceReport,
    conflicts: &mut Vec<Conflict>,
  ) -> Result<()> {
    let lead = &records[representative(kind, &records)];
    let content = lead.content.clone();
    let content_id = content.content_identity();
    let created_at = records
      .iter()
      .map(|r| r.created_at)
      .min()
      .unwrap_or(lead.created_at);

    let target = match known.target(&content) {
      Some(id) => ChangeTarget::Existing(id),
      None => ChangeTarget::Create(NewTag::new(content.clone(), kind, created_at)),
    };
    let creating = matches!(target, ChangeTarget::Create(_));

    let recorded = lead
      .image
      .clone()
      .or_else(|| records.iter().find_map(|r| r.image.clone()));
    let guessed = if recorded.is_none()
      && guesses_images(kind)
      && self.lacks_image(&target).await?
    {
      self.resolve_image(lead)
    } else {
      None
    };
    let image = recorded.clone().or(guessed);

    let mut changeset = TagChangeset::new(target);
    changeset.confirm = kind.confirms_on_import();
    changeset.image = image
      .clone()
      .map(|path| ImageUpdate { path, source: kind });
    changeset.events = print_events(kind, content_id, &records);

    let outcome = self.store.apply(changeset).await.map_err(Error::store)?;
    let tag_id = outcome.tag_id;

    if creating {
      known.insert(content_id, content.exact_identity(), created_at, tag_id);
    }
    if outcome.created {
      summary.imported += 1;
      summary.duplicates += records.len() - 1;
    } else {
      summary.duplicates += records.len();
    }
    summary.events_added += outcome.events_added;
    summary.events_already_present += outcome.events_present;
    match image {
      Some(_) => summary.images_resolved += 1,
      None => summary.images_missing += 1,
    }

    let conflict = |kept: String, rejected: String, resolution| Conflict {
      content: content_id,
      tag_id,
      field: ConflictField::ImagePath,
      kept,
      rejected,
      source: kind,
      resolution,
    };
    let mut found = Vec::new();

    if let Some(chosen) = &image {
      let others: BTreeSet<&str> = records
        .iter()
        .filter_map(|r| r.image.as_deref())
        .filter(|p| *p != chosen.as_str())
        .collect();
      for other in others {
        found.push(conflict(
          chosen.clone(),
          other.to_owned(),
          Resolution::KeptRepresentative,
        ));
      }
    }
    // Guesses only ever fill an empty slot, so only recorded paths conflict.
    match (outcome.image, recorded) {
      (ImageOutcome::Rejected { kept }, Some(offered)) => {
        found.push(conflict(kept, offered, Resolution::KeptStored));
      }
      (ImageOutcome::Replaced { previous }, Some(stored)) => {
        found.push(conflict(stored, previous, Resolution::ReplacedByTrust));
      }
      _ => {}
    }

    for c in &found {
      warn!(
        tag = %c.tag_id,
        source = %kind,
        kept = %c.kept,
        rejected = %c.rejected,
        resolution = ?c.resolution,
        "image conflict"
      );
    }
    conflicts.extend(found);

    debug!(
      tag = %tag_id,
      content = %content_id.short(),
      records = records.len(),
      created = outcome.created,
      events = outcome.events_added,
      "merged group"
    );
    Ok(())
  }

  /// Whether `target` would accept a guessed image: it is new, or stored
  /// without one.
  async fn lacks_image(&self, target: &ChangeTarget) -> Result<bool> {
    match target {
      ChangeTarget::Create(_) => Ok(true),
      ChangeTarget::Existing(id) => {
        let tag = self.store.get(*id).await.map_err(Error::store)?;
        Ok(tag.is_none_or(|t| t.image_path.is_none()))
      }
    }
  }

  fn resolve_image(&self, record: &NormalizedRecord) -> Option<String> {
    let query = ImageQuery::new(
      &record.content.formdata,
      &self.config.label_fields,
      record.occurred_at,
    );
    let found = self.chain.resolve(&self.images, &query)?;
    debug!(path = %found.path, strategy = %found.strategy, "resolved image");
    Some(found.path)
  }
}

/// Load the catalog and image directory named by `config` and merge its four
/// sources into `store`.
pub async fn reconcile<S: TagStore>(
  store: &S,
  config: &ReconcileConfig,
) -> Result<ReconcileReport> {
  let catalog = TemplateCatalog::load(
    config.template_dir.as_deref(),
    config.default_template.clone(),
    config.legacy_base,
  );
  let images = Arc::new(match &config.image_dir {
    Some(dir) => ImageIndex::scan(dir)?,
    None => ImageIndex::empty(),
  });
  let sources = config.sources(&images);
  Reconciler::new(store, config, &catalog, images)
    .run(sources)
    .await
}

// ─── Grouping ────────────────────────────────────────────────────────────────

/// Drain `stream`, counting every item, and group the well-formed records by
/// content identity in first-seen order.
fn group_records(
  kind: SourceKind,
  stream: RecordStream,
  normalizer: &Normalizer<'_>,
  summary: &mut SourceReport,
) -> Vec<Vec<NormalizedRecord>> {
  let mut groups: Vec<Vec<NormalizedRecord>> = Vec::new();
  let mut slots: HashMap<ContentIdentity, usize> = HashMap::new();

  for item in stream {
    summary.read += 1;
    let record = match item {
      SourceItem::Record(record) => normalizer.normalize(record),
      SourceItem::Malformed { position, reason } => {
        summary.discarded += 1;
        warn!(source = %kind, position, %reason, "discarding malformed record");
        continue;
      }
    };
    let key = record.content.content_identity();
    match slots.get(&key) {
      Some(&slot) => groups[slot].push(record),
      None => {
        slots.insert(key, groups.len());
        groups.push(vec![record]);
      }
    }
  }
  groups
}

/// Raw history rows are matched by exact filename in the adapter and never
/// by the looser heuristics.
fn guesses_images(kind: SourceKind) -> bool { kind != SourceKind::RawHistory }

/// The print log's representative is its largest print (first on ties);
/// elsewhere it is the first record.
fn representative(kind: SourceKind, records: &[NormalizedRecord]) -> usize {
  if kind != SourceKind::PrintLog {
    return 0;
  }
  (0..records.len()).fold(0, |best, i| {
    if records[i].copies > records[best].copies { i } else { best }
  })
}

fn print_events(
  kind: SourceKind,
  content: ContentIdentity,
  records: &[NormalizedRecord],
) -> Vec<NewPrintEvent> {
  let mut seen: HashMap<(Option<DateTime<Utc>>, Copies), usize> = HashMap::new();
  records
    .iter()
    .filter_map(|r| {
      let copies = r.copies?;
      let ordinal = seen.entry((r.occurred_at, copies)).or_default();
      let origin = event_origin(kind, content, r.occurred_at, copies, *ordinal);
      *ordinal += 1;
      Some(NewPrintEvent {
        copies,
        occurred_at: r.occurred_at.unwrap_or(r.created_at),
        origin: Some(origin),
      })
    })
    .collect()
}

/// Stable key of an imported print event. `ordinal` tells apart identical
/// events of the same group.
fn event_origin(
  kind: SourceKind,
  content: ContentIdentity,
  occurred_at: Option<DateTime<Utc>>,
  copies: Copies,
  ordinal: usize,
) -> String {
  let at = occurred_at.map_or_else(
    || "-".to_owned(),
    |t| t.to_rfc3339_opts(SecondsFormat::Micros, true),
  );
  Digest::of(format!("{kind}|{content}|{at}|{copies}|{ordinal}").as_bytes())
    .to_hex()
}
