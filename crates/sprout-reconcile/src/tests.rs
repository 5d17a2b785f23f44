//! End-to-end reconciliation runs against an in-memory store and on-disk
//! source fixtures.

use std::path::Path;

use serde_json::{Value, json};
use sprout_core::{
  provenance::SourceKind,
  store::{TagQuery, TagStore},
  tag::{Formdata, Offset, Tag, TagContent, TemplateRef},
};
use sprout_store_sqlite::SqliteStore;
use tempfile::TempDir;

use crate::{
  ReconcileConfig, ReconcileReport, SourcePaths, SourceStatus, fuzzy,
  reconcile, report::Resolution,
};

/// 2024-03-09T10:11:12Z
const T0: i64 = 1_709_979_072;

struct Fixture {
  dir:    TempDir,
  config: ReconcileConfig,
}

impl Fixture {
  fn new() -> Self {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("labels");
    std::fs::create_dir(&labels).unwrap();
    let config = ReconcileConfig {
      database: dir.path().join("sprout.db"),
      image_dir: Some(labels),
      sources: SourcePaths {
        saved_index: dir.path().join("saved-label-index.json"),
        print_log:   dir.path().join("print-log.json"),
        plant_list:  dir.path().join("plantlist.json"),
        raw_history: dir.path().join("print_history.csv"),
      },
      ..ReconcileConfig::default()
    };
    Self { dir, config }
  }

  fn write(&self, path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
  }

  fn saved_index(&self, entries: Value) {
    self.write(&self.config.sources.saved_index, &entries.to_string());
  }

  fn print_log(&self, entries: Value) {
    self.write(&self.config.sources.print_log, &entries.to_string());
  }

  fn plant_list(&self, entries: Value) {
    self.write(&self.config.sources.plant_list, &entries.to_string());
  }

  fn raw_history(&self, csv: &str) {
    self.write(&self.config.sources.raw_history, csv);
  }

  /// Create an empty bitmap in the image directory and return its path.
  fn label_file(&self, name: &str) -> String {
    let path = self.dir.path().join("labels").join(name);
    std::fs::write(&path, b"").unwrap();
    path.display().to_string()
  }
}

fn tomato() -> Value {
  json!({"main_text": "Tomato", "midtext": "Cherokee Purple", "subtext": ""})
}

fn template() -> Value { json!({"label": "default", "offsets": [50, -20]}) }

fn print_entry(formdata: Value, count: i64, unix_time: i64) -> Value {
  json!({
    "session_id": "s",
    "count": count,
    "formdata": formdata,
    "label_template": template(),
    "offset_adjustment": [0, 0],
    "unix_time": unix_time,
  })
}

fn saved_entry(formdata: Value, offset: [i32; 2], filepath: &str) -> Value {
  json!({
    "formdata": formdata,
    "offset_adjustment": offset,
    "label_template": template(),
    "filepath": filepath,
    "date_created": "2024-03-09T10:11:12.000000",
  })
}

fn content(formdata: Value, offset: Offset) -> TagContent {
  let fd: Formdata = serde_json::from_value(formdata).unwrap();
  TagContent::new(
    fd,
    TemplateRef { name: "default".into(), base_offsets: Offset::new(50, -20) },
    offset,
  )
}

async fn store() -> SqliteStore { SqliteStore::open_in_memory().await.unwrap() }

async fn run(store: &SqliteStore, fx: &Fixture) -> ReconcileReport {
  let report = reconcile(store, &fx.config).await.unwrap();
  for s in &report.sources {
    assert!(s.is_balanced(), "{s:?}");
  }
  report
}

async fn all_tags(store: &SqliteStore) -> Vec<Tag> {
  store.list(&TagQuery::default()).await.unwrap()
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn print_then_save_yields_one_confirmed_tag() {
  let fx = Fixture::new();
  fx.print_log(json!([print_entry(tomato(), 1, T0)]));
  fx.saved_index(json!([saved_entry(
    tomato(),
    [5, -2],
    "labels/label_tomato_cherokee-purple__20240309-101112.png"
  )]));
  let s = store().await;

  let report = run(&s, &fx).await;

  let tags = all_tags(&s).await;
  assert_eq!(tags.len(), 1);
  let tag = &tags[0];
  assert!(tag.is_confirmed(), "saved labels are confirmed by trust");
  assert_eq!(tag.total_prints(), 1);
  assert_eq!(
    tag.exact_identity(),
    content(tomato(), Offset::new(5, -2)).exact_identity()
  );

  let saved = report.source(SourceKind::SavedIndex).unwrap();
  assert_eq!((saved.read, saved.imported), (1, 1));
  let printed = report.source(SourceKind::PrintLog).unwrap();
  assert_eq!((printed.imported, printed.duplicates), (0, 1));
  assert_eq!(printed.events_added, 1);
}

#[tokio::test]
async fn multi_copy_print_confirms() {
  let fx = Fixture::new();
  fx.print_log(json!([
    print_entry(tomato(), 1, T0),
    print_entry(tomato(), 2, T0 + 60),
    print_entry(tomato(), 1, T0 + 120),
  ]));
  let s = store().await;

  let report = run(&s, &fx).await;

  let tags = all_tags(&s).await;
  assert_eq!(tags.len(), 1);
  assert!(tags[0].is_confirmed());
  assert_eq!(tags[0].total_prints(), 4);
  assert_eq!(tags[0].origin, SourceKind::PrintLog);

  let printed = report.source(SourceKind::PrintLog).unwrap();
  assert_eq!((printed.imported, printed.duplicates), (1, 2));
  assert_eq!(printed.events_added, 3);
}

#[tokio::test]
async fn unmatched_raw_history_row_is_still_imported() {
  let fx = Fixture::new();
  fx.raw_history("main_text,midtext,subtext\nOkra,Clemson Spineless,\n");
  let s = store().await;

  let report = run(&s, &fx).await;

  let tags = all_tags(&s).await;
  assert_eq!(tags.len(), 1);
  assert_eq!(tags[0].image_path, None);
  assert!(!tags[0].is_confirmed());

  let raw = report.source(SourceKind::RawHistory).unwrap();
  assert_eq!((raw.imported, raw.discarded), (1, 0));
  assert_eq!(raw.images_missing, 1);
}

#[tokio::test]
async fn raw_history_ignores_loosely_matching_files() {
  let fx = Fixture::new();
  // Same primary field and within the hour, but not the same label.
  fx.label_file("label_tomato_cherokee-purple__20240101-080000.png");
  fx.raw_history("main_text,midtext,subtext,time\nTomato,Sungold,,2024-01-01T08:10:00\n");
  let s = store().await;

  let report = run(&s, &fx).await;

  let tags = all_tags(&s).await;
  assert_eq!(tags.len(), 1);
  assert_eq!(tags[0].image_path, None);
  let raw = report.source(SourceKind::RawHistory).unwrap();
  assert_eq!((raw.images_resolved, raw.images_missing), (0, 1));
  assert!(report.conflicts.is_empty(), "{:?}", report.conflicts);
}

#[tokio::test]
async fn stored_images_are_not_second_guessed() {
  let fx = Fixture::new();
  let saved_path = "saved/label_tomato_cherokee-purple__20240309-101112.png";
  fx.saved_index(json!([saved_entry(tomato(), [0, 0], saved_path)]));
  fx.label_file("label_tomato_cherokee-purple__20240310-080000.png");
  fx.print_log(json!([{
    "count": 1,
    "formdata": tomato(),
    "label_template": template(),
    "offset_adjustment": [0, 0],
    "unix_time": T0,
  }]));
  let s = store().await;

  for _ in 0..2 {
    let report = run(&s, &fx).await;
    assert!(report.conflicts.is_empty(), "{:?}", report.conflicts);

    let tags = all_tags(&s).await;
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].image_path.as_deref(), Some(saved_path));
    assert_eq!(tags[0].image_source, Some(SourceKind::SavedIndex));
  }
}

// ─── Properties ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_run_changes_nothing() {
  let fx = Fixture::new();
  fx.saved_index(json!([saved_entry(tomato(), [5, -2], "labels/a.png")]));
  fx.print_log(json!([
    print_entry(tomato(), 1, T0),
    print_entry(tomato(), 1, T0),
    print_entry(json!({"main_text": "Basil", "midtext": "", "subtext": ""}), 3, T0),
  ]));
  fx.plant_list(json!([{"main_text": "Kale", "midtext": "Lacinato", "subtext": ""}]));
  fx.raw_history("main_text,midtext,subtext,count\nOkra,,,2\nOkra,,,2\n");
  let s = store().await;

  let first = run(&s, &fx).await;
  let before = all_tags(&s).await;

  let second = run(&s, &fx).await;
  let after = all_tags(&s).await;

  assert_eq!(before.len(), 4);
  assert_eq!(after.len(), before.len());
  let prints = |tags: &[Tag]| tags.iter().map(Tag::total_prints).sum::<u64>();
  assert_eq!(prints(&after), prints(&before));
  assert_eq!(prints(&after), 1 + 1 + 3 + 2 + 2);

  assert_eq!(second.total_imported(), 0);
  assert_eq!(second.total_events_added(), 0);
  let present: usize =
    second.sources.iter().map(|s| s.events_already_present).sum();
  assert_eq!(present, first.total_events_added());
}

#[tokio::test]
async fn saved_image_beats_raw_history_image() {
  let fx = Fixture::new();
  let saved_path = "saved/label_tomato_cherokee-purple__20240309-101112.png";
  fx.saved_index(json!([saved_entry(tomato(), [0, 0], saved_path)]));
  let raw_path = fx.label_file("label_tomato_cherokee-purple__20240101-080000.png");
  fx.raw_history("main_text,midtext,subtext\nTomato,Cherokee Purple,\n");
  let s = store().await;

  let report = run(&s, &fx).await;

  let tags = all_tags(&s).await;
  assert_eq!(tags.len(), 1);
  assert_eq!(tags[0].image_path.as_deref(), Some(saved_path));
  assert_eq!(tags[0].image_source, Some(SourceKind::SavedIndex));

  assert_eq!(report.conflicts.len(), 1);
  let c = &report.conflicts[0];
  assert_eq!(c.resolution, Resolution::KeptStored);
  assert_eq!(c.source, SourceKind::RawHistory);
  assert_eq!((c.kept.as_str(), c.rejected.as_str()), (saved_path, raw_path.as_str()));
}

#[tokio::test]
async fn later_trusted_image_replaces_earlier_guess() {
  let fx = Fixture::new();
  let raw_path = fx.label_file("label_tomato_cherokee-purple__20240101-080000.png");
  fx.raw_history("main_text,midtext,subtext\nTomato,Cherokee Purple,\n");
  let s = store().await;

  run(&s, &fx).await;
  assert_eq!(all_tags(&s).await[0].image_path.as_deref(), Some(raw_path.as_str()));

  let saved_path = "saved/label_tomato.png";
  fx.saved_index(json!([saved_entry(tomato(), [0, 0], saved_path)]));
  let report = run(&s, &fx).await;

  let tags = all_tags(&s).await;
  assert_eq!(tags.len(), 1);
  assert_eq!(tags[0].image_path.as_deref(), Some(saved_path));
  assert!(tags[0].is_confirmed(), "the save index confirms existing tags");
  assert!(
    report
      .conflicts
      .iter()
      .any(|c| c.resolution == Resolution::ReplacedByTrust && c.rejected == raw_path)
  );
}

#[tokio::test]
async fn disagreeing_records_in_one_group_are_conflicts() {
  let fx = Fixture::new();
  fx.saved_index(json!([
    saved_entry(tomato(), [0, 0], "labels/first.png"),
    saved_entry(tomato(), [0, 0], "labels/second.png"),
  ]));
  let s = store().await;

  let report = run(&s, &fx).await;

  assert_eq!(all_tags(&s).await[0].image_path.as_deref(), Some("labels/first.png"));
  assert_eq!(report.conflicts.len(), 1);
  assert_eq!(report.conflicts[0].resolution, Resolution::KeptRepresentative);
  assert_eq!(report.conflicts[0].rejected, "labels/second.png");
}

#[tokio::test]
async fn legacy_offsets_merge_with_migrated_entries() {
  let fx = Fixture::new();
  fx.saved_index(json!([saved_entry(tomato(), [5, -2], "labels/a.png")]));
  fx.print_log(json!([{
    "count": 1,
    "formdata": tomato(),
    "label_template": {"label": "default", "offsets": [55, -22]},
    "time": "2024-03-09T10:11:12.000000",
  }]));
  let s = store().await;

  run(&s, &fx).await;

  let tags = all_tags(&s).await;
  assert_eq!(tags.len(), 1);
  assert_eq!(tags[0].content.offset, Offset::new(5, -2));
  assert_eq!(tags[0].total_prints(), 1);
}

#[tokio::test]
async fn plant_list_images_come_from_heuristics() {
  let fx = Fixture::new();
  let basil = fx.label_file("label_basil_20240309-101112.png");
  fx.plant_list(json!([
    {"main_text": "Basil", "path": "gone/label_basil_20230101-000000.png"},
  ]));
  let s = store().await;

  let report = run(&s, &fx).await;

  let tags = all_tags(&s).await;
  assert_eq!(tags[0].image_path.as_deref(), Some(basil.as_str()));
  assert_eq!(tags[0].image_source, Some(SourceKind::CuratedList));
  assert_eq!(tags[0].content.formdata.get("subtext"), Some(""));
  assert_eq!(report.source(SourceKind::CuratedList).unwrap().images_resolved, 1);
}

#[tokio::test]
async fn missing_unreadable_and_malformed_inputs_are_reported() {
  let fx = Fixture::new();
  fx.print_log(json!([
    print_entry(tomato(), 1, T0),
    print_entry(tomato(), 0, T0),
  ]));
  fx.write(&fx.config.sources.plant_list, r#"{"not": "an array"}"#);
  let s = store().await;

  let report = run(&s, &fx).await;

  let status = |k| report.source(k).map(|s| s.status.clone());
  assert_eq!(status(SourceKind::SavedIndex), Some(SourceStatus::Missing));
  assert_eq!(status(SourceKind::RawHistory), Some(SourceStatus::Missing));
  assert!(matches!(
    status(SourceKind::CuratedList),
    Some(SourceStatus::Unreadable(_))
  ));

  let printed = report.source(SourceKind::PrintLog).unwrap();
  assert_eq!(
    (printed.read, printed.imported, printed.discarded),
    (2, 1, 1)
  );
  assert_eq!(all_tags(&s).await.len(), 1);
}

#[tokio::test]
async fn master_list_matches_reconciled_tags() {
  let fx = Fixture::new();
  fx.print_log(json!([print_entry(tomato(), 2, T0)]));
  let list = fx.dir.path().join("master-list.txt");
  std::fs::write(&list, "Cherokee Purple - 5\nOkra - 1\ngarbage\n").unwrap();
  let s = store().await;
  run(&s, &fx).await;

  let report = fuzzy::match_master_list(&s, &fx.config, &list).await.unwrap();

  assert_eq!(report.matched.len(), 1);
  assert_eq!(report.matched[0].printed, 2);
  assert_eq!(report.matched[0].remaining, 3);
  assert_eq!(report.unmatched.len(), 1);
  assert_eq!(report.skipped_lines, 1);
}
