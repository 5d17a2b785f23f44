//! The `TagStore` trait and supporting query and changeset types.
//!
//! The trait is implemented by storage backends (e.g. `sprout-store-sqlite`).
//! Higher layers (`sprout-reconcile`, `sprout-cli`) depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  identity::{ContentIdentity, ExactIdentity},
  provenance::SourceKind,
  tag::{Copies, NewTag, PrintEvent, Tag, TagContent, TagId},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`TagStore::list`].
#[derive(Debug, Clone, Default)]
pub struct TagQuery {
  pub confirmed_only: bool,
  pub limit:          Option<usize>,
  pub offset:         Option<usize>,
}

/// One row of [`TagStore::content_index`]: enough to match incoming records
/// against existing tags without loading print histories.
#[derive(Debug, Clone)]
pub struct IndexEntry {
  pub tag_id:     TagId,
  pub content:    ContentIdentity,
  pub exact:      ExactIdentity,
  pub created_at: DateTime<Utc>,
}

/// A tag printed inside the window given to [`TagStore::recently_printed`].
#[derive(Debug, Clone, Serialize)]
pub struct RecentPrint {
  pub tag:        Tag,
  /// Copies printed inside the window.
  pub copies:     u64,
  /// At least one print inside the window was for more than one copy.
  pub multi_copy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MostPrinted {
  pub tag:    Tag,
  pub copies: u64,
}

/// Aggregate figures over the whole store.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
  pub total_tags:     u64,
  pub confirmed_tags: u64,
  pub total_prints:   u64,
  pub most_printed:   Option<MostPrinted>,
}

// ─── Changesets ──────────────────────────────────────────────────────────────

/// Which tag a [`TagChangeset`] applies to.
#[derive(Debug, Clone)]
pub enum ChangeTarget {
  Existing(TagId),
  /// Insert this tag first. If a tag with the same exact identity already
  /// exists it is used instead.
  Create(NewTag),
}

/// A candidate image for a tag and the source that offered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpdate {
  pub path:   String,
  pub source: SourceKind,
}

/// A print event to attach, keyed by `origin` so replays are ignored.
#[derive(Debug, Clone)]
pub struct NewPrintEvent {
  pub copies:      Copies,
  pub occurred_at: DateTime<Utc>,
  /// Stable key of the source record this event came from. Events with an
  /// origin already on file are skipped; `None` never deduplicates.
  pub origin:      Option<String>,
}

/// Everything one group of matching records does to one tag. Applied
/// atomically by [`TagStore::apply`].
#[derive(Debug, Clone)]
pub struct TagChangeset {
  pub target:  ChangeTarget,
  pub confirm: bool,
  pub image:   Option<ImageUpdate>,
  pub events:  Vec<NewPrintEvent>,
}

impl TagChangeset {
  pub fn new(target: ChangeTarget) -> Self {
    Self { target, confirm: false, image: None, events: Vec::new() }
  }
}

/// What happened to a tag's image path during [`TagStore::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
  /// No candidate, or the candidate equals the stored path.
  Unchanged,
  /// The tag had no image; the candidate was stored.
  Set,
  /// The candidate came from a more trusted source and replaced `previous`.
  Replaced { previous: String },
  /// The stored path is from an equally or more trusted source and was kept.
  Rejected { kept: String },
}

#[derive(Debug, Clone)]
pub struct ChangesetOutcome {
  pub tag_id:         TagId,
  /// The target was [`ChangeTarget::Create`] and a new row was inserted.
  pub created:        bool,
  pub image:          ImageOutcome,
  pub events_added:   usize,
  /// Events skipped because their origin was already recorded.
  pub events_present: usize,
}

/// Decide whether `incoming` may overwrite an image path recorded from
/// `stored_source`. Strictly higher trust wins; an unknown stored source
/// loses to anything.
pub fn image_may_replace(
  stored_source: Option<SourceKind>,
  incoming: SourceKind,
) -> bool {
  incoming.trust() > stored_source.map_or(0, SourceKind::trust)
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a sprout tag store backend.
///
/// Tag content is immutable once stored. The only mutations are appending
/// print events, flipping `confirmed` to `true`, and changing the image path
/// under the trust rule of [`image_may_replace`].
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait TagStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Lookups ───────────────────────────────────────────────────────────

  /// Retrieve a tag with its full print history. `None` if not found.
  fn get(
    &self,
    id: TagId,
  ) -> impl Future<Output = Result<Option<Tag>, Self::Error>> + Send + '_;

  fn find_by_exact_identity(
    &self,
    exact: ExactIdentity,
  ) -> impl Future<Output = Result<Option<Tag>, Self::Error>> + Send + '_;

  /// All offset variants of one logical tag, newest first.
  fn find_by_content_identity(
    &self,
    content: ContentIdentity,
  ) -> impl Future<Output = Result<Vec<Tag>, Self::Error>> + Send + '_;

  /// Identity keys of every stored tag.
  fn content_index(
    &self,
  ) -> impl Future<Output = Result<Vec<IndexEntry>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert `tag` unless a tag with the same exact identity exists, and
  /// return the id of whichever row now holds that identity.
  fn upsert(
    &self,
    tag: NewTag,
  ) -> impl Future<Output = Result<TagId, Self::Error>> + Send + '_;

  /// Append one print event. More than one copy confirms the tag.
  fn append_print_event(
    &self,
    id: TagId,
    copies: Copies,
    occurred_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<PrintEvent, Self::Error>> + Send + '_;

  /// Apply a changeset in a single transaction.
  fn apply(
    &self,
    changeset: TagChangeset,
  ) -> impl Future<Output = Result<ChangesetOutcome, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Tags ordered by creation time, newest first.
  fn list<'a>(
    &'a self,
    query: &'a TagQuery,
  ) -> impl Future<Output = Result<Vec<Tag>, Self::Error>> + Send + 'a;

  fn count(
    &self,
    confirmed_only: bool,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Case-insensitive substring search over formdata values. A blank query
  /// lists everything.
  fn search<'a>(
    &'a self,
    text: &'a str,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<Tag>, Self::Error>> + Send + 'a;

  /// Tags with at least one print at or after `since`, most copies first.
  fn recently_printed(
    &self,
    since: DateTime<Utc>,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<RecentPrint>, Self::Error>> + Send + '_;

  fn statistics(
    &self,
  ) -> impl Future<Output = Result<Statistics, Self::Error>> + Send + '_;
}

/// Convenience for callers that hold only content: the tag that an exact
/// match, or failing that the newest logical match, resolves to.
pub async fn resolve_existing<S: TagStore>(
  store: &S,
  content: &TagContent,
) -> Result<Option<Tag>, S::Error> {
  if let Some(tag) = store.find_by_exact_identity(content.exact_identity()).await? {
    return Ok(Some(tag));
  }
  Ok(
    store
      .find_by_content_identity(content.content_identity())
      .await?
      .into_iter()
      .next(),
  )
}
