//! Recording live saves and prints from an editing session.
//!
//! A save is trusted like the saved-label index and a print like the print
//! log, since those files were written by exactly these actions. Each call is
//! one [`TagStore::apply`].

use chrono::{DateTime, Utc};
use sprout_core::{
  provenance::SourceKind,
  session::LabelSession,
  store::{
    ChangeTarget, ChangesetOutcome, ImageUpdate, NewPrintEvent, TagChangeset,
    TagStore,
  },
  tag::{Copies, NewTag},
};
use tracing::info;

use crate::{Error, Result};

fn target(session: &LabelSession, source: SourceKind, at: DateTime<Utc>) -> ChangeTarget {
  ChangeTarget::Create(NewTag::new(session.content.clone(), source, at))
}

/// Store the session's exact rendering as a confirmed tag with `image_path`.
pub async fn record_save<S: TagStore>(
  store: &S,
  session: &LabelSession,
  image_path: impl Into<String>,
  at: DateTime<Utc>,
) -> Result<ChangesetOutcome> {
  let source = SourceKind::SavedIndex;
  let mut changeset = TagChangeset::new(target(session, source, at));
  changeset.confirm = true;
  changeset.image = Some(ImageUpdate { path: image_path.into(), source });

  let outcome = store.apply(changeset).await.map_err(Error::store)?;
  info!(
    session = %session.session_id,
    tag = %outcome.tag_id,
    created = outcome.created,
    "label saved"
  );
  Ok(outcome)
}

/// Record `copies` printed of the session's exact rendering, creating an
/// unconfirmed tag for it first if needed.
pub async fn record_print<S: TagStore>(
  store: &S,
  session: &LabelSession,
  copies: Copies,
  at: DateTime<Utc>,
) -> Result<ChangesetOutcome> {
  let mut changeset =
    TagChangeset::new(target(session, SourceKind::PrintLog, at));
  changeset.events.push(NewPrintEvent { copies, occurred_at: at, origin: None });

  let outcome = store.apply(changeset).await.map_err(Error::store)?;
  info!(
    session = %session.session_id,
    tag = %outcome.tag_id,
    %copies,
    "label printed"
  );
  Ok(outcome)
}
