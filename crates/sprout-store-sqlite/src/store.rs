//! [`SqliteStore`], the SQLite implementation of [`TagStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use sprout_core::{
  identity::{ContentIdentity, ExactIdentity},
  provenance::SourceKind,
  store::{
    ChangeTarget, ChangesetOutcome, ImageOutcome, IndexEntry, MostPrinted,
    RecentPrint, Statistics, TagChangeset, TagQuery, TagStore,
    image_may_replace,
  },
  tag::{Copies, NewTag, PrintEvent, Tag, TagId},
};
use tracing::warn;

use crate::{
  Error, Result,
  encode::{
    RawEvent, RawTag, TagRow, decode_dt, encode_dt, matches_needle,
    search_needle,
  },
  schema::SCHEMA,
};

/// Columns selected for every tag read, in [`raw_tag`] order.
const TAG_COLUMNS: &str = "t.tag_id, t.formdata, t.template, \
                           t.offset_adjustment, t.image_path, t.image_source, \
                           t.origin, t.created_at, t.confirmed";

/// Default ordering of tag listings: newest first, ties by id.
const NEWEST_FIRST: &str = "ORDER BY t.created_at DESC, t.tag_id DESC";

// ─── Row helpers (run on the connection thread) ──────────────────────────────

fn raw_tag(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTag> {
  Ok(RawTag {
    tag_id:       row.get(0)?,
    formdata:     row.get(1)?,
    template:     row.get(2)?,
    offset:       row.get(3)?,
    image_path:   row.get(4)?,
    image_source: row.get(5)?,
    origin:       row.get(6)?,
    created_at:   row.get(7)?,
    confirmed:    row.get(8)?,
    events:       Vec::new(),
  })
}

/// Fill in each tag's print history, in insertion order.
fn attach_events(
  conn: &rusqlite::Connection,
  tags: &mut [RawTag],
) -> rusqlite::Result<()> {
  let mut stmt = conn.prepare_cached(
    "SELECT copies, occurred_at FROM print_events
     WHERE tag_id = ?1 ORDER BY event_id",
  )?;
  for tag in tags {
    tag.events = stmt
      .query_map([tag.tag_id], |row| {
        Ok(RawEvent { copies: row.get(0)?, occurred_at: row.get(1)? })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
  }
  Ok(())
}

/// Run a query selecting [`TAG_COLUMNS`] and load the histories.
fn fetch_tags(
  conn: &rusqlite::Connection,
  sql: &str,
  params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<RawTag>> {
  let mut stmt = conn.prepare(sql)?;
  let mut tags = stmt
    .query_map(params, raw_tag)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  attach_events(conn, &mut tags)?;
  Ok(tags)
}

fn tag_exists(conn: &rusqlite::Connection, tag_id: i64) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row("SELECT 1 FROM tags WHERE tag_id = ?1", [tag_id], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

/// Insert unless the exact identity is taken. Returns the row id holding
/// that identity and whether it was inserted now.
fn insert_tag(
  conn: &rusqlite::Connection,
  row: &TagRow,
) -> rusqlite::Result<(i64, bool)> {
  let inserted = conn.execute(
    "INSERT INTO tags (
       content_identity, exact_identity, formdata, template, offset_adjustment,
       image_path, image_source, origin, created_at, confirmed, search_text
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
     ON CONFLICT(exact_identity) DO NOTHING",
    rusqlite::params![
      row.content_identity,
      row.exact_identity,
      row.formdata,
      row.template,
      row.offset,
      row.image_path,
      row.image_source,
      row.origin,
      row.created_at,
      row.confirmed,
      row.search_text,
    ],
  )?;
  let tag_id = conn.query_row(
    "SELECT tag_id FROM tags WHERE exact_identity = ?1",
    [&row.exact_identity],
    |r| r.get(0),
  )?;
  Ok((tag_id, inserted == 1))
}

/// Offer `path` as the tag's image and apply the trust rule.
fn offer_image(
  conn: &rusqlite::Connection,
  tag_id: i64,
  path: String,
  source: SourceKind,
) -> rusqlite::Result<ImageOutcome> {
  let (stored, stored_source): (Option<String>, Option<String>) = conn
    .query_row(
      "SELECT image_path, image_source FROM tags WHERE tag_id = ?1",
      [tag_id],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
  // An unparseable stored source is treated as unknown, which any source
  // may override.
  let stored_source = stored_source.and_then(|s| s.parse::<SourceKind>().ok());

  let outcome = match stored {
    None => ImageOutcome::Set,
    Some(previous) if previous == path => {
      if image_may_replace(stored_source, source) {
        conn.execute(
          "UPDATE tags SET image_source = ?2 WHERE tag_id = ?1",
          rusqlite::params![tag_id, source.as_str()],
        )?;
      }
      return Ok(ImageOutcome::Unchanged);
    }
    Some(previous) if image_may_replace(stored_source, source) => {
      ImageOutcome::Replaced { previous }
    }
    Some(kept) => return Ok(ImageOutcome::Rejected { kept }),
  };

  conn.execute(
    "UPDATE tags SET image_path = ?2, image_source = ?3 WHERE tag_id = ?1",
    rusqlite::params![tag_id, path, source.as_str()],
  )?;
  Ok(outcome)
}

/// Returns whether a row was inserted.
fn insert_event(
  conn: &rusqlite::Connection,
  tag_id: i64,
  copies: i64,
  occurred_at: DateTime<Utc>,
  origin: Option<&str>,
) -> rusqlite::Result<bool> {
  let inserted = conn.execute(
    "INSERT INTO print_events (tag_id, copies, occurred_at, unix_time, origin)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT(origin) DO NOTHING",
    rusqlite::params![
      tag_id,
      copies,
      encode_dt(occurred_at),
      occurred_at.timestamp(),
      origin,
    ],
  )?;
  if inserted == 1 && copies > 1 {
    conn.execute("UPDATE tags SET confirmed = 1 WHERE tag_id = ?1", [tag_id])?;
  }
  Ok(inserted == 1)
}

/// Result of a write closure. A missing tag is a value rather than an error
/// so the transaction rolls back and the caller maps it.
enum Written<T> {
  Done(T),
  Missing(i64),
}

impl<T> Written<T> {
  fn into_result(self) -> Result<T> {
    match self {
      Self::Done(v) => Ok(v),
      Self::Missing(id) => Err(Error::TagNotFound(TagId(id))),
    }
  }
}

fn limit_param(limit: Option<usize>) -> i64 {
  limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A sprout tag store backed by a single SQLite file.
///
/// Clones share one reference-counted connection.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn load_where(
    &self,
    where_clause: &'static str,
    key: String,
  ) -> Result<Vec<Tag>> {
    let raws = self
      .conn
      .call(move |conn| {
        let sql =
          format!("SELECT {TAG_COLUMNS} FROM tags t {where_clause} {NEWEST_FIRST}");
        Ok(fetch_tags(conn, &sql, [key])?)
      })
      .await?;
    raws.into_iter().map(RawTag::into_tag).collect()
  }

  async fn search_indexed(&self, needle: String, limit: i64) -> Result<Vec<Tag>> {
    let raws = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {TAG_COLUMNS} FROM tags t
           WHERE instr(t.search_text, ?1) > 0
           {NEWEST_FIRST} LIMIT ?2"
        );
        Ok(fetch_tags(conn, &sql, rusqlite::params![needle, limit])?)
      })
      .await?;
    raws.into_iter().map(RawTag::into_tag).collect()
  }

  /// Full scan with the same matching rule as [`Self::search_indexed`].
  async fn search_scan(&self, needle: &str, limit: Option<usize>) -> Result<Vec<Tag>> {
    let all = self.list(&TagQuery::default()).await?;
    Ok(
      all
        .into_iter()
        .filter(|t| matches_needle(t, needle))
        .take(limit.unwrap_or(usize::MAX))
        .collect(),
    )
  }
}

// ─── TagStore impl ───────────────────────────────────────────────────────────

impl TagStore for SqliteStore {
  type Error = Error;

  // ── Lookups ───────────────────────────────────────────────────────────────

  async fn get(&self, id: TagId) -> Result<Option<Tag>> {
    let raws = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {TAG_COLUMNS} FROM tags t WHERE t.tag_id = ?1");
        Ok(fetch_tags(conn, &sql, [id.0])?)
      })
      .await?;
    raws.into_iter().next().map(RawTag::into_tag).transpose()
  }

  async fn find_by_exact_identity(
    &self,
    exact: ExactIdentity,
  ) -> Result<Option<Tag>> {
    let tags = self
      .load_where("WHERE t.exact_identity = ?1", exact.to_hex())
      .await?;
    Ok(tags.into_iter().next())
  }

  async fn find_by_content_identity(
    &self,
    content: ContentIdentity,
  ) -> Result<Vec<Tag>> {
    self
      .load_where("WHERE t.content_identity = ?1", content.to_hex())
      .await
  }

  async fn content_index(&self) -> Result<Vec<IndexEntry>> {
    let rows: Vec<(i64, String, String, String)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT tag_id, content_identity, exact_identity, created_at
           FROM tags ORDER BY tag_id",
        )?;
        let rows = stmt
          .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(id, content, exact, created_at)| -> Result<IndexEntry> {
        Ok(IndexEntry {
          tag_id:     TagId(id),
          content:    content.parse()?,
          exact:      exact.parse()?,
          created_at: decode_dt(&created_at)?,
        })
      })
      .collect()
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn upsert(&self, tag: NewTag) -> Result<TagId> {
    let row = TagRow::encode(&tag)?;
    let (id, _) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let out = insert_tag(&tx, &row)?;
        tx.commit()?;
        Ok(out)
      })
      .await?;
    Ok(TagId(id))
  }

  async fn append_print_event(
    &self,
    id: TagId,
    copies: Copies,
    occurred_at: DateTime<Utc>,
  ) -> Result<PrintEvent> {
    let n = i64::from(copies);
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !tag_exists(&tx, id.0)? {
          return Ok(Written::Missing(id.0));
        }
        insert_event(&tx, id.0, n, occurred_at, None)?;
        tx.commit()?;
        Ok(Written::Done(()))
      })
      .await?
      .into_result()?;
    Ok(PrintEvent { copies, occurred_at })
  }

  async fn apply(&self, changeset: TagChangeset) -> Result<ChangesetOutcome> {
    let TagChangeset { target, confirm, image, events } = changeset;
    let create = match target {
      ChangeTarget::Existing(id) => Err(id.0),
      ChangeTarget::Create(tag) => Ok(TagRow::encode(&tag)?),
    };

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let (tag_id, created) = match create {
          Ok(row) => insert_tag(&tx, &row)?,
          Err(id) if tag_exists(&tx, id)? => (id, false),
          Err(id) => return Ok(Written::Missing(id)),
        };

        if confirm {
          tx.execute("UPDATE tags SET confirmed = 1 WHERE tag_id = ?1", [tag_id])?;
        }

        let image = match image {
          Some(update) => offer_image(&tx, tag_id, update.path, update.source)?,
          None => ImageOutcome::Unchanged,
        };

        let (mut events_added, mut events_present) = (0, 0);
        for event in &events {
          let added = insert_event(
            &tx,
            tag_id,
            i64::from(event.copies),
            event.occurred_at,
            event.origin.as_deref(),
          )?;
          if added {
            events_added += 1;
          } else {
            events_present += 1;
          }
        }

        tx.commit()?;
        Ok(Written::Done(ChangesetOutcome {
          tag_id: TagId(tag_id),
          created,
          image,
          events_added,
          events_present,
        }))
      })
      .await?
      .into_result()
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn list(&self, query: &TagQuery) -> Result<Vec<Tag>> {
    let confirmed_only = query.confirmed_only;
    let limit = limit_param(query.limit);
    let offset = i64::try_from(query.offset.unwrap_or(0)).unwrap_or(i64::MAX);

    let raws = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {TAG_COLUMNS} FROM tags t
           WHERE (?1 = 0 OR t.confirmed = 1)
           {NEWEST_FIRST} LIMIT ?2 OFFSET ?3"
        );
        Ok(fetch_tags(
          conn,
          &sql,
          rusqlite::params![confirmed_only, limit, offset],
        )?)
      })
      .await?;
    raws.into_iter().map(RawTag::into_tag).collect()
  }

  async fn count(&self, confirmed_only: bool) -> Result<u64> {
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM tags WHERE (?1 = 0 OR confirmed = 1)",
          [confirmed_only],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(n as u64)
  }

  async fn search(&self, text: &str, limit: Option<usize>) -> Result<Vec<Tag>> {
    let Some(needle) = search_needle(text) else {
      return self.list(&TagQuery { limit, ..TagQuery::default() }).await;
    };

    match self.search_indexed(needle.clone(), limit_param(limit)).await {
      Err(Error::Database(e)) => {
        warn!(error = %e, "indexed search failed, scanning all tags");
        self.search_scan(&needle, limit).await
      }
      other => other,
    }
  }

  async fn recently_printed(
    &self,
    since: DateTime<Utc>,
    limit: Option<usize>,
  ) -> Result<Vec<RecentPrint>> {
    let since = since.timestamp();
    let limit = limit_param(limit);

    let rows: Vec<(RawTag, i64, i64)> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {TAG_COLUMNS}, w.copies, w.largest
           FROM tags t
           JOIN (
             SELECT tag_id, SUM(copies) AS copies, MAX(copies) AS largest
             FROM print_events WHERE unix_time >= ?1 GROUP BY tag_id
           ) w ON w.tag_id = t.tag_id
           ORDER BY w.copies DESC, t.tag_id ASC
           LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<(RawTag, i64, i64)> = stmt
          .query_map(rusqlite::params![since, limit], |r| {
            Ok((raw_tag(r)?, r.get(9)?, r.get(10)?))
          })?
          .collect::<rusqlite::Result<_>>()?;
        let (mut tags, windows): (Vec<RawTag>, Vec<(i64, i64)>) =
          rows.into_iter().map(|(t, c, l)| (t, (c, l))).unzip();
        attach_events(conn, &mut tags)?;
        Ok(
          tags
            .into_iter()
            .zip(windows)
            .map(|(t, (c, l))| (t, c, l))
            .collect(),
        )
      })
      .await?;

    rows
      .into_iter()
      .map(|(raw, copies, largest)| -> Result<RecentPrint> {
        Ok(RecentPrint {
          tag:        raw.into_tag()?,
          copies:     copies as u64,
          multi_copy: largest > 1,
        })
      })
      .collect()
  }

  async fn statistics(&self) -> Result<Statistics> {
    let (total, confirmed, prints, top): (i64, i64, i64, Option<(i64, i64)>) =
      self
        .conn
        .call(|conn| {
          let (total, confirmed): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(confirmed), 0) FROM tags",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )?;
          let prints: i64 = conn.query_row(
            "SELECT COALESCE(SUM(copies), 0) FROM print_events",
            [],
            |r| r.get(0),
          )?;
          let top = conn
            .query_row(
              "SELECT tag_id, SUM(copies) AS n FROM print_events
               GROUP BY tag_id ORDER BY n DESC, tag_id ASC LIMIT 1",
              [],
              |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
          Ok((total, confirmed, prints, top))
        })
        .await?;

    let most_printed = match top {
      Some((id, copies)) => self
        .get(TagId(id))
        .await?
        .map(|tag| MostPrinted { tag, copies: copies as u64 }),
      None => None,
    };

    Ok(Statistics {
      total_tags: total as u64,
      confirmed_tags: confirmed as u64,
      total_prints: prints as u64,
      most_printed,
    })
  }
}
