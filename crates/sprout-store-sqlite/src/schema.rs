//! SQL schema for the sprout SQLite store.
//!
//! Executed once at connection startup. Later migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per exact rendering. Identity columns are never updated; only
-- confirmed, image_path and image_source change after insert.
CREATE TABLE IF NOT EXISTS tags (
    tag_id            INTEGER PRIMARY KEY AUTOINCREMENT,
    content_identity  TEXT    NOT NULL,   -- hex sha-256 of formdata + template name
    exact_identity    TEXT    NOT NULL UNIQUE,
    formdata          TEXT    NOT NULL,   -- JSON object, field -> text
    template          TEXT    NOT NULL,   -- JSON {name, base_offsets}
    offset_adjustment TEXT    NOT NULL,   -- JSON [dx, dy]
    image_path        TEXT,
    image_source      TEXT,               -- source kind that supplied image_path
    origin            TEXT    NOT NULL,   -- source kind that created the row
    created_at        TEXT    NOT NULL,   -- RFC 3339 UTC
    confirmed         INTEGER NOT NULL DEFAULT 0 CHECK (confirmed IN (0, 1)),
    search_text       TEXT    NOT NULL    -- lowercased formdata values, one per line
);

-- Append-only. origin is the replay key of an imported event; live prints
-- leave it NULL and never collide.
CREATE TABLE IF NOT EXISTS print_events (
    event_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_id      INTEGER NOT NULL REFERENCES tags(tag_id),
    copies      INTEGER NOT NULL CHECK (copies > 0),
    occurred_at TEXT    NOT NULL,
    unix_time   INTEGER NOT NULL,
    origin      TEXT    UNIQUE
);

CREATE TRIGGER IF NOT EXISTS tags_confirmed_monotonic
BEFORE UPDATE OF confirmed ON tags
WHEN OLD.confirmed = 1 AND NEW.confirmed = 0
BEGIN
    SELECT RAISE(ABORT, 'confirmed cannot be cleared');
END;

CREATE INDEX IF NOT EXISTS tags_content_idx        ON tags(content_identity);
CREATE INDEX IF NOT EXISTS tags_created_idx        ON tags(created_at);
CREATE INDEX IF NOT EXISTS print_events_tag_idx    ON print_events(tag_id);
CREATE INDEX IF NOT EXISTS print_events_time_idx   ON print_events(unix_time);

PRAGMA user_version = 1;
";
