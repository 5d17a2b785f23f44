//! Caller-owned label-editing sessions.
//!
//! A session holds the work in progress between "edit" and "save" or
//! "print". Sessions live in a [`SessionRegistry`] that the caller owns and
//! passes around; nothing here is global. Each session expires `ttl` after it
//! was last touched.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{Error, Result, tag::TagContent};

/// Work in progress for one label.
#[derive(Debug, Clone)]
pub struct LabelSession {
  pub session_id:   String,
  pub content:      TagContent,
  pub created_at:   DateTime<Utc>,
  pub last_touched: DateTime<Utc>,
}

impl LabelSession {
  fn is_expired(&self, ttl: TimeDelta, now: DateTime<Utc>) -> bool {
    now - self.last_touched > ttl
  }
}

#[derive(Debug)]
pub struct SessionRegistry {
  ttl:      TimeDelta,
  sessions: HashMap<String, LabelSession>,
}

impl SessionRegistry {
  pub fn new(ttl: TimeDelta) -> Self { Self { ttl, sessions: HashMap::new() } }

  pub fn ttl(&self) -> TimeDelta { self.ttl }

  /// Start a session, replacing any previous session with the same id.
  pub fn open(
    &mut self,
    session_id: impl Into<String>,
    content: TagContent,
    now: DateTime<Utc>,
  ) -> &LabelSession {
    let session_id = session_id.into();
    let session = LabelSession {
      session_id: session_id.clone(),
      content,
      created_at: now,
      last_touched: now,
    };
    self.sessions.insert(session_id.clone(), session);
    &self.sessions[&session_id]
  }

  /// Look up a live session and refresh its expiry. An expired session is
  /// removed and reported as absent.
  pub fn get(
    &mut self,
    session_id: &str,
    now: DateTime<Utc>,
  ) -> Option<&LabelSession> {
    let ttl = self.ttl;
    if self.sessions.get(session_id)?.is_expired(ttl, now) {
      self.sessions.remove(session_id);
      return None;
    }
    let session = self.sessions.get_mut(session_id)?;
    session.last_touched = now;
    Some(session)
  }

  /// Replace the content of a live session.
  pub fn update(
    &mut self,
    session_id: &str,
    content: TagContent,
    now: DateTime<Utc>,
  ) -> Result<&LabelSession> {
    if self.get(session_id, now).is_none() {
      return Err(Error::SessionNotFound(session_id.to_owned()));
    }
    let session = self
      .sessions
      .get_mut(session_id)
      .ok_or_else(|| Error::SessionNotFound(session_id.to_owned()))?;
    session.content = content;
    Ok(session)
  }

  /// End a session. Returns it if it was still live.
  pub fn close(
    &mut self,
    session_id: &str,
    now: DateTime<Utc>,
  ) -> Option<LabelSession> {
    self
      .sessions
      .remove(session_id)
      .filter(|s| !s.is_expired(self.ttl, now))
  }

  /// Drop every expired session; returns how many were dropped.
  pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
    let ttl = self.ttl;
    let before = self.sessions.len();
    self.sessions.retain(|_, s| !s.is_expired(ttl, now));
    before - self.sessions.len()
  }

  /// Sessions held, including expired ones not yet swept.
  pub fn len(&self) -> usize { self.sessions.len() }

  pub fn is_empty(&self) -> bool { self.sessions.is_empty() }
}
