//! SQLite backend for the sprout tag store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on one dedicated
//! thread without blocking the async runtime. That thread is the single
//! writer: every [`TagStore::apply`](sprout_core::store::TagStore::apply) is
//! one SQLite transaction.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
