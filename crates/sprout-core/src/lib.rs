//! Plant tags, their identities and print history, and the store trait.
//!
//! No file formats and no database here. Sources, the SQLite store and the
//! reconciliation engine all build on these types.

// Store methods spell out `impl Future + Send`; keep the lint quiet for any
// plain `async fn` added to the traits.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod identity;
pub mod provenance;
pub mod session;
pub mod store;
pub mod tag;

pub use error::{Error, Result};
