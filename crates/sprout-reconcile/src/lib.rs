//! Reconciliation of the historical label sources into one tag store.
//!
//! [`engine::reconcile`] runs the priority-ordered merge and returns a
//! [`ReconcileReport`]. [`fuzzy`] matches a hand-written master list against
//! the result, and [`capture`] records live saves and prints from an editing
//! session.

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod report;

pub use config::{ReconcileConfig, SourcePaths};
pub use engine::{Reconciler, reconcile};
pub use error::{Error, Result};
pub use report::{Conflict, ReconcileReport, SourceReport, SourceStatus};

#[cfg(test)]
mod tests;
