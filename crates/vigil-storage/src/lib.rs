//! Durable alert storage: reconciliation, lifecycle transitions, and
//! retention cleanup over SeaORM + SQLite.
//!
//! [`AlertStore`] is the single access layer. All mutating operations run
//! inside one transaction per call, so a reconciliation batch or a
//! lifecycle transition either lands completely or not at all.

pub mod entities;
pub mod error;
pub mod store;


pub use error::{Result, StoreError};
pub use store::alert::{
    AcknowledgmentRow, AlertFilter, AlertRow, HistoryRow, ReconcileCounts, ReconcileOutcome,
};
pub use store::AlertStore;
