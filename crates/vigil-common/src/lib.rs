//! Shared domain types for the vigil alert monitor.

pub mod id;
pub mod types;
