//! Removes duplicate alerts from a document collection.
//!
//! Alerts sharing a grouping key (KPI, dimension, dimension value) and an
//! eligible status are collapsed to the most recently detected one. See
//! [`services::Deduplicator`].

pub mod models;
pub mod services;
pub mod utils;
