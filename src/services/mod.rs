pub mod data_api;
pub mod dedupe;
pub mod storage;
pub mod webhook;

pub use data_api::{DataApiSettings, DataApiStore};
pub use dedupe::{deduplicate, plan, DedupeOptions, DedupePlan, Deduplicator};
pub use storage::{open_store, AlertStore, DeleteOutcome, JsonFileStore, MemoryStore, Store};
pub use webhook::WebhookNotifier;
