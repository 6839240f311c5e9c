use crate::models::{Config, EligibilityFilter, Record, RecordId, RecordSchema, StoreError};
use crate::services::data_api::{DataApiSettings, DataApiStore};
use crate::utils::{ensure_parent_dir, read_json_file, write_json_file};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use tokio::sync::Mutex;

/// Result of a bulk delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Records the store reports as actually removed.
    pub deleted: usize,
    /// Requested ids the store could not find. Empty when the store only
    /// reports a count.
    pub missing: Vec<RecordId>,
}

/// Backing store for alert documents.
pub trait AlertStore {
    /// Number of documents in the collection, eligible or not.
    fn count(&self) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Records matching `filter`.
    fn query(
        &self,
        filter: &EligibilityFilter,
    ) -> impl Future<Output = Result<Vec<Record>, StoreError>> + Send;

    /// Remove every document whose id is in `ids`, in one operation.
    fn delete_many(
        &self,
        ids: &[RecordId],
    ) -> impl Future<Output = Result<DeleteOutcome, StoreError>> + Send;
}

/// Documents kept in process memory.
pub struct MemoryStore {
    schema: RecordSchema,
    documents: Mutex<Vec<Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(schema: RecordSchema) -> Self {
        Self::with_documents(schema, Vec::new())
    }

    #[must_use]
    pub fn with_documents(schema: RecordSchema, documents: Vec<Value>) -> Self {
        Self {
            schema,
            documents: Mutex::new(documents),
        }
    }

    pub async fn documents(&self) -> Vec<Value> {
        self.documents.lock().await.clone()
    }
}

impl AlertStore for MemoryStore {
    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.documents.lock().await.len())
    }

    async fn query(&self, filter: &EligibilityFilter) -> Result<Vec<Record>, StoreError> {
        let documents = self.documents.lock().await;
        let records = select(&documents, &self.schema, filter);
        debug!("loaded {} eligible records from in-memory storage", records.len());
        Ok(records)
    }

    async fn delete_many(&self, ids: &[RecordId]) -> Result<DeleteOutcome, StoreError> {
        let mut documents = self.documents.lock().await;
        let outcome = remove_ids(&mut documents, &self.schema, ids);
        info!("deleted {} records from in-memory storage", outcome.deleted);
        Ok(outcome)
    }
}

/// Documents kept as a JSON array in a file. A missing file is an empty
/// collection.
pub struct JsonFileStore {
    schema: RecordSchema,
    path: String,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(schema: RecordSchema, path: impl Into<String>) -> Self {
        Self {
            schema,
            path: path.into(),
        }
    }

    fn load(&self) -> Result<Vec<Value>, StoreError> {
        if !Path::new(&self.path).exists() {
            return Ok(Vec::new());
        }
        let documents: Vec<Value> = read_json_file(&self.path)?;
        debug!("loaded {} documents from {}", documents.len(), self.path);
        Ok(documents)
    }
}

impl AlertStore for JsonFileStore {
    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.load()?.len())
    }

    async fn query(&self, filter: &EligibilityFilter) -> Result<Vec<Record>, StoreError> {
        Ok(select(&self.load()?, &self.schema, filter))
    }

    async fn delete_many(&self, ids: &[RecordId]) -> Result<DeleteOutcome, StoreError> {
        let mut documents = self.load()?;
        let outcome = remove_ids(&mut documents, &self.schema, ids);
        if outcome.deleted > 0 {
            write_json_file(&self.path, &documents)?;
        }
        info!("deleted {} records from {}", outcome.deleted, self.path);
        Ok(outcome)
    }
}

/// Store chosen by configuration.
pub enum Store {
    Memory(MemoryStore),
    Json(JsonFileStore),
    DataApi(DataApiStore),
}

impl AlertStore for Store {
    async fn count(&self) -> Result<usize, StoreError> {
        match self {
            Self::Memory(store) => store.count().await,
            Self::Json(store) => store.count().await,
            Self::DataApi(store) => store.count().await,
        }
    }

    async fn query(&self, filter: &EligibilityFilter) -> Result<Vec<Record>, StoreError> {
        match self {
            Self::Memory(store) => store.query(filter).await,
            Self::Json(store) => store.query(filter).await,
            Self::DataApi(store) => store.query(filter).await,
        }
    }

    async fn delete_many(&self, ids: &[RecordId]) -> Result<DeleteOutcome, StoreError> {
        match self {
            Self::Memory(store) => store.delete_many(ids).await,
            Self::Json(store) => store.delete_many(ids).await,
            Self::DataApi(store) => store.delete_many(ids).await,
        }
    }
}

/// Build the store described by `config`.
///
/// # Errors
/// Returns `StoreError::UnknownType` for an unrecognised `store.type`, or
/// `StoreError::Io` if the JSON store's directory cannot be created.
pub fn open_store(config: &Config) -> Result<Store, StoreError> {
    let schema = config.schema.clone();

    let store = match config.storage_type() {
        "memory" => Store::Memory(MemoryStore::new(schema)),
        "json" => {
            let path = config.storage_path();
            ensure_parent_dir(path).map_err(|source| StoreError::Io {
                path: path.to_string(),
                source,
            })?;
            Store::Json(JsonFileStore::new(schema, path))
        }
        "data_api" => {
            Store::DataApi(DataApiStore::new(DataApiSettings::from_config(config), schema))
        }
        other => return Err(StoreError::UnknownType(other.to_string())),
    };

    info!(
        "storage initialized - type: {}, collection: {}",
        config.storage_type(),
        match config.storage_type() {
            "json" => config.storage_path(),
            "data_api" => config.collection(),
            _ => "(process memory)",
        }
    );

    Ok(store)
}

/// Extract records from raw documents and keep the eligible ones.
pub(crate) fn select(
    documents: &[Value],
    schema: &RecordSchema,
    filter: &EligibilityFilter,
) -> Vec<Record> {
    let mut skipped = 0usize;
    let records: Vec<Record> = documents
        .iter()
        .filter_map(|doc| {
            let record = schema.extract(doc);
            if record.is_none() {
                skipped += 1;
            }
            record
        })
        .filter(|record| filter.matches(record))
        .collect();

    if skipped > 0 {
        warn!(
            "skipped {skipped} documents without a usable `{}` field",
            schema.id_field
        );
    }
    records
}

fn remove_ids(
    documents: &mut Vec<Value>,
    schema: &RecordSchema,
    ids: &[RecordId],
) -> DeleteOutcome {
    let wanted: HashSet<&RecordId> = ids.iter().collect();
    let mut found: HashSet<RecordId> = HashSet::new();
    let before = documents.len();

    documents.retain(|doc| match schema.document_id(doc) {
        Some(id) if wanted.contains(&id) => {
            found.insert(id);
            false
        }
        _ => true,
    });

    let mut missing: Vec<RecordId> = wanted
        .into_iter()
        .filter(|id| !found.contains(*id))
        .cloned()
        .collect();
    missing.sort();

    DeleteOutcome {
        deleted: before - documents.len(),
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alert(id: &str, kpi: &str, status: &str, at: &str) -> Value {
        json!({
            "_id": { "$oid": id },
            "kpiName": kpi,
            "dimension": "region",
            "dimensionValue": "north",
            "alertStatus": status,
            "detectedAt": at
        })
    }

    fn pending() -> EligibilityFilter {
        EligibilityFilter::new(["PENDING_DECISION"])
    }

    #[tokio::test]
    async fn test_memory_store_query_and_delete() {
        let store = MemoryStore::with_documents(
            RecordSchema::default(),
            vec![
                alert("a1", "churn", "PENDING_DECISION", "2025-01-01T00:00:00Z"),
                alert("a2", "churn", "RESOLVED", "2025-01-02T00:00:00Z"),
                json!({ "kpiName": "orphan", "alertStatus": "PENDING_DECISION" }),
            ],
        );

        assert_eq!(store.count().await.unwrap(), 3);
        let records = store.query(&pending()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, RecordId::ObjectId("a1".to_string()));

        let outcome = store
            .delete_many(&[
                RecordId::ObjectId("a1".to_string()),
                RecordId::ObjectId("zz".to_string()),
            ])
            .await
            .unwrap();
        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.missing, vec![RecordId::ObjectId("zz".to_string())]);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_repeated_ids_count_once() {
        let store = MemoryStore::with_documents(
            RecordSchema::default(),
            vec![alert("a1", "churn", "PENDING_DECISION", "2025-01-01T00:00:00Z")],
        );
        let id = RecordId::ObjectId("a1".to_string());

        let outcome = store.delete_many(&[id.clone(), id]).await.unwrap();
        assert_eq!(outcome.deleted, 1);
        assert!(outcome.missing.is_empty());
    }

    #[tokio::test]
    async fn test_shared_id_counts_every_removed_document() {
        let store = MemoryStore::with_documents(
            RecordSchema::default(),
            vec![
                alert("a1", "churn", "PENDING_DECISION", "2025-01-01T00:00:00Z"),
                alert("a1", "churn", "PENDING_DECISION", "2025-01-02T00:00:00Z"),
                alert("b2", "nps", "PENDING_DECISION", "2025-01-03T00:00:00Z"),
            ],
        );

        let outcome = store
            .delete_many(&[RecordId::ObjectId("a1".to_string())])
            .await
            .unwrap();
        assert_eq!(outcome.deleted, 2);
        assert!(outcome.missing.is_empty());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_json_store_persists_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");
        std::fs::write(
            &path,
            serde_json::to_string(&vec![
                alert("a1", "churn", "PENDING_DECISION", "2025-01-01T00:00:00Z"),
                alert("a2", "churn", "PENDING_DECISION", "2025-01-02T00:00:00Z"),
            ])
            .unwrap(),
        )
        .unwrap();

        let store = JsonFileStore::new(RecordSchema::default(), path.to_string_lossy());
        assert_eq!(store.count().await.unwrap(), 2);

        let outcome = store
            .delete_many(&[RecordId::ObjectId("a1".to_string())])
            .await
            .unwrap();
        assert_eq!(outcome.deleted, 1);

        let reopened = JsonFileStore::new(RecordSchema::default(), path.to_string_lossy());
        let records = reopened.query(&pending()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, RecordId::ObjectId("a2".to_string()));
    }

    #[tokio::test]
    async fn test_json_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(
            RecordSchema::default(),
            dir.path().join("absent.json").to_string_lossy(),
        );
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.query(&pending()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(RecordSchema::default(), path.to_string_lossy());
        assert!(matches!(store.count().await, Err(StoreError::Json { .. })));
    }

    #[test]
    fn test_open_store_unknown_type() {
        let config = Config::from_toml_str("[store]\ntype = \"redis\"\n").unwrap();
        assert!(matches!(
            open_store(&config),
            Err(StoreError::UnknownType(kind)) if kind == "redis"
        ));
    }

    #[test]
    fn test_open_store_memory() {
        let config = Config::from_toml_str("[store]\ntype = \"memory\"\n").unwrap();
        assert!(matches!(open_store(&config), Ok(Store::Memory(_))));
    }
}
