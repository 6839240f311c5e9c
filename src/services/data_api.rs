use crate::models::{Config, EligibilityFilter, Record, RecordId, RecordSchema, StoreError};
use crate::services::storage::{AlertStore, DeleteOutcome};
use crate::utils::USER_AGENT;
use log::{debug, info, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Map, Value};

const EJSON: &str = "application/ejson";

#[derive(Debug, Clone)]
pub struct DataApiSettings {
    pub endpoint: String,
    pub api_key: String,
    pub data_source: String,
    pub database: String,
    pub collection: String,
    pub page_size: usize,
}

impl DataApiSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.store.endpoint.clone().unwrap_or_default(),
            api_key: config.store.api_key.clone().unwrap_or_default(),
            data_source: config.data_source().to_string(),
            database: config.database().to_string(),
            collection: config.collection().to_string(),
            page_size: config.page_size(),
        }
    }
}

/// Collection reached through a document database's HTTPS Data API
/// (`/action/find`, `/action/deleteMany`, `/action/aggregate`).
pub struct DataApiStore {
    client: reqwest::Client,
    settings: DataApiSettings,
    schema: RecordSchema,
}

impl DataApiStore {
    #[must_use]
    pub fn new(settings: DataApiSettings, schema: RecordSchema) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            schema,
        }
    }

    async fn action(&self, name: &str, body: Map<String, Value>) -> Result<Value, StoreError> {
        let url = format!(
            "{}/action/{name}",
            self.settings.endpoint.trim_end_matches('/')
        );

        let mut payload = Map::new();
        payload.insert("dataSource".into(), json!(self.settings.data_source));
        payload.insert("database".into(), json!(self.settings.database));
        payload.insert("collection".into(), json!(self.settings.collection));
        payload.extend(body);
        let payload = Value::Object(payload);

        debug!("data api {name} on {}", self.settings.collection);

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.settings.api_key)
            .header("User-Agent", USER_AGENT)
            .header(CONTENT_TYPE, EJSON)
            .header(ACCEPT, EJSON)
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    StoreError::Unavailable(e.to_string())
                } else {
                    StoreError::RequestFailed(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|source| StoreError::Json {
            origin: format!("data api {name} response"),
            source,
        })
    }

    async fn find_page(&self, filter: &Value, skip: usize) -> Result<Vec<Value>, StoreError> {
        let mut body = Map::new();
        body.insert("filter".into(), filter.clone());
        body.insert("sort".into(), json!({ self.schema.id_field.clone(): 1 }));
        body.insert("skip".into(), json!(skip));
        body.insert("limit".into(), json!(self.settings.page_size));

        match self.action("find", body).await?.get_mut("documents") {
            Some(Value::Array(documents)) => Ok(std::mem::take(documents)),
            _ => Err(StoreError::Malformed(
                "find response has no `documents` array".to_string(),
            )),
        }
    }
}

impl AlertStore for DataApiStore {
    async fn count(&self) -> Result<usize, StoreError> {
        let mut body = Map::new();
        body.insert("pipeline".into(), json!([{ "$count": "total" }]));

        let response = self.action("aggregate", body).await?;
        let documents = response
            .get("documents")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                StoreError::Malformed("aggregate response has no `documents` array".to_string())
            })?;

        // $count emits nothing for an empty collection
        match documents.first() {
            None => Ok(0),
            Some(doc) => doc
                .get("total")
                .and_then(parse_count)
                .ok_or_else(|| StoreError::Malformed(format!("unexpected count document: {doc}"))),
        }
    }

    async fn query(&self, filter: &EligibilityFilter) -> Result<Vec<Record>, StoreError> {
        let query = filter.to_query(&self.schema);
        let mut documents = Vec::new();

        loop {
            let page = self.find_page(&query, documents.len()).await?;
            let page_len = page.len();
            documents.extend(page);
            if page_len < self.settings.page_size {
                break;
            }
        }

        let records = crate::services::storage::select(&documents, &self.schema, filter);
        info!(
            "fetched {} eligible records from data api (collection: {})",
            records.len(),
            self.settings.collection
        );
        Ok(records)
    }

    async fn delete_many(&self, ids: &[RecordId]) -> Result<DeleteOutcome, StoreError> {
        if ids.is_empty() {
            return Ok(DeleteOutcome::default());
        }

        let id_values: Vec<Value> = ids.iter().map(RecordId::to_json).collect();
        let mut body = Map::new();
        body.insert(
            "filter".into(),
            json!({ self.schema.id_field.clone(): { "$in": id_values } }),
        );

        let response = self.action("deleteMany", body).await?;
        let deleted = response
            .get("deletedCount")
            .and_then(parse_count)
            .ok_or_else(|| {
                StoreError::Malformed("deleteMany response has no `deletedCount`".to_string())
            })?;

        if deleted < ids.len() {
            warn!("data api deleted {deleted} of {} requested records", ids.len());
        }

        Ok(DeleteOutcome {
            deleted,
            missing: Vec::new(),
        })
    }
}

/// Read a count that may arrive as a plain number or as canonical
/// extended JSON (`{"$numberInt": "3"}`).
fn parse_count(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::Object(map) => map
            .get("$numberInt")
            .or_else(|| map.get("$numberLong"))
            .and_then(Value::as_str)
            .and_then(|n| n.parse().ok()),
        _ => None,
    }
}
