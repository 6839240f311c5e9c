use std::sync::{Arc, Mutex};

use alertsweep::models::{DedupeError, EligibilityFilter, RecordId, RecordSchema, StoreError};
use alertsweep::services::{deduplicate, AlertStore, DataApiSettings, DataApiStore, DedupeOptions};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

const API_KEY: &str = "test-key";

#[derive(Clone, Default)]
struct FakeDataApi {
    documents: Arc<Mutex<Vec<Value>>>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FakeDataApi {
    fn with_documents(documents: Vec<Value>) -> Self {
        Self {
            documents: Arc::new(Mutex::new(documents)),
            ..Self::default()
        }
    }

    fn calls_to(&self, action: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == action)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

fn oid(n: u32) -> Value {
    json!({ "$oid": format!("{n:024x}") })
}

fn alert(n: u32, kpi: &str, status: &str, millis: i64) -> Value {
    json!({
        "_id": oid(n),
        "kpiName": kpi,
        "dimension": "region",
        "dimensionValue": "north",
        "alertStatus": status,
        "detectedAt": { "$date": { "$numberLong": millis.to_string() } }
    })
}

fn matches(doc: &Value, filter: &Value) -> bool {
    filter.as_object().map_or(true, |conditions| {
        conditions.iter().all(|(field, condition)| {
            let actual = &doc[field.as_str()];
            match condition.get("$in").and_then(Value::as_array) {
                Some(options) => options.contains(actual),
                None => actual == condition,
            }
        })
    })
}

fn accept(
    state: &FakeDataApi,
    action: &str,
    headers: &HeaderMap,
    body: &str,
) -> Result<Value, StatusCode> {
    if headers.get("api-key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let body: Value = serde_json::from_str(body).map_err(|_| StatusCode::BAD_REQUEST)?;
    assert_eq!(body["collection"], "kpiAlerts");
    assert_eq!(body["database"], "demo_db");
    state
        .calls
        .lock()
        .unwrap()
        .push((action.to_string(), body.clone()));
    Ok(body)
}

async fn find(
    State(state): State<FakeDataApi>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, StatusCode> {
    let body = accept(&state, "find", &headers, &body)?;
    let skip = body["skip"].as_u64().unwrap_or(0) as usize;
    let limit = body["limit"].as_u64().unwrap_or(1000) as usize;

    let mut documents: Vec<Value> = state
        .documents
        .lock()
        .unwrap()
        .iter()
        .filter(|doc| matches(doc, &body["filter"]))
        .cloned()
        .collect();
    documents.sort_by_key(|doc| doc["_id"]["$oid"].as_str().unwrap_or_default().to_string());

    let page: Vec<Value> = documents.into_iter().skip(skip).take(limit).collect();
    Ok(Json(json!({ "documents": page })))
}

async fn delete_many(
    State(state): State<FakeDataApi>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, StatusCode> {
    let body = accept(&state, "deleteMany", &headers, &body)?;
    let mut documents = state.documents.lock().unwrap();
    let before = documents.len();
    documents.retain(|doc| !matches(doc, &body["filter"]));
    let deleted = before - documents.len();
    Ok(Json(json!({ "deletedCount": { "$numberInt": deleted.to_string() } })))
}

async fn aggregate(
    State(state): State<FakeDataApi>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, StatusCode> {
    let body = accept(&state, "aggregate", &headers, &body)?;
    assert_eq!(body["pipeline"], json!([{ "$count": "total" }]));
    let total = state.documents.lock().unwrap().len();
    let documents = if total == 0 {
        json!([])
    } else {
        json!([{ "total": { "$numberInt": total.to_string() } }])
    };
    Ok(Json(json!({ "documents": documents })))
}

async fn spawn_fake(state: FakeDataApi) -> String {
    let app = Router::new()
        .route("/action/find", post(find))
        .route("/action/deleteMany", post(delete_many))
        .route("/action/aggregate", post(aggregate))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

fn settings(endpoint: String, api_key: &str, page_size: usize) -> DataApiSettings {
    DataApiSettings {
        endpoint,
        api_key: api_key.to_string(),
        data_source: "Cluster0".to_string(),
        database: "demo_db".to_string(),
        collection: "kpiAlerts".to_string(),
        page_size,
    }
}

fn pending() -> EligibilityFilter {
    EligibilityFilter::new(["PENDING_DECISION"])
}

#[tokio::test]
async fn cleans_duplicates_through_the_data_api() {
    let fake = FakeDataApi::with_documents(vec![
        alert(1, "churn", "PENDING_DECISION", 1_000),
        alert(2, "churn", "PENDING_DECISION", 3_000),
        alert(3, "churn", "PENDING_DECISION", 2_000),
        alert(4, "nps", "PENDING_DECISION", 1_000),
        alert(5, "churn", "RESOLVED", 9_000),
    ]);
    let endpoint = spawn_fake(fake.clone()).await;
    let store = DataApiStore::new(settings(endpoint, API_KEY, 2), RecordSchema::default());

    let report = deduplicate(&store, &pending(), &DedupeOptions::default())
        .await
        .unwrap();

    assert_eq!(report.count_before, 5);
    assert_eq!(report.eligible_before, 4);
    assert_eq!(report.count_deleted, 2);
    assert_eq!(report.count_after, 3);
    assert_eq!(report.decisions[0].kept_id, RecordId::ObjectId(format!("{:024x}", 2)));

    // planning reads pages [1, 2], [3, 4], []; the summary reads [2, 4], []
    let finds = fake.calls_to("find");
    assert_eq!(finds.len(), 5);
    assert_eq!(finds[1]["skip"], 2);
    assert_eq!(finds[0]["filter"], json!({ "alertStatus": "PENDING_DECISION" }));

    let deletes = fake.calls_to("deleteMany");
    assert_eq!(deletes.len(), 1);
    assert_eq!(
        deletes[0]["filter"],
        json!({ "_id": { "$in": [oid(3), oid(1)] } })
    );

    let left: Vec<Value> = fake
        .documents
        .lock()
        .unwrap()
        .iter()
        .map(|d| d["_id"].clone())
        .collect();
    assert_eq!(left, vec![oid(2), oid(4), oid(5)]);
}

#[tokio::test]
async fn empty_collection_counts_zero() {
    let fake = FakeDataApi::default();
    let endpoint = spawn_fake(fake.clone()).await;
    let store = DataApiStore::new(settings(endpoint, API_KEY, 10), RecordSchema::default());

    assert_eq!(store.count().await.unwrap(), 0);
    let report = deduplicate(&store, &pending(), &DedupeOptions::default())
        .await
        .unwrap();
    assert_eq!(report.count_after, 0);
    assert!(fake.calls_to("find").is_empty());
}

#[tokio::test]
async fn rejected_api_key_surfaces_status() {
    let fake = FakeDataApi::with_documents(vec![alert(1, "churn", "PENDING_DECISION", 1)]);
    let endpoint = spawn_fake(fake).await;
    let store = DataApiStore::new(settings(endpoint, "wrong", 10), RecordSchema::default());

    let err = deduplicate(&store, &pending(), &DedupeOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DedupeError::StoreUnavailable(StoreError::HttpStatus { status: 401, .. })
    ));
}

#[tokio::test]
async fn unreachable_endpoint_is_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = DataApiStore::new(
        settings(format!("http://{addr}"), API_KEY, 10),
        RecordSchema::default(),
    );

    assert!(matches!(store.count().await, Err(StoreError::Unavailable(_))));
}
