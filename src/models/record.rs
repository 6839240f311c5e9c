use crate::utils::parse_document_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use std::fmt;

/// Identifier of a stored document.
///
/// Keeps the shape the store handed out so a delete filter can echo it back
/// unchanged (an ObjectId must be sent as `{"$oid": ..}`, not as a string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordId {
    ObjectId(String),
    Number(i64),
    Text(String),
}

impl RecordId {
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::Object(map) => {
                if let Some(Value::String(oid)) = map.get("$oid") {
                    return Some(Self::ObjectId(oid.to_ascii_lowercase()));
                }
                map.get("$numberLong")
                    .or_else(|| map.get("$numberInt"))
                    .and_then(Value::as_str)
                    .and_then(|n| n.parse().ok())
                    .map(Self::Number)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::ObjectId(oid) => json!({ "$oid": oid }),
            Self::Number(n) => json!(n),
            Self::Text(s) => json!(s),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectId(oid) => write!(f, "{oid}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Ordered tuple of the categorical fields that define a duplicate.
///
/// `None` stands for a field that is missing or null on the document; two
/// documents that both lack a field group together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey(pub Vec<Option<String>>);

impl GroupKey {
    /// First component of the key, used for the per-category summary.
    #[must_use]
    pub fn leading(&self) -> Option<&str> {
        self.0.first().and_then(|part| part.as_deref())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self
            .0
            .iter()
            .map(|part| part.as_deref().unwrap_or("<none>"))
            .collect();
        write!(f, "{}", parts.join(" / "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub key: GroupKey,
    pub status: Option<String>,
    /// `None` when the document carries no readable timestamp; sorts as oldest.
    pub detected_at: Option<DateTime<Utc>>,
}

/// Maps document field names onto [`Record`] fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSchema {
    pub id_field: String,
    pub status_field: String,
    pub timestamp_field: String,
    pub key_fields: Vec<String>,
}

impl Default for RecordSchema {
    fn default() -> Self {
        Self {
            id_field: "_id".to_string(),
            status_field: "alertStatus".to_string(),
            timestamp_field: "detectedAt".to_string(),
            key_fields: vec![
                "kpiName".to_string(),
                "dimension".to_string(),
                "dimensionValue".to_string(),
            ],
        }
    }
}

impl RecordSchema {
    /// Build a [`Record`] from a raw document. Returns `None` when the
    /// document has no usable identifier.
    #[must_use]
    pub fn extract(&self, document: &Value) -> Option<Record> {
        let id = lookup(document, &self.id_field).and_then(RecordId::from_json)?;

        let key = GroupKey(
            self.key_fields
                .iter()
                .map(|field| lookup(document, field).and_then(key_part))
                .collect(),
        );

        let status = lookup(document, &self.status_field)
            .and_then(Value::as_str)
            .map(str::to_string);

        let detected_at =
            lookup(document, &self.timestamp_field).and_then(parse_document_timestamp);

        Some(Record {
            id,
            key,
            status,
            detected_at,
        })
    }

    /// Identifier of a raw document, if it has one.
    #[must_use]
    pub fn document_id(&self, document: &Value) -> Option<RecordId> {
        lookup(document, &self.id_field).and_then(RecordId::from_json)
    }
}

/// Resolve a dotted path (`"meta.kpi"`) inside a document.
fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

fn key_part(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Selects the lifecycle statuses that take part in deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityFilter {
    statuses: Vec<String>,
}

impl EligibilityFilter {
    #[must_use]
    pub fn new<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statuses: statuses.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn statuses(&self) -> &[String] {
        &self.statuses
    }

    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        record
            .status
            .as_ref()
            .is_some_and(|status| self.statuses.contains(status))
    }

    /// Query document selecting eligible records, e.g.
    /// `{"alertStatus": "PENDING_DECISION"}`.
    #[must_use]
    pub fn to_query(&self, schema: &RecordSchema) -> Value {
        let mut query = serde_json::Map::new();
        let condition = match self.statuses.as_slice() {
            [single] => json!(single),
            many => json!({ "$in": many }),
        };
        query.insert(schema.status_field.clone(), condition);
        Value::Object(query)
    }
}
