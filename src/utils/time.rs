use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Offset-less forms, read as UTC. `%.f` also matches no fraction at all.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an RFC3339 timestamp, falling back to local date-times without an
/// offset (`2025-03-05T08:00:00.456`, `2025-03-05 08:00:00`) read as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_FORMATS.iter().find_map(|format| {
                NaiveDateTime::parse_from_str(raw, format)
                    .ok()
                    .map(|naive| naive.and_utc())
            })
        })
}

/// Read a timestamp out of a document field.
///
/// Accepts ISO strings, epoch milliseconds, and the extended JSON forms
/// `{"$date": "<iso>"}`, `{"$date": <millis>}` and
/// `{"$date": {"$numberLong": "<millis>"}}`.
#[must_use]
pub fn parse_document_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_timestamp(raw),
        Value::Number(n) => n.as_i64().and_then(from_millis),
        Value::Object(map) => match map.get("$date")? {
            Value::Object(inner) => inner
                .get("$numberLong")
                .and_then(Value::as_str)
                .and_then(|millis| millis.parse().ok())
                .and_then(from_millis),
            other => parse_document_timestamp(other),
        },
        _ => None,
    }
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rfc3339_and_sql_forms() {
        let a = parse_timestamp("2025-03-01T10:00:00+02:00").unwrap();
        let b = parse_timestamp("2025-03-01 08:00:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_parse_offsetless_iso_with_fraction() {
        let whole = Utc.with_ymd_and_hms(2025, 3, 5, 8, 0, 0).unwrap();

        assert_eq!(
            parse_timestamp("2025-03-05T08:00:00.456"),
            Some(whole + chrono::Duration::milliseconds(456))
        );
        assert_eq!(parse_timestamp("2025-03-05T08:00:00"), Some(whole));
        assert_eq!(
            parse_timestamp("2025-03-05 08:00:00.5"),
            Some(whole + chrono::Duration::milliseconds(500))
        );
        assert!(parse_timestamp("2025-03-05T08:00").is_none());
    }

    #[test]
    fn test_parse_extended_json_dates() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let millis = expected.timestamp_millis();

        assert_eq!(
            parse_document_timestamp(&json!({ "$date": "2025-03-01T08:00:00Z" })),
            Some(expected)
        );
        assert_eq!(
            parse_document_timestamp(&json!({ "$date": { "$numberLong": millis.to_string() } })),
            Some(expected)
        );
        assert_eq!(parse_document_timestamp(&json!(millis)), Some(expected));
        assert_eq!(parse_document_timestamp(&json!(true)), None);
    }
}
