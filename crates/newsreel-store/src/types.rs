//! Firestore REST API wire types and job-record mapping.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use newsreel_models::{JobRecord, JobStatus, JobType};

use crate::error::{StoreError, StoreResult};

/// Firestore document value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    // Firestore sends integers as strings
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapValue {
    pub fields: Option<HashMap<String, Value>>,
}

/// Firestore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub name: Option<String>,
    pub fields: Option<HashMap<String, Value>>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

impl Document {
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }
}

// ============================================================================
// Query types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub from: Vec<CollectionSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#where: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<Order>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_descendants: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_filter: Option<CompositeFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_filter: Option<FieldFilter>,
}

impl Filter {
    pub fn field(path: &str, op: &str, value: Value) -> Self {
        Self {
            composite_filter: None,
            field_filter: Some(FieldFilter {
                field: FieldReference {
                    field_path: path.to_string(),
                },
                op: op.to_string(),
                value,
            }),
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self {
            composite_filter: Some(CompositeFilter {
                op: "AND".to_string(),
                filters,
            }),
            field_filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeFilter {
    pub op: String,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: FieldReference,
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub field: FieldReference,
    pub direction: String,
}

// ============================================================================
// JSON <-> Firestore value conversion
// ============================================================================

/// Convert an arbitrary JSON value to a Firestore value.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::NullValue(()),
        serde_json::Value::Bool(b) => Value::BooleanValue(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::IntegerValue(i.to_string())
            } else {
                Value::DoubleValue(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::StringValue(s.clone()),
        serde_json::Value::Array(items) => Value::ArrayValue(ArrayValue {
            values: Some(items.iter().map(json_to_value).collect()),
        }),
        serde_json::Value::Object(map) => Value::MapValue(MapValue {
            fields: Some(
                map.iter()
                    .map(|(k, v)| (k.clone(), json_to_value(v)))
                    .collect(),
            ),
        }),
    }
}

/// Convert a Firestore value back to JSON.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::NullValue(()) => serde_json::Value::Null,
        Value::BooleanValue(b) => serde_json::Value::Bool(*b),
        Value::IntegerValue(s) => s
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
        Value::DoubleValue(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::TimestampValue(s) | Value::StringValue(s) => serde_json::Value::String(s.clone()),
        Value::ArrayValue(arr) => serde_json::Value::Array(
            arr.values
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(value_to_json)
                .collect(),
        ),
        Value::MapValue(map) => serde_json::Value::Object(
            map.fields
                .as_ref()
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(k, v)| (k.clone(), value_to_json(v)))
                        .collect()
                })
                .unwrap_or_default(),
        ),
    }
}

// ============================================================================
// Job record mapping
// ============================================================================

fn map_field(map: &BTreeMap<String, serde_json::Value>) -> Value {
    Value::MapValue(MapValue {
        fields: Some(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect(),
        ),
    })
}

/// Serialize a job record into Firestore document fields.
pub fn record_to_fields(record: &JobRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("job_id".into(), Value::StringValue(record.job_id.clone()));
    fields.insert("url".into(), Value::StringValue(record.url.clone()));
    fields.insert(
        "job_type".into(),
        Value::StringValue(record.job_type.as_str().to_string()),
    );
    fields.insert(
        "status".into(),
        Value::StringValue(record.status.as_str().to_string()),
    );
    fields.insert(
        "scheduled_datetime".into(),
        Value::TimestampValue(record.scheduled_datetime.to_rfc3339()),
    );
    fields.insert("metadata".into(), map_field(&record.metadata));
    fields.insert(
        "created_at".into(),
        Value::TimestampValue(record.created_at.to_rfc3339()),
    );
    fields.insert(
        "updated_at".into(),
        Value::TimestampValue(record.updated_at.to_rfc3339()),
    );
    fields.insert("attributes".into(), map_field(&record.attributes));
    fields
}

fn get_str<'a>(fields: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    match fields.get(key) {
        Some(Value::StringValue(s)) | Some(Value::TimestampValue(s)) => Some(s),
        _ => None,
    }
}

fn get_timestamp(fields: &HashMap<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    get_str(fields, key)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn get_map(fields: &HashMap<String, Value>, key: &str) -> BTreeMap<String, serde_json::Value> {
    match fields.get(key) {
        Some(Value::MapValue(map)) => map
            .fields
            .as_ref()
            .map(|f| {
                f.iter()
                    .map(|(k, v)| (k.clone(), value_to_json(v)))
                    .collect()
            })
            .unwrap_or_default(),
        _ => BTreeMap::new(),
    }
}

/// Deserialize a Firestore document back into a job record.
pub fn fields_to_record(fields: &HashMap<String, Value>) -> StoreResult<JobRecord> {
    let job_id = get_str(fields, "job_id")
        .ok_or_else(|| StoreError::InvalidResponse("document missing job_id".into()))?
        .to_string();
    let url = get_str(fields, "url")
        .ok_or_else(|| StoreError::InvalidResponse(format!("job {} missing url", job_id)))?
        .to_string();
    let status = get_str(fields, "status")
        .and_then(JobStatus::parse)
        .ok_or_else(|| StoreError::InvalidResponse(format!("job {} has invalid status", job_id)))?;
    let job_type = match get_str(fields, "job_type") {
        Some("IMMEDIATE") => JobType::Immediate,
        _ => JobType::Scheduled,
    };
    let scheduled_datetime = get_timestamp(fields, "scheduled_datetime").ok_or_else(|| {
        StoreError::InvalidResponse(format!("job {} missing scheduled_datetime", job_id))
    })?;
    let created_at = get_timestamp(fields, "created_at").unwrap_or(scheduled_datetime);
    let updated_at = get_timestamp(fields, "updated_at").unwrap_or(created_at);

    Ok(JobRecord {
        job_id,
        url,
        job_type,
        status,
        scheduled_datetime,
        metadata: get_map(fields, "metadata"),
        created_at,
        updated_at,
        attributes: get_map(fields, "attributes"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        let mut metadata = BTreeMap::new();
        metadata.insert("pipeline_config".to_string(), serde_json::json!({"k": 1}));
        let mut record = JobRecord::new(
            "https-example-com-story",
            "https://example.com/story",
            JobType::Immediate,
            Utc::now(),
            metadata,
        );
        record.attributes.insert(
            "bundle_key".into(),
            serde_json::json!("jobs/https-example-com-story/bundle.json"),
        );

        let fields = record_to_fields(&record);
        let back = fields_to_record(&fields).unwrap();

        assert_eq!(back.job_id, record.job_id);
        assert_eq!(back.status, JobStatus::Pending);
        assert_eq!(back.job_type, JobType::Immediate);
        assert_eq!(back.metadata, record.metadata);
        assert_eq!(back.attributes, record.attributes);
    }

    #[test]
    fn test_json_value_conversion_nested() {
        let json = serde_json::json!({
            "a": [1, 2.5, "x", null, true],
            "b": {"c": "d"}
        });
        let value = json_to_value(&json);
        assert_eq!(value_to_json(&value), json);
    }

    #[test]
    fn test_fields_to_record_rejects_bad_status() {
        let mut record = JobRecord::new(
            "id",
            "https://example.com",
            JobType::Scheduled,
            Utc::now(),
            BTreeMap::new(),
        );
        record.job_id = "id".into();
        let mut fields = record_to_fields(&record);
        fields.insert("status".into(), Value::StringValue("BOGUS".into()));
        assert!(fields_to_record(&fields).is_err());
    }
}
