//! JSON shapes of the Datastore v1 HTTP API, and the mapping between its
//! `Value` messages and our property values.

use crate::models::{EntityId, EntityKey, PropertyValue, Timestamp};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// The store refuses to index strings and blobs longer than this.
pub const MAX_INDEXED_BYTES: usize = 1500;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionId {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathElement {
    pub kind: String,
    /// int64 travels as a decimal string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<PartitionId>,
    #[serde(default)]
    pub path: Vec<PathElement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Key>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct KindExpression {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct PropertyReference {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct Projection {
    pub property: PropertyReference,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kind: Vec<KindExpression>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub projection: Vec<Projection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

impl Query {
    pub fn of_kind(kind: &str) -> Self {
        Self {
            kind: vec![KindExpression {
                name: kind.to_string(),
            }],
            ..Self::default()
        }
    }
    pub fn keys_only(mut self) -> Self {
        self.projection = vec![Projection {
            property: PropertyReference {
                name: "__key__".to_string(),
            },
        }];
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest<'a> {
    pub partition_id: PartitionId,
    pub query: &'a Query,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    pub batch: QueryResultBatch,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultBatch {
    #[serde(default)]
    pub skipped_results: i32,
    #[serde(default)]
    pub entity_results: Vec<EntityResult>,
    #[serde(default)]
    pub end_cursor: Option<String>,
    #[serde(default)]
    pub more_results: String,
}

impl QueryResultBatch {
    pub fn is_finished(&self) -> bool {
        self.more_results != "NOT_FINISHED"
    }
}

#[derive(Debug, Deserialize)]
pub struct EntityResult {
    pub entity: WireEntity,
}

#[derive(Debug, Serialize)]
pub struct LookupRequest<'a> {
    pub keys: &'a [Key],
}

#[derive(Debug, Deserialize)]
pub struct LookupResponse {
    #[serde(default)]
    pub found: Vec<EntityResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutation {
    Upsert(WireEntity),
    Delete(Key),
}

#[derive(Debug, Serialize)]
pub struct CommitRequest {
    pub mode: &'static str,
    pub mutations: Vec<Mutation>,
}

impl CommitRequest {
    pub fn non_transactional(mutation: Mutation) -> Self {
        Self {
            mode: "NON_TRANSACTIONAL",
            mutations: vec![mutation],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    #[serde(default)]
    pub mutation_results: Vec<MutationResult>,
}

#[derive(Debug, Deserialize)]
pub struct MutationResult {
    /// Only present when the store allocated the id.
    #[serde(default)]
    pub key: Option<Key>,
}

pub fn key_to_wire(project_id: &str, key: &EntityKey) -> Key {
    let (id, name) = match &key.id {
        Some(EntityId::Id(id)) => (Some(id.to_string()), None),
        Some(EntityId::Name(name)) => (None, Some(name.clone())),
        None => (None, None),
    };
    Key {
        partition_id: Some(PartitionId {
            project_id: project_id.to_string(),
            namespace_id: None,
        }),
        path: vec![PathElement {
            kind: key.kind.clone(),
            id,
            name,
        }],
    }
}

/// Only the last path element is kept; ancestors are not modeled.
pub fn key_from_wire(key: &Key) -> Result<EntityKey> {
    let leaf = key
        .path
        .last()
        .ok_or_else(|| anyhow!("datastore returned a key with an empty path"))?;
    let id = match (&leaf.id, &leaf.name) {
        (Some(id), _) => Some(EntityId::Id(id.parse()?)),
        (None, Some(name)) => Some(EntityId::Name(name.clone())),
        (None, None) => None,
    };
    Ok(EntityKey {
        kind: leaf.kind.clone(),
        id,
    })
}

pub fn entity_to_wire(
    project_id: &str,
    key: &EntityKey,
    properties: &BTreeMap<String, PropertyValue>,
) -> WireEntity {
    WireEntity {
        key: Some(key_to_wire(project_id, key)),
        properties: properties
            .iter()
            .map(|(name, value)| (name.clone(), value_to_wire(value)))
            .collect(),
    }
}

pub fn properties_from_wire(
    properties: &Map<String, Value>,
) -> BTreeMap<String, PropertyValue> {
    properties
        .iter()
        .map(|(name, value)| (name.clone(), value_from_wire(value)))
        .collect()
}

pub fn value_to_wire(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Null => json!({ "nullValue": null }),
        PropertyValue::Boolean(b) => json!({ "booleanValue": b }),
        PropertyValue::Integer(i) => json!({ "integerValue": i.to_string() }),
        PropertyValue::Float(f) if f.is_nan() => json!({ "doubleValue": "NaN" }),
        PropertyValue::Float(f) if f.is_infinite() => {
            let text = if *f > 0.0 { "Infinity" } else { "-Infinity" };
            json!({ "doubleValue": text })
        }
        PropertyValue::Float(f) => json!({ "doubleValue": f }),
        PropertyValue::String(s) => {
            unindexed_if_large(json!({ "stringValue": s }), s.len())
        }
        PropertyValue::Blob(bytes) => unindexed_if_large(
            json!({ "blobValue": general_purpose::STANDARD.encode(bytes) }),
            bytes.len(),
        ),
        PropertyValue::Timestamp(ts) => {
            json!({ "timestampValue": timestamp_to_wire(ts) })
        }
        PropertyValue::Array(items) => json!({
            "arrayValue": {
                "values": items.iter().map(value_to_wire).collect::<Vec<_>>()
            }
        }),
        PropertyValue::Object(fields) => json!({
            "entityValue": {
                "properties": fields
                    .iter()
                    .map(|(k, v)| (k.clone(), value_to_wire(v)))
                    .collect::<Map<_, _>>()
            }
        }),
        PropertyValue::Opaque(raw) => raw.clone(),
    }
}

fn unindexed_if_large(mut value: Value, len: usize) -> Value {
    if len > MAX_INDEXED_BYTES {
        value["excludeFromIndexes"] = Value::Bool(true);
    }
    value
}

/// The store only has UTC instants; naive timestamps are taken to be UTC.
fn timestamp_to_wire(ts: &Timestamp) -> String {
    let utc: DateTime<Utc> = match ts {
        Timestamp::Naive(naive) => Utc.from_utc_datetime(naive),
        Timestamp::Aware(aware) => aware.with_timezone(&Utc),
    };
    utc.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn value_from_wire(value: &Value) -> PropertyValue {
    decode_known(value).unwrap_or_else(|| PropertyValue::Opaque(value.clone()))
}

fn decode_known(value: &Value) -> Option<PropertyValue> {
    let fields = value.as_object()?;
    if fields.contains_key("nullValue") {
        return Some(PropertyValue::Null);
    }
    if let Some(b) = fields.get("booleanValue") {
        return b.as_bool().map(PropertyValue::Boolean);
    }
    if let Some(i) = fields.get("integerValue") {
        let parsed = match i {
            Value::String(s) => s.parse().ok(),
            other => other.as_i64(),
        };
        return parsed.map(PropertyValue::Integer);
    }
    if let Some(d) = fields.get("doubleValue") {
        let parsed = match d {
            Value::String(s) => match s.as_str() {
                "NaN" => Some(f64::NAN),
                "Infinity" => Some(f64::INFINITY),
                "-Infinity" => Some(f64::NEG_INFINITY),
                other => other.parse().ok(),
            },
            other => other.as_f64(),
        };
        return parsed.map(PropertyValue::Float);
    }
    if let Some(s) = fields.get("stringValue") {
        return s.as_str().map(|s| PropertyValue::String(s.to_string()));
    }
    if let Some(b) = fields.get("blobValue") {
        let text = b.as_str()?;
        return general_purpose::STANDARD
            .decode(text)
            .or_else(|_| general_purpose::URL_SAFE.decode(text))
            .ok()
            .map(PropertyValue::Blob);
    }
    if let Some(t) = fields.get("timestampValue") {
        return DateTime::parse_from_rfc3339(t.as_str()?)
            .ok()
            .map(|dt| PropertyValue::Timestamp(Timestamp::Aware(dt)));
    }
    if let Some(array) = fields.get("arrayValue") {
        let items = match array.get("values") {
            Some(Value::Array(items)) => {
                items.iter().map(value_from_wire).collect()
            }
            Some(_) => return None,
            None => vec![],
        };
        return Some(PropertyValue::Array(items));
    }
    if let Some(entity) = fields.get("entityValue") {
        let properties = match entity.get("properties") {
            Some(Value::Object(props)) => properties_from_wire(props),
            Some(_) => return None,
            None => BTreeMap::new(),
        };
        return Some(PropertyValue::Object(properties));
    }
    None
}
