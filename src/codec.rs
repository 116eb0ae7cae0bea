//! Typed JSON codec.
//!
//! Stored values are richer than JSON: they can be "undefined" (present but
//! empty, which is not the same as a missing key), dates, maps with
//! non-string keys, sets, raw bytes, or non-finite floats. [`encode`] turns a
//! [`Value`] into plain JSON by wrapping each of those in an envelope:
//!
//! ```json
//! { "__type": "date", "value": "2024-05-01T12:00:00.000Z" }
//! ```
//!
//! [`decode`] unwraps envelopes by their tag. A tag it does not recognise
//! (written by a newer build sharing the same store) is not an error: the
//! payload is returned as-is.
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value as Json};

/// Envelope marker field.
pub const TYPE_FIELD: &str = "__type";
/// Envelope payload field.
pub const VALUE_FIELD: &str = "value";

const TAG_UNDEFINED: &str = "undefined";
const TAG_FLOAT: &str = "float";
const TAG_DATE: &str = "date";
const TAG_MAP: &str = "map";
const TAG_SET: &str = "set";
const TAG_BYTES: &str = "bytes";
const TAG_OBJECT: &str = "object";

/// A value as the application stores it.
#[derive(Debug, Clone)]
pub enum Value {
    /// Present, but without a value.
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// Insertion-ordered map whose keys may be any value.
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Bytes(Vec<u8>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Undefined, Undefined) | (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            // NaN == NaN here, stored values must compare equal to themselves
            (Float(a), Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (String(a), String(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Array(a), Array(b)) | (Set(a), Set(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Converts plain JSON without looking at envelopes.
    pub fn from_json(json: Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => number_to_value(&n),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts to plain JSON, dropping the distinctions JSON cannot carry.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(d) => Json::String(format_date(d)),
            Value::Array(items) | Value::Set(items) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => Json::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Map(pairs) => Json::Array(
                pairs
                    .iter()
                    .map(|(k, v)| Json::Array(vec![k.to_json(), v.to_json()]))
                    .collect(),
            ),
            Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Encodes `value` into JSON, wrapping special types in envelopes.
pub fn encode(value: &Value) -> Json {
    match value {
        Value::Undefined => envelope(TAG_UNDEFINED, Json::Null),
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => match Number::from_f64(*f) {
            Some(n) => Json::Number(n),
            None => envelope(TAG_FLOAT, Json::String(non_finite_name(*f).to_string())),
        },
        Value::String(s) => Json::String(s.clone()),
        Value::Date(d) => envelope(TAG_DATE, Json::String(format_date(d))),
        Value::Array(items) => Json::Array(items.iter().map(encode).collect()),
        Value::Object(map) => {
            let encoded: Map<String, Json> =
                map.iter().map(|(k, v)| (k.clone(), encode(v))).collect();
            // A plain object carrying the marker field would read back as an envelope
            if encoded.contains_key(TYPE_FIELD) {
                envelope(TAG_OBJECT, Json::Object(encoded))
            } else {
                Json::Object(encoded)
            }
        }
        Value::Map(pairs) => envelope(
            TAG_MAP,
            Json::Array(
                pairs
                    .iter()
                    .map(|(k, v)| Json::Array(vec![encode(k), encode(v)]))
                    .collect(),
            ),
        ),
        Value::Set(items) => envelope(TAG_SET, Json::Array(items.iter().map(encode).collect())),
        Value::Bytes(bytes) => envelope(
            TAG_BYTES,
            Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        ),
    }
}

/// Decodes JSON produced by [`encode`]. Never fails.
pub fn decode(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => number_to_value(&n),
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(items.into_iter().map(decode).collect()),
        Json::Object(mut map) => {
            let tag = match map.get(TYPE_FIELD) {
                Some(Json::String(tag)) if is_envelope_shape(&map) => Some(tag.clone()),
                _ => None,
            };
            match tag {
                Some(tag) => {
                    let payload = map.remove(VALUE_FIELD).unwrap_or(Json::Null);
                    decode_envelope(&tag, payload)
                }
                None => Value::Object(map.into_iter().map(|(k, v)| (k, decode(v))).collect()),
            }
        }
    }
}

fn decode_envelope(tag: &str, payload: Json) -> Value {
    match tag {
        TAG_UNDEFINED => Value::Undefined,
        TAG_FLOAT => match payload.as_str().and_then(parse_non_finite) {
            Some(f) => Value::Float(f),
            None => fail_soft(tag, payload),
        },
        TAG_DATE => match payload.as_str().and_then(parse_date) {
            Some(d) => Value::Date(d),
            None => fail_soft(tag, payload),
        },
        TAG_MAP => match payload {
            Json::Array(items) if items.iter().all(is_pair) => Value::Map(
                items
                    .into_iter()
                    .filter_map(|pair| match pair {
                        Json::Array(mut kv) => {
                            let v = kv.pop()?;
                            let k = kv.pop()?;
                            Some((decode(k), decode(v)))
                        }
                        _ => None,
                    })
                    .collect(),
            ),
            other => fail_soft(tag, other),
        },
        TAG_SET => match payload {
            Json::Array(items) => Value::Set(items.into_iter().map(decode).collect()),
            other => fail_soft(tag, other),
        },
        TAG_BYTES => match bytes_from_json(&payload) {
            Some(bytes) => Value::Bytes(bytes),
            None => fail_soft(tag, payload),
        },
        TAG_OBJECT => match payload {
            Json::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, decode(v))).collect())
            }
            other => fail_soft(tag, other),
        },
        _ => fail_soft(tag, payload),
    }
}

fn fail_soft(tag: &str, payload: Json) -> Value {
    log::warn!("[Codec] Cannot decode envelope {tag:?}, keeping its payload");
    decode(payload)
}

fn envelope(tag: &str, payload: Json) -> Json {
    let mut map = Map::with_capacity(2);
    map.insert(TYPE_FIELD.to_string(), Json::String(tag.to_string()));
    map.insert(VALUE_FIELD.to_string(), payload);
    Json::Object(map)
}

fn number_to_value(n: &Number) -> Value {
    match n.as_i64() {
        Some(i) => Value::Int(i),
        None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
    }
}

fn is_envelope_shape(map: &Map<String, Json>) -> bool {
    map.keys().all(|k| k == TYPE_FIELD || k == VALUE_FIELD)
}

fn is_pair(json: &Json) -> bool {
    matches!(json, Json::Array(kv) if kv.len() == 2)
}

fn bytes_from_json(json: &Json) -> Option<Vec<u8>> {
    json.as_array()?
        .iter()
        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}

fn format_date(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    // Years outside 0..=9999 are written with a sign, e.g. "+10000-01-01T00:00:00Z"
    let naive = s.strip_suffix('Z')?;
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|d| d.and_utc())
}

fn non_finite_name(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

fn parse_non_finite(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}
