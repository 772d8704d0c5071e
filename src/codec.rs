//! Conversion between typed property values and the flat text of an HTML
//! form field.
//!
//! The form always carries the type tag next to the text, so `decode` is
//! told which type to rebuild instead of sniffing it from the text. Most
//! tags degrade gracefully when the text doesn't parse (the property comes
//! back as a string); arrays and objects refuse, since quietly turning a
//! broken JSON document into a string would corrupt the entity.

use super::{
    config::BLOB_PREVIEW_CHARS,
    models::{PropertyTypeTag, PropertyValue, Timestamp},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use std::{
    collections::BTreeMap,
    num::{ParseFloatError, ParseIntError},
};
use thiserror::Error;

/// What a checked checkbox submits, and what we render a `true` as.
pub const CHECKBOX_ON: &str = "on";
/// There is no "unchecked" submission in HTML, but `false` still needs a
/// non-empty encoding so it doesn't read as a cleared field.
pub const CHECKBOX_OFF: &str = "off";
const TRUTHY: [&str; 4] = ["true", "1", "on", "yes"];
/// Whitespace-only blob text decodes to no bytes.
const EMPTY_BLOB: &str = " ";

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";
const OFFSET_FORMATS: [&str; 2] = [OFFSET_FORMAT, "%Y-%m-%d %H:%M:%S%.f%:z"];
const NAIVE_FORMATS: [&str; 4] = [
    NAIVE_FORMAT,
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Integer(#[from] ParseIntError),
    #[error(transparent)]
    Float(#[from] ParseFloatError),
    #[error("not a recognized date/time")]
    Timestamp,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("the JSON document is not an {0}")]
    Shape(PropertyTypeTag),
}

#[derive(Debug, Error)]
#[error("invalid {tag} value: {source}")]
pub struct DecodeError {
    pub tag: PropertyTypeTag,
    #[source]
    pub source: ParseError,
}

/// What `decode` does when the text doesn't parse as the requested type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep the submitted text as a string property.
    Passthrough,
    /// Hand the error back to the caller.
    Propagate,
}

pub fn failure_policy(tag: PropertyTypeTag) -> FailurePolicy {
    match tag {
        PropertyTypeTag::Array | PropertyTypeTag::Object => {
            FailurePolicy::Propagate
        }
        PropertyTypeTag::Null
        | PropertyTypeTag::Boolean
        | PropertyTypeTag::Integer
        | PropertyTypeTag::Float
        | PropertyTypeTag::String
        | PropertyTypeTag::Blob
        | PropertyTypeTag::Datetime
        | PropertyTypeTag::Unknown => FailurePolicy::Passthrough,
    }
}

/// Render a value as the text of an editable form field.
pub fn encode(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Null => String::new(),
        PropertyValue::Boolean(true) => CHECKBOX_ON.to_string(),
        PropertyValue::Boolean(false) => CHECKBOX_OFF.to_string(),
        PropertyValue::Integer(i) => i.to_string(),
        // Debug formatting is the shortest text that parses back to the same
        // f64, and keeps the `.0` on whole numbers.
        PropertyValue::Float(f) => format!("{f:?}"),
        PropertyValue::String(s) => s.clone(),
        // An empty field would read back as a cleared property.
        PropertyValue::Blob(bytes) if bytes.is_empty() => EMPTY_BLOB.to_string(),
        PropertyValue::Blob(bytes) => general_purpose::STANDARD.encode(bytes),
        PropertyValue::Timestamp(ts) => encode_timestamp(ts),
        PropertyValue::Array(_) | PropertyValue::Object(_) => {
            format!("{:#}", to_json(value))
        }
        PropertyValue::Opaque(raw) => raw.to_string(),
    }
}

/// Human-readable rendering for tables and the detail page. Never feed this
/// back into `decode`: blobs in particular are cut short.
pub fn display(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Null => "null".to_string(),
        PropertyValue::Boolean(b) => b.to_string(),
        PropertyValue::Blob(bytes) => blob_summary(bytes),
        other => encode(other),
    }
}

fn blob_summary(bytes: &[u8]) -> String {
    let b64 = general_purpose::STANDARD.encode(bytes);
    let len = bytes.len();
    if b64.len() > BLOB_PREVIEW_CHARS {
        // base64 is ascii, so any byte index is a char boundary
        format!("{len} bytes: {}...", &b64[..BLOB_PREVIEW_CHARS])
    } else {
        format!("{len} bytes: {b64}")
    }
}

fn encode_timestamp(ts: &Timestamp) -> String {
    match ts {
        Timestamp::Naive(naive) => naive.format(NAIVE_FORMAT).to_string(),
        Timestamp::Aware(aware) => aware.format(OFFSET_FORMAT).to_string(),
    }
}

/// Rebuild a value from submitted form text and the tag that was rendered
/// alongside it.
///
/// Empty text clears the property to `Null` whatever the tag. `"0"` and
/// `"false"` are not empty and decode like any other text.
pub fn decode(
    text: &str,
    tag: PropertyTypeTag,
) -> Result<PropertyValue, DecodeError> {
    if text.is_empty() {
        return Ok(PropertyValue::Null);
    }
    match parse_as(text, tag) {
        Ok(value) => Ok(value),
        Err(source) => match failure_policy(tag) {
            FailurePolicy::Passthrough => {
                tracing::debug!(%tag, %source, "keeping unparseable form text as a string");
                Ok(PropertyValue::String(text.to_string()))
            }
            FailurePolicy::Propagate => Err(DecodeError { tag, source }),
        },
    }
}

fn parse_as(
    text: &str,
    tag: PropertyTypeTag,
) -> Result<PropertyValue, ParseError> {
    Ok(match tag {
        PropertyTypeTag::Null => PropertyValue::Null,
        PropertyTypeTag::Boolean => {
            let lowered = text.trim().to_lowercase();
            PropertyValue::Boolean(TRUTHY.contains(&lowered.as_str()))
        }
        PropertyTypeTag::Integer => {
            PropertyValue::Integer(text.trim().parse::<i64>()?)
        }
        PropertyTypeTag::Float => {
            PropertyValue::Float(text.trim().parse::<f64>()?)
        }
        PropertyTypeTag::Datetime => PropertyValue::Timestamp(
            parse_timestamp(text.trim()).ok_or(ParseError::Timestamp)?,
        ),
        PropertyTypeTag::Blob => PropertyValue::Blob(decode_blob(text)),
        PropertyTypeTag::Array | PropertyTypeTag::Object => {
            let value = from_json(serde_json::from_str(text)?);
            if value.type_tag() != tag {
                return Err(ParseError::Shape(tag));
            }
            value
        }
        PropertyTypeTag::String | PropertyTypeTag::Unknown => {
            PropertyValue::String(text.to_string())
        }
    })
}

/// Timestamps show up with or without an offset, with `Z` or `+00:00`, and
/// with `T` or a space between date and time depending on where they were
/// typed or copied from, so we try the shapes in order.
fn parse_timestamp(text: &str) -> Option<Timestamp> {
    parse_with_offset(text)
        .or_else(|| {
            text.strip_suffix('Z')
                .or_else(|| text.strip_suffix('z'))
                .and_then(|rest| parse_with_offset(&format!("{rest}+00:00")))
        })
        .map(Timestamp::Aware)
        .or_else(|| parse_naive(text).map(Timestamp::Naive))
}

fn parse_with_offset(text: &str) -> Option<DateTime<FixedOffset>> {
    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Textareas wrap and browsers may add line breaks, so whitespace is
/// dropped before decoding. Text that still isn't base64 is stored as its
/// own UTF-8 bytes.
fn decode_blob(text: &str) -> Vec<u8> {
    let compact: String =
        text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    general_purpose::STANDARD
        .decode(compact)
        .unwrap_or_else(|_| text.as_bytes().to_vec())
}

/// JSON view of a value, used for array and object fields. JSON has no
/// timestamps, bytes or non-finite numbers, so those become strings and do
/// not survive a round trip as their original type.
pub fn to_json(value: &PropertyValue) -> serde_json::Value {
    use serde_json::Value;
    match value {
        PropertyValue::Null => Value::Null,
        PropertyValue::Boolean(b) => Value::Bool(*b),
        PropertyValue::Integer(i) => Value::from(*i),
        PropertyValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(format!("{f:?}"))),
        PropertyValue::String(s) => Value::String(s.clone()),
        PropertyValue::Blob(bytes) => {
            Value::String(general_purpose::STANDARD.encode(bytes))
        }
        PropertyValue::Timestamp(ts) => Value::String(encode_timestamp(ts)),
        PropertyValue::Array(items) => {
            Value::Array(items.iter().map(to_json).collect())
        }
        PropertyValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
        PropertyValue::Opaque(raw) => raw.clone(),
    }
}

pub fn from_json(value: serde_json::Value) -> PropertyValue {
    use serde_json::Value;
    match value {
        Value::Null => PropertyValue::Null,
        Value::Bool(b) => PropertyValue::Boolean(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => PropertyValue::Integer(i),
            None => match n.as_f64() {
                Some(f) => PropertyValue::Float(f),
                None => PropertyValue::Opaque(Value::Number(n)),
            },
        },
        Value::String(s) => PropertyValue::String(s),
        Value::Array(items) => {
            PropertyValue::Array(items.into_iter().map(from_json).collect())
        }
        Value::Object(fields) => PropertyValue::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k, from_json(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}
