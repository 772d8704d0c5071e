//! The field naming contract between the entity forms we render and the
//! submissions we get back, and rebuilding an entity's properties from one.
//!
//! Each existing property renders as `prop:<name>` (value text),
//! `type:<name>` (tag name) and a `delete:<name>` checkbox. Rows for adding
//! properties are `new_name.<i>`, `new_value.<i>` and `new_type.<i>`.

use super::{
    codec::{self, DecodeError},
    models::{PropertyTypeTag, PropertyValue},
};
use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
};
use thiserror::Error;

pub const VALUE_PREFIX: &str = "prop:";
pub const TYPE_PREFIX: &str = "type:";
pub const DELETE_PREFIX: &str = "delete:";
pub const NEW_NAME_PREFIX: &str = "new_name.";
pub const NEW_VALUE_PREFIX: &str = "new_value.";
pub const NEW_TYPE_PREFIX: &str = "new_type.";
pub const ENTITY_ID_FIELD: &str = "entity_id";

#[derive(Debug, Error)]
pub enum FormError {
    #[error("property \"{name}\": {source}")]
    Decode {
        name: String,
        #[source]
        source: DecodeError,
    },
    #[error("a property named \"{0}\" already exists")]
    Duplicate(String),
    #[error("property names starting with \"__\" are reserved (\"{0}\")")]
    Reserved(String),
}

#[derive(Debug, Default, Clone)]
struct NewRow {
    name: String,
    value: String,
    tag: Option<PropertyTypeTag>,
}

/// A parsed form submission. Fields that don't follow the naming contract
/// are ignored.
#[derive(Debug, Default, Clone)]
pub struct Submission {
    values: BTreeMap<String, String>,
    types: BTreeMap<String, PropertyTypeTag>,
    deleted: BTreeSet<String>,
    new_rows: BTreeMap<usize, NewRow>,
    pub entity_id: Option<String>,
}

impl Submission {
    pub fn from_fields<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut submission = Self::default();
        for (field, text) in fields {
            if let Some(name) = field.strip_prefix(VALUE_PREFIX) {
                submission.values.insert(name.to_string(), text);
            } else if let Some(name) = field.strip_prefix(TYPE_PREFIX) {
                submission
                    .types
                    .insert(name.to_string(), PropertyTypeTag::from_name(&text));
            } else if let Some(name) = field.strip_prefix(DELETE_PREFIX) {
                submission.deleted.insert(name.to_string());
            } else if let Some(row) = new_row_index(&field, NEW_NAME_PREFIX) {
                submission.new_rows.entry(row).or_default().name = text;
            } else if let Some(row) = new_row_index(&field, NEW_VALUE_PREFIX) {
                submission.new_rows.entry(row).or_default().value = text;
            } else if let Some(row) = new_row_index(&field, NEW_TYPE_PREFIX) {
                submission.new_rows.entry(row).or_default().tag =
                    Some(PropertyTypeTag::from_name(&text));
            } else if field == ENTITY_ID_FIELD {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    submission.entity_id = Some(trimmed.to_string());
                }
            }
        }
        submission
    }
}

fn new_row_index(field: &str, prefix: &str) -> Option<usize> {
    field.strip_prefix(prefix)?.parse().ok()
}

/// Browsers submit textarea line breaks as CRLF whatever the value held.
/// Text that already matches the stored string is left alone, so a value
/// that really contains CRLF keeps it.
fn normalize_line_breaks<'a>(
    text: &'a str,
    tag: PropertyTypeTag,
    previous: Option<&PropertyValue>,
) -> Cow<'a, str> {
    match previous {
        _ if tag != PropertyTypeTag::String || !text.contains("\r\n") => {
            Cow::Borrowed(text)
        }
        Some(PropertyValue::String(s)) if s == text => Cow::Borrowed(text),
        _ => Cow::Owned(text.replace("\r\n", "\n")),
    }
}

fn is_reserved(name: &str) -> bool {
    name.starts_with("__")
}

pub fn value_field(name: &str) -> String {
    format!("{VALUE_PREFIX}{name}")
}

pub fn type_field(name: &str) -> String {
    format!("{TYPE_PREFIX}{name}")
}

pub fn delete_field(name: &str) -> String {
    format!("{DELETE_PREFIX}{name}")
}

/// Apply a submission on top of an entity's previous properties.
///
/// The previous type tags are captured before anything is overwritten,
/// because an unchecked checkbox is simply missing from the submission: a
/// property that was a boolean and has no value field is `false`, not
/// "unchanged". Other properties the submission doesn't mention are kept.
/// Any decode failure rejects the whole submission.
pub fn reconstruct(
    previous: &BTreeMap<String, PropertyValue>,
    submission: &Submission,
) -> Result<BTreeMap<String, PropertyValue>, FormError> {
    let previous_tags: BTreeMap<&str, PropertyTypeTag> = previous
        .iter()
        .map(|(name, value)| (name.as_str(), value.type_tag()))
        .collect();
    let mut properties = previous.clone();

    let mentioned: BTreeSet<&str> = previous_tags
        .keys()
        .copied()
        .chain(submission.values.keys().map(String::as_str))
        .chain(submission.types.keys().map(String::as_str))
        .filter(|name| !is_reserved(name))
        .collect();

    for name in mentioned {
        if submission.deleted.contains(name) {
            properties.remove(name);
            continue;
        }
        let submitted_tag = submission.types.get(name).copied();
        let previous_tag = previous_tags.get(name).copied();
        let value = match submission.values.get(name) {
            Some(text) => {
                let tag = submitted_tag
                    .or(previous_tag)
                    .unwrap_or(PropertyTypeTag::String);
                let text = normalize_line_breaks(text, tag, previous.get(name));
                codec::decode(&text, tag).map_err(|source| FormError::Decode {
                    name: name.to_string(),
                    source,
                })?
            }
            None if previous_tag == Some(PropertyTypeTag::Boolean)
                || submitted_tag == Some(PropertyTypeTag::Boolean) =>
            {
                PropertyValue::Boolean(false)
            }
            None => continue,
        };
        properties.insert(name.to_string(), value);
    }

    for row in submission.new_rows.values() {
        let name = row.name.trim();
        if name.is_empty() {
            continue;
        }
        if is_reserved(name) {
            return Err(FormError::Reserved(name.to_string()));
        }
        if properties.contains_key(name) {
            return Err(FormError::Duplicate(name.to_string()));
        }
        let tag = row.tag.unwrap_or(PropertyTypeTag::String);
        let text = normalize_line_breaks(&row.value, tag, None);
        let value =
            codec::decode(&text, tag).map_err(|source| FormError::Decode {
                name: name.to_string(),
                source,
            })?;
        properties.insert(name.to_string(), value);
    }

    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Submission {
        Submission::from_fields(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    fn props(pairs: Vec<(&str, PropertyValue)>) -> BTreeMap<String, PropertyValue> {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_unchecked_checkbox_with_type_field_becomes_false() {
        let previous = props(vec![("active", PropertyValue::Boolean(true))]);
        let submission = fields(&[("type:active", "boolean")]);
        let result = reconstruct(&previous, &submission).unwrap();
        assert_eq!(result["active"], PropertyValue::Boolean(false));
    }

    #[test]
    fn test_boolean_missing_from_submission_entirely_becomes_false() {
        let previous = props(vec![
            ("active", PropertyValue::Boolean(true)),
            ("name", PropertyValue::String("John".into())),
        ]);
        let submission = fields(&[("prop:name", "Jack"), ("type:name", "string")]);
        let result = reconstruct(&previous, &submission).unwrap();
        assert_eq!(result["active"], PropertyValue::Boolean(false));
        assert_eq!(result["name"], PropertyValue::String("Jack".into()));
    }

    #[test]
    fn test_checked_checkbox_is_true() {
        let previous = props(vec![("active", PropertyValue::Boolean(false))]);
        let submission =
            fields(&[("prop:active", "on"), ("type:active", "boolean")]);
        let result = reconstruct(&previous, &submission).unwrap();
        assert_eq!(result["active"], PropertyValue::Boolean(true));
    }

    #[test]
    fn test_unmentioned_properties_are_kept() {
        let previous = props(vec![
            ("age", PropertyValue::Integer(30)),
            ("tags", PropertyValue::Array(vec![])),
        ]);
        let submission = fields(&[("prop:age", "31"), ("type:age", "integer")]);
        let result = reconstruct(&previous, &submission).unwrap();
        assert_eq!(result["age"], PropertyValue::Integer(31));
        assert_eq!(result["tags"], PropertyValue::Array(vec![]));
    }

    #[test]
    fn test_submitted_tag_wins_over_previous_tag() {
        let previous = props(vec![("age", PropertyValue::String("30".into()))]);
        let submission = fields(&[("prop:age", "30"), ("type:age", "integer")]);
        let result = reconstruct(&previous, &submission).unwrap();
        assert_eq!(result["age"], PropertyValue::Integer(30));
    }

    #[test]
    fn test_missing_type_field_falls_back_to_previous_tag() {
        let previous = props(vec![("quantity", PropertyValue::Integer(1))]);
        let submission = fields(&[("prop:quantity", "25")]);
        let result = reconstruct(&previous, &submission).unwrap();
        assert_eq!(result["quantity"], PropertyValue::Integer(25));
    }

    #[test]
    fn test_blank_clears_to_null() {
        let previous = props(vec![("email", PropertyValue::String("a@b".into()))]);
        let submission = fields(&[("prop:email", ""), ("type:email", "string")]);
        let result = reconstruct(&previous, &submission).unwrap();
        assert_eq!(result["email"], PropertyValue::Null);
    }

    #[test]
    fn test_delete_removes_property() {
        let previous = props(vec![
            ("a", PropertyValue::Integer(1)),
            ("b", PropertyValue::Boolean(true)),
        ]);
        let submission = fields(&[
            ("prop:a", "1"),
            ("type:a", "integer"),
            ("type:b", "boolean"),
            ("delete:b", "on"),
        ]);
        let result = reconstruct(&previous, &submission).unwrap();
        assert!(!result.contains_key("b"));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_new_rows_are_added() {
        let submission = fields(&[
            ("new_name.0", "price"),
            ("new_value.0", "29.99"),
            ("new_type.0", "float"),
            ("new_name.1", "  "),
            ("new_value.1", "ignored"),
            ("new_name.2", "tags"),
            ("new_value.2", r#"["a", "b"]"#),
            ("new_type.2", "array"),
            ("new_name.3", "note"),
            ("new_value.3", "untyped rows are strings"),
        ]);
        let result = reconstruct(&BTreeMap::new(), &submission).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result["price"], PropertyValue::Float(29.99));
        assert_eq!(
            result["tags"],
            PropertyValue::Array(vec![
                PropertyValue::String("a".into()),
                PropertyValue::String("b".into()),
            ])
        );
        assert_eq!(
            result["note"],
            PropertyValue::String("untyped rows are strings".into())
        );
    }

    #[test]
    fn test_new_row_cannot_clobber_existing_property() {
        let previous = props(vec![("name", PropertyValue::String("x".into()))]);
        let submission =
            fields(&[("new_name.0", "name"), ("new_value.0", "y")]);
        let err = reconstruct(&previous, &submission).unwrap_err();
        assert!(matches!(err, FormError::Duplicate(n) if n == "name"));
    }

    #[test]
    fn test_reserved_names() {
        let submission =
            fields(&[("new_name.0", "__key__"), ("new_value.0", "x")]);
        assert!(matches!(
            reconstruct(&BTreeMap::new(), &submission),
            Err(FormError::Reserved(_))
        ));

        // submitted values for reserved names are dropped, not rejected
        let submission = fields(&[("prop:__key__", "x")]);
        assert!(reconstruct(&BTreeMap::new(), &submission)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_malformed_json_rejects_the_submission() {
        let previous = props(vec![("tags", PropertyValue::Array(vec![]))]);
        let submission =
            fields(&[("prop:tags", "[\"a\","), ("type:tags", "array")]);
        let err = reconstruct(&previous, &submission).unwrap_err();
        match err {
            FormError::Decode { name, source } => {
                assert_eq!(name, "tags");
                assert_eq!(source.tag, PropertyTypeTag::Array);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_textarea_line_breaks_do_not_change_strings() {
        let previous = props(vec![
            ("bio", PropertyValue::String("line1\nline2".into())),
            ("raw", PropertyValue::String("a\r\nb".into())),
        ]);
        let submission = fields(&[
            ("prop:bio", "line1\r\nline2"),
            ("type:bio", "string"),
            ("prop:raw", "a\r\nb"),
            ("type:raw", "string"),
            ("new_name.0", "notes"),
            ("new_value.0", "x\r\ny"),
        ]);
        let result = reconstruct(&previous, &submission).unwrap();
        assert_eq!(result["bio"], previous["bio"]);
        assert_eq!(result["raw"], previous["raw"]);
        assert_eq!(result["notes"], PropertyValue::String("x\ny".into()));
    }

    #[test]
    fn test_entity_id_field() {
        assert_eq!(
            fields(&[("entity_id", " 42 ")]).entity_id.as_deref(),
            Some("42")
        );
        assert_eq!(fields(&[("entity_id", "")]).entity_id, None);
    }

    #[test]
    fn test_property_names_may_contain_colons() {
        let submission =
            fields(&[("prop:a:b", "1"), ("type:a:b", "integer")]);
        let result = reconstruct(&BTreeMap::new(), &submission).unwrap();
        assert_eq!(result["a:b"], PropertyValue::Integer(1));
    }
}
