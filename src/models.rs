use super::{config::AppConfig, store::Datastore};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// A point in time as the store hands it to us. Values read back from the
/// emulator always carry an offset, but values typed into a form may not, and
/// we keep that distinction so a naive timestamp comes back naive.
#[derive(Debug, Clone, PartialEq)]
pub enum Timestamp {
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

/// The value of one entity property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Blob(Vec<u8>),
    Timestamp(Timestamp),
    Array(Vec<PropertyValue>),
    Object(BTreeMap<String, PropertyValue>),
    /// A store value we don't model (keys, geo points, ...), kept in the
    /// store's own JSON representation so it can be written back untouched.
    Opaque(serde_json::Value),
}

impl PropertyValue {
    pub fn type_tag(&self) -> PropertyTypeTag {
        classify(self)
    }
}

/// Carried next to every form field so that decoding never has to guess the
/// type from the submitted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyTypeTag {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Blob,
    Array,
    Object,
    Datetime,
    Unknown,
}

impl PropertyTypeTag {
    pub const ALL: [PropertyTypeTag; 10] = [
        Self::String,
        Self::Integer,
        Self::Float,
        Self::Boolean,
        Self::Datetime,
        Self::Blob,
        Self::Array,
        Self::Object,
        Self::Null,
        Self::Unknown,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Blob => "blob",
            Self::Array => "array",
            Self::Object => "object",
            Self::Datetime => "datetime",
            Self::Unknown => "unknown",
        }
    }

    /// Names we don't recognize are `Unknown`, which decodes as plain text.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "null" => Self::Null,
            "boolean" => Self::Boolean,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "string" => Self::String,
            "blob" => Self::Blob,
            "array" => Self::Array,
            "object" => Self::Object,
            "datetime" => Self::Datetime,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PropertyTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub fn classify(value: &PropertyValue) -> PropertyTypeTag {
    match value {
        PropertyValue::Null => PropertyTypeTag::Null,
        PropertyValue::Boolean(_) => PropertyTypeTag::Boolean,
        PropertyValue::Integer(_) => PropertyTypeTag::Integer,
        PropertyValue::Float(_) => PropertyTypeTag::Float,
        PropertyValue::Blob(_) => PropertyTypeTag::Blob,
        PropertyValue::String(_) => PropertyTypeTag::String,
        PropertyValue::Array(_) => PropertyTypeTag::Array,
        PropertyValue::Object(_) => PropertyTypeTag::Object,
        PropertyValue::Timestamp(_) => PropertyTypeTag::Datetime,
        PropertyValue::Opaque(_) => PropertyTypeTag::Unknown,
    }
}

/// Numeric ids sort before string names, which is also how the store orders
/// keys within a kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Id(i64),
    Name(String),
}

impl EntityId {
    /// Identifiers arrive as URL or form text. Anything that reads as a
    /// base-10 integer is a numeric id; everything else is a name.
    pub fn parse(text: &str) -> Self {
        match text.parse::<i64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Name(text.to_string()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: String,
    /// `None` until the store allocates an id.
    pub id: Option<EntityId>,
}

impl EntityKey {
    pub fn new(kind: &str, id: EntityId) -> Self {
        Self {
            kind: kind.to_string(),
            id: Some(id),
        }
    }
    pub fn incomplete(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: None,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(EntityId::Id(id)) => write!(f, "Key('{}', {id})", self.kind),
            Some(EntityId::Name(name)) => {
                write!(f, "Key('{}', '{name}')", self.kind)
            }
            None => write!(f, "Key('{}')", self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub key: EntityKey,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Entity {
    pub fn new(key: EntityKey) -> Self {
        Self {
            key,
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct EntityPage {
    pub entities: Vec<Entity>,
    pub total_count: usize,
}

/// Which project the current request talks to. This gets threaded into every
/// store call instead of living in process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub project_id: String,
}

impl ProjectContext {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based
    pub page: u32,
    pub per_page: u32,
    pub total_count: usize,
}

impl Pagination {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        use super::config::{DEFAULT_PER_PAGE, MAX_PER_PAGE};
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(DEFAULT_PER_PAGE)
                .clamp(1, MAX_PER_PAGE),
            total_count: 0,
        }
    }
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }
    pub fn total_pages(&self) -> usize {
        let per_page = self.per_page as usize;
        (self.total_count + per_page - 1) / per_page
    }
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
    pub fn has_next(&self) -> bool {
        (self.page as usize) < self.total_pages()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Datastore>,
    pub config: Arc<AppConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_each_variant() {
        let naive = NaiveDateTime::parse_from_str(
            "2024-01-15T10:30:00",
            "%Y-%m-%dT%H:%M:%S",
        )
        .unwrap();
        let cases = [
            (PropertyValue::Null, PropertyTypeTag::Null),
            (PropertyValue::Boolean(true), PropertyTypeTag::Boolean),
            (PropertyValue::Integer(1), PropertyTypeTag::Integer),
            (PropertyValue::Float(1.5), PropertyTypeTag::Float),
            (PropertyValue::String("x".into()), PropertyTypeTag::String),
            (PropertyValue::Blob(vec![0, 1]), PropertyTypeTag::Blob),
            (
                PropertyValue::Timestamp(Timestamp::Naive(naive)),
                PropertyTypeTag::Datetime,
            ),
            (PropertyValue::Array(vec![]), PropertyTypeTag::Array),
            (
                PropertyValue::Object(BTreeMap::new()),
                PropertyTypeTag::Object,
            ),
            (
                PropertyValue::Opaque(serde_json::json!({
                    "geoPointValue": {"latitude": 1.0, "longitude": 2.0}
                })),
                PropertyTypeTag::Unknown,
            ),
        ];
        for (value, tag) in cases {
            assert_eq!(classify(&value), tag, "{value:?}");
        }
    }

    #[test]
    fn test_booleans_are_not_integers() {
        assert_eq!(
            PropertyValue::Boolean(false).type_tag(),
            PropertyTypeTag::Boolean
        );
        assert_ne!(
            PropertyValue::Boolean(true),
            PropertyValue::Integer(1)
        );
    }

    #[test]
    fn test_tag_names_round_trip() {
        for tag in PropertyTypeTag::ALL {
            assert_eq!(PropertyTypeTag::from_name(tag.name()), tag);
            assert_eq!(tag.to_string(), tag.name());
        }
        assert_eq!(
            PropertyTypeTag::from_name("geopoint"),
            PropertyTypeTag::Unknown
        );
        assert_eq!(
            PropertyTypeTag::from_name(" Boolean "),
            PropertyTypeTag::Boolean
        );
    }

    #[test]
    fn test_entity_id_parse() {
        assert_eq!(EntityId::parse("42"), EntityId::Id(42));
        assert_eq!(EntityId::parse("-7"), EntityId::Id(-7));
        assert_eq!(
            EntityId::parse("laptop_pro"),
            EntityId::Name("laptop_pro".into())
        );
        assert_eq!(
            EntityId::parse("12abc"),
            EntityId::Name("12abc".into())
        );
    }

    #[test]
    fn test_ids_sort_before_names() {
        let mut ids = vec![
            EntityId::Name("a".into()),
            EntityId::Id(10),
            EntityId::Id(2),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![EntityId::Id(2), EntityId::Id(10), EntityId::Name("a".into())]
        );
    }

    #[test]
    fn test_key_display() {
        assert_eq!(
            EntityKey::new("User", EntityId::Id(1)).to_string(),
            "Key('User', 1)"
        );
        assert_eq!(
            EntityKey::new("Settings", EntityId::Name("debug_mode".into()))
                .to_string(),
            "Key('Settings', 'debug_mode')"
        );
    }

    #[test]
    fn test_pagination() {
        let mut p = Pagination::new(None, None);
        assert_eq!((p.page, p.per_page, p.offset()), (1, 20, 0));
        p.total_count = 41;
        assert_eq!(p.total_pages(), 3);
        assert!(!p.has_prev());
        assert!(p.has_next());

        let mut p = Pagination::new(Some(3), Some(20));
        p.total_count = 41;
        assert_eq!(p.offset(), 40);
        assert!(p.has_prev());
        assert!(!p.has_next());
    }

    #[test]
    fn test_pagination_clamps_input() {
        let mut p = Pagination::new(Some(0), Some(0));
        assert_eq!((p.page, p.per_page), (1, 1));
        assert_eq!(p.total_pages(), 0);
        assert!(!p.has_next());
        p = Pagination::new(Some(2), Some(1_000_000));
        assert_eq!(p.per_page, crate::config::MAX_PER_PAGE);
    }
}
