//! Uniform tagged value model carried inside records.

use std::collections::{BTreeMap, HashMap};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

/// Tagged value stored in record fields.
#[derive(Debug, Clone, PartialEq)]
pub enum GenericValue {
    /// Absent value.
    Null,
    /// Boolean.
    Boolean(bool),
    /// Single character.
    Char(char),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// 16-bit integer.
    Short(i16),
    /// 32-bit integer.
    Integer(i32),
    /// 64-bit integer.
    Long(i64),
    /// Single precision float.
    Float(f32),
    /// Double precision float.
    Double(f64),
    /// Arbitrary precision decimal.
    Decimal(Decimal),
    /// Instant in UTC.
    Datetime(DateTime<Utc>),
    /// UTF-8 text.
    String(String),
    /// Opaque byte blob.
    ByteArray(Vec<u8>),
    /// Ordered list.
    List(Vec<GenericValue>),
    /// Map without a meaningful key order.
    Map(HashMap<String, GenericValue>),
    /// Map that keeps insertion order.
    ListMap(IndexMap<String, GenericValue>),
}

impl GenericValue {
    /// Name of the variant, used in logs and error values.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Char(_) => "char",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Integer(_) => "integer",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Decimal(_) => "decimal",
            Self::Datetime(_) => "datetime",
            Self::String(_) => "string",
            Self::ByteArray(_) => "byte_array",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::ListMap(_) => "list_map",
        }
    }

    /// Borrow the text of a `String` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Look up `key` in a `Map` or `ListMap` value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(entries) => entries.get(key),
            Self::ListMap(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Convert into JSON.
    ///
    /// Decimals render as strings, datetimes as RFC 3339, byte blobs as
    /// base64. `ListMap` keeps its order; `Map` keys are sorted. Non-finite
    /// floats become `null`.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Boolean(value) => JsonValue::Bool(*value),
            Self::Char(value) => JsonValue::String(value.to_string()),
            Self::Byte(value) => JsonValue::from(*value),
            Self::Short(value) => JsonValue::from(*value),
            Self::Integer(value) => JsonValue::from(*value),
            Self::Long(value) => JsonValue::from(*value),
            Self::Float(value) => float_to_json(f64::from(*value)),
            Self::Double(value) => float_to_json(*value),
            Self::Decimal(value) => JsonValue::String(value.to_string()),
            Self::Datetime(value) => {
                JsonValue::String(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::String(value) => JsonValue::String(value.clone()),
            Self::ByteArray(value) => JsonValue::String(BASE64.encode(value)),
            Self::List(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => {
                let sorted: BTreeMap<_, _> = entries.iter().collect();
                JsonValue::Object(
                    sorted
                        .into_iter()
                        .map(|(key, value)| (key.clone(), value.to_json()))
                        .collect::<JsonMap<_, _>>(),
                )
            }
            Self::ListMap(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect::<JsonMap<_, _>>(),
            ),
        }
    }
}

fn float_to_json(value: f64) -> JsonValue {
    Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

impl Serialize for GenericValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for GenericValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for GenericValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<&str> for GenericValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for GenericValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<IndexMap<String, Self>> for GenericValue {
    fn from(value: IndexMap<String, Self>) -> Self {
        Self::ListMap(value)
    }
}
