//! Minimal record model: named fields holding values or file references.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use uuid::Uuid;

use crate::error::{StageError, StageResult};
use crate::file_ref::FileRefHandle;
use crate::metadata::FILENAME_KEY;
use crate::value::GenericValue;

/// Field carrying the whole-file reference.
pub const FILE_REF_FIELD: &str = "fileRef";
/// Field carrying the file metadata block.
pub const FILE_INFO_FIELD: &str = "fileInfo";
/// Path of the file reference field.
pub const FILE_REF_PATH: &str = "/fileRef";
/// Path of the filename inside the metadata block.
pub const FILENAME_PATH: &str = "/fileInfo/filename";

/// Content of a top-level record field.
#[derive(Debug, Clone)]
pub enum Field {
    /// Structured value.
    Value(GenericValue),
    /// Lazily opened file content.
    FileRef(FileRefHandle),
}

impl Field {
    /// Name of the field kind, used in error values.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Value(value) => value.kind(),
            Self::FileRef(_) => "file_ref",
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Self::Value(value) => value.to_json(),
            Self::FileRef(file_ref) => json!({ "location": file_ref.describe() }),
        }
    }
}

impl From<GenericValue> for Field {
    fn from(value: GenericValue) -> Self {
        Self::Value(value)
    }
}

impl From<FileRefHandle> for Field {
    fn from(value: FileRefHandle) -> Self {
        Self::FileRef(value)
    }
}

/// A record flowing through the stage.
#[derive(Debug, Clone)]
pub struct Record {
    id: Uuid,
    fields: IndexMap<String, Field>,
}

impl Record {
    /// Empty record with a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    /// Empty record with a caller-chosen identifier.
    #[must_use]
    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            fields: IndexMap::new(),
        }
    }

    /// Whole-file record holding `file_ref` and its metadata block.
    #[must_use]
    pub fn whole_file(file_ref: FileRefHandle, file_info: GenericValue) -> Self {
        let mut record = Self::new();
        record.set(FILE_REF_FIELD, Field::FileRef(file_ref));
        record.set(FILE_INFO_FIELD, Field::Value(file_info));
        record
    }

    /// Record identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Top-level field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Replace a top-level field, returning the previous content.
    pub fn set(&mut self, name: impl Into<String>, field: impl Into<Field>) -> Option<Field> {
        self.fields.insert(name.into(), field.into())
    }

    /// Field names in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Resolve a `/`-separated path through value fields.
    ///
    /// The first segment names a top-level field; later segments descend into
    /// maps by key and into lists by index.
    #[must_use]
    pub fn value_at(&self, path: &str) -> Option<&GenericValue> {
        let mut segments = path.trim_start_matches('/').split('/');
        let Field::Value(root) = self.fields.get(segments.next()?)? else {
            return None;
        };
        let mut current = root;
        for segment in segments {
            current = match current {
                GenericValue::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                other => other.get(segment)?,
            };
        }
        Some(current)
    }

    /// The whole-file reference.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::MissingField`] when the field is absent and
    /// [`StageError::InvalidField`] when it holds a plain value.
    pub fn file_ref(&self) -> StageResult<&FileRefHandle> {
        match self.fields.get(FILE_REF_FIELD) {
            Some(Field::FileRef(file_ref)) => Ok(file_ref),
            Some(other) => Err(StageError::invalid(
                FILE_REF_PATH,
                "not_a_file_ref",
                Some(other.kind().to_string()),
            )),
            None => Err(StageError::MissingField {
                field: FILE_REF_PATH,
            }),
        }
    }

    /// The filename recorded in the metadata block.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::MissingField`] when there is no filename and
    /// [`StageError::InvalidField`] when it is not a string.
    pub fn filename(&self) -> StageResult<&str> {
        let value = self.value_at(FILENAME_PATH).ok_or(StageError::MissingField {
            field: FILENAME_PATH,
        })?;
        value.as_str().ok_or_else(|| {
            StageError::invalid(FILENAME_PATH, "not_a_string", Some(value.kind().to_string()))
        })
    }

    /// JSON rendering: `{"id": .., "fields": {..}}`, fields in insertion order.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let fields: JsonMap<String, JsonValue> = self
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field.to_json()))
            .collect();
        json!({ "id": self.id, "fields": fields })
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Build a minimal metadata block carrying only a filename.
#[must_use]
pub fn file_info_with_filename(filename: &str) -> GenericValue {
    let mut entries = IndexMap::new();
    entries.insert(FILENAME_KEY.to_string(), GenericValue::from(filename));
    GenericValue::ListMap(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_ref::BytesFileRef;
    use std::sync::Arc;

    fn sample() -> Record {
        Record::whole_file(
            Arc::new(BytesFileRef::new("sample", b"abc".to_vec())),
            file_info_with_filename("testfile"),
        )
    }

    #[test]
    fn value_at_walks_nested_maps_and_lists() {
        let mut record = sample();
        record.set(
            "tags",
            GenericValue::List(vec![GenericValue::from("a"), GenericValue::from("b")]),
        );
        assert_eq!(
            record.value_at(FILENAME_PATH).and_then(GenericValue::as_str),
            Some("testfile")
        );
        assert_eq!(
            record.value_at("/tags/1").and_then(GenericValue::as_str),
            Some("b")
        );
        assert!(record.value_at("/tags/9").is_none());
        assert!(record.value_at(FILE_REF_PATH).is_none());
        assert!(record.value_at("/missing/filename").is_none());
    }

    #[test]
    fn accessors_report_missing_and_mistyped_fields() {
        let empty = Record::new();
        assert!(matches!(
            empty.file_ref(),
            Err(StageError::MissingField { field: FILE_REF_PATH })
        ));
        assert!(matches!(
            empty.filename(),
            Err(StageError::MissingField { field: FILENAME_PATH })
        ));

        let mut wrong = Record::new();
        wrong.set(FILE_REF_FIELD, GenericValue::from("not a reference"));
        wrong.set(FILE_INFO_FIELD, {
            let mut entries = IndexMap::new();
            entries.insert(FILENAME_KEY.to_string(), GenericValue::Integer(5));
            GenericValue::ListMap(entries)
        });
        assert!(matches!(
            wrong.file_ref(),
            Err(StageError::InvalidField { reason: "not_a_file_ref", .. })
        ));
        assert!(matches!(
            wrong.filename(),
            Err(StageError::InvalidField { reason: "not_a_string", .. })
        ));
    }

    #[test]
    fn json_rendering_keeps_field_order() {
        let record = sample();
        let json = record.to_json();
        assert_eq!(json["id"], json!(record.id()));
        assert_eq!(json["fields"]["fileRef"]["location"], "memory:sample");
        assert_eq!(json["fields"]["fileInfo"]["filename"], "testfile");
        let names: Vec<_> = record.field_names().collect();
        assert_eq!(names, vec![FILE_REF_FIELD, FILE_INFO_FIELD]);
    }
}
