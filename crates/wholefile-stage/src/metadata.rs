//! Projection of filesystem attributes into the record value model.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use crate::attributes::{AttributeValue, AttributeView, read_attributes};
use crate::error::{StageError, StageResult};
use crate::value::GenericValue;

/// Entry holding the bare filename.
pub const FILENAME_KEY: &str = "filename";
/// Entry holding the full path.
pub const FILE_KEY: &str = "file";

/// Captures file attributes as an ordered [`GenericValue::ListMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataProjector {
    view: AttributeView,
}

impl MetadataProjector {
    /// Projector reading through `view`.
    #[must_use]
    pub const fn new(view: AttributeView) -> Self {
        Self { view }
    }

    /// Attribute view in use.
    #[must_use]
    pub const fn view(&self) -> AttributeView {
        self.view
    }

    /// Describe the file at `path`.
    ///
    /// The `filename` and `file` entries always reflect `path` itself,
    /// whatever the attribute view reported under those names.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Io`] when the attributes cannot be read and
    /// [`StageError::InvalidField`] when `path` has no filename.
    pub fn project(&self, path: &Path) -> StageResult<GenericValue> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StageError::invalid(
                    FILENAME_KEY,
                    "no_filename",
                    Some(path.to_string_lossy().into_owned()),
                )
            })?;

        let attributes = read_attributes(path, self.view)?;
        let mut projected: IndexMap<String, GenericValue> = attributes
            .into_iter()
            .map(|(name, value)| (name, to_generic_value(value)))
            .collect();
        projected.insert(FILENAME_KEY.to_string(), GenericValue::String(filename));
        projected.insert(
            FILE_KEY.to_string(),
            GenericValue::String(path.to_string_lossy().into_owned()),
        );

        debug!(
            path = %path.display(),
            view = self.view.as_str(),
            entries = projected.len(),
            "captured file metadata"
        );
        Ok(GenericValue::ListMap(projected))
    }
}

impl Default for MetadataProjector {
    fn default() -> Self {
        Self::new(AttributeView::native())
    }
}

/// Convert a host attribute value into a [`GenericValue`].
///
/// Total: null becomes the empty string, permission sets their `rwx` form,
/// opaque values their text, and map keys their display form. Ordered maps
/// keep their entry order; a repeated key keeps its first position and the
/// last value.
#[must_use]
pub fn to_generic_value(value: AttributeValue) -> GenericValue {
    match value {
        AttributeValue::Null => GenericValue::String(String::new()),
        AttributeValue::Boolean(value) => GenericValue::Boolean(value),
        AttributeValue::Char(value) => GenericValue::Char(value),
        AttributeValue::Byte(value) => GenericValue::Byte(value),
        AttributeValue::Short(value) => GenericValue::Short(value),
        AttributeValue::Integer(value) => GenericValue::Integer(value),
        AttributeValue::Long(value) => GenericValue::Long(value),
        AttributeValue::Float(value) => GenericValue::Float(value),
        AttributeValue::Double(value) => GenericValue::Double(value),
        AttributeValue::Decimal(value) => GenericValue::Decimal(value),
        AttributeValue::Text(value) | AttributeValue::Opaque(value) => {
            GenericValue::String(value)
        }
        AttributeValue::Bytes(value) => GenericValue::ByteArray(value),
        AttributeValue::Time(value) => GenericValue::Datetime(value),
        AttributeValue::Permissions(value) => GenericValue::String(value.to_string()),
        AttributeValue::Sequence(items) => {
            GenericValue::List(items.into_iter().map(to_generic_value).collect())
        }
        AttributeValue::OrderedMap(entries) => GenericValue::ListMap(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), to_generic_value(value)))
                .collect::<IndexMap<_, _>>(),
        ),
        AttributeValue::Map(entries) => GenericValue::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), to_generic_value(value)))
                .collect::<HashMap<_, _>>(),
        ),
    }
}
