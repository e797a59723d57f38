//! Loading of [`StageConfig`] from JSON documents and the process environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{OnRecordError, OverwritePolicy, StageConfig, normalise_directory};

/// Environment variable naming the output directory.
pub const ENV_DIRECTORY: &str = "WHOLEFILE_DIRECTORY";
/// Environment variable selecting the overwrite policy.
pub const ENV_OVERWRITE: &str = "WHOLEFILE_OVERWRITE";
/// Environment variable selecting the record error policy.
pub const ENV_ON_RECORD_ERROR: &str = "WHOLEFILE_ON_RECORD_ERROR";

const KNOWN_FIELDS: &[&str] = &["directory", "overwrite", "on_record_error"];

impl StageConfig {
    /// Parse a configuration object such as `{"directory": "/srv/out"}`.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is not an object, when `directory` is
    /// missing or blank, when a policy is unknown, or when an unknown field is present.
    pub fn from_json(value: &Value) -> ConfigResult<Self> {
        let map = value.as_object().ok_or_else(|| ConfigError::InvalidField {
            field: "stage",
            reason: "not_an_object",
            value: Some(value.to_string()),
        })?;
        reject_unknown_fields(map)?;

        let directory = match map.get("directory") {
            None | Some(Value::Null) => {
                return Err(ConfigError::MissingField { field: "directory" });
            }
            Some(Value::String(raw)) => normalise_directory(Path::new(raw))?,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "directory",
                    "not_a_string",
                    &other.to_string(),
                ));
            }
        };

        let overwrite = parse_policy::<OverwritePolicy>(map, "overwrite")?.unwrap_or_default();
        let on_record_error =
            parse_policy::<OnRecordError>(map, "on_record_error")?.unwrap_or_default();

        Ok(Self {
            directory,
            overwrite,
            on_record_error,
        })
    }

    /// Read and parse a JSON configuration document from disk.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, is not JSON, or does
    /// not describe a valid configuration.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            operation: "config.read",
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            operation: "config.parse",
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded stage configuration document");
        Self::from_json(&value)
    }

    /// Build the configuration from `WHOLEFILE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when `WHOLEFILE_DIRECTORY` is unset or blank, or a
    /// policy variable holds an unknown value.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`StageConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let directory = lookup(ENV_DIRECTORY).ok_or(ConfigError::MissingField {
            field: "directory",
        })?;
        let mut config = Self::new(PathBuf::from(directory))?;
        if let Some(value) = lookup(ENV_OVERWRITE) {
            config.overwrite = value.parse()?;
        }
        if let Some(value) = lookup(ENV_ON_RECORD_ERROR) {
            config.on_record_error = value.parse()?;
        }
        Ok(config)
    }
}

fn reject_unknown_fields(map: &Map<String, Value>) -> ConfigResult<()> {
    match map.keys().find(|key| !KNOWN_FIELDS.contains(&key.as_str())) {
        Some(key) => Err(ConfigError::UnknownField { field: key.clone() }),
        None => Ok(()),
    }
}

fn parse_policy<T>(map: &Map<String, Value>, field: &'static str) -> ConfigResult<Option<T>>
where
    T: std::str::FromStr<Err = ConfigError>,
{
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => raw.parse().map(Some),
        Some(other) => Err(ConfigError::invalid(
            field,
            "not_a_string",
            &other.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn from_json_reads_directory_and_policies() -> ConfigResult<()> {
        let config = StageConfig::from_json(&json!({
            "directory": "/srv/rot13",
            "overwrite": "fail",
            "on_record_error": "discard"
        }))?;
        assert_eq!(config.directory, PathBuf::from("/srv/rot13"));
        assert_eq!(config.overwrite, OverwritePolicy::Fail);
        assert_eq!(config.on_record_error, OnRecordError::Discard);
        Ok(())
    }

    #[test]
    fn from_json_requires_directory() {
        let err = StageConfig::from_json(&json!({ "overwrite": "replace" })).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "directory" }));

        let err = StageConfig::from_json(&json!({ "directory": 42 })).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                reason: "not_a_string",
                ..
            }
        ));
    }

    #[test]
    fn from_json_rejects_unknown_fields_and_non_objects() {
        let err = StageConfig::from_json(&json!({ "directory": "/tmp", "colour": "red" }))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownField { field } if field == "colour"));

        let err = StageConfig::from_json(&json!(["/tmp"])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "stage",
                ..
            }
        ));
    }

    #[test]
    fn serialised_config_reads_back_through_from_json() -> ConfigResult<()> {
        let config = StageConfig::new("/srv/rot13")?
            .with_overwrite(OverwritePolicy::Fail)
            .with_on_record_error(OnRecordError::StopPipeline);
        let document = serde_json::to_value(&config).map_err(|source| ConfigError::Json {
            operation: "config.serialise",
            path: config.directory.clone(),
            source,
        })?;
        assert_eq!(document["on_record_error"], json!("stop_pipeline"));
        assert_eq!(StageConfig::from_json(&document)?, config);
        Ok(())
    }

    #[test]
    fn from_lookup_applies_overrides() -> ConfigResult<()> {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_DIRECTORY, "/var/lib/rot13"),
            (ENV_OVERWRITE, "FAIL"),
            (ENV_ON_RECORD_ERROR, "stop-pipeline"),
        ]);
        let config = StageConfig::from_lookup(|name| vars.get(name).map(ToString::to_string))?;
        assert_eq!(config.directory, PathBuf::from("/var/lib/rot13"));
        assert_eq!(config.overwrite, OverwritePolicy::Fail);
        assert_eq!(config.on_record_error, OnRecordError::StopPipeline);
        Ok(())
    }

    #[test]
    fn from_lookup_requires_directory() {
        let err = StageConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "directory" }));
    }
}
