//! Typed configuration models for the rot13 stage.
//!
//! # Design
//! - Pure data carriers handed to the stage constructor; no IO here.
//! - Policies parse from their lowercase names so every source (JSON, env,
//!   CLI flags) shares one vocabulary.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ConfigError, ConfigResult};

/// Configuration group reported alongside startup issues.
pub const STAGE_GROUP: &str = "ROT13";

/// Snapshot of the stage configuration, established once at startup.
///
/// Serialises to the same document shape [`StageConfig::from_json`] reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageConfig {
    /// Directory that receives one output file per processed record.
    pub directory: PathBuf,
    /// Behaviour when the destination file already exists.
    pub overwrite: OverwritePolicy,
    /// What the runner does with records that fail processing.
    pub on_record_error: OnRecordError,
}

impl StageConfig {
    /// Build a configuration for `directory` using default policies.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when the directory is blank.
    pub fn new(directory: impl AsRef<Path>) -> ConfigResult<Self> {
        let directory = normalise_directory(directory.as_ref())?;
        Ok(Self {
            directory,
            overwrite: OverwritePolicy::default(),
            on_record_error: OnRecordError::default(),
        })
    }

    /// Replace the overwrite policy.
    #[must_use]
    pub const fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Replace the record error policy.
    #[must_use]
    pub const fn with_on_record_error(mut self, policy: OnRecordError) -> Self {
        self.on_record_error = policy;
        self
    }
}

pub(crate) fn normalise_directory(directory: &Path) -> ConfigResult<PathBuf> {
    let raw = directory.to_string_lossy();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid("directory", "empty", &raw));
    }
    if trimmed.len() == raw.len() {
        Ok(directory.to_path_buf())
    } else {
        Ok(PathBuf::from(trimmed))
    }
}

/// Handling of a destination file that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Truncate and rewrite the existing file.
    #[default]
    Replace,
    /// Refuse to touch the existing file and fail the record instead.
    Fail,
}

impl OverwritePolicy {
    /// Render the policy as its configuration string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Fail => "fail",
        }
    }
}

impl FromStr for OverwritePolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "fail" => Ok(Self::Fail),
            _ => Err(ConfigError::invalid("overwrite", "unknown_variant", value)),
        }
    }
}

impl Display for OverwritePolicy {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Policy applied by the runner when a record fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnRecordError {
    /// Route the failed record to the error output.
    #[default]
    ToError,
    /// Drop the failed record silently (it is still logged and counted).
    Discard,
    /// Abort the batch on the first failure.
    StopPipeline,
}

impl OnRecordError {
    /// Render the policy as its configuration string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToError => "to_error",
            Self::Discard => "discard",
            Self::StopPipeline => "stop_pipeline",
        }
    }
}

impl FromStr for OnRecordError {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "to_error" => Ok(Self::ToError),
            "discard" => Ok(Self::Discard),
            "stop_pipeline" => Ok(Self::StopPipeline),
            _ => Err(ConfigError::invalid(
                "on_record_error",
                "unknown_variant",
                value,
            )),
        }
    }
}

impl Display for OnRecordError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
