//! # Design
//!
//! - Provide structured, constant-message errors for the rot13 stage.
//! - Capture operation context (paths, fields, inputs) to make failures reproducible in tests.
//! - Keep per-record failures separate from stage-fatal ones: a [`RecordError`]
//!   carries the record back to the runner, a [`StageError`] alone never does.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use wholefile_config::ConfigIssue;

use crate::file_ref::StreamTag;
use crate::processor::ProcessState;
use crate::record::Record;

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Errors produced by the rot13 stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// IO failures while interacting with the filesystem.
    #[error("stage io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A file reference was asked for a stream type it cannot produce.
    #[error("unsupported stream capability")]
    UnsupportedCapability {
        /// Stream type that was requested.
        requested: StreamTag,
        /// Location of the file reference.
        location: String,
    },
    /// A record lacked a field the stage reads.
    #[error("record field missing")]
    MissingField {
        /// Path of the missing field.
        field: &'static str,
    },
    /// A record field held a value of the wrong shape.
    #[error("record field invalid")]
    InvalidField {
        /// Path of the offending field.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// The destination file exists and the overwrite policy forbids replacing it.
    #[error("destination already exists")]
    DestinationExists {
        /// Path of the existing file.
        path: PathBuf,
    },
    /// The destination resolves to the file being read.
    #[error("destination is the source file")]
    DestinationIsSource {
        /// Path shared by source and destination.
        path: PathBuf,
    },
    /// Startup validation reported configuration issues.
    #[error("stage configuration invalid")]
    InvalidConfiguration {
        /// Every issue found during validation.
        issues: Vec<ConfigIssue>,
    },
    /// Records were submitted before `init` succeeded or after `destroy`.
    #[error("stage not initialised")]
    NotInitialised,
    /// A record failed under the `stop_pipeline` policy.
    #[error("pipeline stopped on record error")]
    PipelineStopped {
        /// The record failure that stopped the batch.
        source: Box<RecordError>,
    },
}

impl StageError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: Option<String>) -> Self {
        Self::InvalidField {
            field,
            reason,
            value,
        }
    }
}

/// A recoverable failure tied to a single record.
///
/// The surrounding pipeline decides, per its error policy, whether the record
/// is discarded, routed to an error output, or stops the batch.
#[derive(Debug, Error)]
#[error("record processing failed")]
pub struct RecordError {
    /// The record as it was when processing failed; fields are untouched.
    pub record: Box<Record>,
    /// Last state reached before the failure.
    pub state: ProcessState,
    /// Underlying stage error.
    pub source: StageError,
}

impl RecordError {
    pub(crate) fn new(record: Record, state: ProcessState, source: StageError) -> Self {
        Self {
            record: Box::new(record),
            state,
            source,
        }
    }

    /// Render the full error chain on one line.
    #[must_use]
    pub fn chain_message(&self) -> String {
        let mut message = self.to_string();
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(&self.source);
        while let Some(err) = current {
            message.push_str(": ");
            message.push_str(&err.to_string());
            current = err.source();
        }
        message
    }
}
