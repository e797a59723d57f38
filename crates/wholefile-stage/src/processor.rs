//! Per-record orchestration: extract, transform, re-capture metadata, emit.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, info_span, warn};
use wholefile_config::StageConfig;

use crate::error::{RecordError, StageError, StageResult};
use crate::file_ref::{FileRef, LocalFileRef};
use crate::metadata::MetadataProjector;
use crate::record::{FILE_INFO_FIELD, FILE_REF_FIELD, FILENAME_PATH, Field, Record};
use crate::transform::{ByteTransform, Rot13, transform_file};
use crate::value::GenericValue;

/// Steps a record moves through inside the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// The record has been accepted.
    Received,
    /// Filename and source reference were read from the record.
    Extracted,
    /// The destination file has been written and closed.
    Transformed,
    /// Metadata for the destination file has been captured.
    MetadataCaptured,
    /// The record carries the new reference and metadata.
    Emitted,
    /// Processing stopped on an error.
    Failed,
}

impl ProcessState {
    /// Stable label for logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Extracted => "extracted",
            Self::Transformed => "transformed",
            Self::MetadataCaptured => "metadata_captured",
            Self::Emitted => "emitted",
            Self::Failed => "failed",
        }
    }
}

/// A successfully processed record.
#[derive(Debug, Clone)]
pub struct ProcessedRecord {
    /// The record with its reference and metadata replaced.
    pub record: Record,
    /// Path of the written file.
    pub destination: PathBuf,
    /// Bytes written.
    pub bytes: u64,
}

struct Rewritten {
    file_ref: LocalFileRef,
    file_info: GenericValue,
    bytes: u64,
}

/// Rewrites whole-file records through a byte transform into the configured directory.
#[derive(Debug, Clone)]
pub struct RecordProcessor<T = Rot13> {
    config: StageConfig,
    transform: T,
    projector: MetadataProjector,
}

impl RecordProcessor<Rot13> {
    /// Processor applying rot13.
    #[must_use]
    pub fn new(config: StageConfig) -> Self {
        Self::with_transform(config, Rot13)
    }
}

impl<T: ByteTransform> RecordProcessor<T> {
    /// Processor applying `transform`.
    #[must_use]
    pub fn with_transform(config: StageConfig, transform: T) -> Self {
        Self {
            config,
            transform,
            projector: MetadataProjector::default(),
        }
    }

    /// Replace the metadata projector.
    #[must_use]
    pub fn with_projector(mut self, projector: MetadataProjector) -> Self {
        self.projector = projector;
        self
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Process one record.
    ///
    /// On success the same record comes back with `fileRef` pointing at the
    /// new file and `fileInfo` replaced by that file's metadata.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] holding the unmodified record and the last
    /// state reached when any step fails.
    pub fn process(&self, mut record: Record) -> Result<ProcessedRecord, RecordError> {
        let span = info_span!("record", record_id = %record.id());
        let _entered = span.enter();

        let mut state = ProcessState::Received;
        match self.rewrite(&record, &mut state) {
            Ok(rewritten) => {
                let destination = rewritten.file_ref.path();
                record.set(FILE_REF_FIELD, Field::FileRef(Arc::new(rewritten.file_ref)));
                record.set(FILE_INFO_FIELD, Field::Value(rewritten.file_info));
                info!(
                    state = ProcessState::Emitted.as_str(),
                    destination = %destination.display(),
                    bytes = rewritten.bytes,
                    "record emitted"
                );
                Ok(ProcessedRecord {
                    record,
                    destination,
                    bytes: rewritten.bytes,
                })
            }
            Err(source) => {
                warn!(
                    state = ProcessState::Failed.as_str(),
                    failed_after = state.as_str(),
                    error = %source,
                    "record processing failed"
                );
                Err(RecordError::new(record, state, source))
            }
        }
    }

    fn rewrite(&self, record: &Record, state: &mut ProcessState) -> StageResult<Rewritten> {
        let filename = plain_filename(record.filename()?)?;
        let source = Arc::clone(record.file_ref()?);
        *state = ProcessState::Extracted;
        debug!(
            state = state.as_str(),
            filename,
            source = %source.describe(),
            "record extracted"
        );

        let destination = LocalFileRef::new(&self.config.directory, filename);
        let outcome = transform_file(
            source.as_ref(),
            destination,
            self.config.overwrite,
            &self.transform,
        )?;
        *state = ProcessState::Transformed;
        debug!(state = state.as_str(), bytes = outcome.bytes, "destination written");

        let file_info = self.projector.project(&outcome.file_ref.path())?;
        *state = ProcessState::MetadataCaptured;
        debug!(state = state.as_str(), "metadata captured");

        Ok(Rewritten {
            file_ref: outcome.file_ref,
            file_info,
            bytes: outcome.bytes,
        })
    }
}

fn plain_filename(filename: &str) -> StageResult<&str> {
    if filename.trim().is_empty() {
        return Err(StageError::invalid(
            FILENAME_PATH,
            "empty",
            Some(filename.to_string()),
        ));
    }
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == filename => Ok(filename),
        _ => Err(StageError::invalid(
            FILENAME_PATH,
            "not_a_plain_filename",
            Some(filename.to_string()),
        )),
    }
}
