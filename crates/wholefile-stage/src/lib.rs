#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, unused)]
#![allow(clippy::module_name_repetitions)]

//! Whole-file rot13 stage.
//!
//! A record carries a lazily opened file reference (`fileRef`) and a metadata
//! block (`fileInfo`). The stage streams the referenced bytes through rot13
//! into a new file under the configured directory, captures that file's
//! attributes, and emits the same record pointing at the new file.
//!
//! Layout: `file_ref.rs` (references and typed streams), `transform.rs`
//! (streaming byte transform), `attributes.rs` + `metadata.rs` (attribute
//! capture and projection), `value.rs` (record value model), `record.rs`,
//! `processor.rs` (per-record flow), `runner.rs` (lifecycle and error policy),
//! `error.rs`.

pub mod attributes;
pub mod error;
pub mod file_ref;
pub mod metadata;
pub mod processor;
pub mod record;
pub mod runner;
pub mod transform;
pub mod value;

pub use attributes::{AttributeValue, AttributeView, Attributes, PosixPermissions, read_attributes};
pub use error::{RecordError, StageError, StageResult};
pub use file_ref::{
    BufferedStream, BytesFileRef, FileRef, FileRefExt, FileRefHandle, InputStream, LocalFileRef,
    StreamTag, StreamType,
};
pub use metadata::{MetadataProjector, to_generic_value};
pub use processor::{ProcessState, ProcessedRecord, RecordProcessor};
pub use record::{Field, Record, file_info_with_filename};
pub use runner::{BatchOutput, StageRunner};
pub use transform::{ByteTransform, Rot13, TransformOutcome, rot13, transform_file};
pub use value::GenericValue;
