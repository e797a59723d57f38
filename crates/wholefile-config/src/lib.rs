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

//! Configuration for the wholefile rot13 stage.
//!
//! Layout: `model.rs` (typed config and policies), `loader.rs` (JSON/env
//! sources), `validate.rs` (startup directory probe), `error.rs`.

pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ENV_DIRECTORY, ENV_ON_RECORD_ERROR, ENV_OVERWRITE};
pub use model::{OnRecordError, OverwritePolicy, STAGE_GROUP, StageConfig};
pub use validate::{ConfigIssue, ConfigIssueKind, validate_directory};
