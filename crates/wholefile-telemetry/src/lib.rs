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

//! Telemetry primitives shared across the wholefile workspace.
//!
//! This crate centralises logging and metrics so the stage and its runners
//! adopt one observability story.
//! Layout: `init.rs` (subscriber setup), `metrics.rs` (Prometheus registry),
//! `error.rs`.

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot, RecordOutcome};
