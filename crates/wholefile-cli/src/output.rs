//! Renderers for emitted records and record failures.

use anyhow::anyhow;
use wholefile_stage::{Record, RecordError};

use crate::cli::{CliError, CliResult};

pub(crate) fn render_record(record: &Record) -> CliResult<String> {
    serde_json::to_string(record)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

pub(crate) fn render_failure(failure: &RecordError) -> String {
    let filename = failure.record.filename().unwrap_or("<unknown>");
    format!(
        "record {} ({filename}) failed after {}: {}",
        failure.record.id(),
        failure.state.as_str(),
        failure.chain_message()
    )
}
