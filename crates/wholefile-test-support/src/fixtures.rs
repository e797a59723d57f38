//! Test fixtures and filesystem helpers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Canonical plain-text payload used by transform tests.
pub const SAMPLE_TEXT: &str = "The quick brown fox jumps over the lazy dog.";
/// Expected rot13 form of [`SAMPLE_TEXT`].
pub const SAMPLE_ROT13: &str = "Gur dhvpx oebja sbk whzcf bire gur ynml qbt.";
/// Filename used for single-record fixtures.
pub const SAMPLE_FILENAME: &str = "testfile";

/// Create a fresh temporary directory tagged with `label`.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn temp_dir(label: &str) -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(&format!("wholefile-{label}-"))
        .tempdir()
        .with_context(|| format!("failed to create temp dir for {label}"))
}

/// Write `contents` to `directory/name`, creating the directory when needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_input(directory: &Path, name: &str, contents: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(directory)
        .with_context(|| format!("failed to create {}", directory.display()))?;
    let path = directory.join(name);
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
