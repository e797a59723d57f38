//! Startup validation proving the output directory is writable.
//!
//! # Design
//! - Issues are collected, never short-circuited, so operators see every
//!   problem in one pass.
//! - The probe creates and removes a uniquely named file; nothing else in the
//!   directory is touched.

use std::fmt::{self, Display, Formatter};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::model::STAGE_GROUP;

const PROBE_PREFIX: &str = "dummy-";
const DIRECTORY_FIELD: &str = "directory";

/// Category of a startup configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssueKind {
    /// The output directory did not exist and could not be created.
    DirectoryParentUncreatable,
    /// A probe file could not be created inside the output directory.
    DirectoryFileUncreatable,
    /// The directory could not be accessed at all.
    DirectoryInaccessible,
}

impl ConfigIssueKind {
    /// Stable code used in logs and operator-facing output.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::DirectoryParentUncreatable => "ROT13_00",
            Self::DirectoryFileUncreatable => "ROT13_01",
            Self::DirectoryInaccessible => "ROT13_02",
        }
    }

    /// Short description of the issue.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::DirectoryParentUncreatable => "cannot create parent directory",
            Self::DirectoryFileUncreatable => "cannot create file",
            Self::DirectoryInaccessible => "directory inaccessible",
        }
    }
}

impl Display for ConfigIssueKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.message())
    }
}

/// A single configuration problem that prevents the stage from running.
#[derive(Debug)]
pub struct ConfigIssue {
    /// Configuration group owning the field.
    pub group: &'static str,
    /// Configuration field at fault.
    pub field: &'static str,
    /// Issue category.
    pub kind: ConfigIssueKind,
    /// Path the probe was operating on.
    pub path: PathBuf,
    /// Underlying IO failure, when one was observed.
    pub source: Option<io::Error>,
}

impl ConfigIssue {
    fn new(kind: ConfigIssueKind, path: &Path, source: Option<io::Error>) -> Self {
        Self {
            group: STAGE_GROUP,
            field: DIRECTORY_FIELD,
            kind,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Human-readable detail including the underlying cause.
    #[must_use]
    pub fn detail(&self) -> String {
        match &self.source {
            Some(source) => format!("{} '{}': {source}", self.kind, self.path.display()),
            None => format!("{} '{}'", self.kind, self.path.display()),
        }
    }
}

impl Display for ConfigIssue {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} [{}/{}] {}",
            self.kind.code(),
            self.group,
            self.field,
            self.detail()
        )
    }
}

/// Probe `directory` and report every reason it cannot receive output files.
///
/// An empty list means the directory exists (or was created) and a file
/// could be created and removed inside it.
#[must_use]
pub fn validate_directory(directory: &Path) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    let probe = directory.join(format!("{PROBE_PREFIX}{}", Uuid::new_v4()));

    if let Err(issue) = probe_directory(directory, &probe) {
        match &issue.source {
            Some(source) => error!(
                code = issue.kind.code(),
                path = %issue.path.display(),
                error = %source,
                "output directory failed validation"
            ),
            None => error!(
                code = issue.kind.code(),
                path = %issue.path.display(),
                "output directory failed validation"
            ),
        }
        issues.push(issue);
    } else {
        debug!(directory = %directory.display(), "output directory is writable");
    }

    issues
}

fn probe_directory(directory: &Path, probe: &Path) -> Result<(), ConfigIssue> {
    if !directory.exists() {
        fs::create_dir_all(directory).map_err(|source| {
            ConfigIssue::new(
                ConfigIssueKind::DirectoryParentUncreatable,
                directory,
                Some(source),
            )
        })?;
    }

    match OpenOptions::new().write(true).create_new(true).open(probe) {
        Ok(file) => drop(file),
        Err(source)
            if matches!(
                source.kind(),
                io::ErrorKind::AlreadyExists | io::ErrorKind::PermissionDenied
            ) =>
        {
            return Err(ConfigIssue::new(
                ConfigIssueKind::DirectoryFileUncreatable,
                probe,
                Some(source),
            ));
        }
        Err(source) => {
            return Err(ConfigIssue::new(
                ConfigIssueKind::DirectoryInaccessible,
                directory,
                Some(source),
            ));
        }
    }

    remove_probe(probe);
    Ok(())
}

/// Remove the check file; a failure is logged and otherwise ignored.
fn remove_probe(probe: &Path) -> bool {
    match fs::remove_file(probe) {
        Ok(()) => true,
        Err(source) => {
            warn!(probe = %probe.display(), error = %source, "failed to remove directory probe");
            false
        }
    }
}
