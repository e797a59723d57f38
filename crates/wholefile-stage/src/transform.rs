//! Streaming byte transform from a source reference into a new local file.
//!
//! # Design
//! - Works on raw bytes in bounded chunks; memory use does not depend on file size.
//! - The source is opened before the destination is touched, so an unreadable
//!   source never leaves an empty destination behind.
//! - A destination that is the source file itself is refused; truncating it
//!   would destroy the input before a byte is read.
//! - Both handles are scoped to [`transform_file`]; the destination is flushed
//!   and closed before the function returns. A mid-stream failure leaves the
//!   partial destination in place.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, warn};
use wholefile_config::OverwritePolicy;

use crate::error::{StageError, StageResult};
use crate::file_ref::{FileRef, FileRefExt, InputStream, LocalFileRef};

/// Per-byte substitution applied by the transform engine.
pub trait ByteTransform {
    /// Map a single byte.
    fn apply(&self, byte: u8) -> u8;

    /// Map every byte of `chunk` in place.
    fn apply_chunk(&self, chunk: &mut [u8]) {
        for byte in chunk {
            *byte = self.apply(*byte);
        }
    }
}

impl<F> ByteTransform for F
where
    F: Fn(u8) -> u8,
{
    fn apply(&self, byte: u8) -> u8 {
        self(byte)
    }
}

/// The rot13 substitution over ASCII letters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rot13;

impl ByteTransform for Rot13 {
    fn apply(&self, byte: u8) -> u8 {
        rot13(byte)
    }
}

/// Rotate ASCII letters by 13 places, preserving case; every other byte passes through.
#[must_use]
pub const fn rot13(byte: u8) -> u8 {
    match byte {
        b'a'..=b'm' | b'A'..=b'M' => byte + 13,
        b'n'..=b'z' | b'N'..=b'Z' => byte - 13,
        _ => byte,
    }
}

/// Result of a completed transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutcome {
    /// Reference to the newly written file.
    pub file_ref: LocalFileRef,
    /// Bytes written to the destination.
    pub bytes: u64,
}

/// Stream `source` through `transform` into the file named by `destination`.
///
/// # Errors
///
/// Returns [`StageError::DestinationIsSource`] when `destination` names the
/// file backing `source`, [`StageError::UnsupportedCapability`] or
/// [`StageError::Io`] when the source cannot be opened,
/// [`StageError::DestinationExists`] when the policy is
/// [`OverwritePolicy::Fail`] and the file is already present, and
/// [`StageError::Io`] for any read, write or flush failure.
pub fn transform_file<S, T>(
    source: &S,
    destination: LocalFileRef,
    overwrite: OverwritePolicy,
    transform: &T,
) -> StageResult<TransformOutcome>
where
    S: FileRef + ?Sized,
    T: ByteTransform + ?Sized,
{
    let path = destination.path();
    if let Some(source_path) = source.local_path()
        && same_file(&source_path, &path)
    {
        warn!(path = %path.display(), "destination resolves to the source file");
        return Err(StageError::DestinationIsSource { path });
    }
    let mut reader = source.open::<InputStream>()?;
    let file = create_destination(&path, overwrite)?;
    let mut writer = BufWriter::with_capacity(destination.buffer_size(), file);

    let mut chunk = vec![0_u8; destination.buffer_size()];
    let mut bytes: u64 = 0;
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(source_err) => {
                warn!(
                    source = %source.describe(),
                    destination = %path.display(),
                    bytes,
                    "transform aborted while reading source"
                );
                return Err(StageError::io(
                    "transform.read",
                    source.describe(),
                    source_err,
                ));
            }
        };
        let filled = &mut chunk[..read];
        transform.apply_chunk(filled);
        writer
            .write_all(filled)
            .map_err(|source_err| StageError::io("transform.write", &path, source_err))?;
        bytes += read as u64;
    }

    let file = writer
        .into_inner()
        .map_err(|err| StageError::io("transform.flush", &path, err.into_error()))?;
    drop(file);
    drop(reader);

    debug!(
        source = %source.describe(),
        destination = %path.display(),
        bytes,
        "transform complete"
    );
    Ok(TransformOutcome {
        file_ref: destination,
        bytes,
    })
}

#[cfg(unix)]
fn same_file(left: &Path, right: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (fs::metadata(left), fs::metadata(right)) {
        (Ok(left), Ok(right)) => left.dev() == right.dev() && left.ino() == right.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(left: &Path, right: &Path) -> bool {
    match (fs::canonicalize(left), fs::canonicalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

fn create_destination(path: &Path, overwrite: OverwritePolicy) -> StageResult<File> {
    match overwrite {
        OverwritePolicy::Replace => File::create(path)
            .map_err(|source| StageError::io("transform.create_destination", path, source)),
        OverwritePolicy::Fail => OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| {
                if source.kind() == io::ErrorKind::AlreadyExists {
                    StageError::DestinationExists {
                        path: path.to_path_buf(),
                    }
                } else {
                    StageError::io("transform.create_destination", path, source)
                }
            }),
    }
}
