//! Lazy, capability-typed references to whole-file content.
//!
//! # Design
//! - A reference holds a location only; no handle is opened until a caller
//!   asks for a stream, and every request opens a fresh one owned by the caller.
//! - Callers request a stream by Rust type ([`InputStream`], [`BufferedStream`]);
//!   the capability check happens before any resource is allocated.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{StageError, StageResult};

/// Buffer size used by local references unless overridden.
pub const DEFAULT_BUFFER_SIZE: usize = 1_024;

/// Shared handle to a file reference stored inside records.
pub type FileRefHandle = Arc<dyn FileRef>;

/// Kinds of stream a reference may be able to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamTag {
    /// Plain sequential byte stream.
    Read,
    /// Buffered byte stream with line and chunk access.
    BufRead,
}

impl StreamTag {
    /// Stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::BufRead => "buf_read",
        }
    }
}

/// A freshly opened stream, tagged with the kind that was requested.
pub enum OpenedStream {
    /// Plain byte stream.
    Read(Box<dyn Read + Send>),
    /// Buffered byte stream.
    BufRead(Box<dyn BufRead + Send>),
}

/// Binding to file content that can be materialised into a stream on demand.
///
/// Implementations must be immutable: opening a stream never changes the
/// location the reference points at.
pub trait FileRef: fmt::Debug + Send + Sync {
    /// Stream kinds this reference can produce.
    fn supported_streams(&self) -> &'static [StreamTag];

    /// Human-readable location used in logs and serialised records.
    fn describe(&self) -> String;

    /// Open a new stream of the given kind.
    ///
    /// Only called with tags listed in [`FileRef::supported_streams`].
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying resource cannot be opened.
    fn open_tagged(&self, tag: StreamTag) -> StageResult<OpenedStream>;

    /// Filesystem path backing this reference, if any.
    fn local_path(&self) -> Option<PathBuf> {
        None
    }
}

/// Rust types a [`FileRef`] can be materialised into.
pub trait StreamType: Sized {
    /// Capability required to produce this type.
    const TAG: StreamTag;

    /// Unwrap an opened stream, returning `None` when it carries the wrong kind.
    fn from_opened(stream: OpenedStream) -> Option<Self>;
}

/// Caller-owned plain byte stream.
pub struct InputStream(Box<dyn Read + Send>);

impl StreamType for InputStream {
    const TAG: StreamTag = StreamTag::Read;

    fn from_opened(stream: OpenedStream) -> Option<Self> {
        match stream {
            OpenedStream::Read(inner) => Some(Self(inner)),
            OpenedStream::BufRead(_) => None,
        }
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

/// Caller-owned buffered byte stream.
pub struct BufferedStream(Box<dyn BufRead + Send>);

impl StreamType for BufferedStream {
    const TAG: StreamTag = StreamTag::BufRead;

    fn from_opened(stream: OpenedStream) -> Option<Self> {
        match stream {
            OpenedStream::BufRead(inner) => Some(Self(inner)),
            OpenedStream::Read(_) => None,
        }
    }
}

impl Read for BufferedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl BufRead for BufferedStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.0.fill_buf()
    }

    fn consume(&mut self, amount: usize) {
        self.0.consume(amount);
    }
}

/// Typed materialisation available on every [`FileRef`].
pub trait FileRefExt: FileRef {
    /// Whether this reference can produce `tag` streams.
    fn supports(&self, tag: StreamTag) -> bool {
        self.supported_streams().contains(&tag)
    }

    /// Open a new stream of type `S`.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::UnsupportedCapability`] without touching the
    /// underlying resource when `S` is not supported, or the error raised by
    /// the implementation when opening fails.
    fn open<S: StreamType>(&self) -> StageResult<S> {
        if !self.supports(S::TAG) {
            return Err(StageError::UnsupportedCapability {
                requested: S::TAG,
                location: self.describe(),
            });
        }
        S::from_opened(self.open_tagged(S::TAG)?).ok_or_else(|| {
            StageError::UnsupportedCapability {
                requested: S::TAG,
                location: self.describe(),
            }
        })
    }
}

impl<T: FileRef + ?Sized> FileRefExt for T {}

/// Reference to a file on the local filesystem, addressed as directory + filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileRef {
    directory: PathBuf,
    filename: String,
    buffer_size: usize,
}

impl LocalFileRef {
    const STREAMS: &'static [StreamTag] = &[StreamTag::Read, StreamTag::BufRead];

    /// Reference `filename` inside `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Reference an existing path, splitting it into directory and filename.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::InvalidField`] when the path has no final component.
    pub fn from_path(path: &Path) -> StageResult<Self> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StageError::invalid(
                    "path",
                    "no_filename",
                    Some(path.to_string_lossy().into_owned()),
                )
            })?;
        let directory = path
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);
        Ok(Self::new(directory, filename))
    }

    /// Override the buffer size used for buffered streams.
    #[must_use]
    pub const fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = if buffer_size == 0 { 1 } else { buffer_size };
        self
    }

    /// Directory holding the file.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Name of the file inside [`LocalFileRef::directory`].
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Buffer size used for buffered streams and transform chunks.
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Full path of the referenced file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }
}

impl FileRef for LocalFileRef {
    fn supported_streams(&self) -> &'static [StreamTag] {
        Self::STREAMS
    }

    fn describe(&self) -> String {
        self.path().display().to_string()
    }

    fn open_tagged(&self, tag: StreamTag) -> StageResult<OpenedStream> {
        let path = self.path();
        let file = File::open(&path).map_err(|source| StageError::io("file_ref.open", &path, source))?;
        Ok(match tag {
            StreamTag::Read => OpenedStream::Read(Box::new(file)),
            StreamTag::BufRead => {
                OpenedStream::BufRead(Box::new(BufReader::with_capacity(self.buffer_size, file)))
            }
        })
    }

    fn local_path(&self) -> Option<PathBuf> {
        Some(self.path())
    }
}

/// Reference to content already held in memory by the producer.
#[derive(Clone)]
pub struct BytesFileRef {
    label: String,
    bytes: Arc<[u8]>,
}

impl BytesFileRef {
    const STREAMS: &'static [StreamTag] = &[StreamTag::Read];

    /// Wrap `bytes`, identified by `label` in logs.
    #[must_use]
    pub fn new(label: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            label: label.into(),
            bytes: bytes.into(),
        }
    }

    /// Length of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for BytesFileRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BytesFileRef")
            .field("label", &self.label)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl FileRef for BytesFileRef {
    fn supported_streams(&self) -> &'static [StreamTag] {
        Self::STREAMS
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.label)
    }

    fn open_tagged(&self, _tag: StreamTag) -> StageResult<OpenedStream> {
        Ok(OpenedStream::Read(Box::new(Cursor::new(Arc::clone(
            &self.bytes,
        )))))
    }
}
