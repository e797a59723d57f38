//! Host filesystem attributes, resolved into a closed value model at read time.
//!
//! # Design
//! - Every attribute the platform reports is converted into [`AttributeValue`]
//!   here, so downstream projection is a plain exhaustive match.
//! - The POSIX view extends the basic view with ownership and permission bits.

use std::fmt::{self, Display, Formatter, Write as _};
use std::fs::{self, Metadata};
use std::path::Path;
use std::time::SystemTime;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::error::{StageError, StageResult};

/// Attribute names reported by the basic view.
pub mod names {
    /// File size in bytes.
    pub const SIZE: &str = "size";
    /// Last modification instant.
    pub const LAST_MODIFIED_TIME: &str = "lastModifiedTime";
    /// Last access instant.
    pub const LAST_ACCESS_TIME: &str = "lastAccessTime";
    /// Creation instant, when the platform records one.
    pub const CREATION_TIME: &str = "creationTime";
    /// Whether the path is a regular file.
    pub const IS_REGULAR_FILE: &str = "isRegularFile";
    /// Whether the path is a directory.
    pub const IS_DIRECTORY: &str = "isDirectory";
    /// Whether the path itself is a symbolic link.
    pub const IS_SYMBOLIC_LINK: &str = "isSymbolicLink";
    /// Whether the path is something other than a file, directory or link.
    pub const IS_OTHER: &str = "isOther";
    /// Platform identity of the file.
    pub const FILE_KEY: &str = "fileKey";
    /// Owning user name (POSIX view).
    pub const OWNER: &str = "owner";
    /// Owning group name (POSIX view).
    pub const GROUP: &str = "group";
    /// Permission bits (POSIX view).
    pub const PERMISSIONS: &str = "permissions";
}

/// Which attribute set to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeView {
    /// Attributes every platform can report.
    Basic,
    /// Basic attributes plus POSIX ownership and permissions.
    Posix,
}

impl AttributeView {
    /// The richest view supported by the current platform.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(unix) { Self::Posix } else { Self::Basic }
    }

    /// Stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Posix => "posix",
        }
    }
}

/// POSIX owner/group/other permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PosixPermissions(u32);

impl PosixPermissions {
    const MASK: u32 = 0o777;

    /// Keep the permission bits of a raw mode, dropping file type and special bits.
    #[must_use]
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & Self::MASK)
    }

    /// Permission bits as an octal mode.
    #[must_use]
    pub const fn mode(self) -> u32 {
        self.0
    }
}

impl Display for PosixPermissions {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        const FLAGS: [char; 3] = ['r', 'w', 'x'];
        for shift in (0..9).rev() {
            let flag = if self.0 & (1 << shift) == 0 {
                '-'
            } else {
                FLAGS[2 - shift % 3]
            };
            formatter.write_char(flag)?;
        }
        Ok(())
    }
}

/// Closed set of value shapes a platform attribute can take.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Attribute reported without a value.
    Null,
    /// Boolean.
    Boolean(bool),
    /// Single character.
    Char(char),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// 16-bit integer.
    Short(i16),
    /// 32-bit integer.
    Integer(i32),
    /// 64-bit integer.
    Long(i64),
    /// Single precision float.
    Float(f32),
    /// Double precision float.
    Double(f64),
    /// Arbitrary precision decimal.
    Decimal(Decimal),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Instant.
    Time(DateTime<Utc>),
    /// List-like collection.
    Sequence(Vec<AttributeValue>),
    /// Map whose entry order is meaningful.
    OrderedMap(Vec<(AttributeValue, AttributeValue)>),
    /// Map whose entry order is not meaningful.
    Map(Vec<(AttributeValue, AttributeValue)>),
    /// POSIX permission set.
    Permissions(PosixPermissions),
    /// Platform value with no structured form, kept as its display text.
    Opaque(String),
}

impl Display for AttributeValue {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => formatter.write_str("null"),
            Self::Boolean(value) => Display::fmt(value, formatter),
            Self::Char(value) => Display::fmt(value, formatter),
            Self::Byte(value) => Display::fmt(value, formatter),
            Self::Short(value) => Display::fmt(value, formatter),
            Self::Integer(value) => Display::fmt(value, formatter),
            Self::Long(value) => Display::fmt(value, formatter),
            Self::Float(value) => Display::fmt(value, formatter),
            Self::Double(value) => Display::fmt(value, formatter),
            Self::Decimal(value) => Display::fmt(value, formatter),
            Self::Text(value) | Self::Opaque(value) => formatter.write_str(value),
            Self::Bytes(value) => formatter.write_str(&BASE64.encode(value)),
            Self::Time(value) => {
                formatter.write_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::Sequence(items) => {
                formatter.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        formatter.write_str(", ")?;
                    }
                    Display::fmt(item, formatter)?;
                }
                formatter.write_str("]")
            }
            Self::OrderedMap(entries) | Self::Map(entries) => {
                formatter.write_str("{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        formatter.write_str(", ")?;
                    }
                    write!(formatter, "{key}={value}")?;
                }
                formatter.write_str("}")
            }
            Self::Permissions(value) => Display::fmt(value, formatter),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }
}

impl From<PosixPermissions> for AttributeValue {
    fn from(value: PosixPermissions) -> Self {
        Self::Permissions(value)
    }
}

/// Attributes keyed by name, in the order the view reports them.
pub type Attributes = IndexMap<String, AttributeValue>;

/// Read the attributes of `path` through `view`, following symbolic links.
///
/// A [`AttributeView::Posix`] request on a platform without POSIX metadata
/// yields the basic attributes only.
///
/// # Errors
///
/// Returns [`StageError::Io`] when the path cannot be inspected.
pub fn read_attributes(path: &Path, view: AttributeView) -> StageResult<Attributes> {
    let metadata =
        fs::metadata(path).map_err(|source| StageError::io("metadata.stat", path, source))?;
    let is_symlink = fs::symlink_metadata(path)
        .map_err(|source| StageError::io("metadata.lstat", path, source))?
        .file_type()
        .is_symlink();

    let mut attributes = Attributes::new();
    basic_attributes(&metadata, is_symlink, &mut attributes);
    if view == AttributeView::Posix {
        posix_attributes(&metadata, &mut attributes);
    }
    Ok(attributes)
}

fn basic_attributes(metadata: &Metadata, is_symlink: bool, out: &mut Attributes) {
    let file_type = metadata.file_type();
    out.insert(
        names::SIZE.to_string(),
        AttributeValue::Long(i64::try_from(metadata.len()).unwrap_or(i64::MAX)),
    );
    insert_time(out, names::LAST_MODIFIED_TIME, metadata.modified());
    insert_time(out, names::LAST_ACCESS_TIME, metadata.accessed());
    insert_time(out, names::CREATION_TIME, metadata.created());
    out.insert(
        names::IS_REGULAR_FILE.to_string(),
        file_type.is_file().into(),
    );
    out.insert(names::IS_DIRECTORY.to_string(), file_type.is_dir().into());
    out.insert(names::IS_SYMBOLIC_LINK.to_string(), is_symlink.into());
    out.insert(
        names::IS_OTHER.to_string(),
        (!file_type.is_file() && !file_type.is_dir() && !is_symlink).into(),
    );
    out.insert(names::FILE_KEY.to_string(), file_key(metadata));
}

fn insert_time(out: &mut Attributes, name: &str, time: std::io::Result<SystemTime>) {
    if let Ok(time) = time {
        out.insert(name.to_string(), AttributeValue::Time(time.into()));
    }
}

#[cfg(unix)]
fn file_key(metadata: &Metadata) -> AttributeValue {
    use std::os::unix::fs::MetadataExt;
    AttributeValue::Opaque(format!(
        "(dev={:x},ino={})",
        metadata.dev(),
        metadata.ino()
    ))
}

#[cfg(not(unix))]
const fn file_key(_metadata: &Metadata) -> AttributeValue {
    AttributeValue::Null
}

#[cfg(unix)]
fn posix_attributes(metadata: &Metadata, out: &mut Attributes) {
    use nix::unistd::{Gid, Group, Uid, User};
    use std::os::unix::fs::MetadataExt;

    let uid = metadata.uid();
    let owner = match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    };
    let gid = metadata.gid();
    let group = match Group::from_gid(Gid::from_raw(gid)) {
        Ok(Some(group)) => group.name,
        _ => gid.to_string(),
    };

    out.insert(names::OWNER.to_string(), AttributeValue::Text(owner));
    out.insert(names::GROUP.to_string(), AttributeValue::Text(group));
    out.insert(
        names::PERMISSIONS.to_string(),
        PosixPermissions::from_mode(metadata.mode()).into(),
    );
}

#[cfg(not(unix))]
fn posix_attributes(_metadata: &Metadata, _out: &mut Attributes) {
    tracing::debug!("posix attribute view unavailable; reporting basic attributes");
}
