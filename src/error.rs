//! Error types for package reading and text ingestion.

use core::fmt;
use std::io;

/// Category of a ZIP-level failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZipErrorKind {
    /// Underlying storage read or seek failed.
    Io,
    /// No end-of-central-directory record found.
    MissingEocd,
    /// A record signature did not match.
    BadSignature,
    /// The requested entry is not in the central directory.
    EntryNotFound,
    /// Compression method other than stored or deflate.
    UnsupportedMethod,
    /// Inflate reported corrupt data.
    Decompress,
    /// CRC-32 of the decompressed data did not match the directory.
    CrcMismatch,
    /// A configured limit was exceeded.
    LimitExceeded,
}

impl fmt::Display for ZipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Io => "io",
            Self::MissingEocd => "missing_eocd",
            Self::BadSignature => "bad_signature",
            Self::EntryNotFound => "entry_not_found",
            Self::UnsupportedMethod => "unsupported_method",
            Self::Decompress => "decompress",
            Self::CrcMismatch => "crc_mismatch",
            Self::LimitExceeded => "limit_exceeded",
        };
        f.write_str(name)
    }
}

/// ZIP archive error with an optional entry path for context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZipError {
    kind: ZipErrorKind,
    message: String,
    entry: Option<String>,
}

impl ZipError {
    /// Create an error of the given kind.
    pub fn new(kind: ZipErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            entry: None,
        }
    }

    /// Attach the archive entry path the error refers to.
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Error category.
    pub fn kind(&self) -> ZipErrorKind {
        self.kind
    }

    /// Entry path, when known.
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }
}

impl fmt::Display for ZipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zip:{}: {}", self.kind, self.message)?;
        if let Some(entry) = self.entry.as_deref() {
            write!(f, " [entry={}]", entry)?;
        }
        Ok(())
    }
}

impl std::error::Error for ZipError {}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        Self::new(ZipErrorKind::Io, err.to_string())
    }
}

/// Errors raised while opening a package or converting its content.
#[derive(Debug)]
pub enum EpubError {
    /// Storage failure.
    Io(io::Error),
    /// Archive failure.
    Zip(ZipError),
    /// `META-INF/container.xml` is missing or names no rootfile.
    MissingRootfile(String),
    /// Package document could not be parsed or has an empty spine.
    Opf(String),
    /// TOC document could not be parsed.
    Navigation(String),
    /// An href did not resolve to a manifest item or archive entry.
    UnknownHref(String),
    /// Spine or chapter index out of range.
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Number of valid indices.
        len: usize,
    },
    /// Operation on an object that failed to open or was closed.
    InvalidState(&'static str),
}

impl fmt::Display for EpubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {}", err),
            Self::Zip(err) => write!(f, "{}", err),
            Self::MissingRootfile(msg) => write!(f, "container: {}", msg),
            Self::Opf(msg) => write!(f, "opf: {}", msg),
            Self::Navigation(msg) => write!(f, "navigation: {}", msg),
            Self::UnknownHref(href) => write!(f, "unknown href: {}", href),
            Self::OutOfRange { index, len } => {
                write!(f, "index {} out of range (len {})", index, len)
            }
            Self::InvalidState(what) => write!(f, "invalid state: {}", what),
        }
    }
}

impl std::error::Error for EpubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Zip(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for EpubError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ZipError> for EpubError {
    fn from(err: ZipError) -> Self {
        Self::Zip(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_error_display_includes_entry() {
        let err = ZipError::new(ZipErrorKind::CrcMismatch, "checksum differs")
            .with_entry("OEBPS/ch1.xhtml");
        assert_eq!(
            err.to_string(),
            "zip:crc_mismatch: checksum differs [entry=OEBPS/ch1.xhtml]"
        );
        assert_eq!(err.kind(), ZipErrorKind::CrcMismatch);
    }

    #[test]
    fn epub_error_wraps_zip_source() {
        let err: EpubError = ZipError::new(ZipErrorKind::MissingEocd, "no eocd").into();
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("zip:missing_eocd"));
    }
}
