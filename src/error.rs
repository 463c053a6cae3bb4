//! Error type shared by every stage of the decoder
//!
//! Every failure is fatal to the current decode call. Callers match on
//! [`ErrorKind`] (or its stable [`ErrorKind::code`]) rather than on messages;
//! the human readable detail of a failure is emitted through `log` at the
//! point where it is detected.

use std::fmt;

/// The category of a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The input does not start with the `wOF2` (or `wOFF`) signature.
    InvalidSignature,
    /// A header field is inconsistent with the input (length, reserved, blocks).
    InvalidHeader,
    /// A read ran past the end of its buffer.
    BufferReadFailed,
    /// The WOFF2 table directory is truncated or inconsistent.
    ReadTableDirectoryFailed,
    /// The WOFF2 collection directory is truncated or inconsistent.
    ReadCollectionDirectoryFailed,
    /// A UIntBase128 or 255UInt16 value is malformed or overflows.
    VarintOverflow,
    /// The compressed stream could not be decoded to its declared size.
    BrotliDecodingFailed,
    /// The decompressed stream does not exactly hold the declared tables.
    IntegrityCheckFailed,
    /// A glyph of the transformed `glyf` table could not be rebuilt.
    ReconstructGlyphFailed,
    /// The point data of a simple glyph is truncated or overflows.
    ReconstructPointFailed,
    /// The reconstructed `glyf` table cannot be addressed by `loca`.
    LocaSizeOverflow,
    /// The transformed `hmtx` table could not be rebuilt.
    ReconstructHmtxTableFailed,
    /// The output table directory cannot be assembled.
    ReconstructTableDirectoryFailed,
    /// The output font could not be written consistently.
    WriteFailed,
    /// A size or count declared by the input exceeds the configured limits.
    LimitExceeded,
    /// A WOFF 1.0 file could not be decoded.
    Woff1DecodingFailed,
    /// The input is not a font format this crate understands.
    UnsupportedFormat,
}

impl ErrorKind {
    /// Stable, machine checkable reason code.
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidHeader => "INVALID_HEADER",
            Self::BufferReadFailed => "BUFFER_READ_FAILED",
            Self::ReadTableDirectoryFailed => "READ_TABLE_DIRECTORY_FAILED",
            Self::ReadCollectionDirectoryFailed => "READ_COLLECTION_DIRECTORY_FAILED",
            Self::VarintOverflow => "VARINT_OVERFLOW",
            Self::BrotliDecodingFailed => "BROTLI_DECODING_FAILED",
            Self::IntegrityCheckFailed => "INTEGRITY_CHECK_FAILED",
            Self::ReconstructGlyphFailed => "RECONSTRUCT_GLYPH_FAILED",
            Self::ReconstructPointFailed => "RECONSTRUCT_POINT_FAILED",
            Self::LocaSizeOverflow => "LOCA_SIZE_OVERFLOW",
            Self::ReconstructHmtxTableFailed => "RECONSTRUCT_HMTX_TABLE_FAILED",
            Self::ReconstructTableDirectoryFailed => "RECONSTRUCT_TABLE_DIRECTORY_FAILED",
            Self::WriteFailed => "WRITE_FAILED",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
            Self::Woff1DecodingFailed => "WOFF1_DECODING_FAILED",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::InvalidSignature => "incorrect signature",
            Self::InvalidHeader => "invalid header",
            Self::BufferReadFailed => "reading beyond the end of a buffer",
            Self::ReadTableDirectoryFailed => "reading table directory failed",
            Self::ReadCollectionDirectoryFailed => "reading collection directory failed",
            Self::VarintOverflow => "variable length integer overflow",
            Self::BrotliDecodingFailed => "brotli decoding failed",
            Self::IntegrityCheckFailed => "decompressed data does not match the table directory",
            Self::ReconstructGlyphFailed => "reconstructing glyph failed",
            Self::ReconstructPointFailed => "reconstructing glyph points failed",
            Self::LocaSizeOverflow => "loca table size overflow",
            Self::ReconstructHmtxTableFailed => "reconstructing hmtx table failed",
            Self::ReconstructTableDirectoryFailed => "reconstructing table directory failed",
            Self::WriteFailed => "writing font failed",
            Self::LimitExceeded => "declared size exceeds configured limit",
            Self::Woff1DecodingFailed => "woff decoding failed",
            Self::UnsupportedFormat => "unsupported font format",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A failed decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind} ({code})", code = .kind.code())]
pub struct DecodeError {
    kind: ErrorKind,
}

impl DecodeError {
    pub const fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl From<ErrorKind> for DecodeError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<bytes::TryGetError> for DecodeError {
    fn from(_value: bytes::TryGetError) -> Self {
        Self::new(ErrorKind::BufferReadFailed)
    }
}

pub type Result<T, E = DecodeError> = std::result::Result<T, E>;

/// Attribute low level read failures to the stage that hit them.
pub(crate) trait ResultExt<T> {
    /// Replace a [`ErrorKind::BufferReadFailed`] with `kind`. Other kinds
    /// already name their cause and are kept.
    fn or_kind(self, kind: ErrorKind) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn or_kind(self, kind: ErrorKind) -> Result<T> {
        self.map_err(|err| match err.kind {
            ErrorKind::BufferReadFailed => DecodeError::new(kind),
            _ => err,
        })
    }
}

pub(crate) fn usize_will_overflow(a: usize, b: usize) -> bool {
    a.checked_add(b).is_none()
}

pub(crate) fn u32_will_overflow(a: u32, b: u32) -> bool {
    a.checked_add(b).is_none()
}

#[cfg(not(feature = "debug"))]
mod regular {
    macro_rules! bail {
        ($kind: expr) => {
            return Err($crate::error::DecodeError::new($kind))
        };
    }
    pub(crate) use bail;

    macro_rules! bail_if {
        ($cond: expr, $kind: expr) => {
            if $cond {
                return Err($crate::error::DecodeError::new($kind));
            }
        };
    }
    pub(crate) use bail_if;

    macro_rules! bail_with_msg_if {
        ($cond: expr, $kind: expr, $($msg:tt)*) => {
            if $cond {
                log::debug!($($msg)*);
                return Err($crate::error::DecodeError::new($kind));
            }
        };
    }
    pub(crate) use bail_with_msg_if;
}
#[cfg(not(feature = "debug"))]
pub(crate) use regular::*;

#[cfg(feature = "debug")]
mod debug {
    macro_rules! bail {
        ($kind: expr) => {
            panic!("{}", $kind)
        };
    }
    pub(crate) use bail;

    macro_rules! bail_if {
        ($cond: expr, $kind: expr) => {
            if $cond {
                panic!("{}: {}", $kind, stringify!($cond))
            }
        };
    }
    pub(crate) use bail_if;

    macro_rules! bail_with_msg_if {
        ($cond: expr, $kind: expr, $($msg:tt)*) => {
            if $cond {
                panic!($($msg)*);
            }
        };
    }
    pub(crate) use bail_with_msg_if;
}
#[cfg(feature = "debug")]
pub(crate) use debug::*;
