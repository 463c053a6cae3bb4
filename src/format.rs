//! Font format identification

use font_types::Tag;

#[cfg(feature = "brotli")]
use crate::error::{ErrorKind, Result, bail};
use crate::tags::{CFF_FLAVOR, TRUE_FLAVOR, TRUETYPE_FLAVOR, TTC_FLAVOR, WOFF1_SIGNATURE, WOFF2_SIGNATURE};

/// The container format of a font file, as told by its first four bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontFormat {
    Woff2,
    Woff1,
    /// sfnt with TrueType outlines (`0x00010000` or `true`)
    TrueType,
    /// sfnt with CFF outlines (`OTTO`)
    OpenTypeCff,
    /// TrueType/OpenType collection (`ttcf`)
    Collection,
    Unknown,
}

impl FontFormat {
    pub fn detect(data: &[u8]) -> Self {
        let Some(signature) = data.first_chunk::<4>() else {
            return Self::Unknown;
        };
        match Tag::new(signature) {
            WOFF2_SIGNATURE => Self::Woff2,
            WOFF1_SIGNATURE => Self::Woff1,
            TRUETYPE_FLAVOR | TRUE_FLAVOR => Self::TrueType,
            CFF_FLAVOR => Self::OpenTypeCff,
            TTC_FLAVOR => Self::Collection,
            _ => Self::Unknown,
        }
    }

    /// Whether the data is already a plain sfnt font or collection
    pub fn is_sfnt(self) -> bool {
        matches!(self, Self::TrueType | Self::OpenTypeCff | Self::Collection)
    }
}

/// Decode a WOFF2 or WOFF file, picking the decoder from the file signature.
///
/// Data that already is an sfnt font or collection is returned unchanged.
#[cfg(feature = "brotli")]
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let format = FontFormat::detect(data);
    log::debug!("detected {format:?}");
    match format {
        FontFormat::Woff2 => crate::decode::decode_woff2(data),
        #[cfg(feature = "z")]
        FontFormat::Woff1 => crate::woff1::decode_woff1(data),
        format if format.is_sfnt() => Ok(data.to_vec()),
        _ => bail!(ErrorKind::UnsupportedFormat),
    }
}
