//! Pure Rust WOFF2 decoder
//!
//! Turns a WOFF 2.0 file back into the TrueType/OpenType font (or font
//! collection) it was made from. WOFF 1.0 files are also supported behind the
//! `z` feature, and [`decode`] picks the right decoder from the file signature.
//!
//! ```no_run
//! let woff2 = std::fs::read("font.woff2").unwrap();
//! let ttf = unwoff2::decode_woff2(&woff2).unwrap();
//! ```

mod assemble;
mod decode;
mod directory;
mod entropy;
mod error;
mod format;
mod glyf;
mod header;
mod hmtx;
mod options;
mod reader;
mod tags;
#[cfg(feature = "z")]
mod woff1;

pub use decode::decode_woff2_with_decompressor;
#[cfg(feature = "brotli")]
pub use decode::{decode_woff2, decode_woff2_with_options};
#[cfg(feature = "brotli")]
pub use entropy::BrotliDecompressor;
pub use entropy::{BoxError, Decompressor};
pub use error::{DecodeError, ErrorKind};
pub use format::FontFormat;
#[cfg(feature = "brotli")]
pub use format::decode;
pub use options::{DecodeOptions, Limits, TableOrder};
#[cfg(feature = "z")]
pub use woff1::{decode_woff1, decode_woff1_with_options};

// Round a value up to the nearest multiple of 4. Don't round the value in the
// case that rounding up overflows.
//
// Implemented as a macro to make it generic over the type without horrible type bounds
macro_rules! Round4 {
    ($value:expr) => {
        match $value.checked_add(3) {
            Some(value_plus_3) => value_plus_3 & !3,
            None => $value,
        }
    };
}
pub(crate) use Round4;

/// Sum of the big-endian u32 words of `data`, as used by sfnt table checksums.
///
/// A trailing partial word is treated as if padded with zeros.
pub(crate) fn compute_checksum(data: &[u8]) -> u32 {
    let mut checksum: u32 = 0;
    let mut iter = data.chunks_exact(4);
    for chunk in &mut iter {
        checksum = checksum.wrapping_add(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    let remainder = iter.remainder();
    if !remainder.is_empty() {
        let mut last = [0u8; 4];
        last[..remainder.len()].copy_from_slice(remainder);
        checksum = checksum.wrapping_add(u32::from_be_bytes(last));
    }
    checksum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round4() {
        assert_eq!(Round4!(0usize), 0);
        assert_eq!(Round4!(1usize), 4);
        assert_eq!(Round4!(4u32), 4);
        assert_eq!(Round4!(5u64), 8);
        assert_eq!(Round4!(u32::MAX - 1), u32::MAX - 1);
    }

    #[test]
    fn checksum_pads_with_zeros() {
        assert_eq!(compute_checksum(&[]), 0);
        assert_eq!(compute_checksum(&[0, 0, 0, 1, 0, 0, 0, 2]), 3);
        assert_eq!(compute_checksum(&[0, 0, 0, 1, 0xAB]), 0xAB00_0001);
        assert_eq!(compute_checksum(&[0, 0, 0, 1, 0xAB, 0, 0, 0]), 0xAB00_0001);
    }

    #[test]
    fn checksum_wraps() {
        assert_eq!(compute_checksum(&[0xff, 0xff, 0xff, 0xff, 0, 0, 0, 2]), 1);
    }
}
