//! The WOFF (1.0 and 2.0) file header

use bytes::Buf;
use font_types::Tag;

use crate::Round4;
use crate::error::{ErrorKind, Result, ResultExt, bail, bail_if, bail_with_msg_if};
use crate::options::Limits;
use crate::tags::{TTC_FLAVOR, WOFF1_SIGNATURE, WOFF2_SIGNATURE};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WoffVersion {
    Woff1 = 1,
    Woff2 = 2,
}

/// WOFF header that can represent either a WOFF1 or WOFF2 header
///
/// <https://www.w3.org/TR/WOFF2/#woff20Header>
#[derive(Debug, Clone)]
pub struct WoffHeader {
    // This isn't in the header, but we compute it from the "tag" and store it for convenience.
    pub woff_version: WoffVersion,
    /// The "sfnt version" of the input font.
    pub flavor: Tag,
    /// Total size of the WOFF file.
    pub length: u32,
    /// Number of entries in directory of font tables.
    pub num_tables: u16,
    /// Reserved; set to 0.
    pub reserved: u16,
    /// Total size needed for the uncompressed font data, including the sfnt header, directory, and font tables (including padding).
    pub total_sfnt_size: u32,
    /// (WOFF2 only) Total length of the compressed data block.
    pub total_compressed_size: u32,
    /// Major version of the WOFF file.
    pub major_version: u16,
    /// Minor version of the WOFF file.
    pub minor_version: u16,
    /// Offset to metadata block, from beginning of WOFF file.
    pub meta_offset: u32,
    /// Length of compressed metadata block.
    pub meta_length: u32,
    /// Uncompressed size of metadata block.
    pub meta_orig_length: u32,
    /// Offset to private data block, from beginning of WOFF file.
    pub priv_offset: u32,
    /// Length of private data block.
    pub priv_length: u32,
}

impl WoffHeader {
    pub fn parse(input: &mut impl Buf, limits: &Limits) -> Result<Self> {
        let input_len = input.remaining();

        // Read signature, validate it, and determine WOFF version
        let signature = match input.try_get_u32() {
            Ok(signature) => Tag::from_u32(signature),
            Err(_) => bail!(ErrorKind::InvalidSignature),
        };
        let woff_version = match signature {
            WOFF1_SIGNATURE => WoffVersion::Woff1,
            WOFF2_SIGNATURE => WoffVersion::Woff2,
            _ => bail!(ErrorKind::InvalidSignature),
        };

        let header = Self::parse_fields(input, woff_version)
            .or_kind(ErrorKind::InvalidHeader)?;

        // Validate
        bail_with_msg_if!(
            header.length as usize != input_len,
            ErrorKind::InvalidHeader,
            "declared length {} does not match input length {}",
            header.length,
            input_len
        );
        bail_if!(header.num_tables == 0, ErrorKind::InvalidHeader);
        bail_with_msg_if!(
            header.num_tables > limits.max_tables,
            ErrorKind::LimitExceeded,
            "{} tables exceeds the limit of {}",
            header.num_tables,
            limits.max_tables
        );
        bail_if!(header.reserved != 0, ErrorKind::InvalidHeader);
        if header.meta_offset != 0 {
            bail_if!(
                header.meta_offset >= header.length
                    || header.length - header.meta_offset < header.meta_length,
                ErrorKind::InvalidHeader
            );
        }
        if header.priv_offset != 0 {
            bail_if!(
                header.priv_offset >= header.length
                    || header.length - header.priv_offset < header.priv_length,
                ErrorKind::InvalidHeader
            );
        }

        Ok(header)
    }

    fn parse_fields(
        input: &mut impl Buf,
        woff_version: WoffVersion,
    ) -> Result<Self> {
        Ok(Self {
            woff_version,
            flavor: Tag::from_u32(input.try_get_u32()?),
            length: input.try_get_u32()?,
            num_tables: input.try_get_u16()?,
            reserved: input.try_get_u16()?,
            total_sfnt_size: input.try_get_u32()?,
            // totalCompressedSize field only exists in WOFF2 headers. We simply set it to zero for WOFF1.
            total_compressed_size: match woff_version {
                WoffVersion::Woff1 => 0,
                WoffVersion::Woff2 => input.try_get_u32()?,
            },
            major_version: input.try_get_u16()?,
            minor_version: input.try_get_u16()?,
            meta_offset: input.try_get_u32()?,
            meta_length: input.try_get_u32()?,
            meta_orig_length: input.try_get_u32()?,
            priv_offset: input.try_get_u32()?,
            priv_length: input.try_get_u32()?,
        })
    }

    pub fn is_collection(&self) -> bool {
        self.flavor == TTC_FLAVOR
    }

    /// Check that the compressed stream, the metadata block and the private
    /// data block follow each other in that order, each starting on a 4-byte
    /// boundary, and that nothing but padding follows the last one.
    pub fn validate_block_layout(&self, compressed_offset: usize) -> Result<()> {
        let file_length = self.length as u64;
        let mut offset: u64 = Round4!(compressed_offset as u64 + self.total_compressed_size as u64);
        bail_with_msg_if!(
            offset > Round4!(file_length),
            ErrorKind::InvalidHeader,
            "compressed stream ends at {offset}, past the end of the file ({file_length})"
        );

        if self.meta_offset != 0 {
            bail_with_msg_if!(
                offset != self.meta_offset as u64,
                ErrorKind::InvalidHeader,
                "metadata block at {} does not follow the compressed stream ({offset})",
                self.meta_offset
            );
            offset = Round4!(self.meta_offset as u64 + self.meta_length as u64);
        }

        if self.priv_offset != 0 {
            bail_with_msg_if!(
                offset != self.priv_offset as u64,
                ErrorKind::InvalidHeader,
                "private data block at {} is not the last block (expected {offset})",
                self.priv_offset
            );
            offset = Round4!(self.priv_offset as u64 + self.priv_length as u64);
        }

        bail_with_msg_if!(
            offset != Round4!(file_length),
            ErrorKind::InvalidHeader,
            "{} unexpected bytes at the end of the file",
            Round4!(file_length).abs_diff(offset)
        );
        Ok(())
    }
}
