//! WOFF 1.0 decoding
//!
//! <https://www.w3.org/TR/WOFF/>

use bytes::{Buf, BufMut};
use flate2::{Decompress, FlushDecompress, Status};
use font_types::Tag;

use crate::assemble::write_table_directory_header;
use crate::entropy::check_declared_size;
use crate::error::{ErrorKind, Result, ResultExt, bail, bail_if, bail_with_msg_if};
use crate::header::{WoffHeader, WoffVersion};
use crate::options::DecodeOptions;
use crate::reader::BufReadExt;
use crate::tags::HEAD;
use crate::{Round4, compute_checksum};

/// <https://www.w3.org/TR/WOFF/#TableDirectory>
#[derive(Debug, Clone)]
struct Woff1TableDirectoryEntry {
    tag: Tag,
    /// Offset to the data, from beginning of WOFF file
    offset: u32,
    /// Length of the compressed data, excluding padding
    comp_length: u32,
    /// Length of the uncompressed table, excluding padding
    orig_length: u32,
    /// Checksum of the uncompressed table
    orig_checksum: u32,
}

impl Woff1TableDirectoryEntry {
    fn parse(input: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            tag: input.try_get_tag()?,
            offset: input.try_get_u32()?,
            comp_length: input.try_get_u32()?,
            orig_length: input.try_get_u32()?,
            orig_checksum: input.try_get_u32()?,
        })
    }

    fn data<'a>(&self, raw_woff_data: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.offset as usize;
        let end = start + self.comp_length as usize;
        match raw_woff_data.get(start..end) {
            Some(data) => Ok(data),
            None => bail!(ErrorKind::Woff1DecodingFailed),
        }
    }

    fn is_compressed(&self) -> bool {
        self.comp_length < self.orig_length
    }
}

fn decompress_z(compressed_data: &[u8], orig_length: usize) -> Result<Vec<u8>> {
    let mut output: Vec<u8> = Vec::with_capacity(orig_length);
    let mut decompressor = Decompress::new(true);
    let status = match decompressor.decompress_vec(compressed_data, &mut output, FlushDecompress::Finish) {
        Ok(status) => status,
        Err(err) => {
            log::debug!("zlib error: {err}");
            bail!(ErrorKind::Woff1DecodingFailed);
        }
    };
    // The output buffer holds exactly orig_length bytes, so a longer stream never ends
    bail_with_msg_if!(
        status != Status::StreamEnd || output.len() != orig_length,
        ErrorKind::Woff1DecodingFailed,
        "table decompressed to {} bytes, expected {orig_length}",
        output.len()
    );
    Ok(output)
}

/// Decode a WOFF 1.0 file into the sfnt font it holds
pub fn decode_woff1(raw_woff_data: &[u8]) -> Result<Vec<u8>> {
    decode_woff1_with_options(raw_woff_data, &DecodeOptions::default())
}

/// Decode a WOFF 1.0 file with custom limits.
///
/// Table data is always written in the order it appears in the WOFF file, so
/// `options.table_order` has no effect here.
pub fn decode_woff1_with_options(raw_woff_data: &[u8], options: &DecodeOptions) -> Result<Vec<u8>> {
    let limits = &options.limits;
    let mut input = raw_woff_data;

    // Parse header and table directory
    let header = WoffHeader::parse(&mut input, limits)?;
    bail_with_msg_if!(
        header.woff_version != WoffVersion::Woff1,
        ErrorKind::InvalidSignature,
        "not a WOFF 1.0 file"
    );

    let mut tables: Vec<Woff1TableDirectoryEntry> = Vec::with_capacity(header.num_tables as usize);
    for _ in 0..header.num_tables {
        let table = Woff1TableDirectoryEntry::parse(&mut input).or_kind(ErrorKind::Woff1DecodingFailed)?;
        bail_with_msg_if!(
            table.comp_length > table.orig_length,
            ErrorKind::Woff1DecodingFailed,
            "{} is larger compressed than uncompressed",
            table.tag
        );
        tables.push(table);
    }

    // Bound the output before allocating for it or inflating any table
    let total_size: u64 = tables
        .iter()
        .map(|table| Round4!(table.orig_length as u64))
        .sum::<u64>()
        + 12
        + 16 * tables.len() as u64;
    let total_size = usize::try_from(total_size).unwrap_or(usize::MAX);
    check_declared_size(total_size, raw_woff_data.len(), limits)?;

    // Table directory entries are stored in tag order
    tables.sort_by_key(|table| table.tag);
    bail_if!(
        tables.windows(2).any(|pair| pair[0].tag == pair[1].tag),
        ErrorKind::Woff1DecodingFailed
    );

    // Create output buffer
    let mut out: Vec<u8> = Vec::with_capacity(total_size);
    write_table_directory_header(&mut out, header.flavor, tables.len() as u16);

    // Reserve space for the rest of the table directory
    let table_directory_start = out.len();
    out.resize(table_directory_start + tables.len() * 16, 0);

    // Tables themselves are written in the order they appear in the WOFF file
    let mut by_offset: Vec<usize> = (0..tables.len()).collect();
    by_offset.sort_by_key(|&tag_index| tables[tag_index].offset);

    let mut font_checksum: u32 = 0;
    let mut head_offset = None;
    for tag_index in by_offset {
        let table = &tables[tag_index];
        let table_offset = out.len();

        // Write table data
        let data = table.data(raw_woff_data)?;
        if table.is_compressed() {
            out.extend_from_slice(&decompress_z(data, table.orig_length as usize)?);
        } else {
            out.extend_from_slice(data);
        }

        // The 'head' checksum is computed with checkSumAdjustment set to 0
        if table.tag == HEAD {
            bail_if!(table.orig_length < 12, ErrorKind::Woff1DecodingFailed);
            out[table_offset + 8..table_offset + 12].fill(0);
            head_offset = Some(table_offset);
        }
        let checksum = compute_checksum(&out[table_offset..]);
        if checksum != table.orig_checksum {
            log::warn!(
                "{} checksum mismatch: stored {:#010x}, computed {checksum:#010x}",
                table.tag,
                table.orig_checksum
            );
        }
        font_checksum = font_checksum.wrapping_add(checksum);

        // Write table directory entry for table
        let dir_entry_start = table_directory_start + (tag_index * 16);
        let mut dir_entry_writer = &mut out[dir_entry_start..dir_entry_start + 16];
        dir_entry_writer.put_slice(&table.tag.to_be_bytes());
        dir_entry_writer.put_u32(checksum);
        dir_entry_writer.put_u32(table_offset as u32);
        dir_entry_writer.put_u32(table.orig_length);

        // Pad output to 4 bytes
        out.resize(Round4!(out.len()), 0);
    }

    // Update 'head' checkSumAdjustment
    font_checksum = font_checksum.wrapping_add(compute_checksum(&out[..table_directory_start + tables.len() * 16]));
    if let Some(head_offset) = head_offset {
        let adjustment = 0xB1B0AFBA_u32.wrapping_sub(font_checksum);
        out[head_offset + 8..head_offset + 12].copy_from_slice(&adjustment.to_be_bytes());
    }

    Ok(out)
}
