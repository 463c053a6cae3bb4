//! Writing reconstructed tables out as an sfnt font or font collection
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/otff>

use bytes::BufMut;
use font_types::Tag;

use crate::directory::{CollectionDirectory, FontEntry, TTC_VERSION_2};
use crate::error::{ErrorKind, Result, bail, bail_if, bail_with_msg_if, usize_will_overflow};
use crate::options::TableOrder;
use crate::tags::{CFF_FLAVOR, DSIG, RECOMMENDED_CFF_ORDER, RECOMMENDED_TRUETYPE_ORDER, TTC_FLAVOR};
use crate::{Round4, compute_checksum};

/// Offset of checkSumAdjustment in the 'head' table
const HEAD_CHECKSUM_ADJUSTMENT_OFFSET: usize = 8;
/// Offset of indexToLocFormat in the 'head' table
const HEAD_INDEX_TO_LOC_FORMAT_OFFSET: usize = 50;
const HEAD_MIN_LENGTH: usize = 54;

/// <https://learn.microsoft.com/en-us/typography/opentype/spec/otff#calculating-checksums>
const CHECKSUM_MAGIC: u32 = 0xB1B0AFBA;

/// A reconstructed table waiting to be written
#[derive(Debug, Clone)]
pub(crate) struct OutputTable {
    pub tag: Tag,
    pub data: Vec<u8>,
}

/// Reconstructed tables indexed by their position in the WOFF2 table
/// directory. Tables shared between the fonts of a collection appear once.
pub(crate) type TablePool = Vec<Option<OutputTable>>;

/// Set `head.indexToLocFormat` to the loca format that was actually written.
pub(crate) fn set_index_to_loc_format(head: &mut OutputTable, index_format: u16) -> Result<()> {
    bail_with_msg_if!(
        head.data.len() < HEAD_MIN_LENGTH,
        ErrorKind::ReconstructTableDirectoryFailed,
        "head table is only {} bytes",
        head.data.len()
    );
    let field = &mut head.data[HEAD_INDEX_TO_LOC_FORMAT_OFFSET..HEAD_INDEX_TO_LOC_FORMAT_OFFSET + 2];
    field.copy_from_slice(&index_format.to_be_bytes());
    Ok(())
}

/// Where each table of one font goes
struct FontLayout {
    /// Table directory records, sorted by tag
    directory: Vec<usize>,
    /// Order in which the table data is written
    data_order: Vec<usize>,
}

impl FontLayout {
    fn new(font: &FontEntry, pool: &TablePool, table_order: TableOrder) -> Result<Self> {
        let mut directory: Vec<usize> = Vec::with_capacity(font.num_tables());
        for &table_idx in &font.table_indices {
            let table_idx = table_idx as usize;
            bail_if!(pool[table_idx].is_none(), ErrorKind::WriteFailed);
            directory.push(table_idx);
        }
        let tag = |table_idx: usize| pool[table_idx].as_ref().map(|table| table.tag);

        // The table directory is binary searched, so tags must be unique and sorted
        directory.sort_by_key(|&table_idx| tag(table_idx));
        if let Some(pair) = directory.windows(2).find(|pair| tag(pair[0]) == tag(pair[1])) {
            log::debug!("font has two {:?} tables", tag(pair[0]));
            bail!(ErrorKind::ReconstructTableDirectoryFailed);
        }

        let mut data_order = directory.clone();
        match table_order {
            TableOrder::TagOrder => {
                // loca is written straight after glyf
                if let (Some(glyf_idx), Some(loca_idx)) = (font.glyf_idx, font.loca_idx) {
                    let (glyf_idx, loca_idx) = (glyf_idx as usize, loca_idx as usize);
                    data_order.retain(|&table_idx| table_idx != loca_idx);
                    let glyf_pos = data_order
                        .iter()
                        .position(|&table_idx| table_idx == glyf_idx)
                        .map_or(data_order.len(), |pos| pos + 1);
                    data_order.insert(glyf_pos, loca_idx);
                }
            }
            TableOrder::Recommended => {
                let recommended: &[Tag] = if font.flavor == CFF_FLAVOR {
                    &RECOMMENDED_CFF_ORDER
                } else {
                    &RECOMMENDED_TRUETYPE_ORDER
                };
                // Stable sort: unlisted tables keep their tag order
                data_order.sort_by_key(|&table_idx| match tag(table_idx) {
                    Some(DSIG) => (2, 0),
                    Some(tag) => match recommended.iter().position(|&known| known == tag) {
                        Some(rank) => (0, rank),
                        None => (1, 0),
                    },
                    None => (1, 0),
                });
            }
        }

        Ok(Self {
            directory,
            data_order,
        })
    }
}

/// Write the fonts described by `collection` using the tables in `pool`.
///
/// For a collection, tables referenced by several fonts are written once and
/// every font's table directory points at the same bytes.
pub(crate) fn assemble_font(
    collection: &CollectionDirectory,
    mut pool: TablePool,
    table_order: TableOrder,
) -> Result<Vec<u8>> {
    // The 'head' checksum is computed with checkSumAdjustment set to 0
    for font in &collection.fonts {
        if let Some(head_idx) = font.head_idx {
            let Some(head) = pool[head_idx as usize].as_mut() else {
                bail!(ErrorKind::WriteFailed);
            };
            bail_with_msg_if!(
                head.data.len() < HEAD_MIN_LENGTH,
                ErrorKind::ReconstructTableDirectoryFailed,
                "head table is only {} bytes",
                head.data.len()
            );
            head.data[HEAD_CHECKSUM_ADJUSTMENT_OFFSET..HEAD_CHECKSUM_ADJUSTMENT_OFFSET + 4].fill(0);
        }
    }

    let layouts = collection
        .fonts
        .iter()
        .map(|font| FontLayout::new(font, &pool, table_order))
        .collect::<Result<Vec<_>>>()?;

    let checksums: Vec<u32> = pool
        .iter()
        .map(|table| table.as_ref().map_or(0, |table| compute_checksum(&table.data)))
        .collect();

    // First table goes after all the headers and table directories
    let headers_size = collection.headers_size();
    let mut offsets: Vec<Option<u32>> = vec![None; pool.len()];
    let mut end = headers_size;
    for layout in &layouts {
        for &table_idx in &layout.data_order {
            if offsets[table_idx].is_some() {
                continue;
            }
            let length = table_length(&pool, table_idx)?;
            offsets[table_idx] = Some(to_u32(end)?);
            bail_if!(usize_will_overflow(end, length as usize + 3), ErrorKind::WriteFailed);
            end = Round4!(end + length as usize);
        }
    }
    to_u32(end)?;

    let mut out: Vec<u8> = Vec::with_capacity(end);

    if collection.is_collection() {
        write_collection_header(&mut out, collection);
    }

    let mut font_checksums: Vec<u32> = Vec::with_capacity(layouts.len());
    for (font, layout) in collection.fonts.iter().zip(&layouts) {
        let start = out.len();
        write_table_directory_header(&mut out, font.flavor, font.num_tables() as u16);
        for &table_idx in &layout.directory {
            let (Some(table), Some(offset)) = (pool[table_idx].as_ref(), offsets[table_idx]) else {
                bail!(ErrorKind::WriteFailed);
            };
            out.put_slice(&table.tag.to_be_bytes());
            out.put_u32(checksums[table_idx]);
            out.put_u32(offset);
            out.put_u32(table.data.len() as u32);
        }

        let font_checksum = layout
            .directory
            .iter()
            .fold(compute_checksum(&out[start..]), |sum, &table_idx| {
                sum.wrapping_add(checksums[table_idx])
            });
        font_checksums.push(font_checksum);
    }
    bail_if!(out.len() != headers_size, ErrorKind::ReconstructTableDirectoryFailed);

    let mut written = vec![false; pool.len()];
    for layout in &layouts {
        for &table_idx in &layout.data_order {
            if written[table_idx] {
                continue;
            }
            written[table_idx] = true;
            bail_if!(
                offsets[table_idx] != Some(out.len() as u32),
                ErrorKind::WriteFailed
            );
            // The pool entry is no longer needed once written
            let Some(table) = pool[table_idx].take() else {
                bail!(ErrorKind::WriteFailed);
            };
            log::trace!("{} at offset {} ({} bytes)", table.tag, out.len(), table.data.len());
            out.put_slice(&table.data);
            out.resize(Round4!(out.len()), 0);
        }
    }

    // Update 'head' checkSumAdjustment. We already set it to 0 and summed the font.
    //
    // A 'head' shared by several fonts of a collection can only hold one
    // adjustment; the last font's value is kept.
    for (font, font_checksum) in collection.fonts.iter().zip(font_checksums) {
        if let Some(head_idx) = font.head_idx {
            let Some(head_offset) = offsets[head_idx as usize] else {
                bail!(ErrorKind::WriteFailed);
            };
            let field = head_offset as usize + HEAD_CHECKSUM_ADJUSTMENT_OFFSET;
            let adjustment = CHECKSUM_MAGIC.wrapping_sub(font_checksum);
            out[field..field + 4].copy_from_slice(&adjustment.to_be_bytes());
        }
    }

    Ok(out)
}

fn table_length(pool: &TablePool, table_idx: usize) -> Result<u32> {
    match pool[table_idx].as_ref() {
        Some(table) => to_u32(table.data.len()),
        None => bail!(ErrorKind::WriteFailed),
    }
}

fn to_u32(value: usize) -> Result<u32> {
    match u32::try_from(value) {
        Ok(value) => Ok(value),
        Err(_) => bail!(ErrorKind::WriteFailed),
    }
}

/// <https://learn.microsoft.com/en-us/typography/opentype/spec/otff#ttc-header>
fn write_collection_header(output: &mut impl BufMut, collection: &CollectionDirectory) {
    output.put_slice(&TTC_FLAVOR.to_be_bytes()); // TAG TTCTag
    output.put_u32(collection.version); // FIXED Version
    output.put_u32(collection.fonts.len() as u32); // ULONG numFonts

    // Write tableDirectoryOffsets
    let mut table_directory_offset = collection.collection_header_size();
    for font in &collection.fonts {
        output.put_u32(table_directory_offset as u32);
        table_directory_offset += font.table_directory_size();
    }

    // space for DSIG fields for header v2
    if collection.version == TTC_VERSION_2 {
        output.put_u32(0); // ULONG ulDsigTag
        output.put_u32(0); // ULONG ulDsigLength
        output.put_u32(0); // ULONG ulDsigOffset
    }
}

/// Writes an OpenType table directory header
///
/// <https://learn.microsoft.com/en-us/typography/opentype/spec/otff#table-directory>
pub(crate) fn write_table_directory_header(output: &mut impl BufMut, flavor: Tag, num_tables: u16) {
    let mut max_pow2: u32 = 0;
    while 1u32 << (max_pow2 + 1) <= (num_tables as u32) {
        max_pow2 += 1;
    }
    let entry_selector = max_pow2 as u16;
    let search_range: u32 = (1u32 << max_pow2) << 4;
    let range_shift = ((num_tables as u32) << 4).saturating_sub(search_range);

    output.put_slice(&flavor.to_be_bytes()); // sfnt version
    output.put_u16(num_tables); // num_tables
    output.put_u16(search_range as u16); // searchRange
    output.put_u16(entry_selector); // entrySelector
    output.put_u16(range_shift as u16); // rangeShift
}
