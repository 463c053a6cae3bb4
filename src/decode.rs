//! The WOFF2 decoding pipeline
//!
//! header → table directory → collection directory → decompression →
//! table reconstruction → sfnt assembly

use bytes::Buf;

use crate::assemble::{OutputTable, TablePool, assemble_font, set_index_to_loc_format};
use crate::directory::{CollectionDirectory, FontEntry, TableDirectory, Transform};
use crate::entropy::{Decompressor, check_declared_size, decompress_stream, partition};
use crate::error::{DecodeError, ErrorKind, Result, ResultExt, bail, bail_if, bail_with_msg_if};
use crate::glyf::reconstruct_glyf_and_loca;
use crate::header::{WoffHeader, WoffVersion};
use crate::hmtx::reconstruct_hmtx;
use crate::options::{DecodeOptions, Limits};
use crate::reader::{BufReadExt, try_take};

/// Offset of numberOfHMetrics in the 'hhea' table
const HHEA_NUM_HMETRICS_OFFSET: usize = 34;

/// Decode a WOFF2 file into the sfnt font (or font collection) it holds,
/// using the default options and the bundled brotli decoder.
#[cfg(feature = "brotli")]
pub fn decode_woff2(raw_woff_data: &[u8]) -> Result<Vec<u8>> {
    decode_woff2_with_options(raw_woff_data, &DecodeOptions::default())
}

#[cfg(feature = "brotli")]
pub fn decode_woff2_with_options(raw_woff_data: &[u8], options: &DecodeOptions) -> Result<Vec<u8>> {
    decode_woff2_with_decompressor(raw_woff_data, options, &mut crate::entropy::BrotliDecompressor)
}

/// Decode a WOFF2 file with a caller supplied brotli implementation
pub fn decode_woff2_with_decompressor(
    raw_woff_data: &[u8],
    options: &DecodeOptions,
    decompressor: &mut dyn Decompressor,
) -> Result<Vec<u8>> {
    // Here we create a new view over the `raw_woff_data`. Because we pass `&mut input` to parsing functons,
    // they will actually mutate the slice (not the data it points to) such that it only includes unparsed data.
    //
    // However `raw_woff_data` will still contain the full data for the WOFF.
    let mut input = raw_woff_data;
    let limits = &options.limits;

    // Parse header, table directory and collection directory
    let header = WoffHeader::parse(&mut input, limits)?;
    bail_with_msg_if!(
        header.woff_version != WoffVersion::Woff2,
        ErrorKind::InvalidSignature,
        "not a WOFF2 file"
    );

    log::trace!(
        "WOFF2 {}.{} ({}), totalSfntSize {}, metadata {} bytes ({} uncompressed)",
        header.major_version,
        header.minor_version,
        header.flavor,
        header.total_sfnt_size,
        header.meta_length,
        header.meta_orig_length
    );

    let tables = TableDirectory::parse(&mut input, header.num_tables as usize)?;
    let collection = if header.is_collection() {
        CollectionDirectory::parse(&mut input, &tables, limits)?
    } else {
        CollectionDirectory::generate_for_single_font(header.flavor, &tables)?
    };
    log::trace!(
        "{} tables, {} font(s), {} bytes of table data",
        tables.len(),
        collection.fonts.len(),
        tables.uncompressed_size
    );

    // Validate the file layout and the declared sizes before allocating anything for them
    let compressed_offset = raw_woff_data.len() - input.remaining();
    header.validate_block_layout(compressed_offset)?;
    check_declared_size(tables.uncompressed_size, raw_woff_data.len(), limits)?;

    // Decompress data with brotli decoder
    let compressed_data = try_take(&mut input, header.total_compressed_size as usize)
        .or_kind(ErrorKind::InvalidHeader)?;
    let decompressed_data = decompress_stream(compressed_data, tables.uncompressed_size, decompressor)?;
    let table_data = partition(&decompressed_data, &tables)?;

    let pool = reconstruct_tables(&tables, &table_data, &collection, limits)?;
    assemble_font(&collection, pool, options.table_order)
}

/// What hmtx reconstruction needs from a reconstructed glyf table
struct GlyfInfo {
    index_format: u16,
    x_mins: Vec<i16>,
}

/// Reconstruct every table referenced by some font. A table shared by several
/// fonts of a collection is reconstructed once.
fn reconstruct_tables(
    tables: &TableDirectory,
    table_data: &[&[u8]],
    collection: &CollectionDirectory,
    limits: &Limits,
) -> Result<TablePool> {
    let mut pool: TablePool = vec![None; tables.len()];
    // Indexed by the table index of 'glyf'
    let mut glyf_infos: Vec<Option<GlyfInfo>> = (0..tables.len()).map(|_| None).collect();

    for (font_idx, font) in collection.fonts.iter().enumerate() {
        log::trace!("reconstructing font {font_idx} ({})", font.flavor);
        reconstruct_font_tables(font, tables, table_data, &mut pool, &mut glyf_infos, limits)?;
    }
    Ok(pool)
}

fn reconstruct_font_tables(
    font: &FontEntry,
    tables: &TableDirectory,
    table_data: &[&[u8]],
    pool: &mut TablePool,
    glyf_infos: &mut [Option<GlyfInfo>],
    limits: &Limits,
) -> Result<()> {
    // Tables which are stored as is. Transformed tables are done below, once the
    // tables they depend on are available.
    for &table_idx in &font.table_indices {
        let table_idx = table_idx as usize;
        let table = &tables[table_idx];
        if pool[table_idx].is_some() {
            continue;
        }
        match table.transform() {
            Transform::None => {
                bail_if!(
                    table.orig_length != table.stored_length,
                    ErrorKind::ReconstructTableDirectoryFailed
                );
                log::trace!("{} copied ({} bytes)", table.tag, table.orig_length);
                pool[table_idx] = Some(OutputTable {
                    tag: table.tag,
                    data: table_data[table_idx].to_vec(),
                });
            }
            Transform::Glyf | Transform::Hmtx => {}
            Transform::Unknown(version) => {
                log::debug!("unknown transform {version} for {}", table.tag);
                bail!(ErrorKind::ReconstructTableDirectoryFailed);
            }
        }
    }

    // glyf and loca
    if let (Some(glyf_idx), Some(loca_idx)) = (font.glyf_idx, font.loca_idx) {
        let (glyf_idx, loca_idx) = (glyf_idx as usize, loca_idx as usize);
        if tables[glyf_idx].transform() == Transform::Glyf {
            if glyf_infos[glyf_idx].is_none() {
                glyf_infos[glyf_idx] = Some(reconstruct_glyf(
                    tables,
                    table_data,
                    glyf_idx,
                    loca_idx,
                    pool,
                    limits,
                )?);
            }
            if let (Some(head_idx), Some(info)) = (font.head_idx, &glyf_infos[glyf_idx]) {
                let Some(head) = pool[head_idx as usize].as_mut() else {
                    bail!(ErrorKind::ReconstructTableDirectoryFailed);
                };
                set_index_to_loc_format(head, info.index_format)?;
            }
        }
    }

    // hmtx, which depends on both hhea and glyf
    if let Some(hmtx_idx) = font.hmtx_idx {
        let hmtx_idx = hmtx_idx as usize;
        if tables[hmtx_idx].transform() == Transform::Hmtx && pool[hmtx_idx].is_none() {
            let x_mins = font
                .glyf_idx
                .and_then(|glyf_idx| glyf_infos[glyf_idx as usize].as_ref())
                .map(|info| info.x_mins.as_slice());
            let Some(x_mins) = x_mins else {
                log::debug!("transformed hmtx without a transformed glyf table");
                bail!(ErrorKind::ReconstructHmtxTableFailed);
            };

            let hhea = font
                .hhea_idx
                .and_then(|hhea_idx| pool[hhea_idx as usize].as_ref());
            let Some(hhea) = hhea else {
                log::debug!("transformed hmtx without an hhea table");
                bail!(ErrorKind::ReconstructHmtxTableFailed);
            };
            let num_hmetrics = read_num_hmetrics(&hhea.data)?;

            let hmtx_table = reconstruct_hmtx(table_data[hmtx_idx], num_hmetrics, x_mins)?;
            log::trace!("hmtx reconstructed ({} bytes)", hmtx_table.len());
            pool[hmtx_idx] = Some(OutputTable {
                tag: tables[hmtx_idx].tag,
                data: hmtx_table,
            });
        }
    }

    Ok(())
}

fn reconstruct_glyf(
    tables: &TableDirectory,
    table_data: &[&[u8]],
    glyf_idx: usize,
    loca_idx: usize,
    pool: &mut TablePool,
    limits: &Limits,
) -> Result<GlyfInfo> {
    let glyf_and_loca = reconstruct_glyf_and_loca(table_data[glyf_idx], limits)?;

    // The encoder records the size of the loca table it dropped
    let loca_entry_size: u32 = if glyf_and_loca.requested_index_format != 0 { 4 } else { 2 };
    let expected_loca_length = (glyf_and_loca.num_glyphs as u32 + 1) * loca_entry_size;
    bail_with_msg_if!(
        tables[loca_idx].orig_length != expected_loca_length,
        ErrorKind::ReconstructGlyphFailed,
        "loca declares {} bytes, {} glyphs need {expected_loca_length}",
        tables[loca_idx].orig_length,
        glyf_and_loca.num_glyphs
    );

    log::trace!(
        "glyf reconstructed ({} glyphs, {} bytes, loca format {})",
        glyf_and_loca.num_glyphs,
        glyf_and_loca.glyf_table.len(),
        glyf_and_loca.index_format
    );

    pool[glyf_idx] = Some(OutputTable {
        tag: tables[glyf_idx].tag,
        data: glyf_and_loca.glyf_table,
    });
    pool[loca_idx] = Some(OutputTable {
        tag: tables[loca_idx].tag,
        data: glyf_and_loca.loca_table,
    });

    Ok(GlyfInfo {
        index_format: glyf_and_loca.index_format,
        x_mins: glyf_and_loca.x_mins,
    })
}

// Get numberOfHMetrics, https://www.microsoft.com/typography/otspec/hhea.htm
fn read_num_hmetrics(mut hhea_data: &[u8]) -> Result<u16> {
    // Skip 34 to reach 'hhea' numberOfHMetrics
    hhea_data
        .try_skip(HHEA_NUM_HMETRICS_OFFSET)
        .or_kind(ErrorKind::ReconstructHmtxTableFailed)?;
    let num_hmetrics = hhea_data
        .try_get_u16()
        .map_err(DecodeError::from)
        .or_kind(ErrorKind::ReconstructHmtxTableFailed)?;
    Ok(num_hmetrics)
}
