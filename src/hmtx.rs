//! Reconstruction of the `hmtx` table from the WOFF2 transformed `hmtx` table
//!
//! <https://www.w3.org/TR/WOFF2/#hmtx_table_format>

use bytes::{Buf, BufMut};

use crate::error::{ErrorKind, Result, ResultExt, bail_if, bail_with_msg_if};

const FLAG_PROPORTIONAL_LSBS_OMITTED: u8 = 1 << 0;
const FLAG_MONOSPACE_LSBS_OMITTED: u8 = 1 << 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmtxData {
    num_hmetrics: u16,
    advance_widths: Vec<u16>,
    lsbs: Vec<i16>,
}

/// Rebuild `hmtx` from its transformed form and the glyph xMins of the
/// reconstructed `glyf` table.
pub(crate) fn reconstruct_hmtx(data: &[u8], num_hmetrics: u16, x_mins: &[i16]) -> Result<Vec<u8>> {
    let mut input = data;
    let hmtx_data = decode_hmtx_table(&mut input, num_hmetrics, x_mins)
        .or_kind(ErrorKind::ReconstructHmtxTableFailed)?;
    Ok(generate_hmtx_table(&hmtx_data))
}

/// Decode a WOFF2 transformed hmtx table
pub(crate) fn decode_hmtx_table(
    input: &mut impl Buf,
    num_hmetrics: u16,
    x_mins: &[i16],
) -> Result<HmtxData> {
    let num_glyphs = x_mins.len();

    // Decode flags
    let hmtx_flags: u8 = input.try_get_u8()?;
    let has_proportional_lsbs: bool = (hmtx_flags & FLAG_PROPORTIONAL_LSBS_OMITTED) == 0;
    let has_monospace_lsbs: bool = (hmtx_flags & FLAG_MONOSPACE_LSBS_OMITTED) == 0;

    // Bits 2-7 are reserved and MUST be zero.
    bail_with_msg_if!(
        (hmtx_flags & 0xFC) != 0,
        ErrorKind::ReconstructHmtxTableFailed,
        "Illegal hmtx flags {hmtx_flags:#04x}; bits 2-7 must be 0"
    );

    // you say you transformed but there is little evidence of it
    bail_if!(
        has_proportional_lsbs && has_monospace_lsbs,
        ErrorKind::ReconstructHmtxTableFailed
    );

    // num_glyphs 0 is OK if there is no 'glyf' but cannot then xform 'hmtx'.
    bail_with_msg_if!(
        num_hmetrics as usize > num_glyphs,
        ErrorKind::ReconstructHmtxTableFailed,
        "numberOfHMetrics {num_hmetrics} exceeds the glyph count {num_glyphs}"
    );

    // "...only one entry need be in the array, but that entry is required."
    // <https://www.microsoft.com/typography/otspec/hmtx.htm>
    bail_if!(num_hmetrics < 1, ErrorKind::ReconstructHmtxTableFailed);

    let num_hmetrics_usize = num_hmetrics as usize;

    // Read advance widths
    let mut advance_widths: Vec<u16> = Vec::with_capacity(num_hmetrics_usize);
    for _ in 0..num_hmetrics {
        advance_widths.push(input.try_get_u16()?);
    }

    // Read lsb (proportional) and leftSideBearing (monospace) values into the same Vec
    let mut lsbs: Vec<i16> = Vec::with_capacity(num_glyphs);
    for (i, &x_min) in x_mins.iter().enumerate() {
        let present = if i < num_hmetrics_usize {
            has_proportional_lsbs
        } else {
            has_monospace_lsbs
        };
        lsbs.push(if present { input.try_get_i16()? } else { x_min });
    }

    Ok(HmtxData {
        num_hmetrics,
        advance_widths,
        lsbs,
    })
}

/// Serialise hmtx: an advance width and lsb for each of the first numberOfHMetrics glyphs, then lsbs alone
pub(crate) fn generate_hmtx_table(hmtx_data: &HmtxData) -> Vec<u8> {
    let num_glyphs = hmtx_data.lsbs.len();
    let num_hmetrics = hmtx_data.num_hmetrics as usize;

    let mut hmtx_table: Vec<u8> = Vec::with_capacity(2 * num_glyphs + 2 * num_hmetrics);
    for (i, &lsb) in hmtx_data.lsbs.iter().enumerate() {
        if i < num_hmetrics {
            hmtx_table.put_u16(hmtx_data.advance_widths[i]);
        }
        hmtx_table.put_i16(lsb);
    }
    hmtx_table
}
