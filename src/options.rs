//! Decoder configuration
//!
//! Every count and size in a WOFF2 file comes from untrusted input. [`Limits`]
//! caps them before anything proportional to them is allocated.

/// Upper bounds on values declared by the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// Maximum `numTables` in the WOFF2 header.
    pub max_tables: u16,
    /// Maximum number of fonts in a collection.
    pub max_fonts: u16,
    /// Maximum `numGlyphs` in a transformed `glyf` table.
    pub max_glyphs: u16,
    /// Maximum size of the decompressed table stream, in bytes.
    pub max_decompressed_size: usize,
    /// Maximum ratio between the decompressed stream size and the input size.
    ///
    /// Over 14k test fonts the max compression ratio seen to date was ~20.
    /// >100 suggests you wrote a bad uncompressed size.
    pub max_compression_ratio: f32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_tables: 4096,
            max_fonts: 256,
            max_glyphs: u16::MAX,
            max_decompressed_size: 1024 * 1024 * 1024,
            max_compression_ratio: 100.0,
        }
    }
}

/// Physical order of table data in the reconstructed font.
///
/// Table directory records are always sorted by tag, as the sfnt format
/// requires; this only affects where each table's bytes are placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableOrder {
    /// Tag order with `loca` written directly after `glyf`. Produces the same
    /// bytes as Google's `woff2_decompress`.
    #[default]
    TagOrder,
    /// The OpenType recommended order for the font's outline format, unlisted
    /// tables following in tag order and `DSIG` always last.
    Recommended,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOptions {
    pub limits: Limits,
    pub table_order: TableOrder,
}

impl DecodeOptions {
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_table_order(mut self, table_order: TableOrder) -> Self {
        self.table_order = table_order;
        self
    }
}
