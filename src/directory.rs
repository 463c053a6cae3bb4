//! WOFF2 table directory and collection directory
//!
//! <https://www.w3.org/TR/WOFF2/#table_dir_format>

use std::ops::Deref;

use bytes::Buf;
use font_types::Tag;

use crate::error::{
    ErrorKind, Result, ResultExt, bail, bail_if, bail_with_msg_if, usize_will_overflow,
};
use crate::options::Limits;
use crate::reader::BufReadExt;
use crate::tags::{ARBITRARY_TAG_INDEX, GLYF, HEAD, HHEA, HMTX, LOCA, known_tag};

#[derive(Debug)]
pub struct TableDirectory {
    pub tables: Vec<TableDirectoryEntry>,
    /// Sum of the stored lengths of all tables: the exact size of the
    /// decompressed stream
    pub uncompressed_size: usize,
}

impl Deref for TableDirectory {
    type Target = [TableDirectoryEntry];
    fn deref(&self) -> &Self::Target {
        &self.tables
    }
}

impl TableDirectory {
    pub fn parse(input: &mut impl Buf, num_tables: usize) -> Result<Self> {
        Self::parse_entries(input, num_tables).or_kind(ErrorKind::ReadTableDirectoryFailed)
    }

    fn parse_entries(input: &mut impl Buf, num_tables: usize) -> Result<Self> {
        // Tables in the CompressedFontData field of the WOFF are stored directly after each other
        // in the order they specified in the header. So we can determine the offset for each table
        // by adding up the lengths of each table (which are stored in the directory entries).
        //
        // <https://www.w3.org/TR/WOFF2/#table_format>
        let mut offset: usize = 0;

        // Each entry is at least two bytes long; don't trust num_tables for the allocation.
        let mut tables = Vec::with_capacity(num_tables.min(input.remaining() / 2));
        for _ in 0..num_tables {
            let mut table = TableDirectoryEntry::parse(input)?;
            table.offset = offset;

            bail_if!(
                usize_will_overflow(offset, table.stored_length as usize),
                ErrorKind::ReadTableDirectoryFailed
            );
            offset += table.stored_length as usize;

            tables.push(table);
        }

        Ok(Self {
            tables,
            uncompressed_size: offset,
        })
    }
}

/// Which transformation the encoder applied to a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Table bytes are stored as is
    None,
    /// The `glyf`/`loca` transform
    Glyf,
    /// The `hmtx` transform (version 1)
    Hmtx,
    /// A transform version this decoder does not know
    Unknown(u8),
}

#[derive(Debug, Clone)]
pub struct TableDirectoryEntry {
    /// 4-byte tag
    pub tag: Tag,
    /// 2 bits representing the preprocessing transformation version
    pub transform_version: u8,
    /// Length of original table
    pub orig_length: u32,
    /// Length of the table within the decompressed stream: transformLength
    /// if the table is transformed, origLength otherwise
    pub stored_length: u32,
    /// Offset of the table within the decompressed stream (computed)
    pub offset: usize,
}

impl TableDirectoryEntry {
    pub fn parse(input: &mut impl Buf) -> Result<Self> {
        let flags = input.try_get_u8()?;
        let (tag, transform_version) = Self::parse_flags(flags);

        // Note: we only parse the tag field from the input if it is not contained within the flags
        let tag = match tag {
            Some(tag) => tag,
            None => input.try_get_tag()?,
        };

        let orig_length = input.try_get_base128_u32()?;
        let mut entry = Self {
            tag,
            transform_version,
            orig_length,
            stored_length: orig_length,
            offset: 0, // Set in TableDirectory parse function
        };

        if entry.is_transformed() {
            entry.stored_length = input.try_get_base128_u32()?;
            bail_with_msg_if!(
                entry.tag == LOCA && entry.stored_length != 0,
                ErrorKind::ReadTableDirectoryFailed,
                "transformed loca must have transformLength 0"
            );
        }

        Ok(entry)
    }

    /// Parse flags field into "known tag" and "transform version"
    ///
    /// Bits [0..5] contain an index to the "known tag" table, which represents tags likely to
    /// appear in fonts. If the tag is not present in this table, then the value of this bit
    /// field is 63. Bits 6 and 7 indicate the preprocessing transformation version number (0-3)
    /// that was applied to each table.
    pub fn parse_flags(flags: u8) -> (Option<Tag>, u8) {
        const TAG_MASK: u8 = 0b00111111;
        let tag_bits = flags & TAG_MASK;
        let version = flags >> 6;
        let tag = match tag_bits {
            ARBITRARY_TAG_INDEX => None,
            index => known_tag(index),
        };
        (tag, version)
    }

    /// Whether the table has been transformed
    ///
    /// For 'glyf' and 'loca' tables, transformation version 3 indicates the null transform and
    /// version 0 the glyf/loca transform. For every other table version 0 is the null transform.
    pub fn is_transformed(&self) -> bool {
        match self.tag {
            GLYF | LOCA => self.transform_version == 0,
            _ => self.transform_version != 0,
        }
    }

    pub fn transform(&self) -> Transform {
        if !self.is_transformed() {
            return Transform::None;
        }
        match (self.tag, self.transform_version) {
            (GLYF | LOCA, 0) => Transform::Glyf,
            (HMTX, 1) => Transform::Hmtx,
            (_, version) => Transform::Unknown(version),
        }
    }

    /// The bytes of this table within the decompressed stream
    pub fn data<'a>(&self, stream: &'a [u8]) -> Result<&'a [u8]> {
        let end = self.offset + self.stored_length as usize;
        match stream.get(self.offset..end) {
            Some(data) => Ok(data),
            None => bail!(ErrorKind::IntegrityCheckFailed),
        }
    }
}

/// <https://www.w3.org/TR/WOFF2/#collection_dir_format>
#[derive(Debug, Clone)]
pub struct CollectionDirectory {
    /// The Version of the TTC Header in the original font.
    pub version: u32,
    /// Number of fonts in the file
    pub fonts: Vec<FontEntry>,
}

pub const TTC_VERSION_1: u32 = 0x00010000;
pub const TTC_VERSION_2: u32 = 0x00020000;

impl CollectionDirectory {
    pub fn parse(input: &mut impl Buf, tables: &TableDirectory, limits: &Limits) -> Result<Self> {
        Self::parse_fonts(input, tables, limits).or_kind(ErrorKind::ReadCollectionDirectoryFailed)
    }

    fn parse_fonts(input: &mut impl Buf, tables: &TableDirectory, limits: &Limits) -> Result<Self> {
        let version = input.try_get_u32()?;
        let num_fonts = input.try_get_255_u16()?;

        bail_with_msg_if!(
            version != TTC_VERSION_1 && version != TTC_VERSION_2,
            ErrorKind::ReadCollectionDirectoryFailed,
            "unsupported collection version {version:#010x}"
        );
        bail_if!(num_fonts == 0, ErrorKind::ReadCollectionDirectoryFailed);
        bail_if!(num_fonts > limits.max_fonts, ErrorKind::LimitExceeded);

        let mut fonts = Vec::with_capacity(num_fonts as usize);
        for font_idx in 0..num_fonts {
            fonts.push(FontEntry::parse(input, tables, font_idx)?);
        }

        Ok(Self { version, fonts })
    }

    /// Generate a fake `CollectionDirectory` for a single font so that we can share
    /// serialization logic between collection and single fonts.
    pub fn generate_for_single_font(flavor: Tag, tables: &TableDirectory) -> Result<Self> {
        let table_indices: Vec<u16> = (0..(tables.len() as u16)).collect();
        let font = FontEntry::new(flavor, table_indices, tables)
            .or_kind(ErrorKind::ReadTableDirectoryFailed)?;
        Ok(Self {
            version: 0, // Not a collection: no TTC header is written
            fonts: vec![font],
        })
    }

    pub fn is_collection(&self) -> bool {
        self.version != 0
    }

    /// Size of the collection header. 0 if version indicates this isn't a
    /// collection. Ref http://www.microsoft.com/typography/otspec/otff.htm,
    /// True Type Collections
    pub fn collection_header_size(&self) -> usize {
        let mut size: usize = 0;
        if self.version == TTC_VERSION_2 {
            size += 12; // ulDsig{Tag,Length,Offset}
        }
        if self.version == TTC_VERSION_1 || self.version == TTC_VERSION_2 {
            size += 12   // TTCTag, Version, numFonts
          + 4 * self.fonts.len(); // OffsetTable[numFonts]
        }
        size
    }

    /// Size of everything that precedes the first table: collection header
    /// plus one table directory per font
    pub fn headers_size(&self) -> usize {
        self.collection_header_size()
            + self
                .fonts
                .iter()
                .map(FontEntry::table_directory_size)
                .sum::<usize>()
    }
}

/// One font of a collection (or the only font of a single font file).
#[derive(Debug, Clone)]
pub struct FontEntry {
    /// The "sfnt version" of the font
    pub flavor: Tag,
    /// In a TTC file, each font reference some subset of the tables in the file.
    /// This field records which tables this particular font references.
    pub table_indices: Vec<u16>,

    // Indices of specific tables that we want random access to
    pub head_idx: Option<u16>,
    pub hhea_idx: Option<u16>,
    pub hmtx_idx: Option<u16>,
    pub glyf_idx: Option<u16>,
    pub loca_idx: Option<u16>,
}

impl FontEntry {
    fn parse(input: &mut impl Buf, tables: &TableDirectory, font_idx: u16) -> Result<Self> {
        let num_tables = input.try_get_255_u16()?;
        let flavor = input.try_get_tag()?;

        bail_if!(num_tables == 0, ErrorKind::ReadCollectionDirectoryFailed);

        let mut table_indices = Vec::with_capacity(num_tables as usize);
        for _ in 0..num_tables {
            let table_index = input.try_get_255_u16()?;
            bail_with_msg_if!(
                table_index as usize >= tables.len(),
                ErrorKind::ReadCollectionDirectoryFailed,
                "font {font_idx} references table {table_index} of {}",
                tables.len()
            );
            table_indices.push(table_index);
        }

        let font = Self::new(flavor, table_indices, tables)?;

        // If we have both glyf and loca make sure they are consecutive
        if let (Some(glyf_idx), Some(loca_idx)) = (font.glyf_idx, font.loca_idx) {
            bail_with_msg_if!(
                glyf_idx > loca_idx || loca_idx - glyf_idx != 1,
                ErrorKind::ReadCollectionDirectoryFailed,
                "TTC font {font_idx} has non-consecutive glyf/loca"
            );
        }

        Ok(font)
    }

    fn new(flavor: Tag, table_indices: Vec<u16>, tables: &TableDirectory) -> Result<Self> {
        let mut font = Self {
            flavor,
            table_indices,
            head_idx: None,
            hhea_idx: None,
            hmtx_idx: None,
            glyf_idx: None,
            loca_idx: None,
        };

        for &table_index in &font.table_indices {
            let slot = match tables[table_index as usize].tag {
                HEAD => &mut font.head_idx,
                HHEA => &mut font.hhea_idx,
                HMTX => &mut font.hmtx_idx,
                GLYF => &mut font.glyf_idx,
                LOCA => &mut font.loca_idx,
                _ => continue,
            };
            bail_with_msg_if!(
                slot.is_some(),
                ErrorKind::ReadTableDirectoryFailed,
                "duplicate {} table",
                tables[table_index as usize].tag
            );
            *slot = Some(table_index);
        }

        // 'glyf' without 'loca' doesn't make sense
        match (font.glyf_idx, font.loca_idx) {
            (Some(glyf_idx), Some(loca_idx)) => {
                bail_with_msg_if!(
                    tables[glyf_idx as usize].is_transformed()
                        != tables[loca_idx as usize].is_transformed(),
                    ErrorKind::ReadTableDirectoryFailed,
                    "Cannot transform just one of glyf/loca"
                );
            }
            (Some(_), None) | (None, Some(_)) => {
                bail_with_msg_if!(
                    true,
                    ErrorKind::ReadTableDirectoryFailed,
                    "Cannot have just one of glyf/loca"
                )
            }
            (None, None) => {}
        }

        Ok(font)
    }

    pub fn num_tables(&self) -> usize {
        self.table_indices.len()
    }

    /// The size required for a table directory for this font
    pub fn table_directory_size(&self) -> usize {
        12 + (16 * self.num_tables())
    }
}
