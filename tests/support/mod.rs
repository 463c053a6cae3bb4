//! Synthetic fonts and a minimal WOFF2 encoder for the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;

pub const CHECKSUM_MAGIC: u32 = 0xB1B0AFBA;
pub const TRUETYPE: [u8; 4] = [0, 1, 0, 0];

#[derive(Debug, Clone)]
pub struct Table {
    pub tag: [u8; 4],
    pub data: Vec<u8>,
}

impl Table {
    pub fn new(tag: &[u8; 4], data: Vec<u8>) -> Self {
        Self { tag: *tag, data }
    }
}

pub fn round4(n: usize) -> usize {
    (n + 3) & !3
}

pub fn checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

pub fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

pub fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

// ---------------------------------------------------------------------------
// sfnt

/// One record of an sfnt table directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    pub tag: [u8; 4],
    pub checksum: u32,
    pub offset: usize,
    pub length: usize,
}

/// Read the table directory starting at `start`
pub fn read_directory(font: &[u8], start: usize) -> Vec<TableRecord> {
    let num_tables = read_u16(font, start + 4) as usize;
    (0..num_tables)
        .map(|i| {
            let record = start + 12 + 16 * i;
            TableRecord {
                tag: font[record..record + 4].try_into().unwrap(),
                checksum: read_u32(font, record + 4),
                offset: read_u32(font, record + 8) as usize,
                length: read_u32(font, record + 12) as usize,
            }
        })
        .collect()
}

pub fn table_bytes<'a>(font: &'a [u8], directory: &[TableRecord], tag: &[u8; 4]) -> &'a [u8] {
    let record = directory.iter().find(|record| &record.tag == tag).unwrap();
    &font[record.offset..record.offset + record.length]
}

/// Write an sfnt with a tag sorted directory and the table data in tag
/// order, except for loca which directly follows glyf.
pub fn build_sfnt(flavor: [u8; 4], tables: &[Table]) -> Vec<u8> {
    let mut sorted: Vec<&Table> = tables.iter().collect();
    sorted.sort_by_key(|table| table.tag);

    let mut data_order = sorted.clone();
    if let Some(loca_pos) = data_order.iter().position(|table| &table.tag == b"loca") {
        let loca = data_order.remove(loca_pos);
        let glyf_pos = data_order.iter().position(|table| &table.tag == b"glyf").unwrap();
        data_order.insert(glyf_pos + 1, loca);
    }

    let num_tables = tables.len();
    let mut offsets: HashMap<[u8; 4], usize> = HashMap::new();
    let mut offset = 12 + 16 * num_tables;
    for table in &data_order {
        offsets.insert(table.tag, offset);
        offset += round4(table.data.len());
    }

    // head is summed with checkSumAdjustment zeroed
    let contents = |table: &Table| {
        let mut data = table.data.clone();
        if &table.tag == b"head" {
            data[8..12].fill(0);
        }
        data
    };

    let mut out = Vec::new();
    out.extend_from_slice(&flavor);
    let mut pow2 = 1;
    let mut entry_selector = 0;
    while pow2 * 2 <= num_tables {
        pow2 *= 2;
        entry_selector += 1;
    }
    put_u16(&mut out, num_tables as u16);
    put_u16(&mut out, (pow2 * 16) as u16);
    put_u16(&mut out, entry_selector);
    put_u16(&mut out, (num_tables * 16 - pow2 * 16) as u16);
    for table in &sorted {
        out.extend_from_slice(&table.tag);
        put_u32(&mut out, checksum(&contents(table)));
        put_u32(&mut out, offsets[&table.tag] as u32);
        put_u32(&mut out, table.data.len() as u32);
    }
    for table in &data_order {
        out.extend_from_slice(&contents(table));
        out.resize(round4(out.len()), 0);
    }

    if let Some(&head_offset) = offsets.get(b"head") {
        let adjustment = CHECKSUM_MAGIC.wrapping_sub(checksum(&out));
        out[head_offset + 8..head_offset + 12].copy_from_slice(&adjustment.to_be_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Test font

pub enum Glyph {
    Empty,
    /// Absolute points per contour; the bbox is left for the decoder to compute
    Simple {
        contours: Vec<Vec<(i32, i32, bool)>>,
        instructions: Vec<u8>,
    },
    /// Raw component records and an explicit bbox
    Composite {
        components: Vec<u8>,
        instructions: Option<Vec<u8>>,
        bbox: [i16; 4],
    },
}

/// The glyphs of the test font, in their WOFF2 description
pub fn glyphs() -> Vec<Glyph> {
    vec![
        Glyph::Simple {
            contours: vec![vec![(0, 0, true), (100, 0, true), (100, 300, false)]],
            instructions: vec![0xB0, 0x01],
        },
        Glyph::Empty,
        Glyph::Composite {
            // ARGS_ARE_XY_VALUES, glyph 0, offset (10, 20)
            components: vec![0x00, 0x02, 0x00, 0x00, 10, 20],
            instructions: None,
            bbox: [10, 20, 110, 320],
        },
        Glyph::Simple {
            contours: vec![vec![(10, 10, true), (20, 10, true), (30, 10, true), (40, 10, true)]],
            instructions: vec![],
        },
    ]
}

/// The same glyphs in TrueType layout
pub fn glyf_table() -> Vec<u8> {
    let mut glyf = vec![
        // glyph 0
        0, 1, 0, 0, 0, 0, 0, 100, 1, 44, // header
        0, 2, // endPtsOfContours
        0, 2, 0xB0, 0x01, // instructions
        0x31, 0x33, 0x10, // flags
        100, // x
        0x01, 0x2C, // y
        0, 0, // padding
        // glyph 1 is empty
        // glyph 2
        0xFF, 0xFF, 0, 10, 0, 20, 0, 110, 1, 64, // header
        0x00, 0x02, 0x00, 0x00, 10, 20, // component
        // glyph 3
        0, 1, 0, 10, 0, 10, 0, 40, 0, 10, // header
        0, 3, // endPtsOfContours
        0, 0, // instructions
        0x37, 0x3B, 0x02, // flags, the last two points repeat
        10, 10, 10, 10, // x
        10, // y
    ];
    glyf.resize(round4(glyf.len()), 0);
    glyf
}

pub fn loca_table() -> Vec<u8> {
    [0u16, 12, 12, 20, 32].iter().flat_map(|offset| offset.to_be_bytes()).collect()
}

pub fn head_table() -> Vec<u8> {
    let mut head = vec![0u8; 54];
    head[0..4].copy_from_slice(&[0, 1, 0, 0]); // version
    head[4..8].copy_from_slice(&[0, 1, 0, 0]); // fontRevision
    head[12..16].copy_from_slice(&[0x5F, 0x0F, 0x3C, 0xF5]); // magicNumber
    head[18..20].copy_from_slice(&1000u16.to_be_bytes()); // unitsPerEm
    head[40..42].copy_from_slice(&110u16.to_be_bytes()); // xMax
    head[42..44].copy_from_slice(&320u16.to_be_bytes()); // yMax
    head
}

pub fn hhea_table() -> Vec<u8> {
    let mut hhea = vec![0u8; 36];
    hhea[0..4].copy_from_slice(&[0, 1, 0, 0]);
    hhea[4..6].copy_from_slice(&800u16.to_be_bytes()); // ascender
    hhea[34..36].copy_from_slice(&2u16.to_be_bytes()); // numberOfHMetrics
    hhea
}

pub fn hmtx_table() -> Vec<u8> {
    vec![0x01, 0xF4, 0, 0, 0x02, 0x58, 0, 0, 0, 10, 0, 10]
}

/// hmtx with both lsb arrays left to the glyph xMins
pub fn transformed_hmtx() -> Vec<u8> {
    vec![0x03, 0x01, 0xF4, 0x02, 0x58]
}

/// The uncompressed test font, in WOFF2 directory order
pub fn font_tables() -> Vec<Table> {
    vec![
        Table::new(b"cmap", vec![0, 0, 0, 1, 3, 1, 7]),
        Table::new(b"glyf", glyf_table()),
        Table::new(b"loca", loca_table()),
        Table::new(b"head", head_table()),
        Table::new(b"hhea", hhea_table()),
        Table::new(b"hmtx", hmtx_table()),
        Table::new(b"maxp", vec![0, 0, 0x50, 0, 0, 4]),
        Table::new(b"name", b"synthetic name table".to_vec()),
        Table::new(b"Zzzz", vec![9; 5]),
    ]
}

// ---------------------------------------------------------------------------
// WOFF2 encoding

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    None,
    /// glyf/loca stored as is (transform version 3)
    NullGlyf,
    Glyf,
    Hmtx,
}

#[derive(Debug, Clone)]
pub struct Woff2Table {
    pub tag: [u8; 4],
    pub orig_length: u32,
    pub stored: Vec<u8>,
    pub transform: Transform,
}

impl Woff2Table {
    pub fn plain(table: &Table) -> Self {
        let transform = match &table.tag {
            b"glyf" | b"loca" => Transform::NullGlyf,
            _ => Transform::None,
        };
        Self {
            tag: table.tag,
            orig_length: table.data.len() as u32,
            stored: table.data.clone(),
            transform,
        }
    }

    pub fn transformed(table: &Table, stored: Vec<u8>, transform: Transform) -> Self {
        Self {
            tag: table.tag,
            orig_length: table.data.len() as u32,
            stored,
            transform,
        }
    }
}

pub struct Collection {
    pub version: u32,
    pub fonts: Vec<([u8; 4], Vec<u16>)>,
}

fn known_tag_index(tag: &[u8; 4]) -> u8 {
    match tag {
        b"cmap" => 0,
        b"head" => 1,
        b"hhea" => 2,
        b"hmtx" => 3,
        b"maxp" => 4,
        b"name" => 5,
        b"OS/2" => 6,
        b"post" => 7,
        b"glyf" => 10,
        b"loca" => 11,
        _ => 63,
    }
}

pub fn put_base128(out: &mut Vec<u8>, value: u32) {
    let mut size = 1;
    while size < 5 && value >> (7 * size) != 0 {
        size += 1;
    }
    for i in (0..size).rev() {
        let mut byte = ((value >> (7 * i)) & 0x7f) as u8;
        if i != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

pub fn put_255_u16(out: &mut Vec<u8>, value: u16) {
    if value < 253 {
        out.push(value as u8);
    } else {
        out.push(253);
        put_u16(out, value);
    }
}

pub fn brotli_compress(data: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 11, 22);
        writer.write_all(data).unwrap();
    }
    compressed
}

/// Encode a WOFF2 file. A private data block, if given, follows the
/// compressed stream.
pub fn build_woff2(
    flavor: [u8; 4],
    tables: &[Woff2Table],
    collection: Option<&Collection>,
    private: Option<&[u8]>,
) -> Vec<u8> {
    let mut directory = Vec::new();
    let mut stream = Vec::new();
    for table in tables {
        let version: u8 = match table.transform {
            Transform::None | Transform::Glyf => 0,
            Transform::Hmtx => 1,
            Transform::NullGlyf => 3,
        };
        let index = known_tag_index(&table.tag);
        directory.push((version << 6) | index);
        if index == 63 {
            directory.extend_from_slice(&table.tag);
        }
        put_base128(&mut directory, table.orig_length);
        if matches!(table.transform, Transform::Glyf | Transform::Hmtx) {
            put_base128(&mut directory, table.stored.len() as u32);
        }
        stream.extend_from_slice(&table.stored);
    }

    if let Some(collection) = collection {
        put_u32(&mut directory, collection.version);
        put_255_u16(&mut directory, collection.fonts.len() as u16);
        for (font_flavor, indices) in &collection.fonts {
            put_255_u16(&mut directory, indices.len() as u16);
            directory.extend_from_slice(font_flavor);
            for &index in indices {
                put_255_u16(&mut directory, index);
            }
        }
    }

    let compressed = brotli_compress(&stream);
    let compressed_offset = 48 + directory.len();
    let mut length = compressed_offset + compressed.len();
    let private_offset = private.map(|_| round4(length));
    if let (Some(private), Some(offset)) = (private, private_offset) {
        length = offset + private.len();
    }

    let mut out = Vec::with_capacity(length);
    out.extend_from_slice(b"wOF2");
    out.extend_from_slice(&flavor);
    put_u32(&mut out, length as u32);
    put_u16(&mut out, tables.len() as u16);
    put_u16(&mut out, 0); // reserved
    put_u32(&mut out, (12 + 16 * tables.len() + round4(stream.len())) as u32); // totalSfntSize
    put_u32(&mut out, compressed.len() as u32);
    put_u16(&mut out, 1); // majorVersion
    put_u16(&mut out, 0); // minorVersion
    put_u32(&mut out, 0); // metaOffset
    put_u32(&mut out, 0); // metaLength
    put_u32(&mut out, 0); // metaOrigLength
    put_u32(&mut out, private_offset.unwrap_or(0) as u32);
    put_u32(&mut out, private.map_or(0, |private| private.len()) as u32);
    out.extend_from_slice(&directory);
    out.extend_from_slice(&compressed);
    if let Some(private) = private {
        out.resize(round4(out.len()), 0);
        out.extend_from_slice(private);
    }
    assert_eq!(out.len(), length);
    out
}

/// WOFF2 glyf transform of `glyphs`. Points always use the 4-byte triplet form.
pub fn transform_glyf(glyphs: &[Glyph], index_format: u16) -> Vec<u8> {
    let num_glyphs = glyphs.len();
    let mut n_contour = Vec::new();
    let mut n_points = Vec::new();
    let mut flags = Vec::new();
    let mut glyph_stream = Vec::new();
    let mut composite = Vec::new();
    let mut bbox_bitmap = vec![0u8; ((num_glyphs + 31) >> 5) << 2];
    let mut bboxes = Vec::new();
    let mut instructions = Vec::new();

    for (i, glyph) in glyphs.iter().enumerate() {
        match glyph {
            Glyph::Empty => put_u16(&mut n_contour, 0),
            Glyph::Simple {
                contours,
                instructions: glyph_instructions,
            } => {
                put_u16(&mut n_contour, contours.len() as u16);
                let (mut last_x, mut last_y) = (0, 0);
                for contour in contours {
                    put_255_u16(&mut n_points, contour.len() as u16);
                    for &(x, y, on_curve) in contour {
                        let (dx, dy): (i32, i32) = (x - last_x, y - last_y);
                        let mut flag = 124u8;
                        if dx >= 0 {
                            flag |= 1;
                        }
                        if dy >= 0 {
                            flag |= 2;
                        }
                        if !on_curve {
                            flag |= 0x80;
                        }
                        flags.push(flag);
                        put_u16(&mut glyph_stream, dx.unsigned_abs() as u16);
                        put_u16(&mut glyph_stream, dy.unsigned_abs() as u16);
                        (last_x, last_y) = (x, y);
                    }
                }
                put_255_u16(&mut glyph_stream, glyph_instructions.len() as u16);
                instructions.extend_from_slice(glyph_instructions);
            }
            Glyph::Composite {
                components,
                instructions: glyph_instructions,
                bbox,
            } => {
                put_u16(&mut n_contour, 0xFFFF);
                composite.extend_from_slice(components);
                if let Some(glyph_instructions) = glyph_instructions {
                    put_255_u16(&mut glyph_stream, glyph_instructions.len() as u16);
                    instructions.extend_from_slice(glyph_instructions);
                }
                bbox_bitmap[i >> 3] |= 0x80 >> (i & 7);
                for value in bbox {
                    bboxes.extend_from_slice(&value.to_be_bytes());
                }
            }
        }
    }

    let mut bbox_stream = bbox_bitmap;
    bbox_stream.extend(bboxes);

    let mut out = Vec::new();
    put_u16(&mut out, 0); // reserved
    put_u16(&mut out, 0); // optionFlags
    put_u16(&mut out, num_glyphs as u16);
    put_u16(&mut out, index_format);
    let streams = [
        &n_contour,
        &n_points,
        &flags,
        &glyph_stream,
        &composite,
        &bbox_stream,
        &instructions,
    ];
    for stream in streams {
        put_u32(&mut out, stream.len() as u32);
    }
    for stream in streams {
        out.extend_from_slice(stream);
    }
    out
}

/// The test font with every table stored as is
pub fn null_transform_woff2(tables: &[Table]) -> Vec<u8> {
    let woff2_tables: Vec<Woff2Table> = tables.iter().map(Woff2Table::plain).collect();
    build_woff2(TRUETYPE, &woff2_tables, None, None)
}

/// The test font with glyf, loca and hmtx transformed
pub fn transformed_tables(tables: &[Table]) -> Vec<Woff2Table> {
    transformed_tables_with(tables, &glyphs())
}

/// Like [`transformed_tables`], with the glyf transform built from `glyphs`
pub fn transformed_tables_with(tables: &[Table], glyphs: &[Glyph]) -> Vec<Woff2Table> {
    tables
        .iter()
        .map(|table| match &table.tag {
            b"glyf" => Woff2Table::transformed(table, transform_glyf(glyphs, 0), Transform::Glyf),
            b"loca" => Woff2Table::transformed(table, Vec::new(), Transform::Glyf),
            b"hmtx" => Woff2Table::transformed(table, transformed_hmtx(), Transform::Hmtx),
            _ => Woff2Table::plain(table),
        })
        .collect()
}

pub fn transformed_woff2(tables: &[Table]) -> Vec<u8> {
    build_woff2(TRUETYPE, &transformed_tables(tables), None, None)
}
