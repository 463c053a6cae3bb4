//! Reconstruction of the `glyf` and `loca` tables from the WOFF2 transformed `glyf` table
//!
//! <https://www.w3.org/TR/WOFF2/#glyf_table_format>

use arrayvec::ArrayVec;
use bytes::{Buf, BufMut};

use crate::Round4;
use crate::error::{
    ErrorKind, Result, ResultExt, bail, bail_if, bail_with_msg_if, u32_will_overflow,
};
use crate::options::Limits;
use crate::reader::{BufReadExt, try_take};

// simple glyph flags
const GLYF_ON_CURVE: u8 = 1 << 0;
const GLYF_X_SHORT: u8 = 1 << 1;
const GLYF_Y_SHORT: u8 = 1 << 2;
const GLYF_REPEAT: u8 = 1 << 3;
const GLYF_THIS_X_IS_SAME: u8 = 1 << 4;
const GLYF_THIS_Y_IS_SAME: u8 = 1 << 5;
const OVERLAP_SIMPLE: u8 = 1 << 6;

// composite glyph flags
const FLAG_ARG_1_AND_2_ARE_WORDS: u16 = 1 << 0;
const FLAG_WE_HAVE_A_SCALE: u16 = 1 << 3;
const FLAG_MORE_COMPONENTS: u16 = 1 << 5;
const FLAG_WE_HAVE_AN_X_AND_Y_SCALE: u16 = 1 << 6;
const FLAG_WE_HAVE_A_TWO_BY_TWO: u16 = 1 << 7;
const FLAG_WE_HAVE_INSTRUCTIONS: u16 = 1 << 8;

// transformed glyf header flags
const FLAG_OVERLAP_SIMPLE_BITMAP: u16 = 1 << 0;

const NUM_SUB_STREAMS: usize = 7;

/// Short loca offsets store offset / 2 in 16 bits
const MAX_SHORT_LOCA_OFFSET: usize = 0x20000;

#[derive(Debug)]
pub struct GlyfAndLocaData {
    /// The number of glyphs in the glyf table
    pub num_glyphs: u16,
    /// loca index format actually used for `loca_table` (0 = short, 1 = long)
    pub index_format: u16,
    /// loca index format requested by the transformed glyf header
    pub requested_index_format: u16,
    /// The x_min of the bounding box of each glyph. Used to reconstruct hmtx table
    pub x_mins: Vec<i16>,
    /// Encoded Open Type "glyf" table
    pub glyf_table: Vec<u8>,
    /// Encoded Open Type "loca" table
    pub loca_table: Vec<u8>,
}

/// Decode a WOFF2 transformed glyf table into `glyf` and `loca`
pub(crate) fn reconstruct_glyf_and_loca(data: &[u8], limits: &Limits) -> Result<GlyfAndLocaData> {
    TransformedGlyf::parse(data, limits)?.reconstruct()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub on_curve: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BBox {
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
}

impl BBox {
    fn parse(input: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            x_min: input.try_get_i16()?,
            y_min: input.try_get_i16()?,
            x_max: input.try_get_i16()?,
            y_max: input.try_get_i16()?,
        })
    }

    /// Tight bounds of the points. Coordinates outside the i16 range are truncated.
    fn from_points(points: &[Point]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        let (x_min, y_min, x_max, y_max) = points.iter().skip(1).fold(
            (first.x, first.y, first.x, first.y),
            |(x_min, y_min, x_max, y_max), point| {
                (
                    x_min.min(point.x),
                    y_min.min(point.y),
                    x_max.max(point.x),
                    y_max.max(point.y),
                )
            },
        );
        Self {
            x_min: x_min as i16,
            y_min: y_min as i16,
            x_max: x_max as i16,
            y_max: y_max as i16,
        }
    }

    fn write(&self, dst: &mut impl BufMut) {
        dst.put_i16(self.x_min);
        dst.put_i16(self.y_min);
        dst.put_i16(self.x_max);
        dst.put_i16(self.y_max);
    }
}

/// A glyph decoded from the transformed streams, ready to be written in TrueType layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconstructedGlyph<'a> {
    Empty,
    Simple(SimpleGlyph<'a>),
    Composite(CompositeGlyph<'a>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleGlyph<'a> {
    pub bbox: BBox,
    /// Index of the last point of each contour
    pub end_points: Vec<u16>,
    pub instructions: &'a [u8],
    pub points: Vec<Point>,
    /// Set OVERLAP_SIMPLE on the first flag
    pub overlap: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeGlyph<'a> {
    pub bbox: BBox,
    pub components: Vec<Component>,
    /// `None` unless a component sets WE_HAVE_INSTRUCTIONS
    pub instructions: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub flags: u16,
    pub glyph_id: u16,
    pub args: ComponentArgs,
    pub transform: ComponentTransform,
}

/// Raw component offsets or point numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentArgs {
    Bytes(u8, u8),
    Words(u16, u16),
}

/// Raw F2Dot14 values of a component transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentTransform {
    None,
    Scale(u16),
    XyScale(u16, u16),
    TwoByTwo([u16; 4]),
}

impl Component {
    fn parse(input: &mut impl Buf) -> Result<Self> {
        let flags = input.try_get_u16()?;
        let glyph_id = input.try_get_u16()?;
        let args = if flags & FLAG_ARG_1_AND_2_ARE_WORDS != 0 {
            ComponentArgs::Words(input.try_get_u16()?, input.try_get_u16()?)
        } else {
            ComponentArgs::Bytes(input.try_get_u8()?, input.try_get_u8()?)
        };
        let transform = if flags & FLAG_WE_HAVE_A_SCALE != 0 {
            ComponentTransform::Scale(input.try_get_u16()?)
        } else if flags & FLAG_WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            ComponentTransform::XyScale(input.try_get_u16()?, input.try_get_u16()?)
        } else if flags & FLAG_WE_HAVE_A_TWO_BY_TWO != 0 {
            ComponentTransform::TwoByTwo([
                input.try_get_u16()?,
                input.try_get_u16()?,
                input.try_get_u16()?,
                input.try_get_u16()?,
            ])
        } else {
            ComponentTransform::None
        };
        Ok(Self {
            flags,
            glyph_id,
            args,
            transform,
        })
    }

    fn write(&self, dst: &mut impl BufMut) {
        dst.put_u16(self.flags);
        dst.put_u16(self.glyph_id);
        match self.args {
            ComponentArgs::Bytes(arg1, arg2) => {
                dst.put_u8(arg1);
                dst.put_u8(arg2);
            }
            ComponentArgs::Words(arg1, arg2) => {
                dst.put_u16(arg1);
                dst.put_u16(arg2);
            }
        }
        match self.transform {
            ComponentTransform::None => {}
            ComponentTransform::Scale(scale) => dst.put_u16(scale),
            ComponentTransform::XyScale(x_scale, y_scale) => {
                dst.put_u16(x_scale);
                dst.put_u16(y_scale);
            }
            ComponentTransform::TwoByTwo(values) => values.iter().for_each(|&v| dst.put_u16(v)),
        }
    }
}

impl ReconstructedGlyph<'_> {
    /// xMin of the glyph's bounding box, 0 for empty glyphs
    pub fn x_min(&self) -> i16 {
        match self {
            Self::Empty => 0,
            Self::Simple(glyph) => glyph.bbox.x_min,
            Self::Composite(glyph) => glyph.bbox.x_min,
        }
    }

    /// Append the glyph in TrueType `glyf` layout. Empty glyphs write nothing.
    pub fn write(&self, dst: &mut Vec<u8>) {
        match self {
            Self::Empty => {}
            Self::Simple(glyph) => glyph.write(dst),
            Self::Composite(glyph) => glyph.write(dst),
        }
    }
}

impl SimpleGlyph<'_> {
    fn write(&self, dst: &mut Vec<u8>) {
        dst.put_i16(self.end_points.len() as i16);
        self.bbox.write(dst);
        for &end_point in &self.end_points {
            dst.put_u16(end_point);
        }
        dst.put_u16(self.instructions.len() as u16);
        dst.put_slice(self.instructions);
        write_glyph_points(&self.points, self.overlap, dst);
    }
}

impl CompositeGlyph<'_> {
    fn write(&self, dst: &mut Vec<u8>) {
        dst.put_i16(-1); // All composite glyphs has n_contours = -1
        self.bbox.write(dst);
        for component in &self.components {
            component.write(dst);
        }
        if let Some(instructions) = self.instructions {
            dst.put_u16(instructions.len() as u16);
            dst.put_slice(instructions);
        }
    }
}

/// The parsed header and sub-streams of a transformed glyf table
pub struct TransformedGlyf<'a> {
    n_contour_stream: &'a [u8],
    n_points_stream: &'a [u8],
    flag_stream: &'a [u8],
    glyph_stream: &'a [u8],
    composite_stream: &'a [u8],
    bbox_bitmap: &'a [u8],
    bbox_stream: &'a [u8],
    instruction_stream: &'a [u8],
    overlap_bitmap: Option<&'a [u8]>,

    num_glyphs: u16,
    index_format: u16,
}

impl<'a> TransformedGlyf<'a> {
    pub fn parse(data: &'a [u8], limits: &Limits) -> Result<Self> {
        Self::parse_streams(data, limits).or_kind(ErrorKind::ReconstructGlyphFailed)
    }

    fn parse_streams(data: &'a [u8], limits: &Limits) -> Result<Self> {
        let mut input = data;
        let _reserved: u16 = input.try_get_u16()?;
        let option_flags: u16 = input.try_get_u16()?;
        let num_glyphs = input.try_get_u16()?;
        let index_format = input.try_get_u16()?;

        bail_with_msg_if!(
            num_glyphs > limits.max_glyphs,
            ErrorKind::LimitExceeded,
            "{num_glyphs} glyphs exceeds the limit of {}",
            limits.max_glyphs
        );

        let mut substream_sizes: ArrayVec<usize, NUM_SUB_STREAMS> = ArrayVec::new();
        for _ in 0..NUM_SUB_STREAMS {
            substream_sizes.push(input.try_get_u32()? as usize);
        }
        let mut substreams: ArrayVec<&'a [u8], NUM_SUB_STREAMS> = ArrayVec::new();
        for size in substream_sizes {
            substreams.push(try_take(&mut input, size)?);
        }

        // Safe because num_glyphs is bounded
        let bitmap_length: usize = ((num_glyphs as usize + 31) >> 5) << 2;
        bail_if!(
            bitmap_length > substreams[5].len(),
            ErrorKind::ReconstructGlyphFailed
        );
        let (bbox_bitmap, bbox_stream) = substreams[5].split_at(bitmap_length);

        let overlap_bitmap = if option_flags & FLAG_OVERLAP_SIMPLE_BITMAP != 0 {
            let overlap_bitmap_length = (num_glyphs as usize + 7) >> 3;
            Some(try_take(&mut input, overlap_bitmap_length)?)
        } else {
            None
        };

        Ok(Self {
            n_contour_stream: substreams[0],
            n_points_stream: substreams[1],
            flag_stream: substreams[2],
            glyph_stream: substreams[3],
            composite_stream: substreams[4],
            bbox_bitmap,
            bbox_stream,
            instruction_stream: substreams[6],
            overlap_bitmap,
            num_glyphs,
            index_format,
        })
    }

    pub fn reconstruct(mut self) -> Result<GlyfAndLocaData> {
        let num_glyphs = self.num_glyphs as usize;
        let mut glyf_table: Vec<u8> = Vec::with_capacity(num_glyphs * 12);
        let mut loca_values: Vec<u32> = Vec::with_capacity(num_glyphs + 1);
        let mut x_mins: Vec<i16> = Vec::with_capacity(num_glyphs);

        for glyph_id in 0..self.num_glyphs {
            loca_values.push(loca_offset(glyf_table.len())?);

            let glyph = self.next_glyph(glyph_id)?;
            x_mins.push(glyph.x_min());

            // Write glyph to output table and pad output
            glyph.write(&mut glyf_table);
            glyf_table.resize(Round4!(glyf_table.len()), 0);
        }

        // loca[n] will be equal the length of the glyph data ('glyf') table
        loca_values.push(loca_offset(glyf_table.len())?);

        let requested_index_format = self.index_format;
        let index_format = if requested_index_format != 0 || glyf_table.len() >= MAX_SHORT_LOCA_OFFSET
        {
            1
        } else {
            0
        };
        if index_format != requested_index_format {
            log::warn!(
                "glyf data ({} bytes) does not fit short loca offsets; using long offsets",
                glyf_table.len()
            );
        }
        let loca_table = generate_loca_table(&loca_values, index_format);

        Ok(GlyfAndLocaData {
            num_glyphs: self.num_glyphs,
            index_format,
            requested_index_format,
            x_mins,
            glyf_table,
            loca_table,
        })
    }

    /// Decode the next glyph from the sub-streams
    pub fn next_glyph(&mut self, glyph_id: u16) -> Result<ReconstructedGlyph<'a>> {
        self.read_glyph(glyph_id as usize)
            .or_kind(ErrorKind::ReconstructGlyphFailed)
    }

    fn read_glyph(&mut self, i: usize) -> Result<ReconstructedGlyph<'a>> {
        let n_contours: i16 = self.n_contour_stream.try_get_i16()?;
        let glyph_has_bbox = (self.bbox_bitmap[i >> 3] & (0x80 >> (i & 7))) != 0;

        match n_contours {
            0 => {
                // empty glyph. Must NOT have a bbox.
                bail_with_msg_if!(
                    glyph_has_bbox,
                    ErrorKind::ReconstructGlyphFailed,
                    "Empty glyph {i} has a bbox"
                );
                Ok(ReconstructedGlyph::Empty)
            }
            -1 => {
                // composite glyphs must have an explicit bbox
                bail_with_msg_if!(
                    !glyph_has_bbox,
                    ErrorKind::ReconstructGlyphFailed,
                    "Composite glyph {i} has no bbox"
                );
                Ok(ReconstructedGlyph::Composite(self.read_composite_glyph()?))
            }
            n_contours if n_contours > 0 => {
                // Note: while this look similar to the glyph_has_bbox code above, it's indexing into a different bitmap
                let overlap = self
                    .overlap_bitmap
                    .is_some_and(|bitmap| (bitmap[i >> 3] & (0x80 >> (i & 7))) != 0);
                Ok(ReconstructedGlyph::Simple(self.read_simple_glyph(
                    n_contours as usize,
                    glyph_has_bbox,
                    overlap,
                )?))
            }
            _ => bail!(ErrorKind::ReconstructGlyphFailed),
        }
    }

    fn read_composite_glyph(&mut self) -> Result<CompositeGlyph<'a>> {
        let mut components = Vec::new();
        let mut have_instructions = false;
        loop {
            let component = Component::parse(&mut self.composite_stream)?;
            bail_with_msg_if!(
                component.glyph_id >= self.num_glyphs,
                ErrorKind::ReconstructGlyphFailed,
                "component references glyph {} of {}",
                component.glyph_id,
                self.num_glyphs
            );
            have_instructions |= component.flags & FLAG_WE_HAVE_INSTRUCTIONS != 0;
            components.push(component);
            if component.flags & FLAG_MORE_COMPONENTS == 0 {
                break;
            }
        }

        let instructions = if have_instructions {
            let instruction_size = self.glyph_stream.try_get_255_u16()?;
            Some(try_take(&mut self.instruction_stream, instruction_size as usize)?)
        } else {
            None
        };

        let bbox = BBox::parse(&mut self.bbox_stream)?;

        Ok(CompositeGlyph {
            bbox,
            components,
            instructions,
        })
    }

    fn read_simple_glyph(
        &mut self,
        n_contours: usize,
        glyph_has_bbox: bool,
        overlap: bool,
    ) -> Result<SimpleGlyph<'a>> {
        let mut end_points: Vec<u16> = Vec::with_capacity(n_contours);
        let mut total_n_points: u32 = 0;
        for _ in 0..n_contours {
            let n_points_contour = self
                .n_points_stream
                .try_get_255_u16()
                .or_kind(ErrorKind::ReconstructPointFailed)?;
            bail_if!(
                u32_will_overflow(total_n_points, n_points_contour as u32),
                ErrorKind::ReconstructPointFailed
            );
            total_n_points += n_points_contour as u32;

            // A leading contour without points wraps to 0xFFFF, as the encoder saw it
            let end_point = total_n_points as i32 - 1;
            bail_if!(end_point >= 65536, ErrorKind::ReconstructPointFailed);
            end_points.push(end_point as u16);
        }

        let flags = try_take(&mut self.flag_stream, total_n_points as usize)
            .or_kind(ErrorKind::ReconstructPointFailed)?;
        let points = decode_points(flags, &mut self.glyph_stream)?;

        let instruction_size: u16 = self.glyph_stream.try_get_255_u16()?;
        let instructions = try_take(&mut self.instruction_stream, instruction_size as usize)?;

        let bbox = if glyph_has_bbox {
            BBox::parse(&mut self.bbox_stream)?
        } else {
            BBox::from_points(&points)
        };

        Ok(SimpleGlyph {
            bbox,
            end_points,
            instructions,
            points,
            overlap,
        })
    }
}

fn loca_offset(glyf_length: usize) -> Result<u32> {
    match u32::try_from(glyf_length) {
        Ok(offset) => Ok(offset),
        Err(_) => bail!(ErrorKind::LocaSizeOverflow),
    }
}

/// Decode one triplet-encoded point delta from its flag and data bytes.
///
/// The low 7 bits of `flag` select how many data bytes follow and how the
/// deltas and their signs are packed.
fn decode_triplet(flag: u8, glyph_stream: &mut &[u8]) -> Result<(i32, i32)> {
    #[inline(always)]
    fn with_sign(flag: i32, baseval: i32) -> i32 {
        // Precondition: 0 <= baseval < 65536 (to avoid integer overflow)
        if (flag & 1) != 0 { baseval } else { -baseval }
    }

    let flag = (flag & 0x7f) as i32;
    let n_data_bytes: usize = if flag < 84 {
        1
    } else if flag < 120 {
        2
    } else if flag < 124 {
        3
    } else {
        4
    };
    let data = try_take(glyph_stream, n_data_bytes).or_kind(ErrorKind::ReconstructPointFailed)?;
    let b = |index: usize| data[index] as i32;

    let delta = if flag < 10 {
        (0, with_sign(flag, ((flag & 14) << 7) + b(0)))
    } else if flag < 20 {
        (with_sign(flag, (((flag - 10) & 14) << 7) + b(0)), 0)
    } else if flag < 84 {
        let b0: i32 = flag - 20;
        let b1: i32 = b(0);
        (
            with_sign(flag, 1 + (b0 & 0x30) + (b1 >> 4)),
            with_sign(flag >> 1, 1 + ((b0 & 0x0c) << 2) + (b1 & 0x0f)),
        )
    } else if flag < 120 {
        let b0: i32 = flag - 84;
        (
            with_sign(flag, 1 + ((b0 / 12) << 8) + b(0)),
            with_sign(flag >> 1, 1 + (((b0 % 12) >> 2) << 8) + b(1)),
        )
    } else if flag < 124 {
        let b2: i32 = b(1);
        (
            with_sign(flag, (b(0) << 4) + (b2 >> 4)),
            with_sign(flag >> 1, ((b2 & 0x0f) << 8) + b(2)),
        )
    } else {
        (
            with_sign(flag, (b(0) << 8) + b(1)),
            with_sign(flag >> 1, (b(2) << 8) + b(3)),
        )
    };
    Ok(delta)
}

/// Decode the points of a simple glyph: one flag byte per point, triplet data
/// from the glyph stream, deltas folded into absolute coordinates.
fn decode_points(flags: &[u8], glyph_stream: &mut &[u8]) -> Result<Vec<Point>> {
    // Every point consumes at least one data byte
    bail_if!(flags.len() > glyph_stream.len(), ErrorKind::ReconstructPointFailed);

    let mut points = Vec::with_capacity(flags.len());
    flags.iter().try_fold((0i32, 0i32), |(x, y), &flag| -> Result<(i32, i32)> {
        let (dx, dy) = decode_triplet(flag, glyph_stream)?;
        let (Some(x), Some(y)) = (x.checked_add(dx), y.checked_add(dy)) else {
            bail!(ErrorKind::ReconstructPointFailed);
        };
        points.push(Point {
            x,
            y,
            on_curve: (flag >> 7) == 0,
        });
        Ok((x, y))
    })?;
    Ok(points)
}

/// Write the flags and coordinate arrays of a simple glyph
fn write_glyph_points(points: &[Point], has_overlap_bit: bool, dst: &mut Vec<u8>) {
    let mut last_flag: Option<u8> = None;
    let mut repeat_count: u8 = 0;
    let mut last_x: i32 = 0;
    let mut last_y: i32 = 0;
    let mut x_bytes: Vec<u8> = Vec::with_capacity(points.len() * 2);
    let mut y_bytes: Vec<u8> = Vec::with_capacity(points.len() * 2);

    for (i, point) in points.iter().enumerate() {
        let mut flag: u8 = if point.on_curve { GLYF_ON_CURVE } else { 0 };
        if has_overlap_bit && i == 0 {
            flag |= OVERLAP_SIMPLE;
        }

        let dx: i32 = point.x.wrapping_sub(last_x);
        flag |= encode_coordinate(dx, GLYF_X_SHORT, GLYF_THIS_X_IS_SAME, &mut x_bytes);
        let dy: i32 = point.y.wrapping_sub(last_y);
        flag |= encode_coordinate(dy, GLYF_Y_SHORT, GLYF_THIS_Y_IS_SAME, &mut y_bytes);

        // A run of identical flags is written once with REPEAT set, followed
        // by the number of extra repetitions (at most 255).
        if last_flag == Some(flag) && repeat_count != 255 {
            let last = dst.len() - 1 - usize::from(repeat_count > 0);
            dst[last] |= GLYF_REPEAT;
            if repeat_count > 0 {
                dst.pop();
            }
            repeat_count += 1;
            dst.put_u8(repeat_count);
        } else {
            dst.put_u8(flag);
            repeat_count = 0;
        }

        last_x = point.x;
        last_y = point.y;
        last_flag = Some(flag);
    }

    dst.put_slice(&x_bytes);
    dst.put_slice(&y_bytes);
}

/// Append one coordinate delta and return the flag bits describing it
fn encode_coordinate(delta: i32, short_flag: u8, same_flag: u8, out: &mut Vec<u8>) -> u8 {
    if delta == 0 {
        same_flag
    } else if delta > -256 && delta < 256 {
        out.put_u8(delta.unsigned_abs() as u8);
        short_flag | if delta > 0 { same_flag } else { 0 }
    } else {
        // will always fit for valid input, but overflow is harmless
        out.put_i16(delta as i16);
        0
    }
}

/// Generate a loca table given a slice of loca offsets and an index format
///
/// See <https://developer.apple.com/fonts/TrueType-Reference-Manual/RM06/Chap6loca.html>
pub(crate) fn generate_loca_table(loca_values: &[u32], index_format: u16) -> Vec<u8> {
    if index_format != 0 {
        // loca long version. The actual local offset is stored.
        let mut loca_content = Vec::with_capacity(loca_values.len() * 4);
        for &value in loca_values {
            loca_content.put_u32(value);
        }
        loca_content
    } else {
        // loca short version. The actual local offset divided by 2 is stored.
        let mut loca_content = Vec::with_capacity(loca_values.len() * 2);
        for &value in loca_values {
            loca_content.put_u16((value >> 1) as u16);
        }
        loca_content
    }
}
