/* Copyright 2015 Google Inc. All Rights Reserved.

   Distributed under MIT license.
   See file LICENSE for detail or copy at https://opensource.org/licenses/MIT
*/

//! Bounds checked reads on top of [`bytes::Buf`]
//!
//! A `&[u8]` implements `Buf`, so a mutable slice binding is the cursor: every
//! successful read shrinks the slice from the front. All reads check the
//! remaining length first and fail with [`ErrorKind::BufferReadFailed`]
//! instead of panicking.

use bytes::Buf;
use font_types::Tag;

use crate::error::{DecodeError, ErrorKind, Result, bail, bail_if};

pub(crate) trait BufReadExt: Buf {
    fn try_get_u24(&mut self) -> Result<u32> {
        bail_if!(self.remaining() < 3, ErrorKind::BufferReadFailed);
        let hi = self.get_u8() as u32;
        let lo = self.get_u16() as u32;
        Ok((hi << 16) | lo)
    }

    fn try_get_tag(&mut self) -> Result<Tag> {
        Ok(Tag::from_u32(self.try_get_u32()?))
    }

    /// 255UInt16, based on section 6.1.1 of the MicroType Express draft spec
    fn try_get_255_u16(&mut self) -> Result<u16> {
        const WORD_CODE: u8 = 253;
        const ONE_MORE_BYTE_CODE_2: u8 = 254;
        const ONE_MORE_BYTE_CODE_1: u8 = 255;
        const LOWEST_U_CODE: u16 = 253;

        let code = self.try_get_u8()?;
        match code {
            WORD_CODE => Ok(self.try_get_u16()?),
            ONE_MORE_BYTE_CODE_1 => Ok(self.try_get_u8()? as u16 + LOWEST_U_CODE),
            ONE_MORE_BYTE_CODE_2 => Ok(self.try_get_u8()? as u16 + LOWEST_U_CODE * 2),
            _ => Ok(code as u16),
        }
    }

    /// UIntBase128: big endian, 7 bits per byte, at most 5 bytes
    fn try_get_base128_u32(&mut self) -> Result<u32> {
        let mut result: u32 = 0;
        for i in 0..5 {
            let code = self.try_get_u8()?;
            // Leading zeros are invalid.
            bail_if!(i == 0 && code == 0x80, ErrorKind::VarintOverflow);
            // If any of the top seven bits are set then we're about to overflow.
            bail_if!(result & 0xfe000000 != 0, ErrorKind::VarintOverflow);
            result = (result << 7) | (code & 0x7f) as u32;
            if code & 0x80 == 0 {
                return Ok(result);
            }
        }
        // Continuation bit still set on the fifth byte
        bail!(ErrorKind::VarintOverflow)
    }

    fn try_skip(&mut self, n_bytes: usize) -> Result<()> {
        bail_if!(n_bytes > self.remaining(), ErrorKind::BufferReadFailed);
        self.advance(n_bytes);
        Ok(())
    }
}

impl<B: Buf + ?Sized> BufReadExt for B {}

/// Split the first `n_bytes` off a slice cursor without copying.
pub(crate) fn try_take<'a>(input: &mut &'a [u8], n_bytes: usize) -> Result<&'a [u8]> {
    let Some((head, tail)) = input.split_at_checked(n_bytes) else {
        return Err(DecodeError::new(ErrorKind::BufferReadFailed));
    };
    *input = tail;
    Ok(head)
}
