//! Bit range parsing and the mask arithmetic behind field reads and writes.

use nom::{
    bytes::complete::tag,
    character::complete::digit1,
    combinator::{all_consuming, map_res, opt},
    sequence::preceded,
    IResult,
};

use crate::{catalog::FieldDescriptor, error::BitsError};

pub const REGISTER_BITS: u32 = 32;

/// Parses `start[-end]` in decimal into `(startbit, bitcount)`.
///
/// A reversed range is swapped, so `7-4` and `4-7` are the same field.
pub fn parse_bits(spec: &str) -> Result<(u32, u32), BitsError> {
    let (_, (start, end)) =
        all_consuming(bit_range)(spec).map_err(|_| BitsError::Syntax(spec.to_string()))?;
    if start >= REGISTER_BITS {
        return Err(BitsError::StartOutOfRange { start });
    }
    let end = end.unwrap_or(start);
    let (start, end) = if end < start {
        (end, start)
    } else {
        (start, end)
    };
    let count = end - start + 1;
    if count > REGISTER_BITS - start {
        return Err(BitsError::TooWide { start, count });
    }
    Ok((start, count))
}

/// Does `spec` look like a bit range rather than a field name?
pub fn is_bit_range(spec: &str) -> bool {
    spec.starts_with(|c: char| c.is_ascii_digit())
}

fn bit_range(input: &str) -> IResult<&str, (u32, Option<u32>)> {
    let (input, start) = bit_number(input)?;
    let (input, end) = opt(preceded(tag("-"), bit_number))(input)?;
    Ok((input, (start, end)))
}

fn bit_number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse)(input)
}

/// `width` low bits set; `width` may be the full 32.
pub(crate) fn low_mask(width: u32) -> u32 {
    match width {
        0 => 0,
        w if w >= REGISTER_BITS => u32::MAX,
        w => u32::MAX >> (REGISTER_BITS - w),
    }
}

impl FieldDescriptor {
    pub fn end_bit(&self) -> u32 {
        self.startbit + self.bitcount - 1
    }

    pub fn mask(&self) -> u32 {
        low_mask(self.bitcount) << self.startbit
    }

    pub fn max_value(&self) -> u32 {
        self.mask() >> self.startbit
    }

    pub fn extract(&self, raw: u32) -> u32 {
        (raw & self.mask()) >> self.startbit
    }

    /// Read-modify-write of this field inside `raw`, `None` if `value` does not fit.
    pub fn insert(&self, raw: u32, value: u32) -> Option<u32> {
        if value > self.max_value() {
            return None;
        }
        let mask = self.mask();
        Some((raw & !mask) | ((value << self.startbit) & mask))
    }
}
