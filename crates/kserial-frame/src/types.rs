//! Data type tags.
//!
//! Every frame carries a 4-bit tag selecting how the payload is interpreted.
//! Tags 0-11 are numeric (element width 1, 2, 4 or 8 bytes) except `R0`;
//! `R0` and `R1`-`R4` are raw command channels with no element width.

use std::fmt;

/// Number of distinct type tags (4-bit field).
pub const TYPE_COUNT: usize = 16;

/// Payload element type carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    U64 = 3,
    I8 = 4,
    I16 = 5,
    I32 = 6,
    I64 = 7,
    R0 = 8,
    F16 = 9,
    F32 = 10,
    F64 = 11,
    R1 = 12,
    R2 = 13,
    R3 = 14,
    R4 = 15,
}

const ALL: [DataType; TYPE_COUNT] = [
    DataType::U8,
    DataType::U16,
    DataType::U32,
    DataType::U64,
    DataType::I8,
    DataType::I16,
    DataType::I32,
    DataType::I64,
    DataType::R0,
    DataType::F16,
    DataType::F32,
    DataType::F64,
    DataType::R1,
    DataType::R2,
    DataType::R3,
    DataType::R4,
];

const WIDTHS: [usize; TYPE_COUNT] = [1, 2, 4, 8, 1, 2, 4, 8, 0, 2, 4, 8, 0, 0, 0, 0];

const NAMES: [&str; TYPE_COUNT] = [
    "U8", "U16", "U32", "U64", "I8", "I16", "I32", "I64", "R0", "F16", "F32", "F64", "R1", "R2",
    "R3", "R4",
];

// Right-aligned column width used when printing integer elements.
const DISPLAY_WIDTHS: [usize; TYPE_COUNT] = [4, 6, 11, 20, 4, 6, 11, 20, 0, 0, 0, 0, 0, 0, 0, 0];

impl DataType {
    /// Resolve a tag. Only the low 4 bits are considered.
    pub fn from_tag(tag: u8) -> Self {
        ALL[(tag & 0x0F) as usize]
    }

    /// All sixteen tags in wire order.
    pub fn all() -> &'static [DataType; TYPE_COUNT] {
        &ALL
    }

    /// The 4-bit wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Element width in bytes; 0 for raw command channels.
    pub fn width(self) -> usize {
        WIDTHS[self as usize]
    }

    /// Short upper-case name (`"U8"`, `"F32"`, `"R1"`, ...).
    pub fn name(self) -> &'static str {
        NAMES[self as usize]
    }

    /// Column width for integer display, 0 where no fixed width applies.
    pub fn display_width(self) -> usize {
        DISPLAY_WIDTHS[self as usize]
    }

    /// True for `R0`..`R4`, whose count is a raw byte length.
    pub fn is_raw(self) -> bool {
        self.width() == 0
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::F16 | DataType::F32 | DataType::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::I8 | DataType::I16 | DataType::I32 | DataType::I64
        )
    }

    /// Payload length in bytes for `element_count` elements of this type.
    ///
    /// Types narrower than two bytes (including raw tags) count bytes directly.
    /// Returns `None` if the length does not fit in `usize`.
    pub fn payload_bytes(self, element_count: usize) -> Option<usize> {
        let width = self.width();
        if width > 1 {
            element_count.checked_mul(width)
        } else {
            Some(element_count)
        }
    }

    /// Inverse of [`DataType::payload_bytes`].
    pub fn element_count(self, payload_bytes: usize) -> usize {
        let width = self.width();
        if width > 1 {
            payload_bytes / width
        } else {
            payload_bytes
        }
    }

    /// Parse a case-insensitive type name. Accepts the short names and the
    /// long forms (`uint8`, `int16`, `half`, `float`, `double`).
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        if let Some(pos) = NAMES.iter().position(|n| *n == upper) {
            return Some(ALL[pos]);
        }
        let ty = match upper.as_str() {
            "UINT8" => DataType::U8,
            "UINT16" => DataType::U16,
            "UINT32" => DataType::U32,
            "UINT64" => DataType::U64,
            "INT8" => DataType::I8,
            "INT16" => DataType::I16,
            "INT32" => DataType::I32,
            "INT64" => DataType::I64,
            "HALF" => DataType::F16,
            "FLOAT" => DataType::F32,
            "DOUBLE" => DataType::F64,
            _ => return None,
        };
        Some(ty)
    }
}

impl From<u8> for DataType {
    fn from(tag: u8) -> Self {
        DataType::from_tag(tag)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element width for a raw tag value. Total over `u8`; upper bits are ignored.
pub fn width_of(tag: u8) -> usize {
    DataType::from_tag(tag).width()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_registry() {
        let expected = [1, 2, 4, 8, 1, 2, 4, 8, 0, 2, 4, 8, 0, 0, 0, 0];
        for tag in 0..16u8 {
            assert_eq!(width_of(tag), expected[tag as usize], "tag {tag}");
        }
    }

    #[test]
    fn tag_is_masked_to_low_nibble() {
        assert_eq!(width_of(0x13), 8);
        assert_eq!(DataType::from_tag(0xFA), DataType::F32);
        assert_eq!(DataType::from(0x80), DataType::U8);
    }

    #[test]
    fn tag_roundtrip() {
        for ty in DataType::all() {
            assert_eq!(DataType::from_tag(ty.tag()), *ty);
        }
    }

    #[test]
    fn raw_channels_have_no_width() {
        for ty in [
            DataType::R0,
            DataType::R1,
            DataType::R2,
            DataType::R3,
            DataType::R4,
        ] {
            assert!(ty.is_raw());
            assert_eq!(ty.payload_bytes(5), Some(5));
            assert_eq!(ty.element_count(5), 5);
        }
    }

    #[test]
    fn payload_bytes_scales_by_width() {
        assert_eq!(DataType::U8.payload_bytes(3), Some(3));
        assert_eq!(DataType::I16.payload_bytes(3), Some(6));
        assert_eq!(DataType::F64.payload_bytes(2), Some(16));
        assert_eq!(DataType::U64.payload_bytes((usize::MAX >> 3) + 2), None);
        assert_eq!(DataType::R4.payload_bytes(usize::MAX), Some(usize::MAX));
        assert_eq!(DataType::F32.element_count(12), 3);
        assert_eq!(DataType::U32.element_count(7), 1);
    }

    #[test]
    fn names_and_parsing() {
        assert_eq!(DataType::F16.name(), "F16");
        assert_eq!(DataType::R3.to_string(), "R3");
        assert_eq!(DataType::from_name("u16"), Some(DataType::U16));
        assert_eq!(DataType::from_name("double"), Some(DataType::F64));
        assert_eq!(DataType::from_name(" r2 "), Some(DataType::R2));
        assert_eq!(DataType::from_name("u128"), None);
    }

    #[test]
    fn classification() {
        assert!(DataType::I32.is_signed());
        assert!(!DataType::U32.is_signed());
        assert!(DataType::F16.is_float());
        assert_eq!(DataType::I64.display_width(), 20);
        assert_eq!(DataType::F32.display_width(), 0);
    }
}
