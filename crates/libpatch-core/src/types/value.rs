//! Typed patch values and their byte encodings.

use std::fmt;
use std::str::FromStr;

use crate::error::{PatchError, PatchResult};

/// ARM `BX LR`: return from the current function.
pub const ARM_RET: [u8; 4] = [0x1E, 0xFF, 0x2F, 0xE1];

/// ARM `B` to the following instruction, used as a 4-byte no-op.
pub const ARM_NOP: [u8; 4] = [0x00, 0x00, 0x00, 0xEA];

/// Marker written by `put_string("")`: an all-ones dword.
pub const NO_STRING_SENTINEL: i32 = -1;

/// A value to be written into the target
///
/// Every primitive is encoded big-endian, except [`PatchValue::LittleDword`]
/// and raw [`PatchValue::Bytes`], which keep their own order.
///
/// ## Example
///
/// ```rust
/// use libpatch_core::types::PatchValue;
///
/// assert_eq!(PatchValue::Dword(0x01020304).encode(), vec![1, 2, 3, 4]);
/// assert_eq!(PatchValue::LittleDword(0x01020304).encode(), vec![4, 3, 2, 1]);
/// assert_eq!(PatchValue::String("hi".into()).encode(), b"hi\0".to_vec());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchValue
{
    /// One byte
    Byte(u8),
    /// Two bytes, big-endian
    Word(i16),
    /// Four bytes, big-endian
    Dword(i32),
    /// Four bytes, little-endian
    LittleDword(i32),
    /// Two big-endian dwords: `lo` at the offset, `hi` four bytes after it
    DoubleDword
    {
        /// Dword stored first in memory
        lo: i32,
        /// Dword stored second in memory
        hi: i32,
    },
    /// Eight bytes, big-endian
    Qword(i64),
    /// String bytes plus a NUL terminator, or the all-ones dword when empty
    String(String),
    /// Raw bytes, written in the given order
    Bytes(Vec<u8>),
}

impl PatchValue
{
    /// Encode into a fresh byte sequence
    ///
    /// The returned buffer is owned by the caller; no scratch space is shared
    /// between calls.
    pub fn encode(&self) -> Vec<u8>
    {
        match self {
            PatchValue::Byte(value) => vec![*value],
            PatchValue::Word(value) => value.to_be_bytes().to_vec(),
            PatchValue::Dword(value) => value.to_be_bytes().to_vec(),
            PatchValue::LittleDword(value) => value.to_le_bytes().to_vec(),
            PatchValue::DoubleDword { lo, hi } => {
                let mut bytes = Vec::with_capacity(8);
                bytes.extend_from_slice(&lo.to_be_bytes());
                bytes.extend_from_slice(&hi.to_be_bytes());
                bytes
            }
            PatchValue::Qword(value) => value.to_be_bytes().to_vec(),
            PatchValue::String(value) if value.is_empty() => NO_STRING_SENTINEL.to_be_bytes().to_vec(),
            PatchValue::String(value) => {
                let mut bytes = Vec::with_capacity(value.len() + 1);
                bytes.extend_from_slice(value.as_bytes());
                bytes.push(0);
                bytes
            }
            PatchValue::Bytes(bytes) => bytes.clone(),
        }
    }

    /// The kind of this value
    pub fn kind(&self) -> ValueKind
    {
        match self {
            PatchValue::Byte(_) => ValueKind::Byte,
            PatchValue::Word(_) => ValueKind::Word,
            PatchValue::Dword(_) => ValueKind::Dword,
            PatchValue::LittleDword(_) => ValueKind::LittleDword,
            PatchValue::DoubleDword { .. } => ValueKind::DoubleDword,
            PatchValue::Qword(_) => ValueKind::Qword,
            PatchValue::String(_) => ValueKind::String,
            PatchValue::Bytes(_) => ValueKind::Bytes,
        }
    }
}

impl fmt::Display for PatchValue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            PatchValue::Byte(value) => write!(f, "0x{value:02x}"),
            PatchValue::Word(value) => write!(f, "0x{value:04x}"),
            PatchValue::Dword(value) | PatchValue::LittleDword(value) => write!(f, "0x{value:08x}"),
            PatchValue::DoubleDword { lo, hi } => write!(f, "(hi 0x{hi:08x}, lo 0x{lo:08x})"),
            PatchValue::Qword(value) => write!(f, "0x{value:016x}"),
            PatchValue::String(value) => write!(f, "{value:?}"),
            PatchValue::Bytes(bytes) => f.write_str(&format_hex(bytes)),
        }
    }
}

/// The shape of a value, without the value itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind
{
    /// See [`PatchValue::Byte`]
    Byte,
    /// See [`PatchValue::Word`]
    Word,
    /// See [`PatchValue::Dword`]
    Dword,
    /// See [`PatchValue::LittleDword`]
    LittleDword,
    /// See [`PatchValue::DoubleDword`]
    DoubleDword,
    /// See [`PatchValue::Qword`]
    Qword,
    /// See [`PatchValue::String`]
    String,
    /// See [`PatchValue::Bytes`]
    Bytes,
}

impl ValueKind
{
    /// Encoded width in bytes, or `None` for variable-width kinds
    pub const fn width(self) -> Option<usize>
    {
        match self {
            ValueKind::Byte => Some(1),
            ValueKind::Word => Some(2),
            ValueKind::Dword | ValueKind::LittleDword => Some(4),
            ValueKind::DoubleDword | ValueKind::Qword => Some(8),
            ValueKind::String | ValueKind::Bytes => None,
        }
    }

    /// Parse a textual value of this kind
    ///
    /// Integers accept `0x` hex or decimal (negative decimals included).
    /// `DoubleDword` takes `lo,hi`; `Bytes` takes a hex-pair string.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the text does not fit the kind.
    pub fn parse_value(self, text: &str) -> PatchResult<PatchValue>
    {
        let value = match self {
            ValueKind::Byte => PatchValue::Byte(parse_int::<u8>(text)?),
            ValueKind::Word => PatchValue::Word(parse_int::<u16>(text)? as i16),
            ValueKind::Dword => PatchValue::Dword(parse_int::<u32>(text)? as i32),
            ValueKind::LittleDword => PatchValue::LittleDword(parse_int::<u32>(text)? as i32),
            ValueKind::DoubleDword => {
                let (lo, hi) = text.split_once(',').ok_or_else(|| {
                    PatchError::InvalidArgument(format!("expected 'lo,hi' for a double dword, got '{text}'"))
                })?;
                PatchValue::DoubleDword {
                    lo: parse_int::<u32>(lo.trim())? as i32,
                    hi: parse_int::<u32>(hi.trim())? as i32,
                }
            }
            ValueKind::Qword => PatchValue::Qword(parse_int::<u64>(text)? as i64),
            ValueKind::String => PatchValue::String(text.to_string()),
            ValueKind::Bytes => PatchValue::Bytes(parse_hex_bytes(text)?),
        };
        Ok(value)
    }
}

impl FromStr for ValueKind
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "byte" | "u8" => Ok(ValueKind::Byte),
            "word" | "i16" => Ok(ValueKind::Word),
            "dword" | "i32" => Ok(ValueKind::Dword),
            "little-dword" | "ldword" => Ok(ValueKind::LittleDword),
            "double-dword" | "ddword" => Ok(ValueKind::DoubleDword),
            "qword" | "i64" => Ok(ValueKind::Qword),
            "string" | "str" => Ok(ValueKind::String),
            "bytes" | "hex" => Ok(ValueKind::Bytes),
            _ => Err(format!(
                "Unknown value kind: {s}. Use byte, word, dword, little-dword, double-dword, qword, string or bytes"
            )),
        }
    }
}

/// Integer types accepted by [`parse_int`]
pub trait ParseRadix: Sized
{
    /// `from_str_radix` for the implementing type
    fn from_radix(text: &str, radix: u32) -> Result<Self, std::num::ParseIntError>;
    /// Reinterpret a negative value parsed as `i64`
    fn from_negative(value: i64) -> Option<Self>;
}

macro_rules! impl_parse_radix {
    ($($unsigned:ty => $signed:ty),*) => {
        $(
            impl ParseRadix for $unsigned
            {
                fn from_radix(text: &str, radix: u32) -> Result<Self, std::num::ParseIntError>
                {
                    <$unsigned>::from_str_radix(text, radix)
                }

                fn from_negative(value: i64) -> Option<Self>
                {
                    <$signed>::try_from(value).ok().map(|v| v as $unsigned)
                }
            }
        )*
    };
}

impl_parse_radix!(u8 => i8, u16 => i16, u32 => i32, u64 => i64);

impl ParseRadix for i64
{
    /// Hex is read as a 64-bit pattern, so `0xfffffffffffffff0` is `-16`
    fn from_radix(text: &str, radix: u32) -> Result<Self, std::num::ParseIntError>
    {
        if radix == 16 {
            u64::from_str_radix(text, radix).map(|v| v as i64)
        } else {
            i64::from_str_radix(text, radix)
        }
    }

    fn from_negative(value: i64) -> Option<Self>
    {
        Some(value)
    }
}

/// Parse an integer written as `0x` hex or decimal, optionally negative
///
/// For unsigned targets a negative number is stored as its two's complement
/// bit pattern, so `parse_int::<u32>("-1")` is `0xffff_ffff`. Module offsets
/// parse as `i64`, where `-0x10` and `-16` both mean sixteen bytes below the
/// base.
///
/// ```rust
/// use libpatch_core::types::parse_int;
///
/// assert_eq!(parse_int::<u64>("0x1f00").unwrap(), 0x1f00);
/// assert_eq!(parse_int::<u64>("4096").unwrap(), 4096);
/// assert_eq!(parse_int::<u32>("-1").unwrap(), u32::MAX);
/// assert_eq!(parse_int::<i64>("-0x10").unwrap(), -16);
/// ```
///
/// ## Errors
///
/// `InvalidArgument` if the text is not a number of the requested width.
pub fn parse_int<T: ParseRadix>(text: &str) -> PatchResult<T>
{
    let text = text.trim();
    let invalid = || PatchError::InvalidArgument(format!("invalid number '{text}'"));

    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (radix, digits) = match unsigned.strip_prefix("0x").or_else(|| unsigned.strip_prefix("0X")) {
        Some(hex) => (16, hex),
        None => (10, unsigned),
    };
    if digits.starts_with(['+', '-']) {
        return Err(invalid());
    }

    if negative {
        let magnitude = u64::from_str_radix(digits, radix).map_err(|_| invalid())?;
        let value = 0i64.checked_sub_unsigned(magnitude).ok_or_else(invalid)?;
        return T::from_negative(value).ok_or_else(invalid);
    }
    T::from_radix(digits, radix).map_err(|_| invalid())
}

/// Decode a hex-pair string into bytes, keeping input order
///
/// Accepts space-separated octets (`"1E FF 2F E1"`) or the compact form
/// (`"1EFF2FE1"`).
///
/// ```rust
/// use libpatch_core::types::parse_hex_bytes;
///
/// assert_eq!(parse_hex_bytes("1E FF 2F E1").unwrap(), vec![0x1e, 0xff, 0x2f, 0xe1]);
/// assert_eq!(parse_hex_bytes("00000 0EA").unwrap(), vec![0x00, 0x00, 0x00, 0xea]);
/// assert!(parse_hex_bytes("1E F").is_err());
/// ```
///
/// ## Errors
///
/// `InvalidArgument` for an empty string, an odd number of digits, or a
/// non-hex character.
pub fn parse_hex_bytes(text: &str) -> PatchResult<Vec<u8>>
{
    let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(PatchError::InvalidArgument(format!(
            "expected whole hex-pair octets, got '{text}'"
        )));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let high = pair[0].to_digit(16);
            let low = pair[1].to_digit(16);
            match (high, low) {
                // Both digits are < 16, so the octet fits in a u8.
                (Some(high), Some(low)) => Ok(((high << 4) | low) as u8),
                _ => Err(PatchError::InvalidArgument(format!(
                    "invalid hex octet '{}{}' in '{text}'",
                    pair[0], pair[1]
                ))),
            }
        })
        .collect()
}

/// Format bytes as space-separated upper-case hex pairs
pub fn format_hex(bytes: &[u8]) -> String
{
    bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ")
}
