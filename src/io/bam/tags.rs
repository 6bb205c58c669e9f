//! Optional tags (auxiliary data).
//!
//! Optional tags store additional information about alignments such as:
//! - Edit distance (NM:i)
//! - Alignment score (AS:i)
//! - Read group (RG:Z)
//! - Many others
//!
//! # Format
//!
//! BAM encodes each tag as a 2-byte name, a 1-byte type code and a value whose
//! width depends on the type. SAM writes `NAME:TYPE:VALUE`.
//!
//! | Type | BAM width | SAM type | Value |
//! |------|-----------|----------|-------|
//! | A    | 1         | A        | printable character |
//! | c C  | 1         | i        | signed/unsigned integer |
//! | s S  | 2         | i        | signed/unsigned integer |
//! | i I  | 4         | i        | signed/unsigned integer |
//! | f    | 4         | f        | single-precision float |
//! | Z    | NUL-terminated | Z   | string |
//! | H    | NUL-terminated | H   | hex string |
//! | B    | subtype + count + values | B | numeric array |
//!
//! All integer widths decode to [`TagValue::Int`], so a record read from BAM
//! compares equal to the same record read from SAM.

use super::error::RecordError;
use std::collections::BTreeMap;
use std::fmt;

/// Tag value types.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// Character (A): Single printable character
    Char(u8),
    /// Integer (i): Signed integer (any width)
    Int(i64),
    /// Float (f): IEEE 754 single-precision float
    Float(f32),
    /// String (Z)
    String(String),
    /// Hex string (H)
    Hex(String),
    /// Array (B): Typed array of numbers
    Array(ArrayValue),
}

/// Array value types for tag arrays (B type).
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    /// Array of signed 8-bit integers
    Int8(Vec<i8>),
    /// Array of unsigned 8-bit integers
    UInt8(Vec<u8>),
    /// Array of signed 16-bit integers
    Int16(Vec<i16>),
    /// Array of unsigned 16-bit integers
    UInt16(Vec<u16>),
    /// Array of signed 32-bit integers
    Int32(Vec<i32>),
    /// Array of unsigned 32-bit integers
    UInt32(Vec<u32>),
    /// Array of 32-bit floats
    Float(Vec<f32>),
}

impl ArrayValue {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Int8(v) => v.len(),
            ArrayValue::UInt8(v) => v.len(),
            ArrayValue::Int16(v) => v.len(),
            ArrayValue::UInt16(v) => v.len(),
            ArrayValue::Int32(v) => v.len(),
            ArrayValue::UInt32(v) => v.len(),
            ArrayValue::Float(v) => v.len(),
        }
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn subtype(&self) -> char {
        match self {
            ArrayValue::Int8(_) => 'c',
            ArrayValue::UInt8(_) => 'C',
            ArrayValue::Int16(_) => 's',
            ArrayValue::UInt16(_) => 'S',
            ArrayValue::Int32(_) => 'i',
            ArrayValue::UInt32(_) => 'I',
            ArrayValue::Float(_) => 'f',
        }
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Char(c) => write!(f, "A:{}", *c as char),
            TagValue::Int(i) => write!(f, "i:{}", i),
            TagValue::Float(fl) => write!(f, "f:{}", fl),
            TagValue::String(s) => write!(f, "Z:{}", s),
            TagValue::Hex(h) => write!(f, "H:{}", h),
            TagValue::Array(arr) => {
                let values = match arr {
                    ArrayValue::Int8(v) => join(v),
                    ArrayValue::UInt8(v) => join(v),
                    ArrayValue::Int16(v) => join(v),
                    ArrayValue::UInt16(v) => join(v),
                    ArrayValue::Int32(v) => join(v),
                    ArrayValue::UInt32(v) => join(v),
                    ArrayValue::Float(v) => join(v),
                };
                if values.is_empty() {
                    write!(f, "B:{}", arr.subtype())
                } else {
                    write!(f, "B:{},{}", arr.subtype(), values)
                }
            }
        }
    }
}

/// Optional tags of one record, keyed by two-character name.
///
/// Keys are unique; iteration is in key order, so two records with the same
/// tags compare equal regardless of the order they were written in.
///
/// # Example
///
/// ```
/// use alnseek::io::bam::{Tags, TagValue};
///
/// let mut tags = Tags::new();
/// tags.insert(*b"NM", TagValue::Int(5)).unwrap();
/// assert_eq!(tags.edit_distance(), Some(5));
/// assert!(tags.insert(*b"NM", TagValue::Int(6)).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tags {
    entries: BTreeMap<[u8; 2], TagValue>,
}

impl Tags {
    /// Create empty tags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag, rejecting a name that is already present.
    pub fn insert(&mut self, name: [u8; 2], value: TagValue) -> Result<(), RecordError> {
        if self.entries.contains_key(&name) {
            return Err(RecordError::DuplicateTag { tag: name });
        }
        self.entries.insert(name, value);
        Ok(())
    }

    /// Remove a tag, returning its value.
    pub fn remove(&mut self, name: &[u8; 2]) -> Option<TagValue> {
        self.entries.remove(name)
    }

    /// Get a tag value by name.
    pub fn get(&self, name: &[u8; 2]) -> Option<&TagValue> {
        self.entries.get(name)
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8; 2], &TagValue)> {
        self.entries.iter()
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if tags are empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an integer tag value.
    pub fn get_int(&self, name: &[u8; 2]) -> Option<i64> {
        match self.get(name)? {
            TagValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get a string tag value.
    pub fn get_string(&self, name: &[u8; 2]) -> Option<&str> {
        match self.get(name)? {
            TagValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get a character tag value.
    pub fn get_char(&self, name: &[u8; 2]) -> Option<u8> {
        match self.get(name)? {
            TagValue::Char(c) => Some(*c),
            _ => None,
        }
    }

    /// Get a float tag value.
    pub fn get_float(&self, name: &[u8; 2]) -> Option<f32> {
        match self.get(name)? {
            TagValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get an array tag value.
    pub fn get_array(&self, name: &[u8; 2]) -> Option<&ArrayValue> {
        match self.get(name)? {
            TagValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Edit distance to the reference (NM).
    pub fn edit_distance(&self) -> Option<i64> {
        self.get_int(b"NM")
    }

    /// Alignment score (AS).
    pub fn alignment_score(&self) -> Option<i64> {
        self.get_int(b"AS")
    }

    /// Read group (RG).
    pub fn read_group(&self) -> Option<&str> {
        self.get_string(b"RG")
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}{}:{}", name[0] as char, name[1] as char, value)?;
        }
        Ok(())
    }
}

fn take<'a>(
    data: &'a [u8],
    cursor: &mut usize,
    n: usize,
    context: &str,
) -> Result<&'a [u8], RecordError> {
    let end = cursor.checked_add(n).filter(|&end| end <= data.len()).ok_or_else(|| {
        RecordError::UnexpectedEof {
            context: context.to_string(),
            expected: n,
            actual: data.len().saturating_sub(*cursor),
        }
    })?;
    let slice = &data[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn take_array<const N: usize>(
    data: &[u8],
    cursor: &mut usize,
    context: &str,
) -> Result<[u8; N], RecordError> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(data, cursor, N, context)?);
    Ok(out)
}

fn take_nul_string(data: &[u8], cursor: &mut usize, field: &str) -> Result<String, RecordError> {
    let rest = &data[*cursor..];
    let len = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| RecordError::MissingNulTerminator {
            field: field.to_string(),
            offset: *cursor,
        })?;
    let s = std::str::from_utf8(&rest[..len])
        .map_err(|source| RecordError::InvalidUtf8 {
            field: field.to_string(),
            source,
        })?
        .to_string();
    *cursor += len + 1;
    Ok(s)
}

fn parse_binary_array(data: &[u8], cursor: &mut usize) -> Result<ArrayValue, RecordError> {
    let [subtype] = take_array::<1>(data, cursor, "array subtype")?;
    let count = u32::from_le_bytes(take_array::<4>(data, cursor, "array count")?) as usize;

    let width = match subtype {
        b'c' | b'C' => 1,
        b's' | b'S' => 2,
        b'i' | b'I' | b'f' => 4,
        _ => return Err(RecordError::InvalidArraySubtype { subtype }),
    };
    let bytes_len = count.checked_mul(width).ok_or(RecordError::UnexpectedEof {
        context: "array values".to_string(),
        expected: usize::MAX,
        actual: data.len() - *cursor,
    })?;
    let bytes = take(data, cursor, bytes_len, "array values")?;

    Ok(match subtype {
        b'c' => ArrayValue::Int8(bytes.iter().map(|&b| b as i8).collect()),
        b'C' => ArrayValue::UInt8(bytes.to_vec()),
        b's' => ArrayValue::Int16(
            bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect(),
        ),
        b'S' => ArrayValue::UInt16(
            bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect(),
        ),
        b'i' => ArrayValue::Int32(
            bytes.chunks_exact(4).map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
        ),
        b'I' => ArrayValue::UInt32(
            bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
        ),
        _ => ArrayValue::Float(
            bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
        ),
    })
}

fn parse_binary_value(
    data: &[u8],
    cursor: &mut usize,
    name: [u8; 2],
    type_code: u8,
) -> Result<TagValue, RecordError> {
    Ok(match type_code {
        b'A' => TagValue::Char(take_array::<1>(data, cursor, "character tag")?[0]),
        b'c' => TagValue::Int(take_array::<1>(data, cursor, "int8 tag")?[0] as i8 as i64),
        b'C' => TagValue::Int(take_array::<1>(data, cursor, "uint8 tag")?[0] as i64),
        b's' => TagValue::Int(i16::from_le_bytes(take_array(data, cursor, "int16 tag")?) as i64),
        b'S' => TagValue::Int(u16::from_le_bytes(take_array(data, cursor, "uint16 tag")?) as i64),
        b'i' => TagValue::Int(i32::from_le_bytes(take_array(data, cursor, "int32 tag")?) as i64),
        b'I' => TagValue::Int(u32::from_le_bytes(take_array(data, cursor, "uint32 tag")?) as i64),
        b'f' => TagValue::Float(f32::from_le_bytes(take_array(data, cursor, "float tag")?)),
        b'Z' => TagValue::String(take_nul_string(data, cursor, "string tag")?),
        b'H' => TagValue::Hex(take_nul_string(data, cursor, "hex tag")?),
        b'B' => TagValue::Array(parse_binary_array(data, cursor)?),
        _ => return Err(RecordError::InvalidTagType { tag: name, type_code }),
    })
}

/// Parse the tag section at the end of a BAM record.
pub fn parse_tags(data: &[u8]) -> Result<Tags, RecordError> {
    let mut tags = Tags::new();
    let mut cursor = 0;

    while cursor < data.len() {
        let name = take_array::<2>(data, &mut cursor, "tag name")?;
        let [type_code] = take_array::<1>(data, &mut cursor, "tag type")?;
        let value = parse_binary_value(data, &mut cursor, name, type_code)?;
        tags.insert(name, value)?;
    }

    Ok(tags)
}

fn parse_text_array(text: &str, field: &str) -> Result<ArrayValue, RecordError> {
    let invalid = || RecordError::InvalidTag {
        text: field.to_string(),
    };

    let mut parts = text.split(',');
    let subtype = parts.next().ok_or_else(invalid)?;

    fn collect<T: std::str::FromStr>(
        parts: std::str::Split<'_, char>,
        invalid: impl Fn() -> RecordError,
    ) -> Result<Vec<T>, RecordError> {
        parts.map(|p| p.parse::<T>().map_err(|_| invalid())).collect()
    }

    Ok(match subtype {
        "c" => ArrayValue::Int8(collect(parts, invalid)?),
        "C" => ArrayValue::UInt8(collect(parts, invalid)?),
        "s" => ArrayValue::Int16(collect(parts, invalid)?),
        "S" => ArrayValue::UInt16(collect(parts, invalid)?),
        "i" => ArrayValue::Int32(collect(parts, invalid)?),
        "I" => ArrayValue::UInt32(collect(parts, invalid)?),
        "f" => ArrayValue::Float(collect(parts, invalid)?),
        other => {
            return Err(RecordError::InvalidArraySubtype {
                subtype: other.bytes().next().unwrap_or(b' '),
            })
        }
    })
}

/// Parse one SAM optional field of the form `NAME:TYPE:VALUE`.
pub fn parse_sam_tag(field: &str) -> Result<([u8; 2], TagValue), RecordError> {
    let invalid = || RecordError::InvalidTag {
        text: field.to_string(),
    };

    let bytes = field.as_bytes();
    if bytes.len() < 5 || bytes[2] != b':' || bytes[4] != b':' {
        return Err(invalid());
    }
    let name = [bytes[0], bytes[1]];
    if !name[0].is_ascii_alphabetic() || !name[1].is_ascii_alphanumeric() {
        return Err(invalid());
    }
    let type_code = bytes[3];
    let value = &field[5..];

    let value = match type_code {
        b'A' => match value.as_bytes() {
            [c] if c.is_ascii_graphic() => TagValue::Char(*c),
            _ => return Err(invalid()),
        },
        b'i' => TagValue::Int(value.parse().map_err(|_| invalid())?),
        b'f' => TagValue::Float(value.parse().map_err(|_| invalid())?),
        b'Z' => TagValue::String(value.to_string()),
        b'H' => {
            if value.len() % 2 != 0 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            TagValue::Hex(value.to_string())
        }
        b'B' => TagValue::Array(parse_text_array(value, field)?),
        _ => return Err(RecordError::InvalidTagType { tag: name, type_code }),
    };

    Ok((name, value))
}
