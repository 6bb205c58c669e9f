//! CIGAR (Compact Idiosyncratic Gapped Alignment Report) parsing.
//!
//! CIGAR strings describe how a read aligns to the reference, including
//! matches, insertions, deletions, and other operations.
//!
//! # Encodings
//!
//! - BAM: 32-bit little-endian integers, low 4 bits operation, high 28 bits length
//! - SAM: run-length text such as `1S7M1D1M`, or `*` when unavailable
//!
//! # Operations
//!
//! | Op | Code | Query | Reference |
//! |----|------|-------|-----------|
//! | M  | 0    | yes   | yes       |
//! | I  | 1    | yes   | no        |
//! | D  | 2    | no    | yes       |
//! | N  | 3    | no    | yes       |
//! | S  | 4    | yes   | no        |
//! | H  | 5    | no    | no        |
//! | P  | 6    | no    | no        |
//! | =  | 7    | yes   | yes       |
//! | X  | 8    | yes   | yes       |

use super::error::RecordError;

/// CIGAR operation types.
///
/// Each operation describes a type of alignment event and its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    /// Match or mismatch (M)
    Match(u32),
    /// Insertion to reference (I)
    Insertion(u32),
    /// Deletion from reference (D)
    Deletion(u32),
    /// Skipped region from reference (N)
    RefSkip(u32),
    /// Soft clipping (S)
    SoftClip(u32),
    /// Hard clipping (H)
    HardClip(u32),
    /// Padding (P)
    Padding(u32),
    /// Sequence match (=)
    SeqMatch(u32),
    /// Sequence mismatch (X)
    SeqMismatch(u32),
}

impl CigarOp {
    /// Build an operation from its BAM code (0-8).
    pub fn from_code(code: u32, length: u32) -> Option<Self> {
        Some(match code {
            0 => CigarOp::Match(length),
            1 => CigarOp::Insertion(length),
            2 => CigarOp::Deletion(length),
            3 => CigarOp::RefSkip(length),
            4 => CigarOp::SoftClip(length),
            5 => CigarOp::HardClip(length),
            6 => CigarOp::Padding(length),
            7 => CigarOp::SeqMatch(length),
            8 => CigarOp::SeqMismatch(length),
            _ => return None,
        })
    }

    /// Build an operation from its SAM character.
    pub fn from_char(op: u8, length: u32) -> Option<Self> {
        let code = b"MIDNSHP=X".iter().position(|&c| c == op)?;
        Self::from_code(code as u32, length)
    }

    /// Get the operation count/length.
    pub fn length(&self) -> u32 {
        match *self {
            CigarOp::Match(len)
            | CigarOp::Insertion(len)
            | CigarOp::Deletion(len)
            | CigarOp::RefSkip(len)
            | CigarOp::SoftClip(len)
            | CigarOp::HardClip(len)
            | CigarOp::Padding(len)
            | CigarOp::SeqMatch(len)
            | CigarOp::SeqMismatch(len) => len,
        }
    }

    /// Check if this operation has zero length.
    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Get the operation type as a character (for SAM format).
    pub fn as_char(&self) -> char {
        match self {
            CigarOp::Match(_) => 'M',
            CigarOp::Insertion(_) => 'I',
            CigarOp::Deletion(_) => 'D',
            CigarOp::RefSkip(_) => 'N',
            CigarOp::SoftClip(_) => 'S',
            CigarOp::HardClip(_) => 'H',
            CigarOp::Padding(_) => 'P',
            CigarOp::SeqMatch(_) => '=',
            CigarOp::SeqMismatch(_) => 'X',
        }
    }

    /// Whether the operation consumes query (read) bases.
    pub fn consumes_query(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Insertion(_)
                | CigarOp::SoftClip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }

    /// Whether the operation consumes reference bases.
    pub fn consumes_reference(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Deletion(_)
                | CigarOp::RefSkip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }
}

impl std::fmt::Display for CigarOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.length(), self.as_char())
    }
}

/// Number of query bases a CIGAR accounts for.
pub fn query_length(cigar: &[CigarOp]) -> usize {
    cigar
        .iter()
        .filter(|op| op.consumes_query())
        .map(|op| op.length() as usize)
        .sum()
}

/// Decode a packed `length << 4 | op` value.
pub(crate) fn unpack_op(packed: u32) -> Result<CigarOp, RecordError> {
    CigarOp::from_code(packed & 0x0F, packed >> 4)
        .ok_or(RecordError::InvalidCigarOp { value: packed & 0x0F })
}

/// Parse BAM CIGAR operations from binary format.
///
/// # Example
///
/// ```
/// use alnseek::io::bam::{parse_cigar, CigarOp};
///
/// // 100M = 100 << 4 | 0 = 1600 = 0x00000640 (little-endian)
/// let data = vec![0x40, 0x06, 0x00, 0x00];
/// let cigar = parse_cigar(&data, 1).unwrap();
/// assert_eq!(cigar, vec![CigarOp::Match(100)]);
/// ```
pub fn parse_cigar(data: &[u8], n_ops: usize) -> Result<Vec<CigarOp>, RecordError> {
    let required_bytes = n_ops * 4;
    if data.len() < required_bytes {
        return Err(RecordError::UnexpectedEof {
            context: "CIGAR".to_string(),
            expected: required_bytes,
            actual: data.len(),
        });
    }

    data[..required_bytes]
        .chunks_exact(4)
        .map(|chunk| unpack_op(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect()
}

/// Parse a SAM CIGAR string. `*` yields an empty CIGAR.
///
/// # Example
///
/// ```
/// use alnseek::io::bam::{parse_cigar_string, CigarOp};
///
/// let cigar = parse_cigar_string("1S3M").unwrap();
/// assert_eq!(cigar, vec![CigarOp::SoftClip(1), CigarOp::Match(3)]);
/// ```
pub fn parse_cigar_string(text: &str) -> Result<Vec<CigarOp>, RecordError> {
    if text == "*" {
        return Ok(Vec::new());
    }

    let invalid = || RecordError::InvalidCigar {
        text: text.to_string(),
    };

    let mut ops = Vec::new();
    let mut length: Option<u32> = None;

    for &c in text.as_bytes() {
        if c.is_ascii_digit() {
            let digit = (c - b'0') as u32;
            let next = length
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|l| l.checked_add(digit))
                .filter(|&l| l < 1 << 28)
                .ok_or_else(invalid)?;
            length = Some(next);
        } else {
            let len = length.take().ok_or_else(invalid)?;
            ops.push(CigarOp::from_char(c, len).ok_or_else(invalid)?);
        }
    }

    if length.is_some() || ops.is_empty() {
        return Err(invalid());
    }

    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cigar_op_length() {
        assert_eq!(CigarOp::Match(100).length(), 100);
        assert_eq!(CigarOp::Insertion(5).length(), 5);
    }

    #[test]
    fn test_cigar_op_char() {
        assert_eq!(CigarOp::Match(100).as_char(), 'M');
        assert_eq!(CigarOp::Insertion(5).as_char(), 'I');
        assert_eq!(CigarOp::Deletion(3).as_char(), 'D');
        assert_eq!(CigarOp::SeqMatch(3).as_char(), '=');
    }

    #[test]
    fn test_consumption() {
        assert!(CigarOp::SoftClip(1).consumes_query());
        assert!(!CigarOp::SoftClip(1).consumes_reference());
        assert!(!CigarOp::HardClip(1).consumes_query());
        assert!(CigarOp::Deletion(1).consumes_reference());
        assert!(!CigarOp::Padding(1).consumes_reference());
    }

    #[test]
    fn test_parse_cigar_binary_all_ops() {
        let mut data = Vec::new();
        for code in 0..9u32 {
            data.extend_from_slice(&((code + 1) << 4 | code).to_le_bytes());
        }
        let cigar = parse_cigar(&data, 9).unwrap();
        let text: String = cigar.iter().map(|op| op.to_string()).collect();
        assert_eq!(text, "1M2I3D4N5S6H7P8=9X");
    }

    #[test]
    fn test_parse_cigar_binary_invalid_op() {
        let data = (1u32 << 4 | 9).to_le_bytes();
        assert_eq!(
            parse_cigar(&data, 1),
            Err(RecordError::InvalidCigarOp { value: 9 })
        );
    }

    #[test]
    fn test_parse_cigar_binary_insufficient() {
        assert!(matches!(
            parse_cigar(&[0, 0, 0], 1),
            Err(RecordError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_parse_cigar_string() {
        let cigar = parse_cigar_string("1H7M1D1M1S2H").unwrap();
        assert_eq!(
            cigar,
            vec![
                CigarOp::HardClip(1),
                CigarOp::Match(7),
                CigarOp::Deletion(1),
                CigarOp::Match(1),
                CigarOp::SoftClip(1),
                CigarOp::HardClip(2),
            ]
        );
        assert_eq!(query_length(&cigar), 9);
    }

    #[test]
    fn test_parse_cigar_string_star() {
        assert!(parse_cigar_string("*").unwrap().is_empty());
    }

    #[test]
    fn test_parse_cigar_string_rejects_garbage() {
        for bad in ["", "M", "10", "5Q", "3M4", "99999999999M"] {
            assert!(parse_cigar_string(bad).is_err(), "accepted {:?}", bad);
        }
    }

    proptest! {
        #[test]
        fn test_cigar_text_round_trip(
            ops in prop::collection::vec((0u32..9, 1u32..10_000), 1..20)
        ) {
            let cigar: Vec<CigarOp> = ops
                .iter()
                .map(|&(code, len)| CigarOp::from_code(code, len).unwrap())
                .collect();
            let text: String = cigar.iter().map(|op| op.to_string()).collect();
            prop_assert_eq!(parse_cigar_string(&text).unwrap(), cigar);
        }
    }
}
