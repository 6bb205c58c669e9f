//! Sequence and base quality decoding.
//!
//! BAM stores sequences in 4-bit encoding (2 bases per byte, high nibble
//! first) and qualities as raw Phred values. SAM stores both as text, with
//! qualities offset by 33. Both decode to the same representation: upper-case
//! IUPAC letters and raw Phred values.

use super::error::RecordError;

/// 4-bit code to IUPAC letter.
const SEQ_LOOKUP: [u8; 16] = [
    b'=', b'A', b'C', b'M', // 0-3
    b'G', b'R', b'S', b'V', // 4-7
    b'T', b'W', b'Y', b'H', // 8-11
    b'K', b'D', b'B', b'N', // 12-15
];

/// ASCII offset of SAM quality strings.
pub const PHRED_OFFSET: u8 = 33;

/// Decode a 4-bit packed BAM sequence of `length` bases.
pub fn decode_sequence(data: &[u8], length: usize) -> Result<Vec<u8>, RecordError> {
    let required_bytes = length.div_ceil(2);
    if data.len() < required_bytes {
        return Err(RecordError::UnexpectedEof {
            context: "sequence".to_string(),
            expected: required_bytes,
            actual: data.len(),
        });
    }

    let mut sequence = Vec::with_capacity(length);
    for i in 0..length {
        let byte = data[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        sequence.push(SEQ_LOOKUP[nibble as usize]);
    }

    Ok(sequence)
}

/// Parse a SAM SEQ field. `*` yields an empty sequence; lower case is folded.
pub fn parse_sam_sequence(text: &str) -> Result<Vec<u8>, RecordError> {
    if text == "*" {
        return Ok(Vec::new());
    }

    text.bytes()
        .map(|b| {
            let upper = b.to_ascii_uppercase();
            if SEQ_LOOKUP.contains(&upper) {
                Ok(upper)
            } else {
                Err(RecordError::InvalidBase { base: b })
            }
        })
        .collect()
}

/// Decode BAM qualities. A run of 0xFF means qualities are absent.
pub fn decode_qualities(data: &[u8]) -> Vec<u8> {
    if data.iter().all(|&b| b == 0xFF) {
        Vec::new()
    } else {
        data.to_vec()
    }
}

/// Parse a SAM QUAL field (Phred+33). `*` yields no qualities.
pub fn parse_sam_qualities(text: &str) -> Result<Vec<u8>, RecordError> {
    if text == "*" {
        return Ok(Vec::new());
    }

    text.bytes()
        .map(|b| match b {
            33..=126 => Ok(b - PHRED_OFFSET),
            _ => Err(RecordError::InvalidQuality { value: b }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_acgt() {
        // 0x12 = 'A' (1) + 'C' (2), 0x48 = 'G' (4) + 'T' (8)
        let seq = decode_sequence(&[0x12, 0x48], 4).unwrap();
        assert_eq!(seq, b"ACGT");
    }

    #[test]
    fn test_decode_odd_length() {
        let seq = decode_sequence(&[0x12, 0x48, 0x10], 5).unwrap();
        assert_eq!(seq, b"ACGTA");
    }

    #[test]
    fn test_decode_empty_sequence() {
        assert!(decode_sequence(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_insufficient_data_error() {
        assert!(decode_sequence(&[0x12], 5).is_err());
    }

    #[test]
    fn test_parse_sam_sequence() {
        assert_eq!(parse_sam_sequence("AGGCTGNAG").unwrap(), b"AGGCTGNAG");
        assert_eq!(parse_sam_sequence("acgt").unwrap(), b"ACGT");
        assert!(parse_sam_sequence("*").unwrap().is_empty());
        assert_eq!(
            parse_sam_sequence("AC.T"),
            Err(RecordError::InvalidBase { base: b'.' })
        );
    }

    #[test]
    fn test_missing_qualities() {
        assert!(decode_qualities(&[0xFF; 4]).is_empty());
        assert_eq!(decode_qualities(&[0, 2, 2, 3]), vec![0, 2, 2, 3]);
    }

    #[test]
    fn test_parse_sam_qualities() {
        assert_eq!(parse_sam_qualities("!##$").unwrap(), vec![0, 2, 2, 3]);
        assert!(parse_sam_qualities("*").unwrap().is_empty());
        assert!(parse_sam_qualities("!\u{7f}").is_err());
    }

    fn encode_sequence(bases: &[u8]) -> Vec<u8> {
        bases
            .chunks(2)
            .map(|pair| {
                let code = |b: u8| SEQ_LOOKUP.iter().position(|&c| c == b).unwrap() as u8;
                let high = code(pair[0]) << 4;
                let low = pair.get(1).map(|&b| code(b)).unwrap_or(0);
                high | low
            })
            .collect()
    }

    proptest! {
        #[test]
        fn test_binary_and_text_sequences_agree(
            bases in prop::collection::vec(prop::sample::select(SEQ_LOOKUP.to_vec()), 0..200)
        ) {
            let packed = encode_sequence(&bases);
            let text = String::from_utf8(bases.clone()).unwrap();
            let from_text = if text.is_empty() {
                Vec::new()
            } else {
                parse_sam_sequence(&text).unwrap()
            };
            prop_assert_eq!(decode_sequence(&packed, bases.len()).unwrap(), from_text);
        }
    }
}
