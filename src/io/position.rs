//! Seek tokens and the codecs that map them onto stream positions.
//!
//! A [`SeekToken`] identifies the position immediately before a record. It is
//! opaque to callers: they obtain one from
//! [`RecordIterator::file_position`](crate::io::iterator::RecordIterator::file_position)
//! and hand it back to
//! [`RecordIterator::seek_to`](crate::io::iterator::RecordIterator::seek_to).
//!
//! # Encodings
//!
//! ```text
//! SAM (text):    token = byte offset of the record's first byte
//! BAM (BGZF):    token = (block_offset << 16) | intra_block_offset
//!                        |-- 48 bits ---|      |---- 16 bits ----|
//! ```
//!
//! The BGZF layout is the virtual file offset used by htslib and BAI/CSI
//! indices, so tokens taken from a BAM iterator can be compared against index
//! chunk boundaries.
//!
//! # Example
//!
//! ```
//! use alnseek::io::position::{PositionCodec, VirtualCodec, VirtualPosition};
//!
//! let token = VirtualCodec.encode(VirtualPosition::new(75, 0)).unwrap();
//! assert_eq!(token.as_raw(), 4915200);
//! assert_eq!(VirtualCodec.decode(token), VirtualPosition::new(75, 0));
//! ```

use crate::error::{AlnseekError, Result};
use std::fmt;

/// Largest block start representable in the high 48 bits of a token.
pub const MAX_BLOCK_OFFSET: u64 = (1 << 48) - 1;

/// Opaque, totally ordered stream position.
///
/// Within one source, a token taken before record *a* compares less than a
/// token taken before any later record *b*. Tokens from different sources are
/// not comparable in any meaningful way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeekToken(u64);

impl SeekToken {
    /// Create a token from its raw 64-bit representation.
    pub fn from_raw(value: u64) -> Self {
        SeekToken(value)
    }

    /// Raw 64-bit representation, suitable for persisting.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for SeekToken {
    fn from(value: u64) -> Self {
        SeekToken(value)
    }
}

impl From<SeekToken> for u64 {
    fn from(token: SeekToken) -> Self {
        token.0
    }
}

impl fmt::Display for SeekToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compound BGZF address: compressed block start plus offset into its
/// decompressed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualPosition {
    /// Byte offset of the block's gzip header in the compressed stream
    pub block_offset: u64,
    /// Byte offset inside the decompressed block
    pub intra_offset: u16,
}

impl VirtualPosition {
    /// Create a new virtual position.
    pub fn new(block_offset: u64, intra_offset: u16) -> Self {
        Self {
            block_offset,
            intra_offset,
        }
    }

    /// Pack without range checking; the caller guarantees the block offset fits.
    pub(crate) fn pack(self) -> u64 {
        (self.block_offset << 16) | self.intra_offset as u64
    }
}

impl fmt::Display for VirtualPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_offset, self.intra_offset)
    }
}

/// Conversion between a stream's native cursor state and [`SeekToken`].
pub trait PositionCodec {
    /// Native cursor representation.
    type Position;

    /// Encode a cursor state as a token.
    fn encode(&self, position: Self::Position) -> Result<SeekToken>;

    /// Decode a token into cursor state. Range validation against the actual
    /// stream happens when the source repositions.
    fn decode(&self, token: SeekToken) -> Self::Position;
}

/// Identity codec for line-oriented text streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearCodec;

impl PositionCodec for LinearCodec {
    type Position = u64;

    fn encode(&self, offset: u64) -> Result<SeekToken> {
        Ok(SeekToken(offset))
    }

    fn decode(&self, token: SeekToken) -> u64 {
        token.0
    }
}

/// 48/16-bit split codec for BGZF streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualCodec;

impl PositionCodec for VirtualCodec {
    type Position = VirtualPosition;

    fn encode(&self, position: VirtualPosition) -> Result<SeekToken> {
        if position.block_offset > MAX_BLOCK_OFFSET {
            return Err(AlnseekError::InvalidToken {
                token: SeekToken(position.pack()),
                reason: format!(
                    "block offset {} does not fit in 48 bits",
                    position.block_offset
                ),
            });
        }
        Ok(SeekToken(position.pack()))
    }

    fn decode(&self, token: SeekToken) -> VirtualPosition {
        VirtualPosition {
            block_offset: token.0 >> 16,
            intra_offset: (token.0 & 0xFFFF) as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_virtual_encode_known_values() {
        let cases = [
            ((75, 0), 4915200),
            ((179, 0), 11730944),
            ((353, 0), 23134208),
            ((0, 52), 52),
        ];
        for ((block, intra), raw) in cases {
            let token = VirtualCodec.encode(VirtualPosition::new(block, intra)).unwrap();
            assert_eq!(token.as_raw(), raw);
        }
    }

    #[test]
    fn test_virtual_decode_splits_bits() {
        let pos = VirtualCodec.decode(SeekToken::from_raw((1024 << 16) | 512));
        assert_eq!(pos.block_offset, 1024);
        assert_eq!(pos.intra_offset, 512);
    }

    #[test]
    fn test_virtual_encode_rejects_wide_block_offset() {
        let result = VirtualCodec.encode(VirtualPosition::new(MAX_BLOCK_OFFSET + 1, 0));
        assert!(matches!(result, Err(AlnseekError::InvalidToken { .. })));
    }

    #[test]
    fn test_linear_codec_is_identity() {
        assert_eq!(LinearCodec.encode(135).unwrap().as_raw(), 135);
        assert_eq!(LinearCodec.decode(SeekToken::from_raw(325)), 325);
    }

    #[test]
    fn test_token_ordering_follows_stream_order() {
        let a = VirtualCodec.encode(VirtualPosition::new(75, 60000)).unwrap();
        let b = VirtualCodec.encode(VirtualPosition::new(179, 0)).unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_token_display() {
        assert_eq!(SeekToken::from_raw(4915200).to_string(), "4915200");
        assert_eq!(VirtualPosition::new(75, 3).to_string(), "75:3");
    }

    proptest! {
        #[test]
        fn test_virtual_codec_inverse(block in 0u64..=MAX_BLOCK_OFFSET, intra in any::<u16>()) {
            let pos = VirtualPosition::new(block, intra);
            let token = VirtualCodec.encode(pos).unwrap();
            prop_assert_eq!(VirtualCodec.decode(token), pos);
        }

        #[test]
        fn test_virtual_order_matches_position_order(
            a in (0u64..1 << 40, any::<u16>()),
            b in (0u64..1 << 40, any::<u16>()),
        ) {
            let pa = VirtualPosition::new(a.0, a.1);
            let pb = VirtualPosition::new(b.0, b.1);
            let ta = VirtualCodec.encode(pa).unwrap();
            let tb = VirtualCodec.encode(pb).unwrap();
            prop_assert_eq!(pa.cmp(&pb), ta.cmp(&tb));
        }
    }
}
