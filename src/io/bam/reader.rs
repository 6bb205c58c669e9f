//! BAM record source.
//!
//! Frames records over a [`BlockCursor`]: each record is a little-endian
//! `block_size` followed by that many bytes. The length prefix lets a record
//! whose body fails to decode be stepped over without losing sync, so only a
//! stream that ends inside a record is fatal.

use super::error::RecordError;
use super::header::{read_header, Header, ReferenceDictionary};
use super::record::{parse_record, Record};
use crate::error::{AlnseekError, Result};
use crate::io::bgzf::BlockCursor;
use crate::io::iterator::RecordSource;
use crate::io::position::{PositionCodec, SeekToken, VirtualCodec};
use std::io::{Read, Seek};

/// Record source over a BGZF-compressed BAM stream.
pub struct BamSource<R> {
    cursor: BlockCursor<R>,
    header: Header,
    first_record: SeekToken,
}

impl<R: Read + Seek> BamSource<R> {
    /// Read the header and position at the first record.
    pub fn new(reader: R) -> Result<Self> {
        let mut cursor = BlockCursor::new(reader)?;
        let header = read_header(&mut cursor)?;
        let first_record = SeekToken::from_raw(cursor.current_address().pack());
        log::debug!(
            "BAM header: {} references, first record at {}",
            header.reference_count(),
            cursor.current_address()
        );

        Ok(Self {
            cursor,
            header,
            first_record,
        })
    }

    /// Parsed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Token of the first record.
    pub fn first_record(&self) -> SeekToken {
        self.first_record
    }

    /// Borrow the underlying reader.
    pub fn get_ref(&self) -> &R {
        self.cursor.get_ref()
    }

    /// Consume the source, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.cursor.into_inner()
    }

    /// Read `buf.len()` bytes of the record at `position`, or report truncation.
    fn read_framed(&mut self, buf: &mut [u8], position: SeekToken, context: &str) -> Result<()> {
        self.cursor.read_exact_into(buf).map_err(|e| match e {
            AlnseekError::UnexpectedEndOfStream { expected, actual, .. } => {
                AlnseekError::TruncatedStream {
                    position,
                    context: format!("{} ({} of {} bytes)", context, actual, expected),
                }
            }
            other => other,
        })
    }
}

impl<R: Read + Seek> RecordSource for BamSource<R> {
    fn tell(&self) -> SeekToken {
        SeekToken::from_raw(self.cursor.current_address().pack())
    }

    fn seek(&mut self, token: SeekToken) -> Result<()> {
        if token < self.first_record {
            return Err(AlnseekError::InvalidToken {
                token,
                reason: format!("precedes the first record at {}", self.first_record),
            });
        }
        self.cursor.seek(VirtualCodec.decode(token))
    }

    fn read_record(&mut self) -> Result<Option<std::result::Result<Record, RecordError>>> {
        if !self.cursor.has_remaining()? {
            return Ok(None);
        }
        let position = self.tell();

        let mut prefix = [0u8; 4];
        self.read_framed(&mut prefix, position, "record length")?;
        let block_size = i32::from_le_bytes(prefix);
        if block_size < 0 {
            // Without a length there is no way to find the next record
            return Err(AlnseekError::MalformedRecord {
                position,
                source: RecordError::invalid_field("block_size", &block_size.to_string()),
            });
        }

        let mut data = vec![0u8; 4 + block_size as usize];
        data[..4].copy_from_slice(&prefix);
        self.read_framed(&mut data[4..], position, "record body")?;

        let record = parse_record(&data).and_then(|record| {
            record.check_references(&self.header)?;
            Ok(record)
        });
        Ok(Some(record))
    }
}
