//! SAM format reader (text alignment files).
//!
//! SAM is the text representation of BAM: same records, different encoding.
//! Each record is one line of at least 11 tab-separated fields:
//!
//! ```text
//! QNAME FLAG RNAME POS MAPQ CIGAR RNEXT PNEXT TLEN SEQ QUAL [TAG:TYPE:VALUE ...]
//! ```
//!
//! Positions are 1-based in the text and 0-based in [`Record`]; `0` means no
//! position. `RNEXT` of `=` refers to the record's own reference.
//!
//! Seek tokens for SAM are plain byte offsets of a record's first byte.

use super::cigar::parse_cigar_string;
use super::error::RecordError;
use super::header::{parse_sam_header, Header, ReferenceDictionary};
use super::record::{check_lengths, leading_soft_clip, Alignment, Record};
use super::sequence::{parse_sam_qualities, parse_sam_sequence};
use super::tags::{parse_sam_tag, Tags};
use crate::error::{AlnseekError, Result};
use crate::io::iterator::RecordSource;
use crate::io::position::{LinearCodec, PositionCodec, SeekToken};
use std::io::{BufRead, Seek, SeekFrom};

const MANDATORY_FIELDS: usize = 11;

fn parse_field<T: std::str::FromStr>(
    name: &str,
    value: &str,
) -> std::result::Result<T, RecordError> {
    value
        .parse()
        .map_err(|_| RecordError::invalid_field(name, value))
}

fn parse_reference_name(
    name: &str,
    field: &str,
    references: &dyn ReferenceDictionary,
) -> std::result::Result<Option<usize>, RecordError> {
    if name == "*" {
        return Ok(None);
    }
    references
        .reference_id(name)
        .map(Some)
        .ok_or_else(|| RecordError::UnknownReference {
            reference: name.to_string(),
            field: field.to_string(),
        })
}

/// Convert a 1-based SAM position to 0-based; `0` means unavailable.
fn parse_position(name: &str, value: &str) -> std::result::Result<Option<i32>, RecordError> {
    let pos: i32 = parse_field(name, value)?;
    match pos {
        0 => Ok(None),
        p if p > 0 => Ok(Some(p - 1)),
        _ => Err(RecordError::invalid_field(name, value)),
    }
}

/// Parse one SAM alignment line (without its line terminator).
///
/// # Example
///
/// ```
/// use alnseek::io::bam::{parse_sam_record, parse_sam_header};
///
/// let header = parse_sam_header("@SQ\tSN:chr1\tLN:100\n").unwrap();
/// let line = "r1\t0\tchr1\t5\t30\t2S2M\t*\t0\t0\tACGT\tIIII\tNM:i:0";
/// let record = parse_sam_record(line, &header).unwrap();
/// assert_eq!(record.reference_position, Some(4));
/// assert_eq!(record.sequence_position, Some(2));
/// ```
pub fn parse_sam_record(
    line: &str,
    references: &dyn ReferenceDictionary,
) -> std::result::Result<Record, RecordError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < MANDATORY_FIELDS {
        return Err(RecordError::MissingFields {
            found: fields.len(),
        });
    }

    let id = fields[0].to_string();
    let flag: u16 = parse_field("FLAG", fields[1])?;
    let reference_id = parse_reference_name(fields[2], "read", references)?;
    let reference_position = parse_position("POS", fields[3])?;

    let mapq: u8 = parse_field("MAPQ", fields[4])?;
    let mapping_quality = (mapq != 255).then_some(mapq);

    let cigar_sequence = parse_cigar_string(fields[5])?;

    let mate_reference_id = match fields[6] {
        "=" => reference_id,
        name => parse_reference_name(name, "mate", references)?,
    };
    let mate_position = parse_position("PNEXT", fields[7])?;
    let template_length: i32 = parse_field("TLEN", fields[8])?;

    let sequence = parse_sam_sequence(fields[9])?;
    let base_qualities = parse_sam_qualities(fields[10])?;
    check_lengths(&sequence, &base_qualities, &cigar_sequence)?;

    let mut tags = Tags::new();
    for field in &fields[MANDATORY_FIELDS..] {
        let (name, value) = parse_sam_tag(field)?;
        tags.insert(name, value)?;
    }

    Ok(Record {
        id,
        flag,
        reference_id,
        reference_position,
        mapping_quality,
        mate_reference_id,
        mate_position,
        template_length,
        sequence_position: leading_soft_clip(&cigar_sequence),
        alignment: Alignment::from_cigar(&cigar_sequence, &sequence),
        cigar_sequence,
        sequence,
        base_qualities,
        tags,
    })
}

/// Record source over SAM text.
///
/// The source tracks its own byte offset, so [`tell`](RecordSource::tell)
/// never touches the underlying reader.
pub struct SamSource<R> {
    reader: R,
    header: Header,
    /// Byte offset of the next unread line
    offset: u64,
    first_record_offset: u64,
    stream_len: u64,
    line: Vec<u8>,
}

impl<R: BufRead + Seek> SamSource<R> {
    /// Read the header lines and position at the first record.
    pub fn new(mut reader: R) -> Result<Self> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut text = Vec::new();
        loop {
            if reader.fill_buf()?.first() != Some(&b'@') {
                break;
            }
            let n = reader.read_until(b'\n', &mut text)?;
            if n == 0 {
                break;
            }
        }

        let first_record_offset = text.len() as u64;
        let text = String::from_utf8(text).map_err(|e| {
            AlnseekError::InvalidHeader(format!("Invalid UTF-8 in SAM header: {}", e))
        })?;
        let header = parse_sam_header(&text)?;
        log::debug!(
            "SAM header: {} references, first record at offset {}",
            header.reference_count(),
            first_record_offset
        );

        Ok(Self {
            reader,
            header,
            offset: first_record_offset,
            first_record_offset,
            stream_len,
            line: Vec::new(),
        })
    }

    /// Parsed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Token of the first record.
    pub fn first_record(&self) -> SeekToken {
        SeekToken::from_raw(self.first_record_offset)
    }

    /// Borrow the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Consume the source, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: BufRead + Seek> RecordSource for SamSource<R> {
    fn tell(&self) -> SeekToken {
        SeekToken::from_raw(self.offset)
    }

    fn seek(&mut self, token: SeekToken) -> Result<()> {
        let offset = LinearCodec.decode(token);
        if offset < self.first_record_offset || offset > self.stream_len {
            return Err(AlnseekError::InvalidToken {
                token,
                reason: format!(
                    "offset {} outside record range {}..={}",
                    offset, self.first_record_offset, self.stream_len
                ),
            });
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    fn read_record(&mut self) -> Result<Option<std::result::Result<Record, RecordError>>> {
        loop {
            self.line.clear();
            let n = self.reader.read_until(b'\n', &mut self.line)?;
            if n == 0 {
                return Ok(None);
            }
            self.offset += n as u64;

            let mut line = self.line.as_slice();
            if let Some(rest) = line.strip_suffix(b"\n") {
                line = rest;
            }
            if let Some(rest) = line.strip_suffix(b"\r") {
                line = rest;
            }
            if line.is_empty() {
                continue;
            }

            let parsed = std::str::from_utf8(line)
                .map_err(|source| RecordError::InvalidUtf8 {
                    field: "SAM line".to_string(),
                    source,
                })
                .and_then(|line| parse_sam_record(line, &self.header));
            return Ok(Some(parsed));
        }
    }
}
