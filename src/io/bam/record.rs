//! Alignment record structure and binary parsing.
//!
//! A record represents a single alignment (read mapped to reference). Records
//! parsed from SAM text and from BAM binary share this one representation, so
//! the same logical alignment compares equal regardless of its encoding.
//!
//! # Binary Format
//!
//! ```text
//! BAM Record (binary, little-endian):
//! - block_size (int32): Total record size in bytes (excluding this field)
//! - refID (int32): Reference sequence ID (-1 for unmapped)
//! - pos (int32): 0-based leftmost position (-1 for unmapped)
//! - l_read_name (uint8): Length of read name (includes null terminator)
//! - mapq (uint8): Mapping quality (255 = unavailable)
//! - bin (uint16): BAI index bin (for indexing)
//! - n_cigar_op (uint16): Number of CIGAR operations
//! - flag (uint16): Bitwise FLAGS
//! - l_seq (int32): Sequence length
//! - next_refID (int32): Reference ID of mate/next read
//! - next_pos (int32): Position of mate/next read
//! - tlen (int32): Template length
//! - read_name (char[l_read_name]): Null-terminated read name
//! - cigar (uint32[n_cigar_op]): CIGAR operations
//! - seq (uint8[(l_seq+1)/2]): 4-bit encoded sequence
//! - qual (char[l_seq]): Phred quality scores
//! - tags: Optional tags (variable length)
//! ```

use super::cigar::{parse_cigar, query_length, unpack_op, CigarOp};
use super::error::RecordError;
use super::header::ReferenceDictionary;
use super::sequence::{decode_qualities, decode_sequence};
use super::tags::{parse_tags, ArrayValue, TagValue, Tags};

/// Gap character used in alignment rows.
pub const GAP: u8 = b'-';

/// Size of the fixed-width portion of a BAM record, including `block_size`.
const FIXED_FIELDS_SIZE: usize = 36;

/// Bounds-checked little-endian reads over a record body.
struct FieldReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    fn take(&mut self, n: usize, context: &str) -> Result<&'a [u8], RecordError> {
        let available = self.data.len() - self.cursor;
        if n > available {
            return Err(RecordError::UnexpectedEof {
                context: context.to_string(),
                expected: n,
                actual: available,
            });
        }
        let slice = &self.data[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(slice)
    }

    fn i32(&mut self, context: &str) -> Result<i32, RecordError> {
        let b = self.take(4, context)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u16(&mut self, context: &str) -> Result<u16, RecordError> {
        let b = self.take(2, context)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u8(&mut self, context: &str) -> Result<u8, RecordError> {
        Ok(self.take(1, context)?[0])
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.cursor..]
    }
}

/// Validate reference ID: -1 (unmapped) or a non-negative index.
fn parse_reference_id(ref_id: i32, field_name: &str) -> Result<Option<usize>, RecordError> {
    match ref_id {
        -1 => Ok(None),
        n if n >= 0 => Ok(Some(n as usize)),
        invalid => Err(RecordError::InvalidReferenceId {
            value: invalid,
            field: field_name.to_string(),
        }),
    }
}

/// Gapped rows of a pairwise alignment.
///
/// `query` is always derived from the record's sequence and CIGAR. `reference`
/// is only filled in when a reference sequence is supplied through
/// [`Record::alignment_against`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alignment {
    /// Gapped reference row
    pub reference: Option<Vec<u8>>,
    /// Gapped query row; clipped bases are excluded
    pub query: Vec<u8>,
}

impl Alignment {
    /// Build the query row implied by `cigar` over `sequence`.
    ///
    /// Empty when either the CIGAR or the sequence is missing.
    pub fn from_cigar(cigar: &[CigarOp], sequence: &[u8]) -> Self {
        if cigar.is_empty() || sequence.is_empty() {
            return Self::default();
        }

        let mut query = Vec::with_capacity(sequence.len());
        let mut i = 0;
        for op in cigar {
            let len = op.length() as usize;
            match op {
                CigarOp::Match(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
                | CigarOp::Insertion(_) => {
                    let end = (i + len).min(sequence.len());
                    query.extend_from_slice(&sequence[i..end]);
                    i = end;
                }
                CigarOp::Deletion(_) | CigarOp::RefSkip(_) | CigarOp::Padding(_) => {
                    query.extend(std::iter::repeat(GAP).take(len));
                }
                CigarOp::SoftClip(_) => i = (i + len).min(sequence.len()),
                CigarOp::HardClip(_) => {}
            }
        }

        Self {
            reference: None,
            query,
        }
    }
}

/// Alignment record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Read name/query name
    pub id: String,

    /// Bitwise FLAGS
    pub flag: u16,

    /// Reference sequence ID (index into the header's reference table)
    pub reference_id: Option<usize>,

    /// 0-based leftmost mapping position
    pub reference_position: Option<i32>,

    /// Mapping quality; None if unavailable (255)
    pub mapping_quality: Option<u8>,

    /// CIGAR operations
    pub cigar_sequence: Vec<CigarOp>,

    /// Mate/next segment reference ID
    pub mate_reference_id: Option<usize>,

    /// Mate/next segment 0-based position
    pub mate_position: Option<i32>,

    /// Template length (TLEN)
    pub template_length: i32,

    /// Sequence bases (upper-case IUPAC)
    pub sequence: Vec<u8>,

    /// Raw Phred quality scores; empty when absent
    pub base_qualities: Vec<u8>,

    /// Offset into `sequence` of the first aligned base (leading soft clip).
    /// None without a CIGAR.
    pub sequence_position: Option<usize>,

    /// Gapped alignment rows
    pub alignment: Alignment,

    /// Optional tags
    pub tags: Tags,
}

impl Record {
    /// Check if the read is paired.
    pub fn is_paired(&self) -> bool {
        self.flag & 0x1 != 0
    }

    /// Check if the read is unmapped.
    pub fn is_unmapped(&self) -> bool {
        self.flag & 0x4 != 0
    }

    /// Check if the read is a reverse complement.
    pub fn is_reverse_complement(&self) -> bool {
        self.flag & 0x10 != 0
    }

    /// Check if this is a secondary alignment.
    pub fn is_secondary(&self) -> bool {
        self.flag & 0x100 != 0
    }

    /// Check if this is a supplementary alignment.
    pub fn is_supplementary(&self) -> bool {
        self.flag & 0x800 != 0
    }

    /// CIGAR as SAM text, `*` when absent.
    pub fn cigar_string(&self) -> String {
        if self.cigar_sequence.is_empty() {
            "*".to_string()
        } else {
            self.cigar_sequence.iter().map(|op| op.to_string()).collect()
        }
    }

    /// Build both alignment rows against the reference sequence this record
    /// is mapped to.
    ///
    /// Returns `None` for unmapped records, records without CIGAR or
    /// sequence, or when the alignment runs past the end of `reference`.
    pub fn alignment_against(&self, reference: &[u8]) -> Option<Alignment> {
        let start = usize::try_from(self.reference_position?).ok()?;
        if self.cigar_sequence.is_empty() || self.sequence.is_empty() {
            return None;
        }

        let mut row = Vec::with_capacity(self.alignment.query.len());
        let mut p = start;
        for op in &self.cigar_sequence {
            let len = op.length() as usize;
            match op {
                CigarOp::Match(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
                | CigarOp::Deletion(_)
                | CigarOp::RefSkip(_) => {
                    row.extend_from_slice(reference.get(p..p + len)?);
                    p += len;
                }
                CigarOp::Insertion(_) | CigarOp::Padding(_) => {
                    row.extend(std::iter::repeat(GAP).take(len));
                }
                CigarOp::SoftClip(_) | CigarOp::HardClip(_) => {}
            }
        }

        Some(Alignment {
            reference: Some(row),
            query: self.alignment.query.clone(),
        })
    }

    /// Check that every reference index resolves in `references`.
    pub fn check_references(
        &self,
        references: &dyn ReferenceDictionary,
    ) -> Result<(), RecordError> {
        let count = references.reference_count();
        for (id, field) in [(self.reference_id, "read"), (self.mate_reference_id, "mate")] {
            if let Some(id) = id {
                if id >= count {
                    return Err(RecordError::UnknownReference {
                        reference: id.to_string(),
                        field: field.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Offset of the first aligned query base: the sum of leading soft clips.
pub fn leading_soft_clip(cigar: &[CigarOp]) -> Option<usize> {
    if cigar.is_empty() {
        return None;
    }
    let clipped = cigar
        .iter()
        .take_while(|op| matches!(op, CigarOp::SoftClip(_) | CigarOp::HardClip(_)))
        .filter_map(|op| match op {
            CigarOp::SoftClip(len) => Some(*len as usize),
            _ => None,
        })
        .sum();
    Some(clipped)
}

/// Check the cross-field length invariants shared by both encodings.
pub(crate) fn check_lengths(
    sequence: &[u8],
    qualities: &[u8],
    cigar: &[CigarOp],
) -> Result<(), RecordError> {
    if !sequence.is_empty() && !qualities.is_empty() && sequence.len() != qualities.len() {
        return Err(RecordError::QualityLengthMismatch {
            sequence: sequence.len(),
            quality: qualities.len(),
        });
    }

    if !cigar.is_empty() && !sequence.is_empty() {
        let implied = query_length(cigar);
        if implied != sequence.len() {
            return Err(RecordError::CigarLengthMismatch {
                cigar: implied,
                sequence: sequence.len(),
            });
        }
    }

    Ok(())
}

/// Replace a `kS mN` placeholder CIGAR with the one stored in the `CG` tag.
///
/// BAM stores at most 65535 CIGAR operations in the fixed fields. Longer
/// CIGARs are written as a two-operation placeholder, soft clip of the whole
/// read followed by a reference skip, with the real operations in `CG:B,I`.
/// The `CG` tag is consumed when the substitution happens.
fn check_oversized_cigar(
    cigar: Vec<CigarOp>,
    sequence_length: usize,
    tags: &mut Tags,
) -> Result<Vec<CigarOp>, RecordError> {
    let is_placeholder = matches!(
        cigar.as_slice(),
        [CigarOp::SoftClip(len), CigarOp::RefSkip(_)] if *len as usize == sequence_length
    );
    if !is_placeholder {
        return Ok(cigar);
    }

    let packed: Vec<u32> = match tags.get(b"CG") {
        Some(TagValue::Array(ArrayValue::UInt32(values))) => values.clone(),
        Some(TagValue::Array(ArrayValue::Int32(values))) => {
            values.iter().map(|&v| v as u32).collect()
        }
        _ => return Ok(cigar),
    };

    let real = packed
        .into_iter()
        .map(unpack_op)
        .collect::<Result<Vec<_>, _>>()?;
    tags.remove(b"CG");
    Ok(real)
}

/// Parse a BAM record from binary data.
///
/// `data` is the complete record including its leading `block_size` field.
///
/// # Errors
///
/// Returns a [`RecordError`] if the data is shorter than its fields claim,
/// any field holds an invalid value, or the sequence, quality and CIGAR
/// lengths disagree.
pub fn parse_record(data: &[u8]) -> Result<Record, RecordError> {
    if data.len() < FIXED_FIELDS_SIZE {
        return Err(RecordError::UnexpectedEof {
            context: "fixed fields".to_string(),
            expected: FIXED_FIELDS_SIZE,
            actual: data.len(),
        });
    }

    let mut fields = FieldReader::new(data);

    let _block_size = fields.i32("block_size")?;
    let ref_id = fields.i32("refID")?;
    let pos = fields.i32("pos")?;
    let l_read_name = fields.u8("l_read_name")?;
    if l_read_name == 0 {
        return Err(RecordError::InvalidReadNameLength {
            length: l_read_name,
            offset: fields.cursor - 1,
        });
    }
    let mapq = fields.u8("mapq")?;
    let _bin = fields.u16("bin")?;
    let n_cigar_op = fields.u16("n_cigar_op")? as usize;
    let flag = fields.u16("flag")?;
    let l_seq = fields.i32("l_seq")?;
    if l_seq < 0 {
        return Err(RecordError::NegativeSequenceLength { length: l_seq });
    }
    let l_seq = l_seq as usize;
    let next_ref_id = fields.i32("next_refID")?;
    let next_pos = fields.i32("next_pos")?;
    let template_length = fields.i32("tlen")?;

    let name_offset = fields.cursor;
    let name_bytes = fields.take(l_read_name as usize, "read name")?;
    let name_bytes = match name_bytes.split_last() {
        Some((0, name)) => name,
        _ => {
            return Err(RecordError::MissingNulTerminator {
                field: "read name".to_string(),
                offset: name_offset,
            })
        }
    };
    let id = std::str::from_utf8(name_bytes)
        .map_err(|source| RecordError::InvalidUtf8 {
            field: "read name".to_string(),
            source,
        })?
        .to_string();

    let cigar_bytes = fields.take(n_cigar_op * 4, "CIGAR")?;
    let cigar = parse_cigar(cigar_bytes, n_cigar_op)?;

    let seq_bytes = fields.take(l_seq.div_ceil(2), "sequence")?;
    let sequence = decode_sequence(seq_bytes, l_seq)?;

    let base_qualities = decode_qualities(fields.take(l_seq, "quality scores")?);

    let mut tags = parse_tags(fields.rest())?;
    let cigar_sequence = check_oversized_cigar(cigar, l_seq, &mut tags)?;

    check_lengths(&sequence, &base_qualities, &cigar_sequence)?;

    Ok(Record {
        id,
        flag,
        reference_id: parse_reference_id(ref_id, "read")?,
        reference_position: (pos >= 0).then_some(pos),
        mapping_quality: (mapq != 255).then_some(mapq),
        mate_reference_id: parse_reference_id(next_ref_id, "mate")?,
        mate_position: (next_pos >= 0).then_some(next_pos),
        template_length,
        sequence_position: leading_soft_clip(&cigar_sequence),
        alignment: Alignment::from_cigar(&cigar_sequence, &sequence),
        cigar_sequence,
        sequence,
        base_qualities,
        tags,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::bam::header::{Header, Reference};

    /// Assemble a binary record; `cigar` is `(op_code, length)` pairs.
    pub(crate) fn build_record(
        name: &str,
        ref_id: i32,
        pos: i32,
        cigar: &[(u32, u32)],
        sequence: &[u8],
        qualities: &[u8],
        tags: &[u8],
    ) -> Vec<u8> {
        const CODES: &[u8; 16] = b"=ACMGRSVTWYHKDBN";
        let mut body = Vec::new();
        body.extend_from_slice(&ref_id.to_le_bytes());
        body.extend_from_slice(&pos.to_le_bytes());
        body.push(name.len() as u8 + 1);
        body.push(60);
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&(cigar.len() as u16).to_le_bytes());
        body.extend_from_slice(&0x1u16.to_le_bytes());
        body.extend_from_slice(&(sequence.len() as i32).to_le_bytes());
        body.extend_from_slice(&(-1i32).to_le_bytes());
        body.extend_from_slice(&(-1i32).to_le_bytes());
        body.extend_from_slice(&0i32.to_le_bytes());
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        for &(op, len) in cigar {
            body.extend_from_slice(&(len << 4 | op).to_le_bytes());
        }
        for pair in sequence.chunks(2) {
            let code = |b: u8| CODES.iter().position(|&c| c == b).unwrap() as u8;
            body.push(code(pair[0]) << 4 | pair.get(1).map(|&b| code(b)).unwrap_or(0));
        }
        if qualities.is_empty() {
            body.extend(std::iter::repeat(0xFF).take(sequence.len()));
        } else {
            body.extend_from_slice(qualities);
        }
        body.extend_from_slice(tags);

        let mut data = (body.len() as i32).to_le_bytes().to_vec();
        data.extend_from_slice(&body);
        data
    }

    #[test]
    fn test_record_flags() {
        let mut record = parse_record(&build_record("r", 0, 0, &[], b"", &[], &[])).unwrap();
        assert!(record.is_paired());
        record.flag = 0x4 | 0x10 | 0x100 | 0x800;
        assert!(record.is_unmapped());
        assert!(record.is_reverse_complement());
        assert!(record.is_secondary());
        assert!(record.is_supplementary());
        assert!(!record.is_paired());
    }

    #[test]
    fn test_parse_minimal_record() {
        let record = parse_record(&build_record("read1", -1, -1, &[], b"", &[], &[])).unwrap();
        assert_eq!(record.id, "read1");
        assert_eq!(record.reference_id, None);
        assert_eq!(record.reference_position, None);
        assert_eq!(record.mapping_quality, Some(60));
        assert_eq!(record.mate_reference_id, None);
        assert_eq!(record.sequence_position, None);
        assert_eq!(record.cigar_string(), "*");
        assert!(record.sequence.is_empty());
        assert!(record.tags.is_empty());
    }

    #[test]
    fn test_parse_record_with_sequence() {
        let data = build_record(
            "read1",
            0,
            0,
            &[(4, 1), (0, 1), (2, 1), (0, 1), (1, 1)],
            b"ACGT",
            &[0, 2, 2, 3],
            b"NMc\xf9",
        );
        let record = parse_record(&data).unwrap();
        assert_eq!(record.sequence, b"ACGT");
        assert_eq!(record.base_qualities, vec![0, 2, 2, 3]);
        assert_eq!(record.cigar_string(), "1S1M1D1M1I");
        assert_eq!(record.sequence_position, Some(1));
        assert_eq!(record.alignment.query, b"C-GT");
        assert_eq!(record.tags.edit_distance(), Some(-7));
    }

    #[test]
    fn test_missing_quality_scores() {
        let data = build_record("r", 0, 0, &[(0, 4)], b"ACGT", &[], &[]);
        let record = parse_record(&data).unwrap();
        assert!(record.base_qualities.is_empty());
    }

    #[test]
    fn test_truncated_record() {
        let data = build_record("read1", 0, 0, &[(0, 4)], b"ACGT", &[1, 2, 3, 4], &[]);
        let result = parse_record(&data[..data.len() - 2]);
        assert!(matches!(result, Err(RecordError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_too_short_for_fixed_fields() {
        assert!(matches!(
            parse_record(&[0u8; 20]),
            Err(RecordError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_in_read_name() {
        let mut data = build_record("ab", 0, 0, &[], b"", &[], &[]);
        data[36] = 0xFF;
        assert!(matches!(
            parse_record(&data),
            Err(RecordError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_missing_null_terminator_in_name() {
        let mut data = build_record("ab", 0, 0, &[], b"", &[], &[]);
        data[38] = b'c';
        assert!(matches!(
            parse_record(&data),
            Err(RecordError::MissingNulTerminator { .. })
        ));
    }

    #[test]
    fn test_zero_read_name_length() {
        let mut data = build_record("ab", 0, 0, &[], b"", &[], &[]);
        data[12] = 0;
        assert!(matches!(
            parse_record(&data),
            Err(RecordError::InvalidReadNameLength { .. })
        ));
    }

    #[test]
    fn test_negative_sequence_length() {
        let mut data = build_record("ab", 0, 0, &[], b"", &[], &[]);
        data[20..24].copy_from_slice(&(-3i32).to_le_bytes());
        assert_eq!(
            parse_record(&data),
            Err(RecordError::NegativeSequenceLength { length: -3 })
        );
    }

    #[test]
    fn test_invalid_reference_ids() {
        let data = build_record("r", -2, 0, &[], b"", &[], &[]);
        assert!(matches!(
            parse_record(&data),
            Err(RecordError::InvalidReferenceId { value: -2, .. })
        ));
    }

    #[test]
    fn test_cigar_length_mismatch() {
        let data = build_record("r", 0, 0, &[(0, 5)], b"ACGT", &[1, 1, 1, 1], &[]);
        assert_eq!(
            parse_record(&data),
            Err(RecordError::CigarLengthMismatch {
                cigar: 5,
                sequence: 4
            })
        );
    }

    #[test]
    fn test_oversized_cigar_from_cg_tag() {
        let mut tags = b"CGBI".to_vec();
        tags.extend_from_slice(&2u32.to_le_bytes());
        tags.extend_from_slice(&(3u32 << 4 | 0).to_le_bytes());
        tags.extend_from_slice(&(1u32 << 4 | 4).to_le_bytes());

        let data = build_record("long", 0, 0, &[(4, 4), (3, 3)], b"ACGT", &[], &tags);
        let record = parse_record(&data).unwrap();
        assert_eq!(
            record.cigar_sequence,
            vec![CigarOp::Match(3), CigarOp::SoftClip(1)]
        );
        assert!(record.tags.get(b"CG").is_none());
        assert_eq!(record.sequence_position, Some(0));
    }

    #[test]
    fn test_oversized_pattern_without_cg_tag() {
        let data = build_record("r", 0, 0, &[(4, 4), (3, 3)], b"ACGT", &[], &[]);
        let record = parse_record(&data).unwrap();
        assert_eq!(
            record.cigar_sequence,
            vec![CigarOp::SoftClip(4), CigarOp::RefSkip(3)]
        );
    }

    #[test]
    fn test_alignment_against_reference() {
        let cigar = [(4, 1), (0, 2), (1, 1), (2, 2), (0, 1)];
        let data = build_record("r", 0, 2, &cigar, b"TACGA", &[], &[]);
        let record = parse_record(&data).unwrap();
        assert_eq!(record.alignment.query, b"ACG--A");

        let alignment = record.alignment_against(b"GGACTTAGG").unwrap();
        assert_eq!(alignment.reference.as_deref(), Some(&b"AC-TTA"[..]));
        assert_eq!(alignment.query, b"ACG--A");

        assert!(record.alignment_against(b"GGAC").is_none());
    }

    #[test]
    fn test_check_references() {
        let header = Header::new(String::new(), vec![Reference::new("chr1".to_string(), 100)]);
        let ok = parse_record(&build_record("r", 0, 0, &[], b"", &[], &[])).unwrap();
        assert!(ok.check_references(&header).is_ok());

        let bad = parse_record(&build_record("r", 3, 0, &[], b"", &[], &[])).unwrap();
        assert!(matches!(
            bad.check_references(&header),
            Err(RecordError::UnknownReference { .. })
        ));
    }

    #[test]
    fn test_leading_soft_clip_skips_hard_clip() {
        let cigar = [CigarOp::HardClip(2), CigarOp::SoftClip(3), CigarOp::Match(4)];
        assert_eq!(leading_soft_clip(&cigar), Some(3));
        assert_eq!(leading_soft_clip(&[]), None);
    }
}
