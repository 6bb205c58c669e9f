//! Record decoding error types.
//!
//! A [`RecordError`] describes why one framed record could not be decoded.
//! Framing has already consumed the record's bytes by the time one is raised,
//! so the stream is positioned at the next record and iteration may continue.

use std::{error, fmt, str};

/// Errors that can occur while decoding a single SAM or BAM record.
///
/// # Example
///
/// ```
/// use alnseek::io::bam::error::RecordError;
///
/// fn describe(err: &RecordError) -> String {
///     match err {
///         RecordError::DuplicateTag { tag } => {
///             format!("duplicate tag {}{}", tag[0] as char, tag[1] as char)
///         }
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    /// Invalid reference sequence ID (must be -1 or >= 0)
    InvalidReferenceId {
        /// The invalid reference ID value
        value: i32,
        /// Which field had the invalid ID ("read" or "mate")
        field: String,
    },

    /// Reference ID or name not present in the header's reference table
    UnknownReference {
        /// The name or ID that failed to resolve
        reference: String,
        /// Which field referenced it ("read" or "mate")
        field: String,
    },

    /// Invalid read name length (must be >= 1)
    InvalidReadNameLength {
        /// The invalid length value
        length: u8,
        /// Offset in the record where the error occurred
        offset: usize,
    },

    /// Missing NUL terminator in string field
    MissingNulTerminator {
        /// Which field was missing the terminator
        field: String,
        /// Offset in the record where the error occurred
        offset: usize,
    },

    /// Invalid UTF-8 in a text field
    InvalidUtf8 {
        /// Which field had invalid UTF-8
        field: String,
        /// The underlying UTF-8 error
        source: str::Utf8Error,
    },

    /// Invalid tag type code
    InvalidTagType {
        /// The tag name
        tag: [u8; 2],
        /// The invalid type code
        type_code: u8,
    },

    /// Tag not of the form `XX:T:value`
    InvalidTag {
        /// The offending text
        text: String,
    },

    /// Duplicate tag within one record
    DuplicateTag {
        /// The duplicate tag name
        tag: [u8; 2],
    },

    /// Invalid array subtype
    InvalidArraySubtype {
        /// The invalid subtype code
        subtype: u8,
    },

    /// Invalid CIGAR operation code (binary)
    InvalidCigarOp {
        /// The invalid operation value
        value: u32,
    },

    /// Unparseable CIGAR string (text)
    InvalidCigar {
        /// The offending CIGAR text
        text: String,
    },

    /// Negative sequence length
    NegativeSequenceLength {
        /// The negative length value
        length: i32,
    },

    /// Sequence character outside the IUPAC nucleotide alphabet
    InvalidBase {
        /// The offending character
        base: u8,
    },

    /// Quality character outside the printable Phred+33 range
    InvalidQuality {
        /// The offending character
        value: u8,
    },

    /// Sequence and quality lengths differ
    QualityLengthMismatch {
        /// Sequence length
        sequence: usize,
        /// Quality length
        quality: usize,
    },

    /// Query bases consumed by the CIGAR differ from the sequence length
    CigarLengthMismatch {
        /// Query length implied by the CIGAR
        cigar: usize,
        /// Sequence length
        sequence: usize,
    },

    /// Fewer than the 11 mandatory SAM fields
    MissingFields {
        /// Number of fields found
        found: usize,
    },

    /// Mandatory field that failed to parse
    InvalidField {
        /// Field name (e.g. "FLAG", "POS")
        field: String,
        /// Raw field text
        value: String,
    },

    /// Record shorter than its own fields claim
    UnexpectedEof {
        /// What was being parsed
        context: String,
        /// Expected number of bytes
        expected: usize,
        /// Actual number of bytes available
        actual: usize,
    },
}

impl RecordError {
    pub(crate) fn invalid_field(field: &str, value: &str) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

impl error::Error for RecordError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidUtf8 { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn tag_str(tag: &[u8; 2]) -> String {
    format!("{}{}", tag[0] as char, tag[1] as char)
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidReferenceId { value, field } => {
                write!(f, "Invalid {} reference ID: {} (must be -1 or >= 0)", field, value)
            }

            Self::UnknownReference { reference, field } => {
                write!(f, "Unknown {} reference: {}", field, reference)
            }

            Self::InvalidReadNameLength { length, offset } => {
                write!(
                    f,
                    "Invalid read name length at offset {}: {} (must be >= 1)",
                    offset, length
                )
            }

            Self::MissingNulTerminator { field, offset } => {
                write!(f, "Missing NUL terminator in {} at offset {}", field, offset)
            }

            Self::InvalidUtf8 { field, source } => {
                write!(f, "Invalid UTF-8 in {}: {}", field, source)
            }

            Self::InvalidTagType { tag, type_code } => {
                write!(
                    f,
                    "Invalid tag type for {}: {:?}",
                    tag_str(tag),
                    *type_code as char
                )
            }

            Self::InvalidTag { text } => write!(f, "Invalid tag: {}", text),

            Self::DuplicateTag { tag } => write!(f, "Duplicate tag: {}", tag_str(tag)),

            Self::InvalidArraySubtype { subtype } => {
                write!(f, "Invalid array subtype: {:?}", *subtype as char)
            }

            Self::InvalidCigarOp { value } => write!(f, "Invalid CIGAR operation: {}", value),

            Self::InvalidCigar { text } => write!(f, "Invalid CIGAR string: {}", text),

            Self::NegativeSequenceLength { length } => {
                write!(f, "Invalid negative sequence length: {}", length)
            }

            Self::InvalidBase { base } => write!(f, "Invalid base: {:?}", *base as char),

            Self::InvalidQuality { value } => {
                write!(f, "Invalid quality character: {:?}", *value as char)
            }

            Self::QualityLengthMismatch { sequence, quality } => {
                write!(
                    f,
                    "Sequence length {} does not match quality length {}",
                    sequence, quality
                )
            }

            Self::CigarLengthMismatch { cigar, sequence } => {
                write!(
                    f,
                    "CIGAR consumes {} query bases but sequence has {}",
                    cigar, sequence
                )
            }

            Self::MissingFields { found } => {
                write!(f, "Expected at least 11 fields, found {}", found)
            }

            Self::InvalidField { field, value } => write!(f, "Invalid {}: {}", field, value),

            Self::UnexpectedEof {
                context,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Record too short while parsing {}: expected {} bytes, got {}",
                    context, expected, actual
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_duplicate_tag() {
        let err = RecordError::DuplicateTag { tag: *b"NM" };
        assert_eq!(err.to_string(), "Duplicate tag: NM");
    }

    #[test]
    fn test_display_length_mismatch() {
        let err = RecordError::QualityLengthMismatch {
            sequence: 4,
            quality: 3,
        };
        assert!(err.to_string().contains("4"));
        assert!(err.to_string().contains("3"));
    }

    #[test]
    fn test_utf8_source_preserved() {
        let bytes = [0xFF, 0xFE];
        let source = str::from_utf8(&bytes).unwrap_err();
        let err = RecordError::InvalidUtf8 {
            field: "read name".to_string(),
            source,
        };
        assert!(error::Error::source(&err).is_some());
    }
}
