//! SAM and BAM record decoding.
//!
//! Both encodings decode to the same [`Record`]:
//!
//! - [`reader::BamSource`] frames length-prefixed binary records over a BGZF
//!   [`BlockCursor`](crate::io::bgzf::BlockCursor)
//! - [`sam_reader::SamSource`] frames newline-terminated text records
//!
//! The parsing functions are usable on their own for callers that do their
//! own framing.
//!
//! # Example
//!
//! ```
//! use alnseek::io::bam::{parse_sam_header, parse_sam_record};
//!
//! let header = parse_sam_header("@SQ\tSN:chr1\tLN:1000\n").unwrap();
//! let record = parse_sam_record(
//!     "read1\t0\tchr1\t100\t60\t4M\t*\t0\t0\tACGT\tIIII",
//!     &header,
//! )
//! .unwrap();
//! assert_eq!(record.reference_position, Some(99));
//! assert_eq!(record.cigar_string(), "4M");
//! ```

pub mod cigar;
pub mod error;
pub mod header;
pub mod reader;
pub mod record;
pub mod sam_reader;
pub mod sequence;
pub mod tags;

pub use cigar::{parse_cigar, parse_cigar_string, CigarOp};
pub use error::RecordError;
pub use header::{parse_sam_header, read_header, Header, Reference, ReferenceDictionary};
pub use reader::BamSource;
pub use record::{parse_record, Alignment, Record};
pub use sam_reader::{parse_sam_record, SamSource};
pub use sequence::decode_sequence;
pub use tags::{parse_sam_tag, parse_tags, ArrayValue, TagValue, Tags};
