//! alnseek: seekable SAM/BAM alignment record iteration
//!
//! # Overview
//!
//! alnseek reads SAM text and BAM binary alignment files record by record and
//! lets callers bookmark any record with an opaque [`SeekToken`] and return to
//! it later, in any order, without rescanning the file.
//!
//! ## Key Features
//!
//! - **One record type**: SAM and BAM decode to the same [`Record`]
//! - **Stable positions**: tokens are byte offsets for SAM and BGZF virtual
//!   offsets for BAM, so they are interchangeable with other tools' offsets
//! - **Lazy parsing**: a repositioned iterator parses nothing until asked
//! - **Malformed input**: bad records are skipped with a diagnostic or
//!   abort iteration, per [`MalformedRecordPolicy`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use alnseek::AlignmentReader;
//!
//! # fn main() -> alnseek::Result<()> {
//! let mut reader = AlignmentReader::from_path("alignments.bam")?;
//! let mut records = reader.records()?;
//!
//! // The first advance materializes the first record, the next one the second
//! records.advance()?;
//! records.advance()?;
//! let second = records.file_position()?;
//!
//! for record in records.by_ref() {
//!     println!("{}", record?.id);
//! }
//!
//! records.seek_to(second)?;
//! println!("second record: {}", records.dereference()?.id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`error`]: error types
//! - [`io`]: position codecs, BGZF blocks, SAM/BAM parsing and iteration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod io;

// Re-export commonly used types
pub use error::{AlnseekError, Result};
pub use io::bam::{Header, Record, RecordError};
pub use io::{
    AlignmentReader, Format, MalformedRecordPolicy, ReaderOptions, RecordIterator, SeekToken,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
