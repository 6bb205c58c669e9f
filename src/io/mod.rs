//! I/O module: positions, BGZF blocks, record sources and iteration
//!
//! Layers, bottom up:
//!
//! - [`position`]: seek tokens and the codecs that pack positions into them
//! - [`bgzf`]: block-level access to BGZF streams by virtual position
//! - [`bam`]: SAM and BAM headers and records
//! - [`iterator`]: the seekable [`RecordIterator`]
//! - [`reader`] and [`source`]: opening files and choosing the format

pub mod bam;
pub mod bgzf;
pub mod iterator;
pub mod position;
pub mod reader;
pub mod source;

pub use bgzf::{scan_blocks, BlockCursor, BlockInfo};
pub use iterator::{RecordIterator, RecordSource, SkippedRecord};
pub use position::{LinearCodec, PositionCodec, SeekToken, VirtualCodec, VirtualPosition};
pub use reader::AlignmentReader;
pub use source::{Format, MalformedRecordPolicy, ReaderOptions, SourceReader, MMAP_THRESHOLD};
