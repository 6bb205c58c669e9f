//! Opening alignment files: format detection, I/O method selection and
//! reader options.

use crate::error::Result;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Memory-mapped file threshold (50 MB)
///
/// Below this size buffered reads are as fast as a mapping and avoid the
/// setup cost; above it the mapping wins, most of all for random access.
pub const MMAP_THRESHOLD: u64 = 50 * 1024 * 1024;

/// What to do when a framed record fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedRecordPolicy {
    /// Log a warning, record a diagnostic and continue with the next record
    #[default]
    Skip,
    /// Return the error; the iterator stays positioned after the bad record
    Abort,
}

/// Options controlling how a source is opened and iterated.
///
/// # Example
///
/// ```
/// use alnseek::{MalformedRecordPolicy, ReaderOptions};
///
/// let options = ReaderOptions::default()
///     .with_malformed_records(MalformedRecordPolicy::Abort)
///     .with_mmap_threshold(0);
/// assert_eq!(options.malformed_records, MalformedRecordPolicy::Abort);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Malformed-record handling for iterators created from the reader
    pub malformed_records: MalformedRecordPolicy,
    /// Files at least this large are memory-mapped
    pub mmap_threshold: u64,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            malformed_records: MalformedRecordPolicy::default(),
            mmap_threshold: MMAP_THRESHOLD,
        }
    }
}

impl ReaderOptions {
    /// Set the malformed-record policy.
    pub fn with_malformed_records(mut self, policy: MalformedRecordPolicy) -> Self {
        self.malformed_records = policy;
        self
    }

    /// Set the memory-mapping threshold in bytes.
    pub fn with_mmap_threshold(mut self, threshold: u64) -> Self {
        self.mmap_threshold = threshold;
        self
    }
}

/// Alignment encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Tab-separated text
    Sam,
    /// BGZF-compressed binary
    Bam,
}

impl Format {
    /// Detect the encoding from the leading bytes of a file.
    ///
    /// A gzip magic number means BAM; anything else, including an empty
    /// file, is treated as SAM.
    pub fn detect(prefix: &[u8]) -> Self {
        if prefix.starts_with(&[31, 139]) {
            Format::Bam
        } else {
            Format::Sam
        }
    }
}

/// Shared read-only mapping, cheap to clone.
#[derive(Debug, Clone)]
pub struct SharedMmap(Arc<Mmap>);

impl AsRef<[u8]> for SharedMmap {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// File handle chosen by size: buffered reads for small files, a memory
/// mapping for large ones.
#[derive(Debug)]
pub enum SourceReader {
    /// Standard buffered file I/O
    Buffered {
        /// Open file
        reader: BufReader<File>,
        /// Path it was opened from, for reopening
        path: PathBuf,
    },
    /// Memory-mapped file
    Mapped(Cursor<SharedMmap>),
}

impl SourceReader {
    /// Open `path`, mapping it into memory when it is at least `mmap_threshold` bytes.
    pub fn open<P: AsRef<Path>>(path: P, mmap_threshold: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size >= mmap_threshold && file_size > 0 {
            // SAFETY: the mapping is read-only; concurrent truncation of the
            // file by another process is outside what this reader supports.
            let mmap = unsafe { Mmap::map(&file)? };
            log::debug!("Memory-mapped {} ({} bytes)", path.display(), file_size);
            Ok(SourceReader::Mapped(Cursor::new(SharedMmap(Arc::new(mmap)))))
        } else {
            log::debug!("Opened {} with buffered I/O ({} bytes)", path.display(), file_size);
            Ok(SourceReader::Buffered {
                reader: BufReader::new(file),
                path: path.to_path_buf(),
            })
        }
    }

    /// Open an independent handle on the same data, positioned at the start.
    pub fn reopen(&self) -> Result<Self> {
        match self {
            SourceReader::Buffered { path, .. } => Ok(SourceReader::Buffered {
                reader: BufReader::new(File::open(path)?),
                path: path.clone(),
            }),
            SourceReader::Mapped(cursor) => {
                Ok(SourceReader::Mapped(Cursor::new(cursor.get_ref().clone())))
            }
        }
    }

    /// Whether the data is memory-mapped.
    pub fn is_mapped(&self) -> bool {
        matches!(self, SourceReader::Mapped(_))
    }
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SourceReader::Buffered { reader, .. } => reader.read(buf),
            SourceReader::Mapped(cursor) => cursor.read(buf),
        }
    }
}

impl BufRead for SourceReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            SourceReader::Buffered { reader, .. } => reader.fill_buf(),
            SourceReader::Mapped(cursor) => cursor.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            SourceReader::Buffered { reader, .. } => reader.consume(amt),
            SourceReader::Mapped(cursor) => cursor.consume(amt),
        }
    }
}

impl Seek for SourceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            SourceReader::Buffered { reader, .. } => reader.seek(pos),
            SourceReader::Mapped(cursor) => cursor.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mmap_threshold_value() {
        assert_eq!(MMAP_THRESHOLD, 50 * 1024 * 1024);
        assert_eq!(ReaderOptions::default().mmap_threshold, MMAP_THRESHOLD);
        assert_eq!(
            ReaderOptions::default().malformed_records,
            MalformedRecordPolicy::Skip
        );
    }

    #[test]
    fn test_format_detect() {
        assert_eq!(Format::detect(&[31, 139, 8, 4]), Format::Bam);
        assert_eq!(Format::detect(b"@HD\tVN:1.6"), Format::Sam);
        assert_eq!(Format::detect(b""), Format::Sam);
    }

    #[test]
    fn test_small_file_uses_buffered_io() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        let reader = SourceReader::open(file.path(), MMAP_THRESHOLD).unwrap();
        assert!(!reader.is_mapped());
    }

    #[test]
    fn test_mapped_file_reads_and_reopens() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"line one\nline two\n").unwrap();

        let mut reader = SourceReader::open(file.path(), 0).unwrap();
        assert!(reader.is_mapped());

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "line one\n");

        let mut other = reader.reopen().unwrap();
        let mut all = String::new();
        other.read_to_string(&mut all).unwrap();
        assert_eq!(all, "line one\nline two\n");

        // The original handle keeps its own position
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "line two\n");
    }

    #[test]
    fn test_buffered_seek() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        let mut reader = SourceReader::open(file.path(), MMAP_THRESHOLD).unwrap();
        reader.seek(SeekFrom::Start(4)).unwrap();
        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"456");
    }
}
