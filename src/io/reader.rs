//! Format-independent alignment reader.

use crate::error::Result;
use crate::io::bam::error::RecordError;
use crate::io::bam::{BamSource, Header, Record, SamSource};
use crate::io::iterator::{RecordIterator, RecordSource};
use crate::io::position::SeekToken;
use crate::io::source::{Format, ReaderOptions, SourceReader};
use std::io::{BufRead, Seek};
use std::path::Path;

/// Either record source, chosen by format detection.
pub enum Source<R> {
    /// SAM text
    Sam(SamSource<R>),
    /// BAM binary
    Bam(BamSource<R>),
}

impl<R: BufRead + Seek> Source<R> {
    fn header(&self) -> &Header {
        match self {
            Source::Sam(source) => source.header(),
            Source::Bam(source) => source.header(),
        }
    }

    fn first_record(&self) -> SeekToken {
        match self {
            Source::Sam(source) => source.first_record(),
            Source::Bam(source) => source.first_record(),
        }
    }

    fn get_ref(&self) -> &R {
        match self {
            Source::Sam(source) => source.get_ref(),
            Source::Bam(source) => source.get_ref(),
        }
    }
}

impl<R: BufRead + Seek> RecordSource for Source<R> {
    fn tell(&self) -> SeekToken {
        match self {
            Source::Sam(source) => source.tell(),
            Source::Bam(source) => source.tell(),
        }
    }

    fn seek(&mut self, token: SeekToken) -> Result<()> {
        match self {
            Source::Sam(source) => source.seek(token),
            Source::Bam(source) => source.seek(token),
        }
    }

    fn read_record(&mut self) -> Result<Option<std::result::Result<Record, RecordError>>> {
        match self {
            Source::Sam(source) => source.read_record(),
            Source::Bam(source) => source.read_record(),
        }
    }
}

/// Reader for SAM or BAM input with position-addressable iteration.
///
/// The encoding is detected from the first bytes of the input. One iterator
/// at a time borrows the reader; independent iterators over the same file
/// need independent handles from [`reopen`](AlignmentReader::reopen).
///
/// # Example
///
/// ```no_run
/// use alnseek::AlignmentReader;
///
/// # fn main() -> alnseek::Result<()> {
/// let mut reader = AlignmentReader::from_path("alignments.sam")?;
/// println!("{} references", reader.header().references().len());
///
/// let mut bookmarks = Vec::new();
/// let mut records = reader.records()?;
/// while !records.is_end()? {
///     bookmarks.push(records.file_position()?);
///     records.advance()?;
/// }
///
/// // Revisit the records in reverse
/// for token in bookmarks.into_iter().rev() {
///     records.seek_to(token)?;
///     println!("{}", records.dereference()?.id);
/// }
/// # Ok(())
/// # }
/// ```
pub struct AlignmentReader<R> {
    source: Source<R>,
    format: Format,
    options: ReaderOptions,
}

impl AlignmentReader<SourceReader> {
    /// Open a file with default options.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_path_with_options(path, ReaderOptions::default())
    }

    /// Open a file, memory-mapping it when it reaches the configured threshold.
    pub fn from_path_with_options<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        let reader = SourceReader::open(path, options.mmap_threshold)?;
        let reader = Self::with_options(reader, options)?;
        log::info!("Opened {} as {:?}", path.display(), reader.format);
        Ok(reader)
    }

    /// Open an independent reader over the same file.
    ///
    /// Tokens obtained from either reader are valid in both.
    pub fn reopen(&self) -> Result<Self> {
        let handle = self.source.get_ref().reopen()?;
        Self::with_options(handle, self.options)
    }
}

impl<R: BufRead + Seek> AlignmentReader<R> {
    /// Read the header from `reader` with default options.
    pub fn new(reader: R) -> Result<Self> {
        Self::with_options(reader, ReaderOptions::default())
    }

    /// Detect the encoding of `reader` and read its header.
    pub fn with_options(mut reader: R, options: ReaderOptions) -> Result<Self> {
        let format = Format::detect(reader.fill_buf()?);
        let source = match format {
            Format::Sam => Source::Sam(SamSource::new(reader)?),
            Format::Bam => Source::Bam(BamSource::new(reader)?),
        };

        Ok(Self {
            source,
            format,
            options,
        })
    }

    /// Parsed header.
    pub fn header(&self) -> &Header {
        self.source.header()
    }

    /// Detected encoding.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Options the reader was opened with.
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Token of the first record.
    pub fn first_record(&self) -> SeekToken {
        self.source.first_record()
    }

    /// Iterate over the records from the first one.
    pub fn records(&mut self) -> Result<RecordIterator<&mut Source<R>>> {
        let first = self.source.first_record();
        self.source.seek(first)?;
        Ok(RecordIterator::new(&mut self.source, self.options.malformed_records))
    }

    /// Consume the reader, returning the underlying handle.
    pub fn into_inner(self) -> R {
        match self.source {
            Source::Sam(source) => source.into_inner(),
            Source::Bam(source) => source.into_inner(),
        }
    }
}
