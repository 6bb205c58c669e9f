//! BGZF block cursor with random access by virtual position.
//!
//! BGZF (Blocked GNU Zip Format) is a series of independent gzip members, each
//! carrying its own compressed size in a `BC` extra subfield:
//!
//! ```text
//! offset  size  field
//! 0       1     ID1 = 31
//! 1       1     ID2 = 139
//! 2       1     CM  = 8 (deflate)
//! 3       1     FLG = 4 (FEXTRA)
//! 4       4     MTIME
//! 8       1     XFL
//! 9       1     OS
//! 10      2     XLEN
//! 12      XLEN  extra subfields, including SI1='B' SI2='C' SLEN=2 BSIZE (block size - 1)
//! ...           deflate payload
//! -8      4     CRC32 of decompressed payload
//! -4      4     ISIZE (decompressed length, at most 65536)
//! ```
//!
//! Because every block is self-contained, decompression can restart at any
//! block start. [`BlockCursor`] keeps exactly one decompressed block in memory
//! and exposes the address of the next unread byte as a [`VirtualPosition`].

use crate::error::{AlnseekError, Result};
use crate::io::position::{SeekToken, VirtualPosition};
use flate2::read::DeflateDecoder;
use std::io::{self, Read, Seek, SeekFrom};

/// Maximum decompressed size of a single BGZF block.
pub const MAX_BLOCK_SIZE: usize = 65536;

/// Fixed gzip header length up to and including XLEN.
const GZIP_HEADER_SIZE: usize = 12;

/// CRC32 + ISIZE trailer.
const GZIP_FOOTER_SIZE: usize = 8;

const GZIP_MAGIC: [u8; 2] = [31, 139];

/// Address and sizes of one BGZF block, as reported by [`scan_blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Byte offset of the block's gzip header
    pub offset: u64,
    /// Total compressed size including header and footer
    pub compressed_size: usize,
    /// Decompressed payload size (ISIZE)
    pub uncompressed_size: usize,
}

/// A decompressed block together with where it sits in the compressed stream.
struct LoadedBlock {
    offset: u64,
    next_offset: u64,
    data: Vec<u8>,
}

/// Read until `buf` is full or the reader is exhausted; returns bytes read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read and validate a block header, returning `(total block size, XLEN)`.
///
/// Returns `Ok(None)` when the reader is already at end of stream.
fn read_block_header<R: Read>(reader: &mut R, offset: u64) -> Result<Option<(usize, usize)>> {
    let mut header = [0u8; GZIP_HEADER_SIZE];
    let n = read_up_to(reader, &mut header)?;
    if n == 0 {
        return Ok(None);
    }
    if n < GZIP_HEADER_SIZE {
        return Err(AlnseekError::UnexpectedEndOfStream {
            context: format!("BGZF block header at offset {}", offset),
            expected: GZIP_HEADER_SIZE,
            actual: n,
        });
    }

    if header[0..2] != GZIP_MAGIC {
        return Err(AlnseekError::Compression(format!(
            "Invalid gzip magic at offset {}: [{}, {}]",
            offset, header[0], header[1]
        )));
    }

    // BGZF requires the FEXTRA flag; plain gzip members have no BSIZE
    let flg = header[3];
    if flg & 0x04 == 0 {
        return Err(AlnseekError::Compression(format!(
            "Block at offset {} is gzip but not BGZF (no extra field)",
            offset
        )));
    }

    let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
    let mut extra = vec![0u8; xlen];
    let n = read_up_to(reader, &mut extra)?;
    if n < xlen {
        return Err(AlnseekError::UnexpectedEndOfStream {
            context: format!("BGZF extra field at offset {}", offset),
            expected: xlen,
            actual: n,
        });
    }

    let mut bsize: Option<u16> = None;
    let mut pos = 0;
    while pos + 4 <= xlen {
        let si1 = extra[pos];
        let si2 = extra[pos + 1];
        let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;

        if si1 == b'B' && si2 == b'C' && slen == 2 && pos + 6 <= xlen {
            bsize = Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]));
            break;
        }

        pos += 4 + slen;
    }

    let block_size = match bsize {
        Some(bs) => bs as usize + 1,
        None => {
            return Err(AlnseekError::Compression(format!(
                "Missing BSIZE subfield in block at offset {}",
                offset
            )))
        }
    };

    if block_size < GZIP_HEADER_SIZE + xlen + GZIP_FOOTER_SIZE {
        return Err(AlnseekError::Compression(format!(
            "Invalid block size {} at offset {}",
            block_size, offset
        )));
    }

    Ok(Some((block_size, xlen)))
}

/// Inflate a block's deflate payload and verify it against the gzip trailer.
fn inflate_block(payload: &[u8], footer: &[u8], offset: u64) -> Result<Vec<u8>> {
    let expected_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let isize = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]) as usize;

    if isize > MAX_BLOCK_SIZE {
        return Err(AlnseekError::Compression(format!(
            "Block at offset {} declares {} decompressed bytes (maximum {})",
            offset, isize, MAX_BLOCK_SIZE
        )));
    }

    let mut data = Vec::with_capacity(isize);
    DeflateDecoder::new(payload)
        .read_to_end(&mut data)
        .map_err(|e| {
            AlnseekError::Compression(format!(
                "Failed to inflate block at offset {}: {}",
                offset, e
            ))
        })?;

    if data.len() != isize {
        return Err(AlnseekError::Compression(format!(
            "Block at offset {} inflated to {} bytes, trailer says {}",
            offset,
            data.len(),
            isize
        )));
    }

    let crc = crc32fast::hash(&data);
    if crc != expected_crc {
        return Err(AlnseekError::Compression(format!(
            "CRC mismatch in block at offset {}: computed {:#010x}, stored {:#010x}",
            offset, crc, expected_crc
        )));
    }

    Ok(data)
}

/// Enumerate every block in a BGZF stream without decompressing payloads.
///
/// The reader is left positioned at end of stream.
pub fn scan_blocks<R: Read + Seek>(reader: &mut R) -> Result<Vec<BlockInfo>> {
    let mut blocks = Vec::new();
    let mut offset = reader.seek(SeekFrom::Start(0))?;

    while let Some((block_size, xlen)) = read_block_header(reader, offset)? {
        // Skip the deflate payload and CRC32; ISIZE is all we need
        let skip = block_size - GZIP_HEADER_SIZE - xlen - 4;
        reader.seek(SeekFrom::Current(skip as i64))?;

        let mut isize = [0u8; 4];
        let n = read_up_to(reader, &mut isize)?;
        if n < isize.len() {
            return Err(AlnseekError::UnexpectedEndOfStream {
                context: format!("BGZF block trailer at offset {}", offset),
                expected: isize.len(),
                actual: n,
            });
        }

        blocks.push(BlockInfo {
            offset,
            compressed_size: block_size,
            uncompressed_size: u32::from_le_bytes(isize) as usize,
        });
        offset += block_size as u64;
    }

    Ok(blocks)
}

/// Random-access reader over a BGZF stream.
///
/// Holds one decompressed block. Reads crossing a block boundary load the
/// following block transparently; empty blocks (such as the EOF marker) are
/// stepped over.
///
/// # Example
///
/// ```no_run
/// use alnseek::io::bgzf::BlockCursor;
/// use alnseek::io::position::VirtualPosition;
/// use std::fs::File;
///
/// # fn main() -> alnseek::Result<()> {
/// let mut cursor = BlockCursor::new(File::open("alignments.bam")?)?;
/// cursor.seek(VirtualPosition::new(75, 0))?;
/// let prefix = cursor.read_bytes(4)?;
/// # Ok(())
/// # }
/// ```
pub struct BlockCursor<R> {
    inner: R,
    /// Where `inner` is known to be positioned, if at all
    inner_pos: Option<u64>,
    stream_len: u64,
    block_offset: u64,
    next_block_offset: u64,
    data: Vec<u8>,
    pos: usize,
    /// Address given to the last `seek`, reported until a byte is consumed
    seek_address: Option<VirtualPosition>,
}

impl<R: Read + Seek> BlockCursor<R> {
    /// Wrap a seekable BGZF stream. The cursor starts at virtual position `0:0`.
    pub fn new(mut inner: R) -> Result<Self> {
        let stream_len = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner,
            inner_pos: Some(stream_len),
            stream_len,
            block_offset: 0,
            next_block_offset: 0,
            data: Vec::new(),
            pos: 0,
            seek_address: None,
        })
    }

    /// Total length of the compressed stream.
    pub fn stream_len(&self) -> u64 {
        self.stream_len
    }

    /// Borrow the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consume the cursor, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read and decompress the block starting at `offset`.
    ///
    /// Returns `Ok(None)` when `offset` is the end of the stream.
    fn load_block(&mut self, offset: u64) -> Result<Option<LoadedBlock>> {
        if self.inner_pos != Some(offset) {
            self.inner_pos = None;
            self.inner.seek(SeekFrom::Start(offset))?;
            self.inner_pos = Some(offset);
        }

        let result = self.read_block_at(offset);
        self.inner_pos = match &result {
            Ok(Some(block)) => Some(block.next_offset),
            Ok(None) => Some(offset),
            Err(_) => None,
        };
        result
    }

    fn read_block_at(&mut self, offset: u64) -> Result<Option<LoadedBlock>> {
        let (block_size, xlen) = match read_block_header(&mut self.inner, offset)? {
            Some(sizes) => sizes,
            None => return Ok(None),
        };

        let remaining = block_size - GZIP_HEADER_SIZE - xlen;
        let mut rest = vec![0u8; remaining];
        let n = read_up_to(&mut self.inner, &mut rest)?;
        if n < remaining {
            return Err(AlnseekError::UnexpectedEndOfStream {
                context: format!("BGZF block at offset {}", offset),
                expected: remaining,
                actual: n,
            });
        }

        let (payload, footer) = rest.split_at(remaining - GZIP_FOOTER_SIZE);
        let data = inflate_block(payload, footer, offset)?;
        log::debug!(
            "Loaded BGZF block at offset {} ({} compressed, {} decompressed bytes)",
            offset,
            block_size,
            data.len()
        );

        Ok(Some(LoadedBlock {
            offset,
            next_offset: offset + block_size as u64,
            data,
        }))
    }

    fn install(&mut self, block: LoadedBlock, pos: usize) {
        self.block_offset = block.offset;
        self.next_block_offset = block.next_offset;
        self.data = block.data;
        self.pos = pos;
    }

    /// Make sure at least one unread decompressed byte is buffered.
    ///
    /// Returns `false` at end of stream.
    fn fill(&mut self) -> Result<bool> {
        while self.pos >= self.data.len() {
            match self.load_block(self.next_block_offset)? {
                Some(block) => self.install(block, 0),
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Discard the current block and load the one starting at `offset`.
    pub fn seek_to_block_start(&mut self, offset: u64) -> Result<()> {
        self.seek(VirtualPosition::new(offset, 0))
    }

    /// Position the cursor at `position`.
    ///
    /// The block must exist and the intra-block offset must not exceed its
    /// decompressed length. On failure the previous position is kept.
    pub fn seek(&mut self, position: VirtualPosition) -> Result<()> {
        let invalid = |reason: String| AlnseekError::InvalidToken {
            token: SeekToken::from_raw(position.pack()),
            reason,
        };

        if position.block_offset > self.stream_len {
            return Err(invalid(format!(
                "block offset {} lies beyond the end of the stream ({} bytes)",
                position.block_offset, self.stream_len
            )));
        }

        let block = match self.load_block(position.block_offset) {
            Ok(block) => block,
            Err(AlnseekError::Io(e)) => return Err(AlnseekError::Io(e)),
            Err(e) => {
                return Err(invalid(format!(
                    "no BGZF block starts at offset {}: {}",
                    position.block_offset, e
                )))
            }
        };

        match block {
            Some(block) => {
                let intra = position.intra_offset as usize;
                if intra > block.data.len() {
                    return Err(invalid(format!(
                        "intra-block offset {} exceeds block length {}",
                        intra,
                        block.data.len()
                    )));
                }
                log::debug!("BGZF cursor seek to {}", position);
                self.install(block, intra);
            }
            None => {
                if position.intra_offset != 0 {
                    return Err(invalid(format!(
                        "intra-block offset {} at end of stream",
                        position.intra_offset
                    )));
                }
                self.block_offset = position.block_offset;
                self.next_block_offset = position.block_offset;
                self.data.clear();
                self.pos = 0;
            }
        }

        self.seek_address = Some(position);
        Ok(())
    }

    /// Address of the next unread byte.
    ///
    /// A fully consumed block reports the start of the following block with
    /// offset 0, so the address of a given byte is unique. Right after a
    /// `seek` the requested address is reported until a byte is read, which
    /// keeps it stable when it names an empty block.
    pub fn current_address(&self) -> VirtualPosition {
        if let Some(position) = self.seek_address {
            return position;
        }
        if self.pos >= self.data.len() {
            VirtualPosition::new(self.next_block_offset, 0)
        } else {
            VirtualPosition::new(self.block_offset, self.pos as u16)
        }
    }

    /// Whether at least one more decompressed byte is available.
    pub fn has_remaining(&mut self) -> Result<bool> {
        self.fill()
    }

    /// Fill `buf` completely, crossing block boundaries as needed.
    pub fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            if !self.fill()? {
                return Err(AlnseekError::UnexpectedEndOfStream {
                    context: "BGZF data".to_string(),
                    expected: buf.len(),
                    actual: filled,
                });
            }
            let n = (buf.len() - filled).min(self.data.len() - self.pos);
            buf[filled..filled + n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            self.seek_address = None;
            filled += n;
        }
        Ok(())
    }

    /// Read exactly `n` decompressed bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_exact_into(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read + Seek> Read for BlockCursor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let available = self.fill().map_err(|e| match e {
            AlnseekError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        })?;
        if !available {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        self.seek_address = None;
        Ok(n)
    }
}
