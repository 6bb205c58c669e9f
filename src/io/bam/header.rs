//! Alignment file header parsing.
//!
//! Both encodings carry the same logical header: free-form `@` lines plus a
//! table of reference sequences that records refer to by index.
//!
//! # BAM layout
//!
//! ```text
//! magic     char[4]   "BAM\1"
//! l_text    int32     length of the SAM header text
//! text      char[l_text]
//! n_ref     int32     number of reference sequences
//! for each reference:
//!   l_name  int32     name length including NUL
//!   name    char[l_name]
//!   l_ref   int32     sequence length
//! ```
//!
//! # SAM layout
//!
//! Leading lines starting with `@`. `@SQ` lines define references through
//! their `SN` (name) and `LN` (length) fields, in order.

use crate::error::{AlnseekError, Result};
use std::collections::HashMap;
use std::io::{self, Read};

const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// Lookup between reference names and the indices records carry.
pub trait ReferenceDictionary {
    /// Index of the reference called `name`.
    fn reference_id(&self, name: &str) -> Option<usize>;

    /// Name of the reference at `id`.
    fn reference_name(&self, id: usize) -> Option<&str>;

    /// Number of references.
    fn reference_count(&self) -> usize;
}

/// Reference sequence information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference sequence name (e.g., "chr1")
    pub name: String,
    /// Reference sequence length in bases
    pub length: u32,
}

impl Reference {
    /// Create a new reference.
    pub fn new(name: String, length: u32) -> Self {
        Self { name, length }
    }
}

/// Alignment file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header text (`@` lines)
    pub text: String,
    /// Reference sequences, in index order
    references: Vec<Reference>,
    index: HashMap<String, usize>,
}

impl Header {
    /// Create a new header. When a name repeats, the first occurrence wins.
    pub fn new(text: String, references: Vec<Reference>) -> Self {
        let mut index = HashMap::with_capacity(references.len());
        for (id, reference) in references.iter().enumerate() {
            index.entry(reference.name.clone()).or_insert(id);
        }
        Self {
            text,
            references,
            index,
        }
    }

    /// Reference sequences in index order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Get reference by ID.
    pub fn reference(&self, id: usize) -> Option<&Reference> {
        self.references.get(id)
    }
}

impl ReferenceDictionary for Header {
    fn reference_id(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn reference_name(&self, id: usize) -> Option<&str> {
        self.reference(id).map(|r| r.name.as_str())
    }

    fn reference_count(&self) -> usize {
        self.references.len()
    }
}

fn invalid(msg: impl Into<String>) -> AlnseekError {
    AlnseekError::InvalidHeader(msg.into())
}

/// Map a short read inside the header to a header error; other I/O errors pass through.
fn header_io(context: &str) -> impl Fn(io::Error) -> AlnseekError + '_ {
    move |e| match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
            invalid(format!("{}: {}", context, e))
        }
        _ => AlnseekError::Io(e),
    }
}

fn read_i32<R: Read>(reader: &mut R, context: &str) -> Result<i32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes).map_err(header_io(context))?;
    Ok(i32::from_le_bytes(bytes))
}

/// Read and validate BAM magic bytes.
pub fn read_magic<R: Read>(reader: &mut R) -> Result<()> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(header_io("BAM magic"))?;

    if &magic != BAM_MAGIC {
        return Err(invalid(format!(
            "Invalid BAM magic: expected {:?}, got {:?}",
            BAM_MAGIC, magic
        )));
    }

    Ok(())
}

/// Read the SAM header text embedded in a BAM header.
pub fn read_header_text<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_i32(reader, "header text length")?;
    if len < 0 {
        return Err(invalid(format!("Invalid SAM header length: {}", len)));
    }

    let mut text_bytes = vec![0u8; len as usize];
    reader
        .read_exact(&mut text_bytes)
        .map_err(header_io("header text"))?;

    // Some writers pad the text with NULs
    while text_bytes.last() == Some(&0) {
        text_bytes.pop();
    }

    String::from_utf8(text_bytes)
        .map_err(|e| invalid(format!("Invalid UTF-8 in SAM header: {}", e)))
}

/// Read one reference entry.
pub fn read_reference<R: Read>(reader: &mut R) -> Result<Reference> {
    let name_len = read_i32(reader, "reference name length")?;
    if name_len <= 0 {
        return Err(invalid(format!("Invalid reference name length: {}", name_len)));
    }

    let mut name_bytes = vec![0u8; name_len as usize];
    reader
        .read_exact(&mut name_bytes)
        .map_err(header_io("reference name"))?;

    if name_bytes.last() != Some(&0) {
        return Err(invalid("Reference name not null-terminated"));
    }
    name_bytes.pop();

    let name = String::from_utf8(name_bytes)
        .map_err(|e| invalid(format!("Invalid UTF-8 in reference name: {}", e)))?;

    let length = read_i32(reader, "reference length")?;
    if length < 0 {
        return Err(invalid(format!("Invalid reference length: {}", length)));
    }

    Ok(Reference::new(name, length as u32))
}

/// Read the reference table.
pub fn read_references<R: Read>(reader: &mut R) -> Result<Vec<Reference>> {
    let count = read_i32(reader, "reference count")?;
    if count < 0 {
        return Err(invalid(format!("Invalid reference count: {}", count)));
    }

    // Cap the preallocation; a corrupt count must not allocate gigabytes
    let mut references = Vec::with_capacity((count as usize).min(1 << 16));
    for i in 0..count {
        let reference = read_reference(reader).map_err(|e| match e {
            AlnseekError::InvalidHeader(msg) => {
                invalid(format!("Error reading reference {}: {}", i, msg))
            }
            other => other,
        })?;
        references.push(reference);
    }

    Ok(references)
}

/// Read a complete BAM header from decompressed data.
pub fn read_header<R: Read>(reader: &mut R) -> Result<Header> {
    read_magic(reader)?;
    let text = read_header_text(reader)?;
    let references = read_references(reader)?;
    Ok(Header::new(text, references))
}

/// Parse an `@SQ` line into a reference, if it carries both `SN` and `LN`.
pub fn parse_sq_line(line: &str) -> Option<Reference> {
    let mut name = None;
    let mut length = None;

    for field in line.trim_end_matches('\r').split('\t').skip(1) {
        if let Some((key, value)) = field.split_once(':') {
            match key {
                "SN" => name = Some(value.to_string()),
                "LN" => length = value.parse::<u32>().ok(),
                _ => {}
            }
        }
    }

    Some(Reference::new(name?, length?))
}

/// Build a header from SAM `@` lines.
pub fn parse_sam_header(text: &str) -> Result<Header> {
    let mut references = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        if !line.starts_with('@') {
            return Err(invalid(format!(
                "Header line {} does not start with '@': {}",
                line_no + 1,
                line
            )));
        }
        if line.starts_with("@SQ\t") {
            let reference = parse_sq_line(line).ok_or_else(|| {
                invalid(format!("@SQ line {} lacks SN or LN: {}", line_no + 1, line))
            })?;
            references.push(reference);
        }
    }

    Ok(Header::new(text.to_string(), references))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn bam_header_bytes(text: &str, refs: &[(&str, i32)]) -> Vec<u8> {
        let mut data = BAM_MAGIC.to_vec();
        data.extend_from_slice(&(text.len() as i32).to_le_bytes());
        data.extend_from_slice(text.as_bytes());
        data.extend_from_slice(&(refs.len() as i32).to_le_bytes());
        for (name, len) in refs {
            data.extend_from_slice(&(name.len() as i32 + 1).to_le_bytes());
            data.extend_from_slice(name.as_bytes());
            data.push(0);
            data.extend_from_slice(&len.to_le_bytes());
        }
        data
    }

    #[test]
    fn test_read_magic_invalid() {
        let mut cursor = Cursor::new(b"BAMX");
        assert!(matches!(
            read_magic(&mut cursor),
            Err(AlnseekError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_read_header() {
        let data = bam_header_bytes("@HD\tVN:1.6\n", &[("chr1", 1000), ("chr2", 500)]);
        let header = read_header(&mut Cursor::new(data)).unwrap();
        assert_eq!(header.text, "@HD\tVN:1.6\n");
        assert_eq!(header.reference_count(), 2);
        assert_eq!(header.reference_id("chr2"), Some(1));
        assert_eq!(header.reference_name(0), Some("chr1"));
        assert_eq!(header.reference(1).map(|r| r.length), Some(500));
    }

    #[test]
    fn test_read_header_truncated() {
        let mut data = bam_header_bytes("", &[("chr1", 1000)]);
        data.truncate(data.len() - 2);
        assert!(matches!(
            read_header(&mut Cursor::new(data)),
            Err(AlnseekError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_negative_reference_length() {
        let data = bam_header_bytes("", &[("chr1", -5)]);
        assert!(read_header(&mut Cursor::new(data)).is_err());
    }

    #[test]
    fn test_parse_sq_line() {
        let reference = parse_sq_line("@SQ\tSN:ref\tLN:34").unwrap();
        assert_eq!(reference, Reference::new("ref".to_string(), 34));
        assert!(parse_sq_line("@SQ\tSN:ref").is_none());
    }

    #[test]
    fn test_parse_sam_header() {
        let header =
            parse_sam_header("@HD\tVN:1.6\n@SQ\tSN:ref\tLN:34\n@SQ\tSN:alt\tLN:10\n").unwrap();
        assert_eq!(header.reference_count(), 2);
        assert_eq!(header.reference_id("alt"), Some(1));
        assert_eq!(header.reference_id("missing"), None);
    }

    #[test]
    fn test_parse_sam_header_rejects_bad_sq() {
        assert!(parse_sam_header("@SQ\tLN:34\n").is_err());
    }
}
