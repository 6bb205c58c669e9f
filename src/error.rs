//! Error types for alnseek

use crate::io::bam::error::RecordError;
use crate::io::position::SeekToken;
use thiserror::Error;

/// Result type alias for alnseek operations
pub type Result<T> = std::result::Result<T, AlnseekError>;

/// Error types that can occur while reading and seeking alignment streams
#[derive(Debug, Error)]
pub enum AlnseekError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A seek token could not be decoded, or does not address a position in this stream
    #[error("Invalid seek token {token}: {reason}")]
    InvalidToken {
        /// The rejected token
        token: SeekToken,
        /// Why it was rejected
        reason: String,
    },

    /// The compressed stream ended while more decompressed bytes were required
    #[error("Unexpected end of stream while reading {context}: expected {expected} bytes, got {actual}")]
    UnexpectedEndOfStream {
        /// What was being read
        context: String,
        /// Bytes requested
        expected: usize,
        /// Bytes available before the stream ended
        actual: usize,
    },

    /// The source ended in the middle of a record
    #[error("Truncated stream at {position}: {context}")]
    TruncatedStream {
        /// Position immediately before the partial record
        position: SeekToken,
        /// What was being read when the stream ended
        context: String,
    },

    /// A record was framed correctly but its content could not be decoded
    #[error("Malformed record at {position}: {source}")]
    MalformedRecord {
        /// Position immediately before the malformed record
        position: SeekToken,
        /// Decode failure
        #[source]
        source: RecordError,
    },

    /// Dereference or position query while no record is current
    #[error("No current record: iterator is at end of stream")]
    NoCurrentRecord,

    /// A previous fatal error stopped iteration; only a seek can resume
    #[error("Iteration aborted after a fatal error at {position}; seek to resume")]
    IterationAborted {
        /// Position at which the fatal error occurred
        position: SeekToken,
    },

    /// Invalid file header
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),
}
