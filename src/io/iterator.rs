//! Position-addressable record iteration.
//!
//! [`RecordIterator`] walks the records of one open source and can be
//! repositioned at any time with a [`SeekToken`] previously obtained from
//! [`RecordIterator::file_position`]. Records reached after a seek are
//! identical to the records forward iteration produces at the same place.
//!
//! # States
//!
//! ```text
//!                 advance / dereference
//!   Positioned ───────────────────────────▶ Materialized(record)
//!       ▲  ▲                                   │      │
//!       │  └──────────── next() ───────────────┘      │ advance
//!       │                                             ▼
//!       └──────────── seek_to (from any state) ── EndOfStream / Aborted
//! ```
//!
//! Parsing is lazy: a freshly positioned iterator holds no record until
//! something needs one.

use crate::error::{AlnseekError, Result};
use crate::io::bam::error::RecordError;
use crate::io::bam::record::Record;
use crate::io::position::SeekToken;
use crate::io::source::MalformedRecordPolicy;

/// Upper bound on retained skip diagnostics; the count keeps going past it.
const MAX_DIAGNOSTICS: usize = 256;

/// A record stream that can report and restore its position.
///
/// Implemented by the SAM and BAM sources. `read_record` distinguishes three
/// outcomes: end of stream (`Ok(None)`), a framed record that did or did not
/// decode (`Ok(Some(..))`), and a fatal stream error (`Err`).
pub trait RecordSource {
    /// Token for the position immediately before the next unread record.
    fn tell(&self) -> SeekToken;

    /// Restore the position encoded in `token`.
    ///
    /// On error the source keeps its previous position.
    fn seek(&mut self, token: SeekToken) -> Result<()>;

    /// Frame and decode the next record.
    fn read_record(&mut self) -> Result<Option<std::result::Result<Record, RecordError>>>;
}

impl<S: RecordSource + ?Sized> RecordSource for &mut S {
    fn tell(&self) -> SeekToken {
        (**self).tell()
    }

    fn seek(&mut self, token: SeekToken) -> Result<()> {
        (**self).seek(token)
    }

    fn read_record(&mut self) -> Result<Option<std::result::Result<Record, RecordError>>> {
        (**self).read_record()
    }
}

/// A record that was skipped under [`MalformedRecordPolicy::Skip`].
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    /// Position immediately before the skipped record
    pub position: SeekToken,
    /// Why it could not be decoded
    pub error: RecordError,
}

#[derive(Debug)]
enum State {
    Positioned,
    Materialized { before: SeekToken, record: Record },
    EndOfStream,
    Aborted(SeekToken),
}

/// Iterator over the records of one source with seek support.
///
/// # Example
///
/// ```no_run
/// use alnseek::AlignmentReader;
///
/// # fn main() -> alnseek::Result<()> {
/// let mut reader = AlignmentReader::from_path("alignments.bam")?;
/// let mut records = reader.records()?;
///
/// let first = records.file_position()?;
/// let name = records.dereference()?.id.clone();
///
/// records.advance()?;
/// records.seek_to(first)?;
/// assert_eq!(records.dereference()?.id, name);
/// # Ok(())
/// # }
/// ```
pub struct RecordIterator<S> {
    source: S,
    state: State,
    policy: MalformedRecordPolicy,
    diagnostics: Vec<SkippedRecord>,
    skipped: usize,
}

impl<S: RecordSource> RecordIterator<S> {
    /// Start iterating at the source's current position.
    pub fn new(source: S, policy: MalformedRecordPolicy) -> Self {
        Self {
            source,
            state: State::Positioned,
            policy,
            diagnostics: Vec::new(),
            skipped: 0,
        }
    }

    /// Move to the next record and parse it.
    ///
    /// At end of stream this is a no-op. After a fatal error it fails with
    /// [`AlnseekError::IterationAborted`] until the next [`seek_to`](Self::seek_to).
    pub fn advance(&mut self) -> Result<()> {
        match self.state {
            State::EndOfStream => return Ok(()),
            State::Aborted(position) => return Err(AlnseekError::IterationAborted { position }),
            State::Positioned | State::Materialized { .. } => {}
        }

        loop {
            let before = self.source.tell();
            match self.source.read_record() {
                Ok(None) => {
                    log::trace!("End of stream at {}", before);
                    self.state = State::EndOfStream;
                    return Ok(());
                }
                Ok(Some(Ok(record))) => {
                    log::trace!("Record {} at {}", record.id, before);
                    self.state = State::Materialized { before, record };
                    return Ok(());
                }
                Ok(Some(Err(error))) => match self.policy {
                    MalformedRecordPolicy::Skip => {
                        log::warn!("Skipping malformed record at {}: {}", before, error);
                        self.skipped += 1;
                        if self.diagnostics.len() < MAX_DIAGNOSTICS {
                            self.diagnostics.push(SkippedRecord {
                                position: before,
                                error,
                            });
                        }
                    }
                    MalformedRecordPolicy::Abort => {
                        self.state = State::Positioned;
                        return Err(AlnseekError::MalformedRecord {
                            position: before,
                            source: error,
                        });
                    }
                },
                Err(e) => {
                    log::debug!("Iteration aborted at {}: {}", before, e);
                    self.state = State::Aborted(before);
                    return Err(e);
                }
            }
        }
    }

    /// The current record, parsing it first if the iterator is only positioned.
    pub fn dereference(&mut self) -> Result<&Record> {
        if let State::Positioned = self.state {
            self.advance()?;
        }
        match &self.state {
            State::Materialized { record, .. } => Ok(record),
            State::Aborted(position) => Err(AlnseekError::IterationAborted {
                position: *position,
            }),
            State::EndOfStream | State::Positioned => Err(AlnseekError::NoCurrentRecord),
        }
    }

    /// Token that restores the current position.
    ///
    /// With a record materialized this is the position before that record;
    /// otherwise it is the position before the next unread record.
    pub fn file_position(&self) -> Result<SeekToken> {
        match &self.state {
            State::Materialized { before, .. } => Ok(*before),
            State::Positioned => Ok(self.source.tell()),
            State::EndOfStream | State::Aborted(_) => Err(AlnseekError::NoCurrentRecord),
        }
    }

    /// Reposition at `token`. Valid from every state, including end of stream.
    ///
    /// On failure the iterator is left exactly as it was.
    pub fn seek_to(&mut self, token: SeekToken) -> Result<()> {
        self.source.seek(token)?;
        log::debug!("Iterator seek to {}", token);
        self.state = State::Positioned;
        Ok(())
    }

    /// Whether the iterator has passed the last record.
    ///
    /// A positioned iterator parses its pending record to find out, and keeps
    /// it, so checking never consumes input twice.
    pub fn is_end(&mut self) -> Result<bool> {
        if let State::Positioned = self.state {
            self.advance()?;
        }
        Ok(matches!(self.state, State::EndOfStream))
    }

    /// Records skipped as malformed, up to a fixed retention limit.
    pub fn diagnostics(&self) -> &[SkippedRecord] {
        &self.diagnostics
    }

    /// Total number of records skipped as malformed.
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: RecordSource> Iterator for RecordIterator<S> {
    type Item = Result<Record>;

    /// Yield the current record and move past it.
    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            State::EndOfStream | State::Aborted(_) => return None,
            State::Positioned => {
                if let Err(e) = self.advance() {
                    return Some(Err(e));
                }
            }
            State::Materialized { .. } => {}
        }

        match std::mem::replace(&mut self.state, State::Positioned) {
            State::Materialized { record, .. } => Some(Ok(record)),
            other => {
                self.state = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bam::record::Alignment;
    use crate::io::bam::tags::Tags;

    /// In-memory source: each entry is either a record name or a decode failure.
    struct VecSource {
        entries: Vec<std::result::Result<&'static str, RecordError>>,
        pos: usize,
        fail_at: Option<usize>,
    }

    impl VecSource {
        fn new(names: &[&'static str]) -> Self {
            Self {
                entries: names.iter().map(|&n| Ok(n)).collect(),
                pos: 0,
                fail_at: None,
            }
        }
    }

    fn record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            flag: 0,
            reference_id: None,
            reference_position: None,
            mapping_quality: None,
            cigar_sequence: Vec::new(),
            mate_reference_id: None,
            mate_position: None,
            template_length: 0,
            sequence: Vec::new(),
            base_qualities: Vec::new(),
            sequence_position: None,
            alignment: Alignment::default(),
            tags: Tags::new(),
        }
    }

    impl RecordSource for VecSource {
        fn tell(&self) -> SeekToken {
            SeekToken::from_raw(self.pos as u64 * 10)
        }

        fn seek(&mut self, token: SeekToken) -> Result<()> {
            let raw = token.as_raw();
            if raw % 10 != 0 || raw / 10 > self.entries.len() as u64 {
                return Err(AlnseekError::InvalidToken {
                    token,
                    reason: "not a record boundary".to_string(),
                });
            }
            self.pos = (raw / 10) as usize;
            Ok(())
        }

        fn read_record(&mut self) -> Result<Option<std::result::Result<Record, RecordError>>> {
            if self.fail_at == Some(self.pos) {
                return Err(AlnseekError::TruncatedStream {
                    position: self.tell(),
                    context: "test".to_string(),
                });
            }
            let Some(entry) = self.entries.get(self.pos) else {
                return Ok(None);
            };
            self.pos += 1;
            Ok(Some(entry.clone().map(record)))
        }
    }

    fn malformed() -> RecordError {
        RecordError::MissingFields { found: 3 }
    }

    #[test]
    fn test_forward_iteration_and_positions() {
        let mut it = RecordIterator::new(VecSource::new(&["a", "b"]), MalformedRecordPolicy::Skip);
        assert_eq!(it.file_position().unwrap().as_raw(), 0);
        assert_eq!(it.dereference().unwrap().id, "a");
        assert_eq!(it.file_position().unwrap().as_raw(), 0);

        it.advance().unwrap();
        assert_eq!(it.dereference().unwrap().id, "b");
        assert_eq!(it.file_position().unwrap().as_raw(), 10);

        it.advance().unwrap();
        assert!(it.is_end().unwrap());
        assert!(matches!(it.dereference(), Err(AlnseekError::NoCurrentRecord)));
        assert!(matches!(it.file_position(), Err(AlnseekError::NoCurrentRecord)));

        // Advancing at the end is a no-op
        it.advance().unwrap();
        assert!(it.is_end().unwrap());
    }

    #[test]
    fn test_is_end_does_not_consume() {
        let mut it = RecordIterator::new(VecSource::new(&["a", "b"]), MalformedRecordPolicy::Skip);
        assert!(!it.is_end().unwrap());
        assert!(!it.is_end().unwrap());
        assert_eq!(it.dereference().unwrap().id, "a");
    }

    #[test]
    fn test_seek_from_end() {
        let mut it = RecordIterator::new(VecSource::new(&["a", "b"]), MalformedRecordPolicy::Skip);
        let names: Vec<String> = it.by_ref().map(|r| r.unwrap().id).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(it.is_end().unwrap());

        it.seek_to(SeekToken::from_raw(10)).unwrap();
        assert!(!it.is_end().unwrap());
        assert_eq!(it.dereference().unwrap().id, "b");
    }

    #[test]
    fn test_failed_seek_keeps_state() {
        let mut it = RecordIterator::new(VecSource::new(&["a", "b"]), MalformedRecordPolicy::Skip);
        it.advance().unwrap();
        it.advance().unwrap();
        assert_eq!(it.dereference().unwrap().id, "b");

        assert!(matches!(
            it.seek_to(SeekToken::from_raw(5)),
            Err(AlnseekError::InvalidToken { .. })
        ));
        assert_eq!(it.dereference().unwrap().id, "b");
        assert_eq!(it.file_position().unwrap().as_raw(), 10);
    }

    #[test]
    fn test_skip_policy_records_diagnostic() {
        let mut source = VecSource::new(&["a", "c"]);
        source.entries.insert(1, Err(malformed()));
        let mut it = RecordIterator::new(source, MalformedRecordPolicy::Skip);

        let names: Vec<String> = it.by_ref().map(|r| r.unwrap().id).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(it.skipped_count(), 1);
        assert_eq!(
            it.diagnostics(),
            &[SkippedRecord {
                position: SeekToken::from_raw(10),
                error: malformed()
            }]
        );
    }

    #[test]
    fn test_abort_policy_surfaces_error_and_continues() {
        let mut source = VecSource::new(&["a", "c"]);
        source.entries.insert(1, Err(malformed()));
        let mut it = RecordIterator::new(source, MalformedRecordPolicy::Abort);

        assert_eq!(it.dereference().unwrap().id, "a");
        match it.advance() {
            Err(AlnseekError::MalformedRecord { position, .. }) => {
                assert_eq!(position.as_raw(), 10)
            }
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
        // Positioned after the bad record
        assert_eq!(it.file_position().unwrap().as_raw(), 20);
        assert_eq!(it.dereference().unwrap().id, "c");
    }

    #[test]
    fn test_fatal_error_aborts_until_seek() {
        let mut source = VecSource::new(&["a", "b"]);
        source.fail_at = Some(1);
        let mut it = RecordIterator::new(source, MalformedRecordPolicy::Skip);

        assert_eq!(it.next().unwrap().unwrap().id, "a");
        assert!(matches!(
            it.next(),
            Some(Err(AlnseekError::TruncatedStream { .. }))
        ));
        assert!(it.next().is_none());
        assert!(matches!(
            it.advance(),
            Err(AlnseekError::IterationAborted { .. })
        ));
        assert!(!it.is_end().unwrap());

        it.seek_to(SeekToken::from_raw(0)).unwrap();
        assert_eq!(it.dereference().unwrap().id, "a");
    }

    #[test]
    fn test_iterator_yields_current_record_first() {
        let source = VecSource::new(&["a", "b", "c"]);
        let mut it = RecordIterator::new(source, MalformedRecordPolicy::Skip);
        it.advance().unwrap();
        assert_eq!(it.dereference().unwrap().id, "a");
        let rest: Vec<String> = it.map(|r| r.unwrap().id).collect();
        assert_eq!(rest, vec!["a", "b", "c"]);
    }
}
