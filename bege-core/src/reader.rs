//! Sequential reader for files of concatenated trigger records.
//!
//! The whole stream length is checked against the record size before anything
//! is decoded. Records are then read one at a time, decoded and forwarded to
//! an [`EventSink`] in stream order. Per-record problems are logged and the
//! record skipped; only I/O and sink failures stop the stream.

use crate::config::DecoderConfig;
use crate::decoder::{DecodeError, TriggerRecordDecoder};
use crate::output::EventSink;
use crate::types::TriggerEvent;
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bookkeeping for one pass over a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Records implied by the stream length
    pub expected: u64,
    /// Records decoded and forwarded
    pub produced: u64,
    /// Records read but not decoded
    pub skipped: u64,
    /// Whether the pass was stopped through the cancel flag
    pub cancelled: bool,
}

impl StreamSummary {
    /// True when a completed pass did not produce one event per expected record.
    pub fn mismatch(&self) -> bool {
        !self.cancelled && self.produced != self.expected
    }
}

/// Result of decoding a whole file into memory.
#[derive(Debug)]
pub struct DecodeResult {
    /// Decoded events in file order
    pub events: Vec<TriggerEvent>,
    pub summary: StreamSummary,
}

/// Single-pass reader over concatenated raw records.
pub struct EventStreamReader<'a, R> {
    reader: BufReader<R>,
    decoder: TriggerRecordDecoder<'a>,
    buffer: Vec<u8>,
    record_size: usize,
    stream_length: u64,
    records_read: u64,
    summary: StreamSummary,
    cancel: Option<Arc<AtomicBool>>,
    done: bool,
}

impl<'a> EventStreamReader<'a, File> {
    /// Opens a record file.
    pub fn open<P: AsRef<Path>>(path: P, config: &'a DecoderConfig) -> Result<Self, DecodeError> {
        Self::new(File::open(path.as_ref())?, config)
    }
}

impl<'a, R: Read + Seek> EventStreamReader<'a, R> {
    /// Wraps a stream positioned at its first record.
    ///
    /// Fails with [`DecodeError::StructuralCorruption`] when the remaining
    /// length is not a whole number of records, and with
    /// [`DecodeError::Config`] when `config` does not describe a usable record.
    pub fn new(mut inner: R, config: &'a DecoderConfig) -> Result<Self, DecodeError> {
        config.validate()?;

        let begin = inner.stream_position()?;
        let end = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(begin))?;

        let stream_length = end.saturating_sub(begin);
        let record_size = config.record_size();
        if stream_length % record_size as u64 != 0 {
            return Err(DecodeError::StructuralCorruption {
                length: stream_length,
                record_size,
            });
        }

        Ok(Self {
            reader: BufReader::with_capacity(record_size.clamp(8 * 1024, 1 << 20), inner),
            decoder: TriggerRecordDecoder::new(config),
            // Sized on the first read so empty streams allocate nothing
            buffer: Vec::new(),
            record_size,
            stream_length,
            records_read: 0,
            summary: StreamSummary {
                expected: stream_length / record_size as u64,
                ..StreamSummary::default()
            },
            cancel: None,
            done: false,
        })
    }
}

impl<'a, R: Read> EventStreamReader<'a, R> {
    /// Installs a flag that stops the pass between records once set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Stream length in bytes, as measured at construction.
    pub fn stream_length(&self) -> u64 {
        self.stream_length
    }

    /// Number of records the stream length implies.
    pub fn records_expected(&self) -> u64 {
        self.summary.expected
    }

    pub fn summary(&self) -> StreamSummary {
        self.summary
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Checks for end of stream without consuming anything.
    fn at_end(&mut self) -> Result<bool, DecodeError> {
        Ok(self.reader.fill_buf()?.is_empty())
    }

    /// Reads and decodes the next record.
    ///
    /// Returns `Ok(None)` at end of stream. Record-local errors (see
    /// [`DecodeError::is_record_local`]) leave the reader usable; a short read
    /// is never decoded.
    pub fn next_event(&mut self) -> Result<Option<TriggerEvent>, DecodeError> {
        if self.at_end()? {
            return Ok(None);
        }

        let index = self.records_read;
        self.records_read += 1;

        if self.buffer.len() != self.record_size {
            self.buffer.resize(self.record_size, 0);
        }
        let read = read_record(&mut self.reader, &mut self.buffer)?;
        if read < self.buffer.len() {
            self.summary.skipped += 1;
            return Err(DecodeError::PrematureTruncation {
                index,
                read,
                expected: self.buffer.len(),
            });
        }

        match self.decoder.decode_in_place(&mut self.buffer) {
            Ok(event) => {
                self.summary.produced += 1;
                debug!("Decoded record {} (timestamp {})", index, event.timestamp);
                Ok(Some(event))
            }
            Err(e) => {
                self.summary.skipped += 1;
                Err(e)
            }
        }
    }

    /// Decodes every remaining record into `sink`, then finishes the sink.
    ///
    /// The sink is finished even when the pass ends on an error, so events
    /// already handed over are flushed.
    pub fn run<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Result<StreamSummary, DecodeError> {
        info!(
            "Reading {} records ({} bytes each)",
            self.summary.expected, self.record_size
        );

        let pass = self.pump(sink);
        let finished = sink.finish();
        pass?;
        finished?;

        let summary = self.summary;
        if summary.cancelled {
            warn!(
                "Cancelled after {} of {} records",
                self.records_read, summary.expected
            );
        } else if summary.mismatch() {
            warn!(
                "Error reading file: produced {} of {} expected records ({} skipped)",
                summary.produced, summary.expected, summary.skipped
            );
        } else {
            info!("Decoded {} records", summary.produced);
        }
        Ok(summary)
    }

    fn pump<S: EventSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), DecodeError> {
        loop {
            if self.is_cancelled() {
                self.summary.cancelled = true;
                return Ok(());
            }

            match self.next_event() {
                Ok(Some(event)) => sink.append(event)?,
                Ok(None) => return Ok(()),
                Err(e) if e.is_record_local() => {
                    warn!("Skipping record {}: {}", self.records_read - 1, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Yields one item per record. Stops for good after the first error that
/// is not record-local.
impl<'a, R: Read> Iterator for EventStreamReader<'a, R> {
    type Item = Result<TriggerEvent, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_event() {
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) if !e.is_record_local() => {
                self.done = true;
                Some(Err(e))
            }
            other => other.transpose(),
        }
    }
}

/// Fills `buffer` from `reader`, stopping early only at end of stream.
fn read_record<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decodes a whole record file into memory.
pub fn decode_file<P: AsRef<Path>>(
    path: P,
    config: &DecoderConfig,
) -> Result<DecodeResult, DecodeError> {
    let mut reader = EventStreamReader::open(path, config)?;
    let mut events: Vec<TriggerEvent> = Vec::with_capacity(reader.records_expected() as usize);
    let summary = reader.run(&mut events)?;
    Ok(DecodeResult { events, summary })
}
