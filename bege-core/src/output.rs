//! Output sinks for decoded trigger events.
//!
//! The stream reader hands every decoded [`TriggerEvent`] to an [`EventSink`]
//! in record order. Two file formats are provided: a self-describing binary
//! container holding the full waveforms, and a per-event CSV summary.

use crate::config::DecoderConfig;
use crate::types::{ChannelRole, TriggerEvent, WaveformChannel};
use crate::veto::MuonVeto;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output writing.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Receives decoded events, once per record, in stream order.
pub trait EventSink {
    fn append(&mut self, event: TriggerEvent) -> Result<(), OutputError>;

    /// Flushes anything buffered. Called once after the last event.
    fn finish(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

impl EventSink for Vec<TriggerEvent> {
    fn append(&mut self, event: TriggerEvent) -> Result<(), OutputError> {
        self.push(event);
        Ok(())
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn append(&mut self, event: TriggerEvent) -> Result<(), OutputError> {
        (**self).append(event)
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        (**self).finish()
    }
}

/// Magic number at the start of every binary output file.
pub const BINARY_MAGIC: &[u8; 8] = b"BEGEBIN\0";

/// Current binary format version.
pub const BINARY_VERSION: u32 = 1;

/// Byte offset of the event count in the binary header.
const EVENT_COUNT_OFFSET: u64 = 8 + 4 + 8 + 4 + 4;

/// Header of a binary output file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryHeader {
    pub sampling_frequency: f64,
    pub waveform_length: usize,
    pub num_waveforms: usize,
    pub event_count: u64,
}

/// Binary output format for trigger events.
///
/// Header (little-endian):
/// - magic: `BEGEBIN\0` (8 bytes)
/// - version: u32
/// - sampling frequency: f64
/// - waveform length: u32
/// - waveforms per trigger: u32
/// - event count: u64, patched in by [`EventSink::finish`]
///
/// Each event then follows as timestamp u64, pulser chunk one u32, pulser
/// chunk two u32 and the six waveforms as consecutive f64 samples.
pub struct BinaryWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    waveform_length: usize,
    event_count: u64,
}

impl<W: Write + Seek> BinaryWriter<W> {
    /// Creates a binary writer and writes the header.
    pub fn new(writer: W, config: &DecoderConfig) -> Result<Self, OutputError> {
        let waveform_length = u32::try_from(config.waveform_length).map_err(|_| {
            OutputError::InvalidFormat(format!(
                "waveform length {} does not fit the binary header",
                config.waveform_length
            ))
        })?;

        let mut writer = BufWriter::new(writer);
        writer.write_all(BINARY_MAGIC)?;
        writer.write_u32::<LittleEndian>(BINARY_VERSION)?;
        writer.write_f64::<LittleEndian>(config.sampling_frequency)?;
        writer.write_u32::<LittleEndian>(waveform_length)?;
        writer.write_u32::<LittleEndian>(DecoderConfig::NUM_WAVEFORMS_PER_TRIGGER as u32)?;
        writer.write_u64::<LittleEndian>(0)?;

        Ok(Self {
            writer,
            waveform_length: config.waveform_length,
            event_count: 0,
        })
    }

    /// Number of events written so far.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Writes a single event.
    pub fn write_event(&mut self, event: &TriggerEvent) -> Result<(), OutputError> {
        if let Some(wf) = event
            .waveforms
            .iter()
            .find(|wf| wf.len() != self.waveform_length)
        {
            return Err(OutputError::InvalidFormat(format!(
                "waveform has {} samples, file expects {}",
                wf.len(),
                self.waveform_length
            )));
        }

        self.writer.write_u64::<LittleEndian>(event.timestamp)?;
        self.writer.write_u32::<LittleEndian>(event.pulser_chunk_one)?;
        self.writer.write_u32::<LittleEndian>(event.pulser_chunk_two)?;
        for wf in &event.waveforms {
            for &sample in wf.samples() {
                self.writer.write_f64::<LittleEndian>(sample)?;
            }
        }
        self.event_count += 1;
        Ok(())
    }

    /// Rewrites the event count in the header and flushes.
    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.seek(SeekFrom::Start(EVENT_COUNT_OFFSET))?;
        self.writer.write_u64::<LittleEndian>(self.event_count)?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> Result<W, OutputError> {
        self.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| OutputError::Io(e.into_error()))
    }
}

impl<W: Write + Seek> EventSink for BinaryWriter<W> {
    fn append(&mut self, event: TriggerEvent) -> Result<(), OutputError> {
        self.write_event(&event)
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        self.flush()
    }
}

/// Header line of the CSV summary.
pub const SUMMARY_CSV_HEADER: &str =
    "index,timestamp,pulser_chunk_one,pulser_chunk_two,pulser_on,veto_regions";

/// CSV summary writer, one line of scalar data per event.
pub struct SummaryCsvWriter<W: Write> {
    writer: BufWriter<W>,
    veto_threshold: f64,
    index: u64,
}

impl<W: Write> SummaryCsvWriter<W> {
    /// Creates a summary writer and writes the header line.
    pub fn new(writer: W, veto_threshold: f64) -> Result<Self, OutputError> {
        let mut writer = BufWriter::new(writer);
        writeln!(writer, "{}", SUMMARY_CSV_HEADER)?;
        Ok(Self {
            writer,
            veto_threshold,
            index: 0,
        })
    }

    /// Writes a single event.
    pub fn write_event(&mut self, event: &TriggerEvent) -> Result<(), OutputError> {
        let veto =
            MuonVeto::from_waveform(event.waveform(ChannelRole::MuonVeto), self.veto_threshold);
        writeln!(
            self.writer,
            "{},{},{},{},{},{}",
            self.index,
            event.timestamp,
            event.pulser_chunk_one,
            event.pulser_chunk_two,
            u8::from(event.pulser_on()),
            veto.number_of_regions()
        )?;
        self.index += 1;
        Ok(())
    }

    /// Flushes the writer.
    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> EventSink for SummaryCsvWriter<W> {
    fn append(&mut self, event: TriggerEvent) -> Result<(), OutputError> {
        self.write_event(&event)
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        self.flush()
    }
}

/// Creates a binary output file.
pub fn create_binary<P: AsRef<Path>>(
    path: P,
    config: &DecoderConfig,
) -> Result<BinaryWriter<File>, OutputError> {
    let file = File::create(path)?;
    BinaryWriter::new(file, config)
}

/// Creates a CSV summary file.
pub fn create_summary_csv<P: AsRef<Path>>(
    path: P,
    veto_threshold: f64,
) -> Result<SummaryCsvWriter<File>, OutputError> {
    let file = File::create(path)?;
    SummaryCsvWriter::new(file, veto_threshold)
}

/// Reads events back from a binary container.
pub fn read_binary_from<R: Read>(
    reader: R,
) -> Result<(BinaryHeader, Vec<TriggerEvent>), OutputError> {
    let mut reader = BufReader::new(reader);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != BINARY_MAGIC {
        return Err(OutputError::InvalidFormat("bad magic number".to_string()));
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != BINARY_VERSION {
        return Err(OutputError::InvalidFormat(format!(
            "unsupported version {}",
            version
        )));
    }

    let header = BinaryHeader {
        sampling_frequency: reader.read_f64::<LittleEndian>()?,
        waveform_length: reader.read_u32::<LittleEndian>()? as usize,
        num_waveforms: reader.read_u32::<LittleEndian>()? as usize,
        event_count: reader.read_u64::<LittleEndian>()?,
    };
    if header.num_waveforms != DecoderConfig::NUM_WAVEFORMS_PER_TRIGGER {
        return Err(OutputError::InvalidFormat(format!(
            "expected {} waveforms per trigger, found {}",
            DecoderConfig::NUM_WAVEFORMS_PER_TRIGGER,
            header.num_waveforms
        )));
    }

    let mut events = Vec::new();
    for _ in 0..header.event_count {
        let timestamp = reader.read_u64::<LittleEndian>()?;
        let pulser_chunk_one = reader.read_u32::<LittleEndian>()?;
        let pulser_chunk_two = reader.read_u32::<LittleEndian>()?;

        let mut waveforms: [WaveformChannel; DecoderConfig::NUM_WAVEFORMS_PER_TRIGGER] =
            Default::default();
        for wf in waveforms.iter_mut() {
            let mut samples = vec![0f64; header.waveform_length];
            reader.read_f64_into::<LittleEndian>(&mut samples)?;
            *wf = WaveformChannel::new(samples, header.sampling_frequency);
        }

        events.push(TriggerEvent {
            waveforms,
            timestamp,
            pulser_chunk_one,
            pulser_chunk_two,
        });
    }

    Ok((header, events))
}

/// Reads events back from a binary file.
pub fn read_binary<P: AsRef<Path>>(
    path: P,
) -> Result<(BinaryHeader, Vec<TriggerEvent>), OutputError> {
    read_binary_from(File::open(path)?)
}
