//! Decoder library for BEGe detector trigger records.
//!
//! The acquisition system writes one fixed-size binary record per trigger:
//! six interleaved waveforms of IEEE-754 floats plus a timestamp and two pulser
//! counters, all as big-endian 32-bit words. This crate turns a file of such
//! records into [`TriggerEvent`] values and hands them to an output sink.
//!
//! # Example
//!
//! ```no_run
//! use bege_core::{DecoderConfig, EventStreamReader, TriggerEvent};
//!
//! let config = DecoderConfig::default();
//! let mut reader = EventStreamReader::open("run_0042.dat", &config).unwrap();
//! let mut events: Vec<TriggerEvent> = Vec::new();
//! let summary = reader.run(&mut events).unwrap();
//!
//! println!("Decoded {} of {} triggers", summary.produced, summary.expected);
//! println!("First timestamp: {}", events[0].timestamp);
//! ```
//!
//! # Features
//!
//! - Whole-file length validation before any record is decoded
//! - Bounds-checked word parsing with explicit float bit reinterpretation
//! - Per-record error recovery with a record-count check at the end
//! - Binary and CSV output sinks
//! - Muon veto region finding on the veto channel

pub mod builder;
pub mod config;
pub mod decoder;
pub mod output;
pub mod parser;
pub mod reader;
pub mod types;
pub mod veto;

// Re-export commonly used types
pub use builder::{BuildError, RecordBuilder};
pub use config::{ConfigError, DecoderConfig};
pub use decoder::{DecodeError, TriggerRecordDecoder};
pub use output::{EventSink, OutputError};
pub use reader::{decode_file, DecodeResult, EventStreamReader, StreamSummary};
pub use types::{ChannelRole, RecordMetadata, TriggerEvent, WaveformChannel, WaveformPair};
pub use veto::{MuonVeto, WaveformRegion};
