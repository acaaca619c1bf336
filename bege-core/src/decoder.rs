//! Trigger record decoder.
//!
//! Turns one fixed-size raw record into a [`TriggerEvent`]: swap the words to
//! host order, then read waveform pair 1, the timestamp/pulser block,
//! waveform pair 2 and waveform pair 3, in that order.

use crate::config::{ConfigError, DecoderConfig};
use crate::output::OutputError;
use crate::parser::{self, Segment};
use crate::types::TriggerEvent;
use thiserror::Error;

/// Errors that can occur while decoding trigger records.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("File corrupted: length {length} is not a multiple of the record size {record_size}")]
    StructuralCorruption { length: u64, record_size: usize },

    #[error("Malformed {segment}: needed {needed} bytes at offset {offset}, {available} available")]
    MalformedSegment {
        segment: Segment,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Record is {actual} bytes, expected {expected}")]
    RecordLength { expected: usize, actual: usize },

    #[error("End of file reached prematurely: record {index} has {read} of {expected} bytes")]
    PrematureTruncation {
        index: u64,
        read: usize,
        expected: usize,
    },

    #[error("Sink error: {0}")]
    Sink(#[from] OutputError),
}

impl DecodeError {
    /// True for errors confined to a single record, after which the stream can continue.
    pub fn is_record_local(&self) -> bool {
        matches!(
            self,
            Self::MalformedSegment { .. }
                | Self::RecordLength { .. }
                | Self::PrematureTruncation { .. }
        )
    }
}

/// Stateless decoder for single trigger records.
#[derive(Debug, Clone, Copy)]
pub struct TriggerRecordDecoder<'a> {
    config: &'a DecoderConfig,
}

impl<'a> TriggerRecordDecoder<'a> {
    pub fn new(config: &'a DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &'a DecoderConfig {
        self.config
    }

    /// Decodes a record in network byte order, swapping it in place.
    ///
    /// The buffer is left in host order afterwards. It must be exactly
    /// [`DecoderConfig::record_size`] bytes long.
    pub fn decode_in_place(&self, record: &mut [u8]) -> Result<TriggerEvent, DecodeError> {
        let expected = self.config.record_size();
        if record.len() != expected {
            return Err(DecodeError::RecordLength {
                expected,
                actual: record.len(),
            });
        }

        parser::swap_words(record);
        let (event, _) = self.decode_swapped(record)?;
        Ok(event)
    }

    /// Decodes a record in network byte order without touching the input.
    pub fn decode(&self, record: &[u8]) -> Result<TriggerEvent, DecodeError> {
        let mut owned = record.to_vec();
        self.decode_in_place(&mut owned)
    }

    /// Decodes a record already in host order.
    ///
    /// Returns the event and the number of bytes consumed.
    pub(crate) fn decode_swapped(
        &self,
        record: &[u8],
    ) -> Result<(TriggerEvent, usize), DecodeError> {
        let length = self.config.waveform_length;
        let frequency = self.config.sampling_frequency;

        // Chan 0, chan 1
        let (pair_one, next) =
            parser::read_waveform_pair(record, 0, length, frequency, Segment::WaveformPair(1))?;
        let (metadata, next) = parser::read_pulser_chunks_and_timestamp(record, next)?;
        // Chan 2, muon veto
        let (pair_two, next) =
            parser::read_waveform_pair(record, next, length, frequency, Segment::WaveformPair(2))?;
        // Preamp traces
        let (pair_three, next) =
            parser::read_waveform_pair(record, next, length, frequency, Segment::WaveformPair(3))?;

        if next != record.len() {
            return Err(DecodeError::RecordLength {
                expected: next,
                actual: record.len(),
            });
        }

        Ok((
            TriggerEvent::from_parts([pair_one, pair_two, pair_three], metadata),
            next,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RecordBuilder;
    use crate::types::ChannelRole;
    use byteorder::{BigEndian, ByteOrder, LittleEndian};

    fn small_config() -> DecoderConfig {
        DecoderConfig::new(20e6, 4).unwrap()
    }

    fn ramp(offset: f32, length: usize) -> Vec<f32> {
        (0..length).map(|i| offset + i as f32 * 0.125).collect()
    }

    fn builder(config: &DecoderConfig) -> RecordBuilder<'_> {
        let mut builder = RecordBuilder::new(config);
        for role in ChannelRole::ALL {
            builder = builder
                .waveform(role, ramp(role.index() as f32 * 10.0, config.waveform_length))
                .unwrap();
        }
        builder.time(1.0, 5.0).pulser_chunks(3, 0xFFFF_FFFF)
    }

    #[test]
    fn test_decode_round_trip() {
        let config = small_config();
        let builder = builder(&config);
        let decoder = TriggerRecordDecoder::new(&config);

        let event = decoder.decode(&builder.to_bytes()).unwrap();

        assert_eq!(event, builder.expected_event());
        assert_eq!(event.timestamp, 10_000_005);
        assert_eq!(event.pulser_chunk_one, 3);
        assert_eq!(event.pulser_chunk_two, 0xFFFF_FFFF);
        assert_eq!(
            event.waveform(ChannelRole::PreampHighEnergy).samples()[1],
            50.125
        );
        for wf in &event.waveforms {
            assert_eq!(wf.len(), config.waveform_length);
            assert_eq!(wf.sampling_frequency(), config.sampling_frequency);
        }
    }

    #[test]
    fn test_decode_consumes_whole_record() {
        let config = small_config();
        let mut bytes = builder(&config).to_bytes();
        parser::swap_words(&mut bytes);

        let (_, consumed) = TriggerRecordDecoder::new(&config)
            .decode_swapped(&bytes)
            .unwrap();
        assert_eq!(consumed, config.record_size());
    }

    #[test]
    fn test_decode_swapped_rejects_residual() {
        let config = small_config();
        let mut bytes = builder(&config).to_bytes();
        parser::swap_words(&mut bytes);
        bytes.extend_from_slice(&[0; 4]);

        let err = TriggerRecordDecoder::new(&config)
            .decode_swapped(&bytes)
            .unwrap_err();
        assert!(matches!(err, DecodeError::RecordLength { .. }));
    }

    #[test]
    fn test_decode_swapped_reports_shortfall() {
        let config = small_config();
        let mut bytes = builder(&config).to_bytes();
        parser::swap_words(&mut bytes);
        bytes.truncate(config.record_size() - 4);

        let err = TriggerRecordDecoder::new(&config)
            .decode_swapped(&bytes)
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MalformedSegment {
                segment: Segment::WaveformPair(3),
                ..
            }
        ));
        assert!(err.is_record_local());
    }

    #[test]
    fn test_decode_wrong_length() {
        let config = small_config();
        let decoder = TriggerRecordDecoder::new(&config);
        let err = decoder.decode(&vec![0u8; config.record_size() + 4]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::RecordLength { expected, actual } if expected == 112 && actual == 116
        ));
    }

    #[test]
    fn test_decode_in_place_leaves_host_order() {
        let config = small_config();
        let builder = builder(&config);
        let mut bytes = builder.to_bytes();
        let decoder = TriggerRecordDecoder::new(&config);

        decoder.decode_in_place(&mut bytes).unwrap();

        let (event, _) = decoder.decode_swapped(&bytes).unwrap();
        assert_eq!(event, builder.expected_event());
    }

    #[test]
    fn test_endianness_invariance() {
        let config = small_config();
        let builder = builder(&config);
        let length = config.waveform_length;
        let channel = |role: usize| ramp(role as f32 * 10.0, length);
        let interleave = |a: usize, b: usize| -> Vec<u32> {
            channel(a)
                .iter()
                .zip(channel(b))
                .flat_map(|(x, y)| [x.to_bits(), y.to_bits()])
                .collect()
        };

        // Same record as the builder's, laid out word by word in little-endian order
        let mut words = interleave(0, 1);
        words.extend([1.0f32.to_bits(), 5.0f32.to_bits(), 3, 0xFFFF_FFFF]);
        words.extend(interleave(2, 3));
        words.extend(interleave(4, 5));
        let mut little_endian = vec![0u8; words.len() * 4];
        LittleEndian::write_u32_into(&words, &mut little_endian);
        assert_eq!(little_endian.len(), config.record_size());

        let mut network_order = vec![0u8; little_endian.len()];
        for (src, dst) in little_endian
            .chunks_exact(4)
            .zip(network_order.chunks_exact_mut(4))
        {
            BigEndian::write_u32(dst, LittleEndian::read_u32(src));
        }

        let decoder = TriggerRecordDecoder::new(&config);
        let event = decoder.decode(&network_order).unwrap();
        assert_eq!(event, builder.expected_event());
        assert_eq!(decoder.decode(&builder.to_bytes()).unwrap(), event);
    }

    #[test]
    fn test_default_geometry() {
        let config = DecoderConfig::default();
        let builder = RecordBuilder::new(&config)
            .waveform(ChannelRole::MuonVeto, ramp(-1.0, 8000))
            .unwrap()
            .time(0.0, 0.0);
        let bytes = builder.to_bytes();
        assert_eq!(bytes.len(), 4 * 6 * 8000 + 16);

        let event = TriggerRecordDecoder::new(&config).decode(&bytes).unwrap();
        assert_eq!(event.timestamp, 0);
        assert_eq!(event.waveform(ChannelRole::MuonVeto).samples()[0], -1.0);
        assert_eq!(event.waveform(ChannelRole::MuonVeto).len(), 8000);
    }
}
