//! Synthetic trigger record construction.
//!
//! [`RecordBuilder`] writes records in the same big-endian layout the
//! acquisition system produces. Used for tests, benchmarks and for feeding
//! simulated data through the converter.

use crate::config::DecoderConfig;
use crate::parser::{combine_timestamp, WORD_SIZE};
use crate::types::{ChannelRole, TriggerEvent, WaveformChannel};
use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

/// Errors that can occur while building a record.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BuildError {
    #[error("Waveform for {role:?} has {actual} samples, expected {expected}")]
    WaveformLength {
        role: ChannelRole,
        expected: usize,
        actual: usize,
    },
}

/// Builder for one raw trigger record.
#[derive(Debug, Clone)]
pub struct RecordBuilder<'a> {
    config: &'a DecoderConfig,
    waveforms: [Vec<f32>; DecoderConfig::NUM_WAVEFORMS_PER_TRIGGER],
    time_coarse: f32,
    time_fine: f32,
    pulser_chunk_one: u32,
    pulser_chunk_two: u32,
}

impl<'a> RecordBuilder<'a> {
    /// Creates a builder with all-zero waveforms, timestamp and counters.
    pub fn new(config: &'a DecoderConfig) -> Self {
        let zeros = vec![0.0f32; config.waveform_length];
        Self {
            config,
            waveforms: std::array::from_fn(|_| zeros.clone()),
            time_coarse: 0.0,
            time_fine: 0.0,
            pulser_chunk_one: 0,
            pulser_chunk_two: 0,
        }
    }

    /// Sets the samples of one channel.
    pub fn waveform(mut self, role: ChannelRole, samples: Vec<f32>) -> Result<Self, BuildError> {
        if samples.len() != self.config.waveform_length {
            return Err(BuildError::WaveformLength {
                role,
                expected: self.config.waveform_length,
                actual: samples.len(),
            });
        }
        self.waveforms[role.index()] = samples;
        Ok(self)
    }

    /// Sets the two floating-point timestamp components.
    pub fn time(mut self, coarse: f32, fine: f32) -> Self {
        self.time_coarse = coarse;
        self.time_fine = fine;
        self
    }

    pub fn pulser_chunks(mut self, one: u32, two: u32) -> Self {
        self.pulser_chunk_one = one;
        self.pulser_chunk_two = two;
        self
    }

    /// Serializes the record in network byte order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.config.record_size()];
        let mut offset = 0;

        offset = self.write_pair(&mut out, offset, 0);

        let metadata = &mut out[offset..offset + DecoderConfig::EXTRA_BYTES];
        BigEndian::write_f32(&mut metadata[0..4], self.time_coarse);
        BigEndian::write_f32(&mut metadata[4..8], self.time_fine);
        BigEndian::write_u32(&mut metadata[8..12], self.pulser_chunk_one);
        BigEndian::write_u32(&mut metadata[12..16], self.pulser_chunk_two);
        offset += DecoderConfig::EXTRA_BYTES;

        offset = self.write_pair(&mut out, offset, 2);
        offset = self.write_pair(&mut out, offset, 4);
        debug_assert_eq!(offset, out.len());

        out
    }

    fn write_pair(&self, out: &mut [u8], mut offset: usize, first_channel: usize) -> usize {
        let first = &self.waveforms[first_channel];
        let second = &self.waveforms[first_channel + 1];
        for (a, b) in first.iter().zip(second) {
            BigEndian::write_f32(&mut out[offset..offset + WORD_SIZE], *a);
            BigEndian::write_f32(&mut out[offset + WORD_SIZE..offset + 2 * WORD_SIZE], *b);
            offset += 2 * WORD_SIZE;
        }
        offset
    }

    /// The event a decoder is expected to produce from [`Self::to_bytes`].
    pub fn expected_event(&self) -> TriggerEvent {
        let waveforms = std::array::from_fn(|i| {
            WaveformChannel::new(
                self.waveforms[i].iter().map(|&s| f64::from(s)).collect(),
                self.config.sampling_frequency,
            )
        });
        TriggerEvent {
            waveforms,
            timestamp: combine_timestamp(self.time_coarse, self.time_fine),
            pulser_chunk_one: self.pulser_chunk_one,
            pulser_chunk_two: self.pulser_chunk_two,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let config = DecoderConfig::new(20e6, 2).unwrap();
        let bytes = RecordBuilder::new(&config)
            .waveform(ChannelRole::ShapedLowEnergy6us, vec![1.0, 2.0])
            .unwrap()
            .waveform(ChannelRole::MuonVeto, vec![-1.0, -2.0])
            .unwrap()
            .time(1.0, 5.0)
            .pulser_chunks(0x0102_0304, 9)
            .to_bytes();

        assert_eq!(bytes.len(), config.record_size());
        // Word 0: channel 0 sample 0
        assert_eq!(&bytes[0..4], &1.0f32.to_be_bytes());
        // Word 2: channel 0 sample 1
        assert_eq!(&bytes[8..12], &2.0f32.to_be_bytes());
        // Words 4..8: metadata block
        assert_eq!(&bytes[16..20], &1.0f32.to_be_bytes());
        assert_eq!(&bytes[20..24], &5.0f32.to_be_bytes());
        assert_eq!(&bytes[24..28], &[1, 2, 3, 4]);
        assert_eq!(&bytes[28..32], &9u32.to_be_bytes());
        // Word 9: channel 3 sample 0
        assert_eq!(&bytes[36..40], &(-1.0f32).to_be_bytes());
    }

    #[test]
    fn test_wrong_waveform_length() {
        let config = DecoderConfig::new(20e6, 3).unwrap();
        let err = RecordBuilder::new(&config)
            .waveform(ChannelRole::PreampLowEnergy, vec![0.0; 2])
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::WaveformLength {
                role: ChannelRole::PreampLowEnergy,
                expected: 3,
                actual: 2,
            }
        );
    }
}
