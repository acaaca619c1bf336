//! Core types for decoded BEGe trigger data.
//!
//! This module defines the waveform and event structures produced by the
//! decoder, along with the fixed roles of the six channels in each record.

use crate::config::DecoderConfig;

/// The fixed role of each waveform slot in a trigger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelRole {
    /// Channel 0, shaped 6 µs, low energy
    ShapedLowEnergy6us = 0,
    /// Channel 1, shaped 10 µs, low energy
    ShapedLowEnergy10us = 1,
    /// Channel 2, shaped 10 µs, high energy
    ShapedHighEnergy10us = 2,
    /// Muon veto panel
    MuonVeto = 3,
    /// Raw preamplifier trace, low energy
    PreampLowEnergy = 4,
    /// Raw preamplifier trace, high energy
    PreampHighEnergy = 5,
}

impl ChannelRole {
    /// All roles in record order.
    pub const ALL: [ChannelRole; DecoderConfig::NUM_WAVEFORMS_PER_TRIGGER] = [
        Self::ShapedLowEnergy6us,
        Self::ShapedLowEnergy10us,
        Self::ShapedHighEnergy10us,
        Self::MuonVeto,
        Self::PreampLowEnergy,
        Self::PreampHighEnergy,
    ];

    /// Position of this channel in [`TriggerEvent::waveforms`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Attempts to map a channel index back to its role.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// One sampled waveform.
///
/// Samples are stored as `f64`; the instrument writes IEEE-754 single
/// precision values, which widen exactly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WaveformChannel {
    samples: Vec<f64>,
    sampling_frequency: f64,
}

impl WaveformChannel {
    /// Creates a waveform from its samples.
    pub fn new(samples: Vec<f64>, sampling_frequency: f64) -> Self {
        Self {
            samples,
            sampling_frequency,
        }
    }

    /// Creates an empty waveform with room for `capacity` samples.
    pub fn with_capacity(capacity: usize, sampling_frequency: f64) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            sampling_frequency,
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, sample: f64) {
        self.samples.push(sample);
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Consumes the waveform and returns the sample vector.
    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    /// Sampling frequency in Hz.
    #[inline]
    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    /// Time between samples in seconds.
    #[inline]
    pub fn sampling_period(&self) -> f64 {
        1.0 / self.sampling_frequency
    }

    /// Index and value of the first maximum sample.
    pub fn maximum(&self) -> Option<(usize, f64)> {
        self.extremum(|candidate, best| candidate > best)
    }

    /// Index and value of the first minimum sample.
    pub fn minimum(&self) -> Option<(usize, f64)> {
        self.extremum(|candidate, best| candidate < best)
    }

    fn extremum(&self, better: impl Fn(f64, f64) -> bool) -> Option<(usize, f64)> {
        let mut iter = self.samples.iter().copied().enumerate();
        let first = iter.next()?;
        Some(iter.fold(first, |best, (idx, value)| {
            if better(value, best.1) {
                (idx, value)
            } else {
                best
            }
        }))
    }
}

/// Two waveforms read from one interleaved segment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WaveformPair {
    /// Waveform stored in the even words
    pub first: WaveformChannel,
    /// Waveform stored in the odd words
    pub second: WaveformChannel,
}

/// Timestamp and pulser counters stored between the first and second waveform pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordMetadata {
    /// Combined 64-bit timestamp
    pub timestamp: u64,
    /// First pulser counter
    pub pulser_chunk_one: u32,
    /// Second pulser counter
    pub pulser_chunk_two: u32,
}

/// A fully decoded trigger record.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    /// Waveforms in [`ChannelRole`] order
    pub waveforms: [WaveformChannel; DecoderConfig::NUM_WAVEFORMS_PER_TRIGGER],
    /// Combined 64-bit timestamp
    pub timestamp: u64,
    /// First pulser counter
    pub pulser_chunk_one: u32,
    /// Second pulser counter
    pub pulser_chunk_two: u32,
}

impl TriggerEvent {
    /// Assembles an event from the three waveform pairs and the metadata block.
    pub fn from_parts(pairs: [WaveformPair; 3], metadata: RecordMetadata) -> Self {
        let [a, b, c] = pairs;
        Self {
            waveforms: [a.first, a.second, b.first, b.second, c.first, c.second],
            timestamp: metadata.timestamp,
            pulser_chunk_one: metadata.pulser_chunk_one,
            pulser_chunk_two: metadata.pulser_chunk_two,
        }
    }

    /// Waveform for a given channel role.
    #[inline]
    pub fn waveform(&self, role: ChannelRole) -> &WaveformChannel {
        &self.waveforms[role.index()]
    }

    /// True when either pulser counter is set, i.e. this trigger came from the pulser.
    #[inline]
    pub fn pulser_on(&self) -> bool {
        self.pulser_chunk_one != 0 || self.pulser_chunk_two != 0
    }
}
