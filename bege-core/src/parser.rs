//! Low-level parsing of BEGe trigger record words.
//!
//! Records arrive as 32-bit words in network byte order. [`swap_words`] brings
//! them to host order in place; the remaining functions read fixed-offset
//! segments out of the swapped buffer with explicit bounds checks and
//! bit-pattern conversions (never pointer casts).
//!
//! Record layout, in words, for a waveform length of N:
//!
//! | words            | content                                  |
//! |------------------|------------------------------------------|
//! | `0 .. 2N`        | waveform pair 1 (channels 0, 1)          |
//! | `2N .. 2N+4`     | f32 t0, f32 t1, u32 pulser 1, u32 pulser 2 |
//! | `2N+4 .. 4N+4`   | waveform pair 2 (channels 2, 3)          |
//! | `4N+4 .. 6N+4`   | waveform pair 3 (channels 4, 5)          |

use crate::config::DecoderConfig;
use crate::decoder::DecodeError;
use crate::types::{RecordMetadata, WaveformChannel, WaveformPair};
use byteorder::{BigEndian, ByteOrder, NativeEndian};
use std::fmt;

/// Size of one word in bytes.
pub const WORD_SIZE: usize = DecoderConfig::WORD_SIZE;

/// Size of the timestamp and pulser block in bytes.
pub const METADATA_SIZE: usize = DecoderConfig::EXTRA_BYTES;

/// Scale applied to the coarse timestamp component.
pub const TIMESTAMP_COARSE_SCALE: f64 = 1e7;

/// Identifies a segment of a record, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// One of the three interleaved waveform pairs (1-based)
    WaveformPair(u8),
    /// Timestamp and pulser block
    Metadata,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::WaveformPair(n) => write!(f, "waveform pair {}", n),
            Segment::Metadata => write!(f, "timestamp/pulser block"),
        }
    }
}

/// Converts every 32-bit word of `buffer` from network to host byte order, in place.
///
/// A no-op on big-endian hosts, a byte reversal of each word on little-endian
/// hosts. The buffer length must be a multiple of [`WORD_SIZE`]; record sizes
/// are by construction, so a trailing partial word is a caller bug.
pub fn swap_words(buffer: &mut [u8]) {
    debug_assert_eq!(
        buffer.len() % WORD_SIZE,
        0,
        "buffer length must be a whole number of words"
    );

    if cfg!(target_endian = "big") {
        return;
    }

    for word in buffer.chunks_exact_mut(WORD_SIZE) {
        let value = BigEndian::read_u32(word);
        NativeEndian::write_u32(word, value);
    }
}

/// Returns `buffer[offset..offset + needed]`, or a [`DecodeError::MalformedSegment`].
#[inline]
fn region(
    buffer: &[u8],
    offset: usize,
    needed: usize,
    segment: Segment,
) -> Result<&[u8], DecodeError> {
    offset
        .checked_add(needed)
        .and_then(|end| buffer.get(offset..end))
        .ok_or(DecodeError::MalformedSegment {
            segment,
            offset,
            needed,
            available: buffer.len().saturating_sub(offset),
        })
}

/// Reads one interleaved waveform pair from a swapped buffer.
///
/// Word `2k` at `offset` becomes sample `k` of the first waveform and word
/// `2k + 1` sample `k` of the second, for `k` in `0..length`. Each word is
/// an IEEE-754 single, widened to `f64`. Returns the pair and the offset just
/// past the `2 * length` consumed words.
pub fn read_waveform_pair(
    buffer: &[u8],
    offset: usize,
    length: usize,
    sampling_frequency: f64,
    segment: Segment,
) -> Result<(WaveformPair, usize), DecodeError> {
    let needed = length
        .checked_mul(2 * WORD_SIZE)
        .ok_or(DecodeError::MalformedSegment {
            segment,
            offset,
            needed: usize::MAX,
            available: buffer.len().saturating_sub(offset),
        })?;
    let data = region(buffer, offset, needed, segment)?;

    let mut first = WaveformChannel::with_capacity(length, sampling_frequency);
    let mut second = WaveformChannel::with_capacity(length, sampling_frequency);
    for sample in data.chunks_exact(2 * WORD_SIZE) {
        first.push(f64::from(NativeEndian::read_f32(&sample[..WORD_SIZE])));
        second.push(f64::from(NativeEndian::read_f32(&sample[WORD_SIZE..])));
    }

    Ok((WaveformPair { first, second }, offset + needed))
}

/// Reads the timestamp and the two pulser counters from a swapped buffer.
///
/// Returns the metadata and the offset just past the consumed 16 bytes. Any
/// bit pattern is accepted.
pub fn read_pulser_chunks_and_timestamp(
    buffer: &[u8],
    offset: usize,
) -> Result<(RecordMetadata, usize), DecodeError> {
    let block = region(buffer, offset, METADATA_SIZE, Segment::Metadata)?;

    let coarse = NativeEndian::read_f32(&block[0..4]);
    let fine = NativeEndian::read_f32(&block[4..8]);
    let metadata = RecordMetadata {
        timestamp: combine_timestamp(coarse, fine),
        pulser_chunk_one: NativeEndian::read_u32(&block[8..12]),
        pulser_chunk_two: NativeEndian::read_u32(&block[12..16]),
    };

    Ok((metadata, offset + METADATA_SIZE))
}

/// Builds the 64-bit timestamp: `round(coarse * 1e7) + round(fine)`.
///
/// Both components are widened to `f64` first. Negative or NaN components
/// clamp to zero and the sum saturates at `u64::MAX`.
#[inline]
pub fn combine_timestamp(coarse: f32, fine: f32) -> u64 {
    let coarse = (f64::from(coarse) * TIMESTAMP_COARSE_SCALE).round() as u64;
    let fine = f64::from(fine).round() as u64;
    coarse.saturating_add(fine)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native_words(words: &[u32]) -> Vec<u8> {
        let mut buffer = vec![0u8; words.len() * WORD_SIZE];
        NativeEndian::write_u32_into(words, &mut buffer);
        buffer
    }

    fn interleaved(a: &[f32], b: &[f32]) -> Vec<u8> {
        let words: Vec<u32> = a
            .iter()
            .zip(b)
            .flat_map(|(x, y)| [x.to_bits(), y.to_bits()])
            .collect();
        native_words(&words)
    }

    #[test]
    fn test_swap_words_matches_big_endian() {
        let mut buffer = vec![0x01, 0x02, 0x03, 0x04, 0xAA, 0xBB, 0xCC, 0xDD];
        swap_words(&mut buffer);
        assert_eq!(NativeEndian::read_u32(&buffer[0..4]), 0x0102_0304);
        assert_eq!(NativeEndian::read_u32(&buffer[4..8]), 0xAABB_CCDD);
    }

    #[test]
    fn test_swap_words_empty() {
        let mut buffer: Vec<u8> = Vec::new();
        swap_words(&mut buffer);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_deinterleave_lengths() {
        for length in [0usize, 1, 8000] {
            let a: Vec<f32> = (0..length).map(|i| i as f32 * 0.5).collect();
            let b: Vec<f32> = (0..length).map(|i| -(i as f32) - 0.25).collect();
            let buffer = interleaved(&a, &b);

            let (pair, next) =
                read_waveform_pair(&buffer, 0, length, 20e6, Segment::WaveformPair(1)).unwrap();

            assert_eq!(next, 8 * length);
            assert_eq!(pair.first.len(), length);
            assert_eq!(pair.second.len(), length);
            let expected_a: Vec<f64> = a.iter().map(|&x| f64::from(x)).collect();
            let expected_b: Vec<f64> = b.iter().map(|&x| f64::from(x)).collect();
            assert_eq!(pair.first.samples(), expected_a.as_slice());
            assert_eq!(pair.second.samples(), expected_b.as_slice());
        }
    }

    #[test]
    fn test_deinterleave_is_bit_reinterpretation() {
        // 0x3F800000 is 1.0f32; a numeric cast would give 1065353216.0
        let buffer = native_words(&[0x3F80_0000, 0xC000_0000]);
        let (pair, _) = read_waveform_pair(&buffer, 0, 1, 20e6, Segment::WaveformPair(1)).unwrap();
        assert_eq!(pair.first.samples(), &[1.0]);
        assert_eq!(pair.second.samples(), &[-2.0]);
    }

    #[test]
    fn test_deinterleave_at_offset() {
        let mut buffer = native_words(&[0xFFFF_FFFF]);
        buffer.extend(interleaved(&[3.0], &[4.0]));
        let (pair, next) =
            read_waveform_pair(&buffer, 4, 1, 20e6, Segment::WaveformPair(2)).unwrap();
        assert_eq!(next, 12);
        assert_eq!(pair.first.samples(), &[3.0]);
        assert_eq!(pair.second.samples(), &[4.0]);
    }

    #[test]
    fn test_deinterleave_short_buffer() {
        let buffer = interleaved(&[1.0, 2.0], &[3.0, 4.0]);
        let err = read_waveform_pair(&buffer, 0, 3, 20e6, Segment::WaveformPair(3)).unwrap_err();
        match err {
            DecodeError::MalformedSegment {
                segment,
                needed,
                available,
                ..
            } => {
                assert_eq!(segment, Segment::WaveformPair(3));
                assert_eq!(needed, 24);
                assert_eq!(available, 16);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_timestamp_arithmetic() {
        assert_eq!(combine_timestamp(1.0, 5.0), 10_000_005);
        assert_eq!(combine_timestamp(0.0, 0.0), 0);
        assert_eq!(combine_timestamp(0.5, 0.4), 5_000_000);
        assert_eq!(combine_timestamp(0.0, 2.5), 3);
        assert_eq!(combine_timestamp(-1.0, 0.0), 0);
        assert_eq!(combine_timestamp(f32::MAX, f32::MAX), u64::MAX);
    }

    #[test]
    fn test_read_metadata() {
        let buffer = native_words(&[
            1.0f32.to_bits(),
            5.0f32.to_bits(),
            0xDEAD_BEEF,
            7,
        ]);
        let (meta, next) = read_pulser_chunks_and_timestamp(&buffer, 0).unwrap();
        assert_eq!(next, METADATA_SIZE);
        assert_eq!(meta.timestamp, 10_000_005);
        assert_eq!(meta.pulser_chunk_one, 0xDEAD_BEEF);
        assert_eq!(meta.pulser_chunk_two, 7);
    }

    #[test]
    fn test_read_metadata_short_buffer() {
        let buffer = native_words(&[0, 0, 0]);
        let err = read_pulser_chunks_and_timestamp(&buffer, 0).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MalformedSegment {
                segment: Segment::Metadata,
                needed: 16,
                available: 12,
                ..
            }
        ));
    }
}
