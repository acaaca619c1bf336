//! Acquisition configuration.
//!
//! The record geometry is not stored in the data stream, so the decoder and
//! the instrument must agree on it up front. A [`DecoderConfig`] is built once
//! at startup (from defaults, explicit values, or a YAML file) and handed by
//! reference to every component.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while building a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file {0} does not exist")]
    BadFilePath(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default sampling frequency of the digitizer (20 MHz).
pub const DEFAULT_SAMPLING_FREQUENCY: f64 = 20.0e6;

/// Default number of samples per waveform.
pub const DEFAULT_WAVEFORM_LENGTH: usize = 8000;

/// Record geometry and sampling information for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Sampling frequency in Hz, constant for the whole run
    pub sampling_frequency: f64,
    /// Samples per waveform channel
    pub waveform_length: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sampling_frequency: DEFAULT_SAMPLING_FREQUENCY,
            waveform_length: DEFAULT_WAVEFORM_LENGTH,
        }
    }
}

impl DecoderConfig {
    /// Size of one word on the wire, in bytes.
    pub const WORD_SIZE: usize = 4;
    /// Waveforms stored in each trigger record.
    pub const NUM_WAVEFORMS_PER_TRIGGER: usize = 6;
    /// Bytes of timestamp and pulser data between the first and second waveform pair.
    pub const EXTRA_BYTES: usize = 16;

    /// Creates a validated configuration.
    pub fn new(sampling_frequency: f64, waveform_length: usize) -> Result<Self, ConfigError> {
        let config = Self {
            sampling_frequency,
            waveform_length,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from a YAML file. Fields left out take their defaults.
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;
        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values describe a usable record geometry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sampling_frequency.is_finite() || self.sampling_frequency <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sampling frequency must be positive, got {}",
                self.sampling_frequency
            )));
        }
        if self.waveform_length == 0 {
            return Err(ConfigError::Invalid(
                "waveform length must be at least one sample".to_string(),
            ));
        }
        // The binary container stores the length as a u32
        if u32::try_from(self.waveform_length).is_err() {
            return Err(ConfigError::Invalid(format!(
                "waveform length {} exceeds {}",
                self.waveform_length,
                u32::MAX
            )));
        }
        if self.checked_record_size().is_none() {
            return Err(ConfigError::Invalid(format!(
                "waveform length {} overflows the record size",
                self.waveform_length
            )));
        }
        Ok(())
    }

    /// Total size of one trigger record in bytes, or `None` if it does not fit a `usize`.
    pub fn checked_record_size(&self) -> Option<usize> {
        (Self::WORD_SIZE * Self::NUM_WAVEFORMS_PER_TRIGGER)
            .checked_mul(self.waveform_length)?
            .checked_add(Self::EXTRA_BYTES)
    }

    /// Total size of one trigger record in bytes.
    ///
    /// Saturates at `usize::MAX` for geometries [`Self::validate`] rejects.
    #[inline]
    pub fn record_size(&self) -> usize {
        self.checked_record_size().unwrap_or(usize::MAX)
    }

    /// Size in bytes of one interleaved waveform pair.
    #[inline]
    pub fn pair_size(&self) -> usize {
        (2 * Self::WORD_SIZE).saturating_mul(self.waveform_length)
    }

    /// Time between two samples, in seconds.
    #[inline]
    pub fn sampling_period(&self) -> f64 {
        1.0 / self.sampling_frequency
    }
}
