//! Python bindings for the BEGe trigger record decoder with numpy support.
//!
//! Decoded triggers are exposed through a single container object: scalar
//! fields as columnar numpy arrays and waveforms fetched per event and channel.

use bege_core::{
    ChannelRole, DecodeError, DecodeResult, DecoderConfig, EventStreamReader, MuonVeto,
    StreamSummary, TriggerEvent,
};
use numpy::{IntoPyArray, PyArray1};
use pyo3::exceptions::{PyIOError, PyIndexError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::io::Cursor;
use std::path::PathBuf;

/// Container for decoded trigger events.
///
/// Scalar fields are stored in columnar format for cheap numpy conversion;
/// waveforms stay with their events.
#[pyclass]
pub struct Triggers {
    /// Combined 64-bit timestamps
    timestamp: Vec<u64>,
    /// First pulser counter per trigger
    pulser_chunk_one: Vec<u32>,
    /// Second pulser counter per trigger
    pulser_chunk_two: Vec<u32>,
    /// Decoded events, for waveform access
    events: Vec<TriggerEvent>,
    /// Sampling frequency in Hz
    sampling_frequency: f64,
    /// Records implied by the file length
    expected: u64,
    /// Records that could not be decoded
    skipped: u64,
}

#[pymethods]
impl Triggers {
    /// Returns the number of decoded triggers.
    fn __len__(&self) -> usize {
        self.events.len()
    }

    /// Returns a string representation.
    fn __repr__(&self) -> String {
        format!(
            "Triggers(count={}, expected={}, skipped={}, sampling_frequency={})",
            self.events.len(),
            self.expected,
            self.skipped,
            self.sampling_frequency
        )
    }

    /// Returns the timestamps as a numpy array.
    #[getter]
    fn timestamp<'py>(&self, py: Python<'py>) -> &'py PyArray1<u64> {
        self.timestamp.clone().into_pyarray(py)
    }

    /// Returns the first pulser counters as a numpy array.
    #[getter]
    fn pulser_chunk_one<'py>(&self, py: Python<'py>) -> &'py PyArray1<u32> {
        self.pulser_chunk_one.clone().into_pyarray(py)
    }

    /// Returns the second pulser counters as a numpy array.
    #[getter]
    fn pulser_chunk_two<'py>(&self, py: Python<'py>) -> &'py PyArray1<u32> {
        self.pulser_chunk_two.clone().into_pyarray(py)
    }

    /// Returns a boolean array, true where either pulser counter is set.
    #[getter]
    fn pulser_on<'py>(&self, py: Python<'py>) -> &'py PyArray1<bool> {
        self.events
            .iter()
            .map(TriggerEvent::pulser_on)
            .collect::<Vec<_>>()
            .into_pyarray(py)
    }

    /// Returns the sampling frequency in Hz.
    #[getter]
    fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    /// Returns the number of records implied by the input length.
    #[getter]
    fn expected(&self) -> u64 {
        self.expected
    }

    /// Returns the number of records that could not be decoded.
    #[getter]
    fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Returns one waveform as a numpy array.
    ///
    /// Args:
    ///     event: Trigger index
    ///     channel: Channel index 0-5 (3 is the muon veto)
    fn waveform<'py>(
        &self,
        py: Python<'py>,
        event: usize,
        channel: usize,
    ) -> PyResult<&'py PyArray1<f64>> {
        let role = ChannelRole::from_index(channel)
            .ok_or_else(|| PyIndexError::new_err(format!("No channel {}", channel)))?;
        let trigger = self
            .events
            .get(event)
            .ok_or_else(|| PyIndexError::new_err(format!("No trigger {}", event)))?;
        Ok(trigger.waveform(role).samples().to_vec().into_pyarray(py))
    }

    /// Returns the muon veto regions of one trigger as (beginning, end) pairs.
    #[pyo3(signature = (event, threshold=bege_core::veto::DEFAULT_VETO_THRESHOLD))]
    fn veto_regions(&self, event: usize, threshold: f64) -> PyResult<Vec<(usize, usize)>> {
        let trigger = self
            .events
            .get(event)
            .ok_or_else(|| PyIndexError::new_err(format!("No trigger {}", event)))?;
        let veto = MuonVeto::from_waveform(trigger.waveform(ChannelRole::MuonVeto), threshold);
        Ok(veto
            .regions()
            .iter()
            .map(|region| (region.beginning, region.end))
            .collect())
    }

    /// Returns the scalar arrays as a dictionary.
    ///
    /// This is useful for creating a pandas DataFrame.
    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<PyObject> {
        let dict = PyDict::new(py);
        dict.set_item("timestamp", self.timestamp.clone().into_pyarray(py))?;
        dict.set_item("pulser_chunk_one", self.pulser_chunk_one.clone().into_pyarray(py))?;
        dict.set_item("pulser_chunk_two", self.pulser_chunk_two.clone().into_pyarray(py))?;
        dict.set_item("pulser_on", self.pulser_on(py))?;
        Ok(dict.into())
    }
}

impl Triggers {
    fn from_events(
        events: Vec<TriggerEvent>,
        summary: StreamSummary,
        sampling_frequency: f64,
    ) -> Self {
        let len = events.len();
        let mut timestamp = Vec::with_capacity(len);
        let mut pulser_chunk_one = Vec::with_capacity(len);
        let mut pulser_chunk_two = Vec::with_capacity(len);

        for event in &events {
            timestamp.push(event.timestamp);
            pulser_chunk_one.push(event.pulser_chunk_one);
            pulser_chunk_two.push(event.pulser_chunk_two);
        }

        Self {
            timestamp,
            pulser_chunk_one,
            pulser_chunk_two,
            events,
            sampling_frequency,
            expected: summary.expected,
            skipped: summary.skipped,
        }
    }
}

fn make_config(sampling_frequency: f64, waveform_length: usize) -> PyResult<DecoderConfig> {
    DecoderConfig::new(sampling_frequency, waveform_length)
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

fn decode_error(e: DecodeError) -> PyErr {
    match e {
        DecodeError::StructuralCorruption { .. } | DecodeError::Config(_) => {
            PyValueError::new_err(e.to_string())
        }
        _ => PyIOError::new_err(format!("Failed to decode: {}", e)),
    }
}

/// Decodes a binary trigger file.
///
/// Args:
///     path: Path to the binary file
///     sampling_frequency: Sampling frequency in Hz (default: 20e6)
///     waveform_length: Samples per waveform (default: 8000)
///
/// Returns:
///     Triggers: Container with timestamps, pulser counters and waveforms
///
/// Example:
///     >>> import bege
///     >>> triggers = bege.decode_file("run_0042.dat")
///     >>> print(f"Decoded {len(triggers)} triggers")
///     >>> veto = triggers.waveform(0, 3)  # numpy array
#[pyfunction]
#[pyo3(signature = (path, sampling_frequency=20.0e6, waveform_length=8000))]
fn decode_file(
    py: Python<'_>,
    path: &str,
    sampling_frequency: f64,
    waveform_length: usize,
) -> PyResult<Py<Triggers>> {
    let config = make_config(sampling_frequency, waveform_length)?;
    let path = PathBuf::from(path);

    let DecodeResult { events, summary } =
        py.allow_threads(|| bege_core::decode_file(&path, &config)).map_err(decode_error)?;

    Py::new(py, Triggers::from_events(events, summary, config.sampling_frequency))
}

/// Decodes trigger records already in memory.
///
/// Args:
///     data: Concatenated raw records
///     sampling_frequency: Sampling frequency in Hz (default: 20e6)
///     waveform_length: Samples per waveform (default: 8000)
///
/// Returns:
///     Triggers: Container with decoded triggers
#[pyfunction]
#[pyo3(signature = (data, sampling_frequency=20.0e6, waveform_length=8000))]
fn decode_bytes(
    py: Python<'_>,
    data: &[u8],
    sampling_frequency: f64,
    waveform_length: usize,
) -> PyResult<Py<Triggers>> {
    let config = make_config(sampling_frequency, waveform_length)?;

    let mut reader = EventStreamReader::new(Cursor::new(data), &config).map_err(decode_error)?;
    let mut events: Vec<TriggerEvent> = Vec::new();
    let summary = reader.run(&mut events).map_err(decode_error)?;

    Py::new(py, Triggers::from_events(events, summary, config.sampling_frequency))
}

/// BEGe trigger decoder module for Python.
#[pymodule]
fn _bege(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(decode_file, m)?)?;
    m.add_function(wrap_pyfunction!(decode_bytes, m)?)?;
    m.add_class::<Triggers>()?;
    Ok(())
}
