//! Muon veto regions.
//!
//! The veto panel fires negative. Sample ranges where the veto waveform sits
//! at or beyond a threshold are collected as regions, and detector pulses that
//! overlap a region can be rejected downstream.

use crate::types::{ChannelRole, TriggerEvent, WaveformChannel};

/// Veto threshold in volts.
pub const DEFAULT_VETO_THRESHOLD: f64 = -0.2;

/// An inclusive range of sample indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformRegion {
    pub beginning: usize,
    pub end: usize,
}

impl WaveformRegion {
    #[inline]
    pub fn contains(&self, position: usize) -> bool {
        position >= self.beginning && position <= self.end
    }
}

/// Finds the maximal runs of samples that cross `threshold`.
///
/// A negative threshold matches samples `<= threshold`, any other threshold
/// matches samples `>= threshold`.
pub fn find_pulse_regions(samples: &[f64], threshold: f64) -> Vec<WaveformRegion> {
    let crosses = |sample: f64| {
        if threshold < 0.0 {
            sample <= threshold
        } else {
            sample >= threshold
        }
    };

    let mut regions = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, &sample) in samples.iter().enumerate() {
        match (crosses(sample), start) {
            (true, None) => start = Some(idx),
            (false, Some(beginning)) => {
                regions.push(WaveformRegion {
                    beginning,
                    end: idx - 1,
                });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(beginning) = start {
        regions.push(WaveformRegion {
            beginning,
            end: samples.len() - 1,
        });
    }

    regions
}

/// Regions of a trigger during which the muon veto fired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuonVeto {
    regions: Vec<WaveformRegion>,
}

impl MuonVeto {
    pub fn new(regions: Vec<WaveformRegion>) -> Self {
        Self { regions }
    }

    /// Runs the pulse finder over a veto waveform.
    pub fn from_waveform(waveform: &WaveformChannel, threshold: f64) -> Self {
        Self::new(find_pulse_regions(waveform.samples(), threshold))
    }

    /// Uses the veto channel of an event with the default threshold.
    pub fn from_event(event: &TriggerEvent) -> Self {
        Self::from_waveform(event.waveform(ChannelRole::MuonVeto), DEFAULT_VETO_THRESHOLD)
    }

    pub fn regions(&self) -> &[WaveformRegion] {
        &self.regions
    }

    pub fn number_of_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn is_in_veto_region(&self, position: usize) -> bool {
        self.regions.iter().any(|region| region.contains(position))
    }

    /// True when `beginning..=end` overlaps any veto region.
    pub fn range_is_in_veto_region(&self, beginning: usize, end: usize) -> bool {
        // Either endpoint inside a region covers partial and full containment
        if self.is_in_veto_region(beginning) || self.is_in_veto_region(end) {
            return true;
        }
        // Range straddles a whole region
        self.regions
            .iter()
            .any(|region| beginning <= region.beginning && end >= region.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn veto() -> MuonVeto {
        MuonVeto::new(vec![
            WaveformRegion {
                beginning: 10,
                end: 20,
            },
            WaveformRegion {
                beginning: 50,
                end: 50,
            },
        ])
    }

    #[test]
    fn test_find_negative_pulses() {
        let samples = [0.0, -0.3, -0.5, 0.0, -0.1, -0.2, -0.25];
        let regions = find_pulse_regions(&samples, -0.2);
        assert_eq!(
            regions,
            vec![
                WaveformRegion {
                    beginning: 1,
                    end: 2
                },
                WaveformRegion {
                    beginning: 5,
                    end: 6
                },
            ]
        );
    }

    #[test]
    fn test_find_positive_pulses() {
        let samples = [1.0, 0.0, 0.4, 0.6];
        let regions = find_pulse_regions(&samples, 0.5);
        assert_eq!(
            regions,
            vec![
                WaveformRegion {
                    beginning: 0,
                    end: 0
                },
                WaveformRegion {
                    beginning: 3,
                    end: 3
                },
            ]
        );
        assert!(find_pulse_regions(&[], 0.5).is_empty());
    }

    #[test]
    fn test_is_in_veto_region() {
        let veto = veto();
        assert!(veto.is_in_veto_region(10));
        assert!(veto.is_in_veto_region(20));
        assert!(veto.is_in_veto_region(50));
        assert!(!veto.is_in_veto_region(9));
        assert!(!veto.is_in_veto_region(21));
        assert!(!MuonVeto::default().is_in_veto_region(0));
    }

    #[test]
    fn test_range_overlap_cases() {
        let veto = veto();
        // Fully inside
        assert!(veto.range_is_in_veto_region(12, 15));
        // Beginning inside
        assert!(veto.range_is_in_veto_region(18, 30));
        // End inside
        assert!(veto.range_is_in_veto_region(0, 10));
        // Covers a region
        assert!(veto.range_is_in_veto_region(40, 60));
        // Disjoint
        assert!(!veto.range_is_in_veto_region(21, 49));
        assert!(!veto.range_is_in_veto_region(0, 9));
    }

    #[test]
    fn test_from_waveform() {
        let wf = WaveformChannel::new(vec![0.0, -1.0, -1.0, 0.0], 20e6);
        let veto = MuonVeto::from_waveform(&wf, DEFAULT_VETO_THRESHOLD);
        assert_eq!(veto.number_of_regions(), 1);
        assert_eq!(
            veto.regions()[0],
            WaveformRegion {
                beginning: 1,
                end: 2
            }
        );
    }
}
