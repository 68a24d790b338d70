//! In-memory recording model.
//!
//! A [`Recording`] exclusively owns its channels and their sample buffers for
//! the duration of one pipeline run. Channels may carry different sample
//! rates (respiratory traces are commonly slower than EMG), so samples are
//! stored per channel rather than as one rate-uniform matrix.

use chrono::NaiveDateTime;

/// One named signal with its declared physical range.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Dialect-specific label, e.g. `"EMG Chin"` or `"LAT"`.
    pub label: String,
    /// Physical dimension, e.g. `"uV"`. Empty on non-compliant sources.
    pub unit: String,
    /// Sample rate in Hz.
    pub sfreq: f64,
    /// Declared physical minimum. Every stored sample must be ≥ this.
    pub physical_min: f64,
    /// Declared physical maximum. Every stored sample must be ≤ this.
    pub physical_max: f64,
    /// Prefilter description carried into the container header, e.g.
    /// `"HP:10Hz LP:100Hz N:60Hz"` after conditioning.
    pub prefilter: String,
    /// Samples in physical units.
    pub samples: Vec<f64>,
}

impl Channel {
    /// Duration of this channel in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sfreq
    }

    /// Observed extrema of the sample buffer, `(min, max)`.
    /// `(0.0, 0.0)` for an empty buffer.
    pub fn extrema(&self) -> (f64, f64) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &v in &self.samples {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if self.samples.is_empty() {
            (0.0, 0.0)
        } else {
            (lo, hi)
        }
    }

    /// True when every sample lies inside the declared physical range.
    pub fn range_holds(&self) -> bool {
        self.samples
            .iter()
            .all(|&v| v >= self.physical_min && v <= self.physical_max)
    }
}

/// A multi-channel biosignal recording anchored at an absolute start instant.
///
/// Invariant: all channels share the start instant; only their rates and
/// lengths may differ.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Absolute start of the recording (no timezone; clock-local).
    pub start: NaiveDateTime,
    pub channels: Vec<Channel>,
}

impl Recording {
    /// Total duration in seconds: the longest channel's duration.
    pub fn duration_secs(&self) -> f64 {
        self.channels
            .iter()
            .map(Channel::duration_secs)
            .fold(0.0, f64::max)
    }

    /// Find a channel by exact label.
    pub fn channel(&self, label: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.label == label)
    }

    /// Channel labels in order.
    pub fn labels(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.label.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 10, 29)
            .unwrap()
            .and_hms_opt(22, 14, 3)
            .unwrap()
    }

    #[test]
    fn duration_is_longest_channel() {
        let rec = Recording {
            start: start(),
            channels: vec![
                Channel {
                    label: "CHIN".into(),
                    unit: "uV".into(),
                    sfreq: 200.0,
                    physical_min: -500.0,
                    physical_max: 500.0,
                    prefilter: String::new(),
                    samples: vec![0.0; 2000], // 10 s
                },
                Channel {
                    label: "Flow".into(),
                    unit: "L/s".into(),
                    sfreq: 25.0,
                    physical_min: -1.0,
                    physical_max: 1.0,
                    prefilter: String::new(),
                    samples: vec![0.0; 100], // 4 s
                },
            ],
        };
        assert_eq!(rec.duration_secs(), 10.0);
    }

    #[test]
    fn range_violation_detected() {
        let ch = Channel {
            label: "CHIN".into(),
            unit: "uV".into(),
            sfreq: 200.0,
            physical_min: -12.0,
            physical_max: 12.0,
            prefilter: String::new(),
            samples: vec![0.0, -40.0, 3.0],
        };
        assert!(!ch.range_holds());
        assert_eq!(ch.extrema(), (-40.0, 3.0));
    }
}
