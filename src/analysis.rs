//! Hand-off to the external RBD analysis tool.
//!
//! The tool itself is a black box: it accepts a conditioned continuous
//! recording, the three canonical annotation files, and the channel-role
//! mapping, and returns per-channel baseline-amplitude and artifact/REM
//! overlap statistics. [`AtoniaAnalyzer`] is the seam; the built-in
//! [`BaselineAnalyzer`] computes the statistics the tool reports back so a
//! run is verifiable end to end without the external binary. The RBD
//! scoring/classification logic itself lives outside this crate.
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::align::{presence_signal, stage_intervals, window_presence};
use crate::annotate::NormalizedAnnotations;
use crate::config::{ChannelRole, PipelineConfig};
use crate::events::AnnotationFiles;
use crate::recording::Recording;
use crate::resample;

/// Everything the analysis tool consumes for one recording.
#[derive(Debug)]
pub struct PreparedRecording {
    /// Conditioned continuous EDF+C on disk.
    pub edf_path: PathBuf,
    /// The three canonical annotation files.
    pub annotations: AnnotationFiles,
    /// Conditioned in-memory recording (rates already reconciled).
    pub recording: Recording,
    /// Normalized events backing the annotation files.
    pub events: NormalizedAnnotations,
    /// Role of each EMG channel, `(label, role)`.
    pub emg_channels: Vec<(String, ChannelRole)>,
}

/// Per-channel statistics returned by the analysis tool.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    pub label: String,
    pub role: ChannelRole,
    /// Baseline resting EMG amplitude (µV, RMS) over artifact-free REM.
    pub baseline_uv: f64,
    /// Fraction of REM windows overlapped by arousal/respiratory artifacts.
    pub artifact_rem_overlap: f64,
    /// Seconds of artifact-free REM backing the baseline.
    pub artifact_free_rem_secs: f64,
}

/// Aggregate analysis result for one recording.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStats {
    pub channels: Vec<ChannelStats>,
}

/// Seam for the external analysis tool.
pub trait AtoniaAnalyzer {
    fn analyze(&self, prepared: &PreparedRecording, cfg: &PipelineConfig) -> Result<AnalysisStats>;
}

/// Built-in analyzer: baseline EMG over artifact-free REM, computed on
/// window grids anchored at the recording start.
#[derive(Debug, Default)]
pub struct BaselineAnalyzer {
    /// Width of the overlap windows in seconds.
    pub window_secs: f64,
}

impl BaselineAnalyzer {
    pub fn new() -> Self {
        Self { window_secs: 3.0 }
    }
}

impl AtoniaAnalyzer for BaselineAnalyzer {
    fn analyze(&self, prepared: &PreparedRecording, cfg: &PipelineConfig) -> Result<AnalysisStats> {
        let window_secs = if self.window_secs > 0.0 { self.window_secs } else { 3.0 };
        let rec = &prepared.recording;
        let events = &prepared.events;

        let rem = stage_intervals(&events.stages, "REM", cfg.stage_epoch_secs);
        let mut artifacts = events.arousals.clone();
        artifacts.extend(events.respiratory.iter().cloned());

        let mut channels = Vec::new();
        for (label, role) in &prepared.emg_channels {
            let Some(ch) = rec.channel(label) else {
                bail!("role-mapped channel {label:?} missing from conditioned recording");
            };

            // Reconcile the channel with the analyzer reference rate by
            // resampling; a differing rate is never truncated away.
            let (samples, sfreq) = if (ch.sfreq - cfg.analyzer_sfreq).abs() > 1e-6 {
                (
                    resample::resample(&ch.samples, ch.sfreq, cfg.analyzer_sfreq)?,
                    cfg.analyzer_sfreq,
                )
            } else {
                (ch.samples.clone(), ch.sfreq)
            };
            let n = samples.len();

            let rem_present = presence_signal(&rem, rec.start, sfreq, n);
            let art_present = presence_signal(&artifacts, rec.start, sfreq, n);

            // Window grids anchored at the recording's own start instant.
            let rem_w = window_presence(&rem_present, rec.start, sfreq, rec.start, window_secs)?;
            let art_w = window_presence(&art_present, rec.start, sfreq, rec.start, window_secs)?;

            let rem_windows = rem_w.iter().filter(|&&f| f > 0.0).count();
            let overlap_windows = rem_w
                .iter()
                .zip(&art_w)
                .filter(|(&r, &a)| r > 0.0 && a > 0.0)
                .count();
            let overlap = if rem_windows > 0 {
                overlap_windows as f64 / rem_windows as f64
            } else {
                0.0
            };

            // Baseline RMS over samples that are REM and artifact-free.
            let mut sum_sq = 0.0;
            let mut count = 0usize;
            for i in 0..n {
                if rem_present[i] && !art_present[i] {
                    sum_sq += samples[i] * samples[i];
                    count += 1;
                }
            }
            let baseline_uv = if count > 0 {
                (sum_sq / count as f64).sqrt()
            } else {
                0.0
            };

            channels.push(ChannelStats {
                label: label.clone(),
                role: *role,
                baseline_uv,
                artifact_rem_overlap: overlap,
                artifact_free_rem_secs: count as f64 / sfreq,
            });
        }
        Ok(AnalysisStats { channels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventInterval, EventKind};
    use crate::recording::Channel;
    use chrono::NaiveDate;

    fn start() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 10, 29)
            .unwrap()
            .and_hms_opt(22, 0, 0)
            .unwrap()
    }

    fn prepared(samples: Vec<f64>, sfreq: f64) -> PreparedRecording {
        let stages = vec![EventInterval {
            onset: start(),
            duration_secs: 0.0,
            kind: EventKind::SleepStage,
            label: "REM".into(),
        }];
        let arousals = vec![EventInterval {
            onset: start() + chrono::Duration::seconds(6),
            duration_secs: 3.0,
            kind: EventKind::Arousal,
            label: "Spontaneous".into(),
        }];
        PreparedRecording {
            edf_path: PathBuf::from("/tmp/x.edf"),
            annotations: AnnotationFiles {
                sleep_profile: PathBuf::new(),
                arousals: PathBuf::new(),
                flow_events: PathBuf::new(),
            },
            recording: Recording {
                start: start(),
                channels: vec![Channel {
                    label: "EMG Chin".into(),
                    unit: "uV".into(),
                    sfreq,
                    physical_min: -500.0,
                    physical_max: 500.0,
                    prefilter: String::new(),
                    samples,
                }],
            },
            events: NormalizedAnnotations {
                effective_start: start(),
                stages,
                arousals,
                respiratory: vec![],
                skipped_rows: 0,
            },
            emg_channels: vec![("EMG Chin".into(), ChannelRole::ChinEmg)],
        }
    }

    #[test]
    fn baseline_excludes_artifact_samples() {
        // 30 s at 256 Hz: quiet 2 µV everywhere, 100 µV burst during the
        // 3-second arousal. Baseline must stay near 2 µV.
        let sfreq = 256.0;
        let cfg = PipelineConfig {
            stage_epoch_secs: 30.0,
            ..PipelineConfig::default()
        };
        let samples: Vec<f64> = (0..(30.0 * sfreq) as usize)
            .map(|i| {
                let t = i as f64 / sfreq;
                if (6.0..9.0).contains(&t) {
                    100.0
                } else {
                    2.0
                }
            })
            .collect();
        let stats = BaselineAnalyzer::new()
            .analyze(&prepared(samples, sfreq), &cfg)
            .unwrap();
        let ch = &stats.channels[0];
        approx::assert_abs_diff_eq!(ch.baseline_uv, 2.0, epsilon = 0.1);
        assert!(ch.artifact_rem_overlap > 0.0);
        assert!(ch.artifact_free_rem_secs > 25.0);
    }

    #[test]
    fn differing_rate_is_resampled_not_truncated() {
        let sfreq = 200.0;
        let cfg = PipelineConfig::default(); // analyzer at 256 Hz
        let samples = vec![2.0; (30.0 * sfreq) as usize];
        let stats = BaselineAnalyzer::new()
            .analyze(&prepared(samples, sfreq), &cfg)
            .unwrap();
        // The full 30 s span survives the rate change.
        let ch = &stats.channels[0];
        assert!(ch.artifact_free_rem_secs > 25.0);
    }
}
