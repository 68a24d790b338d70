//! EMG signal conditioning.
//!
//! Per channel with a resolved role, in order:
//! 1. Butterworth band-pass (role high-pass cutoff .. 100 Hz, low-pass
//!    clamped below Nyquist) — removes baseline drift and high-frequency
//!    noise in one stage.
//! 2. Notch at the local line frequency (Q = 30) — removes mains
//!    interference, leaving adjacent frequencies untouched.
//!
//! Both stages run zero-phase (see [`crate::filter::apply`]). Channels with
//! no role mapping pass through untouched and are flagged in the report,
//! never dropped.
use anyhow::{Context, Result};
use log::{info, warn};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Serialize;

use crate::config::{ChannelRole, PipelineConfig};
use crate::filter::{butter_bandpass, clamp_lowpass, design_notch, filtfilt};
use crate::recording::Recording;
use crate::reconstruct::physical_range;

/// Power fractions (percent of total) in the bands used to validate
/// conditioning.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BandPower {
    /// DC and drift: 0–10 Hz.
    pub low_freq_pct: f64,
    /// EMG band: 20–100 Hz.
    pub emg_band_pct: f64,
    /// Line interference: notch center ± 2 Hz.
    pub line_pct: f64,
}

/// Power spectrum fractions of `x` at `sfreq`, with the line band centered
/// on `line_hz`.
pub fn band_power(x: &[f64], sfreq: f64, line_hz: f64) -> BandPower {
    let n = x.len();
    if n == 0 {
        return BandPower {
            low_freq_pct: 0.0,
            emg_band_pct: 0.0,
            line_pct: 0.0,
        };
    }
    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    let mut buf: Vec<Complex<f64>> = x.iter().map(|&v| Complex { re: v, im: 0.0 }).collect();
    fft.process(&mut buf);

    let half = n / 2 + 1;
    let df = sfreq / n as f64;
    let mut total = 0.0;
    let mut low = 0.0;
    let mut emg = 0.0;
    let mut line = 0.0;
    for (i, c) in buf[..half].iter().enumerate() {
        let f = i as f64 * df;
        let p = c.norm_sqr();
        total += p;
        if f < 10.0 {
            low += p;
        }
        if (20.0..=100.0).contains(&f) {
            emg += p;
        }
        if (f - line_hz).abs() <= 2.0 {
            line += p;
        }
    }
    if total == 0.0 {
        total = 1.0;
    }
    BandPower {
        low_freq_pct: 100.0 * low / total,
        emg_band_pct: 100.0 * emg / total,
        line_pct: 100.0 * line / total,
    }
}

/// Per-channel conditioning outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelReport {
    pub label: String,
    /// Resolved role, `None` for pass-through channels.
    pub role: Option<ChannelRole>,
    pub filtered: bool,
    pub before: BandPower,
    pub after: BandPower,
}

/// Structured before/after report for one recording.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionReport {
    pub sampling_rates_hz: Vec<f64>,
    pub channels: Vec<ChannelReport>,
    /// Channels without a role mapping (recoverable, passed through).
    pub unresolved_roles: usize,
}

/// Condition every EMG-role channel of `rec` in place and report band powers.
pub fn condition(mut rec: Recording, cfg: &PipelineConfig) -> Result<(Recording, ConditionReport)> {
    let mut channels = Vec::with_capacity(rec.channels.len());
    let mut unresolved = 0usize;

    for ch in &mut rec.channels {
        let role = cfg.roles.resolve(&ch.label);
        let before = band_power(&ch.samples, ch.sfreq, cfg.line_freq_hz);

        let filtered = match role {
            Some(role) => {
                let spec = cfg.filter_spec(role);
                let band = butter_bandpass(spec.order, spec.highpass_hz, spec.lowpass_hz, ch.sfreq)
                    .with_context(|| format!("band-pass design for {:?}", ch.label))?;
                let notch = design_notch(spec.notch_hz, spec.notch_q, ch.sfreq)
                    .with_context(|| format!("notch design for {:?}", ch.label))?;

                let passed = filtfilt(&ch.samples, &band)
                    .and_then(|y| filtfilt(&y, &notch))
                    .with_context(|| format!("conditioning {:?}", ch.label))?;
                ch.samples = passed;

                // Filtered amplitudes shrink, but the declared range must
                // still be re-derived from what is actually stored.
                let (lo, hi) = physical_range(&ch.samples, Some(cfg.emg_range_floor_uv));
                ch.physical_min = lo;
                ch.physical_max = hi;
                ch.prefilter = format!(
                    "HP:{}Hz LP:{}Hz N:{}Hz",
                    spec.highpass_hz,
                    clamp_lowpass(spec.lowpass_hz, ch.sfreq),
                    spec.notch_hz
                );
                true
            }
            None => {
                unresolved += 1;
                warn!("no role mapping for channel {:?}: passed through unfiltered", ch.label);
                false
            }
        };

        let after = band_power(&ch.samples, ch.sfreq, cfg.line_freq_hz);
        if filtered {
            info!(
                "{}: low-freq {:.1}% -> {:.1}%, line {:.1}% -> {:.1}%",
                ch.label, before.low_freq_pct, after.low_freq_pct, before.line_pct, after.line_pct
            );
        }
        channels.push(ChannelReport {
            label: ch.label.clone(),
            role,
            filtered,
            before,
            after,
        });
    }

    let report = ConditionReport {
        sampling_rates_hz: rec.channels.iter().map(|c| c.sfreq).collect(),
        channels,
        unresolved_roles: unresolved,
    };
    Ok((rec, report))
}
