//! Event-presence signals and fixed-width windowing.
//!
//! The window grid is always derived from an explicit origin — in practice
//! the recording's own start instant — never from a library default epoch.
//! Deriving the grid from a fixed external epoch while onsets carry
//! sub-second precision makes every window boundary miss every sample
//! timestamp, which downstream turns into an all-missing result without any
//! exception being raised. Anchoring on the data's first timestamp makes
//! every sample fall into exactly one window by construction; the origin is
//! therefore a mandatory parameter of every windowing call in this crate.
//!
//! A sample not covered by any event interval is explicitly `false` — absent
//! never coerces to "event present".
use anyhow::{bail, Result};
use chrono::NaiveDateTime;

use crate::events::EventInterval;

/// Per-sample boolean presence of `events` over a channel grid of
/// `n_samples` at `sfreq`, starting at `start`.
///
/// Every sample defaults to `false` (no event); samples inside any interval
/// are set `true`.
pub fn presence_signal(
    events: &[EventInterval],
    start: NaiveDateTime,
    sfreq: f64,
    n_samples: usize,
) -> Vec<bool> {
    let mut present = vec![false; n_samples];
    for ev in events {
        let onset_secs = match (ev.onset - start).num_microseconds() {
            Some(us) => us as f64 / 1e6,
            None => continue,
        };
        let end_secs = onset_secs + ev.duration_secs;
        if end_secs <= 0.0 {
            continue;
        }
        let first = (onset_secs.max(0.0) * sfreq).ceil() as usize;
        let last = ((end_secs * sfreq).ceil() as usize).min(n_samples);
        for slot in present.iter_mut().take(last).skip(first) {
            *slot = true;
        }
    }
    present
}

/// Aggregate a per-sample presence signal into fixed-width windows anchored
/// at `origin`.
///
/// Returns the fraction of `true` samples per window. Every sample is
/// assigned to exactly one window; a start instant earlier than the origin
/// would leave samples unmappable and is rejected instead of silently
/// producing missing values.
pub fn window_presence(
    presence: &[bool],
    start: NaiveDateTime,
    sfreq: f64,
    origin: NaiveDateTime,
    window_secs: f64,
) -> Result<Vec<f64>> {
    if window_secs <= 0.0 {
        bail!("window length must be positive, got {window_secs}");
    }
    let offset_secs = match (start - origin).num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => bail!("start/origin span too large"),
    };
    if offset_secs < 0.0 {
        bail!("recording start {start} precedes window origin {origin}; samples would be unmapped");
    }
    if presence.is_empty() {
        return Ok(vec![]);
    }

    let last_t = offset_secs + (presence.len() - 1) as f64 / sfreq;
    let n_windows = (last_t / window_secs).floor() as usize + 1;
    let mut hits = vec![0usize; n_windows];
    let mut totals = vec![0usize; n_windows];

    for (i, &p) in presence.iter().enumerate() {
        let t = offset_secs + i as f64 / sfreq;
        let w = (t / window_secs).floor() as usize;
        totals[w] += 1;
        if p {
            hits[w] += 1;
        }
    }

    // A window with no samples (possible only when the origin predates the
    // start) reports 0.0 — explicitly "no event", never a missing value.
    Ok(hits
        .iter()
        .zip(&totals)
        .map(|(&h, &t)| if t == 0 { 0.0 } else { h as f64 / t as f64 })
        .collect())
}

/// Expand zero-duration sleep-stage markers labeled `label` into intervals
/// running to the next stage onset (or one scoring epoch for the last one).
pub fn stage_intervals(
    stages: &[EventInterval],
    label: &str,
    epoch_secs: f64,
) -> Vec<EventInterval> {
    let mut out = Vec::new();
    for (i, st) in stages.iter().enumerate() {
        if st.label != label {
            continue;
        }
        let dur = match stages.get(i + 1) {
            Some(next) => (next.onset - st.onset).num_microseconds().unwrap_or(0) as f64 / 1e6,
            None => epoch_secs,
        };
        out.push(EventInterval {
            duration_secs: dur.max(0.0),
            ..st.clone()
        });
    }
    out
}
