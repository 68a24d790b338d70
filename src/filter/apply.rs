//! Zero-phase filter application.
//!
//! Every conditioning stage runs forward-and-backward (`sosfiltfilt`), which
//! cancels the phase delay of a single pass. This is mandatory: filtered EMG
//! must stay sample-aligned with externally supplied sleep-stage and arousal
//! timestamps, and any phase shift silently desynchronizes signal from
//! annotation. Zero-phase filtering consumes the complete series — there is
//! no streaming variant.
use anyhow::{bail, Result};
use sci_rs::signal::filter::design::Sos;
use sci_rs::signal::filter::sosfiltfilt_dyn;

/// Apply an SOS chain in zero-phase fashion. Output length equals input
/// length.
pub fn filtfilt(x: &[f64], sos: &[Sos<f64>]) -> Result<Vec<f64>> {
    if x.is_empty() {
        return Ok(vec![]);
    }
    // Forward-backward filtering needs enough samples to absorb the edge
    // transient of both passes.
    let min_len = 3 * 2 * sos.len() + 1;
    if x.len() <= min_len {
        bail!("signal too short for zero-phase filtering: {} samples", x.len());
    }
    Ok(sosfiltfilt_dyn(x.iter(), sos))
}
