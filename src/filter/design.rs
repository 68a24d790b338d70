//! IIR filter design for the EMG conditioning chain.
//!
//! The band-pass stage is a Butterworth design in second-order sections; the
//! notch is the classic two-pole design (`iirnotch`): for center `w0` and
//! bandwidth `bw = w0/Q`,
//! ```text
//! gain = 1 / (1 + tan(bw/2))
//! b = gain · [1, −2·cos(w0), 1]
//! a = [1, −2·gain·cos(w0), 2·gain − 1]
//! ```
//! All stages are returned as SOS chains so application is uniform.
use anyhow::{bail, Result};
use sci_rs::signal::filter::design::{
    butter_dyn, DigitalFilter, FilterBandType, FilterOutputType, Sos, SosFormatFilter,
};

/// Fraction of Nyquist the low-pass cutoff may not exceed.
const NYQUIST_MARGIN: f64 = 0.95;

/// Clamp a low-pass cutoff below the Nyquist limit of `sfreq`.
///
/// A 100 Hz cutoff at a 200 Hz channel would sit exactly on Nyquist and the
/// design would be invalid; it is pulled down to 95 Hz instead.
pub fn clamp_lowpass(lowpass_hz: f64, sfreq: f64) -> f64 {
    let max_hz = sfreq / 2.0 * NYQUIST_MARGIN;
    lowpass_hz.min(max_hz)
}

/// Design a Butterworth band-pass of the given order as an SOS chain.
pub fn butter_bandpass(order: usize, low_hz: f64, high_hz: f64, sfreq: f64) -> Result<Vec<Sos<f64>>> {
    let high_hz = clamp_lowpass(high_hz, sfreq);
    if !(0.0 < low_hz && low_hz < high_hz) {
        bail!("invalid band {low_hz}-{high_hz} Hz at {sfreq} Hz");
    }
    let filter = butter_dyn(
        order,
        [low_hz, high_hz].to_vec(),
        Some(FilterBandType::Bandpass),
        Some(false),
        Some(FilterOutputType::Sos),
        Some(sfreq),
    );
    let DigitalFilter::Sos(SosFormatFilter { sos }) = filter else {
        bail!("band-pass design did not return second-order sections");
    };
    Ok(sos)
}

/// Design a notch at `f0_hz` with quality factor `q` as a single SOS.
pub fn design_notch(f0_hz: f64, q: f64, sfreq: f64) -> Result<Vec<Sos<f64>>> {
    if !(0.0 < f0_hz && f0_hz < sfreq / 2.0) {
        bail!("notch frequency {f0_hz} Hz outside (0, Nyquist) at {sfreq} Hz");
    }
    let w0 = std::f64::consts::PI * 2.0 * f0_hz / sfreq;
    let bw = w0 / q;
    let beta = (bw / 2.0).tan();
    let gain = 1.0 / (1.0 + beta);

    let b = [gain, -2.0 * gain * w0.cos(), gain];
    let a = [1.0, -2.0 * gain * w0.cos(), 2.0 * gain - 1.0];
    Ok(vec![Sos::new(b, a)])
}
