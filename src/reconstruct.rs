//! Container reconstruction: raw or discontinuous sources are re-derived as
//! standards-compliant continuous EDF+C with correct physical scaling.
//!
//! Steps per channel:
//! 1. Read the full raw sample sequence and convert biosignal channels to
//!    microvolts using a fixed scale keyed by the declared unit.
//! 2. Re-derive the physical range from the actual data extrema with a 100%
//!    margin — `physical_max = 2 × max(|min|, |max|)` — never from a
//!    percentile of the distribution. A percentile can legitimately exclude
//!    genuine large-amplitude bursts and silently clip them at encode time.
//! 3. Floor EMG-role ranges at a minimum clinical range so phasic bursts can
//!    never saturate regardless of how quiet the recording is.
//!
//! The rebuilt container keeps the original start timestamp and per-channel
//! rates and is published atomically by the writer.
use std::path::Path;

use log::info;

use crate::config::PipelineConfig;
use crate::detect::DetectedFormat;
use crate::edf::{write_continuous, EdfReader};
use crate::error::{PipelineError, Stage};
use crate::recording::{Channel, Recording};

/// Microvolts per one unit of the declared dimension. Unknown dimensions are
/// passed through unscaled.
pub fn unit_scale_to_uv(unit: &str) -> f64 {
    match unit.trim() {
        "V" => 1e6,
        "mV" => 1e3,
        _ => 1.0,
    }
}

/// Channels that carry bio-potentials and therefore get µV conversion:
/// anything role-mapped plus the generic electrophysiology labels.
fn is_biosignal(cfg: &PipelineConfig, label: &str) -> bool {
    let upper = label.to_uppercase();
    cfg.roles.is_emg(label)
        || upper.contains("EMG")
        || upper.contains("EEG")
        || upper.contains("EOG")
}

/// Physical range from actual extrema with 100% margin; EMG-role channels
/// are floored at `floor` so the declared range never narrows below the
/// minimum clinical span.
pub fn physical_range(samples: &[f64], emg_floor: Option<f64>) -> (f64, f64) {
    let abs_max = samples
        .iter()
        .fold(0.0_f64, |acc, &v| acc.max(v.abs()));
    let mut physical_max = abs_max * 2.0;
    if let Some(floor) = emg_floor {
        physical_max = physical_max.max(floor);
    }
    if physical_max == 0.0 {
        // All-zero channel: any non-degenerate symmetric range encodes it.
        physical_max = 1.0;
    }
    (-physical_max, physical_max)
}

/// Rebuild `det`'s container as continuous EDF+C at `out_path` and return the
/// rescaled in-memory recording for conditioning.
///
/// # Errors
/// [`PipelineError::UnparseableSource`] when the numeric layer cannot decode
/// the source signals; [`PipelineError::ClippingRisk`] if a derived range
/// would truncate an observed sample (unreachable by construction, verified
/// anyway).
pub fn reconstruct(
    reader: &EdfReader,
    det: &DetectedFormat,
    cfg: &PipelineConfig,
    out_path: &Path,
) -> Result<Recording, PipelineError> {
    let mut rec = reader
        .read_recording()
        .map_err(|e| PipelineError::UnparseableSource {
            path: reader.path().to_path_buf(),
            reason: format!("{e:#}"),
        })?;

    let mut converted = 0usize;
    for ch in &mut rec.channels {
        if is_biosignal(cfg, &ch.label) {
            let scale = unit_scale_to_uv(&ch.unit);
            if scale != 1.0 {
                for v in &mut ch.samples {
                    *v *= scale;
                }
                converted += 1;
            }
            ch.unit = "uV".into();
        }
        rescale_channel(ch, cfg)?;
    }

    info!(
        "reconstructed {:?}: {} channels ({} unit-converted) -> {}",
        det.dialect,
        rec.channels.len(),
        converted,
        out_path.display()
    );

    write_continuous(out_path, &rec, &reader.header.patient).map_err(|e| PipelineError::Stage {
        stage: Stage::Reconstruct,
        cause: e,
    })?;
    Ok(rec)
}

/// Re-derive one channel's declared range and verify the no-clipping
/// invariant.
fn rescale_channel(ch: &mut Channel, cfg: &PipelineConfig) -> Result<(), PipelineError> {
    let floor = cfg.roles.resolve(&ch.label).map(|_| cfg.emg_range_floor_uv);
    let (lo, hi) = physical_range(&ch.samples, floor);
    ch.physical_min = lo;
    ch.physical_max = hi;

    if let Some(&bad) = ch
        .samples
        .iter()
        .find(|&&v| v < ch.physical_min || v > ch.physical_max)
    {
        return Err(PipelineError::ClippingRisk {
            label: ch.label.clone(),
            sample: bad,
            min: ch.physical_min,
            max: ch.physical_max,
        });
    }
    Ok(())
}
