//! Pipeline orchestration.
//!
//! Per recording the state machine is
//! `Detected → Normalizing / Reconstructing → Conditioned → ReadyForAnalysis`
//! with `Failed { stage, reason }` as the other terminal state. Normalizing
//! and Reconstructing read independent inputs (annotation source vs. signal
//! container) and could run concurrently; recordings are small enough that
//! they run back to back here. The conditioner always consumes the
//! reconstructed container when reconstruction ran, never the raw one.
//!
//! Recordings in a batch are independent: a failed recording is reported and
//! skipped, sibling recordings continue.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, info};
use serde::Serialize;

use crate::analysis::{AnalysisStats, AtoniaAnalyzer, PreparedRecording};
use crate::annotate::{self, NormalizedAnnotations};
use crate::condition::condition;
use crate::config::PipelineConfig;
use crate::detect::{detect, DetectedFormat};
use crate::edf::{write_continuous, EdfReader};
use crate::error::{PipelineError, Stage};
use crate::reconstruct::reconstruct;

/// Processing state of one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Detected,
    Normalizing,
    Reconstructing,
    Conditioned,
    ReadyForAnalysis,
}

/// Terminal result for one recording.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failed { stage: String, reason: String },
}

/// Structured per-recording report.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingReport {
    pub input: PathBuf,
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub dialect: Option<String>,
    /// Annotation rows skipped as unrecognized or out of bounds.
    pub skipped_rows: usize,
    /// Channels passed through unfiltered for lack of a role mapping.
    pub unresolved_roles: usize,
    pub conditioned_edf: Option<PathBuf>,
    pub sleep_profile: Option<PathBuf>,
    pub arousal_file: Option<PathBuf>,
    pub flow_event_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisStats>,
}

impl RecordingReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RunOutcome::Success)
    }
}

/// Run the full pipeline on one recording. Never panics or propagates; the
/// outcome (including failures with their stage) lands in the report.
pub fn run_recording(
    path: &Path,
    cfg: &PipelineConfig,
    analyzer: Option<&dyn AtoniaAnalyzer>,
) -> RecordingReport {
    match process(path, cfg, analyzer) {
        Ok(report) => report,
        Err(err) => {
            error!("{}: {} failed: {err}", path.display(), err.stage());
            RecordingReport {
                input: path.to_path_buf(),
                outcome: RunOutcome::Failed {
                    stage: err.stage().to_string(),
                    reason: format!("{err:#}"),
                },
                dialect: None,
                skipped_rows: 0,
                unresolved_roles: 0,
                conditioned_edf: None,
                sleep_profile: None,
                arousal_file: None,
                flow_event_file: None,
                analysis: None,
            }
        }
    }
}

fn process(
    path: &Path,
    cfg: &PipelineConfig,
    analyzer: Option<&dyn AtoniaAnalyzer>,
) -> Result<RecordingReport, PipelineError> {
    // ── Detected ──────────────────────────────────────────────────────────
    let det = detect(path, &cfg.roles)?;
    let reader = EdfReader::open(path).map_err(|e| PipelineError::UnreadableContainer {
        path: path.to_path_buf(),
        reason: format!("{e:#}"),
    })?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".into());

    // ── Normalizing ───────────────────────────────────────────────────────
    let mut events = normalize(&reader, &det, path)?;

    // ── Reconstructing (when the dialect needs it) ────────────────────────
    let rec = if det.dialect.needs_reconstruction() || cfg.force_reconstruct {
        let out = dir.join(format!("{base}_edfplus.edf"));
        reconstruct(&reader, &det, cfg, &out)?
    } else {
        reader.read_recording().map_err(|e| PipelineError::Stage {
            stage: Stage::Reconstruct,
            cause: e,
        })?
    };
    events.clamp_to(rec.start, rec.duration_secs());

    // ── Conditioned ───────────────────────────────────────────────────────
    let (rec, cond_report) = condition(rec, cfg).map_err(|e| PipelineError::Stage {
        stage: Stage::Condition,
        cause: e,
    })?;

    let conditioned_edf = dir.join(format!("{base}_preprocessed.edf"));
    write_continuous(&conditioned_edf, &rec, &reader.header.patient).map_err(|e| {
        PipelineError::Stage {
            stage: Stage::Condition,
            cause: e,
        }
    })?;
    write_condition_report(dir, &base, &cond_report).map_err(|e| PipelineError::Stage {
        stage: Stage::Condition,
        cause: e,
    })?;

    let files = events
        .write_files(dir, &base)
        .map_err(|e| PipelineError::Stage {
            stage: Stage::Normalize,
            cause: e,
        })?;

    // ── ReadyForAnalysis ──────────────────────────────────────────────────
    let prepared = PreparedRecording {
        edf_path: conditioned_edf.clone(),
        annotations: files.clone(),
        recording: rec,
        events: events.clone(),
        emg_channels: det.emg_channels.clone(),
    };
    let analysis = match analyzer {
        Some(a) => Some(a.analyze(&prepared, cfg).map_err(|e| PipelineError::Stage {
            stage: Stage::Analyze,
            cause: e,
        })?),
        None => None,
    };

    info!(
        "{}: {:?} complete ({:?}), {} skipped rows, {} unresolved roles",
        path.display(),
        det.dialect,
        PipelineState::ReadyForAnalysis,
        events.skipped_rows,
        cond_report.unresolved_roles
    );

    Ok(RecordingReport {
        input: path.to_path_buf(),
        outcome: RunOutcome::Success,
        dialect: Some(format!("{:?}", det.dialect)),
        skipped_rows: events.skipped_rows,
        unresolved_roles: cond_report.unresolved_roles,
        conditioned_edf: Some(conditioned_edf),
        sleep_profile: Some(files.sleep_profile),
        arousal_file: Some(files.arousals),
        flow_event_file: Some(files.flow_events),
        analysis,
    })
}

/// Dispatch to the annotation variant the dialect requires.
fn normalize(
    reader: &EdfReader,
    det: &DetectedFormat,
    path: &Path,
) -> Result<NormalizedAnnotations, PipelineError> {
    if det.dialect.self_describing() {
        let tals = reader.read_annotations().map_err(|e| PipelineError::Stage {
            stage: Stage::Normalize,
            cause: e,
        })?;
        Ok(annotate::from_embedded(&tals, reader.header.start))
    } else {
        annotate::from_sheet(
            det.sheet_path.as_deref(),
            &det.expected_sheet_path,
            path,
            reader.header.start,
        )
    }
}

fn write_condition_report(
    dir: &Path,
    base: &str,
    report: &crate::condition::ConditionReport,
) -> Result<()> {
    let path = dir.join(format!("{base}_conditioning_report.json"));
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// All EDF files directly inside `dir`, sorted for stable batch order.
pub fn edf_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        if ext.as_deref() == Some("edf") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Process a batch of recordings; failures never abort siblings.
pub fn run_batch(
    paths: &[PathBuf],
    cfg: &PipelineConfig,
    analyzer: Option<&dyn AtoniaAnalyzer>,
) -> Vec<RecordingReport> {
    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        reports.push(run_recording(path, cfg, analyzer));
    }
    let ok = reports.iter().filter(|r| r.succeeded()).count();
    info!("batch complete: {ok}/{} succeeded", reports.len());
    reports
}
