//! Per-recording failure taxonomy.
//!
//! Fatal conditions abort one recording's pipeline and carry the stage they
//! were raised in; they never abort sibling recordings in a batch. Recoverable
//! conditions (skipped annotation rows, unresolved channel roles) are not
//! errors at all — they are counted in the run report.
use std::path::PathBuf;

/// Pipeline stage names, used to tag failures and drive the run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detect,
    Normalize,
    Reconstruct,
    Condition,
    Analyze,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Detect => "detect",
            Stage::Normalize => "normalize",
            Stage::Reconstruct => "reconstruct",
            Stage::Condition => "condition",
            Stage::Analyze => "analyze",
        };
        f.write_str(s)
    }
}

/// Fatal per-recording errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The container cannot be parsed at all (I/O failure or a fixed header
    /// that is not EDF).
    #[error("unreadable container {}: {}", .path.display(), .reason)]
    UnreadableContainer { path: PathBuf, reason: String },

    /// Raw dialect with no companion annotation sheet next to the recording.
    #[error("missing annotation source for {} (expected {})", .recording.display(), .expected.display())]
    MissingAnnotationSource {
        recording: PathBuf,
        expected: PathBuf,
    },

    /// The numeric layer could not decode the source signals during
    /// reconstruction. Fatal for the recording, not retried.
    #[error("unparseable source {}: {}", .path.display(), .reason)]
    UnparseableSource { path: PathBuf, reason: String },

    /// A computed physical range would truncate observed samples. The
    /// reconstructor derives ranges from actual extrema with margin, so this
    /// is unreachable by construction; it exists so the invariant is checked,
    /// not assumed.
    #[error("clipping risk on channel {label}: sample {sample} outside [{min}, {max}]")]
    ClippingRisk {
        label: String,
        sample: f64,
        min: f64,
        max: f64,
    },

    #[error("{stage} failed: {cause}")]
    Stage { stage: Stage, cause: anyhow::Error },
}

impl PipelineError {
    /// The stage a fatal error belongs to, for run reports.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::UnreadableContainer { .. } => Stage::Detect,
            PipelineError::MissingAnnotationSource { .. } => Stage::Normalize,
            PipelineError::UnparseableSource { .. } => Stage::Reconstruct,
            PipelineError::ClippingRisk { .. } => Stage::Reconstruct,
            PipelineError::Stage { stage, .. } => *stage,
        }
    }
}
