//! Recording-dialect detection.
//!
//! Read-only inspection of an EDF file that decides which pipeline path a
//! recording takes. Three dialects are recognised:
//!
//! * `EdfPlusContinuous` — self-describing, annotations embedded, directly
//!   consumable downstream.
//! * `EdfPlusDiscontinuous` — self-describing but with internal time gaps;
//!   must be reconstructed into a continuous container first.
//! * `RawWithSheet` — a plain/non-compliant EDF whose annotations live in a
//!   companion spreadsheet export next to the recording; must be
//!   reconstructed and its annotations normalized from the sheet.
//!
//! An unreadable file is an error here; a readable but non-compliant file is
//! not — it is the raw dialect.
use std::path::{Path, PathBuf};

use log::info;

use crate::config::{ChannelRole, RoleMap};
use crate::edf::EdfReader;
use crate::error::PipelineError;

/// Structural dialect of a recording container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// EDF+C: continuous, self-describing.
    EdfPlusContinuous,
    /// EDF+D: self-describing with internal breaks.
    EdfPlusDiscontinuous,
    /// Standard/non-compliant EDF requiring an external annotation sheet.
    RawWithSheet,
}

impl Dialect {
    /// Whether the container must be rebuilt before conditioning.
    pub fn needs_reconstruction(&self) -> bool {
        !matches!(self, Dialect::EdfPlusContinuous)
    }

    /// Whether annotations come from inside the container.
    pub fn self_describing(&self) -> bool {
        !matches!(self, Dialect::RawWithSheet)
    }
}

/// Detection result: dialect plus the inventory downstream stages need.
#[derive(Debug, Clone)]
pub struct DetectedFormat {
    pub dialect: Dialect,
    /// All data-channel labels, in container order.
    pub channel_labels: Vec<String>,
    /// Channels that resolved to an EMG role, `(label, role)`.
    pub emg_channels: Vec<(String, ChannelRole)>,
    /// Whether the container carries an embedded annotations signal.
    pub has_embedded_annotations: bool,
    /// Companion sheet path for the raw dialect: present only if the file
    /// exists next to the recording.
    pub sheet_path: Option<PathBuf>,
    /// Where the sheet was looked for (reported on missing-source failures).
    pub expected_sheet_path: PathBuf,
}

/// Candidate companion-sheet paths for a recording, in probe order.
fn sheet_candidates(edf_path: &Path) -> Vec<PathBuf> {
    ["csv", "CSV", "tsv", "TSV"]
        .iter()
        .map(|ext| edf_path.with_extension(ext))
        .collect()
}

/// Inspect `path` and classify its dialect.
///
/// # Errors
/// [`PipelineError::UnreadableContainer`] when the file cannot be opened or
/// its fixed header is not EDF at all. A parseable file that merely lacks
/// physical-dimension metadata is classified `RawWithSheet`, not failed.
pub fn detect(path: &Path, roles: &RoleMap) -> Result<DetectedFormat, PipelineError> {
    let reader = EdfReader::open(path).map_err(|e| PipelineError::UnreadableContainer {
        path: path.to_path_buf(),
        reason: format!("{e:#}"),
    })?;
    let header = &reader.header;

    let has_embedded_annotations = header.annotation_signal().is_some();
    let dialect = if header.reserved.starts_with("EDF+D") {
        Dialect::EdfPlusDiscontinuous
    } else if header.reserved.starts_with("EDF+C")
        && has_embedded_annotations
        && header.has_physical_metadata()
    {
        Dialect::EdfPlusContinuous
    } else {
        Dialect::RawWithSheet
    };

    let channel_labels: Vec<String> = header
        .signals
        .iter()
        .filter(|s| !s.is_annotation())
        .map(|s| s.label.clone())
        .collect();

    let emg_channels: Vec<(String, ChannelRole)> = channel_labels
        .iter()
        .filter_map(|l| roles.resolve(l).map(|r| (l.clone(), r)))
        .collect();

    let candidates = sheet_candidates(path);
    let expected_sheet_path = candidates[0].clone();
    let sheet_path = candidates.into_iter().find(|p| p.exists());

    info!(
        "{}: dialect {:?}, {} channels, {} EMG, sheet {}",
        path.display(),
        dialect,
        channel_labels.len(),
        emg_channels.len(),
        sheet_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "absent".into()),
    );

    Ok(DetectedFormat {
        dialect,
        channel_labels,
        emg_channels,
        has_embedded_annotations,
        sheet_path,
        expected_sheet_path,
    })
}
