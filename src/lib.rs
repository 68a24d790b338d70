//! # psgprep — PSG conditioning and format normalization for RBD analysis
//!
//! `psgprep` prepares polysomnography recordings (EDF biosignals plus
//! sleep-stage/arousal annotations) for a downstream REM-sleep-behavior-
//! disorder analysis tool, reconciling the container dialects, sample rates,
//! channel names, and physical-value ranges that differ between clinical
//! sites.
//!
//! ## Pipeline overview
//!
//! ```text
//! recording.edf
//!   │
//!   ├─ detect            dialect: EDF+C | EDF+D | raw + companion sheet
//!   ├─ annotate          embedded TALs or sheet rows → canonical events
//!   │                      (whole-second onsets, day-rollover handling)
//!   ├─ reconstruct       raw/discontinuous → continuous EDF+C
//!   │                      unit → µV, range = 2 × |extrema| (≥ ±500 µV EMG)
//!   ├─ condition         per role: Butterworth band-pass + line notch,
//!   │                      zero-phase (filtfilt), band-power report
//!   └─ analysis          conditioned EDF + 3 annotation files + role map
//!        │                  → per-channel baseline / artifact statistics
//!        └─→ RecordingReport
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use psgprep::{run_recording, BaselineAnalyzer, PipelineConfig};
//!
//! let cfg = PipelineConfig::default();
//! let analyzer = BaselineAnalyzer::new();
//! let report = run_recording(Path::new("data/PS0140_211029.edf"), &cfg, Some(&analyzer));
//! if report.succeeded() {
//!     println!("conditioned -> {:?}", report.conditioned_edf);
//! }
//! ```
//!
//! ## Running individual stages
//!
//! Each stage is also exposed directly:
//!
//! ```no_run
//! use std::path::Path;
//! use psgprep::{detect, EdfReader, PipelineConfig};
//! use psgprep::annotate::from_embedded;
//! use psgprep::condition::condition;
//!
//! let cfg = PipelineConfig::default();
//! let det = detect(Path::new("rec.edf"), &cfg.roles).unwrap();
//! let reader = EdfReader::open("rec.edf").unwrap();
//! let events = from_embedded(&reader.read_annotations().unwrap(), reader.header.start);
//! let (conditioned, report) = condition(reader.read_recording().unwrap(), &cfg).unwrap();
//! ```

pub mod align;
pub mod analysis;
pub mod annotate;
pub mod condition;
pub mod config;
pub mod detect;
pub mod edf;
pub mod error;
pub mod events;
pub mod filter;
pub mod pipeline;
pub mod reconstruct;
pub mod recording;
pub mod resample;

// ── Crate-root re-exports ─────────────────────────────────────────────────
//
// Everything a downstream user is likely to need is available directly as
// `psgprep::Foo` without having to know the internal module layout.

// config
pub use config::{ChannelRole, FilterSpec, PipelineConfig, RoleMap};

// model
pub use recording::{Channel, Recording};

// edf
pub use edf::{EdfHeader, EdfReader, SignalHeader, TalAnnotation, write_continuous};

// detect
pub use detect::{detect, DetectedFormat, Dialect};

// annotate / events
pub use annotate::NormalizedAnnotations;
pub use events::{EventInterval, EventKind};

// condition
pub use condition::{band_power, condition, BandPower, ConditionReport};

// reconstruct
pub use reconstruct::{physical_range, reconstruct};

// analysis
pub use analysis::{AnalysisStats, AtoniaAnalyzer, BaselineAnalyzer, PreparedRecording};

// pipeline
pub use pipeline::{edf_files_in, run_batch, run_recording, RecordingReport, RunOutcome};

// errors
pub use error::{PipelineError, Stage};
