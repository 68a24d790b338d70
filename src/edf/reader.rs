//! EDF file reader.
//!
//! # Algorithm
//! 1. Read and parse the fixed 256-byte header.
//! 2. Read the field-major signal header area.
//! 3. On demand, walk the data records to extract one signal's samples
//!    (2-byte little-endian digital values, scaled to physical units), or the
//!    TAL byte stream of the `EDF Annotations` signal.
//!
//! Signals of a non-compliant file with a degenerate physical range are
//! returned as raw digital values; the reconstructor re-derives their scaling.
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use super::header::{parse_fixed, parse_signals, EdfHeader, HEADER_BLOCK};
use crate::recording::{Channel, Recording};

// ── TAL annotations ───────────────────────────────────────────────────────

/// One annotation from the EDF+ timestamped annotation lists.
#[derive(Debug, Clone, PartialEq)]
pub struct TalAnnotation {
    /// Onset relative to the recording start, seconds.
    pub onset_secs: f64,
    /// Duration in seconds; `0.0` when the TAL carries none.
    pub duration_secs: f64,
    pub text: String,
}

// ── Reader ────────────────────────────────────────────────────────────────

/// An opened EDF file: parsed header plus the path for on-demand data reads.
#[derive(Debug, Clone)]
pub struct EdfReader {
    pub header: EdfHeader,
    path: PathBuf,
}

impl EdfReader {
    /// Open an EDF file and parse its header. Does not read sample data.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let mut fixed = [0u8; HEADER_BLOCK];
        reader.read_exact(&mut fixed).context("read fixed EDF header")?;
        let (mut header, n_signals) = parse_fixed(&fixed)?;

        let mut area = vec![0u8; n_signals * HEADER_BLOCK];
        reader.read_exact(&mut area).context("read signal headers")?;
        header.signals = parse_signals(&area, n_signals)?;

        Ok(EdfReader {
            header,
            path: path.to_path_buf(),
        })
    }

    /// The file this reader was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all stored digital samples of signal `idx`.
    pub fn read_digital(&self, idx: usize) -> Result<Vec<i16>> {
        if idx >= self.header.signals.len() {
            bail!("signal index {idx} out of range");
        }
        let spr = self.header.signals[idx].samples_per_record;
        let record_bytes = self.header.record_bytes();
        let sig_offset = self.header.signal_offset(idx);
        let n_records = self.header.n_records.max(0) as usize;

        let file = File::open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let mut reader = BufReader::new(file);

        let mut out = Vec::with_capacity(n_records * spr);
        let mut buf = vec![0u8; spr * 2];
        for r in 0..n_records {
            let pos = self.header.header_bytes() + r * record_bytes + sig_offset;
            reader
                .seek(SeekFrom::Start(pos as u64))
                .with_context(|| format!("seek to record {r}"))?;
            reader
                .read_exact(&mut buf)
                .with_context(|| format!("read record {r} of signal {idx}"))?;
            out.extend(
                buf.chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]])),
            );
        }
        Ok(out)
    }

    /// Read signal `idx` in physical units.
    ///
    /// A signal whose declared physical range is degenerate (min ≥ max, seen
    /// on non-compliant exports) is returned as raw digital values cast to
    /// `f64`, leaving unit recovery to the caller.
    pub fn read_signal(&self, idx: usize) -> Result<Vec<f64>> {
        let digital = self.read_digital(idx)?;
        let s = &self.header.signals[idx];
        if s.physical_min >= s.physical_max || s.digital_min >= s.digital_max {
            return Ok(digital.into_iter().map(|d| d as f64).collect());
        }
        Ok(digital.into_iter().map(|d| s.to_physical(d)).collect())
    }

    /// Read every data signal into a [`Recording`]. The annotations signal,
    /// if present, is skipped — use [`EdfReader::read_annotations`] for it.
    pub fn read_recording(&self) -> Result<Recording> {
        let mut channels = Vec::new();
        for (idx, s) in self.header.signals.iter().enumerate() {
            if s.is_annotation() {
                continue;
            }
            channels.push(Channel {
                label: s.label.clone(),
                unit: s.dimension.clone(),
                sfreq: self.header.sfreq(idx),
                physical_min: s.physical_min,
                physical_max: s.physical_max,
                prefilter: s.prefilter.clone(),
                samples: self.read_signal(idx)?,
            });
        }
        Ok(Recording {
            start: self.header.start,
            channels,
        })
    }

    /// Parse all TALs of the `EDF Annotations` signal.
    ///
    /// Returns an empty list when the file has no annotations signal.
    /// Record-keeping TALs (empty text) are dropped.
    pub fn read_annotations(&self) -> Result<Vec<TalAnnotation>> {
        let Some(idx) = self.header.annotation_signal() else {
            return Ok(Vec::new());
        };
        let digital = self.read_digital(idx)?;
        // The annotation signal is a byte stream stored as 2-byte samples.
        let bytes: Vec<u8> = digital
            .iter()
            .flat_map(|d| d.to_le_bytes())
            .collect();
        parse_tal_stream(&bytes)
    }
}

/// Parse a concatenated TAL byte stream.
///
/// Each TAL: `±onset[\x15duration]\x14text\x14…\x14\x00`. The timestamp TAL
/// that opens each record carries no text and is skipped.
pub fn parse_tal_stream(bytes: &[u8]) -> Result<Vec<TalAnnotation>> {
    let mut out = Vec::new();
    for tal in bytes.split(|&b| b == 0x00) {
        if tal.is_empty() {
            continue;
        }
        let mut fields = tal.split(|&b| b == 0x14);
        let Some(time_field) = fields.next() else {
            continue;
        };
        let time_str = String::from_utf8_lossy(time_field);
        let mut parts = time_str.splitn(2, '\u{15}');
        let onset_str = parts.next().unwrap_or_default().trim();
        if onset_str.is_empty() {
            continue;
        }
        let onset_secs: f64 = onset_str
            .parse()
            .with_context(|| format!("malformed TAL onset {onset_str:?}"))?;
        let duration_secs: f64 = match parts.next() {
            Some(d) if !d.trim().is_empty() => d
                .trim()
                .parse()
                .with_context(|| format!("malformed TAL duration {d:?}"))?,
            _ => 0.0,
        };
        for text_field in fields {
            let text = String::from_utf8_lossy(text_field).trim().to_string();
            if text.is_empty() {
                continue;
            }
            out.push(TalAnnotation {
                onset_secs,
                duration_secs,
                text,
            });
        }
    }
    Ok(out)
}
