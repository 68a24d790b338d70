//! Annotation normalization.
//!
//! Two input variants, one output schema:
//!
//! * Variant A — embedded EDF+ TAL records, classified by label text.
//! * Variant B — companion sheet rows `epoch<sep>time-of-day<sep>description`
//!   where the description encodes category and duration:
//!   `"<Category> - Dur: <seconds> sec. - <Subtype>"` or
//!   `"Stage - <StageCode>"`.
//!
//! Every onset is truncated to whole-second granularity before it enters the
//! canonical schema: the downstream tool resamples per-sample event-presence
//! signals into fixed-width windows, and sub-second onsets combined with a
//! window grid that is not anchored on the recording start make every window
//! miss every sample (see [`crate::align`] for the anchored grid).
use std::path::Path;

use anyhow::Result;
use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use log::{info, warn};

use crate::edf::TalAnnotation;
use crate::error::PipelineError;
use crate::events::{
    normalize_stage, write_arousals, write_flow_events, write_sleep_profile, AnnotationFiles,
    EventInterval, EventKind,
};

/// Canonical annotations for one recording.
#[derive(Debug, Clone)]
pub struct NormalizedAnnotations {
    /// Start instant written into the canonical files. For self-describing
    /// sources this is the first sleep-stage onset (the analysis tool trims
    /// the signal to the staged span); otherwise the recording start.
    /// Always whole-second.
    pub effective_start: NaiveDateTime,
    pub stages: Vec<EventInterval>,
    pub arousals: Vec<EventInterval>,
    pub respiratory: Vec<EventInterval>,
    /// Rows whose description matched no known pattern. Recoverable.
    pub skipped_rows: usize,
}

impl NormalizedAnnotations {
    /// Enforce the interval invariants against the recording span:
    /// events starting at or after the end are dropped (counted as skipped),
    /// durations running past the end are truncated, and a timestamp maps to
    /// at most one sleep stage (first wins).
    pub fn clamp_to(&mut self, start: NaiveDateTime, total_secs: f64) {
        let end = start + Duration::microseconds((total_secs * 1e6).round() as i64);
        for list in [&mut self.stages, &mut self.arousals, &mut self.respiratory] {
            let before = list.len();
            list.retain(|ev| ev.onset < end);
            self.skipped_rows += before - list.len();
            for ev in list.iter_mut() {
                if ev.end() > end {
                    ev.duration_secs = (end - ev.onset).num_microseconds().unwrap_or(0) as f64 / 1e6;
                }
            }
        }
        let mut seen_last: Option<NaiveDateTime> = None;
        self.stages.retain(|ev| {
            let dup = seen_last == Some(ev.onset);
            if dup {
                warn!("dropping duplicate sleep stage at {}", ev.onset);
            } else {
                seen_last = Some(ev.onset);
            }
            !dup
        });
    }

    /// Write the three canonical files next to the recording.
    pub fn write_files(&self, dir: &Path, base: &str) -> Result<AnnotationFiles> {
        Ok(AnnotationFiles {
            sleep_profile: write_sleep_profile(dir, base, self.effective_start, &self.stages)?,
            arousals: write_arousals(dir, base, self.effective_start, &self.arousals)?,
            flow_events: write_flow_events(dir, base, self.effective_start, &self.respiratory)?,
        })
    }
}

/// Truncate to whole seconds.
fn whole_second(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_nanosecond(0).expect("zero nanoseconds is valid")
}

// ── Variant A: embedded TALs ─────────────────────────────────────────────

/// Normalize embedded EDF+ annotations.
pub fn from_embedded(tals: &[TalAnnotation], start: NaiveDateTime) -> NormalizedAnnotations {
    let mut out = NormalizedAnnotations {
        effective_start: whole_second(start),
        stages: Vec::new(),
        arousals: Vec::new(),
        respiratory: Vec::new(),
        skipped_rows: 0,
    };

    for tal in tals {
        let onset = whole_second(start + Duration::microseconds((tal.onset_secs * 1e6).round() as i64));
        let text = tal.text.as_str();

        if let Some(code) = text.strip_prefix("Sleep stage ") {
            if let Some(label) = normalize_stage(code) {
                out.stages.push(EventInterval {
                    onset,
                    duration_secs: 0.0,
                    kind: EventKind::SleepStage,
                    label,
                });
            }
        } else if text.to_lowercase().contains("arousal") {
            out.arousals.push(EventInterval {
                onset,
                duration_secs: tal.duration_secs,
                kind: EventKind::Arousal,
                label: text.to_string(),
            });
        } else if let Some(label) = respiratory_label(text) {
            out.respiratory.push(EventInterval {
                onset,
                duration_secs: tal.duration_secs,
                kind: EventKind::Respiratory,
                label,
            });
        } else {
            out.skipped_rows += 1;
        }
    }

    if let Some(first) = out.stages.first() {
        out.effective_start = first.onset;
    }
    info!(
        "embedded annotations: {} stages, {} arousals, {} respiratory, {} unrecognized",
        out.stages.len(),
        out.arousals.len(),
        out.respiratory.len(),
        out.skipped_rows
    );
    out
}

// ── Variant B: companion sheet ───────────────────────────────────────────

/// Normalize a companion annotation sheet.
///
/// # Errors
/// [`PipelineError::MissingAnnotationSource`] when the sheet file is absent.
pub fn from_sheet(
    sheet: Option<&Path>,
    expected: &Path,
    recording_path: &Path,
    start: NaiveDateTime,
) -> Result<NormalizedAnnotations, PipelineError> {
    let Some(sheet) = sheet.filter(|p| p.exists()) else {
        return Err(PipelineError::MissingAnnotationSource {
            recording: recording_path.to_path_buf(),
            expected: expected.to_path_buf(),
        });
    };
    let text = std::fs::read_to_string(sheet).map_err(|e| PipelineError::Stage {
        stage: crate::error::Stage::Normalize,
        cause: anyhow::Error::new(e).context(format!("read {}", sheet.display())),
    })?;
    Ok(from_sheet_text(&text, start))
}

/// Sheet normalization on already-loaded text (exposed for tests).
pub fn from_sheet_text(text: &str, start: NaiveDateTime) -> NormalizedAnnotations {
    let mut out = NormalizedAnnotations {
        effective_start: whole_second(start),
        stages: Vec::new(),
        arousals: Vec::new(),
        respiratory: Vec::new(),
        skipped_rows: 0,
    };

    // Row times carry no date; reconstruct it from the recording start and
    // advance a day whenever the time-of-day runs backwards.
    let mut day_offset: i64 = 0;
    let mut prev_time: Option<NaiveTime> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((time, description)) = split_row(line) else {
            out.skipped_rows += 1;
            continue;
        };
        if let Some(prev) = prev_time {
            if time < prev {
                day_offset += 1;
            }
        }
        prev_time = Some(time);

        let onset = whole_second(
            start.date().and_time(time) + Duration::days(day_offset),
        );

        match classify_description(description) {
            Some((EventKind::SleepStage, _, label)) => out.stages.push(EventInterval {
                onset,
                duration_secs: 0.0,
                kind: EventKind::SleepStage,
                label,
            }),
            Some((kind @ EventKind::Arousal, dur, label))
            | Some((kind @ EventKind::Respiratory, dur, label)) => {
                let list = if kind == EventKind::Arousal {
                    &mut out.arousals
                } else {
                    &mut out.respiratory
                };
                list.push(EventInterval {
                    onset,
                    duration_secs: dur,
                    kind,
                    label,
                });
            }
            None => out.skipped_rows += 1,
        }
    }

    info!(
        "sheet annotations: {} stages, {} arousals, {} respiratory, {} unrecognized",
        out.stages.len(),
        out.arousals.len(),
        out.respiratory.len(),
        out.skipped_rows
    );
    out
}

/// Split one sheet row into `(time_of_day, description)`.
///
/// Rows are `epoch<sep>time<sep>description` with `;`, `\t` or `,` as the
/// separator; only the first two separators split, so free text may contain
/// the separator character.
fn split_row(line: &str) -> Option<(NaiveTime, &str)> {
    let sep = [';', '\t', ',']
        .into_iter()
        .find(|&s| line.contains(s))?;
    let mut parts = line.splitn(3, sep);
    let epoch = parts.next()?.trim();
    let time = parts.next()?.trim();
    let description = parts.next()?.trim();
    // The first column must be an epoch index; this also rejects header rows.
    epoch.parse::<u64>().ok()?;
    Some((parse_time_of_day(time)?, description))
}

/// Parse `HH:MM:SS[.cc]` (centisecond fraction optional).
fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let (hms, frac) = match s.split_once('.') {
        Some((hms, frac)) => (hms, frac),
        None => (s, ""),
    };
    let mut it = hms.split(':');
    let h: u32 = it.next()?.trim().parse().ok()?;
    let m: u32 = it.next()?.trim().parse().ok()?;
    let sec: u32 = it.next()?.trim().parse().ok()?;
    if it.next().is_some() {
        return None;
    }
    let centis: u32 = if frac.is_empty() {
        0
    } else {
        // Two-digit centiseconds; longer fractions are truncated.
        frac.chars()
            .take(2)
            .collect::<String>()
            .parse()
            .ok()?
    };
    NaiveTime::from_hms_micro_opt(h, m, sec, centis * 10_000)
}

/// Classify a free-text description into `(kind, duration, label)`.
///
/// Grammar inferred from site exports; anything else is the recoverable
/// unrecognized-text condition (`None`).
fn classify_description(text: &str) -> Option<(EventKind, f64, String)> {
    if let Some(code) = text.strip_prefix("Stage -") {
        let label = normalize_stage(code)?;
        return Some((EventKind::SleepStage, 0.0, label));
    }
    let lower = text.to_lowercase();
    if lower.contains("arousal") {
        let dur = parse_duration(text).unwrap_or(0.0);
        return Some((EventKind::Arousal, dur, subtype(text, "Arousal")));
    }
    if lower.contains("respiratory event") || lower.contains("desaturation") {
        let dur = parse_duration(text).unwrap_or(0.0);
        let label = respiratory_label(text).unwrap_or_else(|| "Flow Event".into());
        return Some((EventKind::Respiratory, dur, label));
    }
    None
}

/// Extract `Dur: <seconds> sec.` from a description.
fn parse_duration(text: &str) -> Option<f64> {
    let after = text.split("Dur:").nth(1)?;
    let secs = after.split("sec.").next()?.trim();
    secs.parse().ok()
}

/// Last ` - `-separated segment when the description has at least three,
/// otherwise the category default.
fn subtype(text: &str, default: &str) -> String {
    let parts: Vec<&str> = text.split(" - ").collect();
    if parts.len() >= 3 {
        parts[parts.len() - 1].trim().to_string()
    } else {
        default.to_string()
    }
}

/// Canonical respiratory-event label, `None` when the text is not
/// respiratory at all.
fn respiratory_label(text: &str) -> Option<String> {
    if text.contains("Hyp") {
        Some("Hypopnea".into())
    } else if text.contains("Apnea") {
        Some("Apnea".into())
    } else if text.contains("Desat") {
        Some("Desaturation".into())
    } else {
        None
    }
}
