//! Canonical event-interval schema and the three annotation text files the
//! analysis tool consumes.
//!
//! File schema (one category per file):
//! ```text
//! Start Time: <DD.MM.YYYY HH:MM:SS>
//! Unit: s                  (interval categories only)
//! Signal Type: Impuls      (interval categories only)
//!
//! <HH:MM:SS,ffffff>[-<HH:MM:SS,ffffff>]; <duration>; <label>
//! ```
//! Sleep-stage entries carry no duration column; their epochs are fixed
//! width by convention.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime, Timelike};

/// Event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SleepStage,
    Arousal,
    Respiratory,
}

/// One normalized event, anchored to absolute time.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInterval {
    pub onset: NaiveDateTime,
    /// Seconds; `0.0` for instantaneous markers and sleep-stage onsets.
    pub duration_secs: f64,
    pub kind: EventKind,
    /// Normalized label: stage code (`W`, `N1`…`N3`, `REM`) or event subtype.
    pub label: String,
}

impl EventInterval {
    /// End instant of the interval.
    pub fn end(&self) -> NaiveDateTime {
        self.onset + Duration::microseconds((self.duration_secs * 1e6).round() as i64)
    }
}

/// Normalize a raw stage code to the canonical set.
///
/// `R` becomes `REM`; `No Stage`/`NoStage` entries are dropped (`None`).
pub fn normalize_stage(raw: &str) -> Option<String> {
    let s = raw.trim();
    match s {
        "" | "No Stage" | "NoStage" => None,
        "R" | "REM" => Some("REM".into()),
        other => Some(other.to_string()),
    }
}

/// The three canonical files for one recording.
#[derive(Debug, Clone)]
pub struct AnnotationFiles {
    pub sleep_profile: PathBuf,
    pub arousals: PathBuf,
    pub flow_events: PathBuf,
}

/// `HH:MM:SS,ffffff` with microsecond precision.
fn fmt_time(dt: NaiveDateTime) -> String {
    format!("{},{:06}", dt.format("%H:%M:%S"), dt.time().nanosecond() / 1000)
}

fn fmt_start(dt: NaiveDateTime) -> String {
    dt.format("%d.%m.%Y %H:%M:%S").to_string()
}

/// Write the sleep-profile file: one stage onset per line, no duration.
pub fn write_sleep_profile(
    dir: &Path,
    base: &str,
    start: NaiveDateTime,
    stages: &[EventInterval],
) -> Result<PathBuf> {
    let path = dir.join(format!("{base} Sleep profile.txt"));
    let mut w = writer(&path)?;
    writeln!(w, "Start Time: {}", fmt_start(start))?;
    writeln!(w, "Version: 1.0")?;
    writeln!(w)?;
    for ev in stages {
        writeln!(w, "{}; {}", fmt_time(ev.onset), ev.label)?;
    }
    w.flush()?;
    Ok(path)
}

/// Write an interval-category file (arousals or respiratory events).
fn write_intervals(
    path: PathBuf,
    signal_id: &str,
    start: NaiveDateTime,
    events: &[EventInterval],
) -> Result<PathBuf> {
    let mut w = writer(&path)?;
    writeln!(w, "Signal ID: {signal_id}")?;
    writeln!(w, "Start Time: {}", fmt_start(start))?;
    writeln!(w, "Unit: s")?;
    writeln!(w, "Signal Type: Impuls")?;
    writeln!(w)?;
    for ev in events {
        writeln!(
            w,
            "{}-{}; {:.2}; {}",
            fmt_time(ev.onset),
            fmt_time(ev.end()),
            ev.duration_secs,
            ev.label
        )?;
    }
    w.flush()?;
    Ok(path)
}

pub fn write_arousals(
    dir: &Path,
    base: &str,
    start: NaiveDateTime,
    events: &[EventInterval],
) -> Result<PathBuf> {
    write_intervals(
        dir.join(format!("{base} Classification Arousals.txt")),
        "Arousals",
        start,
        events,
    )
}

pub fn write_flow_events(
    dir: &Path,
    base: &str,
    start: NaiveDateTime,
    events: &[EventInterval],
) -> Result<PathBuf> {
    write_intervals(
        dir.join(format!("{base} Flow Events.txt")),
        "FlowEvents",
        start,
        events,
    )
}

fn writer(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path).with_context(|| {
        format!("create {}", path.display())
    })?))
}
