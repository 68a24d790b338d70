/// Shared helpers: synthetic signals and on-disk EDF fixtures.
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use psgprep::edf::{EdfHeader, SignalHeader};

#[allow(unused)]
pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 10, 29)
        .unwrap()
        .and_hms_opt(22, 14, 3)
        .unwrap()
}

#[allow(unused)]
pub fn tone(freq: f64, sfreq: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sfreq).sin())
        .collect()
}

/// drift(1 Hz) + EMG-band(30 Hz) + line noise(60 Hz), amplitudes 50/20/15 µV.
#[allow(unused)]
pub fn contaminated(sfreq: f64, secs: usize) -> Vec<f64> {
    use std::f64::consts::PI;
    (0..(sfreq as usize * secs))
        .map(|i| {
            let t = i as f64 / sfreq;
            50.0 * (2.0 * PI * 1.0 * t).sin()
                + 20.0 * (2.0 * PI * 30.0 * t).sin()
                + 15.0 * (2.0 * PI * 60.0 * t).sin()
        })
        .collect()
}

/// Write a plain (non-EDF+) file: no annotations signal, blank reserved
/// field, wide vendor-style physical range so the fixture itself never clips.
/// Channels are `(label, sfreq, samples)`; sample counts must fill whole
/// 1-second records.
#[allow(unused)]
pub fn write_raw_edf(path: &Path, start: NaiveDateTime, channels: &[(&str, f64, Vec<f64>)]) {
    let n_records = channels
        .iter()
        .map(|(_, sfreq, s)| (s.len() as f64 / sfreq).ceil() as i64)
        .max()
        .expect("at least one channel");

    let signals: Vec<SignalHeader> = channels
        .iter()
        .map(|(label, sfreq, _)| SignalHeader {
            label: (*label).to_string(),
            transducer: String::new(),
            dimension: "uV".into(),
            physical_min: -3200.0,
            physical_max: 3200.0,
            digital_min: -32768,
            digital_max: 32767,
            prefilter: String::new(),
            samples_per_record: *sfreq as usize,
        })
        .collect();

    let header = EdfHeader {
        patient: "X X X X".into(),
        recording: "X".into(),
        start,
        reserved: String::new(),
        n_records,
        record_duration: 1.0,
        signals,
    };

    let mut bytes = header.encode();
    for r in 0..n_records as usize {
        for ((_, _, samples), sig) in channels.iter().zip(&header.signals) {
            let spr = sig.samples_per_record;
            for i in r * spr..(r + 1) * spr {
                let v = samples.get(i).copied().unwrap_or(0.0);
                bytes.extend(sig.to_digital(v).to_le_bytes());
            }
        }
    }
    std::fs::write(path, bytes).unwrap();
}

/// The naive 99th-percentile range that the reconstructor deliberately does
/// NOT use; kept here so tests can demonstrate it clipping.
#[allow(unused)]
pub fn percentile_range(samples: &[f64], pct: f64) -> (f64, f64) {
    let mut abs: Vec<f64> = samples.iter().map(|v| v.abs()).collect();
    abs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((abs.len() as f64 * pct / 100.0) as usize).min(abs.len() - 1);
    (-abs[idx], abs[idx])
}
