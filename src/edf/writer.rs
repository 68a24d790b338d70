//! Continuous EDF+C writer.
//!
//! Re-encodes a [`Recording`] as a continuous, randomly-seekable EDF+C file:
//! 1-second data records, 16-bit samples, one trailing `EDF Annotations`
//! signal carrying the per-record timekeeping TALs that EDF+ requires.
//!
//! The file is written to a sibling `.tmp` path and renamed onto the final
//! path only after every record has been flushed, so an interrupted run never
//! leaves a half-written container at the destination.
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::debug;

use super::header::{EdfHeader, SignalHeader, ANNOTATION_LABEL};
use crate::recording::Recording;

/// Bytes reserved per record for the timekeeping TAL signal.
const TAL_RECORD_BYTES: usize = 30;

/// Write `rec` as EDF+C at `path`.
///
/// Channel sample rates must be whole numbers of samples per 1-second record.
/// Channels shorter than the longest one are edge-padded with their final
/// sample so that every record is complete.
pub fn write_continuous(path: &Path, rec: &Recording, patient: &str) -> Result<()> {
    if rec.channels.is_empty() {
        bail!("refusing to write an EDF file with no channels");
    }
    for ch in &rec.channels {
        if (ch.sfreq.fract()).abs() > 1e-9 {
            bail!(
                "channel {:?} rate {} Hz is not a whole number of samples per record",
                ch.label,
                ch.sfreq
            );
        }
        if ch.physical_min >= ch.physical_max {
            bail!("channel {:?} has a degenerate physical range", ch.label);
        }
    }

    let n_records = rec.duration_secs().ceil() as i64;

    let mut signals: Vec<SignalHeader> = rec
        .channels
        .iter()
        .map(|ch| SignalHeader {
            label: ch.label.clone(),
            transducer: String::new(),
            dimension: ch.unit.clone(),
            physical_min: ch.physical_min,
            physical_max: ch.physical_max,
            digital_min: -32768,
            digital_max: 32767,
            prefilter: ch.prefilter.clone(),
            samples_per_record: ch.sfreq as usize,
        })
        .collect();
    signals.push(annotation_signal_header());

    let header = EdfHeader {
        patient: patient.to_string(),
        recording: format!(
            "Startdate {} X X X",
            rec.start.format("%d-%b-%Y").to_string().to_uppercase()
        ),
        start: rec.start,
        reserved: "EDF+C".into(),
        n_records,
        record_duration: 1.0,
        signals,
    };

    let tmp = tmp_path(path);
    write_records(&tmp, &header, rec, n_records)
        .with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("publish {} -> {}", tmp.display(), path.display()))?;
    debug!(
        "wrote {} records x {} signals -> {}",
        n_records,
        header.signals.len(),
        path.display()
    );
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".tmp");
    PathBuf::from(s)
}

fn annotation_signal_header() -> SignalHeader {
    SignalHeader {
        label: ANNOTATION_LABEL.into(),
        transducer: String::new(),
        dimension: String::new(),
        // Nominal ranges; the annotation signal is a byte stream, not samples.
        physical_min: -1.0,
        physical_max: 1.0,
        digital_min: -32768,
        digital_max: 32767,
        prefilter: String::new(),
        samples_per_record: TAL_RECORD_BYTES / 2,
    }
}

fn write_records(tmp: &Path, header: &EdfHeader, rec: &Recording, n_records: i64) -> Result<()> {
    let file = File::create(tmp)?;
    let mut w = BufWriter::new(file);
    w.write_all(&header.encode())?;

    for r in 0..n_records as usize {
        for (ch, sig) in rec.channels.iter().zip(&header.signals) {
            let spr = sig.samples_per_record;
            let start = r * spr;
            let mut buf = Vec::with_capacity(spr * 2);
            for i in start..start + spr {
                // Edge-pad channels that end before the final record.
                let v = match ch.samples.get(i) {
                    Some(&v) => v,
                    None => ch.samples.last().copied().unwrap_or(0.0),
                };
                buf.extend(sig.to_digital(v).to_le_bytes());
            }
            w.write_all(&buf)?;
        }
        w.write_all(&timekeeping_tal(r))?;
    }
    w.flush()?;
    Ok(())
}

/// The timekeeping TAL for record `r`: `+<r>\x14\x14\x00`, zero-padded to the
/// fixed record slot.
fn timekeeping_tal(record: usize) -> Vec<u8> {
    let mut tal = format!("+{record}").into_bytes();
    tal.push(0x14);
    tal.push(0x14);
    tal.push(0x00);
    tal.resize(TAL_RECORD_BYTES, 0x00);
    tal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edf::reader::EdfReader;
    use crate::recording::Channel;
    use chrono::NaiveDate;

    fn two_channel_recording() -> Recording {
        let start = NaiveDate::from_ymd_opt(2021, 10, 29)
            .unwrap()
            .and_hms_opt(22, 14, 3)
            .unwrap();
        let chin: Vec<f64> = (0..600)
            .map(|i| 80.0 * (2.0 * std::f64::consts::PI * 30.0 * i as f64 / 200.0).sin())
            .collect();
        Recording {
            start,
            channels: vec![
                Channel {
                    label: "EMG Chin".into(),
                    unit: "uV".into(),
                    sfreq: 200.0,
                    physical_min: -500.0,
                    physical_max: 500.0,
                    prefilter: String::new(),
                    samples: chin,
                },
                Channel {
                    label: "LAT".into(),
                    unit: "uV".into(),
                    sfreq: 100.0,
                    physical_min: -500.0,
                    physical_max: 500.0,
                    prefilter: String::new(),
                    samples: vec![7.5; 250], // 2.5 s, padded to 3 records
                },
            ],
        }
    }

    #[test]
    fn round_trip_preserves_samples_and_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.edf");
        let rec = two_channel_recording();
        write_continuous(&path, &rec, "X X X X").unwrap();

        let reader = EdfReader::open(&path).unwrap();
        assert_eq!(reader.header.reserved, "EDF+C");
        assert_eq!(reader.header.start, rec.start);
        assert_eq!(reader.header.n_records, 3);
        assert!(reader.header.annotation_signal().is_some());

        let back = reader.read_recording().unwrap();
        assert_eq!(back.channels.len(), 2);
        assert_eq!(back.channels[0].samples.len(), 600);
        let bit = 1000.0 / 65535.0;
        for (a, b) in rec.channels[0].samples.iter().zip(&back.channels[0].samples) {
            approx::assert_abs_diff_eq!(a, b, epsilon = bit);
        }
    }

    #[test]
    fn short_channel_is_edge_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.edf");
        write_continuous(&path, &two_channel_recording(), "X").unwrap();

        let back = EdfReader::open(&path).unwrap().read_recording().unwrap();
        let lat = &back.channels[1];
        assert_eq!(lat.samples.len(), 300);
        let bit = 1000.0 / 65535.0;
        approx::assert_abs_diff_eq!(lat.samples[299], 7.5, epsilon = bit);
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.edf");
        write_continuous(&path, &two_channel_recording(), "X").unwrap();
        assert!(path.exists());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn fractional_rate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.edf");
        let mut rec = two_channel_recording();
        rec.channels[0].sfreq = 199.5;
        assert!(write_continuous(&path, &rec, "X").is_err());
    }
}
