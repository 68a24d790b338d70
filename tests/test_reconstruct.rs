mod common;
use common::{percentile_range, start, tone, write_raw_edf};

use psgprep::{detect, physical_range, reconstruct, Dialect, EdfReader, PipelineConfig};

/// Mostly-quiet chin EMG with rare large bursts: the distribution that broke
/// percentile-based range computation in production.
fn bursty_chin(sfreq: f64, secs: usize) -> Vec<f64> {
    let n = sfreq as usize * secs;
    let mut samples: Vec<f64> = tone(30.0, sfreq, n).iter().map(|v| v * 5.0).collect();
    // A handful of phasic bursts up to ±40 µV.
    for (k, i) in (0..n).step_by(n / 8).enumerate() {
        samples[i] = if k % 2 == 0 { -40.0 } else { 40.0 };
    }
    samples
}

#[test]
fn no_clipping_regardless_of_bursts() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("rec.edf");
    let samples = bursty_chin(200.0, 120);
    write_raw_edf(&input, start(), &[("EMG Chin", 200.0, samples)]);

    let cfg = PipelineConfig::default();
    let det = detect(&input, &cfg.roles).unwrap();
    assert_eq!(det.dialect, Dialect::RawWithSheet);

    let reader = EdfReader::open(&input).unwrap();
    let out = dir.path().join("rec_edfplus.edf");
    let rec = reconstruct(&reader, &det, &cfg, &out).unwrap();

    let ch = &rec.channels[0];
    assert!(ch.range_holds(), "sample outside declared range");
    assert!(ch.physical_max >= cfg.emg_range_floor_uv);
    // Burst samples survived reconstruction.
    assert!(ch.samples.iter().any(|&v| v <= -39.0));
    assert!(ch.samples.iter().any(|&v| v >= 39.0));
}

#[test]
fn percentile_range_clips_the_same_data() {
    // The counter-example: a 99th-percentile range legitimately excludes the
    // bursts and would truncate them.
    let samples = bursty_chin(200.0, 120);
    let (lo, hi) = percentile_range(&samples, 99.0);
    assert!(hi < 40.0, "percentile range unexpectedly wide: {hi}");
    let clipped = samples.iter().filter(|&&v| v < lo || v > hi).count();
    assert!(clipped > 0, "percentile range must clip the bursts");

    // The extrema-with-margin range never does.
    let (lo, hi) = physical_range(&samples, Some(500.0));
    assert_eq!(samples.iter().filter(|&&v| v < lo || v > hi).count(), 0);
}

#[test]
fn reconstructed_file_is_continuous_and_seekable() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("rec.edf");
    write_raw_edf(&input, start(), &[("EMG Chin", 200.0, bursty_chin(200.0, 30))]);

    let cfg = PipelineConfig::default();
    let det = detect(&input, &cfg.roles).unwrap();
    let reader = EdfReader::open(&input).unwrap();
    let out = dir.path().join("rec_edfplus.edf");
    reconstruct(&reader, &det, &cfg, &out).unwrap();

    // Round-trip: the published file is EDF+C and carries the start instant
    // and per-channel rate unchanged.
    let redet = detect(&out, &cfg.roles).unwrap();
    assert_eq!(redet.dialect, Dialect::EdfPlusContinuous);
    let reread = EdfReader::open(&out).unwrap();
    assert_eq!(reread.header.start, start());
    assert_eq!(reread.header.sfreq(0), 200.0);
}

#[test]
fn end_to_end_range_scenario() {
    // Raw 200 Hz, 3 channels; the chin carries a −40 µV sample against a
    // naive 99th-percentile range of about ±12 µV.
    let sfreq = 200.0;
    let n = sfreq as usize * 60;
    let mut chin: Vec<f64> = tone(30.0, sfreq, n).iter().map(|v| v * 8.0).collect();
    chin[n / 2] = -40.0;
    let (_, naive_hi) = percentile_range(&chin, 99.0);
    assert!(naive_hi <= 12.0, "fixture drifted: naive range {naive_hi}");

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("rec.edf");
    write_raw_edf(
        &input,
        start(),
        &[
            ("EMG Chin", sfreq, chin),
            ("LAT", sfreq, tone(25.0, sfreq, n).iter().map(|v| v * 3.0).collect()),
            ("RAT", sfreq, tone(22.0, sfreq, n).iter().map(|v| v * 3.0).collect()),
        ],
    );

    let cfg = PipelineConfig::default();
    let det = detect(&input, &cfg.roles).unwrap();
    let reader = EdfReader::open(&input).unwrap();
    let out = dir.path().join("rec_edfplus.edf");
    let rec = reconstruct(&reader, &det, &cfg, &out).unwrap();

    for ch in &rec.channels {
        // EMG floor dominates here: every range is at least ±500 µV.
        assert!(ch.physical_max >= 500.0, "{}: {}", ch.label, ch.physical_max);
        assert!(ch.range_holds());
    }
    // The −40 µV sample is retained unclipped (within one digital step).
    let chin = rec.channel("EMG Chin").unwrap();
    let min = chin.samples.iter().cloned().fold(f64::INFINITY, f64::min);
    approx::assert_abs_diff_eq!(min, -40.0, epsilon = 0.2);
}
