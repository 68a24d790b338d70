mod common;
use common::{contaminated, start, write_raw_edf};

use psgprep::{
    detect, run_recording, BaselineAnalyzer, Dialect, EdfReader, PipelineConfig, RunOutcome,
};

/// Raw 200 Hz recording + companion sheet, through the whole pipeline.
#[test]
fn raw_with_sheet_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("PS0140_211029.edf");

    let sfreq = 200.0;
    write_raw_edf(
        &input,
        start(),
        &[
            ("EMG Chin", sfreq, contaminated(sfreq, 600)),
            ("LAT", sfreq, contaminated(sfreq, 600)),
            ("RAT", sfreq, contaminated(sfreq, 600)),
        ],
    );
    // Sheet: staged REM span plus one arousal and one respiratory event.
    std::fs::write(
        dir.path().join("PS0140_211029.csv"),
        "\
1;22:14:30.00;Stage - W
2;22:15:00.00;Stage - R
3;22:16:12.40;Arousal - Dur: 19.6 sec. - Spontaneous
4;22:18:00.00;Respiratory Event - Dur: 22.0 sec. - Hypopnea
5;22:19:00.00;Lights on
",
    )
    .unwrap();

    let cfg = PipelineConfig::default();
    let analyzer = BaselineAnalyzer::new();
    let report = run_recording(&input, &cfg, Some(&analyzer));

    assert!(matches!(report.outcome, RunOutcome::Success), "{:?}", report.outcome);
    assert_eq!(report.dialect.as_deref(), Some("RawWithSheet"));
    assert_eq!(report.skipped_rows, 1); // "Lights on"
    assert_eq!(report.unresolved_roles, 0);

    // Reconstructed and conditioned containers exist and are continuous.
    let conditioned = report.conditioned_edf.clone().unwrap();
    assert!(dir.path().join("PS0140_211029_edfplus.edf").exists());
    let redet = detect(&conditioned, &cfg.roles).unwrap();
    assert_eq!(redet.dialect, Dialect::EdfPlusContinuous);

    // Conditioned channels carry the prefilter chain and the range floor.
    let reread = EdfReader::open(&conditioned).unwrap();
    let chin = &reread.header.signals[0];
    assert_eq!(chin.prefilter, "HP:10Hz LP:95Hz N:60Hz");
    assert!(chin.physical_max >= 500.0);

    // Canonical annotation files written with the expected schema.
    let profile =
        std::fs::read_to_string(report.sleep_profile.as_ref().unwrap()).unwrap();
    assert!(profile.starts_with("Start Time: 29.10.2021 22:14:03\n"));
    assert!(profile.contains("22:15:00,000000; REM\n"));
    let arousals = std::fs::read_to_string(report.arousal_file.as_ref().unwrap()).unwrap();
    assert!(arousals.contains("Signal Type: Impuls"));
    assert!(arousals.contains("22:16:12,000000-22:16:31,600000; 19.60; Spontaneous"));

    // The analyzer ran over all three EMG roles.
    let stats = report.analysis.unwrap();
    assert_eq!(stats.channels.len(), 3);
    for ch in &stats.channels {
        assert!(ch.baseline_uv.is_finite());
        assert!(ch.artifact_free_rem_secs > 0.0);
    }

    // Conditioning report JSON exists.
    assert!(dir
        .path()
        .join("PS0140_211029_conditioning_report.json")
        .exists());
}

/// Raw dialect without its companion sheet fails at the normalize stage and
/// reports it; nothing is written.
#[test]
fn missing_sheet_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("rec.edf");
    write_raw_edf(&input, start(), &[("EMG Chin", 200.0, contaminated(200.0, 30))]);

    let report = run_recording(&input, &PipelineConfig::default(), None);
    match &report.outcome {
        RunOutcome::Failed { stage, reason } => {
            assert_eq!(stage, "normalize");
            assert!(reason.contains("missing annotation source"), "{reason}");
        }
        RunOutcome::Success => panic!("expected failure"),
    }
    assert!(!dir.path().join("rec_preprocessed.edf").exists());
    assert!(!dir.path().join("rec_edfplus.edf").exists());
}

/// A self-describing EDF+C goes straight to conditioning (no reconstruction
/// artifact on disk) and unmapped channels pass through flagged.
#[test]
fn edfplus_direct_path() {
    use psgprep::{write_continuous, Channel, Recording};

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("rec.edf");
    let rec = Recording {
        start: start(),
        channels: vec![
            Channel {
                label: "EMG Chin".into(),
                unit: "uV".into(),
                sfreq: 256.0,
                physical_min: -500.0,
                physical_max: 500.0,
                prefilter: String::new(),
                samples: contaminated(256.0, 120),
            },
            Channel {
                label: "EEG C3-A2".into(),
                unit: "uV".into(),
                sfreq: 256.0,
                physical_min: -500.0,
                physical_max: 500.0,
                prefilter: String::new(),
                samples: contaminated(256.0, 120),
            },
        ],
    };
    write_continuous(&input, &rec, "X").unwrap();

    let report = run_recording(&input, &PipelineConfig::default(), None);
    assert!(report.succeeded(), "{:?}", report.outcome);
    assert_eq!(report.dialect.as_deref(), Some("EdfPlusContinuous"));
    assert_eq!(report.unresolved_roles, 1); // the EEG channel
    assert!(!dir.path().join("rec_edfplus.edf").exists());
    assert!(dir.path().join("rec_preprocessed.edf").exists());
}
