mod common;
use common::start;

use chrono::Duration;
use psgprep::annotate::{from_embedded, from_sheet_text};
use psgprep::TalAnnotation;

/// Variant A and Variant B inputs describing the same logical events must
/// normalize to identical canonical EventIntervals.
#[test]
fn variant_a_and_b_round_trip_identically() {
    // Recording starts 22:14:03. Events at +57 s, +117 s, +297 s, +357 s.
    let tals = vec![
        TalAnnotation {
            onset_secs: 57.0,
            duration_secs: 0.0,
            text: "Sleep stage W".into(),
        },
        TalAnnotation {
            onset_secs: 117.0,
            duration_secs: 0.0,
            text: "Sleep stage R".into(),
        },
        TalAnnotation {
            onset_secs: 297.25, // sub-second onset: truncated to 22:19:00
            duration_secs: 19.6,
            text: "EMG arousal".into(),
        },
        TalAnnotation {
            onset_secs: 357.0,
            duration_secs: 22.0,
            text: "Obstructive Apnea".into(),
        },
    ];
    let a = from_embedded(&tals, start());

    let sheet = "\
1;22:15:00.00;Stage - W
2;22:16:00.00;Stage - R
3;22:19:00.25;Arousal - Dur: 19.6 sec. - EMG arousal
4;22:20:00.00;Respiratory Event - Dur: 22.0 sec. - Apnea
";
    let b = from_sheet_text(sheet, start());

    assert_eq!(a.stages, b.stages);
    assert_eq!(a.arousals, b.arousals);
    assert_eq!(a.respiratory, b.respiratory);
    assert_eq!(a.skipped_rows, 0);
    assert_eq!(b.skipped_rows, 0);

    // All canonical onsets are whole seconds.
    for ev in a.stages.iter().chain(&a.arousals).chain(&a.respiratory) {
        assert_eq!(ev.onset.format("%f").to_string(), "000000000");
    }
}

#[test]
fn sheet_day_rollover_spans_midnight() {
    let sheet = "\
700;23:58:00.00;Stage - N2
701;23:58:30.00;Arousal - Dur: 5.0 sec. - Spontaneous
702;00:02:00.00;Stage - N2
703;00:05:00.00;Respiratory Event - Dur: 15.0 sec. - Hypopnea
";
    let ann = from_sheet_text(sheet, start());
    // Events after midnight land on the next calendar day.
    let gap = ann.stages[1].onset - ann.stages[0].onset;
    assert_eq!(gap, Duration::minutes(4));
    assert_eq!(
        ann.respiratory[0].onset.format("%Y-%m-%d").to_string(),
        "2021-10-30"
    );
}

#[test]
fn unrecognized_rows_counted_not_fatal() {
    let sheet = "\
1;22:15:00.00;Stage - W
2;22:15:10.00;Body position change - Supine
3;22:15:20.00;Impedance check
4;22:16:00.00;Stage - N1
";
    let ann = from_sheet_text(sheet, start());
    assert_eq!(ann.stages.len(), 2);
    assert_eq!(ann.skipped_rows, 2);
}
