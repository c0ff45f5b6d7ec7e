//! Tests for the JSON score converter, lock-step editing and built-in
//! scores.

use pretty_assertions::assert_eq;
use scorekit::convert::{
    builtin_scores, from_legacy_json, insert_measure, remove_measure, score_from_json,
};
use scorekit::{NoteDuration, ParseError};

// ─── Legacy flat-measure JSON ───────────────────────────────────────

#[test]
fn legacy_notes_group_into_beats_by_accumulation() {
    let json = r#"{
        "title": "Legacy",
        "measures": [{
            "notes": [
                {"degree": 1, "octave": 0, "duration": "eighth"},
                {"degree": 2, "octave": 0, "duration": "eighth"},
                {"degree": 3, "octave": 0, "duration": "half"},
                {"degree": 5, "octave": 0, "duration": "quarter"}
            ]
        }]
    }"#;
    let parsed = from_legacy_json(json).expect("parse failed");
    let beats = &parsed.score.tracks[0].measures[0].beats;

    // Two eighths fill beat 0, the half fills beat 1 (spanning into 2),
    // the quarter starts at beat 3.
    assert_eq!(beats.len(), 3);
    assert_eq!(beats[0].index, 0);
    assert_eq!(beats[0].notes.len(), 2);
    assert_eq!(beats[1].index, 1);
    assert_eq!(beats[1].notes[0].duration, NoteDuration::Half);
    assert_eq!(beats[2].index, 3);

    let pitches: Vec<u8> = beats
        .iter()
        .flat_map(|b| b.notes.iter())
        .map(|n| n.pitch)
        .collect();
    assert_eq!(pitches, vec![60, 62, 64, 67]);
}

#[test]
fn legacy_trailing_partial_group_becomes_a_beat() {
    let json = r#"{"measures": [{"notes": [
        {"degree": 1, "octave": 0, "duration": "quarter"},
        {"degree": 2, "octave": 0, "duration": "eighth"}
    ]}]}"#;
    let parsed = from_legacy_json(json).expect("parse failed");
    let beats = &parsed.score.tracks[0].measures[0].beats;
    assert_eq!(beats.len(), 2);
    assert_eq!(beats[1].notes.len(), 1);
    assert_eq!(beats[1].notes[0].duration, NoteDuration::Eighth);
}

#[test]
fn legacy_defaults_substitute_missing_fields() {
    let json = r#"{"measures": [{"notes": [{}]}]}"#;
    let parsed = from_legacy_json(json).expect("parse failed");
    let note = &parsed.score.tracks[0].measures[0].beats[0].notes[0];
    assert_eq!(note.pitch, 60); // degree 1, octave 0, key C
    assert_eq!(note.duration, NoteDuration::Quarter);
    assert_eq!(parsed.score.title, "Untitled");
}

#[test]
fn legacy_without_measures_is_unrecoverable() {
    assert!(matches!(
        from_legacy_json(r#"{"title": "x"}"#),
        Err(ParseError::NoRecoverableContent(_))
    ));
    assert!(matches!(
        from_legacy_json("not json"),
        Err(ParseError::MalformedInput(_))
    ));
}

// ─── Current multi-track JSON ───────────────────────────────────────

#[test]
fn new_format_keeps_explicit_beats() {
    let json = r#"{
        "title": "New",
        "key": "G",
        "tempo": 90,
        "tracks": [{
            "id": "t1", "name": "RH", "clef": "treble", "hand": "right",
            "measures": [{
                "beats": [
                    {"index": 0, "notes": [{"pitch": 67, "duration": "quarter"}]},
                    {"index": 2, "notes": [{"pitch": 71, "duration": "half"}]}
                ]
            }]
        }]
    }"#;
    let parsed = score_from_json(json).expect("parse failed");
    let score = &parsed.score;

    assert_eq!(score.metadata.key, scorekit::Key::G);
    assert_eq!(score.metadata.tempo, 90);
    let beats = &score.tracks[0].measures[0].beats;
    assert_eq!(beats.len(), 2);
    assert_eq!(beats[0].index, 0);
    assert_eq!(beats[1].index, 2);
    assert_eq!(beats[1].notes[0].pitch, 71);
}

#[test]
fn new_format_pads_tracks_to_equal_measure_counts() {
    let json = r#"{"tracks": [
        {"measures": [{"beats": []}, {"beats": []}]},
        {"measures": [{"beats": []}]}
    ]}"#;
    let parsed = score_from_json(json).expect("parse failed");
    assert_eq!(parsed.score.tracks[0].measures.len(), 2);
    assert_eq!(parsed.score.tracks[1].measures.len(), 2);
}

#[test]
fn note_defaults_are_pitch_60_quarter() {
    let json = r#"{"tracks": [{"measures": [{"beats": [{"notes": [{}]}]}]}]}"#;
    let parsed = score_from_json(json).expect("parse failed");
    let note = &parsed.score.tracks[0].measures[0].beats[0].notes[0];
    assert_eq!(note.pitch, 60);
    assert_eq!(note.duration, NoteDuration::Quarter);
}

// ─── Lock-step measure editing ──────────────────────────────────────

#[test]
fn remove_measure_renumbers_all_tracks() {
    let mut score = builtin_scores().remove(1); // the two-track canon
    let before = score.measure_count();
    remove_measure(&mut score, 0);

    assert_eq!(score.measure_count(), before - 1);
    for track in &score.tracks {
        let numbers: Vec<u32> = track.measures.iter().map(|m| m.number).collect();
        assert_eq!(numbers, (1..=before as u32 - 1).collect::<Vec<_>>());
    }
}

#[test]
fn insert_measure_keeps_tracks_aligned() {
    let mut score = builtin_scores().remove(1);
    let before = score.measure_count();
    insert_measure(&mut score, 2);

    for track in &score.tracks {
        assert_eq!(track.measures.len(), before + 1);
        assert!(track.measures[2].beats.is_empty());
        let numbers: Vec<u32> = track.measures.iter().map(|m| m.number).collect();
        assert_eq!(numbers, (1..=before as u32 + 1).collect::<Vec<_>>());
    }
}

// ─── Built-in scores ────────────────────────────────────────────────

#[test]
fn builtins_satisfy_model_invariants() {
    let scores = builtin_scores();
    assert_eq!(scores.len(), 2);

    for score in &scores {
        assert!(!score.tracks.is_empty());
        let count = score.tracks[0].measures.len();
        for track in &score.tracks {
            assert_eq!(track.measures.len(), count);
            for (i, measure) in track.measures.iter().enumerate() {
                assert_eq!(measure.number, i as u32 + 1);
            }
        }
        assert!(score.duration_seconds() > 0.0);
    }
}

#[test]
fn canon_is_a_grand_staff() {
    let scores = builtin_scores();
    assert!(!scores[0].is_grand_staff());
    assert!(scores[1].is_grand_staff());
    assert_eq!(scores[1].metadata.key, scorekit::Key::D);
}
