//! Score converter — migrates the legacy flat-measure JSON shape and
//! the current multi-track JSON shape into the score model, provides
//! the lock-step measure editing that keeps tracks aligned, and builds
//! the built-in example scores used as offline fallback content.
//!
//! Pure mapping functions only; raw-format parsing lives in the
//! importer modules.

use serde_json::Value;

use crate::error::{ParseError, ParsedScore, Warnings};
use crate::model::{
    Beat, Clef, Hand, Key, Measure, Note, NoteDuration, Score, ScoreMetadata, Track,
};
use crate::theory::{clamp_tempo, degree_to_pitch, key_from_name, quantize_beats};

// ═══════════════════════════════════════════════════════════════════════
// Beat grouping
// ═══════════════════════════════════════════════════════════════════════

/// Group a flat run of notes into beats by accumulating note lengths:
/// a beat closes once it has accumulated at least one full beat, and
/// the remainder carries into the next group. A final partial group
/// becomes a trailing beat.
pub(crate) fn group_into_beats(notes: Vec<Note>) -> Vec<Beat> {
    let mut beats: Vec<Beat> = Vec::new();
    let mut position = 0.0f64;
    let mut accumulated = 0.0f64;
    let mut current: Vec<Note> = Vec::new();

    for note in notes {
        let len = note.sounding_beats();
        current.push(note);
        accumulated += len;
        if accumulated >= 1.0 {
            let mut beat = Beat::new((position + 1e-6) as u32);
            beat.notes = std::mem::take(&mut current);
            beats.push(beat);
            position += accumulated;
            accumulated = 0.0;
        }
    }

    if !current.is_empty() {
        let mut beat = Beat::new((position + 1e-6) as u32);
        beat.notes = current;
        beats.push(beat);
    }

    beats
}

// ═══════════════════════════════════════════════════════════════════════
// Legacy flat-measure JSON
// ═══════════════════════════════════════════════════════════════════════

/// Convert the legacy single-track JSON shape — measures of
/// `{degree, octave, duration}` notes — into the current model.
pub fn from_legacy_json(text: &str) -> Result<ParsedScore, ParseError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ParseError::MalformedInput(format!("JSON parse error: {e}")))?;

    let mut warnings = Warnings::new();
    let metadata = metadata_from_json(&value, &mut warnings);
    let key = metadata.key;

    let measures_json = value
        .get("measures")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ParseError::NoRecoverableContent("legacy score has no measures array".to_string())
        })?;

    let mut track = Track::new("t1", "Melody", Clef::Treble);
    for (i, measure_json) in measures_json.iter().enumerate() {
        let notes: Vec<Note> = measure_json
            .get("notes")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|n| legacy_note(n, key, &mut warnings))
                    .collect()
            })
            .unwrap_or_default();

        let mut measure = Measure::new(i as u32 + 1);
        measure.beats = group_into_beats(notes);
        track.measures.push(measure);
    }

    if track.measures.is_empty() {
        return Err(ParseError::NoRecoverableContent(
            "legacy score has zero measures".to_string(),
        ));
    }

    let score = Score {
        id: str_field(&value, "id").unwrap_or_else(|| "legacy-import".to_string()),
        title: str_field(&value, "title").unwrap_or_else(|| "Untitled".to_string()),
        subtitle: None,
        composer: str_field(&value, "composer"),
        arranger: None,
        metadata,
        tracks: vec![track],
    };

    Ok(ParsedScore::with_warnings(score, warnings.into_vec()))
}

fn legacy_note(value: &Value, key: Key, warnings: &mut Warnings) -> Note {
    let degree = value
        .get("degree")
        .and_then(Value::as_u64)
        .unwrap_or(1)
        .min(7) as u32;
    let octave = value.get("octave").and_then(Value::as_i64).unwrap_or(0) as i32;
    let duration = duration_field(value, warnings);

    let mut note = if degree == 0 {
        Note::rest(duration)
    } else {
        Note::new(degree_to_pitch(degree, octave, key), duration)
    };
    note.dots = value
        .get("dots")
        .and_then(Value::as_u64)
        .map_or(0, |d| u8::from(d > 0));
    note
}

// ═══════════════════════════════════════════════════════════════════════
// Current multi-track JSON
// ═══════════════════════════════════════════════════════════════════════

/// Parse the current explicit tracks/measures/beats/notes JSON shape.
/// Every absent field is replaced by its documented default; no beat
/// regrouping happens since beats are already explicit.
pub fn score_from_json(text: &str) -> Result<ParsedScore, ParseError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ParseError::MalformedInput(format!("JSON parse error: {e}")))?;

    let mut warnings = Warnings::new();
    let metadata = metadata_from_json(&value, &mut warnings);

    let tracks_json = value
        .get("tracks")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ParseError::NoRecoverableContent("score has no tracks array".to_string())
        })?;

    let mut tracks = Vec::new();
    for (ti, track_json) in tracks_json.iter().enumerate() {
        let clef = match str_field(track_json, "clef").as_deref() {
            Some("bass") => Clef::Bass,
            Some("alto") => Clef::Alto,
            _ => Clef::Treble,
        };
        let mut track = Track::new(
            str_field(track_json, "id").unwrap_or_else(|| format!("t{}", ti + 1)),
            str_field(track_json, "name").unwrap_or_else(|| format!("Track {}", ti + 1)),
            clef,
        );
        track.hand = match str_field(track_json, "hand").as_deref() {
            Some("left") => Some(Hand::Left),
            Some("right") => Some(Hand::Right),
            _ => None,
        };

        if let Some(measures) = track_json.get("measures").and_then(Value::as_array) {
            for (mi, measure_json) in measures.iter().enumerate() {
                let mut measure = Measure::new(mi as u32 + 1);
                if let Some(beats) = measure_json.get("beats").and_then(Value::as_array) {
                    for beat_json in beats {
                        let mut beat = Beat::new(
                            beat_json.get("index").and_then(Value::as_u64).unwrap_or(0)
                                as u32,
                        );
                        if let Some(notes) = beat_json.get("notes").and_then(Value::as_array)
                        {
                            for note_json in notes {
                                beat.notes.push(json_note(note_json, &mut warnings));
                            }
                        }
                        measure.beats.push(beat);
                    }
                }
                measure.tempo_override = measure_json
                    .get("tempoOverride")
                    .and_then(Value::as_u64)
                    .map(|t| t as u32);
                track.measures.push(measure);
            }
        }
        tracks.push(track);
    }

    if tracks.is_empty() || tracks.iter().all(|t| t.measures.is_empty()) {
        return Err(ParseError::NoRecoverableContent(
            "score has no tracks with measures".to_string(),
        ));
    }

    // Lock-step invariant.
    let measure_count = tracks.iter().map(|t| t.measures.len()).max().unwrap_or(0);
    for track in &mut tracks {
        while track.measures.len() < measure_count {
            track
                .measures
                .push(Measure::new(track.measures.len() as u32 + 1));
        }
    }

    let score = Score {
        id: str_field(&value, "id").unwrap_or_else(|| "imported-json".to_string()),
        title: str_field(&value, "title").unwrap_or_else(|| "Untitled".to_string()),
        subtitle: str_field(&value, "subtitle"),
        composer: str_field(&value, "composer"),
        arranger: str_field(&value, "arranger"),
        metadata,
        tracks,
    };

    Ok(ParsedScore::with_warnings(score, warnings.into_vec()))
}

fn json_note(value: &Value, warnings: &mut Warnings) -> Note {
    let pitch = value
        .get("pitch")
        .and_then(Value::as_u64)
        .map(|p| p.min(127) as u8)
        .unwrap_or(60);
    let duration = duration_field(value, warnings);

    let mut note = Note::new(pitch, duration);
    note.dots = value
        .get("dots")
        .and_then(Value::as_u64)
        .map_or(0, |d| u8::from(d > 0));
    if !note.is_rest() {
        note.tie_start = bool_field(value, "tieStart");
        note.tie_end = bool_field(value, "tieEnd");
        note.lyric = str_field(value, "lyric");
        note.finger = value
            .get("finger")
            .and_then(Value::as_u64)
            .map(|f| f.min(5) as u8);
    }
    note
}

// ─── Shared JSON field helpers ───────────────────────────────────────

fn metadata_from_json(value: &Value, warnings: &mut Warnings) -> ScoreMetadata {
    let mut metadata = ScoreMetadata::default();

    if let Some(name) = str_field(value, "key") {
        match key_from_name(&name) {
            Some(key) => metadata.key = key,
            None => warnings.push(format!("unknown key '{name}', defaulting to C")),
        }
    }
    if let Some(bpm) = value.get("tempo").and_then(Value::as_i64) {
        let (tempo, clamped) = clamp_tempo(bpm);
        if clamped {
            warnings.push(format!(
                "tempo {bpm} outside supported range, defaulting to {tempo}"
            ));
        }
        metadata.tempo = tempo;
    }
    if let Some(n) = value.get("beatsPerMeasure").and_then(Value::as_u64) {
        metadata.beats_per_measure = (n as u32).max(1);
    }
    if let Some(d) = value.get("beatUnit").and_then(Value::as_u64) {
        metadata.beat_unit = (d as u32).max(1);
    }
    metadata
}

fn duration_field(value: &Value, warnings: &mut Warnings) -> NoteDuration {
    match value.get("duration") {
        Some(Value::String(name)) => match name.as_str() {
            "whole" => NoteDuration::Whole,
            "half" => NoteDuration::Half,
            "quarter" => NoteDuration::Quarter,
            "eighth" => NoteDuration::Eighth,
            "sixteenth" => NoteDuration::Sixteenth,
            "thirtySecond" | "thirty-second" => NoteDuration::ThirtySecond,
            other => {
                warnings.push(format!("unknown duration '{other}', defaulting to quarter"));
                NoteDuration::Quarter
            }
        },
        Some(Value::Number(n)) => {
            // Numeric durations are beat lengths; snap to the table.
            let beats = n.as_f64().unwrap_or(1.0);
            quantize_beats(beats).0
        }
        _ => NoteDuration::Quarter,
    }
}

fn str_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn bool_field(value: &Value, field: &str) -> bool {
    value.get(field).and_then(Value::as_bool).unwrap_or(false)
}

// ═══════════════════════════════════════════════════════════════════════
// Lock-step measure editing
// ═══════════════════════════════════════════════════════════════════════

/// Insert an empty measure at `index` in every track, renumbering so
/// measure numbers stay contiguous from 1.
pub fn insert_measure(score: &mut Score, index: usize) {
    for track in &mut score.tracks {
        let index = index.min(track.measures.len());
        track.measures.insert(index, Measure::new(0));
        renumber(track);
    }
}

/// Remove the measure at `index` from every track, renumbering the
/// remainder. Out-of-range indices are ignored.
pub fn remove_measure(score: &mut Score, index: usize) {
    for track in &mut score.tracks {
        if index < track.measures.len() {
            track.measures.remove(index);
            renumber(track);
        }
    }
}

fn renumber(track: &mut Track) {
    for (i, measure) in track.measures.iter_mut().enumerate() {
        measure.number = i as u32 + 1;
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in example scores
// ═══════════════════════════════════════════════════════════════════════

/// Hand-authored reference scores, used as offline fixtures and
/// fallback content when no persisted library exists.
pub fn builtin_scores() -> Vec<Score> {
    vec![two_tigers(), pachelbel_canon()]
}

/// Build one measure from a flat (pitch, duration) run.
fn measure_of(number: u32, notes: &[(u8, NoteDuration)]) -> Measure {
    let mut measure = Measure::new(number);
    measure.beats = group_into_beats(
        notes
            .iter()
            .map(|&(pitch, duration)| Note::new(pitch, duration))
            .collect(),
    );
    measure
}

/// "两只老虎" — the children's round sung to the Frère Jacques melody.
fn two_tigers() -> Score {
    use NoteDuration::{Eighth, Half, Quarter};

    let lines: &[&[(u8, NoteDuration)]] = &[
        &[(60, Quarter), (62, Quarter), (64, Quarter), (60, Quarter)],
        &[(60, Quarter), (62, Quarter), (64, Quarter), (60, Quarter)],
        &[(64, Quarter), (65, Quarter), (67, Half)],
        &[(64, Quarter), (65, Quarter), (67, Half)],
        &[
            (67, Eighth),
            (69, Eighth),
            (67, Eighth),
            (65, Eighth),
            (64, Quarter),
            (60, Quarter),
        ],
        &[
            (67, Eighth),
            (69, Eighth),
            (67, Eighth),
            (65, Eighth),
            (64, Quarter),
            (60, Quarter),
        ],
        &[(60, Quarter), (55, Quarter), (60, Half)],
        &[(60, Quarter), (55, Quarter), (60, Half)],
    ];

    let mut track = Track::new("t1", "Melody", Clef::Treble);
    track.hand = Some(Hand::Right);
    for (i, line) in lines.iter().enumerate() {
        track.measures.push(measure_of(i as u32 + 1, line));
    }

    Score {
        id: "builtin-two-tigers".to_string(),
        title: "两只老虎".to_string(),
        subtitle: None,
        composer: Some("Traditional".to_string()),
        arranger: None,
        metadata: ScoreMetadata {
            tempo: 100,
            tags: vec!["builtin".to_string()],
            ..ScoreMetadata::default()
        },
        tracks: vec![track],
    }
}

/// The opening of Pachelbel's Canon in D, melody over the ground bass.
fn pachelbel_canon() -> Score {
    use NoteDuration::Half;

    let melody: &[&[(u8, NoteDuration)]] = &[
        &[(78, Half), (76, Half)],
        &[(74, Half), (73, Half)],
        &[(71, Half), (69, Half)],
        &[(71, Half), (73, Half)],
    ];
    let bass: &[&[(u8, NoteDuration)]] = &[
        &[(50, Half), (45, Half)],
        &[(47, Half), (42, Half)],
        &[(43, Half), (38, Half)],
        &[(43, Half), (45, Half)],
    ];

    let mut right = Track::new("t1", "Violin", Clef::Treble);
    right.hand = Some(Hand::Right);
    for (i, line) in melody.iter().enumerate() {
        right.measures.push(measure_of(i as u32 + 1, line));
    }

    let mut left = Track::new("t2", "Continuo", Clef::Bass);
    left.hand = Some(Hand::Left);
    for (i, line) in bass.iter().enumerate() {
        left.measures.push(measure_of(i as u32 + 1, line));
    }

    Score {
        id: "builtin-canon".to_string(),
        title: "Canon in D".to_string(),
        subtitle: None,
        composer: Some("Johann Pachelbel".to_string()),
        arranger: None,
        metadata: ScoreMetadata {
            key: Key::D,
            tempo: 70,
            tags: vec!["builtin".to_string()],
            ..ScoreMetadata::default()
        },
        tracks: vec![right, left],
    }
}
