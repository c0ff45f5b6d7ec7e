//! Jianpu (numbered notation) text parser.
//!
//! Parses the constrained plain-text grammar used in Chinese music
//! pedagogy: digits 1–7 are scale degrees (0 a rest), `|` separates
//! measures, underlines shorten, octave dots raise or lower, and a
//! dash sustains the previous note. Header lines like `调号：G` set the
//! score metadata.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::convert::group_into_beats;
use crate::error::{ParseError, ParsedScore, Warnings};
use crate::model::{
    Accidental, Clef, Key, Measure, Note, NoteDuration, Score, ScoreMetadata, Track,
};
use crate::theory::{clamp_tempo, degree_to_pitch, key_from_name};

/// Cheap validation: any scale-degree digit after trimming.
pub fn validate_jianpu(text: &str) -> bool {
    text.trim().chars().any(|c| ('1'..='7').contains(&c))
}

/// Parse jianpu text into a score.
pub fn parse_jianpu(text: &str) -> Result<ParsedScore, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::MalformedInput(
            "empty jianpu text".to_string(),
        ));
    }

    // The tokenizer is total over its grammar, but a panic on a corner
    // case we missed must not cross the module boundary.
    match catch_unwind(AssertUnwindSafe(|| parse_inner(text))) {
        Ok(result) => result,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown tokenizer failure".to_string());
            Err(ParseError::MalformedInput(format!(
                "jianpu parse failed: {msg}"
            )))
        }
    }
}

fn parse_inner(text: &str) -> Result<ParsedScore, ParseError> {
    let mut warnings = Warnings::new();
    let mut metadata = ScoreMetadata::default();
    let mut title = String::new();
    let mut composer = None;
    let mut lyricist = None;

    let mut note_lines: Vec<&str> = Vec::new();
    let mut lyric_lines: Vec<&str> = Vec::new();

    let mut prev_was_note_line = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((label, value)) = split_metadata_line(line) {
            apply_metadata(
                label,
                value,
                &mut metadata,
                &mut title,
                &mut composer,
                &mut lyricist,
                &mut warnings,
            );
            prev_was_note_line = false;
            continue;
        }

        if is_note_line(line) && notation_ratio(line) >= 0.3 {
            note_lines.push(line);
            prev_was_note_line = true;
        } else if prev_was_note_line {
            // A mostly-text line right after a note line carries its lyrics.
            lyric_lines.push(line);
            prev_was_note_line = false;
        } else {
            warnings.push(format!("unrecognized line ignored: '{line}'"));
            prev_was_note_line = false;
        }
    }

    // Measures come from the concatenation of every note line.
    let all_notes = note_lines.join(" ");
    let measure_sources: Vec<&str> = all_notes
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if measure_sources.is_empty() {
        return Err(ParseError::NoRecoverableContent(
            "no measures found in jianpu text".to_string(),
        ));
    }

    let lyric_segments = split_lyrics(&lyric_lines, measure_sources.len());

    let mut track = Track::new("t1", "旋律", Clef::Treble);
    for (i, source) in measure_sources.iter().enumerate() {
        let mut notes = tokenize_measure(source, metadata.key, &mut warnings);
        if let Some(segment) = lyric_segments.get(i) {
            assign_lyrics(&mut notes, segment);
        }
        let mut measure = Measure::new(i as u32 + 1);
        measure.beats = group_into_beats(notes);
        track.measures.push(measure);
    }

    let score = Score {
        id: "imported-jianpu".to_string(),
        title: if title.is_empty() {
            "Imported Jianpu".to_string()
        } else {
            title
        },
        subtitle: lyricist.map(|l: String| format!("词：{l}")),
        composer,
        arranger: None,
        metadata,
        tracks: vec![track],
    };

    Ok(ParsedScore::with_warnings(score, warnings.into_vec()))
}

// ─── Line classification ─────────────────────────────────────────────

/// Labels recognized in `label：value` / `label:value` header lines.
const METADATA_LABELS: &[&str] = &["标题", "曲名", "作曲", "作词", "调号", "调", "拍号", "速度"];

fn split_metadata_line(line: &str) -> Option<(&str, &str)> {
    let (label, value) = line
        .split_once('：')
        .or_else(|| line.split_once(':'))?;
    let label = label.trim();
    if METADATA_LABELS.contains(&label) {
        Some((label, value.trim()))
    } else {
        None
    }
}

fn apply_metadata(
    label: &str,
    value: &str,
    metadata: &mut ScoreMetadata,
    title: &mut String,
    composer: &mut Option<String>,
    lyricist: &mut Option<String>,
    warnings: &mut Warnings,
) {
    match label {
        "标题" | "曲名" => *title = value.to_string(),
        "作曲" => *composer = Some(value.to_string()),
        "作词" => *lyricist = Some(value.to_string()),
        "调号" | "调" => {
            // Accept both "G" and the "1=G" convention.
            let name = value.strip_prefix("1=").unwrap_or(value).trim();
            match key_from_name(name) {
                Some(key) => metadata.key = key,
                None => {
                    warnings.push(format!("unknown key '{name}', defaulting to C"));
                    metadata.key = Key::C;
                }
            }
        }
        "拍号" => {
            if let Some((num, den)) = value.split_once('/') {
                match (num.trim().parse::<u32>(), den.trim().parse::<u32>()) {
                    (Ok(n), Ok(d)) if n > 0 && d > 0 => {
                        metadata.beats_per_measure = n;
                        metadata.beat_unit = d;
                    }
                    _ => warnings.push(format!("unreadable time signature '{value}'")),
                }
            } else {
                warnings.push(format!("unreadable time signature '{value}'"));
            }
        }
        "速度" => match value.trim().parse::<i64>() {
            Ok(bpm) => {
                let (tempo, clamped) = clamp_tempo(bpm);
                if clamped {
                    warnings.push(format!(
                        "tempo {bpm} outside supported range, defaulting to {tempo}"
                    ));
                }
                metadata.tempo = tempo;
            }
            Err(_) => warnings.push(format!("unreadable tempo '{value}'")),
        },
        _ => {}
    }
}

/// A note line contains at least one digit, dash or barline.
fn is_note_line(line: &str) -> bool {
    line.chars()
        .any(|c| ('0'..='7').contains(&c) || c == '-' || c == '|')
}

/// Lyric heuristic: fewer than 30% of the non-space characters are
/// notation symbols.
fn notation_ratio(line: &str) -> f64 {
    let mut total = 0usize;
    let mut notation = 0usize;
    for c in line.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if ('0'..='7').contains(&c) || "|-_'.,#b".contains(c) {
            notation += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        notation as f64 / total as f64
    }
}

// ─── Lyric distribution ──────────────────────────────────────────────

/// Split the concatenated lyric lines into one segment per measure:
/// on `|` when the lyric line carries barlines, otherwise by evenly
/// dividing the character count.
fn split_lyrics(lyric_lines: &[&str], measure_count: usize) -> Vec<Vec<char>> {
    if lyric_lines.is_empty() || measure_count == 0 {
        return Vec::new();
    }
    let joined = lyric_lines.join("");

    if joined.contains('|') {
        return joined
            .split('|')
            .take(measure_count)
            .map(|seg| seg.chars().filter(|c| !c.is_whitespace()).collect())
            .collect();
    }

    let chars: Vec<char> = joined.chars().filter(|c| !c.is_whitespace()).collect();
    let base = chars.len() / measure_count;
    let extra = chars.len() % measure_count;

    let mut segments = Vec::with_capacity(measure_count);
    let mut pos = 0;
    for i in 0..measure_count {
        let len = base + usize::from(i < extra);
        let end = (pos + len).min(chars.len());
        segments.push(chars[pos..end].to_vec());
        pos = end;
    }
    segments
}

/// One lyric character per non-rest note, in order.
fn assign_lyrics(notes: &mut [Note], segment: &[char]) {
    let mut chars = segment.iter();
    for note in notes.iter_mut().filter(|n| !n.is_rest()) {
        match chars.next() {
            Some(&c) => note.lyric = Some(c.to_string()),
            None => break,
        }
    }
}

// ─── Tokenizer ───────────────────────────────────────────────────────

/// Tokenize one measure's worth of symbols into notes.
///
/// Grammar per token: one-or-more `-` (sustain), or
/// `[#b]? [0-7] [_.'`,]*` — accidental, scale degree, then any ordered
/// combination of underlines (subdivision), octave marks and a dot.
fn tokenize_measure(source: &str, key: Key, warnings: &mut Warnings) -> Vec<Note> {
    let mut notes: Vec<Note> = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c == '-' {
            // A dash run: each dash sustains the previous note by one
            // beat; with nothing to sustain it becomes a quarter rest.
            let mut dashes = 0;
            while pos < chars.len() && chars[pos] == '-' {
                dashes += 1;
                pos += 1;
            }
            match notes.last_mut().filter(|n| !n.is_rest()) {
                Some(prev) => {
                    let extended = prev.sounding_beats() + dashes as f64;
                    prev.precise_beats = Some(extended);
                }
                None => {
                    for _ in 0..dashes {
                        notes.push(Note::rest(NoteDuration::Quarter));
                    }
                }
            }
            continue;
        }

        // Optional leading accidental.
        let accidental = match c {
            '#' => Some(Accidental::Sharp),
            'b' => Some(Accidental::Flat),
            _ => None,
        };
        if accidental.is_some() {
            pos += 1;
        }

        let Some(&digit) = chars.get(pos) else {
            warnings.push("dangling accidental at end of measure".to_string());
            break;
        };
        let Some(degree) = digit.to_digit(10).filter(|d| *d <= 7) else {
            warnings.push(format!("unexpected symbol '{digit}' skipped"));
            pos += 1;
            continue;
        };
        pos += 1;

        // Suffixes are cumulative and consumed left to right.
        let mut underlines = 0u32;
        let mut octave = 0i32;
        let mut dotted = false;
        while pos < chars.len() {
            match chars[pos] {
                '_' => underlines += 1,
                '\'' | '`' => octave += 1,
                ',' => octave -= 1,
                '.' => dotted = true,
                _ => break,
            }
            pos += 1;
        }

        let duration = match underlines {
            0 => NoteDuration::Quarter,
            1 => NoteDuration::Eighth,
            2 => NoteDuration::Sixteenth,
            _ => NoteDuration::ThirtySecond,
        };

        let mut note = if degree == 0 {
            Note::rest(duration)
        } else {
            let mut pitch = degree_to_pitch(degree, octave, key) as i32;
            match accidental {
                Some(Accidental::Sharp) => pitch += 1,
                Some(Accidental::Flat) => pitch -= 1,
                _ => {}
            }
            let mut n = Note::new(pitch.clamp(1, 127) as u8, duration);
            n.accidental = accidental.unwrap_or(Accidental::None);
            n
        };
        note.dots = u8::from(dotted);
        notes.push(note);
    }

    notes
}
