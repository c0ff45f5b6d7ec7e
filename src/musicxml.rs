//! MusicXML parser — converts score-partwise documents into the score
//! model.
//!
//! Only `score-partwise` is supported; `score-timewise` is rejected as
//! an unsupported variant. Duration mapping is deliberately lossy: the
//! written `<type>` element is ignored in favor of quantizing
//! `duration/divisions`, which tolerates malformed exports that
//! disagree with themselves.

use roxmltree::{Document, Node};

use crate::error::{ParseError, ParsedScore, Warnings};
use crate::model::{
    Accidental, Articulation, Beat, Clef, Hand, Key, Measure, Note, NoteDuration,
    Ornament, Pedal, RepeatSign, Score, ScoreMetadata, Track, Tuplet, DEFAULT_TEMPO,
};
use crate::theory::{clamp_tempo, key_from_fifths, quantize_beats, tempo_from_term};

/// Cheap validation: is this plausibly a parsable score-partwise
/// document? Does not perform semantic parsing.
pub fn validate_musicxml(xml: &str) -> bool {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    match Document::parse_with_options(xml, options) {
        Ok(doc) => doc.root_element().tag_name().name() == "score-partwise",
        Err(_) => false,
    }
}

/// Parse a MusicXML string into a score.
pub fn parse_musicxml(xml: &str) -> Result<ParsedScore, ParseError> {
    // MusicXML files carry a DOCTYPE declaration, so DTDs must be allowed.
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options)
        .map_err(|e| ParseError::MalformedInput(format!("XML parse error: {e}")))?;
    let root = doc.root_element();

    match root.tag_name().name() {
        "score-partwise" => {}
        "score-timewise" => {
            return Err(ParseError::UnsupportedVariant(
                "score-timewise documents are not supported".to_string(),
            ))
        }
        other => {
            return Err(ParseError::MalformedInput(format!(
                "unexpected root element '{other}'"
            )))
        }
    }

    let mut warnings = Warnings::new();

    let mut score = Score {
        id: "imported-musicxml".to_string(),
        title: String::new(),
        subtitle: None,
        composer: None,
        arranger: None,
        metadata: ScoreMetadata::default(),
        tracks: Vec::new(),
    };

    parse_titles(&root, &mut score);
    score.metadata.key = resolve_key(&doc);
    resolve_time(&doc, &mut score.metadata);
    resolve_tempo(&doc, &mut score.metadata, &mut warnings);

    // Part names from the part-list, keyed by part id.
    let mut part_names: Vec<(String, String)> = Vec::new();
    for child in root.children().filter(|n| n.is_element()) {
        if child.tag_name().name() == "part-list" {
            for sp in child.children().filter(|n| n.is_element()) {
                if sp.tag_name().name() == "score-part" {
                    let id = sp.attribute("id").unwrap_or("").to_string();
                    let name = sp
                        .children()
                        .filter(|n| n.is_element())
                        .find(|n| n.tag_name().name() == "part-name")
                        .and_then(|n| n.text())
                        .unwrap_or("")
                        .trim()
                        .to_string();
                    part_names.push((id, name));
                }
            }
        }
    }

    for part_node in root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "part")
    {
        let part_id = part_node.attribute("id").unwrap_or("").to_string();
        let name = part_names
            .iter()
            .find(|(id, _)| *id == part_id)
            .map(|(_, n)| n.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Part {}", score.tracks.len() + 1));

        match parse_part(
            &part_node,
            &part_id,
            &name,
            score.metadata.beats_per_measure,
            score.metadata.tempo,
            &mut warnings,
        ) {
            Some(track) => score.tracks.push(track),
            None => warnings.push(format!("part '{part_id}' has no measures, dropped")),
        }
    }

    if score.tracks.is_empty() {
        return Err(ParseError::NoRecoverableContent(
            "no parts survived parsing".to_string(),
        ));
    }

    // Lock-step invariant: every track holds the same measure count.
    let measure_count = score
        .tracks
        .iter()
        .map(|t| t.measures.len())
        .max()
        .unwrap_or(0);
    for track in &mut score.tracks {
        while track.measures.len() < measure_count {
            track
                .measures
                .push(Measure::new(track.measures.len() as u32 + 1));
        }
    }

    Ok(ParsedScore::with_warnings(score, warnings.into_vec()))
}

// ─── Title, composer, arranger ───────────────────────────────────────

fn parse_titles(root: &Node, score: &mut Score) {
    for child in root.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "work" => {
                for wc in child.children().filter(|n| n.is_element()) {
                    // <credit type="title"> takes priority over work-title.
                    if wc.tag_name().name() == "work-title" && score.title.is_empty() {
                        score.title = text_of(&wc);
                    }
                }
            }
            "identification" => {
                for ic in child.children().filter(|n| n.is_element()) {
                    if ic.tag_name().name() == "creator" {
                        let text = Some(text_of(&ic)).filter(|t| !t.is_empty());
                        match ic.attribute("type") {
                            Some("composer") if score.composer.is_none() => {
                                score.composer = text;
                            }
                            Some("arranger") => score.arranger = text,
                            _ => {}
                        }
                    }
                }
            }
            "credit" => {
                let mut credit_type = String::new();
                let mut credit_text = String::new();
                for cc in child.children().filter(|n| n.is_element()) {
                    match cc.tag_name().name() {
                        "credit-type" => credit_type = text_of(&cc),
                        "credit-words" => {
                            let words = text_of(&cc);
                            if !words.is_empty() {
                                if !credit_text.is_empty() {
                                    credit_text.push('\n');
                                }
                                credit_text.push_str(&words);
                            }
                        }
                        _ => {}
                    }
                }
                if credit_text.is_empty() {
                    continue;
                }
                match credit_type.as_str() {
                    "title" => score.title = credit_text,
                    "subtitle" => score.subtitle = Some(credit_text),
                    "composer" => score.composer = Some(credit_text),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    if score.title.is_empty() {
        score.title = "Imported MusicXML".to_string();
    }
}

// ─── Score-level key / time / tempo ──────────────────────────────────

fn resolve_key(doc: &Document) -> Key {
    doc.descendants()
        .find(|n| n.tag_name().name() == "key")
        .and_then(|key| {
            key.children()
                .filter(|n| n.is_element())
                .find(|n| n.tag_name().name() == "fifths")
                .and_then(|f| f.text())
                .and_then(|t| t.trim().parse::<i32>().ok())
        })
        .map(key_from_fifths)
        .unwrap_or(Key::C)
}

fn resolve_time(doc: &Document, metadata: &mut ScoreMetadata) {
    if let Some(time) = doc.descendants().find(|n| n.tag_name().name() == "time") {
        for child in time.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "beats" => {
                    if let Some(v) = int_of(&child) {
                        metadata.beats_per_measure = v.max(1) as u32;
                    }
                }
                "beat-type" => {
                    if let Some(v) = int_of(&child) {
                        metadata.beat_unit = v.max(1) as u32;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Tempo precedence, first match wins: sound@tempo anywhere, then a
/// metronome per-minute marking, then a textual marking matched against
/// the Italian tempo table or a trailing "= N" number.
fn resolve_tempo(doc: &Document, metadata: &mut ScoreMetadata, warnings: &mut Warnings) {
    if let Some(tempo) = doc
        .descendants()
        .filter(|n| n.tag_name().name() == "sound")
        .find_map(|n| n.attribute("tempo").and_then(|t| t.trim().parse::<f64>().ok()))
    {
        let (bpm, clamped) = clamp_tempo(tempo.round() as i64);
        if clamped {
            warnings.push(format!(
                "sound tempo {tempo} outside supported range, defaulting to {bpm}"
            ));
        }
        metadata.tempo = bpm;
        return;
    }

    if let Some(per_minute) = doc
        .descendants()
        .filter(|n| n.tag_name().name() == "metronome")
        .find_map(|m| {
            m.children()
                .filter(|n| n.is_element())
                .find(|n| n.tag_name().name() == "per-minute")
                .and_then(|n| n.text())
                .and_then(|t| t.trim().parse::<f64>().ok())
        })
    {
        let (bpm, clamped) = clamp_tempo(per_minute.round() as i64);
        if clamped {
            warnings.push(format!(
                "metronome marking {per_minute} outside supported range, defaulting to {bpm}"
            ));
        }
        metadata.tempo = bpm;
        return;
    }

    for words in doc
        .descendants()
        .filter(|n| n.tag_name().name() == "words")
    {
        let text = text_of(&words);
        if text.is_empty() {
            continue;
        }
        if let Some(bpm) = tempo_from_term(&text).or_else(|| tempo_after_equals(&text)) {
            let (bpm, _) = clamp_tempo(bpm as i64);
            metadata.tempo = bpm;
            metadata.tempo_text = Some(text);
            warnings.note(format!("detected tempo: {bpm} BPM"));
            return;
        }
    }

    metadata.tempo = DEFAULT_TEMPO;
    warnings.push(format!("no tempo marking found, defaulting to {DEFAULT_TEMPO}"));
}

/// Extract a number following '=' in markings like "♩ = 96".
fn tempo_after_equals(text: &str) -> Option<u32> {
    let (_, after) = text.split_once('=')?;
    let digits: String = after
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

// ─── Part → Track ────────────────────────────────────────────────────

fn parse_part(
    part_node: &Node,
    part_id: &str,
    name: &str,
    beats_per_measure: u32,
    score_tempo: u32,
    warnings: &mut Warnings,
) -> Option<Track> {
    // Clef from the first attributes block; treble when absent.
    let clef = part_node
        .descendants()
        .find(|n| n.tag_name().name() == "clef")
        .and_then(|c| {
            c.children()
                .filter(|n| n.is_element())
                .find(|n| n.tag_name().name() == "sign")
                .and_then(|s| s.text())
        })
        .map(|sign| match sign.trim() {
            "F" => Clef::Bass,
            "C" => Clef::Alto,
            _ => Clef::Treble,
        })
        .unwrap_or(Clef::Treble);

    let hand = match clef {
        Clef::Treble => Some(Hand::Right),
        Clef::Bass => Some(Hand::Left),
        Clef::Alto => None,
    };

    let mut track = Track::new(part_id, name, clef);
    track.hand = hand;

    let mut divisions = 1i64;
    for measure_node in part_node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "measure")
    {
        let number = track.measures.len() as u32 + 1;
        let measure = parse_measure(
            &measure_node,
            number,
            &mut divisions,
            beats_per_measure,
            score_tempo,
            warnings,
        );
        track.measures.push(measure);
    }

    if track.measures.is_empty() {
        None
    } else {
        Some(track)
    }
}

fn parse_measure(
    node: &Node,
    number: u32,
    divisions: &mut i64,
    beats_per_measure: u32,
    score_tempo: u32,
    warnings: &mut Warnings,
) -> Measure {
    let mut measure = Measure::new(number);

    // Beats keyed by pulse index, built up as the time cursor advances.
    let mut beats: Vec<Beat> = Vec::new();
    let mut cursor = 0.0f64;
    let mut last_onset = 0.0f64;

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "attributes" => {
                if let Some(d) = child
                    .children()
                    .filter(|n| n.is_element())
                    .find(|n| n.tag_name().name() == "divisions")
                    .and_then(|n| int_of(&n))
                {
                    if d > 0 {
                        *divisions = d;
                    } else {
                        warnings.push(format!(
                            "measure {number}: non-positive divisions {d} ignored"
                        ));
                    }
                }
            }
            "note" => {
                let is_chord = child
                    .children()
                    .any(|n| n.is_element() && n.tag_name().name() == "chord");
                let parsed = parse_note(&child, *divisions, warnings);
                let Some((note, dur_beats, grace)) = parsed else {
                    warnings.push(format!("measure {number}: unreadable note skipped"));
                    continue;
                };

                // A chord member sounds with the preceding note; the
                // cursor only advances on the first note of a group.
                let onset = if is_chord { last_onset } else { cursor };
                let beat_idx = ((onset.max(0.0) + 1e-6) as u32)
                    .min(beats_per_measure.saturating_sub(1));

                let tuplet = parse_tuplet(&child);
                let pos = match beats.iter().position(|b| b.index == beat_idx) {
                    Some(p) => p,
                    None => {
                        beats.push(Beat::new(beat_idx));
                        beats.len() - 1
                    }
                };
                let beat = &mut beats[pos];
                if beat.tuplet.is_none() {
                    beat.tuplet = tuplet;
                }
                beat.notes.push(note);

                if !is_chord && !grace {
                    last_onset = cursor;
                    cursor += dur_beats;
                }
            }
            "backup" => {
                if let Some(d) = duration_of(&child) {
                    cursor -= d as f64 / *divisions as f64;
                }
            }
            "forward" => {
                if let Some(d) = duration_of(&child) {
                    cursor += d as f64 / *divisions as f64;
                }
            }
            "direction" => parse_direction(&child, &mut measure, score_tempo),
            "sound" => {
                if let Some(tempo) = child
                    .attribute("tempo")
                    .and_then(|t| t.trim().parse::<f64>().ok())
                {
                    apply_tempo_override(&mut measure, tempo, score_tempo);
                }
            }
            "barline" => parse_barline(&child, &mut measure),
            _ => {}
        }
    }

    beats.sort_by_key(|b| b.index);
    measure.beats = beats;
    measure
}

// ─── Note ────────────────────────────────────────────────────────────

/// Parse one `<note>` element. Returns the model note, its exact length
/// in beats, and whether it was a grace note (grace notes do not
/// advance the time cursor).
fn parse_note(
    node: &Node,
    divisions: i64,
    warnings: &mut Warnings,
) -> Option<(Note, f64, bool)> {
    let mut pitch: Option<(String, i32, i32)> = None; // step, octave, alter
    let mut rest = false;
    let mut grace = false;
    let mut grace_slash = false;
    let mut duration_divs: Option<i64> = None;
    let mut dot = false;
    let mut accidental_text: Option<String> = None;
    let mut tie_start = false;
    let mut tie_end = false;
    let mut lyric: Option<String> = None;
    let mut articulation: Option<Articulation> = None;
    let mut ornament: Option<Ornament> = None;
    let mut finger: Option<u8> = None;

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "pitch" => {
                let mut step = "C".to_string();
                let mut octave = 4;
                let mut alter = 0;
                for pc in child.children().filter(|n| n.is_element()) {
                    match pc.tag_name().name() {
                        "step" => step = text_of(&pc),
                        "octave" => octave = int_of(&pc).unwrap_or(4) as i32,
                        "alter" => {
                            alter = pc
                                .text()
                                .and_then(|t| t.trim().parse::<f64>().ok())
                                .unwrap_or(0.0) as i32
                        }
                        _ => {}
                    }
                }
                pitch = Some((step, octave, alter));
            }
            "rest" => rest = true,
            "grace" => {
                grace = true;
                grace_slash = child.attribute("slash") == Some("yes");
            }
            "duration" => duration_divs = int_of(&child),
            "dot" => dot = true,
            "accidental" => accidental_text = Some(text_of(&child)),
            "tie" => match child.attribute("type") {
                Some("start") => tie_start = true,
                Some("stop") => tie_end = true,
                _ => {}
            },
            "lyric" => {
                let text = child
                    .children()
                    .filter(|n| n.is_element())
                    .find(|n| n.tag_name().name() == "text")
                    .map(|t| text_of(&t))
                    .filter(|t| !t.is_empty());
                if lyric.is_none() {
                    lyric = text;
                }
            }
            "notations" => {
                for nc in child.children().filter(|n| n.is_element()) {
                    match nc.tag_name().name() {
                        "articulations" => {
                            // First recognized articulation in document order.
                            for ac in nc.children().filter(|n| n.is_element()) {
                                if articulation.is_some() {
                                    break;
                                }
                                articulation = match ac.tag_name().name() {
                                    "staccato" => Some(Articulation::Staccato),
                                    "accent" => Some(Articulation::Accent),
                                    "tenuto" => Some(Articulation::Tenuto),
                                    _ => None,
                                };
                            }
                        }
                        "ornaments" => {
                            for oc in nc.children().filter(|n| n.is_element()) {
                                if ornament.is_some() {
                                    break;
                                }
                                ornament = match oc.tag_name().name() {
                                    "trill-mark" => Some(Ornament::Trill),
                                    "turn" => Some(Ornament::Turn),
                                    "mordent" => Some(Ornament::Mordent),
                                    "inverted-mordent" => Some(Ornament::InvertedMordent),
                                    _ => None,
                                };
                            }
                        }
                        "technical" => {
                            finger = nc
                                .children()
                                .filter(|n| n.is_element())
                                .find(|n| n.tag_name().name() == "fingering")
                                .and_then(|f| f.text())
                                .and_then(|t| t.trim().parse().ok());
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    // Grace notes have no duration; everything else needs one.
    let dur_beats = if grace {
        0.0
    } else {
        let divs = duration_divs?;
        divs.max(0) as f64 / divisions.max(1) as f64
    };

    let (duration, dots) = if grace {
        (NoteDuration::Eighth, 0)
    } else {
        quantize_beats(dur_beats)
    };

    let mut note = if rest {
        Note::rest(duration)
    } else {
        let (step, octave, alter) = pitch.clone()?;
        let midi = step_to_midi(&step, octave, alter);
        if midi.is_none() {
            warnings.push(format!("unknown pitch step '{step}'"));
        }
        Note::new(midi.unwrap_or(60), duration)
    };
    note.dots = if dot { 1 } else { dots };

    if !note.is_rest() {
        note.tie_start = tie_start;
        note.tie_end = tie_end;
        note.lyric = lyric;
        note.accidental = resolve_accidental(accidental_text.as_deref(), &pitch);
        note.articulation = articulation;
        note.finger = finger;
        note.ornament = ornament.or(if grace {
            Some(if grace_slash {
                Ornament::Acciaccatura
            } else {
                Ornament::Appoggiatura
            })
        } else {
            None
        });
    }

    Some((note, dur_beats, grace))
}

fn step_to_midi(step: &str, octave: i32, alter: i32) -> Option<u8> {
    let semitone = match step.trim() {
        "C" => 0,
        "D" => 2,
        "E" => 4,
        "F" => 5,
        "G" => 7,
        "A" => 9,
        "B" => 11,
        _ => return None,
    };
    let midi = (octave + 1) * 12 + semitone + alter;
    Some(midi.clamp(0, 127) as u8)
}

/// Explicit `<accidental>` element wins; otherwise inferred from the
/// alter value's sign and magnitude.
fn resolve_accidental(
    text: Option<&str>,
    pitch: &Option<(String, i32, i32)>,
) -> Accidental {
    if let Some(text) = text {
        return match text {
            "sharp" => Accidental::Sharp,
            "flat" => Accidental::Flat,
            "natural" => Accidental::Natural,
            "double-sharp" | "sharp-sharp" => Accidental::DoubleSharp,
            "double-flat" | "flat-flat" => Accidental::DoubleFlat,
            _ => Accidental::None,
        };
    }
    match pitch.as_ref().map(|&(_, _, alter)| alter) {
        Some(1) => Accidental::Sharp,
        Some(-1) => Accidental::Flat,
        Some(2) => Accidental::DoubleSharp,
        Some(-2) => Accidental::DoubleFlat,
        _ => Accidental::None,
    }
}

fn parse_tuplet(node: &Node) -> Option<Tuplet> {
    let tm = node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "time-modification")?;
    let mut actual = 0;
    let mut normal = 0;
    for child in tm.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "actual-notes" => actual = int_of(&child).unwrap_or(0),
            "normal-notes" => normal = int_of(&child).unwrap_or(0),
            _ => {}
        }
    }
    // Both must be present and positive or no tuplet is recorded.
    if actual > 0 && normal > 0 {
        Some(Tuplet {
            actual: actual as u32,
            normal: normal as u32,
        })
    } else {
        None
    }
}

// ─── Measure-level directions and barlines ───────────────────────────

fn parse_direction(node: &Node, measure: &mut Measure, score_tempo: u32) {
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "direction-type" => {
                for dt in child.children().filter(|n| n.is_element()) {
                    match dt.tag_name().name() {
                        "dynamics" => {
                            if measure.dynamics.is_none() {
                                measure.dynamics = dt
                                    .children()
                                    .find(|n| n.is_element())
                                    .map(|d| d.tag_name().name().to_string());
                            }
                        }
                        "pedal" => {
                            measure.pedal = match dt.attribute("type") {
                                Some("start") => Some(Pedal::Down),
                                Some("stop") => Some(Pedal::Up),
                                _ => measure.pedal,
                            };
                        }
                        "metronome" => {
                            if let Some(pm) = dt
                                .children()
                                .filter(|n| n.is_element())
                                .find(|n| n.tag_name().name() == "per-minute")
                                .and_then(|n| n.text())
                                .and_then(|t| t.trim().parse::<f64>().ok())
                            {
                                apply_tempo_override(measure, pm, score_tempo);
                            }
                        }
                        _ => {}
                    }
                }
            }
            "sound" => {
                if let Some(tempo) = child
                    .attribute("tempo")
                    .and_then(|t| t.trim().parse::<f64>().ok())
                {
                    apply_tempo_override(measure, tempo, score_tempo);
                }
            }
            _ => {}
        }
    }
}

/// A tempo marking inside a measure becomes a per-measure override when
/// it differs from the score-level tempo.
fn apply_tempo_override(measure: &mut Measure, tempo: f64, score_tempo: u32) {
    let (bpm, clamped) = clamp_tempo(tempo.round() as i64);
    if !clamped && bpm != score_tempo {
        measure.tempo_override = Some(bpm);
    }
}

fn parse_barline(node: &Node, measure: &mut Measure) {
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "repeat" => {
                let sign = match child.attribute("direction") {
                    Some("backward") => RepeatSign::End,
                    _ => RepeatSign::Start,
                };
                measure.repeat = Some(match (measure.repeat, sign) {
                    (Some(RepeatSign::Start), RepeatSign::End)
                    | (Some(RepeatSign::End), RepeatSign::Start) => RepeatSign::Both,
                    (_, s) => s,
                });
            }
            "ending" => {
                if measure.ending.is_none() {
                    measure.ending = child
                        .attribute("number")
                        .and_then(|n| n.split(',').next())
                        .and_then(|n| n.trim().parse().ok());
                }
            }
            _ => {}
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn text_of(node: &Node) -> String {
    node.text().unwrap_or("").trim().to_string()
}

fn int_of(node: &Node) -> Option<i64> {
    node.text()?.trim().parse().ok()
}

fn duration_of(node: &Node) -> Option<i64> {
    node.children()
        .filter(|n| n.is_element())
        .find(|n| n.tag_name().name() == "duration")
        .and_then(|n| int_of(&n))
}
