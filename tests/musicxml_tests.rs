//! Integration tests for the MusicXML parser, using inline fixtures.

use pretty_assertions::assert_eq;
use scorekit::musicxml::{parse_musicxml, validate_musicxml};
use scorekit::{Accidental, Clef, Hand, Key, NoteDuration, ParseError};

/// Wrap measure content in a minimal single-part document.
fn doc_with_measures(measures: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="3.1">
  <part-list>
    <score-part id="P1"><part-name>Piano</part-name></score-part>
  </part-list>
  <part id="P1">{measures}</part>
</score-partwise>"#
    )
}

const ATTRIBUTES_4_4: &str = r#"
  <attributes>
    <divisions>2</divisions>
    <key><fifths>0</fifths></key>
    <time><beats>4</beats><beat-type>4</beat-type></time>
    <clef><sign>G</sign><line>2</line></clef>
  </attributes>"#;

fn quarter_note(step: &str, octave: u32) -> String {
    format!(
        "<note><pitch><step>{step}</step><octave>{octave}</octave></pitch>\
         <duration>2</duration><type>quarter</type></note>"
    )
}

// ─── Validation and structural failures ─────────────────────────────

#[test]
fn validate_checks_root_element() {
    assert!(validate_musicxml(&doc_with_measures("")));
    assert!(!validate_musicxml("<score-timewise/>"));
    assert!(!validate_musicxml("not xml at all"));
}

#[test]
fn rejects_timewise_documents() {
    let xml = r#"<score-timewise><part id="P1"/></score-timewise>"#;
    assert!(matches!(
        parse_musicxml(xml),
        Err(ParseError::UnsupportedVariant(_))
    ));
}

#[test]
fn rejects_malformed_xml() {
    assert!(matches!(
        parse_musicxml("<score-partwise><unclosed"),
        Err(ParseError::MalformedInput(_))
    ));
}

#[test]
fn score_without_parts_is_unrecoverable() {
    let xml = r#"<score-partwise><part-list/></score-partwise>"#;
    assert!(matches!(
        parse_musicxml(xml),
        Err(ParseError::NoRecoverableContent(_))
    ));
}

// ─── Minimal fixture ────────────────────────────────────────────────

#[test]
fn parses_minimal_single_note() {
    let xml = doc_with_measures(&format!(
        r#"<measure number="1">{ATTRIBUTES_4_4}
           <direction><sound tempo="120"/></direction>
           {}</measure>"#,
        quarter_note("C", 4)
    ));

    let parsed = parse_musicxml(&xml).expect("parse failed");
    let score = &parsed.score;

    assert_eq!(score.measure_count(), 1);
    assert_eq!(score.metadata.tempo, 120);
    assert_eq!(score.metadata.beats_per_measure, 4);
    assert_eq!(score.tracks[0].name, "Piano");

    let note = &score.tracks[0].measures[0].beats[0].notes[0];
    assert_eq!(note.pitch, 60);
    assert_eq!(note.duration, NoteDuration::Quarter);
}

// ─── Tempo precedence ───────────────────────────────────────────────

#[test]
fn sound_tempo_beats_metronome() {
    let xml = doc_with_measures(&format!(
        r#"<measure number="1">{ATTRIBUTES_4_4}
           <direction>
             <direction-type><metronome><beat-unit>quarter</beat-unit><per-minute>90</per-minute></metronome></direction-type>
             <sound tempo="132"/>
           </direction>
           {}</measure>"#,
        quarter_note("C", 4)
    ));
    let parsed = parse_musicxml(&xml).expect("parse failed");
    assert_eq!(parsed.score.metadata.tempo, 132);
}

#[test]
fn metronome_beats_words() {
    let xml = doc_with_measures(&format!(
        r#"<measure number="1">{ATTRIBUTES_4_4}
           <direction><direction-type><words>Allegro</words></direction-type></direction>
           <direction><direction-type><metronome><per-minute>90</per-minute></metronome></direction-type></direction>
           {}</measure>"#,
        quarter_note("C", 4)
    ));
    let parsed = parse_musicxml(&xml).expect("parse failed");
    assert_eq!(parsed.score.metadata.tempo, 90);
}

#[test]
fn italian_terms_resolve_tempo() {
    let xml = doc_with_measures(&format!(
        r#"<measure number="1">{ATTRIBUTES_4_4}
           <direction><direction-type><words>Grave</words></direction-type></direction>
           {}</measure>"#,
        quarter_note("C", 4)
    ));
    let parsed = parse_musicxml(&xml).expect("parse failed");
    assert_eq!(parsed.score.metadata.tempo, 40);
    assert_eq!(parsed.score.metadata.tempo_text.as_deref(), Some("Grave"));
}

#[test]
fn numeric_tempo_after_equals_sign() {
    let xml = doc_with_measures(&format!(
        r#"<measure number="1">{ATTRIBUTES_4_4}
           <direction><direction-type><words>quarter = 96</words></direction-type></direction>
           {}</measure>"#,
        quarter_note("C", 4)
    ));
    let parsed = parse_musicxml(&xml).expect("parse failed");
    assert_eq!(parsed.score.metadata.tempo, 96);
}

#[test]
fn missing_tempo_defaults_with_warning() {
    let xml = doc_with_measures(&format!(
        r#"<measure number="1">{ATTRIBUTES_4_4}{}</measure>"#,
        quarter_note("C", 4)
    ));
    let parsed = parse_musicxml(&xml).expect("parse failed");
    assert_eq!(parsed.score.metadata.tempo, 120);
    assert!(parsed
        .warnings
        .iter()
        .any(|w| w.contains("no tempo marking")));
}

// ─── Key, clef, hand ────────────────────────────────────────────────

#[test]
fn key_from_fifths_lookup() {
    let xml = doc_with_measures(&format!(
        r#"<measure number="1">
          <attributes>
            <divisions>2</divisions>
            <key><fifths>-3</fifths></key>
            <time><beats>4</beats><beat-type>4</beat-type></time>
            <clef><sign>F</sign><line>4</line></clef>
          </attributes>
          {}</measure>"#,
        quarter_note("C", 3)
    ));
    let parsed = parse_musicxml(&xml).expect("parse failed");
    assert_eq!(parsed.score.metadata.key, Key::EFlat);
    assert_eq!(parsed.score.tracks[0].clef, Clef::Bass);
    assert_eq!(parsed.score.tracks[0].hand, Some(Hand::Left));
}

// ─── Chords and the time cursor ─────────────────────────────────────

#[test]
fn chord_members_share_a_beat() {
    let xml = doc_with_measures(&format!(
        r#"<measure number="1">{ATTRIBUTES_4_4}
           {}
           <note><chord/><pitch><step>E</step><octave>4</octave></pitch><duration>2</duration></note>
           <note><chord/><pitch><step>G</step><octave>4</octave></pitch><duration>2</duration></note>
           {}</measure>"#,
        quarter_note("C", 4),
        quarter_note("D", 4)
    ));
    let parsed = parse_musicxml(&xml).expect("parse failed");
    let beats = &parsed.score.tracks[0].measures[0].beats;

    // C-E-G as one chord beat, then D on the next pulse.
    assert_eq!(beats.len(), 2);
    assert_eq!(beats[0].index, 0);
    assert_eq!(beats[0].notes.len(), 3);
    let pitches: Vec<u8> = beats[0].notes.iter().map(|n| n.pitch).collect();
    assert_eq!(pitches, vec![60, 64, 67]);
    assert_eq!(beats[1].index, 1);
    assert_eq!(beats[1].notes[0].pitch, 62);
}

#[test]
fn eighth_pairs_land_in_the_same_beat() {
    let xml = doc_with_measures(&format!(
        r#"<measure number="1">{ATTRIBUTES_4_4}
           <note><pitch><step>C</step><octave>4</octave></pitch><duration>1</duration></note>
           <note><pitch><step>D</step><octave>4</octave></pitch><duration>1</duration></note>
           {}</measure>"#,
        quarter_note("E", 4)
    ));
    let parsed = parse_musicxml(&xml).expect("parse failed");
    let beats = &parsed.score.tracks[0].measures[0].beats;
    assert_eq!(beats[0].index, 0);
    assert_eq!(beats[0].notes.len(), 2);
    assert!(beats[0]
        .notes
        .iter()
        .all(|n| n.duration == NoteDuration::Eighth));
    assert_eq!(beats[1].index, 1);
}

// ─── Note attributes ────────────────────────────────────────────────

#[test]
fn ties_tuplets_and_accidentals() {
    let xml = doc_with_measures(
        r#"<measure number="1">
          <attributes><divisions>6</divisions>
            <time><beats>4</beats><beat-type>4</beat-type></time>
            <clef><sign>G</sign></clef>
          </attributes>
          <note>
            <pitch><step>F</step><octave>4</octave><alter>1</alter></pitch>
            <duration>2</duration>
            <time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>
            <tie type="start"/>
          </note>
          <note>
            <pitch><step>F</step><octave>4</octave><alter>1</alter></pitch>
            <duration>2</duration>
            <tie type="stop"/>
          </note>
          <note>
            <pitch><step>B</step><octave>4</octave></pitch>
            <duration>2</duration>
            <accidental>flat</accidental>
          </note>
        </measure>"#,
    );
    let parsed = parse_musicxml(&xml).expect("parse failed");
    let beats = &parsed.score.tracks[0].measures[0].beats;
    let notes: Vec<_> = beats.iter().flat_map(|b| b.notes.iter()).collect();

    assert_eq!(notes[0].pitch, 66); // F#4
    assert_eq!(notes[0].accidental, Accidental::Sharp);
    assert!(notes[0].tie_start);
    assert!(notes[1].tie_end);
    assert_eq!(
        beats[0].tuplet,
        Some(scorekit::Tuplet {
            actual: 3,
            normal: 2
        })
    );
    // Explicit element wins over the (absent) alter.
    assert_eq!(notes[2].accidental, Accidental::Flat);
}

#[test]
fn empty_part_is_dropped_with_warning() {
    let xml = format!(
        r#"<score-partwise>
  <part-list>
    <score-part id="P1"><part-name>Lead</part-name></score-part>
    <score-part id="P2"><part-name>Empty</part-name></score-part>
  </part-list>
  <part id="P1"><measure number="1">{}{}</measure></part>
  <part id="P2"></part>
</score-partwise>"#,
        ATTRIBUTES_4_4,
        quarter_note("C", 4)
    );
    let parsed = parse_musicxml(&xml).expect("parse failed");
    assert_eq!(parsed.score.tracks.len(), 1);
    assert!(parsed.warnings.iter().any(|w| w.contains("no measures")));
}

#[test]
fn titles_prefer_credit_over_work() {
    let xml = r#"<score-partwise>
  <work><work-title>Fallback</work-title></work>
  <credit><credit-type>title</credit-type><credit-words>Primary</credit-words></credit>
  <part-list><score-part id="P1"><part-name>P</part-name></score-part></part-list>
  <part id="P1"><measure number="1">
    <attributes><divisions>1</divisions></attributes>
    <note><pitch><step>C</step><octave>4</octave></pitch><duration>1</duration></note>
  </measure></part>
</score-partwise>"#;
    let parsed = parse_musicxml(xml).expect("parse failed");
    assert_eq!(parsed.score.title, "Primary");
}
