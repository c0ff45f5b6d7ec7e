//! Tests for the layout engine: line breaking, note placement, beam
//! grouping and tie routing.

use scorekit::layout::{layout_score, RenderConfig};
use scorekit::{Beat, Clef, Measure, Note, NoteDuration, Score, Track};

// ─── Score builders ─────────────────────────────────────────────────

fn score_with_measures(beats_per_measure: u32, measures: Vec<Measure>) -> Score {
    let mut track = Track::new("t1", "Melody", Clef::Treble);
    track.measures = measures;
    let mut score = Score::new("test", "Test");
    score.metadata.beats_per_measure = beats_per_measure;
    score.tracks = vec![track];
    score
}

fn empty_measures(n: u32) -> Vec<Measure> {
    (1..=n).map(Measure::new).collect()
}

fn beat_with(index: u32, notes: Vec<Note>) -> Beat {
    let mut beat = Beat::new(index);
    beat.notes = notes;
    beat
}

fn eighth(pitch: u8) -> Note {
    Note::new(pitch, NoteDuration::Eighth)
}

fn quarter(pitch: u8) -> Note {
    Note::new(pitch, NoteDuration::Quarter)
}

// ─── Degenerate inputs never fail ───────────────────────────────────

#[test]
fn zero_measures_yield_an_empty_layout() {
    let score = score_with_measures(4, Vec::new());
    let layout = layout_score(&score, &RenderConfig::default(), 800.0);
    assert!(layout.lines.is_empty());
    assert!(layout.notes.is_empty());
    assert_eq!(layout.width, 800.0);
}

#[test]
fn zero_width_yields_an_empty_layout() {
    let score = score_with_measures(4, empty_measures(4));
    let layout = layout_score(&score, &RenderConfig::default(), 0.0);
    assert!(layout.lines.is_empty());
}

// ─── Line breaking ──────────────────────────────────────────────────

#[test]
fn wide_canvas_fits_everything_on_one_line() {
    let score = score_with_measures(4, empty_measures(4));
    let layout = layout_score(&score, &RenderConfig::default(), 2000.0);
    assert_eq!(layout.lines.len(), 1);
    assert_eq!(layout.lines[0].measure_count, 4);
    assert_eq!(layout.measures.len(), 4);
}

#[test]
fn narrow_canvas_still_places_two_measures_per_line() {
    let score = score_with_measures(4, empty_measures(4));
    // Far below the width of even one measure.
    let layout = layout_score(&score, &RenderConfig::default(), 60.0);
    assert_eq!(layout.lines.len(), 2);
    for line in &layout.lines {
        assert_eq!(line.measure_count, 2);
    }
}

#[test]
fn measures_on_a_line_share_the_width_evenly() {
    let config = RenderConfig::default();
    let score = score_with_measures(4, empty_measures(3));
    let layout = layout_score(&score, &config, 2000.0);

    let expected = (2000.0 - config.header_width) / 3.0;
    for geometry in &layout.measures {
        assert!((geometry.width - expected).abs() < 1e-9);
    }
    assert!((layout.measures[0].x - config.header_width).abs() < 1e-9);
    assert!((layout.measures[1].x - (config.header_width + expected)).abs() < 1e-9);
}

#[test]
fn lines_stack_vertically_by_line_height() {
    let config = RenderConfig::default();
    let score = score_with_measures(4, empty_measures(12));
    let layout = layout_score(&score, &config, 800.0);
    assert!(layout.lines.len() > 1);
    for pair in layout.lines.windows(2) {
        assert!((pair[1].treble_y - pair[0].treble_y - config.line_height).abs() < 1e-9);
    }
}

#[test]
fn grand_staff_gets_a_bass_staff_below_the_treble() {
    let config = RenderConfig::default();
    let mut score = score_with_measures(4, empty_measures(2));
    let mut bass = Track::new("t2", "LH", Clef::Bass);
    bass.measures = empty_measures(2);
    score.tracks.push(bass);

    let layout = layout_score(&score, &config, 800.0);
    let line = &layout.lines[0];
    let bass_y = line.bass_y.expect("bass staff expected");
    assert!(
        (bass_y - (line.treble_y + config.staff_height + config.staff_gap)).abs() < 1e-9
    );
}

// ─── Note placement ─────────────────────────────────────────────────

#[test]
fn beamable_pairs_sit_closer_than_plain_pairs() {
    let measures = vec![
        {
            let mut m = Measure::new(1);
            m.beats = vec![
                beat_with(0, vec![eighth(60), eighth(62)]),
                beat_with(2, vec![quarter(60), quarter(64)]),
            ];
            m
        },
    ];
    let score = score_with_measures(4, measures);
    let layout = layout_score(&score, &RenderConfig::default(), 1200.0);

    let gap_beamed = layout.notes[1].x - layout.notes[0].x;
    let gap_plain = layout.notes[3].x - layout.notes[2].x;
    assert!(gap_beamed < gap_plain);
    assert!((gap_beamed - 0.3 * 28.0).abs() < 1e-9);
    assert!((gap_plain - 0.8 * 28.0).abs() < 1e-9);
}

#[test]
fn stems_point_up_below_the_middle_line() {
    let measures = vec![{
        let mut m = Measure::new(1);
        // Middle C hangs below the treble staff; A5 sits above its middle line.
        m.beats = vec![beat_with(0, vec![quarter(60)]), beat_with(1, vec![quarter(81)])];
        m
    }];
    let score = score_with_measures(4, measures);
    let layout = layout_score(&score, &RenderConfig::default(), 1200.0);
    assert!(layout.notes[0].stem_up);
    assert!(!layout.notes[1].stem_up);
}

#[test]
fn short_notes_subdivide_the_beat_for_playback() {
    let measures = vec![{
        let mut m = Measure::new(1);
        m.beats = vec![beat_with(0, vec![eighth(60), eighth(62)])];
        m
    }];
    let score = score_with_measures(4, measures);
    let layout = layout_score(&score, &RenderConfig::default(), 1200.0);

    assert_eq!(layout.notes[0].start_beats, 0.0);
    assert_eq!(layout.notes[0].duration_beats, 0.5);
    assert_eq!(layout.notes[1].start_beats, 0.5);
}

#[test]
fn long_notes_stack_as_a_chord() {
    let measures = vec![{
        let mut m = Measure::new(1);
        m.beats = vec![beat_with(2, vec![quarter(60), quarter(64), quarter(67)])];
        m
    }];
    let score = score_with_measures(4, measures);
    let layout = layout_score(&score, &RenderConfig::default(), 1200.0);

    for note in &layout.notes {
        assert_eq!(note.start_beats, 2.0);
        assert_eq!(note.duration_beats, 1.0);
    }
}

// ─── Beam grouping ──────────────────────────────────────────────────

fn beam_count_for(beat_indices: &[u32], beats_per_measure: u32) -> usize {
    let measures = vec![{
        let mut m = Measure::new(1);
        m.beats = beat_indices
            .iter()
            .map(|&i| beat_with(i, vec![eighth(60), eighth(62)]))
            .collect();
        m
    }];
    let score = score_with_measures(beats_per_measure, measures);
    layout_score(&score, &RenderConfig::default(), 1200.0).beams.len()
}

#[test]
fn beams_merge_within_the_first_half_of_four_four() {
    assert_eq!(beam_count_for(&[0, 1], 4), 1);
    assert_eq!(beam_count_for(&[2, 3], 4), 1);
}

#[test]
fn beams_never_straddle_the_half_measure_boundary() {
    assert_eq!(beam_count_for(&[1, 2], 4), 2);
}

#[test]
fn two_four_never_merges_across_beats() {
    assert_eq!(beam_count_for(&[0, 1], 2), 2);
}

#[test]
fn three_four_merges_only_after_the_first_beat() {
    assert_eq!(beam_count_for(&[0, 1], 3), 2);
    assert_eq!(beam_count_for(&[1, 2], 3), 1);
}

#[test]
fn single_beamable_note_draws_no_beam() {
    let measures = vec![{
        let mut m = Measure::new(1);
        m.beats = vec![beat_with(0, vec![eighth(60)])];
        m
    }];
    let score = score_with_measures(4, measures);
    let layout = layout_score(&score, &RenderConfig::default(), 1200.0);
    assert!(layout.beams.is_empty());
    assert!(layout.notes[0].beam_group.is_none());
}

#[test]
fn beam_geometry_is_horizontal_and_clear_of_noteheads() {
    let config = RenderConfig::default();
    let measures = vec![{
        let mut m = Measure::new(1);
        m.beats = vec![beat_with(0, vec![eighth(60), eighth(72)])];
        m
    }];
    let score = score_with_measures(4, measures);
    let layout = layout_score(&score, &config, 1200.0);

    assert_eq!(layout.beams.len(), 1);
    let beam = &layout.beams[0];
    assert_eq!(beam.start.y, beam.end.y);
    assert!(beam.stem_up);
    // One stem length above the highest (smallest y) notehead.
    let highest = layout.notes.iter().map(|n| n.y).fold(f64::INFINITY, f64::min);
    assert!((beam.start.y - (highest - config.stem_length)).abs() < 1e-9);
    // Members share the group's stem direction and index.
    for note in &layout.notes {
        assert_eq!(note.beam_group, Some(0));
        assert!(note.stem_up);
    }
}

#[test]
fn mixed_durations_use_the_minimum_beam_line_count() {
    let measures = vec![{
        let mut m = Measure::new(1);
        m.beats = vec![beat_with(
            0,
            vec![
                Note::new(60, NoteDuration::Sixteenth),
                Note::new(62, NoteDuration::Eighth),
            ],
        )];
        m
    }];
    let score = score_with_measures(4, measures);
    let layout = layout_score(&score, &RenderConfig::default(), 1200.0);
    assert_eq!(layout.beams[0].lines, 1);
}

// ─── Ties ───────────────────────────────────────────────────────────

#[test]
fn matched_tie_flags_produce_exactly_one_tie() {
    let mut start = quarter(60);
    start.tie_start = true;
    let mut end = quarter(60);
    end.tie_end = true;

    let measures = vec![
        {
            let mut m = Measure::new(1);
            m.beats = vec![beat_with(3, vec![start])];
            m
        },
        {
            let mut m = Measure::new(2);
            m.beats = vec![beat_with(0, vec![end])];
            m
        },
    ];
    let score = score_with_measures(4, measures);
    let layout = layout_score(&score, &RenderConfig::default(), 1200.0);

    assert_eq!(layout.ties.len(), 1);
    let tie = &layout.ties[0];
    assert_eq!(tie.from_note, 0);
    assert_eq!(tie.to_note, 1);
    assert!(tie.end.x > tie.start.x);
    // Stem up, so the curve bulges downward (larger y).
    assert!(tie.control1.y > tie.start.y);
}

#[test]
fn unmatched_tie_start_produces_no_tie() {
    let mut start = quarter(60);
    start.tie_start = true;
    let mut other = quarter(64);
    other.tie_end = true; // different pitch, never matches

    let measures = vec![{
        let mut m = Measure::new(1);
        m.beats = vec![beat_with(0, vec![start]), beat_with(1, vec![other])];
        m
    }];
    let score = score_with_measures(4, measures);
    let layout = layout_score(&score, &RenderConfig::default(), 1200.0);
    assert!(layout.ties.is_empty());
}

#[test]
fn ties_only_match_within_a_track() {
    let mut start = quarter(60);
    start.tie_start = true;
    let mut end = quarter(60);
    end.tie_end = true;

    let mut score = score_with_measures(4, vec![{
        let mut m = Measure::new(1);
        m.beats = vec![beat_with(0, vec![start])];
        m
    }]);
    let mut bass = Track::new("t2", "LH", Clef::Bass);
    bass.measures = vec![{
        let mut m = Measure::new(1);
        m.beats = vec![beat_with(1, vec![end])];
        m
    }];
    score.tracks.push(bass);

    let layout = layout_score(&score, &RenderConfig::default(), 1200.0);
    assert!(layout.ties.is_empty());
}
