//! Layout engine — computes the two-dimensional placement of a score:
//! which measures go on which line, where every notehead sits, which
//! notes share a beam, and how tie curves run.
//!
//! The engine is a pure function of the score, the render
//! configuration and the available width. It never fails: degenerate
//! input produces a minimal empty result, since it sits on the
//! synchronous render path.

mod beams;
mod constants;
mod staff;
mod ties;

pub use constants::{RenderConfig, MIN_MEASURES_PER_LINE};
pub use staff::staff_position;

use crate::model::Score;
use beams::BeamCandidate;
use staff::{position_to_y, stem_up_for, MIDDLE_LINE};
use ties::TieEndpoint;

// ═══════════════════════════════════════════════════════════════════════
// Output structures
// ═══════════════════════════════════════════════════════════════════════

/// Rendering-ready geometry for one score. Coordinates are absolute in
/// a canvas of `width` × `height` user units, origin top-left.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayoutResult {
    pub width: f64,
    pub height: f64,
    pub lines: Vec<LineLayout>,
    pub measures: Vec<MeasureLayout>,
    pub notes: Vec<NoteLayout>,
    pub beams: Vec<BeamGroup>,
    pub ties: Vec<TieCurve>,
}

/// One line (system) of music.
#[derive(Debug, Clone, PartialEq)]
pub struct LineLayout {
    pub index: usize,
    /// Top of the treble staff
    pub treble_y: f64,
    /// Top of the bass staff, for two-staff scores
    pub bass_y: Option<f64>,
    pub first_measure: usize,
    pub measure_count: usize,
}

/// Horizontal geometry of one measure.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureLayout {
    /// Measure index within the score
    pub measure: usize,
    /// Line this measure was assigned to
    pub line: usize,
    pub x: f64,
    pub width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Placement of a single note or rest.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteLayout {
    /// Indices back into the score: track, measure, beat, note
    pub track: usize,
    pub measure: usize,
    pub beat: usize,
    pub note: usize,
    /// Notehead center
    pub x: f64,
    pub y: f64,
    pub staff_position: i32,
    pub stem_up: bool,
    /// Index into [`LayoutResult::beams`] when this note is beamed
    pub beam_group: Option<usize>,
    pub hit_box: Rect,
    /// Playback onset in beats from the start of the score
    pub start_beats: f64,
    /// Playback length in beats
    pub duration_beats: f64,
}

/// A horizontal beam over two or more notes.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamGroup {
    pub track: usize,
    pub measure: usize,
    /// Indices into [`LayoutResult::notes`]
    pub note_indices: Vec<usize>,
    pub start: Point,
    pub end: Point,
    /// Number of beam lines to draw
    pub lines: u32,
    pub stem_up: bool,
}

/// A tie curve between two same-pitch notes, as a cubic Bézier.
#[derive(Debug, Clone, PartialEq)]
pub struct TieCurve {
    pub from_note: usize,
    pub to_note: usize,
    pub start: Point,
    pub control1: Point,
    pub control2: Point,
    pub end: Point,
}

// ═══════════════════════════════════════════════════════════════════════
// Main entry point
// ═══════════════════════════════════════════════════════════════════════

/// Compute the full layout of `score` for a canvas `available_width`
/// units wide.
pub fn layout_score(score: &Score, config: &RenderConfig, available_width: f64) -> LayoutResult {
    let measure_count = score.measure_count();
    if measure_count == 0 || available_width <= 0.0 {
        return LayoutResult {
            width: available_width.max(0.0),
            ..LayoutResult::default()
        };
    }

    let beats_per_measure = score.metadata.beats_per_measure.max(1);
    let staves = score.tracks.len().min(2);

    // ── Line breaking ───────────────────────────────────────────────
    let content_width = (available_width - config.header_width).max(0.0);
    let capacity = (content_width / (config.min_beat_width * beats_per_measure as f64))
        .floor() as usize;
    let capacity = capacity.clamp(
        MIN_MEASURES_PER_LINE,
        config.max_measures_per_line.max(MIN_MEASURES_PER_LINE),
    );

    let mut lines: Vec<LineLayout> = Vec::new();
    let mut measures: Vec<MeasureLayout> = Vec::new();

    let mut first = 0usize;
    while first < measure_count {
        let count = capacity.min(measure_count - first);
        let line_index = lines.len();
        let treble_y = config.title_margin + line_index as f64 * config.line_height;
        let bass_y = (staves == 2)
            .then(|| treble_y + config.staff_height + config.staff_gap);

        // Remaining width after the header is split evenly.
        let measure_width = content_width / count as f64;
        for j in 0..count {
            measures.push(MeasureLayout {
                measure: first + j,
                line: line_index,
                x: config.header_width + j as f64 * measure_width,
                width: measure_width,
            });
        }

        lines.push(LineLayout {
            index: line_index,
            treble_y,
            bass_y,
            first_measure: first,
            measure_count: count,
        });
        first += count;
    }

    // ── Note placement, beams ───────────────────────────────────────
    let mut notes: Vec<NoteLayout> = Vec::new();
    let mut beam_groups: Vec<BeamGroup> = Vec::new();
    let mut endpoints: Vec<TieEndpoint> = Vec::new();

    for (ti, track) in score.tracks.iter().take(2).enumerate() {
        for (mi, measure) in track.measures.iter().enumerate() {
            let Some(geometry) = measures.iter().find(|m| m.measure == mi) else {
                continue;
            };
            let line = &lines[geometry.line];
            let staff_y = if ti == 0 {
                line.treble_y
            } else {
                line.bass_y.unwrap_or(line.treble_y)
            };

            let beat_width = geometry.width / beats_per_measure as f64;
            let mut measure_candidates: Vec<BeamCandidate> = Vec::new();

            for (bi, beat) in measure.beats.iter().enumerate() {
                let beat_x = geometry.x
                    + (beat.index.min(beats_per_measure - 1)) as f64 * beat_width;
                let beat_start = mi as f64 * beats_per_measure as f64
                    + beat.index as f64
                    + beat.offset.unwrap_or(0.0);

                // Pairwise spacing: beamable runs pack tight, everything
                // else gets most of the base spacing.
                let mut offsets: Vec<f64> = Vec::with_capacity(beat.notes.len());
                let mut cursor = 0.0;
                for (ni, note) in beat.notes.iter().enumerate() {
                    if ni > 0 {
                        let prev = &beat.notes[ni - 1];
                        let tight = (prev.duration.beam_count() > 0
                            && note.duration.beam_count() > 0)
                            || (prev.dots > 0 && note.duration.beam_count() > 0);
                        cursor += config.note_spacing * if tight { 0.3 } else { 0.8 };
                    }
                    offsets.push(cursor);
                }
                let run_width = offsets.last().copied().unwrap_or(0.0);
                let start_x = beat_x + (beat_width - run_width) / 2.0;

                // Short notes subdivide the beat; long notes share its
                // start as a chord.
                let sequential_count = beat
                    .notes
                    .iter()
                    .filter(|n| n.duration.beam_count() > 0)
                    .count();
                let mut sequential_seen = 0usize;

                for (ni, note) in beat.notes.iter().enumerate() {
                    let position = if note.is_rest() {
                        MIDDLE_LINE
                    } else {
                        staff::staff_position(note.pitch, track.clef)
                    };
                    let x = start_x + offsets[ni];
                    let y = position_to_y(position, staff_y, config.staff_height);

                    let (start_beats, duration_beats) =
                        if note.duration.beam_count() > 0 && sequential_count > 0 {
                            let slot = 1.0 / sequential_count as f64;
                            let start = beat_start + sequential_seen as f64 * slot;
                            sequential_seen += 1;
                            (start, slot)
                        } else {
                            (beat_start, note.sounding_beats())
                        };

                    let half = config.hit_box_size / 2.0;
                    let note_idx = notes.len();
                    notes.push(NoteLayout {
                        track: ti,
                        measure: mi,
                        beat: bi,
                        note: ni,
                        x,
                        y,
                        staff_position: position,
                        stem_up: stem_up_for(position),
                        beam_group: None,
                        hit_box: Rect {
                            x: x - half,
                            y: y - half,
                            width: config.hit_box_size,
                            height: config.hit_box_size,
                        },
                        start_beats,
                        duration_beats,
                    });

                    if !note.is_rest() && note.duration.beam_count() > 0 {
                        measure_candidates.push(BeamCandidate {
                            note_idx,
                            beat_index: beat.index,
                            x,
                            y,
                            staff_position: position,
                            beam_count: note.duration.beam_count(),
                        });
                    }
                }
            }

            for group in beams::group_beams(
                ti,
                mi,
                &measure_candidates,
                beats_per_measure,
                config.stem_length,
            ) {
                let group_idx = beam_groups.len();
                for &idx in &group.note_indices {
                    notes[idx].beam_group = Some(group_idx);
                    notes[idx].stem_up = group.stem_up;
                }
                beam_groups.push(group);
            }
        }
    }

    // ── Ties ────────────────────────────────────────────────────────
    for layout_note in &notes {
        let note = &score.tracks[layout_note.track].measures[layout_note.measure].beats
            [layout_note.beat]
            .notes[layout_note.note];
        endpoints.push(TieEndpoint {
            note_idx: endpoints.len(),
            track: layout_note.track,
            pitch: note.pitch,
            tie_start: note.tie_start,
            tie_end: note.tie_end,
            x: layout_note.x,
            y: layout_note.y,
            stem_up: layout_note.stem_up,
        });
    }
    let ties = ties::route_ties(&endpoints, config.tie_height);

    // ── Canvas size ─────────────────────────────────────────────────
    let staves_height = if staves == 2 {
        config.staff_height * 2.0 + config.staff_gap
    } else {
        config.staff_height
    };
    let height = config.title_margin
        + (lines.len().saturating_sub(1)) as f64 * config.line_height
        + staves_height
        + 40.0;

    LayoutResult {
        width: available_width,
        height,
        lines,
        measures,
        notes,
        beams: beam_groups,
        ties,
    }
}
