//! Beam grouping — which beamable notes share a beam, and where the
//! beam sits.

use super::staff::MIDDLE_LINE;
use super::{BeamGroup, Point};

/// A beamable note inside one measure, in placement order.
#[derive(Debug, Clone, Copy)]
pub(super) struct BeamCandidate {
    /// Index into the layout's flat note list
    pub note_idx: usize,
    pub beat_index: u32,
    pub x: f64,
    pub y: f64,
    pub staff_position: i32,
    pub beam_count: u32,
}

/// Which half of the measure a beat belongs to. Beams never cross the
/// half boundary: 4/4 splits at beat 2, 3/4 after beat 0, 2/4 and
/// everything else keeps every beat to itself.
pub(super) fn measure_half(beat_index: u32, beats_per_measure: u32) -> u32 {
    match beats_per_measure {
        4 => u32::from(beat_index >= 2),
        3 => u32::from(beat_index >= 1),
        _ => beat_index,
    }
}

/// Group one measure's beamable notes into beams.
///
/// Notes are first bucketed by beat index, then adjacent buckets merge
/// when their indices are numerically consecutive and fall in the same
/// half of the measure. Only merged groups of at least two notes
/// produce a visible beam.
pub(super) fn group_beams(
    track: usize,
    measure: usize,
    candidates: &[BeamCandidate],
    beats_per_measure: u32,
    stem_length: f64,
) -> Vec<BeamGroup> {
    if candidates.is_empty() {
        return Vec::new();
    }

    // Bucket by raw beat index, preserving placement order.
    let mut buckets: Vec<(u32, Vec<BeamCandidate>)> = Vec::new();
    for &cand in candidates {
        match buckets.last_mut() {
            Some((idx, bucket)) if *idx == cand.beat_index => bucket.push(cand),
            _ => buckets.push((cand.beat_index, vec![cand])),
        }
    }

    // Merge consecutive buckets within the same half-measure.
    let mut merged: Vec<Vec<BeamCandidate>> = Vec::new();
    let mut last_index: Option<u32> = None;
    for (idx, bucket) in buckets {
        let joinable = last_index.is_some_and(|prev| {
            idx == prev + 1
                && measure_half(prev, beats_per_measure)
                    == measure_half(idx, beats_per_measure)
        });
        if joinable {
            merged.last_mut().unwrap().extend(bucket);
        } else {
            merged.push(bucket);
        }
        last_index = Some(idx);
    }

    merged
        .into_iter()
        .filter(|group| group.len() >= 2)
        .map(|group| {
            let mean_position = group.iter().map(|c| c.staff_position as f64).sum::<f64>()
                / group.len() as f64;
            let stem_up = mean_position < MIDDLE_LINE as f64;

            // The beam is horizontal, one stem length beyond the
            // extreme notehead of the group.
            let beam_y = if stem_up {
                group
                    .iter()
                    .map(|c| c.y)
                    .fold(f64::INFINITY, f64::min)
                    - stem_length
            } else {
                group
                    .iter()
                    .map(|c| c.y)
                    .fold(f64::NEG_INFINITY, f64::max)
                    + stem_length
            };

            BeamGroup {
                track,
                measure,
                note_indices: group.iter().map(|c| c.note_idx).collect(),
                start: Point {
                    x: group.first().unwrap().x,
                    y: beam_y,
                },
                end: Point {
                    x: group.last().unwrap().x,
                    y: beam_y,
                },
                lines: group.iter().map(|c| c.beam_count).min().unwrap_or(1),
                stem_up,
            }
        })
        .collect()
}
