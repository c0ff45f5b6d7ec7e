//! Tie routing — matching tie-start notes to their tie-end partner and
//! building the curve between them.

use super::{Point, TieCurve};

/// The per-note facts tie matching needs, in score order.
#[derive(Debug, Clone, Copy)]
pub(super) struct TieEndpoint {
    /// Index into the layout's flat note list
    pub note_idx: usize,
    pub track: usize,
    pub pitch: u8,
    pub tie_start: bool,
    pub tie_end: bool,
    pub x: f64,
    pub y: f64,
    pub stem_up: bool,
}

/// Pair every tie-start with the next same-pitch tie-end on the same
/// track. Unmatched starts produce nothing; each end closes at most
/// one start.
pub(super) fn route_ties(endpoints: &[TieEndpoint], tie_height: f64) -> Vec<TieCurve> {
    let mut ties = Vec::new();
    let mut consumed = vec![false; endpoints.len()];

    for (i, start) in endpoints.iter().enumerate() {
        if !start.tie_start {
            continue;
        }
        let partner = endpoints
            .iter()
            .enumerate()
            .skip(i + 1)
            .find(|(j, end)| {
                !consumed[*j]
                    && end.track == start.track
                    && end.pitch == start.pitch
                    && end.tie_end
            });
        let Some((j, end)) = partner else {
            continue;
        };
        consumed[j] = true;
        ties.push(curve_between(start, end, tie_height));
    }

    ties
}

/// A cubic Bézier bulging away from the start note's stem: stem up
/// puts the tie under the noteheads, stem down puts it above.
fn curve_between(start: &TieEndpoint, end: &TieEndpoint, tie_height: f64) -> TieCurve {
    let bulge = if start.stem_up { tie_height } else { -tie_height };
    let dx = (end.x - start.x).max(0.0);

    TieCurve {
        from_note: start.note_idx,
        to_note: end.note_idx,
        start: Point {
            x: start.x,
            y: start.y + bulge * 0.35,
        },
        control1: Point {
            x: start.x + dx / 3.0,
            y: start.y + bulge,
        },
        control2: Point {
            x: end.x - dx / 3.0,
            y: end.y + bulge,
        },
        end: Point {
            x: end.x,
            y: end.y + bulge * 0.35,
        },
    }
}
