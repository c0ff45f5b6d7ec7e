//! Pitch → staff position mapping and stem directions.

use crate::model::Clef;

/// Chromatic pitch class → diatonic step within the octave
/// (C C# D D# E F F# G G# A A# B). Sharps share the natural below.
const DIATONIC_STEPS: [i32; 12] = [0, 0, 1, 1, 2, 3, 3, 4, 4, 5, 5, 6];

/// Staff position of the middle line. Positions count half-steps of
/// staff space upward from the bottom line (0): lines are even,
/// spaces odd, the middle line is 4.
pub(super) const MIDDLE_LINE: i32 = 4;

/// Reference pitch sitting on the bottom line of each staff.
fn reference_pitch(clef: Clef) -> u8 {
    match clef {
        Clef::Treble => 64, // E4
        Clef::Bass => 43,   // G2
        Clef::Alto => 53,   // F3
    }
}

/// Map a MIDI pitch to its staff position for the given clef: the
/// diatonic distance from the clef's bottom-line reference, in staff
/// half-steps (7 per octave).
pub fn staff_position(pitch: u8, clef: Clef) -> i32 {
    let reference = reference_pitch(clef);
    let diatonic = |p: u8| -> i32 {
        let p = p as i32;
        (p / 12) * 7 + DIATONIC_STEPS[(p % 12) as usize]
    };
    diatonic(pitch) - diatonic(reference)
}

/// Vertical coordinate of a staff position. `staff_y` is the top line;
/// the staff spans `staff_height` down to the bottom line.
pub fn position_to_y(position: i32, staff_y: f64, staff_height: f64) -> f64 {
    // Half a staff space per position step.
    let half_space = staff_height / 8.0;
    staff_y + staff_height - position as f64 * half_space
}

/// A lone note's stem points up when its head sits below the middle
/// line.
pub fn stem_up_for(position: i32) -> bool {
    position < MIDDLE_LINE
}
