//! Layout configuration (all lengths in rendering user units).

use serde::{Deserialize, Serialize};

/// Knobs the rendering collaborator hands to the layout engine. The
/// engine only reads this; defaults match the house rendering style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Vertical space reserved above the first line for title/composer
    pub title_margin: f64,
    /// Horizontal space reserved at line start for clef/key/time
    pub header_width: f64,
    /// Height of one five-line staff
    pub staff_height: f64,
    /// Vertical gap between the treble and bass staves of a grand staff
    pub staff_gap: f64,
    /// Vertical distance between consecutive lines (systems)
    pub line_height: f64,
    /// Base horizontal spacing between adjacent notes in a beat
    pub note_spacing: f64,
    /// Minimum horizontal width allocated per beat when breaking lines
    pub min_beat_width: f64,
    /// Upper clamp on measures per line
    pub max_measures_per_line: usize,
    /// Stem length above/below the notehead
    pub stem_length: f64,
    /// Vertical bulge of a tie curve
    pub tie_height: f64,
    /// Notehead hit-box edge length
    pub hit_box_size: f64,
}

/// Lines never hold fewer measures than this, even when the available
/// width is smaller than a single measure.
pub const MIN_MEASURES_PER_LINE: usize = 2;

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            title_margin: 70.0,
            header_width: 90.0,
            staff_height: 40.0,
            staff_gap: 60.0,
            line_height: 150.0,
            note_spacing: 28.0,
            min_beat_width: 55.0,
            max_measures_per_line: 6,
            stem_length: 30.0,
            tie_height: 12.0,
            hit_box_size: 14.0,
        }
    }
}
