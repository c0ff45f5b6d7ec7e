//! Canonical score data model.
//!
//! Every importer normalizes into this one representation; the layout
//! engine and the external rendering/playback/persistence collaborators
//! only ever see these structures. Defaults are substituted when a
//! value is constructed — optional fields here mean "genuinely absent",
//! never "not filled in yet".

use serde::{Deserialize, Serialize};

/// A complete musical score.
///
/// Invariants: at least one track, and every track holds the same
/// number of measures (measures are added and removed in lock-step, see
/// [`crate::convert`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Stable identifier, used by the persistence collaborator
    pub id: String,
    /// Title of the piece
    pub title: String,
    /// Subtitle
    pub subtitle: Option<String>,
    /// Composer name
    pub composer: Option<String>,
    /// Arranger name
    pub arranger: Option<String>,
    /// Key, time signature, tempo and tags
    pub metadata: ScoreMetadata,
    /// Ordered list of tracks (staves)
    pub tracks: Vec<Track>,
}

/// Score-wide musical metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMetadata {
    /// Key signature
    pub key: Key,
    /// Time signature numerator
    pub beats_per_measure: u32,
    /// Time signature denominator
    pub beat_unit: u32,
    /// Tempo in BPM, always within [20, 300] after construction
    pub tempo: u32,
    /// Textual tempo marking (e.g. "Allegro")
    pub tempo_text: Option<String>,
    /// Free-form tags for the library collaborator
    pub tags: Vec<String>,
}

/// Lowest and highest tempo accepted as-is; anything outside is
/// replaced by [`DEFAULT_TEMPO`] with a warning.
pub const TEMPO_RANGE: (u32, u32) = (20, 300);
pub const DEFAULT_TEMPO: u32 = 120;

impl Default for ScoreMetadata {
    fn default() -> Self {
        Self {
            key: Key::C,
            beats_per_measure: 4,
            beat_unit: 4,
            tempo: DEFAULT_TEMPO,
            tempo_text: None,
            tags: Vec::new(),
        }
    }
}

/// One of the 15 circle-of-fifths key signatures (7 flats … 7 sharps).
///
/// Enharmonic spellings outside this set collapse onto it via
/// [`crate::theory::key_from_fifths`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    CFlat,
    GFlat,
    DFlat,
    AFlat,
    EFlat,
    BFlat,
    F,
    C,
    G,
    D,
    A,
    E,
    B,
    FSharp,
    CSharp,
}

impl Default for Key {
    fn default() -> Self {
        Key::C
    }
}

impl Key {
    /// Signed sharps (positive) or flats (negative) count.
    pub fn fifths(self) -> i32 {
        match self {
            Key::CFlat => -7,
            Key::GFlat => -6,
            Key::DFlat => -5,
            Key::AFlat => -4,
            Key::EFlat => -3,
            Key::BFlat => -2,
            Key::F => -1,
            Key::C => 0,
            Key::G => 1,
            Key::D => 2,
            Key::A => 3,
            Key::E => 4,
            Key::B => 5,
            Key::FSharp => 6,
            Key::CSharp => 7,
        }
    }

    /// Semitone offset of the tonic above C.
    pub fn tonic_semitone(self) -> i32 {
        match self {
            Key::C => 0,
            Key::DFlat | Key::CSharp => 1,
            Key::D => 2,
            Key::EFlat => 3,
            Key::E => 4,
            Key::F => 5,
            Key::GFlat | Key::FSharp => 6,
            Key::G => 7,
            Key::AFlat => 8,
            Key::A => 9,
            Key::BFlat => 10,
            Key::B | Key::CFlat => 11,
        }
    }

    /// Display name ("C", "F#", "Bb", …).
    pub fn name(self) -> &'static str {
        match self {
            Key::CFlat => "Cb",
            Key::GFlat => "Gb",
            Key::DFlat => "Db",
            Key::AFlat => "Ab",
            Key::EFlat => "Eb",
            Key::BFlat => "Bb",
            Key::F => "F",
            Key::C => "C",
            Key::G => "G",
            Key::D => "D",
            Key::A => "A",
            Key::E => "E",
            Key::B => "B",
            Key::FSharp => "F#",
            Key::CSharp => "C#",
        }
    }
}

/// A single staff's worth of music.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    /// Display name (e.g. "Piano RH")
    pub name: String,
    pub clef: Clef,
    /// Hand assignment, used for volume control and visual grouping
    pub hand: Option<Hand>,
    pub measures: Vec<Measure>,
}

impl Track {
    pub fn new(id: impl Into<String>, name: impl Into<String>, clef: Clef) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            clef,
            hand: None,
            measures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clef {
    Treble,
    Bass,
    Alto,
}

impl Default for Clef {
    fn default() -> Self {
        Clef::Treble
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hand {
    Left,
    Right,
}

/// A single measure (bar) of one track.
///
/// Numbers are 1-based and contiguous within a track; lock-step editing
/// in [`crate::convert`] renumbers after deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub number: u32,
    pub beats: Vec<Beat>,
    pub repeat: Option<RepeatSign>,
    /// House-ending (volta) number
    pub ending: Option<u32>,
    /// Dynamics marking ("p", "mf", …)
    pub dynamics: Option<String>,
    /// Sustain pedal marking in this measure
    pub pedal: Option<Pedal>,
    /// Tempo change taking effect at this measure (BPM)
    pub tempo_override: Option<u32>,
}

impl Measure {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            beats: Vec::new(),
            repeat: None,
            ending: None,
            dynamics: None,
            pedal: None,
            tempo_override: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatSign {
    Start,
    End,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pedal {
    Down,
    Up,
}

/// A group of notes starting at (approximately) one pulse of a measure.
///
/// Notes whose duration carries beams are played sequentially within
/// the beat; longer notes stack as a chord. See the layout engine for
/// the exact rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    /// Pulse index in `[0, beats_per_measure)`
    pub index: u32,
    pub notes: Vec<Note>,
    /// Fractional onset offset from the pulse, in beats, when the
    /// source timing did not land exactly on it
    pub offset: Option<f64>,
    /// Tuplet ratio (actual:normal), e.g. 3:2 for a triplet
    pub tuplet: Option<Tuplet>,
}

impl Beat {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            notes: Vec::new(),
            offset: None,
            tuplet: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuplet {
    pub actual: u32,
    pub normal: u32,
}

/// A note or rest. Pitch 0 means rest; a rest carries no tie, lyric or
/// accidental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI pitch, 0 for a rest
    pub pitch: u8,
    pub duration: NoteDuration,
    /// 0 or 1
    pub dots: u8,
    pub accidental: Accidental,
    /// Fingering number (1-5)
    pub finger: Option<u8>,
    /// Lyric syllable under this note
    pub lyric: Option<String>,
    pub articulation: Option<Articulation>,
    pub ornament: Option<Ornament>,
    pub tie_start: bool,
    pub tie_end: bool,
    /// Fractional onset offset within the beat, in beats
    pub offset: Option<f64>,
    /// Precise sounding length in beats when the quantized duration is
    /// only an approximation of the source timing
    pub precise_beats: Option<f64>,
}

impl Note {
    pub fn new(pitch: u8, duration: NoteDuration) -> Self {
        Self {
            pitch,
            duration,
            dots: 0,
            accidental: Accidental::None,
            finger: None,
            lyric: None,
            articulation: None,
            ornament: None,
            tie_start: false,
            tie_end: false,
            offset: None,
            precise_beats: None,
        }
    }

    pub fn rest(duration: NoteDuration) -> Self {
        Self::new(0, duration)
    }

    pub fn is_rest(&self) -> bool {
        self.pitch == 0
    }

    /// Notated length in beats: `duration.beats() * 1.5` when dotted.
    pub fn actual_beats(&self) -> f64 {
        let base = self.duration.beats();
        if self.dots > 0 {
            base * 1.5
        } else {
            base
        }
    }

    /// Sounding length in beats — precise timing when the source
    /// provided it, notated length otherwise.
    pub fn sounding_beats(&self) -> f64 {
        self.precise_beats.unwrap_or_else(|| self.actual_beats())
    }
}

/// Canonical note duration. Carries the beat length and the number of
/// beams/flags the duration draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteDuration {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl NoteDuration {
    /// Length in quarter-note beats.
    pub fn beats(self) -> f64 {
        match self {
            NoteDuration::Whole => 4.0,
            NoteDuration::Half => 2.0,
            NoteDuration::Quarter => 1.0,
            NoteDuration::Eighth => 0.5,
            NoteDuration::Sixteenth => 0.25,
            NoteDuration::ThirtySecond => 0.125,
        }
    }

    /// Number of beams (or flags) this duration draws. Zero means the
    /// note can never join a beam group.
    pub fn beam_count(self) -> u32 {
        match self {
            NoteDuration::Whole | NoteDuration::Half | NoteDuration::Quarter => 0,
            NoteDuration::Eighth => 1,
            NoteDuration::Sixteenth => 2,
            NoteDuration::ThirtySecond => 3,
        }
    }
}

impl Default for NoteDuration {
    fn default() -> Self {
        NoteDuration::Quarter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accidental {
    None,
    Sharp,
    Flat,
    Natural,
    DoubleSharp,
    DoubleFlat,
}

impl Default for Accidental {
    fn default() -> Self {
        Accidental::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Articulation {
    Staccato,
    Accent,
    Tenuto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ornament {
    Trill,
    Turn,
    Mordent,
    InvertedMordent,
    /// Grace note with a slash
    Acciaccatura,
    /// Grace note without a slash
    Appoggiatura,
}

impl Score {
    /// Create a score with one empty treble track.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitle: None,
            composer: None,
            arranger: None,
            metadata: ScoreMetadata::default(),
            tracks: vec![Track::new("t1", "Melody", Clef::Treble)],
        }
    }

    /// Number of measures (identical across tracks by invariant).
    pub fn measure_count(&self) -> usize {
        self.tracks.first().map_or(0, |t| t.measures.len())
    }

    /// Total duration in seconds, honoring per-measure tempo overrides.
    pub fn duration_seconds(&self) -> f64 {
        let Some(track) = self.tracks.first() else {
            return 0.0;
        };
        let mut tempo = self.metadata.tempo.max(1) as f64;
        let mut secs = 0.0;
        for measure in &track.measures {
            if let Some(t) = measure.tempo_override {
                tempo = t.max(1) as f64;
            }
            secs += self.metadata.beats_per_measure as f64 * 60.0 / tempo;
        }
        secs
    }

    /// A grand staff is exactly a right-hand treble track plus a
    /// left-hand bass track.
    pub fn is_grand_staff(&self) -> bool {
        self.tracks.len() == 2
            && self.tracks[0].clef == Clef::Treble
            && self.tracks[0].hand == Some(Hand::Right)
            && self.tracks[1].clef == Clef::Bass
            && self.tracks[1].hand == Some(Hand::Left)
    }
}
