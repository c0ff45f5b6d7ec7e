//! scorekit — score import and layout library.
//!
//! Ingests scores from Standard MIDI Files, MusicXML (plain or
//! compressed .mxl), jianpu numbered-notation text and the two JSON
//! library shapes, normalizes everything into one canonical score
//! model, and computes a deterministic two-dimensional layout that a
//! rendering surface can paint without any music-theory reasoning of
//! its own.
//!
//! # Example
//! ```no_run
//! use scorekit::{parse_score, ScoreFormat, layout_score, RenderConfig};
//!
//! let bytes = std::fs::read("song.mid").unwrap();
//! let parsed = parse_score(ScoreFormat::Midi, &bytes).unwrap();
//! println!("Measures: {}", parsed.score.measure_count());
//! for warning in &parsed.warnings {
//!     println!("note: {warning}");
//! }
//!
//! let layout = layout_score(&parsed.score, &RenderConfig::default(), 820.0);
//! println!("Canvas: {} x {}", layout.width, layout.height);
//! ```

pub mod convert;
pub mod error;
pub mod jianpu;
pub mod layout;
pub mod midi;
pub mod model;
pub mod musicxml;
pub mod mxl;
pub mod theory;

pub use error::{ParseError, ParsedScore};
pub use layout::{layout_score, LayoutResult, RenderConfig};
pub use model::*;

/// The import formats this library understands. A closed set: dispatch
/// is a match, not an open registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreFormat {
    Midi,
    MusicXml,
    Mxl,
    Jianpu,
    LegacyJson,
    Json,
}

/// Parse raw bytes as the given format.
pub fn parse_score(format: ScoreFormat, bytes: &[u8]) -> Result<ParsedScore, ParseError> {
    match format {
        ScoreFormat::Midi => midi::parse_midi(bytes),
        ScoreFormat::Mxl => mxl::parse_mxl(bytes),
        ScoreFormat::MusicXml => musicxml::parse_musicxml(text_of(bytes)?),
        ScoreFormat::Jianpu => jianpu::parse_jianpu(text_of(bytes)?),
        ScoreFormat::LegacyJson => convert::from_legacy_json(text_of(bytes)?),
        ScoreFormat::Json => convert::score_from_json(text_of(bytes)?),
    }
}

/// Parse raw bytes, sniffing the format from the content: MIDI and ZIP
/// magic first, then XML, JSON shapes, and finally jianpu text.
pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedScore, ParseError> {
    if let Some(format) = detect_format(bytes) {
        parse_score(format, bytes)
    } else {
        Err(ParseError::MalformedInput(
            "unrecognized score format".to_string(),
        ))
    }
}

/// Best-effort format detection. Returns `None` when nothing matches.
pub fn detect_format(bytes: &[u8]) -> Option<ScoreFormat> {
    if bytes.starts_with(b"MThd") {
        return Some(ScoreFormat::Midi);
    }
    if bytes.starts_with(b"PK") {
        return Some(ScoreFormat::Mxl);
    }
    let text = std::str::from_utf8(bytes).ok()?;
    let trimmed = text.trim_start();
    if trimmed.starts_with('<') {
        return Some(ScoreFormat::MusicXml);
    }
    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        return if value.get("tracks").is_some() {
            Some(ScoreFormat::Json)
        } else {
            Some(ScoreFormat::LegacyJson)
        };
    }
    if jianpu::validate_jianpu(text) {
        return Some(ScoreFormat::Jianpu);
    }
    None
}

/// Serialize a score to pretty JSON, for the persistence collaborator.
pub fn score_to_json(score: &Score) -> Result<String, String> {
    serde_json::to_string_pretty(score).map_err(|e| format!("JSON serialization error: {e}"))
}

fn text_of(bytes: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes)
        .map_err(|e| ParseError::MalformedInput(format!("invalid UTF-8: {e}")))
}
