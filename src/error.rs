//! Parse error taxonomy and the successful-parse carrier type.
//!
//! Structural failures abort the import and surface as a [`ParseError`];
//! per-element anomalies are recovered locally and recorded as warning
//! strings on the [`ParsedScore`] they survived into.

use thiserror::Error;

use crate::model::Score;

/// A failed import. Never a partial score: callers get either a
/// [`ParsedScore`] or one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Wrong magic bytes, unparsable XML, empty text.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A variant of the format we recognize but do not support
    /// (MIDI format 2, score-timewise MusicXML).
    #[error("unsupported variant: {0}")]
    UnsupportedVariant(String),

    /// The input was structurally valid but nothing usable survived
    /// parsing (zero tracks, zero parts, zero measures).
    #[error("no recoverable content: {0}")]
    NoRecoverableContent(String),
}

/// A successfully imported score plus the ordered list of human-readable
/// warnings accumulated while parsing (defaulted fields, skipped
/// elements, detected values).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScore {
    pub score: Score,
    pub warnings: Vec<String>,
}

impl ParsedScore {
    pub fn new(score: Score) -> Self {
        Self {
            score,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(score: Score, warnings: Vec<String>) -> Self {
        Self { score, warnings }
    }
}

/// Collects warnings during a parse and mirrors them to the `log` crate
/// so embedding applications see diagnostics without threading the list.
#[derive(Debug, Default)]
pub(crate) struct Warnings {
    items: Vec<String>,
}

impl Warnings {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::warn!("{msg}");
        self.items.push(msg);
    }

    pub(crate) fn note(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::debug!("{msg}");
        self.items.push(msg);
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.items
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
