//! Standard MIDI File (SMF) import parser.
//!
//! Decodes the chunked binary stream — variable-length delta times,
//! running status, channel and meta events — reconstructs notes by
//! pairing note-on/note-off, and quantizes the result into the beat
//! indexed score model. Format 0 and 1 files are accepted; format 2
//! (independent sequences) is rejected.

use std::collections::HashMap;

use crate::error::{ParseError, ParsedScore, Warnings};
use crate::model::{
    Beat, Clef, Hand, Measure, Note, Pedal, Score, ScoreMetadata, Track,
};
use crate::theory::{clamp_tempo, key_from_fifths, quantize_beats};

/// Fallback resolution when the header declares SMPTE timing.
const DEFAULT_PPQ: u32 = 480;

/// Corrupt files can claim absurd tick offsets; anything past this many
/// measures is dropped with a warning.
const MAX_MEASURES: u32 = 10_000;

/// Parse a Standard MIDI File into a score.
pub fn parse_midi(bytes: &[u8]) -> Result<ParsedScore, ParseError> {
    if bytes.len() < 14 {
        return Err(ParseError::MalformedInput(format!(
            "file too small for a MIDI header ({} bytes)",
            bytes.len()
        )));
    }
    if &bytes[0..4] != b"MThd" {
        return Err(ParseError::MalformedInput(
            "missing MThd magic".to_string(),
        ));
    }

    let header_len = read_u32(&bytes[4..8]);
    let format = read_u16(&bytes[8..10]);
    let declared_tracks = read_u16(&bytes[10..12]);
    let division = read_u16(&bytes[12..14]);

    if format > 1 {
        return Err(ParseError::UnsupportedVariant(format!(
            "MIDI format {format} is not supported (only 0 and 1)"
        )));
    }

    let mut warnings = Warnings::new();

    let ppq = if division & 0x8000 != 0 {
        warnings.push(format!(
            "SMPTE timing not supported, assuming {DEFAULT_PPQ} PPQ"
        ));
        DEFAULT_PPQ
    } else {
        (division as u32).max(1)
    };

    // ── Chunk iteration ─────────────────────────────────────────────
    let mut raw_tracks: Vec<RawTrack> = Vec::new();
    let mut pos = 8 + header_len as usize;

    while pos + 8 <= bytes.len() {
        let magic = &bytes[pos..pos + 4];
        let chunk_len = read_u32(&bytes[pos + 4..pos + 8]) as usize;
        let data_start = pos + 8;

        if data_start + chunk_len > bytes.len() {
            warnings.push(format!(
                "truncated chunk at byte {pos}, stopping"
            ));
            break;
        }

        if magic == b"MTrk" {
            raw_tracks.push(decode_track(
                &bytes[data_start..data_start + chunk_len],
                &mut warnings,
            ));
        } else if magic.iter().all(|b| b.is_ascii_graphic()) {
            // Alien chunk types are legal in SMF; skip by length.
            warnings.push(format!(
                "skipping unknown chunk '{}'",
                String::from_utf8_lossy(magic)
            ));
        } else {
            warnings.push(format!("malformed chunk at byte {pos}, stopping"));
            break;
        }

        pos = data_start + chunk_len;
    }

    if raw_tracks.is_empty() {
        return Err(ParseError::NoRecoverableContent(
            "no valid MTrk chunks found".to_string(),
        ));
    }
    if raw_tracks.len() != declared_tracks as usize {
        warnings.push(format!(
            "header declares {declared_tracks} tracks, found {}",
            raw_tracks.len()
        ));
    }

    // ── Score-level metadata: earliest meta event wins ──────────────
    let mut metadata = ScoreMetadata::default();

    let first_time = raw_tracks
        .iter()
        .flat_map(|t| t.time_sigs.iter())
        .min_by_key(|e| e.0);
    if let Some(&(_, num, den)) = first_time {
        metadata.beats_per_measure = num.max(1);
        metadata.beat_unit = den.max(1);
    }

    let mut tempo_events: Vec<(u32, u32)> = raw_tracks
        .iter()
        .flat_map(|t| t.tempos.iter().copied())
        .collect();
    tempo_events.sort_by_key(|e| e.0);
    if let Some(&(_, bpm)) = tempo_events.first() {
        let (tempo, clamped) = clamp_tempo(bpm as i64);
        if clamped {
            warnings.push(format!(
                "tempo {bpm} BPM outside supported range, defaulting to {tempo}"
            ));
        } else {
            warnings.note(format!("detected tempo: {tempo} BPM"));
        }
        metadata.tempo = tempo;
    }

    let first_key = raw_tracks
        .iter()
        .flat_map(|t| t.key_sigs.iter())
        .min_by_key(|e| e.0);
    if let Some(&(_, sf, _minor)) = first_key {
        metadata.key = key_from_fifths(sf as i32);
    }

    // ── Quantize note-bearing tracks into the model ─────────────────
    let ticks_per_measure = ppq * metadata.beats_per_measure;

    let mut tracks: Vec<Track> = Vec::new();
    for (i, raw) in raw_tracks.iter().enumerate() {
        if raw.notes.is_empty() {
            if !raw.tempos.is_empty() || !raw.time_sigs.is_empty() {
                // Conductor track (tempo map only), nothing to render.
                continue;
            }
            warnings.push(format!("track {} has no notes, dropped", i + 1));
            continue;
        }
        tracks.push(quantize_track(
            raw,
            i,
            ppq,
            ticks_per_measure,
            metadata.beats_per_measure,
            &mut warnings,
        ));
    }

    if tracks.is_empty() {
        return Err(ParseError::NoRecoverableContent(
            "no track contained any notes".to_string(),
        ));
    }

    // Pad all tracks to the same measure count (model invariant).
    let measure_count = tracks
        .iter()
        .map(|t| t.measures.len())
        .max()
        .unwrap_or(0);
    for track in &mut tracks {
        while track.measures.len() < measure_count {
            track.measures.push(Measure::new(track.measures.len() as u32 + 1));
        }
    }

    // Later tempo changes become per-measure overrides on the measure
    // their tick falls into; the timeline itself is not modeled.
    for &(tick, bpm) in tempo_events.iter().skip(1) {
        let idx = (tick / ticks_per_measure.max(1)) as usize;
        let (tempo, clamped) = clamp_tempo(bpm as i64);
        if clamped {
            continue;
        }
        if idx < measure_count {
            for track in &mut tracks {
                track.measures[idx].tempo_override = Some(tempo);
            }
        }
    }

    let title = raw_tracks
        .iter()
        .find_map(|t| t.name.clone())
        .unwrap_or_else(|| "Imported MIDI".to_string());

    let score = Score {
        id: "imported-midi".to_string(),
        title,
        subtitle: None,
        composer: None,
        arranger: None,
        metadata,
        tracks,
    };

    Ok(ParsedScore::with_warnings(score, warnings.into_vec()))
}

// ═══════════════════════════════════════════════════════════════════════
// Track chunk decoding
// ═══════════════════════════════════════════════════════════════════════

/// One note recovered by pairing note-on with note-off.
#[derive(Debug, Clone, Copy)]
struct RawNote {
    pitch: u8,
    start: u32,
    duration: u32,
}

/// Everything extracted from one MTrk chunk.
#[derive(Debug, Default)]
struct RawTrack {
    name: Option<String>,
    notes: Vec<RawNote>,
    /// (tick, BPM)
    tempos: Vec<(u32, u32)>,
    /// (tick, numerator, denominator)
    time_sigs: Vec<(u32, u32, u32)>,
    /// (tick, sharps/flats, minor)
    key_sigs: Vec<(u32, i8, bool)>,
    /// (tick, pedal down)
    pedals: Vec<(u32, bool)>,
}

/// Decode the events of one track chunk. Anomalies inside the chunk
/// stop the scan with a warning; everything decoded up to that point is
/// kept.
fn decode_track(data: &[u8], warnings: &mut Warnings) -> RawTrack {
    let mut track = RawTrack::default();
    let mut pos = 0usize;
    let mut tick = 0u32;
    let mut running_status: Option<u8> = None;
    let mut active: HashMap<u8, u32> = HashMap::new();

    while pos < data.len() {
        let Some((delta, n)) = read_vlq(&data[pos..]) else {
            warnings.push("bad delta time, abandoning rest of track".to_string());
            break;
        };
        pos += n;
        tick = tick.saturating_add(delta);

        if pos >= data.len() {
            break;
        }

        // Running status: a data byte here reuses the previous
        // channel-voice status.
        let status = if data[pos] & 0x80 != 0 {
            let s = data[pos];
            pos += 1;
            if s < 0xF0 {
                running_status = Some(s);
            }
            s
        } else {
            match running_status {
                Some(s) => s,
                None => {
                    warnings.push(
                        "data byte without running status, abandoning rest of track"
                            .to_string(),
                    );
                    break;
                }
            }
        };

        match status & 0xF0 {
            0x90 => {
                if pos + 2 > data.len() {
                    break;
                }
                let (pitch, velocity) = (data[pos], data[pos + 1]);
                pos += 2;
                if velocity == 0 {
                    close_note(&mut active, &mut track.notes, pitch, tick);
                } else {
                    if let Some(start) = active.remove(&pitch) {
                        // Retriggered pitch: close the first sounding.
                        push_note(&mut track.notes, pitch, start, tick);
                    }
                    active.insert(pitch, tick);
                }
            }
            0x80 => {
                if pos + 2 > data.len() {
                    break;
                }
                let pitch = data[pos];
                pos += 2;
                close_note(&mut active, &mut track.notes, pitch, tick);
            }
            0xB0 => {
                if pos + 2 > data.len() {
                    break;
                }
                let (controller, value) = (data[pos], data[pos + 1]);
                pos += 2;
                if controller == 64 {
                    track.pedals.push((tick, value >= 64));
                }
            }
            0xA0 | 0xE0 => pos += 2,
            0xC0 | 0xD0 => pos += 1,
            0xF0 => match status {
                0xFF => {
                    let Some(&meta_type) = data.get(pos) else { break };
                    pos += 1;
                    let Some((len, n)) = read_vlq(&data[pos..]) else { break };
                    pos += n;
                    let len = len as usize;
                    if pos + len > data.len() {
                        warnings.push("truncated meta event, abandoning rest of track".to_string());
                        break;
                    }
                    let payload = &data[pos..pos + len];
                    pos += len;
                    match meta_type {
                        0x03 if track.name.is_none() => {
                            let name = String::from_utf8_lossy(payload).trim().to_string();
                            if !name.is_empty() {
                                track.name = Some(name);
                            }
                        }
                        0x51 if len >= 3 => {
                            let micros = u32::from(payload[0]) << 16
                                | u32::from(payload[1]) << 8
                                | u32::from(payload[2]);
                            if micros > 0 {
                                track.tempos.push((tick, 60_000_000 / micros));
                            }
                        }
                        0x58 if len >= 2 => {
                            let num = payload[0] as u32;
                            let den = 1u32 << payload[1].min(6);
                            track.time_sigs.push((tick, num, den));
                        }
                        0x59 if len >= 2 => {
                            track
                                .key_sigs
                                .push((tick, payload[0] as i8, payload[1] != 0));
                        }
                        0x2F => break,
                        _ => {}
                    }
                }
                0xF0 | 0xF7 => {
                    let Some((len, n)) = read_vlq(&data[pos..]) else { break };
                    pos += n + len as usize;
                }
                _ => {
                    warnings.push(format!(
                        "unexpected status byte 0x{status:02X}, abandoning rest of track"
                    ));
                    break;
                }
            },
            // Status bytes below 0x80 were already resolved through
            // running status above.
            _ => break,
        }
    }

    if !active.is_empty() {
        warnings.push(format!(
            "{} unterminated note(s) at end of track discarded",
            active.len()
        ));
    }

    track.notes.sort_by_key(|n| n.start);
    track
}

fn close_note(
    active: &mut HashMap<u8, u32>,
    notes: &mut Vec<RawNote>,
    pitch: u8,
    tick: u32,
) {
    if let Some(start) = active.remove(&pitch) {
        push_note(notes, pitch, start, tick);
    }
}

fn push_note(notes: &mut Vec<RawNote>, pitch: u8, start: u32, end: u32) {
    if end > start {
        notes.push(RawNote {
            pitch,
            start,
            duration: end - start,
        });
    }
}

/// Read a variable-length quantity: big-endian base-128, high bit set
/// on every byte except the last. Returns the value and the number of
/// bytes consumed; `None` on truncation or overlong encodings.
fn read_vlq(data: &[u8]) -> Option<(u32, usize)> {
    let mut value = 0u32;
    for (i, &byte) in data.iter().take(4).enumerate() {
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

// ═══════════════════════════════════════════════════════════════════════
// Quantization into the model
// ═══════════════════════════════════════════════════════════════════════

/// Onsets closer to the pulse than this are considered exact.
const OFFSET_EPSILON: f64 = 1.0 / 64.0;

fn quantize_track(
    raw: &RawTrack,
    index: usize,
    ppq: u32,
    ticks_per_measure: u32,
    beats_per_measure: u32,
    warnings: &mut Warnings,
) -> Track {
    let ticks_per_measure = ticks_per_measure.max(1);

    // Hand heuristic: tracks centered at or above middle C are treble.
    let mean_pitch = raw.notes.iter().map(|n| n.pitch as f64).sum::<f64>()
        / raw.notes.len() as f64;
    let (clef, hand) = if mean_pitch >= 60.0 {
        (Clef::Treble, Hand::Right)
    } else {
        (Clef::Bass, Hand::Left)
    };

    let name = raw
        .name
        .clone()
        .unwrap_or_else(|| format!("Track {}", index + 1));
    let mut track = Track::new(format!("t{}", index + 1), name, clef);
    track.hand = Some(hand);

    // Bucket notes into measures, then into beats by rounding the
    // beat-relative onset.
    let mut dropped = 0usize;
    let mut measures: Vec<HashMap<u32, Vec<(u32, Note)>>> = Vec::new();

    for raw_note in &raw.notes {
        let measure_idx = raw_note.start / ticks_per_measure;
        if measure_idx >= MAX_MEASURES {
            dropped += 1;
            continue;
        }
        let rel_ticks = raw_note.start - measure_idx * ticks_per_measure;
        let exact_beat = rel_ticks as f64 / ppq as f64;
        let beat_idx = (exact_beat.round() as u32).min(beats_per_measure.saturating_sub(1));
        let offset = exact_beat - beat_idx as f64;

        let dur_beats = raw_note.duration as f64 / ppq as f64;
        let (duration, dots) = quantize_beats(dur_beats);

        let mut note = Note::new(raw_note.pitch, duration);
        note.dots = dots;
        if offset.abs() > OFFSET_EPSILON {
            note.offset = Some(offset);
        }
        if (dur_beats - note.actual_beats()).abs() > OFFSET_EPSILON {
            note.precise_beats = Some(dur_beats);
        }

        while measures.len() <= measure_idx as usize {
            measures.push(HashMap::new());
        }
        measures[measure_idx as usize]
            .entry(beat_idx)
            .or_default()
            .push((raw_note.start, note));
    }

    if dropped > 0 {
        warnings.push(format!(
            "{dropped} note(s) beyond measure {MAX_MEASURES} dropped"
        ));
    }

    for (mi, mut beat_buckets) in measures.into_iter().enumerate() {
        let mut measure = Measure::new(mi as u32 + 1);
        let mut indices: Vec<u32> = beat_buckets.keys().copied().collect();
        indices.sort_unstable();
        for idx in indices {
            let mut bucket = beat_buckets.remove(&idx).unwrap_or_default();
            bucket.sort_by_key(|(start, _)| *start);
            let mut beat = Beat::new(idx);
            beat.offset = bucket
                .first()
                .and_then(|(_, n)| n.offset)
                .filter(|o| o.abs() > OFFSET_EPSILON);
            beat.notes = bucket.into_iter().map(|(_, n)| n).collect();
            measure.beats.push(beat);
        }

        // Earliest sustain-pedal event falling inside this measure.
        let lo = mi as u32 * ticks_per_measure;
        let hi = lo + ticks_per_measure;
        if let Some(&(_, down)) = raw
            .pedals
            .iter()
            .find(|&&(tick, _)| tick >= lo && tick < hi)
        {
            measure.pedal = Some(if down { Pedal::Down } else { Pedal::Up });
        }

        track.measures.push(measure);
    }

    track
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vlq_decoding() {
        assert_eq!(read_vlq(&[0x00]), Some((0, 1)));
        assert_eq!(read_vlq(&[0x7F]), Some((127, 1)));
        assert_eq!(read_vlq(&[0x81, 0x00]), Some((128, 2)));
        assert_eq!(read_vlq(&[0x83, 0x60]), Some((480, 2)));
        // Truncated continuation never reads past the slice.
        assert_eq!(read_vlq(&[0x81]), None);
        assert_eq!(read_vlq(&[]), None);
    }

    #[test]
    fn running_status_reuses_previous_event() {
        // note-on C4, then a second note-on via running status.
        let data = [
            0x00, 0x90, 60, 100, // note on
            0x10, 60, 0, // running-status note off (vel 0)
            0x00, 62, 100, // running-status note on
            0x10, 62, 0,
        ];
        let mut w = Warnings::new();
        let track = decode_track(&data, &mut w);
        assert_eq!(track.notes.len(), 2);
        assert_eq!(track.notes[0].pitch, 60);
        assert_eq!(track.notes[1].pitch, 62);
    }

    #[test]
    fn unterminated_notes_are_discarded() {
        let data = [0x00, 0x90, 60, 100];
        let mut w = Warnings::new();
        let track = decode_track(&data, &mut w);
        assert!(track.notes.is_empty());
        assert!(!w.is_empty());
    }
}
