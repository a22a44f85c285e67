//! The MIDI event model shared across crates.

use serde::{Deserialize, Serialize};

/// A timestamped MIDI event.
///
/// The timestamp is microseconds on a process-wide monotonic timeline
/// (see `beltane_midi::clock`). A value of 0 means "not yet stamped":
/// the collector stamps such events with the current time on enqueue.
/// Events are value types; once enqueued they are never mutated, only
/// copied and positioned into block-relative buffers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MidiEvent {
    /// Event timestamp in microseconds (0 = unstamped)
    pub timestamp_us: u64,
    /// The actual MIDI event data
    pub kind: MidiEventKind,
}

/// The specific type of MIDI event.
///
/// Channels are 1..=16 (wire channels 0..=15 are mapped up at the parse
/// boundary), notes are 0..=127, velocity is normalized to 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MidiEventKind {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: f32,
    },
    NoteOff {
        channel: u8,
        note: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    PitchBend {
        channel: u8,
        /// Pitch bend value: -8192 (full down) to +8191 (full up), 0 = center
        value: i16,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
    Aftertouch {
        channel: u8,
        pressure: u8,
    },
    PolyAftertouch {
        channel: u8,
        note: u8,
        pressure: u8,
    },
}

impl MidiEvent {
    /// Create a new MidiEvent with an explicit timestamp.
    pub fn new(timestamp_us: u64, kind: MidiEventKind) -> Self {
        Self { timestamp_us, kind }
    }

    /// Create an unstamped event; the collector stamps it on enqueue.
    pub fn unstamped(kind: MidiEventKind) -> Self {
        Self {
            timestamp_us: 0,
            kind,
        }
    }

    /// True if this event has not been stamped yet.
    pub fn is_unstamped(&self) -> bool {
        self.timestamp_us == 0
    }
}

impl MidiEventKind {
    /// The MIDI channel (1..=16) the event addresses.
    pub fn channel(&self) -> u8 {
        match *self {
            MidiEventKind::NoteOn { channel, .. }
            | MidiEventKind::NoteOff { channel, .. }
            | MidiEventKind::ControlChange { channel, .. }
            | MidiEventKind::PitchBend { channel, .. }
            | MidiEventKind::ProgramChange { channel, .. }
            | MidiEventKind::Aftertouch { channel, .. }
            | MidiEventKind::PolyAftertouch { channel, .. } => channel,
        }
    }

    /// The note number, for note-on/note-off events.
    pub fn note(&self) -> Option<u8> {
        match *self {
            MidiEventKind::NoteOn { note, .. } | MidiEventKind::NoteOff { note, .. } => Some(note),
            _ => None,
        }
    }

    /// True for a note-on that actually starts a note (velocity > 0).
    ///
    /// A note-on with velocity 0 is a note-off by MIDI convention and
    /// reports false here; see `is_note_off`.
    pub fn is_note_on(&self) -> bool {
        matches!(*self, MidiEventKind::NoteOn { velocity, .. } if velocity > 0.0)
    }

    /// True for a note-off, including the velocity-zero note-on form.
    pub fn is_note_off(&self) -> bool {
        match *self {
            MidiEventKind::NoteOff { .. } => true,
            MidiEventKind::NoteOn { velocity, .. } => velocity <= 0.0,
            _ => false,
        }
    }
}
