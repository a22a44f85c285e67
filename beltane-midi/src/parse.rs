//! Raw MIDI message parsing.
//!
//! Converts driver-level byte messages into the typed event model. Wire
//! channels 0..=15 map to 1..=16 and velocity bytes normalize to
//! 0.0..=1.0. Running status, SysEx and realtime messages are not handled.

use beltane_types::MidiEventKind;

/// Parse a raw MIDI message into a `MidiEventKind`.
///
/// A note-on with velocity 0 parses as a note-off. Returns `None` for
/// empty, truncated or unsupported messages.
pub fn parse_midi_message(data: &[u8]) -> Option<MidiEventKind> {
    if data.is_empty() {
        return None;
    }

    let status = data[0];
    let channel = (status & 0x0F) + 1;
    let message_type = status & 0xF0;

    match message_type {
        0x80 => {
            // Note Off
            if data.len() >= 3 {
                Some(MidiEventKind::NoteOff {
                    channel,
                    note: data[1] & 0x7F,
                })
            } else {
                None
            }
        }
        0x90 => {
            // Note On (velocity 0 = note off)
            if data.len() >= 3 {
                let velocity = data[2] & 0x7F;
                if velocity == 0 {
                    Some(MidiEventKind::NoteOff {
                        channel,
                        note: data[1] & 0x7F,
                    })
                } else {
                    Some(MidiEventKind::NoteOn {
                        channel,
                        note: data[1] & 0x7F,
                        velocity: velocity as f32 / 127.0,
                    })
                }
            } else {
                None
            }
        }
        0xA0 => {
            // Polyphonic Aftertouch
            if data.len() >= 3 {
                Some(MidiEventKind::PolyAftertouch {
                    channel,
                    note: data[1] & 0x7F,
                    pressure: data[2] & 0x7F,
                })
            } else {
                None
            }
        }
        0xB0 => {
            // Control Change
            if data.len() >= 3 {
                Some(MidiEventKind::ControlChange {
                    channel,
                    controller: data[1] & 0x7F,
                    value: data[2] & 0x7F,
                })
            } else {
                None
            }
        }
        0xC0 => {
            // Program Change
            if data.len() >= 2 {
                Some(MidiEventKind::ProgramChange {
                    channel,
                    program: data[1] & 0x7F,
                })
            } else {
                None
            }
        }
        0xD0 => {
            // Channel Aftertouch
            if data.len() >= 2 {
                Some(MidiEventKind::Aftertouch {
                    channel,
                    pressure: data[1] & 0x7F,
                })
            } else {
                None
            }
        }
        0xE0 => {
            // Pitch Bend
            if data.len() >= 3 {
                let lsb = (data[1] & 0x7F) as i16;
                let msb = (data[2] & 0x7F) as i16;
                let value = ((msb << 7) | lsb) - 8192; // Center at 0
                Some(MidiEventKind::PitchBend { channel, value })
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_note_on() {
        let data = [0x90, 60, 127]; // Note On, wire channel 0, note 60, full velocity
        let event = parse_midi_message(&data).unwrap();
        match event {
            MidiEventKind::NoteOn {
                channel,
                note,
                velocity,
            } => {
                assert_eq!(channel, 1);
                assert_eq!(note, 60);
                assert!((velocity - 1.0).abs() < 1e-6);
            }
            _ => panic!("Expected NoteOn"),
        }
    }

    #[test]
    fn parse_note_on_high_channel() {
        let data = [0x9F, 60, 64]; // wire channel 15 -> channel 16
        let event = parse_midi_message(&data).unwrap();
        match event {
            MidiEventKind::NoteOn {
                channel, velocity, ..
            } => {
                assert_eq!(channel, 16);
                assert!((velocity - 64.0 / 127.0).abs() < 1e-6);
            }
            _ => panic!("Expected NoteOn"),
        }
    }

    #[test]
    fn parse_note_off() {
        let data = [0x80, 60, 0];
        let event = parse_midi_message(&data).unwrap();
        match event {
            MidiEventKind::NoteOff { channel, note } => {
                assert_eq!(channel, 1);
                assert_eq!(note, 60);
            }
            _ => panic!("Expected NoteOff"),
        }
    }

    #[test]
    fn parse_note_on_velocity_zero() {
        let data = [0x90, 60, 0]; // Note On with velocity 0 = Note Off
        let event = parse_midi_message(&data).unwrap();
        assert!(matches!(event, MidiEventKind::NoteOff { .. }));
    }

    #[test]
    fn parse_pitch_bend() {
        // Center (no bend)
        let data = [0xE0, 0x00, 0x40]; // LSB=0, MSB=64 = 8192 = center
        let event = parse_midi_message(&data).unwrap();
        match event {
            MidiEventKind::PitchBend { channel, value } => {
                assert_eq!(channel, 1);
                assert_eq!(value, 0);
            }
            _ => panic!("Expected PitchBend"),
        }

        // Full up
        let data = [0xE0, 0x7F, 0x7F];
        let event = parse_midi_message(&data).unwrap();
        match event {
            MidiEventKind::PitchBend { value, .. } => {
                assert_eq!(value, 8191);
            }
            _ => panic!("Expected PitchBend"),
        }

        // Full down
        let data = [0xE0, 0x00, 0x00];
        let event = parse_midi_message(&data).unwrap();
        match event {
            MidiEventKind::PitchBend { value, .. } => {
                assert_eq!(value, -8192);
            }
            _ => panic!("Expected PitchBend"),
        }
    }

    #[test]
    fn parse_control_change() {
        let data = [0xB2, 1, 64]; // CC, wire channel 2, mod wheel, value 64
        let event = parse_midi_message(&data).unwrap();
        match event {
            MidiEventKind::ControlChange {
                channel,
                controller,
                value,
            } => {
                assert_eq!(channel, 3);
                assert_eq!(controller, 1);
                assert_eq!(value, 64);
            }
            _ => panic!("Expected ControlChange"),
        }
    }

    #[test]
    fn parse_program_change() {
        let data = [0xC0, 12];
        let event = parse_midi_message(&data).unwrap();
        assert!(matches!(
            event,
            MidiEventKind::ProgramChange {
                channel: 1,
                program: 12
            }
        ));
    }

    #[test]
    fn parse_empty_message_returns_none() {
        assert!(parse_midi_message(&[]).is_none());
    }

    #[test]
    fn parse_short_messages_return_none() {
        assert!(parse_midi_message(&[0x90, 60]).is_none());
        assert!(parse_midi_message(&[0xB0, 1]).is_none());
        assert!(parse_midi_message(&[0xE0, 0x00]).is_none());
        assert!(parse_midi_message(&[0xC0]).is_none());
    }

    #[test]
    fn parse_unknown_status_returns_none() {
        assert!(parse_midi_message(&[0x00]).is_none());
        assert!(parse_midi_message(&[0xF0, 0x01, 0x02]).is_none());
    }
}
