//! Non-blocking bridge from channel-delivering producers into a collector.
//!
//! Some drivers hand events over a channel instead of calling into the
//! collector directly. `pump_events` drains such a channel without ever
//! blocking, so it can run from any thread at whatever cadence the
//! producer side needs.

use crossbeam_channel::{Receiver, TryRecvError};

use beltane_types::MidiEvent;

use crate::collector::MidiEventCollector;

/// Move every event currently waiting in `rx` into `collector`.
///
/// Returns the number of events moved. Never blocks: stops as soon as the
/// channel is empty or disconnected.
pub fn pump_events(rx: &Receiver<MidiEvent>, collector: &MidiEventCollector) -> usize {
    let mut moved = 0;
    loop {
        match rx.try_recv() {
            Ok(event) => {
                collector.add_event(event);
                moved += 1;
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MidiEventBuffer;
    use beltane_types::MidiEventKind;

    fn note_on(note: u8) -> MidiEvent {
        MidiEvent::unstamped(MidiEventKind::NoteOn {
            channel: 1,
            note,
            velocity: 0.5,
        })
    }

    #[test]
    fn pumps_all_waiting_events() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let collector = MidiEventCollector::new();
        collector.reset(48000.0);

        tx.send(note_on(60)).unwrap();
        tx.send(note_on(61)).unwrap();
        tx.send(note_on(62)).unwrap();

        let moved = pump_events(&rx, &collector);
        assert_eq!(moved, 3);
        assert_eq!(collector.pending_len(), 3);
    }

    #[test]
    fn empty_channel_is_a_noop() {
        let (_tx, rx) = crossbeam_channel::unbounded::<MidiEvent>();
        let collector = MidiEventCollector::new();
        collector.reset(48000.0);

        assert_eq!(pump_events(&rx, &collector), 0);
        assert_eq!(collector.pending_len(), 0);
    }

    #[test]
    fn disconnected_channel_drains_remainder() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let collector = MidiEventCollector::new();
        collector.reset(48000.0);

        tx.send(note_on(60)).unwrap();
        drop(tx);

        assert_eq!(pump_events(&rx, &collector), 1);
        assert_eq!(pump_events(&rx, &collector), 0);
    }

    #[test]
    fn pumped_events_reach_the_next_block() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let collector = MidiEventCollector::new();
        collector.reset(48000.0);

        tx.send(note_on(64)).unwrap();
        pump_events(&rx, &collector);

        let mut buf = MidiEventBuffer::new();
        collector.drain_into(&mut buf, 256);
        assert_eq!(buf.len(), 1);
    }
}
