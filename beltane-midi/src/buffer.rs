//! Block-relative event buffer: the unit of exchange with the consumer.

use beltane_types::MidiEvent;

/// An ordered block of events positioned at sample offsets.
///
/// Entries are kept in non-decreasing offset order. Inserting at an
/// occupied offset places the new event after the existing ones, so
/// enqueue order is preserved for ties (a stable sort by construction).
///
/// The consumer contract: contents are valid until the next drain that
/// refills the buffer.
#[derive(Debug, Clone, Default)]
pub struct MidiEventBuffer {
    entries: Vec<(u32, MidiEvent)>,
}

impl MidiEventBuffer {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert an event at the given sample offset, after any entries
    /// already at that offset.
    pub fn add_event(&mut self, event: MidiEvent, sample_offset: u32) {
        let idx = self
            .entries
            .partition_point(|&(offset, _)| offset <= sample_offset);
        self.entries.insert(idx, (sample_offset, event));
    }

    /// Remove all events, keeping the allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(sample_offset, event)` pairs in offset order.
    pub fn iter(&self) -> impl Iterator<Item = &(u32, MidiEvent)> {
        self.entries.iter()
    }

    /// Offset of the earliest event, if any.
    pub fn first_offset(&self) -> Option<u32> {
        self.entries.first().map(|&(offset, _)| offset)
    }

    /// Offset of the latest event, if any.
    pub fn last_offset(&self) -> Option<u32> {
        self.entries.last().map(|&(offset, _)| offset)
    }
}
