//! Per-channel, per-note key state tracking with listener broadcast.
//!
//! `KeyboardState` keeps a 16-channel x 128-note matrix of which keys are
//! currently down, driven either by direct `note_on`/`note_off` calls or
//! by passively scanning an event stream. State changes are broadcast
//! synchronously to registered listeners on the mutating thread.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use beltane_types::{MidiEvent, MidiEventKind};

use crate::buffer::MidiEventBuffer;
use crate::clock;

/// Channel mode controllers that silence a whole channel.
const CC_ALL_SOUND_OFF: u8 = 120;
const CC_ALL_NOTES_OFF: u8 = 123;

/// Receives key up/down notifications from a `KeyboardState`.
///
/// Callbacks run synchronously on whichever thread mutated the state —
/// possibly a device or audio callback thread — so they must return
/// promptly and must not block or touch UI.
pub trait KeyboardStateListener: Send + Sync {
    /// A key went down, or re-triggered while already down.
    fn handle_note_on(&self, channel: u8, note: u8, velocity: f32);

    /// A key went up.
    fn handle_note_off(&self, channel: u8, note: u8);
}

/// Tracks which keys are down for each of the 16 MIDI channels.
///
/// Direct `note_on`/`note_off` calls update the matrix, stage a
/// synthesized event for later injection into an outgoing block, and
/// notify listeners. The passive path (`process_event`,
/// `process_next_block`) applies externally sourced events to the matrix
/// and notifies without re-staging, since those events already exist in
/// the stream that produced them.
///
/// All methods take `&self` and are safe to call from any thread. The
/// matrix, the staging buffer and the listener list are guarded by three
/// separate narrow locks; no lock is ever held while a listener runs.
pub struct KeyboardState {
    /// One 16-bit channel mask per note: bit c-1 set = note on for channel c.
    note_states: Mutex<[u16; 128]>,
    /// Synthesized events from note_on/note_off awaiting injection.
    staged: Mutex<Vec<MidiEvent>>,
    /// Registered listeners. Weak: ownership stays with the registrant.
    listeners: Mutex<Vec<Weak<dyn KeyboardStateListener>>>,
}

/// Poisoning is ignored throughout: a panicking listener or producer must
/// not permanently wedge the realtime path.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn valid_note(channel: u8, note: u8) -> bool {
    (1..=16).contains(&channel) && note <= 127
}

impl KeyboardState {
    pub fn new() -> Self {
        Self {
            note_states: Mutex::new([0u16; 128]),
            staged: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Clear all channels without emitting events.
    ///
    /// The staging buffer is discarded as well; listener registrations
    /// survive. Use [`all_notes_off`](Self::all_notes_off) to release keys
    /// audibly instead.
    pub fn reset(&self) {
        lock(&self.note_states).fill(0);
        lock(&self.staged).clear();
    }

    /// True if `note` is down on `channel` (1..=16).
    ///
    /// Out-of-range channel or note returns false, never panics.
    pub fn is_note_on(&self, channel: u8, note: u8) -> bool {
        if !valid_note(channel, note) {
            return false;
        }
        lock(&self.note_states)[note as usize] & (1u16 << (channel - 1)) != 0
    }

    /// True if `note` is down on any channel selected by `channel_mask`
    /// (bit 0 = channel 1, bit 15 = channel 16).
    pub fn is_note_on_for_channels(&self, channel_mask: u16, note: u8) -> bool {
        if note > 127 {
            return false;
        }
        lock(&self.note_states)[note as usize] & channel_mask != 0
    }

    /// Turn a note on: update the matrix, stage a synthesized note-on
    /// stamped "now", and notify listeners on the calling thread.
    ///
    /// A note-on for an already-down key leaves the matrix unchanged but
    /// still stages an event and still notifies — downstream synths use
    /// the re-trigger. A velocity of 0 (or less) is a note-off by MIDI
    /// convention and is routed to [`note_off`](Self::note_off).
    pub fn note_on(&self, channel: u8, note: u8, velocity: f32) {
        if velocity <= 0.0 {
            self.note_off(channel, note);
            return;
        }
        self.apply_note_on(channel, note, velocity, true);
    }

    /// Turn a note off: update the matrix, stage a synthesized note-off,
    /// and notify listeners.
    ///
    /// If the note is not down for the channel this does nothing: no state
    /// change, no staged event, no notification.
    pub fn note_off(&self, channel: u8, note: u8) {
        self.apply_note_off(channel, note, true);
    }

    /// Turn off every currently-down note on `channel`, with full
    /// [`note_off`](Self::note_off) semantics per note. Channel 0 is a
    /// sentinel meaning all 16 channels.
    pub fn all_notes_off(&self, channel: u8) {
        if channel == 0 {
            for ch in 1..=16 {
                self.all_notes_off(ch);
            }
            return;
        }
        debug_assert!(channel <= 16, "all_notes_off channel out of range");
        if channel > 16 {
            log::warn!(
                target: "midi::keyboard",
                "ignoring all_notes_off for out-of-range channel {}",
                channel
            );
            return;
        }
        for note in self.notes_on_for_channel(channel) {
            self.note_off(channel, note);
        }
    }

    /// Passive-observation path: apply an externally sourced event to the
    /// matrix and notify listeners, without re-staging it.
    ///
    /// A note-on with velocity 0 is treated as a note-off, the same
    /// convention as everywhere else. Control changes 120 (all sound off)
    /// and 123 (all notes off) release every down note on their channel.
    /// Other kinds pass through untouched.
    pub fn process_event(&self, event: &MidiEvent) {
        match event.kind {
            MidiEventKind::NoteOn {
                channel,
                note,
                velocity,
            } => {
                if velocity > 0.0 {
                    self.apply_note_on(channel, note, velocity, false);
                } else {
                    self.apply_note_off(channel, note, false);
                }
            }
            MidiEventKind::NoteOff { channel, note } => {
                self.apply_note_off(channel, note, false);
            }
            MidiEventKind::ControlChange {
                channel, controller, ..
            } if controller == CC_ALL_SOUND_OFF || controller == CC_ALL_NOTES_OFF => {
                for note in self.notes_on_for_channel(channel) {
                    self.apply_note_off(channel, note, false);
                }
            }
            _ => {}
        }
    }

    /// Scan a block of events, updating the matrix and notifying
    /// listeners, then merge the staged synthesized events into the block
    /// if `inject_indirect_events` is set.
    ///
    /// The staging buffer is cleared either way; call this regularly for
    /// staged events to reach the stream. To process one event at a time
    /// use [`process_event`](Self::process_event).
    pub fn process_next_block(
        &self,
        buffer: &mut MidiEventBuffer,
        start_sample: u32,
        num_samples: u32,
        inject_indirect_events: bool,
    ) {
        for &(_, event) in buffer.iter() {
            self.process_event(&event);
        }
        if inject_indirect_events {
            self.inject_staged_events(buffer, start_sample, num_samples);
        } else {
            lock(&self.staged).clear();
        }
    }

    /// Merge staged synthesized events into `buffer`, scoped to
    /// [start_sample, start_sample + num_samples), and clear the staging
    /// buffer.
    ///
    /// Staged timestamps are mapped proportionally across the block so
    /// relative spacing survives; ties keep staging order.
    pub fn inject_staged_events(
        &self,
        buffer: &mut MidiEventBuffer,
        start_sample: u32,
        num_samples: u32,
    ) {
        debug_assert!(num_samples > 0, "inject_staged_events needs a positive block");
        if num_samples == 0 {
            return;
        }
        let staged = mem::take(&mut *lock(&self.staged));
        if staged.is_empty() {
            return;
        }

        let first = staged.iter().map(|e| e.timestamp_us).min().unwrap_or(0);
        let last = staged.iter().map(|e| e.timestamp_us).max().unwrap_or(0);
        let scale = num_samples as f64 / (last + 1 - first) as f64;

        for event in staged {
            let pos = ((event.timestamp_us - first) as f64 * scale).round() as u32;
            buffer.add_event(event, start_sample + pos.min(num_samples - 1));
        }
    }

    /// Register a listener for key up/down callbacks.
    ///
    /// Identity-based: registering the same listener twice is a no-op.
    /// Safe to call at any time, including from within a callback.
    pub fn add_listener(&self, listener: &Arc<dyn KeyboardStateListener>) {
        let mut listeners = lock(&self.listeners);
        listeners.retain(|weak| weak.strong_count() > 0);
        let already = listeners.iter().any(|weak| {
            weak.upgrade()
                .map_or(false, |existing| Arc::ptr_eq(&existing, listener))
        });
        if !already {
            listeners.push(Arc::downgrade(listener));
        }
    }

    /// Deregister a listener. A listener removed mid-dispatch is not
    /// invoked again for that dispatch.
    pub fn remove_listener(&self, listener: &Arc<dyn KeyboardStateListener>) {
        lock(&self.listeners).retain(|weak| match weak.upgrade() {
            Some(existing) => !Arc::ptr_eq(&existing, listener),
            None => false,
        });
    }

    fn notes_on_for_channel(&self, channel: u8) -> Vec<u8> {
        if !(1..=16).contains(&channel) {
            return Vec::new();
        }
        let mask = 1u16 << (channel - 1);
        let states = lock(&self.note_states);
        (0u8..128).filter(|&n| states[n as usize] & mask != 0).collect()
    }

    fn apply_note_on(&self, channel: u8, note: u8, velocity: f32, stage: bool) {
        debug_assert!(valid_note(channel, note), "note_on out of range");
        if !valid_note(channel, note) {
            log::warn!(
                target: "midi::keyboard",
                "ignoring out-of-range note_on: channel {} note {}",
                channel,
                note
            );
            return;
        }
        let velocity = velocity.min(1.0);
        {
            let mut states = lock(&self.note_states);
            states[note as usize] |= 1u16 << (channel - 1);
        }
        if stage {
            lock(&self.staged).push(MidiEvent::new(
                clock::now_us(),
                MidiEventKind::NoteOn {
                    channel,
                    note,
                    velocity,
                },
            ));
        }
        self.notify_note_on(channel, note, velocity);
    }

    fn apply_note_off(&self, channel: u8, note: u8, stage: bool) {
        debug_assert!(valid_note(channel, note), "note_off out of range");
        if !valid_note(channel, note) {
            log::warn!(
                target: "midi::keyboard",
                "ignoring out-of-range note_off: channel {} note {}",
                channel,
                note
            );
            return;
        }
        let mask = 1u16 << (channel - 1);
        let was_on = {
            let mut states = lock(&self.note_states);
            let was = states[note as usize] & mask != 0;
            states[note as usize] &= !mask;
            was
        };
        if !was_on {
            return;
        }
        if stage {
            lock(&self.staged).push(MidiEvent::new(
                clock::now_us(),
                MidiEventKind::NoteOff { channel, note },
            ));
        }
        self.notify_note_off(channel, note);
    }

    // Dispatch discipline: snapshot the list under the lock, invoke outside
    // it, and re-confirm registration immediately before each call so a
    // listener removed mid-dispatch is skipped.

    fn notify_note_on(&self, channel: u8, note: u8, velocity: f32) {
        for weak in self.listener_snapshot() {
            if let Some(listener) = weak.upgrade() {
                if self.still_registered(&weak) {
                    listener.handle_note_on(channel, note, velocity);
                }
            }
        }
    }

    fn notify_note_off(&self, channel: u8, note: u8) {
        for weak in self.listener_snapshot() {
            if let Some(listener) = weak.upgrade() {
                if self.still_registered(&weak) {
                    listener.handle_note_off(channel, note);
                }
            }
        }
    }

    fn listener_snapshot(&self) -> Vec<Weak<dyn KeyboardStateListener>> {
        lock(&self.listeners).clone()
    }

    fn still_registered(&self, weak: &Weak<dyn KeyboardStateListener>) -> bool {
        lock(&self.listeners)
            .iter()
            .any(|registered| Weak::ptr_eq(registered, weak))
    }
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}
