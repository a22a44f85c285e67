//! Collects timestamped events from any number of producer threads and
//! hands them to a single periodic consumer as block-relative buffers.
//!
//! The collector absorbs bursty, timestamp-incoherent events and, once per
//! block, returns a single monotonically ordered batch with every event
//! rebased onto the block's sample index range. Producers and the consumer
//! only ever contend on a brief append/snapshot-swap critical section.

use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use beltane_types::{MidiEvent, MidiEventKind};

use crate::buffer::MidiEventBuffer;
use crate::clock;
use crate::keyboard_state::KeyboardStateListener;
use crate::parse;

/// Defensive fallback when `reset` was skipped (caller contract violation).
const FALLBACK_SAMPLE_RATE: f64 = 44100.0;

/// Consumer-side clock: block origin and sample rate.
///
/// Touched only by `reset` and `drain_into` (the single consumer), so this
/// lock never contends with producers.
struct BlockClock {
    sample_rate: f64,
    /// Absolute time of sample 0 of the next block, in microseconds.
    origin_us: f64,
}

/// Thread-safe queue that accumulates incoming timestamped events and
/// drains them, rebased into a block-relative sample range, on demand
/// from a single periodic consumer.
///
/// Call [`reset`](Self::reset) before first use and whenever the sample
/// rate changes; then call [`drain_into`](Self::drain_into) once per
/// block from the consumer thread. [`add_event`](Self::add_event) is safe
/// from any number of producer threads, concurrently with the drain.
///
/// There is no backpressure: the queue grows as needed and no event is
/// ever dropped. Event rates (key presses) sit orders of magnitude below
/// block rates, so the pending set stays small in practice.
pub struct MidiEventCollector {
    pending: Mutex<Vec<MidiEvent>>,
    block_clock: Mutex<BlockClock>,
}

/// Poisoning is ignored: a panicking producer must not wedge the consumer.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MidiEventCollector {
    /// Create a collector. `reset` must be called before the first drain.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            block_clock: Mutex::new(BlockClock {
                sample_rate: 0.0,
                origin_us: 0.0,
            }),
        }
    }

    /// Clear pending events, store the sample rate and re-arm the block
    /// origin at the current time.
    ///
    /// Call from the consumer thread (or before it starts) before the
    /// first `drain_into`, and again whenever the sample rate changes.
    pub fn reset(&self, sample_rate: f64) {
        debug_assert!(sample_rate > 0.0, "sample rate must be positive");
        let sample_rate = if sample_rate > 0.0 {
            sample_rate
        } else {
            log::warn!(
                target: "midi::collector",
                "reset with non-positive sample rate {}, using {}",
                sample_rate,
                FALLBACK_SAMPLE_RATE
            );
            FALLBACK_SAMPLE_RATE
        };
        lock(&self.pending).clear();
        let mut block_clock = lock(&self.block_clock);
        block_clock.sample_rate = sample_rate;
        block_clock.origin_us = clock::now_us() as f64;
    }

    /// Append an event to the pending queue.
    ///
    /// Callable concurrently from any number of producer threads and
    /// concurrently with a single consumer's `drain_into`. An unstamped
    /// event (timestamp 0) is stamped with the current time first.
    pub fn add_event(&self, mut event: MidiEvent) {
        if event.is_unstamped() {
            event.timestamp_us = clock::now_us();
        }
        lock(&self.pending).push(event);
    }

    /// Driver-callback ingress: parse a raw MIDI message and enqueue it.
    ///
    /// `timestamp_us` of 0 means "stamp on enqueue"; drivers with
    /// hardware-level timing pass their own stamp. Unparseable bytes are
    /// dropped.
    pub fn add_raw_message(&self, bytes: &[u8], timestamp_us: u64) {
        match parse::parse_midi_message(bytes) {
            Some(kind) => self.add_event(MidiEvent::new(timestamp_us, kind)),
            None => log::debug!(
                target: "midi::collector",
                "ignoring unparseable midi message ({} bytes)",
                bytes.len()
            ),
        }
    }

    /// Number of events currently waiting for the next drain.
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Absolute time of sample 0 of the next block, in microseconds.
    pub fn block_origin_us(&self) -> f64 {
        lock(&self.block_clock).origin_us
    }

    /// The sample rate stored by the last `reset` (0 before the first).
    pub fn sample_rate(&self) -> f64 {
        lock(&self.block_clock).sample_rate
    }

    /// Move every pending event into `dest`, rebased into
    /// [0, num_samples).
    ///
    /// Call once per block from the single consumer thread, at the
    /// block's natural cadence; safe against concurrent `add_event` but
    /// not reentrant with itself. `dest` is cleared first; an empty queue
    /// yields an empty block.
    ///
    /// Rebasing: events stamped before the block window land at offset 0
    /// (late arrivals are never delivered in the past), events stamped at
    /// or past the window end land at `num_samples - 1`, and events
    /// inside the window land at `round((t - origin) * sample_rate)`.
    /// Equal offsets keep enqueue order. The block origin then advances
    /// by exactly `num_samples / sample_rate`, whether or not any events
    /// were present, so empty blocks accumulate no drift.
    pub fn drain_into(&self, dest: &mut MidiEventBuffer, num_samples: u32) {
        debug_assert!(num_samples > 0, "block length must be positive");
        dest.clear();
        if num_samples == 0 {
            return;
        }

        let (origin_us, sample_rate) = {
            let mut block_clock = lock(&self.block_clock);
            debug_assert!(
                block_clock.sample_rate > 0.0,
                "reset() must be called before drain_into()"
            );
            if block_clock.sample_rate <= 0.0 {
                // Self-heal so a skipped reset degrades instead of
                // dividing by zero; warns once since the rate is now set.
                log::warn!(
                    target: "midi::collector",
                    "drain_into before reset(), assuming {} Hz",
                    FALLBACK_SAMPLE_RATE
                );
                block_clock.sample_rate = FALLBACK_SAMPLE_RATE;
                block_clock.origin_us = clock::now_us() as f64;
            }
            let origin_us = block_clock.origin_us;
            let sample_rate = block_clock.sample_rate;
            block_clock.origin_us += num_samples as f64 * 1_000_000.0 / sample_rate;
            (origin_us, sample_rate)
        };

        // Snapshot-swap: producers only ever contend with this brief take;
        // the rebasing below runs lock-free on the snapshot.
        let events = mem::take(&mut *lock(&self.pending));

        for event in events {
            let offset = rebase(event.timestamp_us, origin_us, sample_rate, num_samples);
            dest.add_event(event, offset);
        }
    }
}

impl Default for MidiEventCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// A collector can listen to a `KeyboardState` directly, so programmatic
/// key presses ride the same queue as driver events.
impl KeyboardStateListener for MidiEventCollector {
    fn handle_note_on(&self, channel: u8, note: u8, velocity: f32) {
        self.add_event(MidiEvent::new(
            clock::now_us(),
            MidiEventKind::NoteOn {
                channel,
                note,
                velocity,
            },
        ));
    }

    fn handle_note_off(&self, channel: u8, note: u8) {
        self.add_event(MidiEvent::new(
            clock::now_us(),
            MidiEventKind::NoteOff { channel, note },
        ));
    }
}

/// Map an absolute timestamp onto the current block's sample range.
fn rebase(timestamp_us: u64, origin_us: f64, sample_rate: f64, num_samples: u32) -> u32 {
    let dt_us = timestamp_us as f64 - origin_us;
    if dt_us <= 0.0 {
        return 0;
    }
    let offset = (dt_us * sample_rate / 1_000_000.0).round();
    if offset >= num_samples as f64 {
        num_samples - 1
    } else {
        offset as u32
    }
}
