//! # beltane-midi
//!
//! Realtime-safe MIDI event collection and keyboard state tracking.
//!
//! Two cooperating components, composed by event flow:
//!
//! - [`KeyboardState`] tracks which keys are down per channel, accepts
//!   direct note commands or a passive event stream, and broadcasts
//!   changes synchronously to registered listeners.
//! - [`MidiEventCollector`] absorbs timestamped events from any number of
//!   producer threads and, once per block, hands the consumer a
//!   [`MidiEventBuffer`] with every event rebased into the block's sample
//!   range.
//!
//! A collector implements [`KeyboardStateListener`], so programmatic key
//! presses can ride the same queue as driver events:
//!
//! producers -> `KeyboardState` -> `MidiEventCollector::add_event` ->
//! consumer `drain_into(buffer, block_len)`.

pub mod buffer;
pub mod clock;
pub mod collector;
pub mod keyboard_state;
pub mod parse;
pub mod pump;

pub use buffer::MidiEventBuffer;
pub use collector::MidiEventCollector;
pub use keyboard_state::{KeyboardState, KeyboardStateListener};

pub use beltane_types::{MidiEvent, MidiEventKind};
