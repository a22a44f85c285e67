//! Process-wide monotonic clock for event timestamps.
//!
//! Every timestamp in this workspace is microseconds on a single monotonic
//! timeline, anchored at the first call to [`now_us`]. The value 0 is
//! reserved as the "unstamped" sentinel on `MidiEvent`, so the counter
//! starts at 1.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Current time in microseconds on the shared monotonic timeline.
///
/// Never returns 0 and never goes backwards.
pub fn now_us() -> u64 {
    let epoch = *EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros().min(u64::MAX as u128 - 1) as u64 + 1
}
