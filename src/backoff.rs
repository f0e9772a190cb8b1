//! Idle back-off policy between empty polls.
//!
//! A truncated exponential curve without jitter: repeated runs against the
//! same source produce identical schedules, which keeps per-call costs
//! bounded while the first poll is never delayed.

use std::time::Duration;

/// Idle delay after the first empty poll, in milliseconds.
const INITIAL_DELAY_MS: u64 = 25;

/// Empty-poll count at which the curve is pinned to the cap outright.
const SATURATION_COUNT: u32 = 20;

/// Idle delay that should follow the `empty_count`-th consecutive empty poll.
///
/// Doubles from [`INITIAL_DELAY_MS`] and is truncated at `max_idle_delay`;
/// from [`SATURATION_COUNT`] empties onward the cap is returned outright.
/// `delay_for(0, _)` is always zero, so a fresh or just-drained source is
/// polled without delay.
pub fn delay_for(empty_count: u32, max_idle_delay: Duration) -> Duration {
    if empty_count == 0 {
        return Duration::ZERO;
    }

    if empty_count >= SATURATION_COUNT {
        return max_idle_delay;
    }

    let millis = INITIAL_DELAY_MS.saturating_mul(1u64 << (empty_count - 1));
    Duration::from_millis(millis).min(max_idle_delay)
}
