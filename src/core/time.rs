//! Monotonic time sources.
//!
//! Every timestamp the compositor hands to clients is on `CLOCK_MONOTONIC`
//! in microseconds. Scheduling code never reads the clock directly; it goes
//! through [`MonotonicClock`] so simulated hardware and tests can drive time.

use std::cell::Cell;
use std::rc::Rc;

use rustix::time::{clock_gettime, ClockId};

use crate::core::errors::{ProtocolError, ProtocolResult};

const US_PER_SEC: i64 = 1_000_000;
const NS_PER_US: i64 = 1_000;
const NS_PER_SEC: u32 = 1_000_000_000;

/// A source of monotonic microseconds.
pub trait MonotonicClock {
    fn now_us(&self) -> i64;
}

/// `CLOCK_MONOTONIC` read through the kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl MonotonicClock for SystemClock {
    fn now_us(&self) -> i64 {
        let ts = clock_gettime(ClockId::Monotonic);
        ts.tv_sec as i64 * US_PER_SEC + ts.tv_nsec as i64 / NS_PER_US
    }
}

/// Manually advanced clock; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<i64>>,
}

impl ManualClock {
    pub fn new(start_us: i64) -> Self {
        Self { now: Rc::new(Cell::new(start_us)) }
    }

    pub fn set(&self, now_us: i64) {
        debug_assert!(now_us >= self.now.get(), "monotonic time went backwards");
        self.now.set(now_us);
    }

    pub fn advance(&self, delta_us: i64) {
        self.set(self.now.get() + delta_us);
    }
}

impl MonotonicClock for ManualClock {
    fn now_us(&self) -> i64 {
        self.now.get()
    }
}

/// Refresh interval in microseconds for a refresh rate in Hz.
pub fn refresh_interval_us(refresh_rate: f32) -> i64 {
    (0.5 + US_PER_SEC as f64 / refresh_rate as f64) as i64
}

/// Whether `refresh_rate` gives a usable, nonzero refresh interval.
pub fn is_valid_refresh_rate(refresh_rate: f32) -> bool {
    refresh_rate.is_finite() && refresh_rate > 0.0 && refresh_interval_us(refresh_rate) > 0
}

/// Refresh interval in nanoseconds for a refresh rate in Hz.
pub fn refresh_interval_ns(refresh_rate: f32) -> u32 {
    (0.5 + NS_PER_SEC as f64 / refresh_rate as f64) as u32
}

/// Split a timestamp into the `(tv_sec_hi, tv_sec_lo, tv_nsec)` triple used
/// on the wire.
pub fn split_timestamp(time_us: i64) -> (u32, u32, u32) {
    let secs = (time_us / US_PER_SEC) as u64;
    let nsec = ((time_us % US_PER_SEC) * NS_PER_US) as u32;
    ((secs >> 32) as u32, (secs & 0xffff_ffff) as u32, nsec)
}

/// Join a wire timestamp back into microseconds.
pub fn join_timestamp(tv_sec_hi: u32, tv_sec_lo: u32, tv_nsec: u32) -> ProtocolResult<i64> {
    if tv_nsec >= NS_PER_SEC {
        return Err(ProtocolError::InvalidTimestamp(tv_nsec));
    }
    let secs = ((tv_sec_hi as u64) << 32) | tv_sec_lo as u64;
    let time_us = secs as i128 * US_PER_SEC as i128 + (tv_nsec as i64 / NS_PER_US) as i128;
    // Beyond the representable range means "never" in practice.
    Ok(i64::try_from(time_us).unwrap_or(i64::MAX))
}
