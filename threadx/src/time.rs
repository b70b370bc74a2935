//! Time in terms of the kernel tick.
//!
//! The kernel counts time in ticks of a fixed rate timer interrupt.  This
//! module wraps that counter in `fugit`-based [`Duration`] and [`Instant`]
//! types denominated in ticks, so arithmetic is exact at tick granularity.
//! Conversions from finer-grained units truncate toward zero; precision
//! below one tick is deliberately not offered.
//!
//! Kernel waits take a [`Timeout`], which anything sensible converts into:
//! a [`Duration`] (bounded relative wait), an [`Instant`] (bounded wait
//! until a deadline, evaluated against [`now`] at conversion time), or the
//! [`NoWait`] and [`Forever`] markers.  The infinite wait is a reserved
//! tick value distinct from every finite wait; finite conversions saturate
//! just below it rather than ever producing it by accident.

use crate::raw::{self, ULONG};

/// The underlying count of kernel ticks.
pub type Tick = u64;

/// The rate the kernel tick advances at, in Hz.
pub const TICK_RATE_HZ: u32 = raw::TX_TIMER_TICKS_PER_SECOND as u32;

/// Duration, measured in kernel ticks.
pub type Duration = fugit::Duration<Tick, 1, TICK_RATE_HZ>;

/// Point in time, measured in kernel ticks since the kernel started.
pub type Instant = fugit::Instant<Tick, 1, TICK_RATE_HZ>;

/// The current tick count as a time point.
///
/// Monotonically non-decreasing.  Never blocks; callable from interrupt as
/// well as thread context.
#[inline]
pub fn now() -> Instant {
    Instant::from_ticks(unsafe { raw::tx_time_get() } as Tick)
}

/// A tick count ready to pass to a kernel wait.
///
/// Zero asks the call not to block, [`TX_WAIT_FOREVER`] blocks without
/// bound, anything else is a bounded wait in ticks.
///
/// [`TX_WAIT_FOREVER`]: crate::raw::TX_WAIT_FOREVER
#[derive(Clone, Copy, Debug)]
pub struct Timeout(pub ULONG);

/// Do not block; check and return immediately.
#[derive(Clone, Copy, Debug)]
pub struct NoWait;

/// Block until the operation can complete, however long that takes.
#[derive(Clone, Copy, Debug)]
pub struct Forever;

impl From<NoWait> for Timeout {
    fn from(_: NoWait) -> Timeout {
        Timeout(raw::TX_NO_WAIT)
    }
}

impl From<Forever> for Timeout {
    fn from(_: Forever) -> Timeout {
        Timeout(raw::TX_WAIT_FOREVER)
    }
}

impl From<Duration> for Timeout {
    fn from(value: Duration) -> Timeout {
        // Saturate below the reserved infinite value so no finite duration
        // can alias it.
        let ticks = value.ticks().min(raw::TX_WAIT_FOREVER as Tick - 1);
        Timeout(ticks as ULONG)
    }
}

impl From<Instant> for Timeout {
    fn from(value: Instant) -> Timeout {
        // A deadline already behind us degenerates to a poll, never to an
        // unbounded wait.
        match value.checked_duration_since(now()) {
            Some(remaining) => remaining.into(),
            None => Timeout(raw::TX_NO_WAIT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_distinct() {
        let nowait: Timeout = NoWait.into();
        let forever: Timeout = Forever.into();
        assert_eq!(nowait.0, 0);
        assert_eq!(forever.0, raw::TX_WAIT_FOREVER);
        assert_ne!(nowait.0, forever.0);
    }

    #[test]
    fn zero_duration_is_no_wait() {
        let t: Timeout = Duration::from_ticks(0).into();
        assert_eq!(t.0, raw::TX_NO_WAIT);
    }

    #[test]
    fn finite_durations_never_reach_the_sentinel() {
        let t: Timeout = Duration::from_ticks(Tick::MAX).into();
        assert_eq!(t.0, raw::TX_WAIT_FOREVER - 1);
        let t: Timeout = Duration::from_ticks(raw::TX_WAIT_FOREVER as Tick).into();
        assert_eq!(t.0, raw::TX_WAIT_FOREVER - 1);
    }

    #[test]
    fn subtick_conversions_truncate() {
        // 19 ms at 100 Hz is one tick; the 9 ms residue is dropped.
        let t: Timeout = Duration::millis(19).into();
        assert_eq!(t.0, 1);
        let t: Timeout = Duration::millis(9).into();
        assert_eq!(t.0, 0);
    }

    #[test]
    fn past_deadlines_degenerate_to_a_poll() {
        let t: Timeout = Instant::from_ticks(0).into();
        assert_eq!(t.0, raw::TX_NO_WAIT);
    }

    #[test]
    fn future_deadlines_become_remaining_ticks() {
        let t: Timeout = (now() + Duration::from_ticks(50)).into();
        // the tick may advance between the two reads of the clock
        assert!(t.0 >= 45 && t.0 <= 50, "remaining was {}", t.0);
    }
}
