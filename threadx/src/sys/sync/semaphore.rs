// Copyright (c) 2025 ThreadX Rust contributors
// SPDX-License-Identifier: MIT

//! Kernel semaphore wrapper.
//!
//! A counting signal primitive with a bounded maximum.  The kernel itself
//! gives one count per call; multi-count [`release`] is built from repeated
//! single gives, which shows through in its partial-success behavior (see
//! [`release`]).  Waiters are woken in priority order, ties by arrival; the
//! wrapper never polls before blocking, so it cannot reorder the kernel's
//! queue.
//!
//! Construction goes through the concrete types: [`BinarySemaphore`],
//! [`CountingSemaphore`], or a [`StaticSemaphore`] declared with
//! [`kobj_define!`].
//!
//! [`release`]: Semaphore::release
//! [`kobj_define!`]: crate::kobj_define

use core::ffi::CStr;
use core::fmt;
use core::ops::Deref;

use crate::cpu::CriticalSection;
use crate::error::{Error, Result};
use crate::object::{Fixed, StaticKernelObject, Wrapped};
use crate::raw::{self, TX_SEMAPHORE, ULONG};
use crate::time::{Forever, Instant, NoWait, Timeout};

/// A kernel counting semaphore.
///
/// The count stays within `[0, max]`: acquisition decrements it by exactly
/// one, and a give that would push it past `max` fails instead.
pub struct Semaphore {
    item: Fixed<TX_SEMAPHORE>,
    max: ULONG,
}

// The kernel serializes all operations on the underlying object.
unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    /// Create the kernel object in place.  Creation failure means the
    /// component cannot exist in a valid state, so it is fatal.
    pub(crate) fn create(
        item: Fixed<TX_SEMAPHORE>,
        desired: ULONG,
        max: ULONG,
        name: &'static CStr,
    ) -> Semaphore {
        let ret = unsafe { raw::tx_semaphore_create(item.get(), name.as_ptr(), desired.min(max)) };
        assert_eq!(ret, raw::TX_SUCCESS, "semaphore creation failed");
        Semaphore { item, max }
    }

    fn get<T>(&self, timeout: T) -> bool
    where
        T: Into<Timeout>,
    {
        let timeout: Timeout = timeout.into();
        let ret = unsafe { raw::tx_semaphore_get(self.item.get(), timeout.0) };
        ret == raw::TX_SUCCESS
    }

    /// Wait indefinitely until the semaphore is available, then take it.
    pub fn acquire(&self) {
        let ok = self.get(Forever);
        assert!(ok, "unbounded semaphore acquire failed");
    }

    /// Take the semaphore if it is available, without blocking.
    ///
    /// Returns whether a count was taken.
    pub fn try_acquire(&self) -> bool {
        self.get(NoWait)
    }

    /// Try to take the semaphore within the given duration.
    ///
    /// Returns whether a count was taken before the bound expired.  On
    /// expiry the count is untouched.
    pub fn try_acquire_for<T>(&self, rel_time: T) -> bool
    where
        T: Into<Timeout>,
    {
        self.get(rel_time)
    }

    /// Try to take the semaphore until the given deadline.
    ///
    /// A deadline already in the past degenerates to a non-blocking attempt.
    pub fn try_acquire_until(&self, abs_time: Instant) -> bool {
        self.get(abs_time)
    }

    /// Make the semaphore available `update` times.
    ///
    /// The kernel gives a single count per call, so this is `update`
    /// sequential gives, each refused if the count already sits at the
    /// maximum.  A refusal partway through stops the sequence and is
    /// returned as the error, with the earlier gives left in place: release
    /// is best-effort up to `update`, not all-or-nothing.
    ///
    /// A waiter of higher priority than the caller becomes runnable on the
    /// give that satisfies it.
    pub fn release(&self, update: ULONG) -> Result<()> {
        for _ in 0..update {
            let ret = unsafe { raw::tx_semaphore_ceiling_put(self.item.get(), self.max) };
            if ret != raw::TX_SUCCESS {
                return Err(Error(ret));
            }
        }
        Ok(())
    }

    /// Snapshot of the current count.
    ///
    /// Never blocks; callable from interrupt context.
    pub fn get_count(&self) -> ULONG {
        CriticalSection::with(|| unsafe { (*self.item.get()).tx_semaphore_count })
    }

    /// The maximum the count can reach.
    pub fn max(&self) -> ULONG {
        self.max
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        let ret = unsafe { raw::tx_semaphore_delete(self.item.get()) };
        debug_assert_eq!(ret, raw::TX_SUCCESS);
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sys::Semaphore")
    }
}

/// A semaphore whose count is either 0 or 1.
pub struct BinarySemaphore {
    sem: Semaphore,
}

impl BinarySemaphore {
    /// Maximum value of the internal counter.
    pub const MAX: ULONG = 1;

    /// Construct a binary semaphore with the given initial count.
    #[cfg(feature = "alloc")]
    pub fn new(desired: ULONG) -> BinarySemaphore {
        BinarySemaphore {
            sem: Semaphore::create(
                Fixed::new(unsafe { core::mem::zeroed() }),
                desired,
                Self::MAX,
                c"binary_semaphore",
            ),
        }
    }

    /// Construct a binary semaphore over caller-provided storage.
    ///
    /// Safety: `item` must stay at its address, zero-initialized and unused
    /// by anything else, until the returned semaphore is dropped.
    pub(crate) unsafe fn new_in(item: *mut TX_SEMAPHORE, desired: ULONG) -> BinarySemaphore {
        BinarySemaphore {
            sem: Semaphore::create(Fixed::Static(item), desired, Self::MAX, c"binary_semaphore"),
        }
    }
}

impl Deref for BinarySemaphore {
    type Target = Semaphore;

    fn deref(&self) -> &Semaphore {
        &self.sem
    }
}

/// A semaphore whose count is bounded by `MAX`.
pub struct CountingSemaphore<const MAX: u32> {
    sem: Semaphore,
}

impl<const MAX: u32> CountingSemaphore<MAX> {
    /// Maximum value of the internal counter.
    pub const MAX: ULONG = MAX as ULONG;

    /// Construct a counting semaphore with the given initial count.
    #[cfg(feature = "alloc")]
    pub fn new(desired: ULONG) -> CountingSemaphore<MAX> {
        CountingSemaphore {
            sem: Semaphore::create(
                Fixed::new(unsafe { core::mem::zeroed() }),
                desired,
                Self::MAX,
                c"counting_semaphore",
            ),
        }
    }
}

impl<const MAX: u32> Deref for CountingSemaphore<MAX> {
    type Target = Semaphore;

    fn deref(&self) -> &Semaphore {
        &self.sem
    }
}

/// A statically defined kernel semaphore.
///
/// Declare with [`kobj_define!`]; the initializer for [`init_once`] is
/// `(desired, max)`.
///
/// [`kobj_define!`]: crate::kobj_define
/// [`init_once`]: StaticKernelObject::init_once
pub type StaticSemaphore = StaticKernelObject<TX_SEMAPHORE>;

unsafe impl Sync for StaticSemaphore {}

impl Wrapped for StaticKernelObject<TX_SEMAPHORE> {
    type T = Semaphore;

    /// The initializer is the initial count and the count limit.
    type I = (ULONG, ULONG);

    fn get_wrapped(&self, arg: Self::I) -> Semaphore {
        Semaphore::create(Fixed::Static(self.value.get()), arg.0, arg.1, c"semaphore")
    }
}
