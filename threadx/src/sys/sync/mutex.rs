// Copyright (c) 2025 ThreadX Rust contributors
// SPDX-License-Identifier: MIT

//! Kernel mutex wrapper.
//!
//! An exclusive lock with priority inheritance, always enabled at
//! construction: while a more urgent thread waits on the lock, the owner
//! runs at the waiter's priority until release, bounding priority
//! inversion.
//!
//! The kernel mutex natively supports recursive claims by the owner and
//! bounded waits, so the one type satisfies the plain, timed and recursive
//! lock contracts; [`TimedMutex`], [`RecursiveMutex`] and
//! [`RecursiveTimedMutex`] are aliases, not separate implementations.

use core::fmt;

use crate::cpu::CriticalSection;
use crate::object::{Fixed, StaticKernelObject, Wrapped};
use crate::raw::{self, TX_MUTEX};
use crate::sys::thread::ThreadId;
use crate::time::{Forever, Instant, NoWait, Timeout};

/// A kernel mutex.
///
/// At most one thread owns the mutex at any instant, and only the owner may
/// unlock it; an unlock by anyone else is a contract violation the kernel
/// rejects, which the wrapper treats as fatal.
pub struct Mutex {
    item: Fixed<TX_MUTEX>,
}

// The kernel serializes all operations on the underlying object.
unsafe impl Sync for Mutex {}
unsafe impl Send for Mutex {}

/// The mutex already implements the timed lock contract.
pub type TimedMutex = Mutex;

/// The mutex is already recursive.
pub type RecursiveMutex = Mutex;

/// And both at once.
pub type RecursiveTimedMutex = Mutex;

impl Mutex {
    /// Construct a mutex, dynamically allocating the kernel object.
    #[cfg(feature = "alloc")]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Mutex {
        Mutex::create(Fixed::new(unsafe { core::mem::zeroed() }))
    }

    /// Create the kernel object in place, with priority inheritance on.
    pub(crate) fn create(item: Fixed<TX_MUTEX>) -> Mutex {
        let ret = unsafe { raw::tx_mutex_create(item.get(), c"mutex".as_ptr(), raw::TX_INHERIT) };
        assert_eq!(ret, raw::TX_SUCCESS, "mutex creation failed");
        Mutex { item }
    }

    fn get<T>(&self, timeout: T) -> bool
    where
        T: Into<Timeout>,
    {
        let timeout: Timeout = timeout.into();
        let ret = unsafe { raw::tx_mutex_get(self.item.get(), timeout.0) };
        ret == raw::TX_SUCCESS
    }

    /// Lock the mutex, blocking until it is lockable.
    pub fn lock(&self) {
        let ok = self.get(Forever);
        assert!(ok, "unbounded mutex lock failed");
    }

    /// Attempt to lock the mutex without blocking.
    ///
    /// Returns whether the mutex got locked.
    pub fn try_lock(&self) -> bool {
        self.get(NoWait)
    }

    /// Try to lock the mutex within the given duration.
    ///
    /// Returns whether the lock was obtained before the bound expired.
    pub fn try_lock_for<T>(&self, rel_time: T) -> bool
    where
        T: Into<Timeout>,
    {
        self.get(rel_time)
    }

    /// Try to lock the mutex until the given deadline.
    ///
    /// A deadline already in the past degenerates to a non-blocking attempt.
    pub fn try_lock_until(&self, abs_time: Instant) -> bool {
        self.get(abs_time)
    }

    /// Unlock the mutex.
    ///
    /// Must be called by the owning thread; the kernel refuses anything
    /// else, and there is no way to safely continue past that refusal.
    pub fn unlock(&self) {
        let ret = unsafe { raw::tx_mutex_put(self.item.get()) };
        assert_eq!(
            ret,
            raw::TX_SUCCESS,
            "mutex unlocked by a thread that does not own it"
        );
    }

    /// The thread currently holding the mutex, if any.
    ///
    /// Never blocks; the owner field is read under interrupt lockout.
    pub fn get_locking_thread(&self) -> Option<ThreadId> {
        CriticalSection::with(|| {
            let owner = unsafe { (*self.item.get()).tx_mutex_owner };
            ThreadId::from_ptr(owner)
        })
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        let ret = unsafe { raw::tx_mutex_delete(self.item.get()) };
        debug_assert_eq!(ret, raw::TX_SUCCESS);
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sys::Mutex {:?}", self.item.get())
    }
}

/// A statically defined kernel mutex.
///
/// Declare with [`kobj_define!`]; the [`init_once`] initializer takes no
/// argument.
///
/// [`kobj_define!`]: crate::kobj_define
/// [`init_once`]: StaticKernelObject::init_once
pub type StaticMutex = StaticKernelObject<TX_MUTEX>;

unsafe impl Sync for StaticMutex {}

impl Wrapped for StaticKernelObject<TX_MUTEX> {
    type T = Mutex;

    /// Mutex initializers take no argument.
    type I = ();

    fn get_wrapped(&self, _arg: Self::I) -> Mutex {
        Mutex::create(Fixed::Static(self.value.get()))
    }
}
