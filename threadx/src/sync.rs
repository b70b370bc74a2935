//! Higher level synchronization primitives.
//!
//! These wrap the `sys` primitives in interfaces shaped like the ones in
//! `std::sync`, coordinating with Rust's sharing rules: the [`Mutex`] here
//! owns the data it protects and hands out access through an RAII guard.

mod mutex;

pub use mutex::{LockResult, Mutex, MutexGuard, TryLockError, TryLockResult};

pub mod atomic {
    //! Atomic types, from `portable-atomic` so every target gets the full
    //! set.
    pub use portable_atomic::*;
}

#[cfg(feature = "alloc")]
pub use portable_atomic_util::Arc;
