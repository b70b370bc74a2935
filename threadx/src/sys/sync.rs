// Copyright (c) 2025 ThreadX Rust contributors
// SPDX-License-Identifier: MIT

//! Kernel synchronization primitives.
//!
//! These are close wrappers over the kernel mutex and semaphore.  They are
//! usable on their own; [`crate::sync`] builds the data-owning interfaces on
//! top of them.

pub mod mutex;
pub mod semaphore;

pub use mutex::{Mutex, RecursiveMutex, RecursiveTimedMutex, StaticMutex, TimedMutex};
pub use semaphore::{BinarySemaphore, CountingSemaphore, Semaphore, StaticSemaphore};
