// Copyright (c) 2025 ThreadX Rust contributors
// SPDX-License-Identifier: MIT

//! Thin wrappers over the kernel calls.
//!
//! The `threadx-sys` crate carries the direct kernel API, all of it unsafe.
//! This module wraps those calls so they can be used without `unsafe`, but
//! otherwise as unchanged as possible; richer interfaces live in
//! [`crate::sync`].

pub mod sync;
pub mod thread;

use crate::time::Tick;

/// The kernel tick counter, raw.
///
/// Most code wants [`crate::time::now`], which wraps this in a time point.
#[inline]
pub fn uptime_get() -> Tick {
    unsafe { crate::raw::tx_time_get() as Tick }
}
