// Copyright (c) 2025 ThreadX Rust contributors
// SPDX-License-Identifier: MIT

//! # Kernel call errors
//!
//! Kernel services report status as a numeric code, with zero meaning
//! success.  This module wraps those codes in an `Error`/`Result` pair so
//! wrapped calls can use `?` and the usual combinators.  The code is kept
//! numeric rather than enumerated; the handful of codes the wrappers care
//! about are matched where they are produced.

use core::fmt;

use crate::raw::{TX_SUCCESS, UINT};

/// A kernel service error.
///
/// Holds the non-zero status code returned by the failing call.
pub struct Error(pub UINT);

impl core::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernel error status:{:#04x}", self.0)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernel error status:{:#04x}", self.0)
    }
}

/// Wraps a value with a possible kernel error.
pub type Result<T> = core::result::Result<T, Error>;

/// Map a kernel status code into a `Result`.
#[inline(always)]
pub fn to_result(code: UINT) -> Result<UINT> {
    if code == TX_SUCCESS {
        Ok(code)
    } else {
        Err(Error(code))
    }
}

/// Map a kernel status code, with a void result.
#[inline(always)]
pub fn to_result_void(code: UINT) -> Result<()> {
    to_result(code).map(|_| ())
}
