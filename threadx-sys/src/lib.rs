// Copyright (c) 2025 ThreadX Rust contributors
// SPDX-License-Identifier: MIT

//! Direct kernel API for the `threadx` wrappers.
//!
//! This crate contains the kernel-facing surface the safe wrappers are built
//! on: the kernel object records, the status and option constants, and the
//! primitive calls (`tx_thread_*`, `tx_mutex_*`, `tx_semaphore_*`, timing and
//! interrupt control).  All of the calls are `unsafe`; the safety argument
//! lives in the `threadx` crate, which enforces the object-lifetime and
//! calling-context rules the kernel assumes.
//!
//! The API is supplied by a port.  The only port shipped here is the
//! `hosted` port (enabled by default), which implements the whole surface on
//! top of the host OS threading primitives so that the wrappers can be
//! exercised on a development machine.  A real target would provide these
//! symbols from the kernel itself and leave the `hosted` feature off.
//!
//! Kernel objects are plain records located at a fixed address for their
//! entire lifetime.  They are created in place by the `*_create` calls,
//! must not be moved or copied while created, and carry a small number of
//! fields the wrappers read directly (current count, current owner, thread
//! state) under interrupt lockout.

#![no_std]
#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]

#[cfg(feature = "hosted")]
extern crate std;

use core::ffi::c_void;

/// Unsigned kernel status / option type.
pub type UINT = core::ffi::c_uint;
/// Unsigned kernel count / tick type.  Wide enough to carry a pointer on the
/// hosted port, as on other LP64 ports of the kernel.
pub type ULONG = core::ffi::c_ulong;
/// Kernel character type for object names.
pub type CHAR = core::ffi::c_char;

/// Thread entry function: receives the single word-sized creation argument.
pub type tx_thread_entry_t = Option<unsafe extern "C" fn(ULONG)>;

/// Entry/exit notification callback: invoked with the thread and a reason
/// code ([`TX_THREAD_ENTRY`] or [`TX_THREAD_EXIT`]).
pub type tx_entry_exit_notify_t = Option<unsafe extern "C" fn(*mut TX_THREAD, UINT)>;

// Service return codes.
pub const TX_SUCCESS: UINT = 0x00;
pub const TX_DELETED: UINT = 0x01;
pub const TX_PTR_ERROR: UINT = 0x03;
pub const TX_WAIT_ERROR: UINT = 0x04;
pub const TX_SIZE_ERROR: UINT = 0x05;
pub const TX_SEMAPHORE_ERROR: UINT = 0x0C;
pub const TX_NO_INSTANCE: UINT = 0x0D;
pub const TX_THREAD_ERROR: UINT = 0x0E;
pub const TX_PRIORITY_ERROR: UINT = 0x0F;
pub const TX_DELETE_ERROR: UINT = 0x11;
pub const TX_RESUME_ERROR: UINT = 0x12;
pub const TX_CALLER_ERROR: UINT = 0x13;
pub const TX_SUSPEND_ERROR: UINT = 0x14;
pub const TX_SUSPEND_LIFTED: UINT = 0x19;
pub const TX_WAIT_ABORTED: UINT = 0x1A;
pub const TX_MUTEX_ERROR: UINT = 0x1C;
pub const TX_NOT_AVAILABLE: UINT = 0x1D;
pub const TX_NOT_OWNED: UINT = 0x1E;
pub const TX_CEILING_EXCEEDED: UINT = 0x21;
pub const TX_INVALID_CEILING: UINT = 0x22;

// Wait options.
pub const TX_NO_WAIT: ULONG = 0;
pub const TX_WAIT_FOREVER: ULONG = 0xFFFF_FFFF;

// Thread creation options.
pub const TX_DONT_START: UINT = 0;
pub const TX_AUTO_START: UINT = 1;
pub const TX_NO_TIME_SLICE: ULONG = 0;

// Mutex creation options.
pub const TX_NO_INHERIT: UINT = 0;
pub const TX_INHERIT: UINT = 1;

// Entry/exit notification reason codes.
pub const TX_THREAD_ENTRY: UINT = 0;
pub const TX_THREAD_EXIT: UINT = 1;

// Thread state values held in `tx_thread_state`.
pub const TX_READY: UINT = 0;
pub const TX_COMPLETED: UINT = 1;
pub const TX_TERMINATED: UINT = 2;
pub const TX_SUSPENDED: UINT = 3;
pub const TX_SLEEP: UINT = 4;
pub const TX_SEMAPHORE_SUSP: UINT = 6;
pub const TX_MUTEX_SUSP: UINT = 13;

/// Number of distinct priority levels; valid priorities are
/// `0..TX_MAX_PRIORITIES`, lower value meaning more urgent.
pub const TX_MAX_PRIORITIES: UINT = 32;

/// Smallest acceptable stack size, in bytes.
pub const TX_MINIMUM_STACK: ULONG = 200;

/// Periodic timer interrupt rate the tick counter advances at.
pub const TX_TIMER_TICKS_PER_SECOND: ULONG = 100;

// System state word values outside the running phase.  During the running
// phase the word holds the current interrupt nesting depth (0 in thread
// context).
pub const TX_INITIALIZE_IS_FINISHED: ULONG = 0;
pub const TX_INITIALIZE_IN_PROGRESS: ULONG = 0xF0F0_F0F0;
pub const TX_INITIALIZE_ALMOST_DONE: ULONG = 0xF0F0_F0F1;

// Object validity markers stamped into the `*_id` field by the create calls.
pub const TX_THREAD_ID: ULONG = 0x5448_5244;
pub const TX_SEMAPHORE_ID: ULONG = 0x53454D41;
pub const TX_MUTEX_ID: ULONG = 0x4D55_5445;

/// Thread control block.
///
/// The record is zero-initialized by its owner and filled in by
/// [`tx_thread_create`].  `tx_thread_state`, `tx_thread_priority` and
/// `tx_thread_name` may be read directly while interrupts are locked out;
/// `tx_thread_entry_exit_param` is the opaque parameter slot paired with the
/// [`tx_thread_entry_exit_notify`] callback.
#[repr(C)]
pub struct TX_THREAD {
    pub tx_thread_id: ULONG,
    pub tx_thread_name: *const CHAR,
    pub tx_thread_state: UINT,
    /// Current scheduling priority, including any inherited elevation.
    pub tx_thread_priority: UINT,
    /// Priority requested by the application, ignoring inheritance.
    pub tx_thread_user_priority: UINT,
    pub tx_thread_entry_exit_notify: tx_entry_exit_notify_t,
    pub tx_thread_entry_exit_param: *mut c_void,
    pub tx_thread_stack_start: *mut c_void,
    pub tx_thread_stack_size: ULONG,
    /// Port control block; owned by the port, opaque to everyone else.
    pub tx_thread_port: *mut c_void,
}

/// Mutex control block.  `tx_mutex_owner` is the readable current-owner
/// field; null while unlocked.
#[repr(C)]
pub struct TX_MUTEX {
    pub tx_mutex_id: ULONG,
    pub tx_mutex_name: *const CHAR,
    pub tx_mutex_owner: *mut TX_THREAD,
    pub tx_mutex_ownership_count: UINT,
    pub tx_mutex_inherit: UINT,
    pub tx_mutex_port: *mut c_void,
}

/// Semaphore control block.  `tx_semaphore_count` is the readable
/// current-count field.
#[repr(C)]
pub struct TX_SEMAPHORE {
    pub tx_semaphore_id: ULONG,
    pub tx_semaphore_name: *const CHAR,
    pub tx_semaphore_count: ULONG,
    pub tx_semaphore_port: *mut c_void,
}

// Without a port selected, the kernel itself is expected to provide the
// service symbols at link time.
#[cfg(not(feature = "hosted"))]
extern "C" {
    pub fn tx_kernel_enter() -> !;
    pub fn tx_thread_create(
        thread: *mut TX_THREAD,
        name: *const CHAR,
        entry: tx_thread_entry_t,
        entry_input: ULONG,
        stack_start: *mut c_void,
        stack_size: ULONG,
        priority: UINT,
        preempt_threshold: UINT,
        time_slice: ULONG,
        auto_start: UINT,
    ) -> UINT;
    pub fn tx_thread_delete(thread: *mut TX_THREAD) -> UINT;
    pub fn tx_thread_terminate(thread: *mut TX_THREAD) -> UINT;
    pub fn tx_thread_suspend(thread: *mut TX_THREAD) -> UINT;
    pub fn tx_thread_resume(thread: *mut TX_THREAD) -> UINT;
    pub fn tx_thread_sleep(ticks: ULONG) -> UINT;
    pub fn tx_thread_relinquish();
    pub fn tx_thread_identify() -> *mut TX_THREAD;
    pub fn tx_thread_priority_change(
        thread: *mut TX_THREAD,
        new_priority: UINT,
        old_priority: *mut UINT,
    ) -> UINT;
    pub fn tx_thread_entry_exit_notify(
        thread: *mut TX_THREAD,
        notify: tx_entry_exit_notify_t,
    ) -> UINT;
    pub fn tx_thread_system_state() -> ULONG;
    pub fn tx_mutex_create(mutex: *mut TX_MUTEX, name: *const CHAR, inherit: UINT) -> UINT;
    pub fn tx_mutex_get(mutex: *mut TX_MUTEX, wait_option: ULONG) -> UINT;
    pub fn tx_mutex_put(mutex: *mut TX_MUTEX) -> UINT;
    pub fn tx_mutex_delete(mutex: *mut TX_MUTEX) -> UINT;
    pub fn tx_semaphore_create(
        sem: *mut TX_SEMAPHORE,
        name: *const CHAR,
        initial_count: ULONG,
    ) -> UINT;
    pub fn tx_semaphore_get(sem: *mut TX_SEMAPHORE, wait_option: ULONG) -> UINT;
    pub fn tx_semaphore_put(sem: *mut TX_SEMAPHORE) -> UINT;
    pub fn tx_semaphore_ceiling_put(sem: *mut TX_SEMAPHORE, ceiling: ULONG) -> UINT;
    pub fn tx_semaphore_delete(sem: *mut TX_SEMAPHORE) -> UINT;
    pub fn tx_time_get() -> ULONG;
    pub fn tx_interrupt_disable() -> UINT;
    pub fn tx_interrupt_restore(posture: UINT);
}

#[cfg(feature = "hosted")]
pub mod hosted;

#[cfg(feature = "hosted")]
pub use hosted::{
    tx_interrupt_disable, tx_interrupt_restore, tx_kernel_enter, tx_mutex_create, tx_mutex_delete,
    tx_mutex_get, tx_mutex_put, tx_semaphore_ceiling_put, tx_semaphore_create,
    tx_semaphore_delete, tx_semaphore_get, tx_semaphore_put, tx_thread_create, tx_thread_delete,
    tx_thread_entry_exit_notify, tx_thread_identify, tx_thread_priority_change,
    tx_thread_relinquish, tx_thread_resume, tx_thread_sleep, tx_thread_suspend,
    tx_thread_system_state, tx_thread_terminate, tx_time_get,
};
