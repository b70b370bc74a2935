//! CPU interrupt lockout.
//!
//! A [`CriticalSection`] disables interrupts and preemption for a handful of
//! instructions, making a small read or state transition atomic with respect
//! to every other execution context.  It is the one general-purpose tool for
//! protecting shared state outside the kernel primitives, and it must never
//! be held across anything that can block.
//!
//! The same interrupt lockout backs an implementation of the
//! `critical-section` crate, so external crates that build on that interface
//! work unchanged.

use crate::raw::{self, UINT};

/// A scoped interrupt-and-preemption lockout.
///
/// [`lock`] captures the interrupt posture and disables interrupts;
/// [`unlock`] restores exactly the captured posture.  Usable from thread or
/// interrupt context.  Not re-entrant: a second `lock` without the
/// intervening `unlock` would overwrite the saved posture and corrupt the
/// restore, so it is rejected.
///
/// Most uses want the closure form, [`CriticalSection::with`].
///
/// [`lock`]: CriticalSection::lock
/// [`unlock`]: CriticalSection::unlock
#[derive(Default)]
pub struct CriticalSection {
    posture: Option<UINT>,
}

impl CriticalSection {
    /// Construct an unlocked critical section.
    pub const fn new() -> CriticalSection {
        CriticalSection { posture: None }
    }

    /// Disable interrupts and preemption, capturing the prior posture.
    pub fn lock(&mut self) {
        assert!(
            self.posture.is_none(),
            "critical section locked while already locked"
        );
        self.posture = Some(unsafe { raw::tx_interrupt_disable() });
    }

    /// Restore the posture captured by the matching [`lock`].
    ///
    /// [`lock`]: CriticalSection::lock
    pub fn unlock(&mut self) {
        match self.posture.take() {
            Some(posture) => unsafe { raw::tx_interrupt_restore(posture) },
            None => panic!("critical section unlocked while not locked"),
        }
    }

    /// Run `f` with interrupts and preemption disabled.
    ///
    /// `f` must not block or suspend.
    pub fn with<R>(f: impl FnOnce() -> R) -> R {
        let posture = unsafe { raw::tx_interrupt_disable() };
        let result = f();
        unsafe { raw::tx_interrupt_restore(posture) };
        result
    }
}

mod critical {
    //! `critical-section` implementation over the kernel interrupt control.
    //!
    //! A single kernel interrupt lockout backs every critical section.  This
    //! doesn't allow any nesting beyond what the posture token encodes, but
    //! neither does the `critical-section` crate.

    use critical_section::RawRestoreState;

    use crate::raw::{self, UINT};

    struct KernelCriticalSection;
    critical_section::set_impl!(KernelCriticalSection);

    unsafe impl critical_section::Impl for KernelCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            raw::tx_interrupt_disable() as RawRestoreState
        }

        unsafe fn release(token: RawRestoreState) {
            raw::tx_interrupt_restore(token as UINT);
        }
    }
}

pub mod this_cpu {
    //! Queries about whichever CPU is executing the caller.

    use crate::raw;

    /// Whether the current execution context is an interrupt service
    /// routine.
    ///
    /// Never blocks; callable from any context.  The kernel's system state
    /// word holds the interrupt nesting depth while the kernel is running,
    /// and out-of-band marker values before and during initialization; only
    /// a live nesting depth counts as ISR context.
    pub fn is_in_isr() -> bool {
        let state = unsafe { raw::tx_thread_system_state() };
        state != raw::TX_INITIALIZE_IS_FINISHED && state < raw::TX_INITIALIZE_IN_PROGRESS
    }
}
