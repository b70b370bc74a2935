//! Kernel startup and phase queries.

use crate::raw;

/// Coarse kernel phase, as visible to applications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// The kernel has not finished initializing.
    Uninitialized,
    /// The scheduler is running.
    Running,
}

/// The kernel's current phase.
///
/// Callable from any context.  While the kernel is running the system state
/// word holds the interrupt nesting depth, so any value below the
/// initialization markers means the scheduler is up.
pub fn state() -> State {
    let system_state = unsafe { raw::tx_thread_system_state() };
    if system_state < raw::TX_INITIALIZE_IN_PROGRESS {
        State::Running
    } else {
        State::Uninitialized
    }
}

/// Hand control to the kernel.  Does not return; threads created beforehand
/// start running under the scheduler.
pub fn start() -> ! {
    log::info!("entering kernel");
    unsafe { raw::tx_kernel_enter() }
}
