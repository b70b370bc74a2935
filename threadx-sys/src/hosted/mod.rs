//! Hosted port of the kernel API.
//!
//! Implements the primitive calls over OS threads so the wrappers can run on
//! a development host.  The port models a single-core kernel: one global
//! interrupt lock serializes every kernel operation, a timer thread advances
//! the tick counter and expires timed waits, and each kernel thread is
//! backed by an OS thread that parks while the kernel considers it blocked.
//!
//! Wait queues are ordered by current priority (ties by arrival), and both
//! mutex release and semaphore give hand the resource directly to the most
//! urgent waiter before it resumes, so wake order is acquisition order no
//! matter how the host schedules the backing threads.
//!
//! Two deliberate approximations, inherent to running over OS threads:
//! suspension and termination take effect at the target's next kernel call
//! (a compute-bound thread keeps running until then), and the caller's stack
//! region is recorded but unused.

mod sync;
mod thread;

pub use sync::{
    tx_mutex_create, tx_mutex_delete, tx_mutex_get, tx_mutex_put, tx_semaphore_ceiling_put,
    tx_semaphore_create, tx_semaphore_delete, tx_semaphore_get, tx_semaphore_put,
};
pub use thread::{
    tx_thread_create, tx_thread_delete, tx_thread_entry_exit_notify, tx_thread_identify,
    tx_thread_priority_change, tx_thread_relinquish, tx_thread_resume, tx_thread_sleep,
    tx_thread_suspend, tx_thread_terminate,
};

use core::cell::{Cell, RefCell, UnsafeCell};
use std::boxed::Box;
use std::sync::{Mutex as StdMutex, MutexGuard, Once};
use std::thread as os;
use std::vec::Vec;

use crate::{
    TX_INITIALIZE_ALMOST_DONE, TX_INITIALIZE_IN_PROGRESS, TX_INITIALIZE_IS_FINISHED, TX_MUTEX,
    TX_NOT_AVAILABLE, TX_NO_INSTANCE, TX_READY, TX_SEMAPHORE, TX_SUCCESS, TX_SUSPENDED,
    TX_THREAD, TX_THREAD_ID, TX_TIMER_TICKS_PER_SECOND, TX_WAIT_FOREVER, UINT, ULONG,
};

pub(crate) type TcbRef = std::sync::Arc<Tcb>;

/// What a blocked thread is waiting on, so termination and timer expiry can
/// pull it back out of the right queue.
pub(crate) enum Blocked {
    None,
    Sleeping,
    OnSemaphore(*mut TX_SEMAPHORE),
    OnMutex(*mut TX_MUTEX),
}

/// Port-side thread bookkeeping.  Every field is guarded by the global
/// interrupt lock; `st()` must only be called while it is held.
pub(crate) struct Tcb {
    state: UnsafeCell<TcbState>,
}

// All access funnels through the interrupt lock.
unsafe impl Send for Tcb {}
unsafe impl Sync for Tcb {}

pub(crate) struct TcbState {
    /// Back pointer to the control block; identity of the thread.
    pub thread: *mut TX_THREAD,
    /// Unpark handle of the backing OS thread.
    pub os: Option<os::Thread>,
    pub started: bool,
    pub suspended: bool,
    /// Suspension requested while the thread was blocked or running; latched
    /// at the next kernel-call boundary.
    pub suspend_pending: bool,
    pub terminated: bool,
    /// The control block has been deleted; never touch `thread` again.
    pub deleted: bool,
    /// Elevated urgency while owning a contended inheritance mutex.
    pub inherited: Option<UINT>,
    /// Wait outcome posted by a waker, consumed by the blocked thread.
    pub pending: Option<UINT>,
    pub blocked: Blocked,
    /// Invalidates stale timer entries from earlier waits.
    pub wait_stamp: u64,
}

impl Tcb {
    pub(crate) fn new(st: TcbState) -> Tcb {
        Tcb {
            state: UnsafeCell::new(st),
        }
    }

    /// Safety: the global interrupt lock must be held.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn st(&self) -> &mut TcbState {
        &mut *self.state.get()
    }
}

struct TimerEntry {
    deadline: u64,
    stamp: u64,
    tcb: TcbRef,
}

pub(crate) struct Kern {
    pub tick: u64,
    pub seq: u64,
    pub system_state: ULONG,
    timers: Vec<TimerEntry>,
}

struct KernelCell(RefCell<Kern>);

// Guarded by the interrupt lock; the RefCell only turns a locking mistake
// into a loud panic instead of silent aliasing.
unsafe impl Sync for KernelCell {}

static KERNEL: KernelCell = KernelCell(RefCell::new(Kern {
    tick: 0,
    seq: 0,
    system_state: TX_INITIALIZE_IN_PROGRESS,
    timers: Vec::new(),
}));

// The global interrupt lock.  Re-entrant per OS thread: the posture returned
// by `int_lock` is the previous nesting depth, and `int_unlock` pops one
// level, releasing the OS mutex when the depth returns to zero.
static INT_MUTEX: StdMutex<()> = StdMutex::new(());

std::thread_local! {
    static INT_DEPTH: Cell<UINT> = const { Cell::new(0) };
    static INT_HELD: RefCell<Option<MutexGuard<'static, ()>>> = const { RefCell::new(None) };
    static CURRENT: RefCell<Option<TcbRef>> = const { RefCell::new(None) };
}

pub(crate) fn int_lock() -> UINT {
    INT_DEPTH.with(|d| {
        let depth = d.get();
        if depth == 0 {
            let guard = INT_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            INT_HELD.with(|h| *h.borrow_mut() = Some(guard));
        }
        d.set(depth + 1);
        depth
    })
}

pub(crate) fn int_unlock() {
    INT_DEPTH.with(|d| {
        let depth = d.get();
        debug_assert!(depth > 0, "interrupt restore without matching disable");
        d.set(depth - 1);
        if depth == 1 {
            INT_HELD.with(|h| *h.borrow_mut() = None);
        }
    })
}

/// Run `f` with the kernel state locked.  Must not be nested; callbacks and
/// unparks are performed by the callers after the closure returns.
pub(crate) fn with_kernel<R>(f: impl FnOnce(&mut Kern) -> R) -> R {
    int_lock();
    let r = f(&mut KERNEL.0.borrow_mut());
    int_unlock();
    r
}

pub(crate) fn isr_active(k: &Kern) -> bool {
    k.system_state != TX_INITIALIZE_IS_FINISHED && k.system_state < TX_INITIALIZE_IN_PROGRESS
}

static INIT: Once = Once::new();

/// Bring the kernel up on first use: mark the initialization phase, start
/// the timer thread, enter the running phase.
pub(crate) fn ensure_kernel() {
    INIT.call_once(|| {
        with_kernel(|k| k.system_state = TX_INITIALIZE_ALMOST_DONE);
        os::Builder::new()
            .name("tx-timer".into())
            .spawn(ticker)
            .expect("hosted port: timer thread");
        with_kernel(|k| k.system_state = TX_INITIALIZE_IS_FINISHED);
    });
}

fn ticker() {
    let period = std::time::Duration::from_millis(1000 / TX_TIMER_TICKS_PER_SECOND as u64);
    loop {
        os::sleep(period);
        let wakes = with_kernel(|k| {
            k.tick += 1;
            expire_timers(k)
        });
        for w in wakes {
            w.unpark();
        }
    }
}

fn expire_timers(k: &mut Kern) -> Vec<os::Thread> {
    let now = k.tick;
    let mut wakes = Vec::new();
    let mut i = 0;
    while i < k.timers.len() {
        if k.timers[i].deadline > now {
            i += 1;
            continue;
        }
        let entry = k.timers.swap_remove(i);
        unsafe {
            let st = entry.tcb.st();
            if st.wait_stamp != entry.stamp {
                continue; // stale: the wait already completed
            }
            let code = match st.blocked {
                Blocked::Sleeping => Some(TX_SUCCESS),
                Blocked::OnSemaphore(s) => {
                    sync::semaphore_queue(s).remove(&entry.tcb);
                    Some(TX_NO_INSTANCE)
                }
                Blocked::OnMutex(m) => {
                    sync::mutex_queue(m).remove(&entry.tcb);
                    Some(TX_NOT_AVAILABLE)
                }
                Blocked::None => None,
            };
            if let Some(code) = code {
                wakes.push(post(st, code));
            }
        }
    }
    wakes
}

/// Post a wait outcome and return the handle to unpark.
///
/// Safety: interrupt lock held; `st` belongs to a thread that is currently
/// blocked (its `os` handle is set).
pub(crate) unsafe fn post(st: &mut TcbState, code: UINT) -> os::Thread {
    st.blocked = Blocked::None;
    st.pending = Some(code);
    if !st.deleted {
        (*st.thread).tx_thread_state = TX_READY;
    }
    st.os.clone().expect("blocked thread has an OS handle")
}

/// Record the current thread as blocked.  Returns the queue entry for the
/// caller to insert where it belongs (ignored for plain sleeps).
pub(crate) unsafe fn block_current(
    k: &mut Kern,
    me: &TcbRef,
    blocked: Blocked,
    state: UINT,
    wait: ULONG,
) -> sync::Waiter {
    let st = me.st();
    st.pending = None;
    st.blocked = blocked;
    st.wait_stamp += 1;
    (*st.thread).tx_thread_state = state;
    if wait != TX_WAIT_FOREVER {
        k.timers.push(TimerEntry {
            deadline: k.tick + wait as u64,
            stamp: st.wait_stamp,
            tcb: me.clone(),
        });
    }
    k.seq += 1;
    sync::Waiter {
        prio: (*st.thread).tx_thread_priority,
        seq: k.seq,
        tcb: me.clone(),
    }
}

/// Park until a wait outcome is posted.
pub(crate) fn wait_outcome(me: &TcbRef) -> UINT {
    loop {
        let done = with_kernel(|_| unsafe { me.st().pending.take() });
        if let Some(code) = done {
            return code;
        }
        os::park();
    }
}

/// Kernel-call boundary: latch pending suspension, and hold terminated
/// threads here for good.
pub(crate) fn gate(me: &TcbRef) {
    loop {
        let run = with_kernel(|_| unsafe {
            let st = me.st();
            if st.terminated {
                false
            } else if st.suspend_pending {
                st.suspend_pending = false;
                st.suspended = true;
                if !st.deleted {
                    (*st.thread).tx_thread_state = TX_SUSPENDED;
                }
                false
            } else {
                !st.suspended
            }
        });
        if run {
            return;
        }
        os::park();
    }
}

/// Recompute a thread's current priority from its requested priority and any
/// inherited elevation.  Interrupt lock held.
pub(crate) unsafe fn apply_priority(st: &mut TcbState) {
    if st.deleted {
        return;
    }
    let user = (*st.thread).tx_thread_user_priority;
    (*st.thread).tx_thread_priority = match st.inherited {
        Some(i) => i.min(user),
        None => user,
    };
}

pub(crate) fn set_current(tcb: TcbRef) {
    CURRENT.with(|c| *c.borrow_mut() = Some(tcb));
}

/// The calling OS thread's kernel identity, adopting it on first contact.
pub(crate) fn current_tcb() -> TcbRef {
    CURRENT.with(|c| {
        let mut slot = c.borrow_mut();
        if let Some(t) = &*slot {
            return t.clone();
        }
        let tcb = adopt();
        *slot = Some(tcb.clone());
        tcb
    })
}

/// Give a foreign OS thread (the test harness main thread, typically) a
/// control block of its own so identity, ownership and priority queries work
/// from it.
fn adopt() -> TcbRef {
    ensure_kernel();
    let thread: *mut TX_THREAD = Box::into_raw(Box::new(unsafe { core::mem::zeroed() }));
    let tcb = std::sync::Arc::new(Tcb::new(TcbState {
        thread,
        os: Some(os::current()),
        started: true,
        suspended: false,
        suspend_pending: false,
        terminated: false,
        deleted: false,
        inherited: None,
        pending: None,
        blocked: Blocked::None,
        wait_stamp: 0,
    }));
    with_kernel(|_| unsafe {
        (*thread).tx_thread_id = TX_THREAD_ID;
        (*thread).tx_thread_name = c"adopted".as_ptr();
        (*thread).tx_thread_state = TX_READY;
        (*thread).tx_thread_priority = 16;
        (*thread).tx_thread_user_priority = 16;
        (*thread).tx_thread_port = std::sync::Arc::into_raw(tcb.clone()) as *mut core::ffi::c_void;
    });
    tcb
}

/// Borrow the port bookkeeping of a foreign control block.  Interrupt lock
/// held; the block must be created and not deleted.
pub(crate) unsafe fn tcb_of<'a>(thread: *mut TX_THREAD) -> &'a Tcb {
    &*((*thread).tx_thread_port as *const Tcb)
}

/// Disable interrupts, returning the previous posture for the matching
/// [`tx_interrupt_restore`].
pub unsafe fn tx_interrupt_disable() -> UINT {
    int_lock()
}

/// Restore the interrupt posture captured by [`tx_interrupt_disable`].
pub unsafe fn tx_interrupt_restore(_posture: UINT) {
    int_unlock();
}

/// Current system state word: interrupt nesting depth while running, or one
/// of the initialization-phase markers.
pub unsafe fn tx_thread_system_state() -> ULONG {
    with_kernel(|k| k.system_state)
}

/// Current tick count.
pub unsafe fn tx_time_get() -> ULONG {
    ensure_kernel();
    with_kernel(|k| k.tick as ULONG)
}

/// Enter the kernel.  On this port initialization is lazy, so this only
/// makes it explicit; like the real call, it does not return.
pub unsafe fn tx_kernel_enter() -> ! {
    ensure_kernel();
    loop {
        os::park();
    }
}

/// Run `f` as if inside an interrupt service routine: interrupts locked out
/// and the interrupt nesting depth raised, so `tx_thread_system_state`
/// reports ISR context and blocking waits are refused.
pub fn inject_interrupt<R>(f: impl FnOnce() -> R) -> R {
    ensure_kernel();
    int_lock();
    KERNEL.0.borrow_mut().system_state += 1;
    let r = f();
    KERNEL.0.borrow_mut().system_state -= 1;
    int_unlock();
    r
}
