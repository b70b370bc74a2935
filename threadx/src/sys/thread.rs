//! Kernel threads.
//!
//! A thread binds an entry function, a priority, a short name and a stack
//! region; it becomes eligible to run inside the spawn call, so a
//! sufficiently urgent thread may have run before spawn returns.  Stacks
//! and thread control blocks are statically declared through
//! [`kobj_define!`], or heap-allocated under the `alloc` feature.
//!
//! ```
//! use threadx::kobj_define;
//! use threadx::sys::thread::StaticThread;
//!
//! kobj_define! {
//!     static WORKER: StaticThread;
//!     static WORKER_STACK: StaticThreadStack<2048>;
//! }
//!
//! # fn no_run() {
//! let mut worker = WORKER
//!     .init_once(WORKER_STACK.init_once(()).unwrap())
//!     .unwrap();
//! worker.set_priority(4);
//! let worker = worker.spawn(|| {
//!     // thread body
//! });
//! worker.join();
//! # }
//! ```
//!
//! ## Joining
//!
//! The kernel has no native join; what it has is a single entry/exit
//! observer slot per thread, called with a reason code when the entry
//! function starts and when it returns.  [`Thread::join`] builds a join out
//! of that: it installs a private exit observer whose parameter is a
//! one-shot binary semaphore on the joiner's stack, then blocks on the
//! semaphore until the exit callback releases it.  The parameter slot only
//! fits one observer, so a thread is joinable exactly once; [`joinable`]
//! reports whether the slot is still free and the thread still live.
//!
//! [`kobj_define!`]: crate::kobj_define
//! [`joinable`]: Thread::joinable

use core::cell::UnsafeCell;
use core::ffi::CStr;
use core::num::NonZeroUsize;

#[cfg(feature = "alloc")]
use alloc::boxed::Box;

use crate::cpu::CriticalSection;
use crate::object::{Fixed, StaticKernelObject, Wrapped};
use crate::raw::{self, TX_SEMAPHORE, TX_THREAD, UINT, ULONG};
use crate::sys::sync::semaphore::BinarySemaphore;

const DEFAULT_NAME: &CStr = c"anonym";

/// Clamp a requested stack size to the kernel minimum.
pub const fn stack_len(size: usize) -> usize {
    if size < raw::TX_MINIMUM_STACK as usize {
        raw::TX_MINIMUM_STACK as usize
    } else {
        size
    }
}

/// Thread priority.  Lower values are more urgent; the range is
/// `[0, TX_MAX_PRIORITIES)`.
///
/// The default is 1, which preempts the kernel's built-in idle thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub UINT);

impl Priority {
    /// The most urgent priority.
    pub const MOST_URGENT: Priority = Priority(0);
    /// The least urgent priority.
    pub const LEAST_URGENT: Priority = Priority(raw::TX_MAX_PRIORITIES - 1);
}

impl Default for Priority {
    fn default() -> Priority {
        Priority(1)
    }
}

impl From<UINT> for Priority {
    fn from(value: UINT) -> Priority {
        Priority(value)
    }
}

impl From<Priority> for UINT {
    fn from(value: Priority) -> UINT {
        value.0
    }
}

/// Operating states of a thread.
///
/// `Ready` becomes `Running` on dispatch and back on preemption or yield;
/// `Suspended` covers explicit suspension and every kernel wait;
/// `Completed` (entry function returned) and `Terminated` (externally
/// ended) are terminal, though the thread can still be queried until it is
/// dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    /// Currently executing.
    Running,
    /// Eligible to run, waiting for the scheduler.
    Ready,
    /// The entry function returned.
    Completed,
    /// Externally terminated.
    Terminated,
    /// Suspended, sleeping, or blocked on a kernel object.
    Suspended,
}

/// A unique identifier of a thread, derived from its control block address.
///
/// Non-zero, and stable for the thread's entire lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadId(NonZeroUsize);

impl ThreadId {
    pub(crate) fn from_ptr(thread: *mut TX_THREAD) -> Option<ThreadId> {
        NonZeroUsize::new(thread as usize).map(ThreadId)
    }
}

/// Backing storage for a statically declared thread stack.
///
/// Declared by [`kobj_define!`]; not meant to be used directly.
///
/// [`kobj_define!`]: crate::kobj_define
#[doc(hidden)]
pub struct RealStaticThreadStack<const SIZE: usize> {
    pub data: UnsafeCell<[u8; SIZE]>,
}

unsafe impl<const SIZE: usize> Sync for RealStaticThreadStack<SIZE> {}

/// The base/size pair recorded for a static stack.
#[doc(hidden)]
pub struct StaticThreadStack {
    pub base: *mut u8,
    pub size: usize,
}

unsafe impl Sync for StaticKernelObject<StaticThreadStack> {}

impl StaticKernelObject<StaticThreadStack> {
    /// Construct the descriptor for a static stack.
    ///
    /// Not intended to be directly called; used by [`kobj_define!`].
    ///
    /// [`kobj_define!`]: crate::kobj_define
    #[doc(hidden)]
    pub const fn new_from<const SZ: usize>(real: &RealStaticThreadStack<SZ>) -> Self {
        StaticKernelObject {
            value: UnsafeCell::new(StaticThreadStack {
                base: real.data.get() as *mut u8,
                size: SZ,
            }),
            init: portable_atomic::AtomicUsize::new(0),
        }
    }
}

impl Wrapped for StaticKernelObject<StaticThreadStack> {
    type T = ThreadStack;
    type I = ();

    fn get_wrapped(&self, _args: Self::I) -> ThreadStack {
        let stack = unsafe { &*self.value.get() };
        ThreadStack::from_parts(stack.base, stack.size)
    }
}

/// A stack region ready to hand to thread creation.
pub struct ThreadStack {
    base: *mut u8,
    size: usize,
    #[cfg(feature = "alloc")]
    _heap: Option<alloc::vec::Vec<u8>>,
}

unsafe impl Send for ThreadStack {}

impl ThreadStack {
    fn from_parts(base: *mut u8, size: usize) -> ThreadStack {
        #[cfg(feature = "alloc")]
        {
            ThreadStack {
                base,
                size,
                _heap: None,
            }
        }
        #[cfg(not(feature = "alloc"))]
        {
            ThreadStack { base, size }
        }
    }

    /// Allocate a stack region of at least the kernel minimum size.
    #[cfg(feature = "alloc")]
    pub fn new(size: usize) -> ThreadStack {
        let size = stack_len(size);
        let mut heap = alloc::vec![0u8; size];
        ThreadStack {
            base: heap.as_mut_ptr(),
            size,
            _heap: Some(heap),
        }
    }

    /// The usable size of the region.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// An initialized thread that has not been spawned yet.
///
/// Returned by [`StaticThread::init_once`] (with the stack to use) or
/// [`ThreadBuilder::new`].  Set the priority and name, then hand it an
/// entry function with [`spawn`] or [`spawn_raw`].
///
/// [`spawn`]: ThreadBuilder::spawn
/// [`spawn_raw`]: ThreadBuilder::spawn_raw
pub struct ThreadBuilder {
    raw: Fixed<TX_THREAD>,
    stack: ThreadStack,
    priority: Priority,
    name: &'static CStr,
}

impl ThreadBuilder {
    /// Start building a thread over a freshly allocated control block and
    /// stack.
    #[cfg(feature = "alloc")]
    pub fn new(stack_size: usize) -> ThreadBuilder {
        ThreadBuilder {
            raw: Fixed::new(unsafe { core::mem::zeroed() }),
            stack: ThreadStack::new(stack_size),
            priority: Priority::default(),
            name: DEFAULT_NAME,
        }
    }

    /// Set the priority the thread will be created at.
    pub fn set_priority(&mut self, priority: impl Into<Priority>) {
        self.priority = priority.into();
    }

    /// Set the thread's name.  The kernel stores the pointer, hence the
    /// `'static` bound.
    pub fn set_name(&mut self, name: &'static CStr) {
        self.name = name;
    }

    /// Spawn with a plain entry function and its word-sized argument.
    /// Usable without an allocator.
    pub fn spawn_raw(self, entry: extern "C" fn(ULONG), arg: ULONG) -> Thread {
        let entry: unsafe extern "C" fn(ULONG) = entry;
        self.create(entry, arg)
    }

    /// Spawn a thread running a closure.
    ///
    /// The closure is boxed and carried to the new thread through the
    /// kernel's single word-sized entry argument.
    #[cfg(feature = "alloc")]
    pub fn spawn<F: FnOnce() + Send + 'static>(self, child: F) -> Thread {
        let child: closure::Closure = Box::new(child);
        let child = Box::into_raw(Box::new(closure::ThreadData { closure: child }));
        self.create(closure::child, child as usize as ULONG)
    }

    fn create(self, entry: unsafe extern "C" fn(ULONG), input: ULONG) -> Thread {
        let ThreadBuilder {
            raw: tcb,
            stack,
            priority,
            name,
        } = self;
        log::debug!("spawning {:?} at priority {}", name, priority.0);
        let ret = unsafe {
            raw::tx_thread_create(
                tcb.get(),
                name.as_ptr(),
                Some(entry),
                input,
                stack.base.cast(),
                stack.size as ULONG,
                priority.0,
                priority.0,
                raw::TX_NO_TIME_SLICE,
                raw::TX_AUTO_START,
            )
        };
        assert_eq!(ret, raw::TX_SUCCESS, "thread creation failed");
        Thread {
            raw: tcb,
            _stack: stack,
        }
    }
}

#[cfg(feature = "alloc")]
mod closure {
    //! Closure entry points.  The boxed closure is passed through the
    //! word-sized entry argument and reconstituted in the child.

    use alloc::boxed::Box;

    use crate::raw::ULONG;

    pub type Closure = Box<dyn FnOnce() + Send>;

    pub struct ThreadData {
        pub closure: Closure,
    }

    pub unsafe extern "C" fn child(arg: ULONG) {
        let data: Box<ThreadData> = unsafe { Box::from_raw(arg as usize as *mut ThreadData) };
        let closure = data.closure;
        closure();
    }
}

/// A handle to a spawned thread.
///
/// Dropping the handle ends the thread: if it has not completed it is
/// terminated first, then its kernel resources are released.  Dropping it
/// from the thread's own context is a contract violation.
pub struct Thread {
    raw: Fixed<TX_THREAD>,
    _stack: ThreadStack,
}

unsafe impl Send for Thread {}
unsafe impl Sync for Thread {}

impl Thread {
    fn ptr(&self) -> *mut TX_THREAD {
        self.raw.get()
    }

    /// The thread's unique identifier.
    pub fn get_id(&self) -> ThreadId {
        // a live control block never sits at address zero
        ThreadId::from_ptr(self.ptr()).expect("thread control block at null")
    }

    /// The thread's name.
    pub fn get_name(&self) -> &'static str {
        CriticalSection::with(|| unsafe {
            let name = (*self.ptr()).tx_thread_name;
            if name.is_null() {
                ""
            } else {
                let name: &'static CStr = CStr::from_ptr(name);
                name.to_str().unwrap_or("")
            }
        })
    }

    /// The current state of the thread.
    pub fn get_state(&self) -> ThreadState {
        CriticalSection::with(|| unsafe {
            match (*self.ptr()).tx_thread_state {
                raw::TX_READY => {
                    if core::ptr::eq(raw::tx_thread_identify(), self.ptr()) {
                        ThreadState::Running
                    } else {
                        ThreadState::Ready
                    }
                }
                raw::TX_COMPLETED => ThreadState::Completed,
                raw::TX_TERMINATED => ThreadState::Terminated,
                _ => ThreadState::Suspended,
            }
        })
    }

    /// Suspend the thread until [`resume`].
    ///
    /// Direct kernel call, not reference counted; redundant or out-of-order
    /// use is on the caller.
    ///
    /// [`resume`]: Thread::resume
    pub fn suspend(&self) {
        let _ = unsafe { raw::tx_thread_suspend(self.ptr()) };
    }

    /// Resume the suspended thread.
    pub fn resume(&self) {
        let _ = unsafe { raw::tx_thread_resume(self.ptr()) };
    }

    /// The thread's requested priority.
    ///
    /// Callable from thread or interrupt context.
    pub fn get_priority(&self) -> Priority {
        CriticalSection::with(|| unsafe { Priority((*self.ptr()).tx_thread_user_priority) })
    }

    /// Change the thread's priority.  Takes effect immediately and may
    /// preempt the caller; thread context only.
    pub fn set_priority(&self, priority: impl Into<Priority>) {
        let mut old = 0;
        let ret =
            unsafe { raw::tx_thread_priority_change(self.ptr(), priority.into().0, &mut old) };
        assert_eq!(ret, raw::TX_SUCCESS, "priority change failed");
    }

    /// Whether the thread can still be joined: it has not reached a
    /// terminal state and no exit observer has been attached.
    ///
    /// Callable from thread or interrupt context.
    pub fn joinable(&self) -> bool {
        CriticalSection::with(|| unsafe {
            let state = (*self.ptr()).tx_thread_state;
            state != raw::TX_COMPLETED
                && state != raw::TX_TERMINATED
                && (*self.ptr()).tx_thread_entry_exit_param.is_null()
        })
    }

    /// Wait for the thread to finish execution.
    ///
    /// Returns exactly once, after the thread's entry function has
    /// returned.  May only be called while [`joinable`] holds, and not from
    /// the thread's own context (that would deadlock); both are asserted.
    ///
    /// [`joinable`]: Thread::joinable
    pub fn join(&self) {
        // One-shot rendezvous for the exit signal; lives on this stack
        // frame and never escapes it.
        let mut exit_slot: TX_SEMAPHORE = unsafe { core::mem::zeroed() };
        let slot_ptr: *mut TX_SEMAPHORE = &mut exit_slot;
        let exit_cond = unsafe { BinarySemaphore::new_in(slot_ptr, 0) };

        // Install the observer under interrupt lockout so the target cannot
        // exit between the joinability check and the attach.
        CriticalSection::with(|| unsafe {
            assert!(self.joinable(), "join on a thread that is not joinable");
            assert!(
                !core::ptr::eq(raw::tx_thread_identify(), self.ptr()),
                "a thread cannot join itself"
            );
            let ret = raw::tx_thread_entry_exit_notify(self.ptr(), Some(join_exit_callback));
            assert_eq!(ret, raw::TX_SUCCESS, "attaching the exit observer failed");
            (*self.ptr()).tx_thread_entry_exit_param = slot_ptr.cast();
        });

        // Wait for the exit signal; once it arrives the thread has
        // completed.
        exit_cond.acquire();
    }
}

unsafe extern "C" fn join_exit_callback(thread: *mut TX_THREAD, id: UINT) {
    if id != raw::TX_THREAD_EXIT {
        return;
    }
    let exit_cond = CriticalSection::with(|| unsafe { (*thread).tx_thread_entry_exit_param })
        as *mut TX_SEMAPHORE;
    if !exit_cond.is_null() {
        let _ = unsafe { raw::tx_semaphore_put(exit_cond) };
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        let state = CriticalSection::with(|| unsafe { (*self.ptr()).tx_thread_state });
        if state != raw::TX_COMPLETED {
            let ret = unsafe { raw::tx_thread_terminate(self.ptr()) };
            assert_eq!(ret, raw::TX_SUCCESS, "thread termination failed");
        }
        let ret = unsafe { raw::tx_thread_delete(self.ptr()) };
        assert_eq!(ret, raw::TX_SUCCESS, "thread deletion failed");
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sys::Thread {:?}", self.ptr())
    }
}

/// A statically defined thread control block.
///
/// Declare with [`kobj_define!`]; [`init_once`] takes the stack to use and
/// returns the [`ThreadBuilder`].
///
/// [`kobj_define!`]: crate::kobj_define
/// [`init_once`]: StaticKernelObject::init_once
pub type StaticThread = StaticKernelObject<TX_THREAD>;

unsafe impl Sync for StaticThread {}

impl Wrapped for StaticKernelObject<TX_THREAD> {
    type T = ThreadBuilder;
    type I = ThreadStack;

    fn get_wrapped(&self, stack: Self::I) -> ThreadBuilder {
        ThreadBuilder {
            raw: Fixed::Static(self.value.get()),
            stack,
            priority: Priority::default(),
            name: DEFAULT_NAME,
        }
    }
}

pub mod this_thread {
    //! Control of the current thread of execution, whichever it is.

    use super::ThreadId;
    use crate::raw;
    use crate::time::{Duration, Instant, Timeout};

    /// Yield execution so other ready threads of the same priority can run
    /// for the remainder of the time slice.
    pub fn yield_now() {
        unsafe { raw::tx_thread_relinquish() }
    }

    /// The current thread's unique identifier.
    pub fn get_id() -> ThreadId {
        let thread = unsafe { raw::tx_thread_identify() };
        ThreadId::from_ptr(thread).expect("no current thread")
    }

    /// Block the current thread for the given duration.
    pub fn sleep_for(rel_time: Duration) {
        let timeout: Timeout = rel_time.into();
        let ret = unsafe { raw::tx_thread_sleep(timeout.0) };
        assert_eq!(ret, raw::TX_SUCCESS, "sleep failed");
    }

    /// Block the current thread until the given deadline.
    pub fn sleep_until(abs_time: Instant) {
        let timeout: Timeout = abs_time.into();
        let ret = unsafe { raw::tx_thread_sleep(timeout.0) };
        assert_eq!(ret, raw::TX_SUCCESS, "sleep failed");
    }
}
