//! Thread control calls of the hosted port.

use core::ffi::c_void;
use std::string::ToString;
use std::sync::Arc;
use std::thread as os;

use super::{
    block_current, current_tcb, ensure_kernel, gate, isr_active, set_current, sync, tcb_of,
    wait_outcome, with_kernel, Blocked, Tcb, TcbState,
};
use crate::{
    tx_entry_exit_notify_t, tx_thread_entry_t, TX_AUTO_START, TX_CALLER_ERROR, TX_COMPLETED,
    TX_DELETE_ERROR, TX_MAX_PRIORITIES, TX_MINIMUM_STACK, TX_PRIORITY_ERROR, TX_PTR_ERROR,
    TX_READY, TX_RESUME_ERROR, TX_SIZE_ERROR, TX_SLEEP, TX_SUCCESS, TX_SUSPENDED,
    TX_SUSPEND_ERROR, TX_SUSPEND_LIFTED, TX_TERMINATED, TX_THREAD, TX_THREAD_ENTRY,
    TX_THREAD_ERROR, TX_THREAD_EXIT, TX_THREAD_ID, UINT, ULONG,
};

struct ThreadPtr(*mut TX_THREAD);
unsafe impl Send for ThreadPtr {}

unsafe fn valid(thread: *mut TX_THREAD) -> bool {
    !thread.is_null() && (*thread).tx_thread_id == TX_THREAD_ID
}

/// Create a thread in place and make it eligible to run (with
/// [`TX_AUTO_START`]) before returning.
pub unsafe fn tx_thread_create(
    thread: *mut TX_THREAD,
    name: *const crate::CHAR,
    entry: tx_thread_entry_t,
    entry_input: ULONG,
    stack_start: *mut c_void,
    stack_size: ULONG,
    priority: UINT,
    _preempt_threshold: UINT,
    _time_slice: ULONG,
    auto_start: UINT,
) -> UINT {
    ensure_kernel();
    if thread.is_null() || stack_start.is_null() {
        return TX_PTR_ERROR;
    }
    if (*thread).tx_thread_id == TX_THREAD_ID {
        return TX_THREAD_ERROR;
    }
    let entry = match entry {
        Some(f) => f,
        None => return TX_PTR_ERROR,
    };
    if stack_size < TX_MINIMUM_STACK {
        return TX_SIZE_ERROR;
    }
    if priority >= TX_MAX_PRIORITIES {
        return TX_PRIORITY_ERROR;
    }

    let started = auto_start == TX_AUTO_START;
    let tcb = Arc::new(Tcb::new(TcbState {
        thread,
        os: None,
        started,
        suspended: !started,
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
        (*thread).tx_thread_name = name;
        (*thread).tx_thread_state = if started { TX_READY } else { TX_SUSPENDED };
        (*thread).tx_thread_priority = priority;
        (*thread).tx_thread_user_priority = priority;
        (*thread).tx_thread_entry_exit_notify = None;
        (*thread).tx_thread_entry_exit_param = core::ptr::null_mut();
        (*thread).tx_thread_stack_start = stack_start;
        (*thread).tx_thread_stack_size = stack_size;
        (*thread).tx_thread_port = Arc::into_raw(tcb.clone()) as *mut c_void;
    });

    let os_name = if name.is_null() {
        "tx-thread".to_string()
    } else {
        core::ffi::CStr::from_ptr(name).to_string_lossy().into_owned()
    };
    let child = tcb.clone();
    let tp = ThreadPtr(thread);
    let spawned = os::Builder::new().name(os_name).spawn(move || {
        let tp = tp;
        run_thread(child, tp.0, entry, entry_input);
    });
    match spawned {
        Ok(handle) => {
            with_kernel(|_| unsafe { tcb.st().os = Some(handle.thread().clone()) });
            TX_SUCCESS
        }
        Err(_) => {
            with_kernel(|_| unsafe {
                (*thread).tx_thread_id = 0;
                let _ = Arc::from_raw((*thread).tx_thread_port as *const Tcb);
                (*thread).tx_thread_port = core::ptr::null_mut();
            });
            TX_THREAD_ERROR
        }
    }
}

fn run_thread(
    tcb: Arc<Tcb>,
    thread: *mut TX_THREAD,
    entry: unsafe extern "C" fn(ULONG),
    input: ULONG,
) {
    set_current(tcb.clone());
    with_kernel(|_| unsafe {
        // the creator may not have stored the handle yet
        tcb.st().os = Some(os::current());
    });
    // Wait out TX_DONT_START and any pre-run suspension.
    gate(&tcb);

    let notify = with_kernel(|_| unsafe {
        let st = tcb.st();
        if st.deleted {
            None
        } else {
            (*st.thread).tx_thread_entry_exit_notify.map(|f| (f, st.thread))
        }
    });
    if let Some((f, t)) = notify {
        unsafe { f(t, TX_THREAD_ENTRY) };
    }

    unsafe { entry(input) };

    let notify = with_kernel(|_| unsafe {
        let st = tcb.st();
        if st.terminated || st.deleted {
            // termination already signalled the observer
            None
        } else {
            (*st.thread).tx_thread_state = TX_COMPLETED;
            (*st.thread).tx_thread_entry_exit_notify.map(|f| (f, st.thread))
        }
    });
    if let Some((f, t)) = notify {
        unsafe { f(t, TX_THREAD_EXIT) };
    }
    let _ = thread;
}

/// Forcibly end a thread.  The observer callback fires with
/// [`TX_THREAD_EXIT`]; on this port the backing OS thread is held at its
/// next kernel-call boundary rather than stopped mid-instruction.
pub unsafe fn tx_thread_terminate(thread: *mut TX_THREAD) -> UINT {
    if !valid(thread) {
        return TX_THREAD_ERROR;
    }
    let notify = with_kernel(|_| unsafe {
        let st = tcb_of(thread).st();
        let state = (*thread).tx_thread_state;
        if st.terminated || state == TX_COMPLETED {
            return None;
        }
        st.terminated = true;
        st.wait_stamp += 1;
        match st.blocked {
            Blocked::OnSemaphore(s) => {
                sync::semaphore_queue(s).remove_by_thread(thread);
            }
            Blocked::OnMutex(m) => {
                sync::mutex_queue(m).remove_by_thread(thread);
            }
            _ => {}
        }
        st.blocked = Blocked::None;
        (*thread).tx_thread_state = TX_TERMINATED;
        (*thread).tx_thread_entry_exit_notify.map(|f| (f, thread))
    });
    if let Some((f, t)) = notify {
        f(t, TX_THREAD_EXIT);
    }
    TX_SUCCESS
}

/// Delete a completed or terminated thread's control block.
pub unsafe fn tx_thread_delete(thread: *mut TX_THREAD) -> UINT {
    if !valid(thread) {
        return TX_THREAD_ERROR;
    }
    with_kernel(|_| unsafe {
        let state = (*thread).tx_thread_state;
        if state != TX_COMPLETED && state != TX_TERMINATED {
            return TX_DELETE_ERROR;
        }
        tcb_of(thread).st().deleted = true;
        (*thread).tx_thread_id = 0;
        let _ = Arc::from_raw((*thread).tx_thread_port as *const Tcb);
        (*thread).tx_thread_port = core::ptr::null_mut();
        TX_SUCCESS
    })
}

pub unsafe fn tx_thread_suspend(thread: *mut TX_THREAD) -> UINT {
    if !valid(thread) {
        return TX_THREAD_ERROR;
    }
    let me = current_tcb();
    let is_self = with_kernel(|_| unsafe {
        let target = tcb_of(thread);
        let st = target.st();
        let state = (*thread).tx_thread_state;
        if st.terminated || state == TX_COMPLETED {
            return Err(TX_SUSPEND_ERROR);
        }
        if st.suspended {
            return Err(TX_SUCCESS);
        }
        if matches!(st.blocked, Blocked::None) {
            st.suspended = true;
            (*thread).tx_thread_state = TX_SUSPENDED;
        } else {
            st.suspend_pending = true;
        }
        Ok(core::ptr::eq(me.st().thread, thread))
    });
    match is_self {
        Err(code) => code,
        Ok(true) => {
            // park ourselves at this boundary
            gate(&me);
            TX_SUCCESS
        }
        Ok(false) => TX_SUCCESS,
    }
}

pub unsafe fn tx_thread_resume(thread: *mut TX_THREAD) -> UINT {
    if !valid(thread) {
        return TX_THREAD_ERROR;
    }
    let (code, wake) = with_kernel(|_| unsafe {
        let st = tcb_of(thread).st();
        if st.terminated || (*thread).tx_thread_state == TX_COMPLETED {
            return (TX_RESUME_ERROR, None);
        }
        if st.suspend_pending {
            st.suspend_pending = false;
            return (TX_SUSPEND_LIFTED, None);
        }
        if !st.suspended {
            return (TX_RESUME_ERROR, None);
        }
        st.suspended = false;
        st.started = true;
        (*thread).tx_thread_state = TX_READY;
        (TX_SUCCESS, st.os.clone())
    });
    if let Some(w) = wake {
        w.unpark();
    }
    code
}

/// Put the calling thread to sleep for the given number of ticks.
pub unsafe fn tx_thread_sleep(ticks: ULONG) -> UINT {
    ensure_kernel();
    if with_kernel(|k| isr_active(k)) {
        return TX_CALLER_ERROR;
    }
    let me = current_tcb();
    gate(&me);
    if ticks == 0 {
        return TX_SUCCESS;
    }
    with_kernel(|k| unsafe {
        let _ = block_current(k, &me, Blocked::Sleeping, TX_SLEEP, ticks);
    });
    let code = wait_outcome(&me);
    gate(&me);
    code
}

/// Yield the remainder of the time slice.
pub unsafe fn tx_thread_relinquish() {
    let me = current_tcb();
    gate(&me);
    os::yield_now();
}

/// The currently executing thread, or null from interrupt context.
pub unsafe fn tx_thread_identify() -> *mut TX_THREAD {
    if with_kernel(|k| isr_active(k)) {
        return core::ptr::null_mut();
    }
    let me = current_tcb();
    with_kernel(|_| unsafe { me.st().thread })
}

pub unsafe fn tx_thread_priority_change(
    thread: *mut TX_THREAD,
    new_priority: UINT,
    old_priority: *mut UINT,
) -> UINT {
    if !valid(thread) {
        return TX_THREAD_ERROR;
    }
    if old_priority.is_null() {
        return TX_PTR_ERROR;
    }
    if new_priority >= TX_MAX_PRIORITIES {
        return TX_PRIORITY_ERROR;
    }
    with_kernel(|_| unsafe {
        let st = tcb_of(thread).st();
        *old_priority = (*thread).tx_thread_user_priority;
        (*thread).tx_thread_user_priority = new_priority;
        super::apply_priority(st);
        let effective = (*thread).tx_thread_priority;
        match st.blocked {
            Blocked::OnSemaphore(s) => sync::semaphore_queue(s).update_prio(thread, effective),
            Blocked::OnMutex(m) => sync::mutex_queue(m).update_prio(thread, effective),
            _ => {}
        }
    });
    TX_SUCCESS
}

/// Install (or clear) the entry/exit observer callback.
pub unsafe fn tx_thread_entry_exit_notify(
    thread: *mut TX_THREAD,
    notify: tx_entry_exit_notify_t,
) -> UINT {
    if !valid(thread) {
        return TX_THREAD_ERROR;
    }
    with_kernel(|_| unsafe { (*thread).tx_thread_entry_exit_notify = notify });
    TX_SUCCESS
}
