//! Mutex and semaphore calls of the hosted port.

use std::boxed::Box;
use std::vec::Vec;

use super::{
    apply_priority, block_current, current_tcb, ensure_kernel, gate, isr_active, post, tcb_of,
    wait_outcome, with_kernel, Blocked, TcbRef,
};
use crate::{
    CHAR, TX_CALLER_ERROR, TX_CEILING_EXCEEDED, TX_DELETED, TX_INHERIT, TX_INVALID_CEILING,
    TX_MUTEX, TX_MUTEX_ERROR, TX_MUTEX_ID, TX_MUTEX_SUSP, TX_NOT_AVAILABLE, TX_NOT_OWNED,
    TX_NO_INSTANCE, TX_NO_WAIT, TX_PTR_ERROR, TX_SEMAPHORE, TX_SEMAPHORE_ERROR, TX_SEMAPHORE_ID,
    TX_SEMAPHORE_SUSP, TX_SUCCESS, TX_THREAD, TX_WAIT_ERROR, UINT, ULONG,
};

/// A blocked acquirer, ordered by current priority with arrival order
/// breaking ties.
pub(crate) struct Waiter {
    pub prio: UINT,
    pub seq: u64,
    pub tcb: TcbRef,
}

pub(crate) struct WaitQueue {
    waiters: Vec<Waiter>,
}

impl WaitQueue {
    fn new() -> WaitQueue {
        WaitQueue {
            waiters: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, w: Waiter) {
        let pos = self
            .waiters
            .iter()
            .position(|x| (w.prio, w.seq) < (x.prio, x.seq))
            .unwrap_or(self.waiters.len());
        self.waiters.insert(pos, w);
    }

    pub(crate) fn pop(&mut self) -> Option<Waiter> {
        if self.waiters.is_empty() {
            None
        } else {
            Some(self.waiters.remove(0))
        }
    }

    pub(crate) fn best_prio(&self) -> Option<UINT> {
        self.waiters.first().map(|w| w.prio)
    }

    fn position_of(&self, thread: *mut TX_THREAD) -> Option<usize> {
        self.waiters
            .iter()
            .position(|w| unsafe { core::ptr::eq(w.tcb.st().thread, thread) })
    }

    pub(crate) fn remove(&mut self, tcb: &TcbRef) {
        if let Some(pos) = self
            .waiters
            .iter()
            .position(|w| std::sync::Arc::ptr_eq(&w.tcb, tcb))
        {
            self.waiters.remove(pos);
        }
    }

    pub(crate) fn remove_by_thread(&mut self, thread: *mut TX_THREAD) {
        if let Some(pos) = self.position_of(thread) {
            self.waiters.remove(pos);
        }
    }

    pub(crate) fn update_prio(&mut self, thread: *mut TX_THREAD, prio: UINT) {
        if let Some(pos) = self.position_of(thread) {
            let mut w = self.waiters.remove(pos);
            w.prio = prio;
            self.push(w);
        }
    }

    fn drain(&mut self) -> Vec<Waiter> {
        core::mem::take(&mut self.waiters)
    }
}

/// Port bookkeeping hung off a mutex control block.
struct MutexPort {
    queue: WaitQueue,
}

/// Safety: interrupt lock held, semaphore created and not deleted.
pub(crate) unsafe fn semaphore_queue<'a>(sem: *mut TX_SEMAPHORE) -> &'a mut WaitQueue {
    &mut *((*sem).tx_semaphore_port as *mut WaitQueue)
}

/// Safety: interrupt lock held, mutex created and not deleted.
pub(crate) unsafe fn mutex_queue<'a>(mutex: *mut TX_MUTEX) -> &'a mut WaitQueue {
    &mut *((*mutex).tx_mutex_port as *mut MutexPort).cast::<WaitQueue>()
}

enum Attempt {
    Done(UINT),
    Blocked,
}

// ---------------------------------------------------------------------------
// Semaphores
// ---------------------------------------------------------------------------

/// Create a counting semaphore in place with the given initial count.
pub unsafe fn tx_semaphore_create(
    sem: *mut TX_SEMAPHORE,
    name: *const CHAR,
    initial_count: ULONG,
) -> UINT {
    ensure_kernel();
    if sem.is_null() {
        return TX_PTR_ERROR;
    }
    if (*sem).tx_semaphore_id == TX_SEMAPHORE_ID {
        return TX_SEMAPHORE_ERROR;
    }
    let queue: *mut WaitQueue = Box::into_raw(Box::new(WaitQueue::new()));
    with_kernel(|_| unsafe {
        (*sem).tx_semaphore_id = TX_SEMAPHORE_ID;
        (*sem).tx_semaphore_name = name;
        (*sem).tx_semaphore_count = initial_count;
        (*sem).tx_semaphore_port = queue.cast();
    });
    TX_SUCCESS
}

/// Take one count, waiting up to `wait_option` ticks.
pub unsafe fn tx_semaphore_get(sem: *mut TX_SEMAPHORE, wait_option: ULONG) -> UINT {
    if sem.is_null() || (*sem).tx_semaphore_id != TX_SEMAPHORE_ID {
        return TX_SEMAPHORE_ERROR;
    }
    let me = current_tcb();
    gate(&me);
    let attempt = with_kernel(|k| unsafe {
        if isr_active(k) && wait_option != TX_NO_WAIT {
            return Attempt::Done(TX_WAIT_ERROR);
        }
        if (*sem).tx_semaphore_count > 0 {
            (*sem).tx_semaphore_count -= 1;
            return Attempt::Done(TX_SUCCESS);
        }
        if wait_option == TX_NO_WAIT {
            return Attempt::Done(TX_NO_INSTANCE);
        }
        let w = block_current(k, &me, Blocked::OnSemaphore(sem), TX_SEMAPHORE_SUSP, wait_option);
        semaphore_queue(sem).push(w);
        Attempt::Blocked
    });
    match attempt {
        Attempt::Done(code) => code,
        Attempt::Blocked => {
            let code = wait_outcome(&me);
            gate(&me);
            code
        }
    }
}

/// Give one count.  A pending acquirer, if any, receives it directly, in
/// priority order.
pub unsafe fn tx_semaphore_put(sem: *mut TX_SEMAPHORE) -> UINT {
    if sem.is_null() || (*sem).tx_semaphore_id != TX_SEMAPHORE_ID {
        return TX_SEMAPHORE_ERROR;
    }
    let wake = with_kernel(|_| unsafe {
        match semaphore_queue(sem).pop() {
            Some(w) => Some(post(w.tcb.st(), TX_SUCCESS)),
            None => {
                (*sem).tx_semaphore_count += 1;
                None
            }
        }
    });
    if let Some(w) = wake {
        w.unpark();
    }
    TX_SUCCESS
}

/// Give one count unless the count has already reached `ceiling`.
pub unsafe fn tx_semaphore_ceiling_put(sem: *mut TX_SEMAPHORE, ceiling: ULONG) -> UINT {
    if sem.is_null() || (*sem).tx_semaphore_id != TX_SEMAPHORE_ID {
        return TX_SEMAPHORE_ERROR;
    }
    if ceiling == 0 {
        return TX_INVALID_CEILING;
    }
    let (code, wake) = with_kernel(|_| unsafe {
        if let Some(w) = semaphore_queue(sem).pop() {
            return (TX_SUCCESS, Some(post(w.tcb.st(), TX_SUCCESS)));
        }
        if (*sem).tx_semaphore_count >= ceiling {
            (TX_CEILING_EXCEEDED, None)
        } else {
            (*sem).tx_semaphore_count += 1;
            (TX_SUCCESS, None)
        }
    });
    if let Some(w) = wake {
        w.unpark();
    }
    code
}

/// Delete a semaphore; pending acquirers fail with [`TX_DELETED`].
pub unsafe fn tx_semaphore_delete(sem: *mut TX_SEMAPHORE) -> UINT {
    if sem.is_null() || (*sem).tx_semaphore_id != TX_SEMAPHORE_ID {
        return TX_SEMAPHORE_ERROR;
    }
    let wakes = with_kernel(|_| unsafe {
        let mut queue = Box::from_raw((*sem).tx_semaphore_port as *mut WaitQueue);
        (*sem).tx_semaphore_id = 0;
        (*sem).tx_semaphore_port = core::ptr::null_mut();
        queue
            .drain()
            .into_iter()
            .map(|w| post(w.tcb.st(), TX_DELETED))
            .collect::<Vec<_>>()
    });
    for w in wakes {
        w.unpark();
    }
    TX_SUCCESS
}

// ---------------------------------------------------------------------------
// Mutexes
// ---------------------------------------------------------------------------

/// Create a mutex in place.  `inherit` selects priority inheritance.
pub unsafe fn tx_mutex_create(mutex: *mut TX_MUTEX, name: *const CHAR, inherit: UINT) -> UINT {
    ensure_kernel();
    if mutex.is_null() {
        return TX_PTR_ERROR;
    }
    if (*mutex).tx_mutex_id == TX_MUTEX_ID {
        return TX_MUTEX_ERROR;
    }
    if inherit > TX_INHERIT {
        return TX_MUTEX_ERROR;
    }
    let port: *mut MutexPort = Box::into_raw(Box::new(MutexPort {
        queue: WaitQueue::new(),
    }));
    with_kernel(|_| unsafe {
        (*mutex).tx_mutex_id = TX_MUTEX_ID;
        (*mutex).tx_mutex_name = name;
        (*mutex).tx_mutex_owner = core::ptr::null_mut();
        (*mutex).tx_mutex_ownership_count = 0;
        (*mutex).tx_mutex_inherit = inherit;
        (*mutex).tx_mutex_port = port.cast();
    });
    TX_SUCCESS
}

/// Obtain the mutex, waiting up to `wait_option` ticks.  Recursive claims by
/// the owner nest.  With inheritance enabled, a more urgent waiter elevates
/// the owner until release.
pub unsafe fn tx_mutex_get(mutex: *mut TX_MUTEX, wait_option: ULONG) -> UINT {
    if mutex.is_null() || (*mutex).tx_mutex_id != TX_MUTEX_ID {
        return TX_MUTEX_ERROR;
    }
    let me = current_tcb();
    gate(&me);
    let attempt = with_kernel(|k| unsafe {
        if isr_active(k) {
            return Attempt::Done(TX_CALLER_ERROR);
        }
        let my_thread = me.st().thread;
        let owner = (*mutex).tx_mutex_owner;
        if owner.is_null() {
            (*mutex).tx_mutex_owner = my_thread;
            (*mutex).tx_mutex_ownership_count = 1;
            return Attempt::Done(TX_SUCCESS);
        }
        if core::ptr::eq(owner, my_thread) {
            (*mutex).tx_mutex_ownership_count += 1;
            return Attempt::Done(TX_SUCCESS);
        }
        if wait_option == TX_NO_WAIT {
            return Attempt::Done(TX_NOT_AVAILABLE);
        }
        if (*mutex).tx_mutex_inherit == TX_INHERIT {
            let my_prio = (*my_thread).tx_thread_priority;
            if my_prio < (*owner).tx_thread_priority {
                let owner_st = tcb_of(owner).st();
                owner_st.inherited = Some(match owner_st.inherited {
                    Some(i) => i.min(my_prio),
                    None => my_prio,
                });
                apply_priority(owner_st);
            }
        }
        let w = block_current(k, &me, Blocked::OnMutex(mutex), TX_MUTEX_SUSP, wait_option);
        mutex_queue(mutex).push(w);
        Attempt::Blocked
    });
    match attempt {
        Attempt::Done(code) => code,
        Attempt::Blocked => {
            let code = wait_outcome(&me);
            gate(&me);
            code
        }
    }
}

/// Release the mutex.  Only the owner may release; the final release hands
/// ownership to the most urgent waiter and drops any inherited elevation.
pub unsafe fn tx_mutex_put(mutex: *mut TX_MUTEX) -> UINT {
    if mutex.is_null() || (*mutex).tx_mutex_id != TX_MUTEX_ID {
        return TX_MUTEX_ERROR;
    }
    let me = current_tcb();
    let (code, wake) = with_kernel(|_| unsafe {
        let my_thread = me.st().thread;
        if !core::ptr::eq((*mutex).tx_mutex_owner, my_thread) {
            return (TX_NOT_OWNED, None);
        }
        (*mutex).tx_mutex_ownership_count -= 1;
        if (*mutex).tx_mutex_ownership_count > 0 {
            return (TX_SUCCESS, None);
        }
        let my_st = me.st();
        my_st.inherited = None;
        apply_priority(my_st);
        match mutex_queue(mutex).pop() {
            Some(w) => {
                let new_owner = w.tcb.st().thread;
                (*mutex).tx_mutex_owner = new_owner;
                (*mutex).tx_mutex_ownership_count = 1;
                if (*mutex).tx_mutex_inherit == TX_INHERIT {
                    if let Some(best) = mutex_queue(mutex).best_prio() {
                        if best < (*new_owner).tx_thread_priority {
                            let owner_st = w.tcb.st();
                            owner_st.inherited = Some(best);
                            apply_priority(owner_st);
                        }
                    }
                }
                (TX_SUCCESS, Some(post(w.tcb.st(), TX_SUCCESS)))
            }
            None => {
                (*mutex).tx_mutex_owner = core::ptr::null_mut();
                (TX_SUCCESS, None)
            }
        }
    });
    if let Some(w) = wake {
        w.unpark();
    }
    code
}

/// Delete a mutex; pending claimants fail with [`TX_DELETED`].
pub unsafe fn tx_mutex_delete(mutex: *mut TX_MUTEX) -> UINT {
    if mutex.is_null() || (*mutex).tx_mutex_id != TX_MUTEX_ID {
        return TX_MUTEX_ERROR;
    }
    let wakes = with_kernel(|_| unsafe {
        let mut port = Box::from_raw((*mutex).tx_mutex_port as *mut MutexPort);
        (*mutex).tx_mutex_id = 0;
        (*mutex).tx_mutex_owner = core::ptr::null_mut();
        (*mutex).tx_mutex_port = core::ptr::null_mut();
        port.queue
            .drain()
            .into_iter()
            .map(|w| post(w.tcb.st(), TX_DELETED))
            .collect::<Vec<_>>()
    });
    for w in wakes {
        w.unpark();
    }
    TX_SUCCESS
}
