//! Mutex behavior on the hosted port: ownership, recursion, bounded waits,
//! and priority-ordered hand-off.

use threadx::kobj_define;
use threadx::sync::atomic::{AtomicU32, Ordering};
use threadx::sync::Arc;
use threadx::sys::sync::{BinarySemaphore, CountingSemaphore, Mutex, StaticMutex};
use threadx::sys::thread::ThreadBuilder;
use threadx::this_thread;
use threadx::time::{now, Duration};

#[test]
fn the_owner_query_tracks_the_holding_thread() {
    let m = Mutex::new();
    assert_eq!(m.get_locking_thread(), None);
    m.lock();
    assert_eq!(m.get_locking_thread(), Some(this_thread::get_id()));
    m.unlock();
    assert_eq!(m.get_locking_thread(), None);
}

#[test]
fn recursive_claims_nest() {
    let m = Mutex::new();
    m.lock();
    m.lock();
    assert!(m.try_lock());
    m.unlock();
    m.unlock();
    // still held until the outermost release
    assert_eq!(m.get_locking_thread(), Some(this_thread::get_id()));
    m.unlock();
    assert_eq!(m.get_locking_thread(), None);
}

#[test]
fn contended_locks_fail_within_their_bounds() {
    let m = Arc::new(Mutex::new());
    let reached = Arc::new(BinarySemaphore::new(0));
    let checks = Arc::new(AtomicU32::new(0));
    m.lock();
    let contender = {
        let (m, reached, checks) = (m.clone(), reached.clone(), checks.clone());
        let mut b = ThreadBuilder::new(4096);
        b.set_name(c"contender");
        b.spawn(move || {
            if !m.try_lock() {
                checks.fetch_or(1, Ordering::SeqCst);
            }
            let start = now();
            if !m.try_lock_for(Duration::from_ticks(5)) {
                checks.fetch_or(2, Ordering::SeqCst);
            }
            if (now() - start).ticks() >= 4 {
                checks.fetch_or(4, Ordering::SeqCst);
            }
            if !m.try_lock_until(now() + Duration::from_ticks(3)) {
                checks.fetch_or(8, Ordering::SeqCst);
            }
            reached.release(1).unwrap();
            m.lock();
            checks.fetch_or(16, Ordering::SeqCst);
            m.unlock();
            this_thread::sleep_for(Duration::from_ticks(10));
        })
    };
    reached.acquire();
    m.unlock();
    contender.join();
    assert_eq!(checks.load(Ordering::SeqCst), 0b11111);
    assert_eq!(m.get_locking_thread(), None);
}

#[test]
fn release_wakes_waiters_in_priority_order() {
    let m = Arc::new(Mutex::new());
    let held = Arc::new(BinarySemaphore::new(0));
    let done = Arc::new(CountingSemaphore::<2>::new(0));
    let seq = Arc::new(AtomicU32::new(0));
    let urgent_at = Arc::new(AtomicU32::new(0));
    let relaxed_at = Arc::new(AtomicU32::new(0));

    let holder = {
        let (m, held) = (m.clone(), held.clone());
        let mut b = ThreadBuilder::new(4096);
        b.set_priority(20);
        b.set_name(c"holder");
        b.spawn(move || {
            m.lock();
            held.release(1).unwrap();
            // let both waiters queue up
            this_thread::sleep_for(Duration::from_ticks(30));
            m.unlock();
            this_thread::sleep_for(Duration::from_ticks(20));
        })
    };
    held.acquire();

    let urgent = {
        let (m, seq, slot, done) = (m.clone(), seq.clone(), urgent_at.clone(), done.clone());
        let mut b = ThreadBuilder::new(4096);
        b.set_priority(3);
        b.set_name(c"urgent");
        b.spawn(move || {
            m.lock();
            slot.store(seq.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
            m.unlock();
            done.release(1).unwrap();
            this_thread::sleep_for(Duration::from_ticks(20));
        })
    };
    let relaxed = {
        let (m, seq, slot, done) = (m.clone(), seq.clone(), relaxed_at.clone(), done.clone());
        let mut b = ThreadBuilder::new(4096);
        b.set_priority(5);
        b.set_name(c"relaxed");
        b.spawn(move || {
            m.lock();
            slot.store(seq.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
            m.unlock();
            done.release(1).unwrap();
            this_thread::sleep_for(Duration::from_ticks(20));
        })
    };

    done.acquire();
    done.acquire();
    let (u, r) = (
        urgent_at.load(Ordering::SeqCst),
        relaxed_at.load(Ordering::SeqCst),
    );
    assert!(u >= 1 && r >= 1);
    assert!(u < r, "urgent woke at {u}, relaxed at {r}");
    urgent.join();
    relaxed.join();
    holder.join();
}

#[test]
fn data_mutexes_serialize_their_updates() {
    let total = Arc::new(threadx::sync::Mutex::new(0u32));
    let done = Arc::new(CountingSemaphore::<4>::new(0));
    let mut workers = Vec::new();
    for _ in 0..4 {
        let (total, done) = (total.clone(), done.clone());
        let mut b = ThreadBuilder::new(4096);
        b.set_name(c"adder");
        workers.push(b.spawn(move || {
            for _ in 0..250 {
                *total.lock().unwrap() += 1;
            }
            done.release(1).unwrap();
            this_thread::sleep_for(Duration::from_ticks(10));
        }));
    }
    for _ in 0..4 {
        done.acquire();
    }
    assert_eq!(*total.lock().unwrap(), 1000);
    for w in workers {
        w.join();
    }
}

kobj_define! {
    static LOCK: StaticMutex;
}

#[test]
fn static_mutexes_initialize_exactly_once() {
    let m = LOCK.init_once(()).unwrap();
    assert!(LOCK.init_once(()).is_none());
    assert!(m.try_lock());
    assert_eq!(m.get_locking_thread(), Some(this_thread::get_id()));
    m.unlock();
    assert_eq!(m.get_locking_thread(), None);
}
