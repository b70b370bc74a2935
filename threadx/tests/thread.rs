//! Thread lifecycle on the hosted port: the state machine, suspend and
//! resume, priorities, identity, and the join rendezvous.

use threadx::kobj_define;
use threadx::raw::ULONG;
use threadx::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use threadx::sync::Arc;
use threadx::sys::thread::{Priority, StaticThread, ThreadBuilder, ThreadState};
use threadx::this_thread;
use threadx::time::{now, Duration};

#[test]
fn a_fresh_thread_is_ready_and_completes_when_its_entry_returns() {
    static GO: AtomicBool = AtomicBool::new(false);
    let mut b = ThreadBuilder::new(4096);
    b.set_name(c"fresh");
    let t = b.spawn(|| {
        while !GO.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
        this_thread::sleep_for(Duration::from_ticks(10));
    });
    let state = t.get_state();
    assert!(
        matches!(state, ThreadState::Ready | ThreadState::Running),
        "fresh thread was {state:?}"
    );
    assert!(t.joinable());
    GO.store(true, Ordering::Release);
    t.join();
    assert_eq!(t.get_state(), ThreadState::Completed);
    assert!(!t.joinable());
    // terminal states are sticky
    assert_eq!(t.get_state(), ThreadState::Completed);
}

#[test]
fn suspend_and_resume_drive_the_state_machine() {
    static DONE: AtomicBool = AtomicBool::new(false);
    let mut b = ThreadBuilder::new(4096);
    b.set_name(c"pausable");
    let t = b.spawn(|| {
        while !DONE.load(Ordering::Acquire) {
            this_thread::yield_now();
        }
        this_thread::sleep_for(Duration::from_ticks(10));
    });
    t.suspend();
    assert_eq!(t.get_state(), ThreadState::Suspended);
    t.resume();
    let state = t.get_state();
    assert!(
        matches!(state, ThreadState::Ready | ThreadState::Running),
        "resumed thread was {state:?}"
    );
    DONE.store(true, Ordering::Release);
    t.join();
    assert_eq!(t.get_state(), ThreadState::Completed);
}

#[test]
fn join_blocks_until_the_entry_function_returns() {
    let mut b = ThreadBuilder::new(4096);
    b.set_name(c"sleeper");
    let before = now();
    let t = b.spawn(|| {
        this_thread::sleep_for(Duration::from_ticks(10));
    });
    assert!(t.joinable());
    t.join();
    let waited = now() - before;
    assert!(
        waited.ticks() >= 10,
        "join returned after {} ticks",
        waited.ticks()
    );
    assert_eq!(t.get_state(), ThreadState::Completed);
    assert!(!t.joinable());
}

#[test]
fn priorities_are_queried_and_changed() {
    static HOLD: AtomicBool = AtomicBool::new(true);
    let mut b = ThreadBuilder::new(4096);
    b.set_priority(7);
    b.set_name(c"reprioritized");
    let t = b.spawn(|| {
        while HOLD.load(Ordering::Acquire) {
            this_thread::yield_now();
        }
        this_thread::sleep_for(Duration::from_ticks(10));
    });
    assert_eq!(t.get_priority(), Priority(7));
    t.set_priority(9);
    assert_eq!(t.get_priority(), Priority(9));
    // the priority query is interrupt-safe
    let p = threadx::raw::hosted::inject_interrupt(|| t.get_priority());
    assert_eq!(p, Priority(9));
    HOLD.store(false, Ordering::Release);
    t.join();
}

#[test]
fn identity_and_name_are_stable_across_contexts() {
    let seen = Arc::new(threadx::sync::Mutex::new(None));
    let t = {
        let seen = seen.clone();
        let mut b = ThreadBuilder::new(4096);
        b.set_name(c"ident");
        b.spawn(move || {
            *seen.lock().unwrap() = Some(this_thread::get_id());
            this_thread::sleep_for(Duration::from_ticks(10));
        })
    };
    assert_eq!(t.get_name(), "ident");
    let id = t.get_id();
    assert_ne!(this_thread::get_id(), id);
    t.join();
    assert_eq!(*seen.lock().unwrap(), Some(id));
    assert_eq!(t.get_id(), id);
}

#[test]
fn sleeps_block_for_at_least_the_requested_time() {
    let before = now();
    this_thread::sleep_for(Duration::from_ticks(5));
    assert!((now() - before).ticks() >= 5);

    let deadline = now() + Duration::from_ticks(5);
    this_thread::sleep_until(deadline);
    assert!(now() >= deadline);
}

#[test]
fn dropping_a_live_thread_terminates_it() {
    static BEATS: AtomicUsize = AtomicUsize::new(0);
    let mut b = ThreadBuilder::new(4096);
    b.set_name(c"heartbeat");
    let t = b.spawn(|| loop {
        this_thread::sleep_for(Duration::from_ticks(1));
        BEATS.fetch_add(1, Ordering::SeqCst);
    });
    this_thread::sleep_for(Duration::from_ticks(5));
    drop(t);
    // an increment already in flight may still land, then the beat stops
    this_thread::sleep_for(Duration::from_ticks(3));
    let settled = BEATS.load(Ordering::SeqCst);
    assert!(settled >= 1);
    this_thread::sleep_for(Duration::from_ticks(5));
    assert_eq!(BEATS.load(Ordering::SeqCst), settled);
}

kobj_define! {
    static WORKER: StaticThread;
    static WORKER_STACK: StaticThreadStack<4096>;
}

static RAW_RUNS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn raw_entry(arg: ULONG) {
    RAW_RUNS.fetch_add(arg as usize, Ordering::SeqCst);
    this_thread::sleep_for(Duration::from_ticks(10));
}

#[test]
fn static_threads_spawn_through_the_raw_entry() {
    let stack = WORKER_STACK.init_once(()).unwrap();
    assert!(WORKER_STACK.init_once(()).is_none());
    let mut b = WORKER.init_once(stack).unwrap();
    b.set_priority(8);
    b.set_name(c"static-worker");
    let t = b.spawn_raw(raw_entry, 3);
    t.join();
    assert_eq!(RAW_RUNS.load(Ordering::SeqCst), 3);
    assert_eq!(t.get_state(), ThreadState::Completed);
}
