//! Semaphore behavior on the hosted port: count bounds, timed acquisition,
//! and the best-effort multi-unit release.

use threadx::kobj_define;
use threadx::sync::Arc;
use threadx::sys::sync::{BinarySemaphore, CountingSemaphore, StaticSemaphore};
use threadx::sys::thread::ThreadBuilder;
use threadx::this_thread;
use threadx::time::{now, Duration, Instant};

#[test]
fn try_acquire_matches_a_zero_duration_wait() {
    let sem = BinarySemaphore::new(0);
    assert!(!sem.try_acquire());
    assert!(!sem.try_acquire_for(Duration::from_ticks(0)));
    sem.release(1).unwrap();
    assert!(sem.try_acquire_for(Duration::from_ticks(0)));
    assert_eq!(sem.get_count(), 0);
    sem.release(1).unwrap();
    assert!(sem.try_acquire());
    assert_eq!(sem.get_count(), 0);
}

#[test]
fn binary_round_trip_leaves_the_count_unchanged() {
    let sem = BinarySemaphore::new(1);
    assert_eq!(sem.get_count(), 1);
    sem.acquire();
    assert_eq!(sem.get_count(), 0);
    sem.release(1).unwrap();
    assert_eq!(sem.get_count(), 1);
}

#[test]
fn the_count_never_exceeds_the_maximum() {
    let sem = CountingSemaphore::<3>::new(3);
    assert_eq!(sem.get_count(), 3);
    assert!(sem.release(1).is_err());
    assert_eq!(sem.get_count(), 3);
}

#[test]
fn over_release_is_best_effort_with_no_rollback() {
    let sem = CountingSemaphore::<3>::new(1);
    // Two of the five gives fit; the third is refused and the first two
    // stay in place.
    let err = sem.release(5).unwrap_err();
    assert_eq!(err.0, threadx::raw::TX_CEILING_EXCEEDED);
    assert_eq!(sem.get_count(), 3);
}

#[test]
fn timeout_behavior_is_monotonic_around_availability() {
    let sem = Arc::new(BinarySemaphore::new(0));
    let giver = {
        let sem = sem.clone();
        let mut b = ThreadBuilder::new(4096);
        b.set_name(c"giver");
        b.spawn(move || {
            this_thread::sleep_for(Duration::from_ticks(30));
            sem.release(1).unwrap();
            this_thread::sleep_for(Duration::from_ticks(20));
        })
    };
    // A bound short of the give fails...
    assert!(!sem.try_acquire_for(Duration::from_ticks(10)));
    // ...and a bound spanning it succeeds.
    assert!(sem.try_acquire_for(Duration::from_ticks(300)));
    assert_eq!(sem.get_count(), 0);
    giver.join();
}

#[test]
fn deadline_expiry_reports_failure_and_takes_nothing() {
    let sem = BinarySemaphore::new(0);
    let start = now();
    assert!(!sem.try_acquire_until(now() + Duration::from_ticks(20)));
    let waited = now() - start;
    assert!(waited.ticks() >= 19, "only waited {} ticks", waited.ticks());
    assert_eq!(sem.get_count(), 0);
}

#[test]
fn past_deadlines_poll_instead_of_blocking() {
    let sem = BinarySemaphore::new(0);
    let start = now();
    assert!(!sem.try_acquire_until(Instant::from_ticks(0)));
    assert!((now() - start).ticks() <= 2);
    sem.release(1).unwrap();
    assert!(sem.try_acquire_until(Instant::from_ticks(0)));
}

#[test]
fn the_count_is_readable_from_interrupt_context() {
    let sem = CountingSemaphore::<4>::new(2);
    let count = threadx::raw::hosted::inject_interrupt(|| sem.get_count());
    assert_eq!(count, 2);
}

kobj_define! {
    static SIGNAL: StaticSemaphore;
}

#[test]
fn static_semaphores_initialize_exactly_once() {
    let sem = SIGNAL.init_once((1, 2)).unwrap();
    assert!(SIGNAL.init_once((1, 2)).is_none());
    sem.acquire();
    sem.release(2).unwrap();
    assert_eq!(sem.get_count(), 2);
    assert!(sem.release(1).is_err());
}
