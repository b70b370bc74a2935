//! Interrupt lockout and execution-context queries on the hosted port.

use core::cell::UnsafeCell;

use threadx::cpu::CriticalSection;
use threadx::kernel;
use threadx::raw::hosted::inject_interrupt;
use threadx::sync::Arc;
use threadx::sys::sync::CountingSemaphore;
use threadx::sys::thread::ThreadBuilder;
use threadx::this_cpu;
use threadx::this_thread;
use threadx::time::{now, Duration};

struct RacyCell(UnsafeCell<u64>);

// every access is made under the critical section
unsafe impl Sync for RacyCell {}

static COUNTER: RacyCell = RacyCell(UnsafeCell::new(0));

fn bump() {
    CriticalSection::with(|| unsafe { *COUNTER.0.get() += 1 });
}

#[test]
fn no_updates_are_lost_across_threads_and_interrupts() {
    let done = Arc::new(CountingSemaphore::<4>::new(0));
    let mut workers = Vec::new();
    for _ in 0..4 {
        let done = done.clone();
        let mut b = ThreadBuilder::new(4096);
        b.set_name(c"bumper");
        workers.push(b.spawn(move || {
            for i in 0..2000 {
                bump();
                if i % 256 == 0 {
                    this_thread::yield_now();
                }
            }
            done.release(1).unwrap();
            this_thread::sleep_for(Duration::from_ticks(10));
        }));
    }
    for _ in 0..200 {
        inject_interrupt(bump);
    }
    for _ in 0..4 {
        done.acquire();
    }
    let total = CriticalSection::with(|| unsafe { *COUNTER.0.get() });
    assert_eq!(total, 4 * 2000 + 200);
    for w in workers {
        w.join();
    }
}

#[test]
fn isr_detection_tracks_interrupt_nesting() {
    // touch the kernel so it is past its initialization phases
    let _ = now();
    assert!(!this_cpu::is_in_isr());
    assert!(inject_interrupt(this_cpu::is_in_isr));
    assert!(!this_cpu::is_in_isr());
}

#[test]
fn the_kernel_reports_running_once_started() {
    let _ = now();
    assert_eq!(kernel::state(), kernel::State::Running);
    // interrupt nesting is still the running phase
    assert!(inject_interrupt(|| kernel::state() == kernel::State::Running));
}

#[test]
fn lock_and_unlock_restore_the_captured_posture() {
    let mut cs = CriticalSection::new();
    cs.lock();
    // scoped sections may stack on top of a held one
    let v = CriticalSection::with(|| 7);
    assert_eq!(v, 7);
    cs.unlock();
}

#[test]
#[should_panic(expected = "not locked")]
fn unlocking_an_unlocked_section_is_a_contract_violation() {
    let mut cs = CriticalSection::new();
    cs.unlock();
}
