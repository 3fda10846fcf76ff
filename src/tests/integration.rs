//! Whole-kernel scenarios: scheduling order, sleep/wake timing, mutex
//! priority inheritance, semaphore hand-off and the combined two-task
//! sleep/interleave run.

use super::helpers::{kernel, spawn};
use crate::arch::NoOpArch;
use crate::errors::KernelError;
use crate::sync::{Mutex, Semaphore};
use crate::task::{state, Location, TaskId};

use std::vec::Vec;

#[test]
fn higher_priority_task_always_selected() {
    let k = kernel(3, 4);
    let a = spawn(&k, 1);
    let b = spawn(&k, 2);
    for _ in 0..10 {
        let picked = k.schedule_next();
        assert_eq!(picked, a);
        assert_ne!(picked, b);
    }
}

#[test]
fn idle_only_when_nothing_ready() {
    let k = kernel(2, 2);
    assert_eq!(k.schedule_next(), TaskId::IDLE);
    let a = spawn(&k, 1);
    assert_eq!(k.schedule_next(), a);
}

#[test]
fn round_robin_within_a_level() {
    let k = kernel(2, 4);
    let ids = [spawn(&k, 1), spawn(&k, 1), spawn(&k, 1)];

    let first: Vec<TaskId> = (0..3).map(|_| k.schedule_next()).collect();
    for id in ids {
        assert!(first.contains(&id));
    }
    let second: Vec<TaskId> = (0..3).map(|_| k.schedule_next()).collect();
    assert_eq!(first, second);
}

#[test]
fn yield_flag_set_then_cleared_on_selection() {
    let k = kernel(2, 2);
    let a = spawn(&k, 1);
    assert_eq!(k.schedule_next(), a);
    k.yield_now();
    assert_ne!(k.task(a).state() & state::YIELD, 0);
    assert_eq!(k.schedule_next(), a);
    assert_eq!(k.task(a).state() & state::YIELD, 0);
}

#[test]
fn sleeping_task_not_selected_until_wake_tick() {
    let k = kernel(2, 4);
    let a = spawn(&k, 1);
    let b = spawn(&k, 1);

    let sleeper = k.schedule_next();
    let awake = if sleeper == a { b } else { a };

    k.sleep(5);
    assert_eq!(k.task(sleeper).location(), Location::Sleeping);
    assert_ne!(k.task(sleeper).state() & state::SLEEP, 0);

    for _ in 0..5 {
        assert_eq!(k.schedule_next(), awake);
        k.tick();
    }
    // Wake tick reached; the sleeper comes back and is next in rotation.
    assert_eq!(k.elapsed_ticks(), 5);
    assert_eq!(k.schedule_next(), sleeper);
    assert_eq!(k.task(sleeper).state() & state::SLEEP, 0);
}

#[test]
fn task_exit_removes_for_good() {
    let k = kernel(2, 2);
    let a = spawn(&k, 1);
    let b = spawn(&k, 1);
    let gone = k.schedule_next();
    k.task_exit();
    assert_eq!(k.task(gone).location(), Location::None);
    let survivor = if gone == a { b } else { a };
    for _ in 0..4 {
        assert_eq!(k.schedule_next(), survivor);
    }
}

#[test]
fn task_arena_capacity_is_enforced() {
    let k = kernel(1, 2);
    spawn(&k, 1);
    spawn(&k, 1);
    let err = k
        .initialise_task(0x2000_0000, |_| {}, 0, 1)
        .unwrap_err();
    assert_eq!(err, KernelError::CapacityExceeded(2));
}

#[test]
fn out_of_range_priorities_fall_to_lowest_level() {
    let k = kernel(4, 4);
    let zero = k.initialise_task(0, |_| {}, 0, 0).unwrap();
    let over = k.initialise_task(0, |_| {}, 0, 200).unwrap();
    let valid = k.initialise_task(0, |_| {}, 0, 2).unwrap();
    assert_eq!(k.task(zero).priority(), 3);
    assert_eq!(k.task(over).priority(), 3);
    assert_eq!(k.task(valid).priority(), 1);
}

#[test]
fn mutex_priority_inheritance_boosts_and_restores() {
    let k = kernel(3, 4);
    let m = Mutex::new(4);

    let low = spawn(&k, 2);
    assert_eq!(k.schedule_next(), low);
    k.mutex_acquire(&m);
    assert_eq!(m.owner(), Some(low));

    let high = spawn(&k, 1);
    assert_eq!(k.schedule_next(), high);

    // High finds the mutex busy and blocks; the owner inherits its level.
    let check = m.generation();
    assert!(!m.claim_or_reenter(high));
    k.mutex_wait(&m, check);
    assert_eq!(k.task(high).location(), Location::MutexWait);
    assert_eq!(k.task(low).priority(), 0);
    assert_eq!(k.task(low).location(), Location::Pending);

    // The boosted owner is the only runnable task and finishes its
    // critical section.
    assert_eq!(k.schedule_next(), low);
    k.mutex_release(&m);
    assert_eq!(m.owner(), None);
    assert_eq!(m.recursion_count(), 0);
    assert_eq!(k.task(low).priority(), 1);

    // The released waiter wins the next decision and takes the lock.
    assert_eq!(k.schedule_next(), high);
    k.mutex_acquire(&m);
    assert_eq!(m.owner(), Some(high));
    assert_eq!(m.recursion_count(), 1);
}

#[test]
fn mutex_recursive_acquire_needs_matching_releases() {
    let k = kernel(2, 2);
    let a = spawn(&k, 1);
    let m = Mutex::new(2);

    assert_eq!(k.schedule_next(), a);
    k.mutex_acquire(&m);
    k.mutex_acquire(&m);
    assert_eq!(m.recursion_count(), 2);

    k.mutex_release(&m);
    assert_eq!(m.owner(), Some(a));
    k.mutex_release(&m);
    assert_eq!(m.owner(), None);
}

#[test]
fn mutex_release_by_non_owner_is_a_no_op() {
    let k = kernel(2, 4);
    let owner = spawn(&k, 1);
    let other = spawn(&k, 1);

    k.set_current(owner);
    let m = Mutex::new(2);
    k.mutex_acquire(&m);

    k.set_current(other);
    k.mutex_release(&m);
    assert_eq!(m.owner(), Some(owner));
    assert_eq!(m.recursion_count(), 1);
}

#[test]
fn mutex_wait_skipped_when_release_raced_the_block() {
    let k = kernel(2, 4);
    let owner = spawn(&k, 1);
    let waiter = spawn(&k, 1);
    let m = Mutex::new(2);

    k.set_current(owner);
    k.mutex_acquire(&m);

    // The waiter observes the mutex busy...
    let check = m.generation();
    assert!(!m.claim_or_reenter(waiter));

    // ...but the release lands before it blocks.
    k.mutex_release(&m);

    k.set_current(waiter);
    k.mutex_wait(&m, check);
    assert_eq!(k.task(waiter).location(), Location::Ready);
    assert!(m.claim_or_reenter(waiter));
}

#[test]
fn semaphore_two_tokens_block_the_third_taker() {
    let k = kernel(2, 4);
    let sem = Semaphore::new(2);
    let t1 = spawn(&k, 1);
    let t2 = spawn(&k, 1);
    let t3 = spawn(&k, 1);

    k.set_current(t1);
    k.semaphore_acquire(&sem);
    k.set_current(t2);
    k.semaphore_acquire(&sem);
    assert_eq!(sem.tokens(), 0);

    k.set_current(t3);
    let check = sem.generation();
    assert!(!sem.try_take_token());
    k.semaphore_wait(&sem, check);
    assert_eq!(k.task(t3).location(), Location::SemWait);

    // One release unblocks exactly the one waiter.
    k.set_current(t1);
    k.semaphore_release(&sem);
    assert_eq!(k.task(t3).location(), Location::Pending);
    let picked = k.schedule_next();
    assert_eq!(k.task(t3).location(), Location::Ready);
    assert!(picked == t2 || picked == t3);
    assert!(sem.try_take_token());
}

#[test]
fn semaphore_wakes_waiters_in_fifo_order() {
    let k = kernel(2, 4);
    let sem = Semaphore::new(0);
    let w1 = spawn(&k, 1);
    let w2 = spawn(&k, 1);

    k.set_current(w1);
    k.semaphore_wait(&sem, sem.generation());
    k.set_current(w2);
    k.semaphore_wait(&sem, sem.generation());

    k.semaphore_release(&sem);
    assert_eq!(k.task(w1).location(), Location::Pending);
    assert_eq!(k.task(w2).location(), Location::SemWait);
    k.semaphore_release(&sem);
    assert_eq!(k.task(w2).location(), Location::Pending);
}

#[test]
fn semaphore_wait_skipped_when_release_raced_the_block() {
    let k = kernel(2, 2);
    let t = spawn(&k, 1);
    let sem = Semaphore::new(0);

    k.set_current(t);
    let check = sem.generation();
    k.semaphore_release(&sem);
    k.semaphore_wait(&sem, check);
    assert_eq!(k.task(t).location(), Location::Ready);
    assert!(sem.try_take_token());
}

#[test]
fn semaphore_release_paths_differ_by_context() {
    let k = kernel(2, 2);
    let t = spawn(&k, 1);
    assert_eq!(k.schedule_next(), t);
    let sem = Semaphore::new(0);

    NoOpArch::set_interrupt_context(true);
    let before = NoOpArch::reschedule_requests();
    k.semaphore_release(&sem);
    assert!(NoOpArch::reschedule_requests() > before);
    assert_eq!(k.task(t).state() & state::YIELD, 0);
    NoOpArch::set_interrupt_context(false);

    k.semaphore_release(&sem);
    assert_ne!(k.task(t).state() & state::YIELD, 0);
}

#[test]
fn global_wait_blocks_until_notify_all() {
    let k = kernel(2, 4);
    let a = spawn(&k, 1);
    let b = spawn(&k, 1);

    let check = k.notification_count();
    k.set_current(a);
    k.wait(check);
    k.set_current(b);
    k.wait(check);
    assert_eq!(k.task(a).location(), Location::NotifyWait);
    assert_eq!(k.task(b).location(), Location::NotifyWait);

    k.notify_all();
    assert_eq!(k.notification_count(), check + 1);
    assert_eq!(k.task(a).location(), Location::Pending);
    assert_eq!(k.task(b).location(), Location::Pending);

    // A stale check code no longer blocks.
    k.schedule_next();
    k.set_current(a);
    k.wait(check);
    assert_eq!(k.task(a).location(), Location::Ready);
}

#[test]
fn two_task_sleep_scenario_over_a_thousand_ticks() {
    let k = kernel(1, 2);
    let t1 = spawn(&k, 1); // sleeps 500 ticks whenever it runs
    let t2 = spawn(&k, 1); // never sleeps

    let mut t1_runs = 0;
    for _ in 0..1000 {
        let current = k.schedule_next();
        assert_ne!(current, TaskId::IDLE);
        if current == t1 {
            t1_runs += 1;
            k.sleep(500);
            // While t1 sleeps, t2 owns the CPU.
            assert_eq!(k.schedule_next(), t2);
        } else {
            assert_eq!(current, t2);
        }
        k.tick();
    }
    assert_eq!(t1_runs, 2);
}
