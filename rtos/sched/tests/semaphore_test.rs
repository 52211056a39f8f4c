//! Counting and binary semaphore tests.

use rtos_sched::{
    priority, CoreId, Kernel, KernelConfig, NoIpi, RtosError, SyncError, TaskConfig, TaskState,
    Timeout,
};

const C0: CoreId = CoreId::PRIMARY;

fn single_core() -> Kernel {
    let config = KernelConfig::builder()
        .num_cores(1)
        .build()
        .expect("valid config");
    Kernel::with_config(config, NoIpi)
}

#[test]
fn create_validates_counts() {
    let k = single_core();
    assert_eq!(k.create_semaphore(0, 0), Err(RtosError::InvalidConfig));
    assert_eq!(k.create_semaphore(1, 2), Err(RtosError::InvalidConfig));

    let sem = k.create_semaphore(3, 2).expect("semaphore");
    assert_eq!(k.semaphore_count(sem), 2);
}

#[test]
fn table_exhaustion() {
    let k = single_core();
    for _ in 0..rtos_sched::MAX_SEMAPHORES {
        k.create_semaphore(1, 0).expect("semaphore");
    }
    assert_eq!(k.create_semaphore(1, 0), Err(RtosError::OutOfMemory));
}

#[test]
fn binary_give_overflows() {
    let k = single_core();
    let sem = k.create_semaphore(1, 1).expect("semaphore");
    assert_eq!(k.semaphore_give(C0, sem), Err(SyncError::Overflow));
    assert_eq!(k.semaphore_give_from_isr(C0, sem), Err(SyncError::Overflow));
}

#[test]
fn take_without_waiting() {
    let k = single_core();
    k.create_task(TaskConfig::new("t", priority!(1))).expect("create");
    k.start().expect("start");
    let sem = k.create_semaphore(2, 1).expect("semaphore");

    assert_eq!(k.semaphore_take(C0, sem, Timeout::NoWait), Ok(()));
    assert_eq!(
        k.semaphore_take(C0, sem, Timeout::NoWait),
        Err(nb::Error::Other(SyncError::Timeout))
    );
    k.semaphore_give(C0, sem).expect("give");
    assert_eq!(k.semaphore_count(sem), 1);
}

#[test]
fn give_hands_off_to_waiter() {
    let k = single_core();
    let waiter = k.create_task(TaskConfig::new("waiter", priority!(4))).expect("create");
    let giver = k.create_task(TaskConfig::new("giver", priority!(1))).expect("create");
    k.start().expect("start");
    let sem = k.create_semaphore(1, 0).expect("semaphore");

    assert_eq!(k.semaphore_take(C0, sem, Timeout::Forever), Err(nb::Error::WouldBlock));
    assert_eq!(k.switch_context(C0), Some(giver));

    k.semaphore_give(C0, sem).expect("give");
    assert_eq!(k.semaphore_count(sem), 0);
    assert!(k.take_yield_request(C0));
    assert_eq!(k.switch_context(C0), Some(waiter));
    assert_eq!(k.semaphore_take(C0, sem, Timeout::Forever), Ok(()));
}

#[test]
fn highest_priority_waiter_first() {
    let k = single_core();
    let first = k.create_task(TaskConfig::new("first", priority!(3))).expect("create");
    let second = k.create_task(TaskConfig::new("second", priority!(2))).expect("create");
    k.create_task(TaskConfig::new("giver", priority!(1))).expect("create");
    k.start().expect("start");
    let sem = k.create_semaphore(1, 0).expect("semaphore");

    assert!(k.semaphore_take(C0, sem, Timeout::Forever).is_err());
    assert_eq!(k.switch_context(C0), Some(second));
    assert!(k.semaphore_take(C0, sem, Timeout::Forever).is_err());
    k.switch_context(C0);

    // Raising a waiter re-sorts the wait list.
    k.set_priority(C0, second, priority!(5)).expect("set priority");
    assert!(k.semaphore_give_from_isr(C0, sem).expect("give"));
    assert_eq!(k.task_state(second), TaskState::Ready);
    assert_eq!(k.task_state(first), TaskState::Blocked);

    k.semaphore_give(C0, sem).expect("give");
    assert_eq!(k.task_state(first), TaskState::Ready);
}

#[test]
fn take_times_out_and_leaves_wait_list() {
    let k = single_core();
    k.create_task(TaskConfig::new("t", priority!(2))).expect("create");
    k.start().expect("start");
    let sem = k.create_semaphore(1, 0).expect("semaphore");

    assert_eq!(k.semaphore_take(C0, sem, Timeout::Ticks(1)), Err(nb::Error::WouldBlock));
    k.switch_context(C0);
    assert!(k.tick(C0));
    k.switch_context(C0);
    assert_eq!(
        k.semaphore_take(C0, sem, Timeout::Ticks(1)),
        Err(nb::Error::Other(SyncError::Timeout))
    );

    // No waiter left, so the give is counted.
    k.semaphore_give(C0, sem).expect("give");
    assert_eq!(k.semaphore_count(sem), 1);
    k.delete_semaphore(sem);
}

#[test]
#[should_panic(expected = "stale semaphore handle")]
fn deleted_semaphore_handle_panics() {
    let k = single_core();
    let sem = k.create_semaphore(1, 0).expect("semaphore");
    k.delete_semaphore(sem);

    let reused = k.create_semaphore(1, 0).expect("semaphore");
    assert_ne!(reused, sem);
    k.semaphore_count(sem);
}
