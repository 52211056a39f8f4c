//! Scheduler tests: selection, suspend nesting, pending-ready lists, ticks
//! and task lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};

use embedded_time::duration::Milliseconds;
use embedded_time::rate::Hertz;

use rtos_sched::{
    priority, Affinity, CoreId, CrossCore, Kernel, KernelConfig, NoIpi, RtosError,
    SchedulerState, TaskConfig, TaskState, TickCount,
};

const C0: CoreId = CoreId::PRIMARY;
const C1: CoreId = CoreId::new_unchecked(1);

fn kernel(cores: usize) -> Kernel {
    let config = KernelConfig::builder()
        .num_cores(cores)
        .build()
        .expect("valid config");
    Kernel::with_config(config, NoIpi)
}

fn pinned(name: &'static str, prio: u8, core: CoreId) -> TaskConfig {
    TaskConfig::new(name, rtos_sched::Priority::new(prio).expect("priority"))
        .with_affinity(Affinity::Pinned(core))
}

#[test]
fn start_selects_highest_priority() {
    let k = kernel(1);
    let low = k.create_task(TaskConfig::new("low", priority!(1))).expect("create");
    let high = k.create_task(TaskConfig::new("high", priority!(3))).expect("create");

    assert_eq!(k.scheduler_state(C0), SchedulerState::NotStarted);
    k.start().expect("start");

    assert_eq!(k.scheduler_state(C0), SchedulerState::Running);
    assert_eq!(k.current_task(C0), Some(high));
    assert_eq!(k.task_state(high), TaskState::Running);
    assert_eq!(k.task_state(low), TaskState::Ready);
    assert_eq!(k.start(), Err(RtosError::InvalidConfig));
}

#[test]
fn equal_priorities_round_robin() {
    let k = kernel(1);
    let a = k.create_task(TaskConfig::new("a", priority!(2))).expect("create");
    let b = k.create_task(TaskConfig::new("b", priority!(2))).expect("create");
    k.start().expect("start");

    assert_eq!(k.current_task(C0), Some(a));
    assert_eq!(k.switch_context(C0), Some(b));
    assert_eq!(k.switch_context(C0), Some(a));
}

#[test]
fn tick_requests_time_slice() {
    let k = kernel(1);
    k.create_task(TaskConfig::new("a", priority!(2))).expect("create");
    k.create_task(TaskConfig::new("b", priority!(2))).expect("create");
    assert!(!k.tick(C0));
    k.start().expect("start");

    assert!(k.tick(C0));
    assert!(k.take_yield_request(C0));
    assert!(!k.take_yield_request(C0));
    assert_eq!(k.tick_count(), TickCount::new(1));
}

#[test]
fn no_time_slice_when_disabled() {
    let config = KernelConfig::builder()
        .num_cores(1)
        .time_slicing(false)
        .build()
        .expect("valid config");
    let k = Kernel::with_config(config, NoIpi);
    k.create_task(TaskConfig::new("a", priority!(2))).expect("create");
    k.create_task(TaskConfig::new("b", priority!(2))).expect("create");
    k.start().expect("start");

    assert!(!k.tick(C0));
}

#[test]
fn suspend_all_nests() {
    let k = kernel(1);
    k.create_task(TaskConfig::new("t", priority!(1))).expect("create");
    k.start().expect("start");

    k.suspend_all(C0);
    k.suspend_all(C0);
    assert_eq!(k.scheduler_state(C0), SchedulerState::Suspended);

    assert!(!k.resume_all(C0));
    assert_eq!(k.scheduler_state(C0), SchedulerState::Suspended);

    k.resume_all(C0);
    assert_eq!(k.scheduler_state(C0), SchedulerState::Running);
}

#[test]
fn no_switch_while_suspended() {
    let k = kernel(1);
    let a = k.create_task(TaskConfig::new("a", priority!(2))).expect("create");
    k.create_task(TaskConfig::new("b", priority!(2))).expect("create");
    k.start().expect("start");

    k.suspend_all(C0);
    assert_eq!(k.switch_context(C0), Some(a));
    assert!(!k.take_yield_request(C0));

    // The refused switch is remembered for the resume.
    assert!(k.resume_all(C0));
    assert!(k.take_yield_request(C0));
}

#[test]
fn cross_core_wake_waits_for_resume() {
    let k = kernel(2);
    let sender = k.create_task(pinned("sender", 1, C0)).expect("create");
    let receiver = k.create_task(pinned("receiver", 5, C1)).expect("create");
    k.start().expect("start");
    assert_eq!(k.current_task(C0), Some(sender));
    assert_eq!(k.current_task(C1), Some(receiver));

    assert_eq!(k.notify_take(C1, true, rtos_sched::Timeout::Forever), Err(nb::Error::WouldBlock));
    assert_eq!(k.switch_context(C1), None);

    k.suspend_all(C1);
    k.notify_give(C0, receiver);

    assert!(k.is_pending(receiver));
    assert_eq!(k.task_state(receiver), TaskState::Ready);
    assert_eq!(k.switch_context(C1), None);
    assert_eq!(k.current_task(C1), None);

    assert!(k.resume_all(C1));
    assert!(!k.is_pending(receiver));
    assert_eq!(k.switch_context(C1), Some(receiver));
    assert_eq!(k.notify_take(C1, true, rtos_sched::Timeout::Forever), Ok(1));
}

#[test]
fn resume_drains_in_fifo_order() {
    let k = kernel(2);
    k.create_task(pinned("sender", 1, C0)).expect("create");
    let x = k.create_task(pinned("x", 3, C1)).expect("create");
    let y = k.create_task(pinned("y", 3, C1)).expect("create");
    let z = k.create_task(pinned("z", 3, C1)).expect("create");
    k.start().expect("start");

    for task in [x, y, z] {
        assert_eq!(k.current_task(C1), Some(task));
        assert!(k.notify_take(C1, true, rtos_sched::Timeout::Forever).is_err());
        k.switch_context(C1);
    }
    assert_eq!(k.current_task(C1), None);

    k.suspend_all(C1);
    for task in [z, x, y] {
        k.notify_give(C0, task);
    }
    assert!(k.resume_all(C1));

    for task in [x, y, z] {
        assert_eq!(k.task_state(task), TaskState::Ready);
    }
    assert_eq!(k.switch_context(C1), Some(z));
    assert_eq!(k.switch_context(C1), Some(x));
    assert_eq!(k.switch_context(C1), Some(y));
}

#[test]
fn resume_reports_no_switch_for_lower_priority() {
    let k = kernel(2);
    k.create_task(pinned("sender", 1, C0)).expect("create");
    let high = k.create_task(pinned("high", 6, C1)).expect("create");
    let low = k.create_task(pinned("low", 2, C1)).expect("create");
    k.start().expect("start");

    assert_eq!(k.current_task(C1), Some(high));
    k.switch_context(C1);
    assert_eq!(k.current_task(C1), Some(high));

    // Block `low` by suspending it, then resume it while core 1 is suspended.
    k.suspend_task(C1, low);
    k.suspend_all(C1);
    k.resume_task(C0, low);
    assert!(k.is_pending(low));
    assert!(!k.resume_all(C1));
    assert_eq!(k.task_state(low), TaskState::Ready);
}

#[test]
fn ticks_pend_while_core0_suspended() {
    let k = kernel(1);
    let t = k.create_task(TaskConfig::new("t", priority!(2))).expect("create");
    k.start().expect("start");

    assert_eq!(k.delay(C0, 2), Err(nb::Error::WouldBlock));
    assert_eq!(k.switch_context(C0), None);

    k.suspend_all(C0);
    for _ in 0..3 {
        assert!(!k.tick(C0));
    }
    assert_eq!(k.tick_count(), TickCount::ZERO);
    assert_eq!(k.task_state(t), TaskState::Blocked);

    assert!(k.resume_all(C0));
    assert_eq!(k.tick_count(), TickCount::new(3));
    assert_eq!(k.switch_context(C0), Some(t));
    assert_eq!(k.delay(C0, 2), Ok(()));
}

#[test]
fn delay_expires_on_tick() {
    let k = kernel(1);
    let t = k.create_task(TaskConfig::new("t", priority!(2))).expect("create");
    k.start().expect("start");

    assert_eq!(k.delay(C0, 3), Err(nb::Error::WouldBlock));
    assert_eq!(k.task_state(t), TaskState::Blocked);
    assert!(k.take_yield_request(C0));
    assert_eq!(k.switch_context(C0), None);

    assert!(!k.tick(C0));
    assert!(!k.tick(C0));
    assert!(k.tick(C0));
    assert_eq!(k.task_state(t), TaskState::Ready);
    assert_eq!(k.switch_context(C0), Some(t));
    assert_eq!(k.delay(C0, 3), Ok(()));
}

#[test]
fn zero_delay_only_yields() {
    let k = kernel(1);
    let t = k.create_task(TaskConfig::new("t", priority!(2))).expect("create");
    k.start().expect("start");

    assert_eq!(k.delay(C0, 0), Ok(()));
    assert_eq!(k.task_state(t), TaskState::Running);
    assert!(k.take_yield_request(C0));
}

#[test]
fn delay_until_keeps_period() {
    let k = kernel(1);
    k.create_task(TaskConfig::new("t", priority!(2))).expect("create");
    k.start().expect("start");

    let mut wake = TickCount::ZERO;
    assert_eq!(k.delay_until(C0, &mut wake, 5), Err(nb::Error::WouldBlock));
    assert_eq!(wake, TickCount::new(5));
    k.switch_context(C0);
    for _ in 0..5 {
        k.tick(C0);
    }
    assert!(k.switch_context(C0).is_some());
    assert_eq!(k.delay_until(C0, &mut wake, 5), Ok(true));

    // Late: the deadline already passed.
    for _ in 0..10 {
        k.tick(C0);
    }
    assert_eq!(k.delay_until(C0, &mut wake, 5), Ok(false));
    assert_eq!(wake, TickCount::new(10));
}

#[test]
#[should_panic(expected = "with the scheduler suspended")]
fn blocking_while_suspended_panics() {
    let k = kernel(1);
    k.create_task(TaskConfig::new("t", priority!(2))).expect("create");
    k.start().expect("start");

    k.suspend_all(C0);
    let _ = k.delay(C0, 1);
}

#[test]
fn running_task_deletion_is_deferred() {
    let k = kernel(1);
    let t = k.create_task(TaskConfig::new("t", priority!(3))).expect("create");
    let idle = k.create_task(TaskConfig::new("idle", priority!(0))).expect("create");
    k.start().expect("start");

    k.delete_task(C0, t);
    assert_eq!(k.task_state(t), TaskState::Deleted);
    assert!(k.take_yield_request(C0));
    assert_eq!(k.reclaim_deleted(C0), 0);
    assert_eq!(k.task_count(), 2);

    assert_eq!(k.switch_context(C0), Some(idle));
    assert_eq!(k.on_idle(C0), 1);
    assert_eq!(k.task_count(), 1);
}

#[test]
fn ready_task_deletion_is_immediate() {
    let k = kernel(1);
    k.create_task(TaskConfig::new("t", priority!(3))).expect("create");
    let other = k.create_task(TaskConfig::new("other", priority!(1))).expect("create");
    k.start().expect("start");

    k.delete_task(C0, other);
    assert_eq!(k.task_count(), 1);

    let reused = k.create_task(TaskConfig::new("reused", priority!(1))).expect("create");
    assert_eq!(reused.index(), other.index());
    assert_ne!(reused, other);
}

#[test]
#[should_panic(expected = "stale task handle")]
fn stale_handle_panics() {
    let k = kernel(1);
    let t = k.create_task(TaskConfig::new("t", priority!(1))).expect("create");
    k.delete_task(C0, t);
    k.priority(t);
}

#[test]
fn suspend_and_resume_task() {
    let k = kernel(1);
    let a = k.create_task(TaskConfig::new("a", priority!(3))).expect("create");
    let b = k.create_task(TaskConfig::new("b", priority!(1))).expect("create");
    k.start().expect("start");

    k.suspend_task(C0, a);
    assert_eq!(k.task_state(a), TaskState::Suspended);
    assert!(k.take_yield_request(C0));
    assert_eq!(k.switch_context(C0), Some(b));

    k.resume_task(C0, a);
    assert_eq!(k.task_state(a), TaskState::Ready);
    assert!(k.take_yield_request(C0));
    assert_eq!(k.switch_context(C0), Some(a));

    k.suspend_task(C0, b);
    assert!(!k.resume_task_from_isr(C0, b));
}

#[test]
fn raising_ready_priority_preempts() {
    let k = kernel(1);
    let a = k.create_task(TaskConfig::new("a", priority!(3))).expect("create");
    let b = k.create_task(TaskConfig::new("b", priority!(1))).expect("create");
    k.start().expect("start");

    k.set_priority(C0, b, priority!(5)).expect("set priority");
    assert_eq!(k.priority(b), priority!(5));
    assert!(k.take_yield_request(C0));
    assert_eq!(k.switch_context(C0), Some(b));

    // Lowering the running task below a ready one also yields.
    k.set_priority(C0, b, priority!(2)).expect("set priority");
    assert!(k.take_yield_request(C0));
    assert_eq!(k.switch_context(C0), Some(a));

    assert_eq!(
        k.set_priority(C0, a, rtos_sched::Priority::new_unchecked(200)),
        Err(RtosError::InvalidPriority)
    );
}

#[test]
fn creation_errors() {
    let config = KernelConfig::builder()
        .num_cores(1)
        .stack_budget(4096)
        .build()
        .expect("valid config");
    let k = Kernel::with_config(config, NoIpi);

    assert_eq!(
        k.create_task(pinned("far", 1, C1)),
        Err(RtosError::InvalidCore)
    );
    assert_eq!(
        k.create_task(TaskConfig::new("empty", priority!(1)).with_stack_size(0)),
        Err(RtosError::InvalidConfig)
    );
    k.create_task(TaskConfig::new("a", priority!(1))).expect("create");
    k.create_task(TaskConfig::new("b", priority!(1))).expect("create");
    assert_eq!(
        k.create_task(TaskConfig::new("c", priority!(1))),
        Err(RtosError::OutOfMemory)
    );
}

#[test]
fn tcb_table_exhaustion() {
    let k = kernel(1);
    for _ in 0..rtos_sched::MAX_TASKS {
        k.create_task(TaskConfig::new("t", priority!(1)).with_stack_size(16))
            .expect("create");
    }
    assert_eq!(
        k.create_task(TaskConfig::new("t", priority!(1)).with_stack_size(16)),
        Err(RtosError::OutOfMemory)
    );
}

#[test]
fn configure_rejected_after_start() {
    let k = kernel(2);
    k.create_task(pinned("t", 1, C1)).expect("create");

    let single = KernelConfig::builder().num_cores(1).build().expect("valid config");
    assert_eq!(k.configure(single), Err(RtosError::InvalidConfig));

    k.start().expect("start");
    assert_eq!(k.configure(KernelConfig::default()), Err(RtosError::InvalidConfig));
}

#[test]
fn task_introspection() {
    let k = kernel(2);
    let t = k
        .create_task(pinned("a-rather-long-task-name", 4, C1))
        .expect("create");

    assert_eq!(k.task_name(t).as_str(), "a-rather-long-ta");
    assert_eq!(k.affinity(t), Affinity::Pinned(C1));
    assert_eq!(k.priority(t), priority!(4));
    assert!(!k.is_pending(t));
}

static IDLE_CALLS: AtomicUsize = AtomicUsize::new(0);

fn count_idle() {
    IDLE_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn idle_callback_runs() {
    let config = KernelConfig::builder()
        .num_cores(1)
        .idle_callback(count_idle)
        .build()
        .expect("valid config");
    let k = Kernel::with_config(config, NoIpi);
    k.start().expect("start");

    assert_eq!(k.on_idle(C0), 0);
    assert_eq!(IDLE_CALLS.load(Ordering::SeqCst), 1);
}

#[derive(Default)]
struct RecordingIpi {
    signals: [AtomicUsize; 2],
}

impl CrossCore for RecordingIpi {
    fn signal(&self, target: CoreId) {
        self.signals[target.index()].fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn pinned_wake_signals_remote_core() {
    let config = KernelConfig::builder().num_cores(2).build().expect("valid config");
    let k = Kernel::with_config(config, RecordingIpi::default());
    let high = k.create_task(pinned("high", 5, C1)).expect("create");
    k.create_task(pinned("low1", 1, C1)).expect("create");
    k.create_task(pinned("low0", 1, C0)).expect("create");
    k.start().expect("start");

    assert_eq!(k.current_task(C1), Some(high));
    assert!(k.notify_take(C1, true, rtos_sched::Timeout::Forever).is_err());
    k.switch_context(C1);

    k.notify_give(C0, high);
    assert_eq!(k.ipi().signals[1].load(Ordering::SeqCst), 1);
    assert_eq!(k.ipi().signals[0].load(Ordering::SeqCst), 0);
    assert!(k.take_yield_request(C1));
    assert!(!k.take_yield_request(C0));
    assert_eq!(k.switch_context(C1), Some(high));
}

#[test]
fn unpinned_wake_displaces_lower_remote_task() {
    let config = KernelConfig::builder().num_cores(2).build().expect("valid config");
    let k = Kernel::with_config(config, RecordingIpi::default());
    let roaming = k.create_task(TaskConfig::new("roaming", priority!(7))).expect("create");
    k.create_task(pinned("busy0", 5, C0)).expect("create");
    k.create_task(pinned("busy1", 1, C1)).expect("create");
    k.start().expect("start");

    // `roaming` starts on core 0 and blocks there.
    assert_eq!(k.current_task(C0), Some(roaming));
    assert!(k.notify_take(C0, true, rtos_sched::Timeout::Forever).is_err());
    k.switch_context(C0);
    k.set_priority(C0, roaming, priority!(2)).expect("set priority");

    k.notify_give(C0, roaming);
    assert!(!k.take_yield_request(C0));
    assert!(k.take_yield_request(C1));
    assert_eq!(k.ipi().signals[1].load(Ordering::SeqCst), 1);
    assert_eq!(k.switch_context(C1), Some(roaming));
}

#[test]
fn pinned_and_shared_equal_priorities_take_turns() {
    let k = kernel(1);
    let local = k.create_task(pinned("local", 2, C0)).expect("create");
    let roaming = k.create_task(TaskConfig::new("roaming", priority!(2))).expect("create");
    k.start().expect("start");
    assert_eq!(k.current_task(C0), Some(local));

    let mut expected = [roaming, local].into_iter().cycle();
    for _ in 0..6 {
        assert!(k.tick(C0));
        assert_eq!(k.switch_context(C0), expected.next());
    }
}

#[test]
fn shared_wake_reaches_suspended_remote_core() {
    let k = kernel(2);
    let high = k.create_task(pinned("high", 5, C0)).expect("create");
    let low = k.create_task(pinned("low", 1, C1)).expect("create");
    let roaming = k.create_task(TaskConfig::new("roaming", priority!(3))).expect("create");
    k.start().expect("start");
    assert_eq!(k.current_task(C0), Some(high));
    assert_eq!(k.current_task(C1), Some(roaming));

    k.suspend_task(C1, roaming);
    assert_eq!(k.switch_context(C1), Some(low));

    // Core 0 readies it while core 1 is suspended; core 0 is busy with a
    // higher task, so only core 1 can take it.
    k.suspend_all(C1);
    k.resume_task(C0, roaming);
    assert!(!k.take_yield_request(C0));
    assert_eq!(k.switch_context(C1), Some(low));

    assert!(k.resume_all(C1));
    assert_eq!(k.switch_context(C1), Some(roaming));
    assert_eq!(k.task_state(low), TaskState::Ready);
}

#[test]
fn tick_switches_to_higher_shared_task() {
    let k = kernel(2);
    k.create_task(pinned("high", 5, C0)).expect("create");
    let low = k.create_task(pinned("low", 1, C1)).expect("create");
    let roaming = k.create_task(TaskConfig::new("roaming", priority!(3))).expect("create");
    k.start().expect("start");
    k.suspend_task(C1, roaming);
    assert_eq!(k.switch_context(C1), Some(low));

    k.suspend_all(C1);
    k.resume_task(C0, roaming);
    k.resume_all(C1);
    // Drop the request the resume raised; the next tick must raise it again.
    assert!(k.take_yield_request(C1));
    assert!(k.tick(C1));
    assert_eq!(k.switch_context(C1), Some(roaming));
}

#[test]
fn millisecond_waits_follow_tick_rate() {
    let config = KernelConfig::builder()
        .num_cores(1)
        .tick_rate(Hertz(100))
        .build()
        .expect("valid config");
    let k = Kernel::with_config(config, NoIpi);
    assert_eq!(k.ms_to_ticks(Milliseconds(250)), 25);
    assert_eq!(k.timeout_ms(Milliseconds(0)), rtos_sched::Timeout::NoWait);
    assert_eq!(k.timeout_ms(Milliseconds(5)), rtos_sched::Timeout::Ticks(1));

    let t = k.create_task(TaskConfig::new("t", priority!(2))).expect("create");
    k.start().expect("start");
    let ticks = k.ms_to_ticks(Milliseconds(30));
    assert_eq!(k.delay(C0, ticks), Err(nb::Error::WouldBlock));
    k.switch_context(C0);
    assert!(!k.tick(C0));
    assert!(!k.tick(C0));
    assert!(k.tick(C0));
    assert_eq!(k.switch_context(C0), Some(t));
}
