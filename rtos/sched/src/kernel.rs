//! Multi-core preemptive kernel.
//!
//! All scheduler state lives in one [`State`] behind a
//! `critical_section::Mutex`, which plays the role of the scheduler's global
//! lock: interrupts are masked and, on multi-core targets, the platform's
//! cross-core spinlock is held. Every entry point names the core it runs on.
//!
//! ## Scheduling policy
//!
//! 1. Each core picks the highest-priority runnable task among the tasks
//!    pinned to it and the tasks that may run anywhere
//! 2. Equal priorities run round-robin (FIFO ready lists, requeue at tail)
//! 3. While a core's scheduler is suspended, wakeups aimed at that core are
//!    parked on its pending-ready list and applied by `resume_all`
//! 4. A wakeup that outranks another core's running task raises that core's
//!    yield flag and signals it through [`CrossCore`]

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_time::duration::Milliseconds;
use heapless::Vec;
use rtos_core::{
    Affinity, CoreId, Priority, RtosError, RtosResult, TickCount, TickType, Timeout, MAX_CORES,
    MAX_PRIORITIES, MAX_SEMAPHORES, MAX_TASKS,
};
use rtos_list::{DList, NodeId};

use crate::config::KernelConfig;
use crate::ipi::{CrossCore, NoIpi};
use crate::ready::ReadyLists;
use crate::semaphore::Semaphore;
use crate::task::{
    EventLinks, NotifyState, StateLinks, TaskConfig, TaskId, TaskName, TaskState, Tcb, WaitKind,
    WaitOutcome,
};
use crate::trace::{records, TraceHook};

/// Scheduler state of one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// [`Kernel::start`] has not run yet
    NotStarted,
    /// Context switches happen normally
    Running,
    /// [`Kernel::suspend_all`] is in effect on this core
    Suspended,
}

#[cfg(feature = "defmt")]
impl defmt::Format for SchedulerState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            SchedulerState::NotStarted => defmt::write!(fmt, "NotStarted"),
            SchedulerState::Running => defmt::write!(fmt, "Running"),
            SchedulerState::Suspended => defmt::write!(fmt, "Suspended"),
        }
    }
}

pub(crate) struct CoreState {
    pub current: Option<NodeId>,
    pub nesting: u32,
    pub pending: DList<EventLinks>,
    /// Tasks pinned to this core
    pub ready: ReadyLists,
    pub yield_pending: bool,
}

impl CoreState {
    const fn new() -> Self {
        Self {
            current: None,
            nesting: 0,
            pending: DList::new(),
            ready: ReadyLists::new(),
            yield_pending: false,
        }
    }
}

const IDLE_CORE: CoreState = CoreState::new();

pub(crate) struct State {
    pub config: KernelConfig,
    pub started: bool,
    pub tasks: Vec<Tcb, MAX_TASKS>,
    pub semaphores: [Semaphore; MAX_SEMAPHORES],
    /// Tasks that may run on any core
    pub shared: ReadyLists,
    pub cores: [CoreState; MAX_CORES],
    /// Timed waits, earliest deadline first
    pub delayed: DList<StateLinks>,
    pub suspended: DList<StateLinks>,
    /// Deleted while running, awaiting reclamation
    pub terminated: DList<StateLinks>,
    pub tick: TickCount,
    /// Ticks that arrived while core 0 was suspended
    pub pended_ticks: TickType,
    pub stack_used: usize,
    /// Last sequence number handed out by `insert_ready`
    pub ready_seq: u32,
    pub trace: Option<TraceHook>,
}

/// Multi-core preemptive priority scheduler.
///
/// `new` is `const`, so a kernel can live in a `static`:
///
/// ```
/// use rtos_sched::{Kernel, NoIpi};
///
/// static KERNEL: Kernel = Kernel::new(NoIpi);
/// ```
pub struct Kernel<I: CrossCore = NoIpi> {
    state: Mutex<RefCell<State>>,
    ipi: I,
}

impl<I: CrossCore> Kernel<I> {
    /// Create a kernel with [`KernelConfig::DEFAULT`].
    pub const fn new(ipi: I) -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                config: KernelConfig::DEFAULT,
                started: false,
                tasks: Vec::new(),
                semaphores: [Semaphore::VACANT; MAX_SEMAPHORES],
                shared: ReadyLists::new(),
                cores: [IDLE_CORE; MAX_CORES],
                delayed: DList::new(),
                suspended: DList::new(),
                terminated: DList::new(),
                tick: TickCount::ZERO,
                pended_ticks: 0,
                stack_used: 0,
                ready_seq: 0,
                trace: None,
            })),
            ipi,
        }
    }

    /// Create a kernel with the given configuration.
    pub fn with_config(config: KernelConfig, ipi: I) -> Self {
        let kernel = Self::new(ipi);
        kernel.with(|state, _| state.config = config);
        kernel
    }

    /// Run `f` with exclusive access to the scheduler state.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut State, &I) -> R) -> R {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            f(&mut *state, &self.ipi)
        })
    }

    /// Cross-core hook given at construction.
    pub fn ipi(&self) -> &I {
        &self.ipi
    }

    /// Replace the configuration.
    ///
    /// # Errors
    /// [`RtosError::InvalidConfig`] once the scheduler has started, or when
    /// an existing task is pinned to a core the new configuration lacks.
    pub fn configure(&self, config: KernelConfig) -> RtosResult<()> {
        self.with(|state, _| {
            if state.started {
                return Err(RtosError::InvalidConfig);
            }
            let orphaned = state.tasks.iter().any(|tcb| {
                tcb.in_use
                    && matches!(tcb.affinity, Affinity::Pinned(core) if core.index() >= config.num_cores)
            });
            if orphaned {
                return Err(RtosError::InvalidConfig);
            }
            state.config = config;
            Ok(())
        })
    }

    /// Active configuration.
    pub fn config(&self) -> KernelConfig {
        self.with(|state, _| state.config)
    }

    /// Sets the trace hook for scheduler events.
    pub fn set_trace_hook(&self, hook: Option<TraceHook>) {
        self.with(|state, _| state.trace = hook);
    }

    // Task lifecycle

    /// Create a task and make it ready.
    ///
    /// # Errors
    /// - [`RtosError::InvalidPriority`] for a priority outside the range
    /// - [`RtosError::InvalidCore`] for a pin to an unconfigured core
    /// - [`RtosError::InvalidConfig`] for a zero stack size
    /// - [`RtosError::OutOfMemory`] when no TCB slot or stack budget is left
    pub fn create_task(&self, config: TaskConfig) -> RtosResult<TaskId> {
        self.with(|state, ipi| state.create_task(ipi, &config))
    }

    /// Delete a task. A task running on any core is only marked deleted and
    /// is reclaimed later by [`reclaim_deleted`](Self::reclaim_deleted).
    pub fn delete_task(&self, core: CoreId, task: TaskId) {
        self.with(|state, ipi| state.delete_task(ipi, core, task));
    }

    /// Free deleted tasks that no core is running anymore. Called from the
    /// idle path; returns how many were reclaimed.
    pub fn reclaim_deleted(&self, core: CoreId) -> usize {
        self.with(|state, _| {
            let reclaimed = state.reclaim_deleted();
            if reclaimed > 0 {
                log::debug!("{} reclaimed {} deleted task(s)", core, reclaimed);
            }
            reclaimed
        })
    }

    /// Number of allocated TCBs, including deleted tasks not yet reclaimed.
    pub fn task_count(&self) -> usize {
        self.with(|state, _| state.tasks.iter().filter(|tcb| tcb.in_use).count())
    }

    // Scheduling

    /// Start scheduling and select a first task on every configured core.
    ///
    /// # Errors
    /// [`RtosError::InvalidConfig`] if the scheduler is already running.
    pub fn start(&self) -> RtosResult<()> {
        self.with(|state, _| {
            if state.started {
                return Err(RtosError::InvalidConfig);
            }
            state.started = true;
            for core in CoreId::all(state.config.num_cores) {
                state.switch_context(core);
            }
            log::info!(
                "scheduler started on {} core(s), {} task(s)",
                state.config.num_cores,
                state.tasks.iter().filter(|tcb| tcb.in_use).count()
            );
            Ok(())
        })
    }

    /// Requeue the running task and select the next one for `core`.
    ///
    /// While the core is suspended nothing changes and the switch is
    /// remembered as a yield request for `resume_all`.
    pub fn switch_context(&self, core: CoreId) -> Option<TaskId> {
        self.with(|state, _| state.switch_context(core))
    }

    /// Ask for a context switch on `core`; the port performs it.
    pub fn yield_now(&self, core: CoreId) {
        self.with(|state, _| state.core_mut(core).yield_pending = true);
    }

    /// Take the yield request of `core`. Stays set while the core is
    /// suspended.
    pub fn take_yield_request(&self, core: CoreId) -> bool {
        self.with(|state, _| {
            let core = state.core_mut(core);
            if core.nesting > 0 {
                return false;
            }
            core::mem::take(&mut core.yield_pending)
        })
    }

    /// Suspend the scheduler on `core`. Nests.
    pub fn suspend_all(&self, core: CoreId) {
        self.with(|state, _| {
            let cs = state.core_mut(core);
            cs.nesting += 1;
            let nesting = cs.nesting;
            state.emit(records::LOCK, &[core.raw(), nesting.min(u8::MAX as u32) as u8]);
        });
    }

    /// Undo one [`suspend_all`](Self::suspend_all). At nesting zero the
    /// pending-ready list is drained in FIFO order and ticks pended on core 0
    /// are replayed. Returns true if a context switch is required.
    pub fn resume_all(&self, core: CoreId) -> bool {
        self.with(|state, ipi| state.resume_all(ipi, core))
    }

    /// Scheduler state of `core`.
    pub fn scheduler_state(&self, core: CoreId) -> SchedulerState {
        self.with(|state, _| {
            if !state.started {
                SchedulerState::NotStarted
            } else if state.core_mut(core).nesting > 0 {
                SchedulerState::Suspended
            } else {
                SchedulerState::Running
            }
        })
    }

    // Time

    /// Tick interrupt on `core`. Returns true if `core` should switch context.
    pub fn tick(&self, core: CoreId) -> bool {
        self.with(|state, ipi| state.tick(ipi, core))
    }

    /// Ticks since start, excluding ticks still pended on a suspended core 0.
    pub fn tick_count(&self) -> TickCount {
        self.with(|state, _| state.tick)
    }

    /// Convert `duration` to ticks at the configured tick rate.
    pub fn ms_to_ticks(&self, duration: Milliseconds<u32>) -> TickType {
        rtos_core::ms_to_ticks(duration, self.config().tick_rate)
    }

    /// Timeout of at least `duration`. A duration shorter than one tick
    /// still waits a tick instead of polling.
    pub fn timeout_ms(&self, duration: Milliseconds<u32>) -> Timeout {
        if duration.0 == 0 {
            return Timeout::NoWait;
        }
        Timeout::Ticks(self.ms_to_ticks(duration).max(1))
    }

    /// Block the running task on `core` for `ticks`.
    ///
    /// Returns `WouldBlock` when the task blocked; calling again after it runs
    /// once more completes the delay. A zero delay only yields.
    pub fn delay(&self, core: CoreId, ticks: TickType) -> nb::Result<(), core::convert::Infallible> {
        self.with(|state, _| {
            let node = state.running_task(core);
            if state.tasks[node.index()].take_outcome(WaitKind::Delay).is_some() {
                return Ok(());
            }
            if ticks == 0 {
                state.core_mut(core).yield_pending = true;
                return Ok(());
            }
            state.block_current(core, WaitKind::Delay, Timeout::Ticks(ticks));
            Err(nb::Error::WouldBlock)
        })
    }

    /// Block until `previous_wake + period`, then advance `previous_wake`.
    ///
    /// Returns `Ok(true)` after an actual delay and `Ok(false)` when the
    /// deadline had already passed.
    pub fn delay_until(
        &self,
        core: CoreId,
        previous_wake: &mut TickCount,
        period: TickType,
    ) -> nb::Result<bool, core::convert::Infallible> {
        self.with(|state, _| {
            let node = state.running_task(core);
            if state.tasks[node.index()].take_outcome(WaitKind::Delay).is_some() {
                return Ok(true);
            }
            let now = state.tick;
            let elapsed = now.since(*previous_wake);
            *previous_wake = previous_wake.deadline(period);
            if elapsed >= period {
                return Ok(false);
            }
            state.block_current(core, WaitKind::Delay, Timeout::Ticks(period - elapsed));
            Err(nb::Error::WouldBlock)
        })
    }

    // Task suspend / resume

    /// Remove a task from scheduling until resumed. An interrupted wait ends
    /// as a timeout.
    pub fn suspend_task(&self, core: CoreId, task: TaskId) {
        self.with(|state, ipi| state.suspend_task(ipi, core, task));
    }

    /// Resume a suspended task.
    pub fn resume_task(&self, core: CoreId, task: TaskId) {
        self.with(|state, ipi| {
            state.validate(task);
            state.resume_task(ipi, core, task.node());
        });
    }

    /// Resume a suspended task from an interrupt. Returns true if the task
    /// outranks the interrupted task.
    pub fn resume_task_from_isr(&self, core: CoreId, task: TaskId) -> bool {
        self.with(|state, ipi| {
            state.validate(task);
            state.resume_task(ipi, core, task.node())
        })
    }

    // Priority

    /// Current priority of `task`.
    pub fn priority(&self, task: TaskId) -> Priority {
        self.with(|state, _| state.tcb(task).priority)
    }

    /// Change a task's priority, re-binning it if ready.
    ///
    /// # Errors
    /// [`RtosError::InvalidPriority`] for a priority outside the range.
    pub fn set_priority(&self, core: CoreId, task: TaskId, priority: Priority) -> RtosResult<()> {
        if priority.index() >= MAX_PRIORITIES {
            return Err(RtosError::InvalidPriority);
        }
        self.with(|state, ipi| state.set_priority(ipi, core, task, priority));
        Ok(())
    }

    // Introspection

    /// State of a task; a task parked on a pending list reports `Ready`.
    pub fn task_state(&self, task: TaskId) -> TaskState {
        self.with(|state, _| {
            let tcb = state.tcb(task);
            if tcb.pending.is_some() {
                TaskState::Ready
            } else {
                tcb.state
            }
        })
    }

    /// Task selected on `core`, if any.
    pub fn current_task(&self, core: CoreId) -> Option<TaskId> {
        self.with(|state, _| {
            let current = state.core_mut(core).current;
            current.map(|node| state.task_id(node))
        })
    }

    /// Cores `task` may run on.
    pub fn affinity(&self, task: TaskId) -> Affinity {
        self.with(|state, _| state.tcb(task).affinity)
    }

    /// Name given at creation, truncated to the name capacity.
    pub fn task_name(&self, task: TaskId) -> TaskName {
        self.with(|state, _| state.tcb(task).name.clone())
    }

    /// Check if a task sits on a suspended core's pending-ready list.
    pub fn is_pending(&self, task: TaskId) -> bool {
        self.with(|state, _| state.tcb(task).pending.is_some())
    }

    // Idle

    /// Idle path of `core`: reclaim deleted tasks, run the idle callback and
    /// wait for the next interrupt. Returns how many tasks were reclaimed.
    pub fn on_idle(&self, core: CoreId) -> usize {
        let reclaimed = self.reclaim_deleted(core);
        if let Some(callback) = self.with(|state, _| state.config.idle_callback) {
            callback();
        }

        #[cfg(target_arch = "arm")]
        {
            cortex_m::asm::wfi();
        }

        #[cfg(not(target_arch = "arm"))]
        {
            core::hint::spin_loop();
        }

        reclaimed
    }
}

impl State {
    pub fn emit(&self, record: u8, payload: &[u8]) {
        if let Some(trace) = self.trace {
            trace(record, payload);
        }
    }

    pub fn core_mut(&mut self, core: CoreId) -> &mut CoreState {
        assert!(
            core.index() < self.config.num_cores,
            "{} is not configured",
            core
        );
        &mut self.cores[core.index()]
    }

    /// Panic on a handle whose task was reclaimed.
    pub fn validate(&self, task: TaskId) {
        let live = self
            .tasks
            .get(task.index())
            .is_some_and(|tcb| tcb.in_use && tcb.generation == task.generation());
        assert!(live, "stale task handle {}", task);
    }

    pub fn tcb(&self, task: TaskId) -> &Tcb {
        self.validate(task);
        &self.tasks[task.index()]
    }

    pub fn task_id(&self, node: NodeId) -> TaskId {
        TaskId::new(node.index() as u16, self.tasks[node.index()].generation)
    }

    /// Task currently running on `core`. Blocking calls are only valid there.
    pub fn running_task(&mut self, core: CoreId) -> NodeId {
        let current = self.core_mut(core).current;
        match current {
            Some(node) if self.tasks[node.index()].state == TaskState::Running => node,
            _ => panic!("blocking call on {} outside a running task", core),
        }
    }

    pub fn running_on(&self, node: NodeId) -> Option<CoreId> {
        CoreId::all(self.config.num_cores).find(|core| self.cores[core.index()].current == Some(node))
    }

    /// Priority of the task `core` is running, `None` when it runs nothing
    /// or its task already left the running state.
    fn running_priority(&self, core: CoreId) -> Option<Priority> {
        self.cores[core.index()]
            .current
            .map(|node| &self.tasks[node.index()])
            .filter(|tcb| tcb.state == TaskState::Running)
            .map(|tcb| tcb.priority)
    }

    fn outranks_running(&self, core: CoreId, priority: Priority) -> bool {
        self.running_priority(core).map_or(true, |running| priority > running)
    }

    /// Highest ready priority `core` could pick.
    fn highest_ready(&self, core: CoreId) -> Option<Priority> {
        self.cores[core.index()].ready.highest().max(self.shared.highest())
    }

    fn insert_ready(&mut self, node: NodeId) {
        self.ready_seq = self.ready_seq.wrapping_add(1);
        let tcb = &mut self.tasks[node.index()];
        tcb.state = TaskState::Ready;
        tcb.ready_seq = self.ready_seq;
        let priority = tcb.priority;
        let ready = match tcb.affinity {
            Affinity::Any => &mut self.shared,
            Affinity::Pinned(core) => &mut self.cores[core.index()].ready,
        };
        ready.insert(&mut self.tasks, node, priority);
        self.emit(records::READY, &[node.index() as u8, priority.raw()]);
    }

    fn remove_ready(&mut self, node: NodeId) {
        let tcb = &self.tasks[node.index()];
        let priority = tcb.priority;
        let ready = match tcb.affinity {
            Affinity::Any => &mut self.shared,
            Affinity::Pinned(core) => &mut self.cores[core.index()].ready,
        };
        ready.remove(&mut self.tasks, node, priority);
    }

    /// Take `node` off whichever state list holds it.
    fn detach_state(&mut self, node: NodeId) {
        let tcb = &self.tasks[node.index()];
        if !tcb.state_link.is_linked() {
            return;
        }
        let state = tcb.state;
        match state {
            TaskState::Ready => self.remove_ready(node),
            TaskState::Blocked => self.delayed.remove(&mut self.tasks, node),
            TaskState::Suspended => self.suspended.remove(&mut self.tasks, node),
            TaskState::Deleted => self.terminated.remove(&mut self.tasks, node),
            TaskState::Running => debug_assert!(false, "running task on a state list"),
        }
    }

    /// Take `node` off its pending-ready list or semaphore wait list.
    fn detach_event(&mut self, node: NodeId) {
        let tcb = &mut self.tasks[node.index()];
        let pending = tcb.pending.take();
        let waiting = tcb.waiting;
        if let Some(core) = pending {
            self.cores[core.index()].pending.remove(&mut self.tasks, node);
        } else if let Some(WaitKind::Semaphore(slot)) = waiting {
            if self.tasks[node.index()].event_link.is_linked() {
                self.semaphores[slot as usize]
                    .waiters
                    .remove(&mut self.tasks, node);
            }
        }
    }

    /// Make `node` runnable on behalf of `readying`.
    ///
    /// If the target core is suspended the task is parked on its pending
    /// list and keeps its state-list membership until the drain. Returns
    /// true, and raises the yield flag, when `readying` must switch.
    pub fn make_ready<I: CrossCore>(&mut self, ipi: &I, node: NodeId, readying: CoreId) -> bool {
        let tcb = &self.tasks[node.index()];
        if tcb.pending.is_some() {
            return false;
        }
        let target = tcb.affinity.target(readying);
        if self.cores[target.index()].nesting > 0 {
            self.tasks[node.index()].pending = Some(target);
            self.cores[target.index()].pending.append(&mut self.tasks, node);
            self.emit(records::PEND, &[target.raw(), node.index() as u8]);
            return false;
        }

        self.detach_state(node);
        if self.running_on(node).is_some() {
            // Woken before its core switched away; it simply keeps running.
            self.tasks[node.index()].state = TaskState::Running;
            return false;
        }
        self.insert_ready(node);
        self.preempt_for(ipi, node, readying)
    }

    /// Raise yield requests for a newly ready task. Returns true if
    /// `readying` itself must switch.
    fn preempt_for<I: CrossCore>(&mut self, ipi: &I, node: NodeId, readying: CoreId) -> bool {
        if !self.started {
            return false;
        }
        let tcb = &self.tasks[node.index()];
        let priority = tcb.priority;
        let affinity = tcb.affinity;

        if affinity.allows(readying) && self.outranks_running(readying, priority) {
            self.cores[readying.index()].yield_pending = true;
            return true;
        }

        let mut suspended: Vec<CoreId, MAX_CORES> = Vec::new();
        let mut remote = None;
        for core in CoreId::all(self.config.num_cores) {
            if core == readying || !affinity.allows(core) || !self.outranks_running(core, priority) {
                continue;
            }
            if self.cores[core.index()].nesting == 0 {
                remote = Some(core);
                break;
            }
            // Capacity is MAX_CORES, so this cannot fail.
            let _ = suspended.push(core);
        }

        if let Some(core) = remote {
            self.cores[core.index()].yield_pending = true;
            self.emit(records::IPI, &[readying.raw(), core.raw()]);
            ipi.signal(core);
        } else {
            // Only suspended cores could take it; their resume_all switches.
            for core in suspended {
                self.cores[core.index()].yield_pending = true;
            }
        }
        false
    }

    /// True if a task ready for `core` outranks the one it runs.
    fn ready_outranks_running(&self, core: CoreId) -> bool {
        self.highest_ready(core)
            .is_some_and(|ready| self.outranks_running(core, ready))
    }

    /// Put the task running on `core` to sleep until `timeout` or an event.
    pub fn block_current(&mut self, core: CoreId, kind: WaitKind, timeout: Timeout) -> NodeId {
        let node = self.running_task(core);
        assert!(
            self.cores[core.index()].nesting == 0,
            "blocking call on {} with the scheduler suspended",
            core
        );
        debug_assert!(!timeout.is_no_wait());

        let now = self.tick;
        let tcb = &mut self.tasks[node.index()];
        tcb.state = TaskState::Blocked;
        tcb.waiting = Some(kind);
        tcb.outcome = None;
        if let Timeout::Ticks(ticks) = timeout {
            tcb.wake_tick = now.deadline(ticks);
            self.delayed
                .insert_sorted_by_key(&mut self.tasks, node, |tcb| tcb.wake_tick.since(now));
        }
        self.cores[core.index()].yield_pending = true;
        self.emit(records::BLOCK, &[core.raw(), node.index() as u8]);
        node
    }

    /// Finish the wait of a blocked task and make it ready.
    pub fn wake<I: CrossCore>(
        &mut self,
        ipi: &I,
        node: NodeId,
        outcome: WaitOutcome,
        readying: CoreId,
    ) -> bool {
        self.detach_event(node);
        self.tasks[node.index()].finish_wait(outcome);
        self.make_ready(ipi, node, readying)
    }

    fn create_task<I: CrossCore>(&mut self, ipi: &I, config: &TaskConfig) -> RtosResult<TaskId> {
        if config.priority.index() >= MAX_PRIORITIES {
            return Err(RtosError::InvalidPriority);
        }
        if let Affinity::Pinned(core) = config.affinity {
            if core.index() >= self.config.num_cores {
                return Err(RtosError::InvalidCore);
            }
        }
        if config.stack_size == 0 {
            return Err(RtosError::InvalidConfig);
        }
        if self.stack_used + config.stack_size > self.config.stack_budget {
            log::warn!(
                "stack budget exhausted creating '{}' ({} + {} > {})",
                config.name,
                self.stack_used,
                config.stack_size,
                self.config.stack_budget
            );
            return Err(RtosError::OutOfMemory);
        }

        let index = match self.tasks.iter().position(|tcb| !tcb.in_use) {
            Some(index) => index,
            None => {
                self.tasks.push(Tcb::vacant()).map_err(|_| {
                    log::warn!("no TCB slot left for '{}'", config.name);
                    RtosError::OutOfMemory
                })?;
                self.tasks.len() - 1
            }
        };

        let node = NodeId::new(index as u16);
        self.tasks[index].occupy(config);
        self.stack_used += config.stack_size;
        self.insert_ready(node);
        self.preempt_for(ipi, node, config.affinity.target(CoreId::PRIMARY));

        let id = self.task_id(node);
        log::debug!(
            "created {} '{}' at {} ({})",
            id,
            config.name,
            config.priority,
            config.affinity
        );
        Ok(id)
    }

    fn free(&mut self, node: NodeId) {
        let tcb = &mut self.tasks[node.index()];
        self.stack_used -= tcb.stack_size;
        tcb.release();
    }

    fn delete_task<I: CrossCore>(&mut self, ipi: &I, core: CoreId, task: TaskId) {
        self.validate(task);
        let node = task.node();
        if self.tasks[node.index()].state == TaskState::Deleted {
            return;
        }

        self.detach_event(node);
        self.detach_state(node);
        let tcb = &mut self.tasks[node.index()];
        tcb.waiting = None;
        tcb.outcome = None;
        tcb.notify_state = NotifyState::NotWaiting;

        match self.running_on(node) {
            Some(running) => {
                self.tasks[node.index()].state = TaskState::Deleted;
                self.terminated.append(&mut self.tasks, node);
                self.cores[running.index()].yield_pending = true;
                if running != core {
                    ipi.signal(running);
                }
                self.emit(records::DELETE, &[node.index() as u8, 1]);
                log::debug!("{} deleted while running on {}", task, running);
            }
            None => {
                self.free(node);
                self.emit(records::DELETE, &[node.index() as u8, 0]);
                log::debug!("{} deleted", task);
            }
        }
    }

    fn reclaim_deleted(&mut self) -> usize {
        let mut reclaimed = 0;
        let mut cursor = self.terminated.cursor();
        while let Some(node) = cursor.next(&self.tasks) {
            if self.running_on(node).is_none() {
                self.terminated.remove(&mut self.tasks, node);
                self.free(node);
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Pick the best ready task for `core`. Between a pinned and a shared
    /// task of equal priority the one queued first wins, so both share the
    /// core in turn.
    fn select_next(&mut self, core: CoreId) -> Option<NodeId> {
        let pinned = self.cores[core.index()].ready.peek_highest();
        let shared = self.shared.peek_highest();
        let from_shared = match (pinned, shared) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some((pinned_prio, pinned)), Some((shared_prio, shared))) => {
                shared_prio > pinned_prio
                    || (shared_prio == pinned_prio && self.readied_before(shared, pinned))
            }
        };
        if from_shared {
            self.shared.pop_highest(&mut self.tasks)
        } else {
            self.cores[core.index()].ready.pop_highest(&mut self.tasks)
        }
    }

    /// True if `a` entered its ready list before `b`.
    fn readied_before(&self, a: NodeId, b: NodeId) -> bool {
        let a = self.tasks[a.index()].ready_seq;
        let b = self.tasks[b.index()].ready_seq;
        (a.wrapping_sub(b) as i32) < 0
    }

    pub fn switch_context(&mut self, core: CoreId) -> Option<TaskId> {
        if !self.started {
            return None;
        }
        let cs = self.core_mut(core);
        if cs.nesting > 0 {
            cs.yield_pending = true;
            let current = cs.current;
            return current.map(|node| self.task_id(node));
        }
        cs.yield_pending = false;

        if let Some(current) = cs.current.take() {
            if self.tasks[current.index()].state == TaskState::Running {
                self.insert_ready(current);
            }
        }

        let next = self.select_next(core);
        self.cores[core.index()].current = next;
        match next {
            Some(node) => {
                let tcb = &mut self.tasks[node.index()];
                tcb.state = TaskState::Running;
                let priority = tcb.priority;
                self.emit(records::NEXT, &[core.raw(), node.index() as u8, priority.raw()]);
                let id = self.task_id(node);
                log::trace!("{} switched to {}", core, id);
                Some(id)
            }
            None => {
                self.emit(records::IDLE, &[core.raw()]);
                None
            }
        }
    }

    fn resume_all<I: CrossCore>(&mut self, ipi: &I, core: CoreId) -> bool {
        let cs = self.core_mut(core);
        debug_assert!(cs.nesting > 0, "resume_all on {} without suspend_all", core);
        cs.nesting = cs.nesting.saturating_sub(1);
        if cs.nesting > 0 {
            return false;
        }

        let mut drained = 0u32;
        let mut switch = false;
        while let Some(node) = self.cores[core.index()].pending.pop_head(&mut self.tasks) {
            self.tasks[node.index()].pending = None;
            drained += 1;
            self.detach_state(node);
            if self.running_on(node).is_some() {
                self.tasks[node.index()].state = TaskState::Running;
                continue;
            }
            let priority = self.tasks[node.index()].priority;
            self.insert_ready(node);
            if self.running_priority(core).map_or(true, |running| priority >= running) {
                switch = true;
            } else {
                // Unpinned tasks may still displace a lower task elsewhere.
                self.preempt_for(ipi, node, core);
            }
        }

        if core == CoreId::PRIMARY {
            while self.pended_ticks > 0 {
                self.pended_ticks -= 1;
                switch |= self.advance_tick(ipi);
            }
        }

        if (self.config.num_cores == 1 && drained > 0) || self.ready_outranks_running(core) {
            switch = true;
        }
        let cs = &mut self.cores[core.index()];
        switch |= cs.yield_pending;
        cs.yield_pending = switch;
        self.emit(records::UNLOCK, &[core.raw(), drained.min(u8::MAX as u32) as u8]);
        switch
    }

    fn tick<I: CrossCore>(&mut self, ipi: &I, core: CoreId) -> bool {
        if !self.started {
            return false;
        }
        let mut switch = false;
        if core == CoreId::PRIMARY {
            if self.core_mut(core).nesting > 0 {
                self.pended_ticks += 1;
                return false;
            }
            switch |= self.advance_tick(ipi);
        }

        if self.core_mut(core).nesting > 0 {
            return false;
        }
        if self.config.time_slicing {
            if let Some(priority) = self.running_priority(core) {
                if self.cores[core.index()].ready.has_ready(priority) || self.shared.has_ready(priority) {
                    switch = true;
                }
            }
        }
        switch |= self.ready_outranks_running(core);

        let cs = &mut self.cores[core.index()];
        switch |= cs.yield_pending;
        cs.yield_pending = switch;
        switch
    }

    /// Advance the tick count and wake expired waits. Returns true if core 0
    /// must switch.
    fn advance_tick<I: CrossCore>(&mut self, ipi: &I) -> bool {
        self.tick.increment();
        let now = self.tick;
        let mut switch = false;
        while let Some(head) = self.delayed.peek_head() {
            if !now.reached(self.tasks[head.index()].wake_tick) {
                break;
            }
            self.delayed.remove(&mut self.tasks, head);
            if self.tasks[head.index()].pending.is_some() {
                // Already readied; the drain completes the move.
                continue;
            }
            switch |= self.wake(ipi, head, WaitOutcome::Timeout, CoreId::PRIMARY);
        }
        switch
    }

    fn suspend_task<I: CrossCore>(&mut self, ipi: &I, core: CoreId, task: TaskId) {
        self.validate(task);
        let node = task.node();
        let tcb = &self.tasks[node.index()];
        if tcb.state == TaskState::Deleted
            || (tcb.state == TaskState::Suspended && tcb.pending.is_none())
        {
            return;
        }

        self.detach_event(node);
        self.detach_state(node);
        self.tasks[node.index()].finish_wait(WaitOutcome::Timeout);
        self.tasks[node.index()].state = TaskState::Suspended;
        self.suspended.append(&mut self.tasks, node);

        if let Some(running) = self.running_on(node) {
            self.cores[running.index()].yield_pending = true;
            if running != core {
                ipi.signal(running);
            }
        }
        log::trace!("{} suspended", task);
    }

    fn resume_task<I: CrossCore>(&mut self, ipi: &I, core: CoreId, node: NodeId) -> bool {
        let tcb = &self.tasks[node.index()];
        if tcb.state != TaskState::Suspended || tcb.pending.is_some() {
            return false;
        }
        self.make_ready(ipi, node, core)
    }

    fn set_priority<I: CrossCore>(&mut self, ipi: &I, core: CoreId, task: TaskId, priority: Priority) {
        self.validate(task);
        let node = task.node();
        let tcb = &self.tasks[node.index()];
        let old = tcb.priority;
        if old == priority {
            return;
        }
        let queued = tcb.state == TaskState::Ready && tcb.state_link.is_linked();
        let waiting_on = match tcb.waiting {
            Some(WaitKind::Semaphore(slot)) if tcb.event_link.is_linked() => Some(slot),
            _ => None,
        };

        if queued {
            self.remove_ready(node);
        }
        let tcb = &mut self.tasks[node.index()];
        tcb.priority = priority;
        tcb.base_priority = priority;
        if queued {
            self.insert_ready(node);
        }
        if let Some(slot) = waiting_on {
            let sem = &mut self.semaphores[slot as usize];
            sem.waiters.remove(&mut self.tasks, node);
            sem.enqueue_waiter(&mut self.tasks, node);
        }

        match self.running_on(node) {
            Some(running) if priority < old => {
                if self.highest_ready(running).is_some_and(|ready| ready > priority) {
                    self.cores[running.index()].yield_pending = true;
                    if running != core {
                        ipi.signal(running);
                    }
                }
            }
            Some(_) => {}
            None if queued => {
                self.preempt_for(ipi, node, core);
            }
            None => {}
        }
    }
}
