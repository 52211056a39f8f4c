//! Task handles, task control blocks and creation parameters.

use core::fmt;

use heapless::String;
use rtos_core::{Affinity, CoreId, Priority, TickCount, MAX_TASK_NAME_LEN};
use rtos_list::{adapter, DLink, NodeId};

/// Fixed-capacity task name; longer names are truncated.
pub type TaskName = String<MAX_TASK_NAME_LEN>;

/// Handle to a task.
///
/// The generation changes whenever a TCB slot is reused, so a handle kept
/// after its task was reclaimed is detected instead of aliasing a new task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    index: u16,
    generation: u16,
}

impl TaskId {
    pub(crate) const fn new(index: u16, generation: u16) -> Self {
        Self { index, generation }
    }

    /// TCB slot index
    pub const fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) const fn node(self) -> NodeId {
        NodeId::new(self.index)
    }

    pub(crate) const fn generation(self) -> u16 {
        self.generation
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({}.{})", self.index, self.generation)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TaskId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Task({}.{})", self.index, self.generation);
    }
}

/// Task execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Runnable and waiting for a core
    Ready,
    /// Selected as the current task of a core
    Running,
    /// Waiting for an event or a delay
    Blocked,
    /// Removed from scheduling until resumed
    Suspended,
    /// Deleted while running; awaiting reclamation
    Deleted,
}

#[cfg(feature = "defmt")]
impl defmt::Format for TaskState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            TaskState::Ready => defmt::write!(fmt, "Ready"),
            TaskState::Running => defmt::write!(fmt, "Running"),
            TaskState::Blocked => defmt::write!(fmt, "Blocked"),
            TaskState::Suspended => defmt::write!(fmt, "Suspended"),
            TaskState::Deleted => defmt::write!(fmt, "Deleted"),
        }
    }
}

/// Parameters for creating a task.
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    pub name: &'static str,
    pub priority: Priority,
    /// Stack reservation in bytes
    pub stack_size: usize,
    pub affinity: Affinity,
}

impl TaskConfig {
    /// Creates a task configuration with a 2 KiB stack that may run on any core.
    pub const fn new(name: &'static str, priority: Priority) -> Self {
        Self {
            name,
            priority,
            stack_size: 2048,
            affinity: Affinity::Any,
        }
    }

    /// Sets the stack size for the task.
    pub const fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    /// Pins the task to one core or releases it to any core.
    pub const fn with_affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }
}

/// Direct-to-task notification state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyState {
    #[default]
    NotWaiting,
    Waiting,
    Received,
}

/// What a blocked task is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitKind {
    Delay,
    Notify,
    Semaphore(u16),
}

/// How a blocking wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The awaited event arrived
    Signaled,
    /// The deadline passed first, or the wait was cancelled
    Timeout,
}

/// Task control block.
pub(crate) struct Tcb {
    pub in_use: bool,
    pub generation: u16,
    pub name: TaskName,
    pub priority: Priority,
    pub base_priority: Priority,
    pub state: TaskState,
    pub affinity: Affinity,
    /// Core whose pending-ready list holds this task
    pub pending: Option<CoreId>,
    pub stack_size: usize,
    pub notify_value: u32,
    pub notify_state: NotifyState,
    pub wake_tick: TickCount,
    /// Order in which the task last entered a ready list
    pub ready_seq: u32,
    pub waiting: Option<WaitKind>,
    pub outcome: Option<(WaitKind, WaitOutcome)>,
    /// Ready, delayed, suspended or terminated list
    pub state_link: DLink,
    /// Pending-ready list or a semaphore wait list
    pub event_link: DLink,
}

adapter!(pub(crate) StateLinks = Tcb { state_link: DLink });
adapter!(pub(crate) EventLinks = Tcb { event_link: DLink });

impl Tcb {
    pub const fn vacant() -> Self {
        Self {
            in_use: false,
            generation: 0,
            name: String::new(),
            priority: Priority::IDLE,
            base_priority: Priority::IDLE,
            state: TaskState::Deleted,
            affinity: Affinity::Any,
            pending: None,
            stack_size: 0,
            notify_value: 0,
            notify_state: NotifyState::NotWaiting,
            wake_tick: TickCount::ZERO,
            ready_seq: 0,
            waiting: None,
            outcome: None,
            state_link: DLink::new(),
            event_link: DLink::new(),
        }
    }

    /// Fill a vacant slot from `config`, keeping its generation.
    pub fn occupy(&mut self, config: &TaskConfig) {
        let generation = self.generation;
        *self = Self::vacant();
        self.generation = generation;
        self.in_use = true;
        for ch in config.name.chars() {
            if self.name.push(ch).is_err() {
                break;
            }
        }
        self.priority = config.priority;
        self.base_priority = config.priority;
        self.state = TaskState::Ready;
        self.affinity = config.affinity;
        self.stack_size = config.stack_size;
    }

    /// Return the slot to the free pool and invalidate outstanding handles.
    pub fn release(&mut self) {
        debug_assert!(!self.state_link.is_linked() && !self.event_link.is_linked());
        let generation = self.generation.wrapping_add(1);
        *self = Self::vacant();
        self.generation = generation;
    }

    /// Record how the current wait ended and stop waiting.
    pub fn finish_wait(&mut self, outcome: WaitOutcome) {
        if let Some(kind) = self.waiting.take() {
            if kind == WaitKind::Notify && outcome == WaitOutcome::Timeout {
                self.notify_state = NotifyState::NotWaiting;
            }
            self.outcome = Some((kind, outcome));
        }
    }

    /// Take the outcome of a finished wait of `kind`, discarding stale ones.
    pub fn take_outcome(&mut self, kind: WaitKind) -> Option<WaitOutcome> {
        match self.outcome.take() {
            Some((finished, outcome)) if finished == kind => Some(outcome),
            _ => None,
        }
    }
}
