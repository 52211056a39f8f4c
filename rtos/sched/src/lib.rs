#![no_std]
#![forbid(unsafe_code)]

//! # RTOS Scheduler
//!
//! Multi-core preemptive priority scheduler built on the intrusive lists of
//! `rtos-list`.
//!
//! The [`Kernel`] keeps one ready-list set per core for pinned tasks and one
//! shared set for tasks that may run anywhere. Each core can suspend its
//! scheduler with nesting; tasks readied for a suspended core wait on that
//! core's pending-ready list until [`Kernel::resume_all`]. Context switches
//! are selections: the kernel decides which task each core runs and a port
//! layer carries them out.
//!
//! Blocking calls follow the `nb` protocol. The first call that has to wait
//! blocks the running task and returns [`nb::Error::WouldBlock`]; the port
//! switches context, and when the task runs again it repeats the call, which
//! completes with the event or [`SyncError::Timeout`].

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod ipi;
pub mod kernel;
pub mod notify;
pub(crate) mod ready;
pub mod semaphore;
pub mod task;
pub mod trace;

pub use config::{KernelConfig, KernelConfigBuilder};
pub use ipi::{CrossCore, NoIpi};
pub use kernel::{Kernel, SchedulerState};
pub use notify::NotifyAction;
pub use semaphore::SemaphoreId;
pub use task::{NotifyState, TaskConfig, TaskId, TaskName, TaskState, WaitOutcome};
pub use trace::{records, TraceHook};

pub use rtos_core::{
    priority, Affinity, CoreId, Priority, RtosError, RtosResult, SyncError, TickCount, TickType,
    Timeout, MAX_CORES, MAX_PRIORITIES, MAX_SEMAPHORES, MAX_TASKS,
};
