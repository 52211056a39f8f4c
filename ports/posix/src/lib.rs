//! Host runtime for the multi-core scheduler.
//!
//! Runs scheduler scenarios on a POSIX host without real cores or context
//! switching. Each task is a body closure that the [`HostRuntime`] steps on
//! the core the kernel selected for it; cross-core signals land in a
//! [`MailboxIpi`] that the next step of the target core services.
//!
//! ```
//! use rtos_posix::{HostRuntime, TaskAction};
//! use rtos_sched::{priority, CoreId, KernelConfig, TaskConfig};
//!
//! let config = KernelConfig::builder().num_cores(1).build().unwrap();
//! let mut runtime = HostRuntime::new(config);
//! runtime
//!     .spawn(TaskConfig::new("once", priority!(1)), |_ctx| TaskAction::Exit)
//!     .unwrap();
//! runtime.start().unwrap();
//! assert!(runtime.run_until_idle(10).unwrap() < 10);
//! assert_eq!(runtime.kernel().task_count(), 0);
//! ```

use rtos_core::{CoreId, RtosError};
use rtos_sched::TaskId;
use thiserror::Error;

pub mod ipi;
pub mod runtime;
pub mod trace;

pub use ipi::MailboxIpi;
pub use runtime::{HostKernel, HostRuntime, TaskAction, TaskBody, TaskContext};

/// Errors reported by the host runtime.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("kernel error: {0}")]
    Kernel(#[from] RtosError),
    #[error("no body registered for {0}")]
    MissingBody(TaskId),
    #[error("{0} is not configured")]
    InvalidCore(CoreId),
}
