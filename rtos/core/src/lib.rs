#![no_std]
#![forbid(unsafe_code)]

//! # RTOS Core
//!
//! Core types shared by the intrusive list library and the multi-core
//! scheduler: priorities, core identifiers and affinity, tick arithmetic and
//! the error taxonomy.

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

pub mod cores;
pub mod priorities;
pub mod time;

pub use cores::*;
pub use priorities::*;
pub use time::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum number of cores a kernel instance can schedule.
pub const MAX_CORES: usize = 2;

/// Number of distinct task priorities (`0..MAX_PRIORITIES`).
pub const MAX_PRIORITIES: usize = 25;

/// Maximum number of task control blocks a kernel instance can hold.
pub const MAX_TASKS: usize = 32;

/// Maximum number of semaphores a kernel instance can hold.
pub const MAX_SEMAPHORES: usize = 16;

/// Maximum length of a task name.
pub const MAX_TASK_NAME_LEN: usize = 16;

/// Result type used throughout the kernel
pub type RtosResult<T> = Result<T, RtosError>;

/// Errors reported synchronously by kernel operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtosError {
    /// No TCB slot or not enough stack budget left
    OutOfMemory,
    /// Priority outside `0..MAX_PRIORITIES`
    InvalidPriority,
    /// Core id outside the configured core count
    InvalidCore,
    /// Configuration rejected by the builder
    InvalidConfig,
    /// Operation requires a started scheduler
    NotStarted,
}

impl fmt::Display for RtosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtosError::OutOfMemory => write!(f, "Out of memory for task or stack"),
            RtosError::InvalidPriority => write!(f, "Invalid priority level"),
            RtosError::InvalidCore => write!(f, "Invalid core id"),
            RtosError::InvalidConfig => write!(f, "Invalid kernel configuration"),
            RtosError::NotStarted => write!(f, "Scheduler not started"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RtosError {}

#[cfg(feature = "defmt")]
impl defmt::Format for RtosError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            RtosError::OutOfMemory => defmt::write!(fmt, "OutOfMemory"),
            RtosError::InvalidPriority => defmt::write!(fmt, "InvalidPriority"),
            RtosError::InvalidCore => defmt::write!(fmt, "InvalidCore"),
            RtosError::InvalidConfig => defmt::write!(fmt, "InvalidConfig"),
            RtosError::NotStarted => defmt::write!(fmt, "NotStarted"),
        }
    }
}

/// Outcomes of blocking or conditional synchronization calls that are not
/// successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// The wait deadline passed before the event arrived
    Timeout,
    /// Semaphore count would exceed its maximum
    Overflow,
    /// A notification was already pending and overwrite was not allowed
    AlreadyPending,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Timeout => write!(f, "operation timed out"),
            SyncError::Overflow => write!(f, "semaphore count overflow"),
            SyncError::AlreadyPending => write!(f, "notification already pending"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SyncError {}

#[cfg(feature = "defmt")]
impl defmt::Format for SyncError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            SyncError::Timeout => defmt::write!(fmt, "Timeout"),
            SyncError::Overflow => defmt::write!(fmt, "Overflow"),
            SyncError::AlreadyPending => defmt::write!(fmt, "AlreadyPending"),
        }
    }
}
