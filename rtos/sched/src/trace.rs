//! Scheduler trace records.
//!
//! The kernel reports scheduling decisions through an optional
//! [`TraceHook`]. Record ids continue the QS scheduler range; payloads are
//! raw task indices, priorities and core numbers.

/// Callback receiving `(record, payload)` for every scheduler event.
///
/// Invoked inside the kernel critical section: it must not call back into
/// the kernel.
pub type TraceHook = fn(u8, &[u8]);

/// Scheduler record identifiers.
pub mod records {
    /// Scheduler suspended on a core `[core, nesting]`
    pub const LOCK: u8 = 50;
    /// Scheduler resumed on a core `[core, drained]`
    pub const UNLOCK: u8 = 51;
    /// Task selected to run `[core, task, priority]`
    pub const NEXT: u8 = 52;
    /// Core has nothing to run `[core]`
    pub const IDLE: u8 = 53;
    /// Task moved to a ready list `[task, priority]`
    pub const READY: u8 = 54;
    /// Task parked on a suspended core's pending list `[core, task]`
    pub const PEND: u8 = 55;
    /// Running task blocked `[core, task]`
    pub const BLOCK: u8 = 56;
    /// Notification delivered `[core, task, action]`
    pub const NOTIFY: u8 = 57;
    /// Task deleted `[task, deferred]`
    pub const DELETE: u8 = 58;
    /// Cross-core yield requested `[from, to]`
    pub const IPI: u8 = 59;
}
