//! Host trace sink for scheduler records.
//!
//! [`hook`] matches [`rtos_sched::TraceHook`] and appends every record to a
//! process-wide buffer, also logging it at `trace` level. Kernels in the same
//! process share the buffer.

use std::sync::Mutex;

use rtos_sched::{records, TraceHook};

/// One scheduler trace record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub record: u8,
    pub payload: Vec<u8>,
}

static RECORDS: Mutex<Vec<TraceRecord>> = Mutex::new(Vec::new());

fn name(record: u8) -> &'static str {
    match record {
        records::LOCK => "LOCK",
        records::UNLOCK => "UNLOCK",
        records::NEXT => "NEXT",
        records::IDLE => "IDLE",
        records::READY => "READY",
        records::PEND => "PEND",
        records::BLOCK => "BLOCK",
        records::NOTIFY => "NOTIFY",
        records::DELETE => "DELETE",
        records::IPI => "IPI",
        _ => "USER",
    }
}

fn record(record: u8, payload: &[u8]) {
    log::trace!("{} {:?}", name(record), payload);
    let mut buffer = RECORDS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    buffer.push(TraceRecord {
        record,
        payload: payload.to_vec(),
    });
}

/// Trace hook to install with [`Kernel::set_trace_hook`](rtos_sched::Kernel::set_trace_hook).
pub fn hook() -> TraceHook {
    record
}

/// Take every record collected so far.
pub fn drain() -> Vec<TraceRecord> {
    let mut buffer = RECORDS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    std::mem::take(&mut *buffer)
}
