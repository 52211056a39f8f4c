//! Direct-to-task notifications.
//!
//! Every task carries one 32-bit notification value and a
//! [`NotifyState`]. A notification updates the value according to a
//! [`NotifyAction`], marks it received and readies the task if it was
//! blocked in [`Kernel::notify_take`] or [`Kernel::notify_wait`].

use rtos_core::{CoreId, SyncError, Timeout};

use crate::ipi::CrossCore;
use crate::kernel::{Kernel, State};
use crate::task::{NotifyState, TaskId, WaitKind, WaitOutcome};
use crate::trace::records;

/// How a notification updates the receiver's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAction {
    /// Leave the value alone and only signal
    NoAction,
    /// OR the bits into the value
    SetBits,
    /// Add one to the value; the argument is ignored
    Increment,
    /// Replace the value unconditionally
    SetValueWithOverwrite,
    /// Replace the value unless an earlier notification is still unread
    SetValueWithoutOverwrite,
}

impl NotifyAction {
    const fn code(self) -> u8 {
        match self {
            NotifyAction::NoAction => 0,
            NotifyAction::SetBits => 1,
            NotifyAction::Increment => 2,
            NotifyAction::SetValueWithOverwrite => 3,
            NotifyAction::SetValueWithoutOverwrite => 4,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NotifyAction {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            NotifyAction::NoAction => defmt::write!(fmt, "NoAction"),
            NotifyAction::SetBits => defmt::write!(fmt, "SetBits"),
            NotifyAction::Increment => defmt::write!(fmt, "Increment"),
            NotifyAction::SetValueWithOverwrite => defmt::write!(fmt, "SetValueWithOverwrite"),
            NotifyAction::SetValueWithoutOverwrite => {
                defmt::write!(fmt, "SetValueWithoutOverwrite")
            }
        }
    }
}

impl State {
    /// Deliver a notification. Returns true if `core` must switch.
    fn notify<I: CrossCore>(
        &mut self,
        ipi: &I,
        core: CoreId,
        task: TaskId,
        value: u32,
        action: NotifyAction,
    ) -> Result<bool, SyncError> {
        self.validate(task);
        let node = task.node();
        let tcb = &mut self.tasks[node.index()];
        let previous = tcb.notify_state;

        match action {
            NotifyAction::NoAction => {}
            NotifyAction::SetBits => tcb.notify_value |= value,
            NotifyAction::Increment => tcb.notify_value = tcb.notify_value.wrapping_add(1),
            NotifyAction::SetValueWithOverwrite => tcb.notify_value = value,
            NotifyAction::SetValueWithoutOverwrite => {
                if previous == NotifyState::Received {
                    return Err(SyncError::AlreadyPending);
                }
                tcb.notify_value = value;
            }
        }
        tcb.notify_state = NotifyState::Received;
        let waiting = tcb.waiting == Some(WaitKind::Notify);
        self.emit(
            records::NOTIFY,
            &[core.raw(), node.index() as u8, action.code()],
        );

        if previous == NotifyState::Waiting && waiting {
            return Ok(self.wake(ipi, node, WaitOutcome::Signaled, core));
        }
        Ok(false)
    }
}

impl<I: CrossCore> Kernel<I> {
    /// Notify `task` from task context on `core`.
    ///
    /// # Errors
    /// [`SyncError::AlreadyPending`] for
    /// [`NotifyAction::SetValueWithoutOverwrite`] while an earlier
    /// notification is unread.
    pub fn notify(
        &self,
        core: CoreId,
        task: TaskId,
        value: u32,
        action: NotifyAction,
    ) -> Result<(), SyncError> {
        self.with(|state, ipi| state.notify(ipi, core, task, value, action))
            .map(|_| ())
    }

    /// Notify `task` from an interrupt on `core`. Returns true if a task of
    /// higher priority than the interrupted one was woken.
    ///
    /// # Errors
    /// Same as [`notify`](Self::notify).
    pub fn notify_from_isr(
        &self,
        core: CoreId,
        task: TaskId,
        value: u32,
        action: NotifyAction,
    ) -> Result<bool, SyncError> {
        self.with(|state, ipi| state.notify(ipi, core, task, value, action))
    }

    /// Increment the notification value of `task`, the lightweight
    /// counting-semaphore form.
    pub fn notify_give(&self, core: CoreId, task: TaskId) {
        // Increment never fails.
        let _ = self.notify(core, task, 0, NotifyAction::Increment);
    }

    /// [`notify_give`](Self::notify_give) from an interrupt.
    pub fn notify_give_from_isr(&self, core: CoreId, task: TaskId) -> bool {
        self.notify_from_isr(core, task, 0, NotifyAction::Increment)
            .unwrap_or(false)
    }

    /// Wait for the notification value of the task running on `core` to
    /// become non-zero, then decrement it or clear it.
    ///
    /// Completes with the value as it was before the decrement, or
    /// [`SyncError::Timeout`] if it stayed zero.
    pub fn notify_take(
        &self,
        core: CoreId,
        clear_on_exit: bool,
        timeout: Timeout,
    ) -> nb::Result<u32, SyncError> {
        self.with(|state, _| {
            let node = state.running_task(core);
            let tcb = &mut state.tasks[node.index()];
            let resumed = tcb.take_outcome(WaitKind::Notify).is_some();

            if tcb.notify_value == 0 && !resumed && !timeout.is_no_wait() {
                tcb.notify_state = NotifyState::Waiting;
                state.block_current(core, WaitKind::Notify, timeout);
                return Err(nb::Error::WouldBlock);
            }

            let value = tcb.notify_value;
            tcb.notify_state = NotifyState::NotWaiting;
            if value == 0 {
                return Err(nb::Error::Other(SyncError::Timeout));
            }
            tcb.notify_value = if clear_on_exit { 0 } else { value - 1 };
            Ok(value)
        })
    }

    /// Wait for a notification to the task running on `core`.
    ///
    /// Bits in `clear_on_entry` are cleared before waiting if nothing is
    /// pending yet; bits in `clear_on_exit` are cleared after the value is
    /// read. Completes with the value as received, or
    /// [`SyncError::Timeout`].
    pub fn notify_wait(
        &self,
        core: CoreId,
        clear_on_entry: u32,
        clear_on_exit: u32,
        timeout: Timeout,
    ) -> nb::Result<u32, SyncError> {
        self.with(|state, _| {
            let node = state.running_task(core);
            let tcb = &mut state.tasks[node.index()];
            let resumed = tcb.take_outcome(WaitKind::Notify).is_some();

            if !resumed && tcb.notify_state != NotifyState::Received {
                tcb.notify_value &= !clear_on_entry;
                if !timeout.is_no_wait() {
                    tcb.notify_state = NotifyState::Waiting;
                    state.block_current(core, WaitKind::Notify, timeout);
                    return Err(nb::Error::WouldBlock);
                }
            }

            let received = tcb.notify_state == NotifyState::Received;
            tcb.notify_state = NotifyState::NotWaiting;
            if !received {
                return Err(nb::Error::Other(SyncError::Timeout));
            }
            let value = tcb.notify_value;
            tcb.notify_value &= !clear_on_exit;
            Ok(value)
        })
    }

    /// Discard an unread notification. Returns true if one was pending.
    pub fn notify_state_clear(&self, task: TaskId) -> bool {
        self.with(|state, _| {
            state.validate(task);
            let tcb = &mut state.tasks[task.index()];
            if tcb.notify_state == NotifyState::Received {
                tcb.notify_state = NotifyState::NotWaiting;
                true
            } else {
                false
            }
        })
    }

    /// Clear `bits` of the notification value and return the value as it
    /// was before.
    pub fn notify_value_clear(&self, task: TaskId, bits: u32) -> u32 {
        self.with(|state, _| {
            state.validate(task);
            let tcb = &mut state.tasks[task.index()];
            let value = tcb.notify_value;
            tcb.notify_value &= !bits;
            value
        })
    }

    /// Notification state of `task`.
    pub fn notify_state(&self, task: TaskId) -> NotifyState {
        self.with(|state, _| state.tcb(task).notify_state)
    }
}
