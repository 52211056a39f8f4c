//! Counting and binary semaphores.
//!
//! Waiters queue on the semaphore in priority order (FIFO among equals)
//! through their event link. A give with waiters hands the unit straight to
//! the highest-priority waiter instead of bumping the count, so a task
//! readied by a give cannot lose the unit to a task that runs first.

use core::fmt;

use rtos_core::{CoreId, RtosError, RtosResult, SyncError, Timeout, MAX_PRIORITIES};
use rtos_list::{Arena, DList, NodeId};

use crate::ipi::CrossCore;
use crate::kernel::{Kernel, State};
use crate::task::{EventLinks, Tcb, WaitKind, WaitOutcome};

/// Handle to a semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreId {
    slot: u16,
    generation: u16,
}

impl fmt::Display for SemaphoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sem({}.{})", self.slot, self.generation)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SemaphoreId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Sem({}.{})", self.slot, self.generation);
    }
}

pub(crate) struct Semaphore {
    in_use: bool,
    generation: u16,
    count: u32,
    max: u32,
    pub waiters: DList<EventLinks>,
}

impl Semaphore {
    pub const VACANT: Semaphore = Semaphore {
        in_use: false,
        generation: 0,
        count: 0,
        max: 0,
        waiters: DList::new(),
    };

    /// Queue `node` ahead of every waiter of lower priority.
    pub fn enqueue_waiter<R>(&mut self, arena: &mut R, node: NodeId)
    where
        R: Arena<Tcb> + ?Sized,
    {
        self.waiters
            .insert_sorted_by_key(arena, node, |tcb| MAX_PRIORITIES - tcb.priority.index());
    }
}

/// Resolve a handle, panicking on a deleted semaphore.
fn lookup(semaphores: &mut [Semaphore], sem: SemaphoreId) -> &mut Semaphore {
    match semaphores.get_mut(sem.slot as usize) {
        Some(semaphore) if semaphore.in_use && semaphore.generation == sem.generation => semaphore,
        _ => panic!("stale semaphore handle {}", sem),
    }
}

impl State {
    fn give<I: CrossCore>(
        &mut self,
        ipi: &I,
        core: CoreId,
        sem: SemaphoreId,
    ) -> Result<bool, SyncError> {
        let semaphore = lookup(&mut self.semaphores, sem);
        if let Some(waiter) = semaphore.waiters.pop_head(&mut self.tasks) {
            return Ok(self.wake(ipi, waiter, WaitOutcome::Signaled, core));
        }
        if semaphore.count >= semaphore.max {
            return Err(SyncError::Overflow);
        }
        semaphore.count += 1;
        Ok(false)
    }
}

impl<I: CrossCore> Kernel<I> {
    /// Create a semaphore holding `initial` of at most `max` units. A
    /// binary semaphore has `max == 1`.
    ///
    /// # Errors
    /// - [`RtosError::InvalidConfig`] if `max` is zero or below `initial`
    /// - [`RtosError::OutOfMemory`] when every semaphore slot is taken
    pub fn create_semaphore(&self, max: u32, initial: u32) -> RtosResult<SemaphoreId> {
        if max == 0 || initial > max {
            return Err(RtosError::InvalidConfig);
        }
        self.with(|state, _| {
            let (slot, semaphore) = state
                .semaphores
                .iter_mut()
                .enumerate()
                .find(|(_, semaphore)| !semaphore.in_use)
                .ok_or(RtosError::OutOfMemory)?;
            semaphore.in_use = true;
            semaphore.count = initial;
            semaphore.max = max;
            Ok(SemaphoreId {
                slot: slot as u16,
                generation: semaphore.generation,
            })
        })
    }

    /// Delete a semaphore. Deleting one that tasks wait on is a contract
    /// violation.
    pub fn delete_semaphore(&self, sem: SemaphoreId) {
        self.with(|state, _| {
            let semaphore = lookup(&mut state.semaphores, sem);
            assert!(semaphore.waiters.is_empty(), "{} deleted with waiters", sem);
            let generation = semaphore.generation.wrapping_add(1);
            *semaphore = Semaphore::VACANT;
            semaphore.generation = generation;
        });
    }

    /// Units currently available.
    pub fn semaphore_count(&self, sem: SemaphoreId) -> u32 {
        self.with(|state, _| lookup(&mut state.semaphores, sem).count)
    }

    /// Take one unit for the task running on `core`.
    ///
    /// Returns `WouldBlock` when the task blocked; calling again after it runs
    /// once more completes with the unit or [`SyncError::Timeout`].
    pub fn semaphore_take(
        &self,
        core: CoreId,
        sem: SemaphoreId,
        timeout: Timeout,
    ) -> nb::Result<(), SyncError> {
        self.with(|state, _| {
            let node = state.running_task(core);
            let kind = WaitKind::Semaphore(sem.slot);
            match state.tasks[node.index()].take_outcome(kind) {
                Some(WaitOutcome::Signaled) => return Ok(()),
                Some(WaitOutcome::Timeout) => return Err(nb::Error::Other(SyncError::Timeout)),
                None => {}
            }

            let semaphore = lookup(&mut state.semaphores, sem);
            if semaphore.count > 0 {
                semaphore.count -= 1;
                return Ok(());
            }
            if timeout.is_no_wait() {
                return Err(nb::Error::Other(SyncError::Timeout));
            }

            state.block_current(core, kind, timeout);
            lookup(&mut state.semaphores, sem).enqueue_waiter(&mut state.tasks, node);
            Err(nb::Error::WouldBlock)
        })
    }

    /// Release one unit from task context; a readied waiter that outranks
    /// the caller raises the yield flag of `core`.
    ///
    /// # Errors
    /// [`SyncError::Overflow`] when the count is already at its maximum.
    pub fn semaphore_give(&self, core: CoreId, sem: SemaphoreId) -> Result<(), SyncError> {
        self.with(|state, ipi| state.give(ipi, core, sem)).map(|_| ())
    }

    /// Release one unit from an interrupt on `core`. Returns true if a task
    /// of higher priority than the interrupted one was woken.
    ///
    /// # Errors
    /// [`SyncError::Overflow`] when the count is already at its maximum.
    pub fn semaphore_give_from_isr(
        &self,
        core: CoreId,
        sem: SemaphoreId,
    ) -> Result<bool, SyncError> {
        self.with(|state, ipi| state.give(ipi, core, sem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskConfig;
    use rtos_core::{priority, Priority};

    #[test]
    fn waiters_sorted_by_priority() {
        let mut tasks: heapless::Vec<Tcb, 4> = [1u8, 5, 3, 5]
            .iter()
            .map(|&p| {
                let mut tcb = Tcb::vacant();
                tcb.occupy(&TaskConfig::new("w", Priority::new_unchecked(p)));
                tcb
            })
            .collect();

        let mut sem = Semaphore::VACANT;
        for i in 0..4 {
            sem.enqueue_waiter(&mut tasks, NodeId::new(i));
        }

        let order: heapless::Vec<usize, 4> = sem.waiters.iter(&tasks).map(NodeId::index).collect();
        assert_eq!(order.as_slice(), &[1, 3, 2, 0]);
        assert_eq!(tasks[1].priority, priority!(5));
    }
}
