//! Per-priority ready lists.
//!
//! One FIFO list per priority level plus a [`PriorityMask`] with a bit set
//! for every non-empty list, so the highest ready priority is found with a
//! single `leading_zeros`.

use rtos_core::{Priority, PriorityMask, MAX_PRIORITIES};
use rtos_list::{Arena, DList, NodeId};

use crate::task::{StateLinks, Tcb};

const EMPTY: DList<StateLinks> = DList::new();

/// Ready-list set threaded through each TCB's state link.
pub(crate) struct ReadyLists {
    lists: [DList<StateLinks>; MAX_PRIORITIES],
    mask: PriorityMask,
}

impl ReadyLists {
    pub const fn new() -> Self {
        Self {
            lists: [EMPTY; MAX_PRIORITIES],
            mask: PriorityMask::EMPTY,
        }
    }

    /// Queue `id` behind the tasks already ready at `priority`.
    pub fn insert<R>(&mut self, arena: &mut R, id: NodeId, priority: Priority)
    where
        R: Arena<Tcb> + ?Sized,
    {
        self.lists[priority.index()].append(arena, id);
        self.mask.set(priority);
    }

    pub fn remove<R>(&mut self, arena: &mut R, id: NodeId, priority: Priority)
    where
        R: Arena<Tcb> + ?Sized,
    {
        let list = &mut self.lists[priority.index()];
        list.remove(arena, id);
        if list.is_empty() {
            self.mask.clear(priority);
        }
    }

    /// Dequeue the oldest task of the highest ready priority.
    pub fn pop_highest<R>(&mut self, arena: &mut R) -> Option<NodeId>
    where
        R: Arena<Tcb> + ?Sized,
    {
        let priority = self.mask.highest_priority()?;
        let list = &mut self.lists[priority.index()];
        let id = list.pop_head(arena);
        if list.is_empty() {
            self.mask.clear(priority);
        }
        id
    }

    /// Oldest task of the highest ready priority, left queued.
    pub fn peek_highest(&self) -> Option<(Priority, NodeId)> {
        let priority = self.mask.highest_priority()?;
        self.lists[priority.index()].peek_head().map(|id| (priority, id))
    }

    pub fn highest(&self) -> Option<Priority> {
        self.mask.highest_priority()
    }

    pub fn has_ready(&self, priority: Priority) -> bool {
        self.mask.is_set(priority)
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lists.iter().map(DList::len).sum()
    }
}
