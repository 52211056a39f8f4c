//! Doubly linked intrusive list

use core::fmt;
use core::marker::PhantomData;

use crate::{Adapter, Arena, NodeId};

/// Link embedded in a container that can sit in one [`DList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DLink {
    next: Option<NodeId>,
    prev: Option<NodeId>,
    linked: bool,
}

impl DLink {
    /// Unlinked node
    pub const fn new() -> Self {
        Self {
            next: None,
            prev: None,
            linked: false,
        }
    }

    /// Check if the node currently belongs to a list
    pub const fn is_linked(&self) -> bool {
        self.linked
    }

    /// Successor in the owning list
    pub const fn next(&self) -> Option<NodeId> {
        self.next
    }

    /// Predecessor in the owning list
    pub const fn prev(&self) -> Option<NodeId> {
        self.prev
    }

    fn clear(&mut self) {
        *self = Self::new();
    }
}

/// Doubly linked list threaded through the [`DLink`] selected by `A`.
///
/// Insertion at either end and removal of any member are O(1).
pub struct DList<A> {
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
    _adapter: PhantomData<fn() -> A>,
}

impl<A> DList<A> {
    /// Create an empty list
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            _adapter: PhantomData,
        }
    }

    /// Reset to empty without touching former members' links.
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Check if the list has no members
    pub const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of members
    pub const fn len(&self) -> usize {
        self.len
    }

    /// First member
    pub const fn peek_head(&self) -> Option<NodeId> {
        self.head
    }

    /// Last member
    pub const fn peek_tail(&self) -> Option<NodeId> {
        self.tail
    }

    /// Safe cursor positioned before the head
    pub const fn cursor(&self) -> Cursor<A> {
        Cursor::new(self.head)
    }

    /// Safe cursor whose first step yields `start`, which must be a member
    pub const fn cursor_from(&self, start: NodeId) -> Cursor<A> {
        Cursor::new(Some(start))
    }
}

impl<A> Default for DList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for DList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DList")
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("len", &self.len)
            .finish()
    }
}

impl<A: Adapter<Link = DLink>> DList<A> {
    #[inline]
    fn link<R>(arena: &R, id: NodeId) -> &DLink
    where
        R: Arena<A::Container> + ?Sized,
    {
        A::link(arena.node(id))
    }

    #[inline]
    fn link_mut<R>(arena: &mut R, id: NodeId) -> &mut DLink
    where
        R: Arena<A::Container> + ?Sized,
    {
        A::link_mut(arena.node_mut(id))
    }

    /// Add `id` after the tail
    pub fn append<R>(&mut self, arena: &mut R, id: NodeId)
    where
        R: Arena<A::Container> + ?Sized,
    {
        debug_assert!(!Self::link(arena, id).linked, "{} is already linked", id);

        let tail = self.tail;
        *Self::link_mut(arena, id) = DLink {
            next: None,
            prev: tail,
            linked: true,
        };
        match tail {
            Some(tail) => Self::link_mut(arena, tail).next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    /// Add `id` before the head
    pub fn prepend<R>(&mut self, arena: &mut R, id: NodeId)
    where
        R: Arena<A::Container> + ?Sized,
    {
        debug_assert!(!Self::link(arena, id).linked, "{} is already linked", id);

        let head = self.head;
        *Self::link_mut(arena, id) = DLink {
            next: head,
            prev: None,
            linked: true,
        };
        match head {
            Some(head) => Self::link_mut(arena, head).prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
    }

    /// Link `id` directly after the member `anchor`
    pub fn insert_after<R>(&mut self, arena: &mut R, anchor: NodeId, id: NodeId)
    where
        R: Arena<A::Container> + ?Sized,
    {
        debug_assert!(Self::link(arena, anchor).linked, "anchor {} is not linked", anchor);
        debug_assert!(!Self::link(arena, id).linked, "{} is already linked", id);

        let next = Self::link(arena, anchor).next;
        *Self::link_mut(arena, id) = DLink {
            next,
            prev: Some(anchor),
            linked: true,
        };
        Self::link_mut(arena, anchor).next = Some(id);
        match next {
            Some(next) => Self::link_mut(arena, next).prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
    }

    /// Link `id` directly before the member `anchor`
    pub fn insert_before<R>(&mut self, arena: &mut R, anchor: NodeId, id: NodeId)
    where
        R: Arena<A::Container> + ?Sized,
    {
        match Self::link(arena, anchor).prev {
            Some(prev) => self.insert_after(arena, prev, id),
            None => self.prepend(arena, id),
        }
    }

    /// Insert `id` ahead of the first member whose key is greater than its
    /// own, keeping equal keys in arrival order.
    pub fn insert_sorted_by_key<R, K, F>(&mut self, arena: &mut R, id: NodeId, mut key: F)
    where
        R: Arena<A::Container> + ?Sized,
        K: Ord,
        F: FnMut(&A::Container) -> K,
    {
        let new_key = key(arena.node(id));
        let mut cursor = self.head;
        while let Some(current) = cursor {
            if key(arena.node(current)) > new_key {
                self.insert_before(arena, current, id);
                return;
            }
            cursor = Self::link(arena, current).next;
        }
        self.append(arena, id);
    }

    /// Unlink the member `id`
    pub fn remove<R>(&mut self, arena: &mut R, id: NodeId)
    where
        R: Arena<A::Container> + ?Sized,
    {
        debug_assert!(Self::link(arena, id).linked, "{} is not linked", id);
        debug_assert!(self.len > 0, "remove from empty list");

        let DLink { next, prev, .. } = *Self::link(arena, id);
        match prev {
            Some(prev) => Self::link_mut(arena, prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => Self::link_mut(arena, next).prev = prev,
            None => self.tail = prev,
        }
        Self::link_mut(arena, id).clear();
        self.len -= 1;
    }

    /// Unlink and return the head
    pub fn pop_head<R>(&mut self, arena: &mut R) -> Option<NodeId>
    where
        R: Arena<A::Container> + ?Sized,
    {
        let head = self.head?;
        self.remove(arena, head);
        Some(head)
    }

    /// Check membership by walking the list
    pub fn contains<R>(&self, arena: &R, id: NodeId) -> bool
    where
        R: Arena<A::Container> + ?Sized,
    {
        self.iter(arena).any(|member| member == id)
    }

    /// Head-to-tail iteration. The arena borrow prevents removal while
    /// iterating; use [`cursor`](Self::cursor) for that.
    pub fn iter<'a, R>(&self, arena: &'a R) -> Iter<'a, A, R>
    where
        R: Arena<A::Container> + ?Sized,
    {
        Iter::new(arena, self.head, true)
    }

    /// Tail-to-head iteration
    pub fn iter_rev<'a, R>(&self, arena: &'a R) -> Iter<'a, A, R>
    where
        R: Arena<A::Container> + ?Sized,
    {
        Iter::new(arena, self.tail, false)
    }

    /// Iterate toward the tail starting at the member `start`
    pub fn iter_from<'a, R>(&self, arena: &'a R, start: NodeId) -> Iter<'a, A, R>
    where
        R: Arena<A::Container> + ?Sized,
    {
        debug_assert!(Self::link(arena, start).linked, "{} is not linked", start);
        Iter::new(arena, Some(start), true)
    }

    /// Head-to-tail iteration yielding each member with its container
    pub fn containers<'a, R>(
        &self,
        arena: &'a R,
    ) -> impl Iterator<Item = (NodeId, &'a A::Container)> + 'a
    where
        R: Arena<A::Container> + ?Sized,
        A: 'a,
    {
        self.iter(arena).map(move |id| (id, arena.node(id)))
    }

    /// Keep only the members for which `keep` returns true
    pub fn retain<R, F>(&mut self, arena: &mut R, mut keep: F)
    where
        R: Arena<A::Container> + ?Sized,
        F: FnMut(NodeId, &mut A::Container) -> bool,
    {
        let mut cursor = self.cursor();
        while let Some(id) = cursor.next(arena) {
            if !keep(id, arena.node_mut(id)) {
                self.remove(arena, id);
            }
        }
    }
}

/// Borrowing iterator over a [`DList`]
pub struct Iter<'a, A, R: ?Sized> {
    arena: &'a R,
    next: Option<NodeId>,
    forward: bool,
    _adapter: PhantomData<fn() -> A>,
}

impl<'a, A, R: ?Sized> Iter<'a, A, R> {
    fn new(arena: &'a R, next: Option<NodeId>, forward: bool) -> Self {
        Self {
            arena,
            next,
            forward,
            _adapter: PhantomData,
        }
    }
}

impl<'a, A, R> Iterator for Iter<'a, A, R>
where
    A: Adapter<Link = DLink>,
    R: Arena<A::Container> + ?Sized,
{
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        let link = A::link(self.arena.node(id));
        self.next = if self.forward { link.next } else { link.prev };
        Some(id)
    }
}

/// Removal-safe position in a [`DList`].
///
/// The successor is read before a node is handed out, so the node just
/// returned may be unlinked (or relinked elsewhere) before the next step.
/// The cursor holds no borrow of the list or the arena.
pub struct Cursor<A> {
    next: Option<NodeId>,
    _adapter: PhantomData<fn() -> A>,
}

impl<A> Cursor<A> {
    const fn new(next: Option<NodeId>) -> Self {
        Self {
            next,
            _adapter: PhantomData,
        }
    }
}

impl<A: Adapter<Link = DLink>> Cursor<A> {
    /// Advance and return the next member
    pub fn next<R>(&mut self, arena: &R) -> Option<NodeId>
    where
        R: Arena<A::Container> + ?Sized,
    {
        let id = self.next?;
        self.next = A::link(arena.node(id)).next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        value: u32,
        link: DLink,
    }

    crate::adapter!(ItemLinks = Item { link: DLink });

    fn items<const N: usize>() -> [Item; N] {
        core::array::from_fn(|i| Item {
            value: i as u32,
            link: DLink::new(),
        })
    }

    #[test]
    fn head_and_tail_track_membership() {
        let mut arena = items::<3>();
        let mut list: DList<ItemLinks> = DList::new();
        assert!(list.is_empty());

        list.append(&mut arena, NodeId::new(1));
        list.prepend(&mut arena, NodeId::new(0));
        list.append(&mut arena, NodeId::new(2));
        assert_eq!(list.peek_head(), Some(NodeId::new(0)));
        assert_eq!(list.peek_tail(), Some(NodeId::new(2)));
        assert_eq!(list.len(), 3);

        list.remove(&mut arena, NodeId::new(2));
        assert_eq!(list.peek_tail(), Some(NodeId::new(1)));
        list.remove(&mut arena, NodeId::new(0));
        assert_eq!(list.peek_head(), Some(NodeId::new(1)));
        list.remove(&mut arena, NodeId::new(1));

        assert!(list.is_empty());
        assert_eq!(list.peek_tail(), None);
        assert!(!arena[1].link.is_linked());
    }

    #[test]
    fn sorted_insert_is_stable() {
        let mut arena = items::<4>();
        arena[0].value = 5;
        arena[1].value = 1;
        arena[2].value = 5;
        arena[3].value = 3;

        let mut list: DList<ItemLinks> = DList::new();
        for i in 0..4 {
            list.insert_sorted_by_key(&mut arena, NodeId::new(i), |item| item.value);
        }

        let order: heapless::Vec<u16, 4> = list
            .iter(&arena)
            .map(|id| id.index() as u16)
            .collect();
        assert_eq!(order.as_slice(), &[1, 3, 0, 2]);
    }

    #[test]
    fn retain_drops_rejected_members() {
        let mut arena = items::<5>();
        let mut list: DList<ItemLinks> = DList::new();
        for i in 0..5 {
            list.append(&mut arena, NodeId::new(i));
        }

        list.retain(&mut arena, |_, item| item.value % 2 == 0);

        assert_eq!(list.len(), 3);
        assert!(list.contains(&arena, NodeId::new(4)));
        assert!(!list.contains(&arena, NodeId::new(3)));
        assert_eq!(list.iter_rev(&arena).next(), Some(NodeId::new(4)));
    }
}
