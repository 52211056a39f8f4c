//! Singly linked intrusive list
//!
//! Removal needs the predecessor. [`SList::remove_after`] takes it from the
//! caller in O(1); [`SList::find_and_remove`] scans for it in O(n);
//! [`SCursor::remove_current`] tracks it while walking.

use core::fmt;
use core::marker::PhantomData;

use crate::{Adapter, Arena, NodeId};

/// Link embedded in a container that can sit in one [`SList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SLink {
    next: Option<NodeId>,
    linked: bool,
}

impl SLink {
    /// Unlinked node
    pub const fn new() -> Self {
        Self {
            next: None,
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
}

/// Singly linked list with a tail reference for O(1) append.
pub struct SList<A> {
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
    _adapter: PhantomData<fn() -> A>,
}

impl<A> SList<A> {
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

    /// Removal-safe cursor positioned before the head
    pub const fn cursor(&self) -> SCursor<A> {
        SCursor {
            prev: None,
            current: None,
            next: self.head,
            _adapter: PhantomData,
        }
    }
}

impl<A> Default for SList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for SList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SList")
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("len", &self.len)
            .finish()
    }
}

impl<A: Adapter<Link = SLink>> SList<A> {
    #[inline]
    fn link<R>(arena: &R, id: NodeId) -> &SLink
    where
        R: Arena<A::Container> + ?Sized,
    {
        A::link(arena.node(id))
    }

    #[inline]
    fn link_mut<R>(arena: &mut R, id: NodeId) -> &mut SLink
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

        *Self::link_mut(arena, id) = SLink {
            next: None,
            linked: true,
        };
        match self.tail {
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

        *Self::link_mut(arena, id) = SLink {
            next: self.head,
            linked: true,
        };
        if self.tail.is_none() {
            self.tail = Some(id);
        }
        self.head = Some(id);
        self.len += 1;
    }

    /// Link `id` after `anchor`, or at the head when `anchor` is `None`
    pub fn insert<R>(&mut self, arena: &mut R, anchor: Option<NodeId>, id: NodeId)
    where
        R: Arena<A::Container> + ?Sized,
    {
        let Some(anchor) = anchor else {
            self.prepend(arena, id);
            return;
        };
        debug_assert!(Self::link(arena, anchor).linked, "anchor {} is not linked", anchor);
        debug_assert!(!Self::link(arena, id).linked, "{} is already linked", id);

        *Self::link_mut(arena, id) = SLink {
            next: Self::link(arena, anchor).next,
            linked: true,
        };
        Self::link_mut(arena, anchor).next = Some(id);
        if self.tail == Some(anchor) {
            self.tail = Some(id);
        }
        self.len += 1;
    }

    /// Unlink `id` given its predecessor (`None` when `id` is the head).
    ///
    /// O(1) fast path: `prev` is trusted. A wrong predecessor is caught by
    /// `debug_assert!` and silently corrupts the list in release builds.
    /// Use [`find_and_remove`](Self::find_and_remove) when the predecessor
    /// is not at hand.
    pub fn remove_after<R>(&mut self, arena: &mut R, prev: Option<NodeId>, id: NodeId)
    where
        R: Arena<A::Container> + ?Sized,
    {
        debug_assert!(Self::link(arena, id).linked, "{} is not linked", id);
        debug_assert_eq!(
            prev.map_or(self.head, |prev| Self::link(&*arena, prev).next),
            Some(id),
            "wrong predecessor for {}",
            id
        );

        let next = Self::link(arena, id).next;
        match prev {
            Some(prev) => Self::link_mut(arena, prev).next = next,
            None => self.head = next,
        }
        if self.tail == Some(id) {
            self.tail = prev;
        }
        *Self::link_mut(arena, id) = SLink::new();
        self.len -= 1;
    }

    /// Scan for the predecessor of `id` and unlink it. Returns false if `id`
    /// is not a member.
    pub fn find_and_remove<R>(&mut self, arena: &mut R, id: NodeId) -> bool
    where
        R: Arena<A::Container> + ?Sized,
    {
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            if current == id {
                self.remove_after(arena, prev, id);
                return true;
            }
            prev = Some(current);
            cursor = Self::link(arena, current).next;
        }
        false
    }

    /// Unlink and return the head
    pub fn pop_head<R>(&mut self, arena: &mut R) -> Option<NodeId>
    where
        R: Arena<A::Container> + ?Sized,
    {
        let head = self.head?;
        self.remove_after(arena, None, head);
        Some(head)
    }

    /// Check membership by walking the list
    pub fn contains<R>(&self, arena: &R, id: NodeId) -> bool
    where
        R: Arena<A::Container> + ?Sized,
    {
        self.iter(arena).any(|member| member == id)
    }

    /// Head-to-tail iteration
    pub fn iter<'a, R>(&self, arena: &'a R) -> SIter<'a, A, R>
    where
        R: Arena<A::Container> + ?Sized,
    {
        SIter {
            arena,
            next: self.head,
            _adapter: PhantomData,
        }
    }

    /// Iterate toward the tail starting at the member `start`
    pub fn iter_from<'a, R>(&self, arena: &'a R, start: NodeId) -> SIter<'a, A, R>
    where
        R: Arena<A::Container> + ?Sized,
    {
        debug_assert!(Self::link(arena, start).linked, "{} is not linked", start);
        SIter {
            arena,
            next: Some(start),
            _adapter: PhantomData,
        }
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
                cursor.remove_current(self, arena);
            }
        }
    }
}

/// Borrowing iterator over an [`SList`]
pub struct SIter<'a, A, R: ?Sized> {
    arena: &'a R,
    next: Option<NodeId>,
    _adapter: PhantomData<fn() -> A>,
}

impl<'a, A, R> Iterator for SIter<'a, A, R>
where
    A: Adapter<Link = SLink>,
    R: Arena<A::Container> + ?Sized,
{
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = A::link(self.arena.node(id)).next;
        Some(id)
    }
}

/// Removal-safe position in an [`SList`] that remembers the predecessor of
/// the node it last returned.
pub struct SCursor<A> {
    prev: Option<NodeId>,
    current: Option<NodeId>,
    next: Option<NodeId>,
    _adapter: PhantomData<fn() -> A>,
}

impl<A: Adapter<Link = SLink>> SCursor<A> {
    /// Advance and return the next member
    pub fn next<R>(&mut self, arena: &R) -> Option<NodeId>
    where
        R: Arena<A::Container> + ?Sized,
    {
        if let Some(current) = self.current.take() {
            self.prev = Some(current);
        }
        let id = self.next?;
        self.current = Some(id);
        self.next = A::link(arena.node(id)).next;
        Some(id)
    }

    /// Unlink the member last returned by [`next`](Self::next) in O(1)
    pub fn remove_current<R>(&mut self, list: &mut SList<A>, arena: &mut R) -> Option<NodeId>
    where
        R: Arena<A::Container> + ?Sized,
    {
        let current = self.current.take()?;
        list.remove_after(arena, self.prev, current);
        Some(current)
    }
}
