#![no_std]
#![forbid(unsafe_code)]

//! # RTOS Intrusive Lists
//!
//! Singly and doubly linked lists whose links live inside the objects they
//! chain together. The list never allocates or frees: containers are stored
//! in an [`Arena`] owned by the caller and addressed by [`NodeId`]. An
//! [`Adapter`] selects which embedded link field a list threads through, so
//! one container type can belong to several kinds of list through different
//! links (at most one list per link).
//!
//! Preconditions are the caller's: a node must not be inserted while it is
//! already linked, only members may be removed, and the singly-linked
//! [`SList::remove_after`] needs the real predecessor. Violations are caught
//! by `debug_assert!` in debug builds and corrupt the list otherwise.
//!
//! ```
//! use rtos_list::{adapter, DLink, DList, NodeId};
//!
//! struct Job { id: u32, link: DLink }
//! adapter!(JobLinks = Job { link: DLink });
//!
//! let mut jobs = [
//!     Job { id: 7, link: DLink::new() },
//!     Job { id: 9, link: DLink::new() },
//! ];
//! let mut queue: DList<JobLinks> = DList::new();
//! queue.append(&mut jobs[..], NodeId::new(0));
//! queue.append(&mut jobs[..], NodeId::new(1));
//!
//! let ids: Vec<u32> = queue.containers(&jobs[..]).map(|(_, job)| job.id).collect();
//! assert_eq!(ids, [7, 9]);
//! ```

use core::fmt;

pub mod dlist;
pub mod slist;

pub use dlist::{Cursor, DLink, DList, Iter};
pub use slist::{SCursor, SIter, SLink, SList};

/// Position of a container inside its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u16);

impl NodeId {
    /// Create a node id from an arena index
    pub const fn new(index: u16) -> Self {
        NodeId(index)
    }

    /// Arena index of this node
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NodeId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Node({})", self.0);
    }
}

/// Storage that resolves a [`NodeId`] to its container.
pub trait Arena<T> {
    /// Shared access to a container
    fn node(&self, id: NodeId) -> &T;

    /// Exclusive access to a container
    fn node_mut(&mut self, id: NodeId) -> &mut T;
}

impl<T> Arena<T> for [T] {
    #[inline]
    fn node(&self, id: NodeId) -> &T {
        &self[id.index()]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut T {
        &mut self[id.index()]
    }
}

impl<T, const N: usize> Arena<T> for [T; N] {
    #[inline]
    fn node(&self, id: NodeId) -> &T {
        &self[id.index()]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut T {
        &mut self[id.index()]
    }
}

impl<T, const N: usize> Arena<T> for heapless::Vec<T, N> {
    #[inline]
    fn node(&self, id: NodeId) -> &T {
        &self[id.index()]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut T {
        &mut self[id.index()]
    }
}

/// Maps a container type to one of its embedded link fields.
///
/// Usually declared with [`adapter!`].
pub trait Adapter {
    /// Type that embeds the link
    type Container: 'static;
    /// Link type ([`DLink`] or [`SLink`])
    type Link;

    /// Borrow the link inside `container`
    fn link(container: &Self::Container) -> &Self::Link;

    /// Mutably borrow the link inside `container`
    fn link_mut(container: &mut Self::Container) -> &mut Self::Link;
}

/// Declare an [`Adapter`] for one link field of a container.
///
/// ```
/// use rtos_list::{adapter, DLink, SLink};
///
/// pub struct Tcb { state: DLink, event: DLink, free: SLink }
///
/// adapter!(pub StateLinks = Tcb { state: DLink });
/// adapter!(pub EventLinks = Tcb { event: DLink });
/// adapter!(FreeLinks = Tcb { free: SLink });
/// ```
#[macro_export]
macro_rules! adapter {
    ($vis:vis $name:ident = $container:ty { $field:ident : $link:ty }) => {
        $vis struct $name;

        impl $crate::Adapter for $name {
            type Container = $container;
            type Link = $link;

            #[inline]
            fn link(container: &$container) -> &$link {
                &container.$field
            }

            #[inline]
            fn link_mut(container: &mut $container) -> &mut $link {
                &mut container.$field
            }
        }
    };
}
