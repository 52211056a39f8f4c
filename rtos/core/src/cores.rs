//! Core identifiers and task affinity

use core::fmt;
use crate::{RtosError, RtosResult, MAX_CORES};

/// Identifier of a processor core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreId(u8);

impl CoreId {
    /// The core that boots first and drives the tick count
    pub const PRIMARY: CoreId = CoreId(0);

    /// Create a core id, rejecting ids the kernel cannot schedule
    pub fn new(id: u8) -> RtosResult<Self> {
        if id as usize >= MAX_CORES {
            Err(RtosError::InvalidCore)
        } else {
            Ok(CoreId(id))
        }
    }

    /// Create core id without validation (const fn)
    pub const fn new_unchecked(id: u8) -> Self {
        CoreId(id)
    }

    /// Get the raw core number
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Index into per-core tables
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate the first `count` core ids
    pub fn all(count: usize) -> impl Iterator<Item = CoreId> {
        (0..count.min(MAX_CORES)).map(|id| CoreId(id as u8))
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Core({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CoreId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Core({})", self.0);
    }
}

/// Which cores a task may run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Affinity {
    /// The scheduler may place the task on any core
    #[default]
    Any,
    /// The task only ever runs on the given core
    Pinned(CoreId),
}

impl Affinity {
    /// Check whether the task may run on `core`
    pub const fn allows(self, core: CoreId) -> bool {
        match self {
            Affinity::Any => true,
            Affinity::Pinned(pinned) => pinned.0 == core.0,
        }
    }

    /// Core whose scheduler owns a wakeup issued from `readying`.
    ///
    /// Unpinned tasks are owned by the core that readies them.
    pub const fn target(self, readying: CoreId) -> CoreId {
        match self {
            Affinity::Any => readying,
            Affinity::Pinned(pinned) => pinned,
        }
    }

    /// Pinned core, if any
    pub const fn core(self) -> Option<CoreId> {
        match self {
            Affinity::Any => None,
            Affinity::Pinned(core) => Some(core),
        }
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Affinity::Any => write!(f, "Any"),
            Affinity::Pinned(core) => write!(f, "Pinned({})", core.0),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Affinity {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Affinity::Any => defmt::write!(fmt, "Any"),
            Affinity::Pinned(core) => defmt::write!(fmt, "Pinned({})", core),
        }
    }
}
