//! Task priority levels and priority bitmaps

use core::fmt;
use crate::{RtosError, RtosResult, MAX_PRIORITIES};

const _: () = assert!(MAX_PRIORITIES <= 32, "PriorityMask holds at most 32 levels");

/// Type-safe task priority. Larger values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Priority of the idle path (lowest)
    pub const IDLE: Priority = Priority(0);

    /// Highest priority a task may use
    pub const MAX: Priority = Priority(MAX_PRIORITIES as u8 - 1);

    /// Create a new priority level
    pub fn new(priority: u8) -> RtosResult<Self> {
        if priority as usize >= MAX_PRIORITIES {
            Err(RtosError::InvalidPriority)
        } else {
            Ok(Priority(priority))
        }
    }

    /// Create priority without validation (const fn)
    pub const fn new_unchecked(priority: u8) -> Self {
        Priority(priority)
    }

    /// Get the raw priority value
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Index into per-priority tables
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Increment priority (higher priority)
    pub fn increment(self) -> RtosResult<Self> {
        if self.0 >= Self::MAX.0 {
            Err(RtosError::InvalidPriority)
        } else {
            Ok(Priority(self.0 + 1))
        }
    }

    /// Decrement priority (lower priority)
    pub fn decrement(self) -> RtosResult<Self> {
        if self.0 == Self::IDLE.0 {
            Err(RtosError::InvalidPriority)
        } else {
            Ok(Priority(self.0 - 1))
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Priority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({})", self.0);
    }
}

/// One bit per priority level, used to find the highest non-empty ready
/// list in constant time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityMask(u32);

impl PriorityMask {
    /// Empty priority mask
    pub const EMPTY: Self = Self(0);

    /// Create a new empty priority mask
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Set a priority in the mask
    pub fn set(&mut self, priority: Priority) {
        self.0 |= 1u32 << priority.0;
    }

    /// Clear a priority in the mask
    pub fn clear(&mut self, priority: Priority) {
        self.0 &= !(1u32 << priority.0);
    }

    /// Check if a priority is set in the mask
    pub const fn is_set(&self, priority: Priority) -> bool {
        (self.0 & (1u32 << priority.0)) != 0
    }

    /// Check if the mask is empty
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Find the highest priority set in the mask
    pub fn highest_priority(&self) -> Option<Priority> {
        if self.is_empty() {
            None
        } else {
            Some(Priority((31 - self.0.leading_zeros()) as u8))
        }
    }

    /// Find the lowest priority set in the mask
    pub fn lowest_priority(&self) -> Option<Priority> {
        if self.is_empty() {
            None
        } else {
            Some(Priority(self.0.trailing_zeros() as u8))
        }
    }

    /// Raw bitmap
    pub const fn bits(&self) -> u32 {
        self.0
    }
}

impl Default for PriorityMask {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PriorityMask {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "PriorityMask({=u32:b})", self.0);
    }
}

/// Macro to create compile-time priority constants
#[macro_export]
macro_rules! priority {
    ($value:literal) => {
        $crate::Priority::new_unchecked($value)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_creation() {
        assert!(Priority::new(0).is_ok());
        assert!(Priority::new(MAX_PRIORITIES as u8 - 1).is_ok());
        assert_eq!(Priority::new(MAX_PRIORITIES as u8), Err(RtosError::InvalidPriority));
    }

    #[test]
    fn test_priority_mask() {
        let mut mask = PriorityMask::new();
        assert!(mask.is_empty());

        mask.set(Priority::IDLE);
        mask.set(priority!(5));
        mask.set(Priority::MAX);

        assert!(mask.is_set(priority!(5)));
        assert!(!mask.is_set(priority!(3)));
        assert_eq!(mask.highest_priority(), Some(Priority::MAX));
        assert_eq!(mask.lowest_priority(), Some(Priority::IDLE));

        mask.clear(Priority::MAX);
        assert_eq!(mask.highest_priority(), Some(priority!(5)));
    }
}
