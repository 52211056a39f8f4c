//! Tick counting, deadlines and wait timeouts

use core::fmt;
use embedded_time::duration::Milliseconds;
use embedded_time::rate::Hertz;

/// Number of scheduler ticks.
pub type TickType = u32;

/// Sentinel tick count meaning "wait forever".
pub const MAX_DELAY: TickType = TickType::MAX;

/// Convert a millisecond duration into scheduler ticks at `tick_rate`.
///
/// Rounds down, like `pdMS_TO_TICKS`; saturates at [`MAX_DELAY`] - 1.
pub fn ms_to_ticks(duration: Milliseconds<u32>, tick_rate: Hertz<u32>) -> TickType {
    let ticks = (duration.0 as u64 * tick_rate.0 as u64) / 1000;
    ticks.min((MAX_DELAY - 1) as u64) as TickType
}

/// Convert scheduler ticks back to milliseconds at `tick_rate`.
pub fn ticks_to_ms(ticks: TickType, tick_rate: Hertz<u32>) -> Milliseconds<u32> {
    if tick_rate.0 == 0 {
        return Milliseconds(0);
    }
    let ms = (ticks as u64 * 1000) / tick_rate.0 as u64;
    Milliseconds(ms.min(u32::MAX as u64) as u32)
}

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Return immediately if the call would block
    NoWait,
    /// Wait at most this many ticks
    Ticks(TickType),
    /// Wait until the event arrives
    Forever,
}

impl Timeout {
    /// Map a raw tick count, treating `0` as no-wait and [`MAX_DELAY`] as
    /// forever.
    pub const fn from_ticks(ticks: TickType) -> Self {
        match ticks {
            0 => Timeout::NoWait,
            MAX_DELAY => Timeout::Forever,
            n => Timeout::Ticks(n),
        }
    }

    /// Check if the call must not block
    pub const fn is_no_wait(self) -> bool {
        matches!(self, Timeout::NoWait)
    }
}

impl From<TickType> for Timeout {
    fn from(ticks: TickType) -> Self {
        Timeout::from_ticks(ticks)
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::NoWait => write!(f, "NoWait"),
            Timeout::Ticks(ticks) => write!(f, "{}ticks", ticks),
            Timeout::Forever => write!(f, "Forever"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Timeout {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Timeout::NoWait => defmt::write!(fmt, "NoWait"),
            Timeout::Ticks(ticks) => defmt::write!(fmt, "{}ticks", ticks),
            Timeout::Forever => defmt::write!(fmt, "Forever"),
        }
    }
}

/// Free-running system tick counter that wraps on overflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickCount(TickType);

impl TickCount {
    /// Counter value at scheduler start
    pub const ZERO: Self = Self(0);

    /// Create from a raw counter value
    pub const fn new(ticks: TickType) -> Self {
        Self(ticks)
    }

    /// Get the raw tick count
    pub const fn ticks(self) -> TickType {
        self.0
    }

    /// Advance by one tick, wrapping on overflow
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    /// Tick at which a wait of `ticks` started now expires
    pub const fn deadline(self, ticks: TickType) -> TickCount {
        TickCount(self.0.wrapping_add(ticks))
    }

    /// Ticks elapsed since `earlier`, accounting for one wrap
    pub const fn since(self, earlier: TickCount) -> TickType {
        self.0.wrapping_sub(earlier.0)
    }

    /// Check if `deadline` has been reached.
    ///
    /// Valid while deadlines are less than half the counter range away.
    pub const fn reached(self, deadline: TickCount) -> bool {
        self.0.wrapping_sub(deadline.0) < (TickType::MAX / 2)
    }
}

impl fmt::Display for TickCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tick({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TickCount {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Tick({})", self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_sentinels() {
        assert_eq!(Timeout::from_ticks(0), Timeout::NoWait);
        assert_eq!(Timeout::from_ticks(MAX_DELAY), Timeout::Forever);
        assert_eq!(Timeout::from_ticks(10), Timeout::Ticks(10));
        assert!(Timeout::NoWait.is_no_wait());
    }

    #[test]
    fn deadline_survives_wrap() {
        let now = TickCount::new(TickType::MAX - 1);
        let deadline = now.deadline(3);
        assert_eq!(deadline.ticks(), 1);
        assert!(!now.reached(deadline));

        let mut later = now;
        later.increment();
        later.increment();
        assert!(!later.reached(deadline));
        later.increment();
        assert!(later.reached(deadline));
        assert_eq!(later.since(now), 3);
    }
}
