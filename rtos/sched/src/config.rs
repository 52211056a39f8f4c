//! Kernel configuration and its builder.

use core::fmt;

use embedded_time::rate::Hertz;
use rtos_core::{RtosError, RtosResult, MAX_CORES};

/// Configuration for a kernel instance.
///
/// Fixed before [`Kernel::start`](crate::Kernel::start); build one with
/// [`KernelConfig::builder`].
#[derive(Clone, Copy)]
pub struct KernelConfig {
    pub num_cores: usize,
    pub tick_rate: Hertz<u32>,
    pub time_slicing: bool,
    /// Total stack bytes tasks may reserve
    pub stack_budget: usize,
    pub idle_callback: Option<fn()>,
}

impl KernelConfig {
    /// Configuration used until [`Kernel::configure`](crate::Kernel::configure) runs.
    pub const DEFAULT: KernelConfig = KernelConfig {
        num_cores: MAX_CORES,
        tick_rate: Hertz(1000),
        time_slicing: true,
        stack_budget: 64 * 1024,
        idle_callback: None,
    };

    /// Creates a new kernel configuration builder.
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }
}

impl fmt::Debug for KernelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelConfig")
            .field("num_cores", &self.num_cores)
            .field("tick_rate_hz", &self.tick_rate.0)
            .field("time_slicing", &self.time_slicing)
            .field("stack_budget", &self.stack_budget)
            .field("idle_callback", &self.idle_callback.is_some())
            .finish()
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Builder for ergonomic kernel configuration construction.
#[derive(Debug, Clone)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl Default for KernelConfigBuilder {
    fn default() -> Self {
        Self {
            config: KernelConfig::DEFAULT,
        }
    }
}

impl KernelConfigBuilder {
    /// Sets how many cores the kernel schedules.
    pub fn num_cores(mut self, cores: usize) -> Self {
        self.config.num_cores = cores;
        self
    }

    /// Sets the tick interrupt frequency.
    pub fn tick_rate(mut self, rate: Hertz<u32>) -> Self {
        self.config.tick_rate = rate;
        self
    }

    /// Enables or disables round-robin between equal priorities on each tick.
    pub fn time_slicing(mut self, enabled: bool) -> Self {
        self.config.time_slicing = enabled;
        self
    }

    /// Sets the stack bytes available to all tasks together.
    pub fn stack_budget(mut self, bytes: usize) -> Self {
        self.config.stack_budget = bytes;
        self
    }

    /// Sets the idle callback function.
    pub fn idle_callback(mut self, callback: fn()) -> Self {
        self.config.idle_callback = Some(callback);
        self
    }

    /// Builds the kernel configuration.
    ///
    /// # Errors
    /// [`RtosError::InvalidConfig`] for zero or too many cores, a zero tick
    /// rate or an empty stack budget.
    pub fn build(self) -> RtosResult<KernelConfig> {
        let config = self.config;
        if config.num_cores == 0 || config.num_cores > MAX_CORES {
            return Err(RtosError::InvalidConfig);
        }
        if config.tick_rate.0 == 0 || config.stack_budget == 0 {
            return Err(RtosError::InvalidConfig);
        }
        Ok(config)
    }
}
