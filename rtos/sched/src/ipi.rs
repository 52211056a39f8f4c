//! Cross-core signalling.

use rtos_core::CoreId;

/// Port hook that interrupts another core so it re-runs its scheduler.
///
/// The kernel calls [`signal`](CrossCore::signal) from inside its critical
/// section after raising the target core's yield flag, so the
/// implementation must be interrupt-safe and must not call back into the
/// kernel. Targets that cannot interrupt each other may leave the signal
/// empty and poll [`Kernel::take_yield_request`](crate::Kernel::take_yield_request)
/// instead.
pub trait CrossCore {
    fn signal(&self, target: CoreId);
}

/// Cross-core hook for single-core or polling ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIpi;

impl CrossCore for NoIpi {
    #[inline]
    fn signal(&self, _target: CoreId) {}
}

impl<T: CrossCore + ?Sized> CrossCore for &T {
    fn signal(&self, target: CoreId) {
        (**self).signal(target)
    }
}
