//! Cross-core signalling through per-core mailbox flags.

use std::sync::atomic::{AtomicBool, Ordering};

use rtos_core::{CoreId, MAX_CORES};
use rtos_sched::CrossCore;

/// One flag per core, raised by [`CrossCore::signal`] and consumed by the
/// target core's next step.
#[derive(Debug, Default)]
pub struct MailboxIpi {
    flags: [AtomicBool; MAX_CORES],
}

impl MailboxIpi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the signal for `core`.
    pub fn take(&self, core: CoreId) -> bool {
        self.flags[core.index()].swap(false, Ordering::AcqRel)
    }

    pub fn is_signalled(&self, core: CoreId) -> bool {
        self.flags[core.index()].load(Ordering::Acquire)
    }
}

impl CrossCore for MailboxIpi {
    fn signal(&self, target: CoreId) {
        log::trace!("IPI -> {}", target);
        self.flags[target.index()].store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_is_taken_once() {
        let ipi = MailboxIpi::new();
        let core = CoreId::new_unchecked(1);

        ipi.signal(core);
        assert!(ipi.is_signalled(core));
        assert!(!ipi.is_signalled(CoreId::PRIMARY));
        assert!(ipi.take(core));
        assert!(!ipi.take(core));
    }
}
