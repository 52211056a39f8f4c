//! Deterministic stepping of task bodies across simulated cores.

use std::collections::HashMap;

use rtos_core::CoreId;
use rtos_sched::{Kernel, KernelConfig, TaskConfig, TaskId, TaskState};

use crate::ipi::MailboxIpi;
use crate::RuntimeError;

/// Kernel type driven by the host runtime.
pub type HostKernel = Kernel<MailboxIpi>;

/// What a task body asks the runtime to do after one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// Keep running on the next step
    Continue,
    /// Give the core to another ready task of the same priority
    Yield,
    /// A blocking call returned `WouldBlock`; the kernel already requested
    /// the switch
    Blocked,
    /// Delete the task
    Exit,
}

/// One step of a task. Called repeatedly while the task is selected.
pub type TaskBody = Box<dyn FnMut(&mut TaskContext<'_>) -> TaskAction + Send>;

/// View of the kernel handed to a task body.
pub struct TaskContext<'a> {
    kernel: &'a HostKernel,
    core: CoreId,
    task: TaskId,
    iteration: usize,
}

impl<'a> TaskContext<'a> {
    pub fn kernel(&self) -> &'a HostKernel {
        self.kernel
    }

    /// Core the body is running on.
    pub fn core(&self) -> CoreId {
        self.core
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Number of earlier steps of this task.
    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

struct TaskSlot {
    body: TaskBody,
    iterations: usize,
}

/// Runs a [`Kernel`] on simulated cores.
///
/// Each [`step`](Self::step) plays one scheduling point of a core: a
/// pending cross-core signal or yield request causes a context switch, then
/// the selected task's body runs once. A core with nothing to run goes
/// through the kernel's idle path, which reclaims deleted tasks.
pub struct HostRuntime {
    kernel: HostKernel,
    bodies: HashMap<TaskId, TaskSlot>,
}

impl HostRuntime {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            kernel: Kernel::with_config(config, MailboxIpi::new()),
            bodies: HashMap::new(),
        }
    }

    pub fn kernel(&self) -> &HostKernel {
        &self.kernel
    }

    /// Cores the kernel schedules.
    pub fn cores(&self) -> impl Iterator<Item = CoreId> {
        CoreId::all(self.kernel.config().num_cores)
    }

    /// Create a task and register the body it runs.
    ///
    /// # Errors
    /// [`RuntimeError::Kernel`] when the kernel rejects the task.
    pub fn spawn<F>(&mut self, config: TaskConfig, body: F) -> Result<TaskId, RuntimeError>
    where
        F: FnMut(&mut TaskContext<'_>) -> TaskAction + Send + 'static,
    {
        let task = self.kernel.create_task(config)?;
        self.bodies.insert(
            task,
            TaskSlot {
                body: Box::new(body),
                iterations: 0,
            },
        );
        log::debug!("spawned {} '{}' on {}", task, config.name, config.affinity);
        Ok(task)
    }

    /// Start the scheduler on every core.
    ///
    /// # Errors
    /// [`RuntimeError::Kernel`] if it was already started.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        self.kernel.start()?;
        Ok(())
    }

    /// Run one scheduling point of `core`. Returns true if a task body ran.
    ///
    /// # Errors
    /// - [`RuntimeError::InvalidCore`] for a core the kernel does not schedule
    /// - [`RuntimeError::MissingBody`] when the selected task has no body
    pub fn step(&mut self, core: CoreId) -> Result<bool, RuntimeError> {
        if core.index() >= self.kernel.config().num_cores {
            return Err(RuntimeError::InvalidCore(core));
        }

        let signalled = self.kernel.ipi().take(core);
        let requested = self.kernel.take_yield_request(core);
        if signalled || requested || self.kernel.current_task(core).is_none() {
            self.kernel.switch_context(core);
        }

        let task = match self.kernel.current_task(core) {
            Some(task) if self.kernel.task_state(task) == TaskState::Running => task,
            _ => {
                self.kernel.on_idle(core);
                return Ok(false);
            }
        };

        let slot = self
            .bodies
            .get_mut(&task)
            .ok_or(RuntimeError::MissingBody(task))?;
        let mut context = TaskContext {
            kernel: &self.kernel,
            core,
            task,
            iteration: slot.iterations,
        };
        let action = (slot.body)(&mut context);
        slot.iterations += 1;

        match action {
            TaskAction::Continue | TaskAction::Blocked => {}
            TaskAction::Yield => self.kernel.yield_now(core),
            TaskAction::Exit => {
                self.bodies.remove(&task);
                self.kernel.delete_task(core, task);
                log::debug!("{} exited on {}", task, core);
            }
        }
        Ok(true)
    }

    /// Step every core once per round. Returns how many steps ran a body.
    ///
    /// # Errors
    /// Propagates the first [`step`](Self::step) error.
    pub fn run_rounds(&mut self, rounds: usize) -> Result<usize, RuntimeError> {
        let cores: Vec<CoreId> = self.cores().collect();
        let mut ran = 0;
        for _ in 0..rounds {
            for &core in &cores {
                if self.step(core)? {
                    ran += 1;
                }
            }
        }
        Ok(ran)
    }

    /// Deliver one tick interrupt to every core.
    pub fn tick_all(&mut self) {
        for core in self.cores() {
            self.kernel.tick(core);
        }
    }

    /// Run rounds until one passes in which no core ran a body, at most
    /// `max_rounds`. Returns the number of rounds run.
    ///
    /// # Errors
    /// Propagates the first [`step`](Self::step) error.
    pub fn run_until_idle(&mut self, max_rounds: usize) -> Result<usize, RuntimeError> {
        for round in 0..max_rounds {
            if self.run_rounds(1)? == 0 {
                return Ok(round + 1);
            }
        }
        log::warn!("still busy after {} rounds", max_rounds);
        Ok(max_rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtos_sched::priority;

    fn runtime(cores: usize) -> HostRuntime {
        let config = KernelConfig::builder()
            .num_cores(cores)
            .build()
            .expect("valid config");
        HostRuntime::new(config)
    }

    #[test]
    fn body_runs_until_exit() {
        let mut rt = runtime(1);
        rt.spawn(TaskConfig::new("counter", priority!(1)), |ctx| {
            if ctx.iteration() < 3 {
                TaskAction::Continue
            } else {
                TaskAction::Exit
            }
        })
        .expect("spawn");
        rt.start().expect("start");

        assert_eq!(rt.run_rounds(4).expect("run"), 4);
        assert_eq!(rt.run_rounds(1).expect("run"), 0);
        assert_eq!(rt.kernel().task_count(), 0);
    }

    #[test]
    fn yield_alternates_equal_priorities() {
        let mut rt = runtime(1);
        let a = rt
            .spawn(TaskConfig::new("a", priority!(2)), |_| TaskAction::Yield)
            .expect("spawn");
        let b = rt
            .spawn(TaskConfig::new("b", priority!(2)), |_| TaskAction::Yield)
            .expect("spawn");
        rt.start().expect("start");

        rt.step(CoreId::PRIMARY).expect("step");
        assert_eq!(rt.kernel().current_task(CoreId::PRIMARY), Some(a));
        rt.step(CoreId::PRIMARY).expect("step");
        assert_eq!(rt.kernel().current_task(CoreId::PRIMARY), Some(b));
    }

    #[test]
    fn rejects_unknown_core_and_bodiless_task() {
        let mut rt = runtime(1);
        assert_eq!(
            rt.step(CoreId::new_unchecked(1)),
            Err(RuntimeError::InvalidCore(CoreId::new_unchecked(1)))
        );

        let bare = rt
            .kernel()
            .create_task(TaskConfig::new("bare", priority!(1)))
            .expect("create");
        rt.start().expect("start");
        assert_eq!(rt.step(CoreId::PRIMARY), Err(RuntimeError::MissingBody(bare)));
    }
}
