//! The simple scheduler: blocks run in graph insertion order.

use std::sync::Arc;

use caudal_graph::Graph;

use crate::pool::ThreadPool;
use crate::scheduler::{
    ExecutionPolicy, SchedulerCore, SchedulerError, SchedulerState, partition_round_robin,
};

/// Loop-based scheduler iterating blocks in definition order until a full
/// pass performs no work.
///
/// Single-threaded policy runs the loop inline on `start`. Multi-threaded
/// policy pre-partitions the blocks round-robin into
/// `min(pool_threads, n_blocks)` job sets and runs the progress-word
/// protocol on the pool.
pub struct SimpleScheduler {
    core: SchedulerCore,
    policy: ExecutionPolicy,
    jobs: Vec<Vec<usize>>,
}

impl SimpleScheduler {
    /// Scheduler over `graph` with a dedicated CPU-bound pool.
    pub fn new(graph: Graph, policy: ExecutionPolicy) -> Self {
        Self::with_pool(
            graph,
            policy,
            Arc::new(ThreadPool::cpu_bound("simple-scheduler-pool")),
        )
    }

    /// Scheduler over `graph` sharing an existing pool.
    pub fn with_pool(graph: Graph, policy: ExecutionPolicy, pool: Arc<ThreadPool>) -> Self {
        Self {
            core: SchedulerCore::new(graph, pool),
            policy,
            jobs: Vec::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.core.state()
    }

    /// Shared access to the scheduler core (profiler, edges, pool).
    pub fn core(&self) -> &SchedulerCore {
        &self.core
    }

    /// Mutable access to the scheduler core.
    pub fn core_mut(&mut self) -> &mut SchedulerCore {
        &mut self.core
    }

    /// Resolves the graph and builds the job partition.
    pub fn init(&mut self) -> Result<(), SchedulerError> {
        self.core.init()?;
        let order: Vec<usize> = (0..self.core.n_blocks()).collect();
        self.jobs = match self.policy {
            ExecutionPolicy::SingleThreaded => vec![order],
            ExecutionPolicy::MultiThreaded => {
                partition_round_robin(&order, self.core.pool().max_threads())
            }
        };
        Ok(())
    }

    /// The job partition built by `init` (diagnostics).
    pub fn job_lists(&self) -> &[Vec<usize>] {
        &self.jobs
    }

    /// Starts execution. Single-threaded policy blocks until quiescence;
    /// multi-threaded policy returns once workers are launched.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        match self.core.state() {
            SchedulerState::Idle => self.init()?,
            SchedulerState::Stopped => self.reset(),
            SchedulerState::Paused => self.core.set_state(SchedulerState::Initialised),
            _ => {}
        }
        if self.core.state() != SchedulerState::Initialised {
            return Err(SchedulerError::NotInitialised(self.core.state()));
        }
        match self.policy {
            ExecutionPolicy::SingleThreaded => {
                let order = self.jobs.first().cloned().unwrap_or_default();
                self.core.run_single_threaded(&order)
            }
            ExecutionPolicy::MultiThreaded => {
                let jobs = self.jobs.clone();
                self.core.run_job_lists(&jobs)
            }
        }
    }

    /// `start` followed by [`wait_done`](Self::wait_done).
    pub fn run_and_wait(&mut self) -> Result<(), SchedulerError> {
        self.start()?;
        if self.policy == ExecutionPolicy::MultiThreaded {
            self.core.wait_done();
        }
        Ok(())
    }

    /// Blocks until the pool workers have drained.
    pub fn wait_done(&mut self) {
        self.core.wait_done();
    }

    /// Asks running workers to stop at the next block boundary.
    pub fn request_stop(&mut self) {
        self.core.request_stop();
    }

    /// Asks running workers to pause at the next block boundary.
    pub fn request_pause(&mut self) {
        self.core.request_pause();
    }

    /// Stops and waits for the drain.
    pub fn stop(&mut self) {
        self.core.stop();
    }

    /// Pauses and waits for the drain.
    pub fn pause(&mut self) {
        self.core.pause();
    }

    /// Returns a drained scheduler to `Initialised`, preserving in-flight
    /// buffer contents.
    pub fn reset(&mut self) {
        if self.core.state() == SchedulerState::Idle {
            let _ = self.init();
        } else {
            self.core.reset_states();
        }
    }
}
