//! Scheduler core: state machine, pool execution and quiescence.
//!
//! [`SchedulerCore`] owns the graph (taking the blocks over at init), a
//! thread pool, the packed [`ProgressWord`](crate::progress::ProgressWord)
//! and the stop/error flags. Concrete schedulers
//! ([`SimpleScheduler`](crate::SimpleScheduler),
//! [`BreadthFirstScheduler`](crate::BreadthFirstScheduler)) contribute only a
//! block ordering and job partition; everything else lives here.
//!
//! The state cell is written by the controlling thread exclusively. Workers
//! never touch it — they observe the stop flag and report failures through
//! the error flag, which the controller folds into the state on
//! [`wait_done`](SchedulerCore::wait_done).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, error, info};

use caudal_graph::{Block, Edge, Graph, GraphError, WorkResult, WorkStatus};

use crate::pool::ThreadPool;
use crate::profile::{NullProfiler, ProfilerSink};
use crate::progress::{ProgressWord, done_count, progress_count};

/// Lifecycle states of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed; the graph's connections are not resolved yet.
    Idle,
    /// Graph resolved, job lists built, ready to start.
    Initialised,
    /// Workers are executing.
    Running,
    /// Stop requested; workers drain their current pass.
    RequestedStop,
    /// Pause requested; workers drain their current pass.
    RequestedPause,
    /// All workers exited after a stop or natural quiescence.
    Stopped,
    /// All workers exited after a pause; `start` resumes.
    Paused,
    /// Torn down by the destructor.
    ShuttingDown,
    /// Sink state: init failed or a block returned a work error.
    Error,
}

/// Whether a scheduler runs inline or on its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionPolicy {
    /// Iterate the block order on the calling thread.
    #[default]
    SingleThreaded,
    /// Partition the block order across pool workers.
    MultiThreaded,
}

/// Scheduler-level failures.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start` was called while the scheduler is not in `Initialised`.
    #[error("scheduler is not initialised (state {0:?})")]
    NotInitialised(SchedulerState),

    /// Connection resolution failed during `init`.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// The executable form of a graph: blocks behind per-block locks so disjoint
/// job sets can run on different workers, plus the resolved edges.
///
/// Job partitions never overlap, so the locks are uncontended in steady
/// state; they exist to make the partitioning sound, not to serialise.
pub(crate) struct ExecGraph {
    pub(crate) blocks: Vec<Mutex<Box<dyn Block>>>,
    pub(crate) edges: Vec<Edge>,
}

/// Counts live workers; the controller parks on it in `wait_done`.
#[derive(Default)]
struct RunningGate {
    count: AtomicUsize,
    gate: Mutex<()>,
    cond: Condvar,
}

impl RunningGate {
    fn set(&self, n: usize) {
        self.count.store(n, Ordering::Release);
    }

    fn exit_one(&self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
        let _guard = self.gate.lock();
        self.cond.notify_all();
    }

    fn wait_zero(&self) {
        let mut guard = self.gate.lock();
        while self.count.load(Ordering::Acquire) > 0 {
            self.cond.wait(&mut guard);
        }
    }
}

/// Shared machinery of every scheduler flavour.
pub struct SchedulerCore {
    graph: Option<Graph>,
    exec: Option<Arc<ExecGraph>>,
    pool: Arc<ThreadPool>,
    state: SchedulerState,
    progress: Arc<ProgressWord>,
    running: Arc<RunningGate>,
    stop_requested: Arc<AtomicBool>,
    work_error: Arc<AtomicBool>,
    profiler: Arc<dyn ProfilerSink>,
}

impl SchedulerCore {
    /// Takes ownership of `graph`; blocks move into execution form at `init`.
    pub fn new(graph: Graph, pool: Arc<ThreadPool>) -> Self {
        Self {
            graph: Some(graph),
            exec: None,
            pool,
            state: SchedulerState::Idle,
            progress: Arc::new(ProgressWord::new()),
            running: Arc::new(RunningGate::default()),
            stop_requested: Arc::new(AtomicBool::new(false)),
            work_error: Arc::new(AtomicBool::new(false)),
            profiler: Arc::new(NullProfiler),
        }
    }

    /// Replaces the profiling sink (default: discard).
    pub fn set_profiler(&mut self, profiler: Arc<dyn ProfilerSink>) {
        self.profiler = profiler;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// The pool this scheduler partitions work onto.
    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// Number of blocks owned (0 before `init`).
    pub fn n_blocks(&self) -> usize {
        match (&self.exec, &self.graph) {
            (Some(exec), _) => exec.blocks.len(),
            (None, Some(graph)) => graph.blocks().len(),
            (None, None) => 0,
        }
    }

    /// Resolved edges (empty before `init`).
    pub fn edges(&self) -> &[Edge] {
        self.exec.as_ref().map_or(&[], |exec| &exec.edges)
    }

    pub(crate) fn exec(&self) -> Result<Arc<ExecGraph>, SchedulerError> {
        self.exec
            .clone()
            .ok_or(SchedulerError::NotInitialised(self.state))
    }

    /// Resolves the graph's pending connections and converts it to execution
    /// form. `Idle → Initialised` on success, `Idle → Error` on failure; a
    /// no-op in any other state.
    pub fn init(&mut self) -> Result<(), SchedulerError> {
        if self.state != SchedulerState::Idle {
            return Ok(());
        }
        let started = Instant::now();
        let mut graph = self
            .graph
            .take()
            .expect("graph is present while state is Idle");
        match graph.init() {
            Ok(()) => {
                let (blocks, edges) = graph.into_parts();
                info!(blocks = blocks.len(), edges = edges.len(), "graph initialised");
                self.exec = Some(Arc::new(ExecGraph {
                    blocks: blocks.into_iter().map(Mutex::new).collect(),
                    edges,
                }));
                self.state = SchedulerState::Initialised;
                self.profiler.record("scheduler.init", started.elapsed());
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "graph initialisation failed");
                self.state = SchedulerState::Error;
                Err(err.into())
            }
        }
    }

    /// Sets the stop flag and wakes parked workers. `Running →
    /// RequestedStop`.
    pub fn request_stop(&mut self) {
        self.stop_requested.store(true, Ordering::Release);
        self.progress.notify_all();
        if self.state == SchedulerState::Running {
            self.state = SchedulerState::RequestedStop;
        }
    }

    /// Sets the stop flag and wakes parked workers. `Running →
    /// RequestedPause`.
    pub fn request_pause(&mut self) {
        self.stop_requested.store(true, Ordering::Release);
        self.progress.notify_all();
        if self.state == SchedulerState::Running {
            self.state = SchedulerState::RequestedPause;
        }
    }

    /// Blocks until every worker has exited, then folds the outcome into the
    /// state: `Error` if any block failed, `Paused` after a pause request,
    /// `Stopped` otherwise.
    pub fn wait_done(&mut self) {
        let started = Instant::now();
        self.running.wait_zero();
        self.state = if self.work_error.load(Ordering::Acquire) {
            SchedulerState::Error
        } else if self.state == SchedulerState::RequestedPause {
            SchedulerState::Paused
        } else {
            SchedulerState::Stopped
        };
        self.profiler.record("scheduler.wait_done", started.elapsed());
        debug!(state = ?self.state, "workers drained");
    }

    /// Requests a stop if running, waits for the drain. Terminal in
    /// `Stopped`/`Error`.
    pub fn stop(&mut self) {
        if matches!(self.state, SchedulerState::Stopped | SchedulerState::Error) {
            return;
        }
        if self.state == SchedulerState::Running {
            self.request_stop();
        }
        self.wait_done();
    }

    /// Requests a pause if running, waits for the drain.
    pub fn pause(&mut self) {
        if matches!(self.state, SchedulerState::Paused | SchedulerState::Error) {
            return;
        }
        if self.state == SchedulerState::Running {
            self.request_pause();
        }
        self.wait_done();
    }

    /// Returns a drained scheduler to `Initialised`.
    ///
    /// In-flight buffer contents are preserved: a resumed run continues from
    /// the samples still queued on the edges.
    pub(crate) fn reset_states(&mut self) {
        match self.state {
            SchedulerState::Running
            | SchedulerState::RequestedStop
            | SchedulerState::RequestedPause => {
                self.pause();
                self.state = SchedulerState::Initialised;
            }
            SchedulerState::Stopped | SchedulerState::Paused => {
                self.state = SchedulerState::Initialised;
            }
            SchedulerState::Idle
            | SchedulerState::Initialised
            | SchedulerState::ShuttingDown
            | SchedulerState::Error => {}
        }
    }

    pub(crate) fn set_state(&mut self, state: SchedulerState) {
        self.state = state;
    }

    pub(crate) fn stop_flag(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Launches one pool worker per job set running the progress-word
    /// protocol until global quiescence, stop, or error.
    pub(crate) fn run_job_lists(&mut self, jobs: &[Vec<usize>]) -> Result<(), SchedulerError> {
        let exec = self.exec()?;
        self.progress.reset();
        self.stop_requested.store(false, Ordering::Release);
        self.work_error.store(false, Ordering::Release);
        self.running.set(jobs.len());
        self.state = SchedulerState::Running;
        let n_batches = jobs.len() as u32;
        debug!(batches = n_batches, "launching pool workers");
        for indices in jobs {
            let exec = Arc::clone(&exec);
            let indices = indices.clone();
            let progress = Arc::clone(&self.progress);
            let running = Arc::clone(&self.running);
            let stop = Arc::clone(&self.stop_requested);
            let work_error = Arc::clone(&self.work_error);
            self.pool.execute(move || {
                pool_worker(&exec, &indices, &progress, &stop, &work_error, n_batches);
                running.exit_one();
            });
        }
        Ok(())
    }

    /// Runs `order` inline until a full pass performs no work, the stop flag
    /// rises, or a block errors. Sets the terminal state itself.
    pub(crate) fn run_single_threaded(&mut self, order: &[usize]) -> Result<(), SchedulerError> {
        let exec = self.exec()?;
        self.stop_requested.store(false, Ordering::Release);
        self.state = SchedulerState::Running;
        loop {
            let result = work_once(&exec, order);
            if result.status == WorkStatus::Error {
                error!("block returned a work error");
                self.state = SchedulerState::Error;
                return Ok(());
            }
            if result.status != WorkStatus::Ok || self.stop_flag() {
                break;
            }
        }
        self.state = if self.state == SchedulerState::RequestedPause {
            SchedulerState::Paused
        } else {
            SchedulerState::Stopped
        };
        Ok(())
    }
}

impl Drop for SchedulerCore {
    fn drop(&mut self) {
        self.stop();
        self.state = SchedulerState::ShuttingDown;
    }
}

/// One pass over `indices`: drives every block once and classifies the pass.
///
/// `Ok` when any block produced or consumed (or a blocking block has input
/// pending), `Done` when the whole pass was idle, `Error` immediately on the
/// first failing block.
pub(crate) fn work_once(exec: &ExecGraph, indices: &[usize]) -> WorkResult {
    let requested = usize::MAX;
    let mut performed = 0;
    let mut productive = false;
    let mut counts = Vec::new();
    for &index in indices {
        let mut block = exec.blocks[index].lock();
        let result = block.work(requested);
        performed += result.performed;
        match result.status {
            WorkStatus::Error => {
                return WorkResult::new(requested, performed, WorkStatus::Error);
            }
            WorkStatus::InsufficientInput | WorkStatus::Done => {}
            WorkStatus::Ok | WorkStatus::InsufficientOutput => productive = true,
        }
        // A blocking block may be fed from outside the scheduler's passes:
        // pending input counts as progress so the run does not end under it.
        if block.is_blocking() {
            productive |= block.available_input_samples(&mut counts) > 0;
        }
    }
    let status = if productive {
        WorkStatus::Ok
    } else {
        WorkStatus::Done
    };
    WorkResult::new(requested, performed, status)
}

/// The per-worker quiescence protocol over the packed progress word.
fn pool_worker(
    exec: &ExecGraph,
    indices: &[usize],
    progress: &ProgressWord,
    stop: &AtomicBool,
    work_error: &AtomicBool,
    n_batches: u32,
) {
    let mut seen_progress: u32 = 0;
    let mut done: u32 = 0;
    while done < n_batches && !stop.load(Ordering::Acquire) {
        let result = work_once(exec, indices);
        if result.status == WorkStatus::Error {
            work_error.store(true, Ordering::Release);
            stop.store(true, Ordering::Release);
            progress.notify_all();
            break;
        }
        if result.status == WorkStatus::Ok {
            let word = progress.note_progress();
            seen_progress = progress_count(word);
            done = done_count(word);
        } else {
            let word = progress.note_idle(seen_progress);
            let counted = progress_count(word) == seen_progress;
            seen_progress = progress_count(word);
            done = done_count(word);
            if counted && done < n_batches {
                // Quiescent locally and no peer progressed: park until the
                // word moves. A peer's progress voids the vote instead, and
                // the pass reruns immediately.
                progress.wait_change(word, || stop.load(Ordering::Acquire));
            }
        }
    }
}

/// Round-robin partition of `order` into `min(max_threads, len)` job sets:
/// entry `j` lands in set `j % k`.
pub(crate) fn partition_round_robin(order: &[usize], max_threads: usize) -> Vec<Vec<usize>> {
    let k = max_threads.min(order.len()).max(1);
    let mut jobs = vec![Vec::with_capacity(order.len() / k + 1); k];
    for (j, &index) in order.iter().enumerate() {
        jobs[j % k].push(index);
    }
    jobs
}
