//! The breadth-first scheduler: producers run before their consumers.

use std::collections::VecDeque;
use std::sync::Arc;

use caudal_graph::Graph;

use crate::pool::ThreadPool;
use crate::scheduler::{
    ExecutionPolicy, SchedulerCore, SchedulerError, SchedulerState, partition_round_robin,
};

/// Scheduler whose block order is a breadth-first traversal rooted at the
/// in-degree-zero blocks.
///
/// Within a pass every producer runs before the consumers it feeds, which
/// shortens pipeline latency compared to insertion order. Cycles are broken
/// by the visited set; execution machinery (partitioning, progress word) is
/// identical to the [`SimpleScheduler`](crate::SimpleScheduler).
pub struct BreadthFirstScheduler {
    core: SchedulerCore,
    policy: ExecutionPolicy,
    order: Vec<usize>,
    jobs: Vec<Vec<usize>>,
}

impl BreadthFirstScheduler {
    /// Scheduler over `graph` with a dedicated CPU-bound pool.
    pub fn new(graph: Graph, policy: ExecutionPolicy) -> Self {
        Self::with_pool(
            graph,
            policy,
            Arc::new(ThreadPool::cpu_bound("breadth-first-pool")),
        )
    }

    /// Scheduler over `graph` sharing an existing pool.
    pub fn with_pool(graph: Graph, policy: ExecutionPolicy, pool: Arc<ThreadPool>) -> Self {
        Self {
            core: SchedulerCore::new(graph, pool),
            policy,
            order: Vec::new(),
            jobs: Vec::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.core.state()
    }

    /// Shared access to the scheduler core.
    pub fn core(&self) -> &SchedulerCore {
        &self.core
    }

    /// The traversal order computed by `init` (diagnostics).
    pub fn block_order(&self) -> &[usize] {
        &self.order
    }

    /// The job partition built by `init` (diagnostics).
    pub fn job_lists(&self) -> &[Vec<usize>] {
        &self.jobs
    }

    /// Resolves the graph, computes the traversal order and the partition.
    pub fn init(&mut self) -> Result<(), SchedulerError> {
        self.core.init()?;
        self.order = breadth_first_order(self.core.n_blocks(), self.core.edges());
        self.jobs = match self.policy {
            ExecutionPolicy::SingleThreaded => vec![self.order.clone()],
            ExecutionPolicy::MultiThreaded => {
                partition_round_robin(&self.order, self.core.pool().max_threads())
            }
        };
        Ok(())
    }

    /// Starts execution; see [`SimpleScheduler::start`](crate::SimpleScheduler::start).
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
                let order = self.order.clone();
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

/// Breadth-first block order over `n_blocks` given the resolved edges.
///
/// Roots are the blocks with no incoming edge (isolated blocks included), in
/// insertion order. The visited set breaks cycles; blocks reachable only
/// through a cycle that excludes every root are appended at the end in
/// insertion order so no block is silently dropped from the schedule.
fn breadth_first_order(n_blocks: usize, edges: &[caudal_graph::Edge]) -> Vec<usize> {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n_blocks];
    let mut in_degree = vec![0usize; n_blocks];
    for edge in edges {
        adjacency[edge.src.0].push(edge.dst.0);
        in_degree[edge.dst.0] += 1;
    }

    let mut order = Vec::with_capacity(n_blocks);
    let mut visited = vec![false; n_blocks];
    let mut queue: VecDeque<usize> = VecDeque::new();
    for (block, &degree) in in_degree.iter().enumerate() {
        if degree == 0 {
            visited[block] = true;
            queue.push_back(block);
        }
    }
    while let Some(block) = queue.pop_front() {
        order.push(block);
        for &next in &adjacency[block] {
            if !visited[next] {
                visited[next] = true;
                queue.push_back(next);
            }
        }
    }
    for block in 0..n_blocks {
        if !visited[block] {
            order.push(block);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use caudal_graph::{BlockId, Edge};

    fn edge(src: usize, dst: usize) -> Edge {
        Edge {
            src: BlockId(src),
            src_port: 0,
            dst: BlockId(dst),
            dst_port: 0,
            buffer_size: 0,
        }
    }

    #[test]
    fn producers_precede_consumers() {
        // 2 -> 0 -> 1, insertion order would run the sink first
        let order = breadth_first_order(3, &[edge(2, 0), edge(0, 1)]);
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn diamond_traverses_level_by_level() {
        // 0 -> {1, 2} -> 3
        let order = breadth_first_order(4, &[edge(0, 1), edge(0, 2), edge(1, 3), edge(2, 3)]);
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn isolated_blocks_are_roots() {
        let order = breadth_first_order(3, &[edge(0, 1)]);
        assert_eq!(order, vec![0, 2, 1]);
    }

    #[test]
    fn cycle_members_are_not_dropped() {
        // 0 -> 1 <-> 2 (cycle reachable from root), plus 3 <-> 4 (unrooted)
        let order = breadth_first_order(5, &[
            edge(0, 1),
            edge(1, 2),
            edge(2, 1),
            edge(3, 4),
            edge(4, 3),
        ]);
        assert_eq!(order[0], 0);
        assert!(order.contains(&3) && order.contains(&4));
        assert_eq!(order.len(), 5);
    }
}
