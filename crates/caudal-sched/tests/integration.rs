//! Scheduler end-to-end runs: quiescence, state machine, error sink.

use std::sync::Arc;

use caudal_graph::blocks::{CollectSink, CopyBlock, CountingSource, NullSink, VectorSource};
use caudal_graph::{Block, BlockId, Graph, WorkResult, WorkStatus};
use caudal_sched::{
    BreadthFirstScheduler, ExecutionPolicy, MemoryProfiler, SchedulerState, SimpleScheduler,
    ThreadPool,
};

fn source_to_sink_graph(n: usize) -> (Graph, Arc<parking_lot::Mutex<Vec<i64>>>) {
    let mut graph = Graph::new();
    let sink_block = CollectSink::<i64>::new();
    let collected = sink_block.handle();
    let src = graph.add_block(CountingSource::<i64>::new(n));
    let sink = graph.add_block(sink_block);
    graph.connect::<i64>(src, 0, sink, 0, 256);
    (graph, collected)
}

#[test]
fn single_threaded_simple_drains_the_source() {
    let (graph, collected) = source_to_sink_graph(1000);
    let mut scheduler = SimpleScheduler::new(graph, ExecutionPolicy::SingleThreaded);
    scheduler.run_and_wait().unwrap();

    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    let sum: i64 = collected.lock().iter().sum();
    assert_eq!(sum, (0..1000).sum::<i64>());
}

#[test]
fn multi_threaded_simple_reaches_quiescence() {
    let (graph, collected) = source_to_sink_graph(1000);
    let pool = Arc::new(ThreadPool::new("sched-test-pool", 4));
    let mut scheduler =
        SimpleScheduler::with_pool(graph, ExecutionPolicy::MultiThreaded, pool);
    scheduler.run_and_wait().unwrap();

    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(collected.lock().len(), 1000);
    let sum: i64 = collected.lock().iter().sum();
    assert_eq!(sum, 999 * 1000 / 2);
}

#[test]
fn multi_threaded_pipeline_preserves_order() {
    let mut graph = Graph::new();
    let data: Vec<i64> = (0..5000).collect();
    let sink_block = CollectSink::<i64>::new();
    let collected = sink_block.handle();
    let src = graph.add_block(VectorSource::new(data.clone()));
    let copy_a = graph.add_block(CopyBlock::<i64>::new());
    let copy_b = graph.add_block(CopyBlock::<i64>::new());
    let sink = graph.add_block(sink_block);
    graph.connect::<i64>(src, 0, copy_a, 0, 128);
    graph.connect::<i64>(copy_a, 0, copy_b, 0, 128);
    graph.connect::<i64>(copy_b, 0, sink, 0, 128);

    let pool = Arc::new(ThreadPool::new("pipeline-pool", 4));
    let mut scheduler =
        SimpleScheduler::with_pool(graph, ExecutionPolicy::MultiThreaded, pool);
    scheduler.run_and_wait().unwrap();

    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(&*collected.lock(), &data);
}

#[test]
fn breadth_first_orders_producers_first() {
    // insertion order deliberately lists the sink before the source
    let mut graph = Graph::new();
    let sink_block = NullSink::<i64>::new();
    let count = sink_block.count_handle();
    let sink = graph.add_block(sink_block);
    let copy = graph.add_block(CopyBlock::<i64>::new());
    let src = graph.add_block(VectorSource::new((0..300i64).collect()));
    graph.connect::<i64>(src, 0, copy, 0, 128);
    graph.connect::<i64>(copy, 0, sink, 0, 128);

    let mut scheduler =
        BreadthFirstScheduler::new(graph, ExecutionPolicy::SingleThreaded);
    scheduler.init().unwrap();
    assert_eq!(scheduler.block_order(), &[src.0, copy.0, sink.0]);

    scheduler.run_and_wait().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(count.load(std::sync::atomic::Ordering::Relaxed), 300);
}

#[test]
fn breadth_first_multi_threaded_diamond() {
    // src -> copy_a -> sink_a and src' -> copy_b -> sink_b as two chains
    let mut graph = Graph::new();
    let sink_block_a = CollectSink::<i64>::new();
    let sink_block_b = CollectSink::<i64>::new();
    let got_a = sink_block_a.handle();
    let got_b = sink_block_b.handle();

    let src_a = graph.add_block(VectorSource::new((0..2000i64).collect()));
    let src_b = graph.add_block(VectorSource::new((0..2000i64).rev().collect()));
    let copy_a = graph.add_block(CopyBlock::<i64>::new());
    let copy_b = graph.add_block(CopyBlock::<i64>::new());
    let sink_a = graph.add_block(sink_block_a);
    let sink_b = graph.add_block(sink_block_b);
    graph.connect::<i64>(src_a, 0, copy_a, 0, 128);
    graph.connect::<i64>(copy_a, 0, sink_a, 0, 128);
    graph.connect::<i64>(src_b, 0, copy_b, 0, 128);
    graph.connect::<i64>(copy_b, 0, sink_b, 0, 128);

    let pool = Arc::new(ThreadPool::new("bfs-pool", 4));
    let mut scheduler =
        BreadthFirstScheduler::with_pool(graph, ExecutionPolicy::MultiThreaded, pool);
    scheduler.run_and_wait().unwrap();

    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(&*got_a.lock(), &(0..2000i64).collect::<Vec<_>>());
    assert_eq!(&*got_b.lock(), &(0..2000i64).rev().collect::<Vec<_>>());
}

#[test]
fn state_machine_walks_the_transition_table() {
    let (graph, _collected) = source_to_sink_graph(100);
    let mut scheduler = SimpleScheduler::new(graph, ExecutionPolicy::SingleThreaded);
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    scheduler.init().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Initialised);

    scheduler.run_and_wait().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);

    scheduler.reset();
    assert_eq!(scheduler.state(), SchedulerState::Initialised);
}

#[test]
fn init_failure_is_an_error_sink() {
    let mut graph = Graph::new();
    let src = graph.add_block(VectorSource::new(vec![1i32]));
    // dangling destination block
    graph.connect::<i32>(src, 0, BlockId(7), 0, 64);

    let mut scheduler = SimpleScheduler::new(graph, ExecutionPolicy::SingleThreaded);
    assert!(scheduler.init().is_err());
    assert_eq!(scheduler.state(), SchedulerState::Error);
    assert!(scheduler.start().is_err(), "error is a sink state");
    assert_eq!(scheduler.state(), SchedulerState::Error);
}

/// A block that fails its `work` call after a few successful passes.
struct FailingBlock {
    unique_name: String,
    remaining_ok: usize,
}

impl FailingBlock {
    fn new(remaining_ok: usize) -> Self {
        Self {
            unique_name: caudal_graph::instance_name("failing"),
            remaining_ok,
        }
    }
}

impl Block for FailingBlock {
    fn name(&self) -> &str {
        "failing"
    }

    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn work(&mut self, budget: usize) -> WorkResult {
        if self.remaining_ok == 0 {
            WorkResult::new(budget, 0, WorkStatus::Error)
        } else {
            self.remaining_ok -= 1;
            WorkResult::new(budget, 1, WorkStatus::Ok)
        }
    }

    fn available_input_samples(&self, counts: &mut Vec<usize>) -> usize {
        counts.clear();
        0
    }
}

#[test]
fn work_error_moves_single_threaded_scheduler_to_error() {
    let mut graph = Graph::new();
    graph.add_block(FailingBlock::new(3));
    let mut scheduler = SimpleScheduler::new(graph, ExecutionPolicy::SingleThreaded);
    scheduler.run_and_wait().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Error);
}

#[test]
fn work_error_moves_pool_scheduler_to_error() {
    let mut graph = Graph::new();
    graph.add_block(FailingBlock::new(10));
    graph.add_block(FailingBlock::new(usize::MAX)); // keeps its worker busy
    let pool = Arc::new(ThreadPool::new("error-pool", 2));
    let mut scheduler =
        SimpleScheduler::with_pool(graph, ExecutionPolicy::MultiThreaded, pool);
    scheduler.run_and_wait().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Error);
}

#[test]
fn profiler_records_lifecycle_events() {
    let (graph, _collected) = source_to_sink_graph(10);
    let profiler = Arc::new(MemoryProfiler::new());
    let pool = Arc::new(ThreadPool::new("profiled-pool", 2));
    let mut scheduler =
        SimpleScheduler::with_pool(graph, ExecutionPolicy::MultiThreaded, pool);
    scheduler.core_mut().set_profiler(profiler.clone());
    scheduler.run_and_wait().unwrap();

    let names: Vec<&'static str> = profiler.events().iter().map(|(name, _)| *name).collect();
    assert!(names.contains(&"scheduler.init"));
    assert!(names.contains(&"scheduler.wait_done"));
}
