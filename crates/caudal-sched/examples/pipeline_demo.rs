//! Build a four-block pipeline and run it on both schedulers.
//!
//! ```sh
//! cargo run --example pipeline_demo
//! ```

use std::sync::Arc;

use caudal_graph::Graph;
use caudal_graph::blocks::{CollectSink, CopyBlock, VectorSource};
use caudal_sched::{BreadthFirstScheduler, ExecutionPolicy, SimpleScheduler, ThreadPool};

fn build_graph(n: i64) -> (Graph, Arc<parking_lot::Mutex<Vec<i64>>>) {
    let mut graph = Graph::new();
    let sink_block = CollectSink::<i64>::new();
    let collected = sink_block.handle();

    let src = graph.add_block(VectorSource::new((0..n).collect()));
    let stage_a = graph.add_block(CopyBlock::<i64>::new());
    let stage_b = graph.add_block(CopyBlock::<i64>::new());
    let sink = graph.add_block(sink_block);
    graph.connect::<i64>(src, 0, stage_a, 0, 1024);
    graph.connect::<i64>(stage_a, 0, stage_b, 0, 1024);
    graph.connect::<i64>(stage_b, 0, sink, 0, 1024);
    (graph, collected)
}

fn main() {
    const SAMPLES: i64 = 100_000;

    let (graph, collected) = build_graph(SAMPLES);
    let mut simple = SimpleScheduler::new(graph, ExecutionPolicy::SingleThreaded);
    let started = std::time::Instant::now();
    simple.run_and_wait().expect("simple scheduler run");
    println!(
        "simple/single-threaded: {} samples in {:?} (state {:?})",
        collected.lock().len(),
        started.elapsed(),
        simple.state(),
    );

    let (graph, collected) = build_graph(SAMPLES);
    let pool = Arc::new(ThreadPool::new("demo-pool", 4));
    let mut bfs = BreadthFirstScheduler::with_pool(graph, ExecutionPolicy::MultiThreaded, pool);
    let started = std::time::Instant::now();
    bfs.run_and_wait().expect("breadth-first scheduler run");
    println!(
        "breadth-first/pool(4): {} samples in {:?} (state {:?})",
        collected.lock().len(),
        started.elapsed(),
        bfs.state(),
    );
}
