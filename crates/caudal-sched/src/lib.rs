//! Caudal Sched — pool schedulers for the caudal dataflow runtime.
//!
//! A scheduler owns a resolved [`Graph`](caudal_graph::Graph) and drives
//! every block's `work` method, either inline or partitioned across a
//! [`ThreadPool`]. Global quiescence — every worker has observed a full pass
//! with no productive work — is detected lock-free through a packed
//! [`ProgressWord`], and lifecycle control runs through the
//! [`SchedulerState`] machine.
//!
//! ## Example
//!
//! ```rust
//! use caudal_graph::{Graph, blocks::{VectorSource, CollectSink}};
//! use caudal_sched::{ExecutionPolicy, SchedulerState, SimpleScheduler};
//!
//! let mut graph = Graph::new();
//! let sink_block = CollectSink::<i32>::new();
//! let collected = sink_block.handle();
//! let src = graph.add_block(VectorSource::new((0..100i32).collect()));
//! let sink = graph.add_block(sink_block);
//! graph.connect::<i32>(src, 0, sink, 0, 64);
//!
//! let mut scheduler = SimpleScheduler::new(graph, ExecutionPolicy::SingleThreaded);
//! scheduler.run_and_wait().unwrap();
//! assert_eq!(scheduler.state(), SchedulerState::Stopped);
//! assert_eq!(collected.lock().len(), 100);
//! ```

pub mod breadth_first;
pub mod pool;
pub mod profile;
pub mod progress;
pub mod scheduler;
pub mod simple;

pub use breadth_first::BreadthFirstScheduler;
pub use pool::ThreadPool;
pub use profile::{MemoryProfiler, NullProfiler, ProfilerSink};
pub use progress::ProgressWord;
pub use scheduler::{ExecutionPolicy, SchedulerCore, SchedulerError, SchedulerState};
pub use simple::SimpleScheduler;
