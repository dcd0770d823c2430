//! Caudal Graph — the block, port and graph model of the caudal dataflow
//! runtime.
//!
//! A [`Graph`] owns heap-allocated [`Block`]s and the typed edges between
//! them. Connections are declared lazily with [`Graph::connect`] and resolved
//! in one shot by [`Graph::init`], which turns every pending definition into
//! a live [`CircularBuffer`](caudal_core::CircularBuffer) shared by exactly
//! one writer (the source port) and one reader (the destination port).
//!
//! Schedulers drive the graph exclusively through the [`Block`] trait.
//!
//! ## Example
//!
//! ```rust
//! use caudal_graph::{Graph, blocks::{VectorSource, CollectSink}};
//!
//! let mut graph = Graph::new();
//! let sink_block = CollectSink::<i32>::new();
//! let collected = sink_block.handle();
//! let src = graph.add_block(VectorSource::new(vec![1i32, 2, 3]));
//! let sink = graph.add_block(sink_block);
//! graph.connect::<i32>(src, 0, sink, 0, 64);
//! graph.init().unwrap();
//!
//! // one manual pass of each block
//! for block in graph.blocks_mut() {
//!     block.work(usize::MAX);
//! }
//! assert_eq!(&*collected.lock(), &[1, 2, 3]);
//! ```

pub mod block;
pub mod blocks;
pub mod error;
pub mod graph;
pub mod port;

pub use block::{Block, WorkResult, WorkStatus, instance_name};
pub use error::GraphError;
pub use graph::{BlockId, ConnectionDefinition, Edge, Graph};
pub use port::{StreamInput, StreamOutput};
