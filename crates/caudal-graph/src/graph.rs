//! The graph: owned blocks, pending connections, resolved edges.
//!
//! `connect` is lazy — it records a definition (a closure capturing the port
//! identities and element type) without touching any block. `init` executes
//! every pending definition, building one buffer per edge and attaching the
//! writer to the source port and a fresh reader to the destination port. The
//! graph initialises all-or-nothing: the first failing definition rolls back
//! every edge resolved in the same pass.

use tracing::{debug, warn};

use caudal_core::CircularBuffer;

use crate::block::Block;
use crate::error::GraphError;
use crate::port::{StreamInput, StreamOutput};

/// Stable identity of a block inside one graph (its slot index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// A resolved connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Producing block.
    pub src: BlockId,
    /// Output port index on `src`.
    pub src_port: usize,
    /// Consuming block.
    pub dst: BlockId,
    /// Input port index on `dst`.
    pub dst_port: usize,
    /// Actual buffer capacity after rounding.
    pub buffer_size: usize,
}

type ResolveFn = Box<dyn FnOnce(&mut [Box<dyn Block>]) -> Result<Edge, GraphError> + Send>;
type UndoFn = Box<dyn Fn(&mut [Box<dyn Block>]) + Send>;

/// A pending connection: metadata for introspection plus the typed closures
/// that resolve and (on failure elsewhere) undo it.
pub struct ConnectionDefinition {
    /// Producing block.
    pub src: BlockId,
    /// Output port index on `src`.
    pub src_port: usize,
    /// Consuming block.
    pub dst: BlockId,
    /// Input port index on `dst`.
    pub dst_port: usize,
    /// Requested minimum edge buffer size.
    pub min_buffer_size: usize,
    resolve: ResolveFn,
    undo: UndoFn,
}

/// A directed graph of blocks connected by typed streaming edges.
///
/// Blocks are owned by the graph from `add_block` until teardown; schedulers
/// borrow the graph for their lifetime.
#[derive(Default)]
pub struct Graph {
    blocks: Vec<Box<dyn Block>>,
    definitions: Vec<ConnectionDefinition>,
    edges: Vec<Edge>,
}

impl Graph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `block`; the returned id stays valid for the life
    /// of the graph.
    pub fn add_block<B: Block + 'static>(&mut self, block: B) -> BlockId {
        self.add_boxed(Box::new(block))
    }

    /// [`add_block`](Self::add_block) for an already boxed block.
    pub fn add_boxed(&mut self, block: Box<dyn Block>) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(block);
        id
    }

    /// Records a pending connection from `src`'s output port to `dst`'s
    /// input port over element type `T`.
    ///
    /// Nothing is validated here; `init` resolves (and may reject) the
    /// definition. The edge buffer is sized to the largest of
    /// `min_buffer_size` and the two ports' own requests.
    pub fn connect<T>(
        &mut self,
        src: BlockId,
        src_port: usize,
        dst: BlockId,
        dst_port: usize,
        min_buffer_size: usize,
    ) where
        T: Clone + Default + Send + Sync + 'static,
    {
        let resolve: ResolveFn = Box::new(move |blocks| {
            if src == dst {
                return Err(GraphError::InvalidConnection("self-loops are not supported"));
            }
            if src.0 >= blocks.len() {
                return Err(GraphError::BlockNotFound(src));
            }
            if dst.0 >= blocks.len() {
                return Err(GraphError::BlockNotFound(dst));
            }

            let in_min = {
                let any = blocks[dst.0].input_port_any(dst_port).ok_or(
                    GraphError::PortMismatch {
                        block: dst,
                        port: dst_port,
                        reason: "no such input port",
                    },
                )?;
                let input =
                    any.downcast_mut::<StreamInput<T>>()
                        .ok_or(GraphError::PortMismatch {
                            block: dst,
                            port: dst_port,
                            reason: "input element type differs from edge type",
                        })?;
                if input.is_connected() {
                    return Err(GraphError::AlreadyConnected);
                }
                input.min_buffer_size()
            };

            let out_min = {
                let any = blocks[src.0].output_port_any(src_port).ok_or(
                    GraphError::PortMismatch {
                        block: src,
                        port: src_port,
                        reason: "no such output port",
                    },
                )?;
                let output =
                    any.downcast_mut::<StreamOutput<T>>()
                        .ok_or(GraphError::PortMismatch {
                            block: src,
                            port: src_port,
                            reason: "output element type differs from edge type",
                        })?;
                if output.is_connected() {
                    return Err(GraphError::AlreadyConnected);
                }
                output.min_buffer_size()
            };

            let size = min_buffer_size.max(in_min).max(out_min).max(1);
            // strict constructor: a refused mapping fails the whole init
            // with ResourceExhausted instead of silently degrading
            let buffer = CircularBuffer::<T>::try_new(size)?;

            // The checks above make these binds infallible within this call.
            blocks[src.0]
                .output_port_any(src_port)
                .and_then(|any| any.downcast_mut::<StreamOutput<T>>())
                .expect("output port verified above")
                .bind(buffer.new_writer())?;
            blocks[dst.0]
                .input_port_any(dst_port)
                .and_then(|any| any.downcast_mut::<StreamInput<T>>())
                .expect("input port verified above")
                .bind(buffer.new_reader())?;

            Ok(Edge {
                src,
                src_port,
                dst,
                dst_port,
                buffer_size: buffer.size(),
            })
        });

        let undo: UndoFn = Box::new(move |blocks| {
            if let Some(port) = blocks
                .get_mut(src.0)
                .and_then(|block| block.output_port_any(src_port))
                .and_then(|any| any.downcast_mut::<StreamOutput<T>>())
            {
                port.unbind();
            }
            if let Some(port) = blocks
                .get_mut(dst.0)
                .and_then(|block| block.input_port_any(dst_port))
                .and_then(|any| any.downcast_mut::<StreamInput<T>>())
            {
                port.unbind();
            }
        });

        self.definitions.push(ConnectionDefinition {
            src,
            src_port,
            dst,
            dst_port,
            min_buffer_size,
            resolve,
            undo,
        });
    }

    /// Resolves every pending connection definition.
    ///
    /// All-or-nothing: on the first failure every edge resolved in this pass
    /// is disconnected again and the error is returned; previously resolved
    /// edges (from earlier successful `init` calls) are untouched.
    pub fn init(&mut self) -> Result<(), GraphError> {
        let definitions = std::mem::take(&mut self.definitions);
        let mut resolved = Vec::with_capacity(definitions.len());
        let mut undos = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let ConnectionDefinition { resolve, undo, .. } = definition;
            match resolve(&mut self.blocks) {
                Ok(edge) => {
                    debug!(
                        src = edge.src.0,
                        src_port = edge.src_port,
                        dst = edge.dst.0,
                        dst_port = edge.dst_port,
                        buffer_size = edge.buffer_size,
                        "edge resolved"
                    );
                    resolved.push(edge);
                    undos.push(undo);
                }
                Err(err) => {
                    // resolve is atomic: a failed definition bound nothing,
                    // so only the edges of this pass need rolling back
                    warn!(error = %err, "graph init failed; rolling back this pass");
                    drop(undo);
                    for undo in undos.iter().rev() {
                        undo(&mut self.blocks);
                    }
                    return Err(err);
                }
            }
        }

        self.edges.extend(resolved);
        Ok(())
    }

    /// All blocks, in insertion order.
    pub fn blocks(&self) -> &[Box<dyn Block>] {
        &self.blocks
    }

    /// Mutable access to the blocks (scheduler hot path).
    pub fn blocks_mut(&mut self) -> &mut [Box<dyn Block>] {
        &mut self.blocks
    }

    /// A single block by id.
    pub fn block(&self, id: BlockId) -> Option<&dyn Block> {
        self.blocks.get(id.0).map(AsRef::as_ref)
    }

    /// Resolved edges, in resolution order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Connection definitions still pending resolution.
    pub fn connection_definitions(&self) -> &[ConnectionDefinition] {
        &self.definitions
    }

    /// Dismantles the graph into its blocks and resolved edges, in order.
    ///
    /// Used by schedulers to take ownership of the blocks for pool
    /// execution. Call after [`init`](Self::init); any still-pending
    /// connection definitions are dropped unresolved.
    pub fn into_parts(self) -> (Vec<Box<dyn Block>>, Vec<Edge>) {
        (self.blocks, self.edges)
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("blocks", &self.blocks.len())
            .field("pending", &self.definitions.len())
            .field("edges", &self.edges)
            .finish()
    }
}
