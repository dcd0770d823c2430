//! Graph construction and wiring errors.

use thiserror::Error;

use crate::graph::BlockId;

/// Errors raised while building a graph or resolving its connections.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A connection references a block the graph does not own.
    #[error("block {0:?} not found")]
    BlockNotFound(BlockId),

    /// A port index does not exist or its element type differs from the
    /// requested edge type.
    #[error("port mismatch at {block:?} port {port}: {reason}")]
    PortMismatch {
        /// Block whose port was examined.
        block: BlockId,
        /// Port index on that block.
        port: usize,
        /// What did not line up.
        reason: &'static str,
    },

    /// The port already carries a resolved edge.
    #[error("port is already connected")]
    AlreadyConnected,

    /// A structurally invalid connection (e.g. a self-loop).
    #[error("invalid connection: {0}")]
    InvalidConnection(&'static str),

    /// Buffer construction failed underneath the edge resolution.
    #[error(transparent)]
    Resource(#[from] caudal_core::CoreError),
}
