//! Caudal Core — lock-free streaming primitives for the caudal dataflow
//! runtime.
//!
//! This crate provides the storage layer everything else sits on:
//!
//! - [`CircularBuffer`]: bounded lock-free ring for one or many producers and
//!   any number of independent consumers, with scoped in-place
//!   [`ReservedOutput`]/[`ConsumableInput`] windows
//! - [`Sequence`]: cache-line-aligned atomic stream cursor
//! - [`WaitStrategy`] implementations from busy-spin to condvar parking
//! - [`DoubleMappedRegion`]: the same physical pages mapped twice, making
//!   wrap-around windows contiguous without a modulus branch (unix)
//! - [`HistoryBuffer`]: single-threaded newest-first sample history
//!
//! ## Example
//!
//! ```rust
//! use caudal_core::CircularBuffer;
//!
//! let buffer = CircularBuffer::<i32>::new(1024);
//! let mut writer = buffer.new_writer();
//! let reader = buffer.new_reader();
//!
//! writer.publish(|out| out.copy_from_slice(&[1, 2, 3]), 3).unwrap();
//! assert_eq!(reader.available(), 3);
//!
//! let input = reader.get();
//! assert_eq!(&input[..], &[1, 2, 3]);
//! assert!(input.consume(3));
//! assert_eq!(reader.available(), 0);
//! ```

pub mod buffer;
pub mod error;
pub mod history;
#[cfg(unix)]
pub mod mem;
pub mod sequence;
pub mod wait;

pub use buffer::{
    BufferReader, BufferWriter, CircularBuffer, ConsumableInput, ProducerKind, ReservedOutput,
    SpanReleasePolicy,
};
pub use error::{CoreError, Result};
pub use history::HistoryBuffer;
#[cfg(unix)]
pub use mem::DoubleMappedRegion;
pub use sequence::{INITIAL_CURSOR_VALUE, Sequence};
pub use wait::{
    Blocking, BusySpin, Sleeping, SpinWait, TimeoutBlocking, WaitStrategy, Yielding,
    default_strategy,
};
