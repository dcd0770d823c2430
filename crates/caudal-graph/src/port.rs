//! Typed stream ports binding blocks to buffers.
//!
//! A port starts life unconnected. During [`Graph::init`](crate::Graph::init)
//! each resolved edge attaches a [`BufferWriter`] to the source port and a
//! [`BufferReader`] to the destination port. Blocks then move samples through
//! their ports inside `work` without ever seeing the buffer type.

use caudal_core::{BufferReader, BufferWriter, ConsumableInput, ReservedOutput};
use caudal_core::{CoreError, Result};

use crate::error::GraphError;

/// Consuming side of an edge: owns the reader once connected.
#[derive(Default)]
pub struct StreamInput<T> {
    reader: Option<BufferReader<T>>,
    min_buffer_size: usize,
}

impl<T> StreamInput<T> {
    /// Unconnected input with no buffer size preference.
    pub fn new() -> Self {
        Self {
            reader: None,
            min_buffer_size: 0,
        }
    }

    /// Unconnected input requesting at least `min_buffer_size` slots from the
    /// edge buffer it will be attached to.
    pub fn with_min_size(min_buffer_size: usize) -> Self {
        Self {
            reader: None,
            min_buffer_size,
        }
    }

    /// The buffer size this port asks the edge resolution to honour.
    pub fn min_buffer_size(&self) -> usize {
        self.min_buffer_size
    }

    /// True once an edge has been resolved onto this port.
    pub fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    pub(crate) fn bind(&mut self, reader: BufferReader<T>) -> std::result::Result<(), GraphError> {
        if self.reader.is_some() {
            return Err(GraphError::AlreadyConnected);
        }
        self.reader = Some(reader);
        Ok(())
    }

    pub(crate) fn unbind(&mut self) {
        self.reader = None;
    }

    /// Samples ready to read; 0 while unconnected.
    pub fn available(&self) -> usize {
        self.reader.as_ref().map_or(0, BufferReader::available)
    }

    /// The underlying reader, if connected.
    pub fn reader(&self) -> Option<&BufferReader<T>> {
        self.reader.as_ref()
    }
}

impl<T: Clone> StreamInput<T> {
    /// Read window over all available samples; empty while unconnected.
    pub fn get(&self) -> Option<ConsumableInput<'_, T>> {
        self.reader.as_ref().map(BufferReader::get)
    }

    /// Read window over `n` samples; `None` while unconnected.
    pub fn get_n(&self, n: usize) -> Option<ConsumableInput<'_, T>> {
        self.reader.as_ref().map(|reader| reader.get_n(n))
    }
}

/// Producing side of an edge: owns the writer once connected.
#[derive(Default)]
pub struct StreamOutput<T> {
    writer: Option<BufferWriter<T>>,
    min_buffer_size: usize,
}

impl<T> StreamOutput<T> {
    /// Unconnected output with no buffer size preference.
    pub fn new() -> Self {
        Self {
            writer: None,
            min_buffer_size: 0,
        }
    }

    /// Unconnected output requesting at least `min_buffer_size` slots.
    pub fn with_min_size(min_buffer_size: usize) -> Self {
        Self {
            writer: None,
            min_buffer_size,
        }
    }

    /// The buffer size this port asks the edge resolution to honour.
    pub fn min_buffer_size(&self) -> usize {
        self.min_buffer_size
    }

    /// True once an edge has been resolved onto this port.
    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    pub(crate) fn bind(&mut self, writer: BufferWriter<T>) -> std::result::Result<(), GraphError> {
        if self.writer.is_some() {
            return Err(GraphError::AlreadyConnected);
        }
        self.writer = Some(writer);
        Ok(())
    }

    pub(crate) fn unbind(&mut self) {
        self.writer = None;
    }

    /// Free slots in the attached buffer; 0 while unconnected.
    pub fn available(&self) -> usize {
        self.writer.as_ref().map_or(0, BufferWriter::available)
    }
}

impl<T: Clone> StreamOutput<T> {
    /// Claims a write window of `n` slots, blocking per the buffer's wait
    /// strategy. Fails with [`CoreError::InvalidArgument`] while unconnected.
    pub fn reserve(&mut self, n: usize) -> Result<ReservedOutput<'_, T>> {
        match self.writer.as_mut() {
            Some(writer) => writer.reserve(n),
            None => Err(CoreError::InvalidArgument(
                "output port is not connected".into(),
            )),
        }
    }

    /// Non-blocking reserve; `None` while unconnected or out of space.
    pub fn try_reserve(&mut self, n: usize) -> Option<ReservedOutput<'_, T>> {
        self.writer.as_mut().and_then(|writer| writer.try_reserve(n))
    }

    /// Fills and publishes `n` samples without blocking; `false` when the
    /// buffer lacks space or the port is unconnected.
    pub fn try_publish<F>(&mut self, fill: F, n: usize) -> bool
    where
        F: FnOnce(&mut [T]),
    {
        self.writer
            .as_mut()
            .is_some_and(|writer| writer.try_publish(fill, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caudal_core::CircularBuffer;

    #[test]
    fn unconnected_ports_report_empty() {
        let input = StreamInput::<i32>::new();
        assert!(!input.is_connected());
        assert_eq!(input.available(), 0);
        assert!(input.get().is_none());

        let mut output = StreamOutput::<i32>::new();
        assert!(!output.is_connected());
        assert_eq!(output.available(), 0);
        assert!(!output.try_publish(|_| {}, 1));
    }

    #[test]
    fn double_bind_is_rejected() {
        let buffer = CircularBuffer::<i32>::new(16);
        let mut input = StreamInput::new();
        input.bind(buffer.new_reader()).unwrap();
        assert!(matches!(
            input.bind(buffer.new_reader()),
            Err(GraphError::AlreadyConnected)
        ));

        let mut output = StreamOutput::new();
        output.bind(buffer.new_writer()).unwrap();
        assert!(matches!(
            output.bind(buffer.new_writer()),
            Err(GraphError::AlreadyConnected)
        ));
    }

    #[test]
    fn bound_ports_move_samples() {
        let buffer = CircularBuffer::<i32>::new(16);
        let mut output = StreamOutput::new();
        let mut input = StreamInput::new();
        output.bind(buffer.new_writer()).unwrap();
        input.bind(buffer.new_reader()).unwrap();

        assert!(output.try_publish(|out| out.fill(9), 4));
        assert_eq!(input.available(), 4);
        let span = input.get().unwrap();
        assert_eq!(&span[..], &[9, 9, 9, 9]);
        assert!(span.consume(4));
        drop(input);
        input = StreamInput::new();
        assert_eq!(input.available(), 0);
    }
}
