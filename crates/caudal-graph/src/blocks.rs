//! Stock wiring blocks: sources, sinks and a passthrough.
//!
//! Nothing here does signal processing — these blocks exist to put samples
//! into a graph and take them out again, for tests, examples and plugin
//! smoke checks.

use std::any::Any;
use std::ops::AddAssign;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::block::{Block, WorkResult, WorkStatus, instance_name};
use crate::port::{StreamInput, StreamOutput};

/// Emits `count` samples of a zero-based running counter, then reports
/// `Done`.
///
/// The counter lives in `T` itself (`0, 0+1, 0+1+1, …`), so any numeric
/// element type works without a conversion from `usize`.
pub struct CountingSource<T> {
    unique_name: String,
    output: StreamOutput<T>,
    next: T,
    step: T,
    emitted: usize,
    count: usize,
}

impl<T: Default + From<u8>> CountingSource<T> {
    /// Source emitting `0, 1, …, count - 1` once.
    pub fn new(count: usize) -> Self {
        Self {
            unique_name: instance_name("counting_source"),
            output: StreamOutput::new(),
            next: T::default(),
            step: T::from(1),
            emitted: 0,
            count,
        }
    }

    /// Samples not yet emitted.
    pub fn remaining(&self) -> usize {
        self.count - self.emitted
    }
}

impl<T> Block for CountingSource<T>
where
    T: Clone + Default + From<u8> + AddAssign + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "counting_source"
    }

    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn work(&mut self, budget: usize) -> WorkResult {
        if self.emitted >= self.count {
            return WorkResult::new(budget, 0, WorkStatus::Done);
        }
        let space = self.output.available();
        if space == 0 {
            return WorkResult::new(budget, 0, WorkStatus::InsufficientOutput);
        }
        let n = budget.min(self.count - self.emitted).min(space);
        let next = &mut self.next;
        let step = &self.step;
        let filled = self.output.try_publish(
            |out| {
                for slot in out.iter_mut() {
                    *slot = next.clone();
                    *next += step.clone();
                }
            },
            n,
        );
        if !filled {
            return WorkResult::new(budget, 0, WorkStatus::InsufficientOutput);
        }
        self.emitted += n;
        WorkResult::new(budget, n, WorkStatus::Ok)
    }

    fn available_input_samples(&self, counts: &mut Vec<usize>) -> usize {
        counts.clear();
        0
    }

    fn output_port_count(&self) -> usize {
        1
    }

    fn output_port_any(&mut self, index: usize) -> Option<&mut dyn Any> {
        (index == 0).then_some(&mut self.output as &mut dyn Any)
    }
}

/// Emits a fixed vector of samples, then reports `Done`.
pub struct VectorSource<T> {
    unique_name: String,
    output: StreamOutput<T>,
    data: Vec<T>,
    pos: usize,
}

impl<T> VectorSource<T> {
    /// Source that will emit `data` once, in order.
    pub fn new(data: Vec<T>) -> Self {
        Self {
            unique_name: instance_name("vector_source"),
            output: StreamOutput::new(),
            data,
            pos: 0,
        }
    }

    /// Samples not yet emitted.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl<T> Block for VectorSource<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "vector_source"
    }

    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn work(&mut self, budget: usize) -> WorkResult {
        if self.pos >= self.data.len() {
            return WorkResult::new(budget, 0, WorkStatus::Done);
        }
        let space = self.output.available();
        if space == 0 {
            return WorkResult::new(budget, 0, WorkStatus::InsufficientOutput);
        }
        let n = budget.min(self.data.len() - self.pos).min(space);
        let chunk = &self.data[self.pos..self.pos + n];
        if !self.output.try_publish(|out| out.clone_from_slice(chunk), n) {
            return WorkResult::new(budget, 0, WorkStatus::InsufficientOutput);
        }
        self.pos += n;
        WorkResult::new(budget, n, WorkStatus::Ok)
    }

    fn available_input_samples(&self, counts: &mut Vec<usize>) -> usize {
        counts.clear();
        0
    }

    fn output_port_count(&self) -> usize {
        1
    }

    fn output_port_any(&mut self, index: usize) -> Option<&mut dyn Any> {
        (index == 0).then_some(&mut self.output as &mut dyn Any)
    }
}

/// Forwards its input to its output unchanged.
pub struct CopyBlock<T> {
    unique_name: String,
    input: StreamInput<T>,
    output: StreamOutput<T>,
}

impl<T> CopyBlock<T> {
    /// A fresh, unconnected passthrough.
    pub fn new() -> Self {
        Self {
            unique_name: instance_name("copy"),
            input: StreamInput::new(),
            output: StreamOutput::new(),
        }
    }
}

impl<T> Default for CopyBlock<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Block for CopyBlock<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "copy"
    }

    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn work(&mut self, budget: usize) -> WorkResult {
        let available = self.input.available();
        if available == 0 {
            return WorkResult::new(budget, 0, WorkStatus::InsufficientInput);
        }
        let space = self.output.available();
        if space == 0 {
            return WorkResult::new(budget, 0, WorkStatus::InsufficientOutput);
        }
        let n = budget.min(available).min(space);
        let Some(span) = self.input.get_n(n) else {
            return WorkResult::new(budget, 0, WorkStatus::InsufficientInput);
        };
        if !self.output.try_publish(|out| out.clone_from_slice(&span), n) {
            // span drops with ProcessNone: nothing consumed, retry next pass
            return WorkResult::new(budget, 0, WorkStatus::InsufficientOutput);
        }
        span.consume(n);
        WorkResult::new(budget, n, WorkStatus::Ok)
    }

    fn available_input_samples(&self, counts: &mut Vec<usize>) -> usize {
        counts.clear();
        counts.push(self.input.available());
        counts[0]
    }

    fn input_port_count(&self) -> usize {
        1
    }

    fn output_port_count(&self) -> usize {
        1
    }

    fn input_port_any(&mut self, index: usize) -> Option<&mut dyn Any> {
        (index == 0).then_some(&mut self.input as &mut dyn Any)
    }

    fn output_port_any(&mut self, index: usize) -> Option<&mut dyn Any> {
        (index == 0).then_some(&mut self.output as &mut dyn Any)
    }
}

/// Collects every received sample into a shared vector.
pub struct CollectSink<T> {
    unique_name: String,
    input: StreamInput<T>,
    collected: Arc<Mutex<Vec<T>>>,
}

impl<T> CollectSink<T> {
    /// A sink whose received samples can be inspected through
    /// [`handle`](Self::handle).
    pub fn new() -> Self {
        Self {
            unique_name: instance_name("collect_sink"),
            input: StreamInput::new(),
            collected: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared view of everything collected so far.
    pub fn handle(&self) -> Arc<Mutex<Vec<T>>> {
        Arc::clone(&self.collected)
    }
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Block for CollectSink<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "collect_sink"
    }

    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn work(&mut self, budget: usize) -> WorkResult {
        let available = self.input.available();
        if available == 0 {
            return WorkResult::new(budget, 0, WorkStatus::InsufficientInput);
        }
        let n = budget.min(available);
        let Some(span) = self.input.get_n(n) else {
            return WorkResult::new(budget, 0, WorkStatus::InsufficientInput);
        };
        self.collected.lock().extend_from_slice(&span);
        span.consume(n);
        WorkResult::new(budget, n, WorkStatus::Ok)
    }

    fn available_input_samples(&self, counts: &mut Vec<usize>) -> usize {
        counts.clear();
        counts.push(self.input.available());
        counts[0]
    }

    fn input_port_count(&self) -> usize {
        1
    }

    fn input_port_any(&mut self, index: usize) -> Option<&mut dyn Any> {
        (index == 0).then_some(&mut self.input as &mut dyn Any)
    }
}

/// Discards every received sample, keeping only a count.
pub struct NullSink<T> {
    unique_name: String,
    input: StreamInput<T>,
    count: Arc<AtomicUsize>,
}

impl<T> NullSink<T> {
    /// A counting bit-bucket.
    pub fn new() -> Self {
        Self {
            unique_name: instance_name("null_sink"),
            input: StreamInput::new(),
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared count of discarded samples.
    pub fn count_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.count)
    }
}

impl<T> Default for NullSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Block for NullSink<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "null_sink"
    }

    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn work(&mut self, budget: usize) -> WorkResult {
        let available = self.input.available();
        if available == 0 {
            return WorkResult::new(budget, 0, WorkStatus::InsufficientInput);
        }
        let n = budget.min(available);
        let Some(span) = self.input.get_n(n) else {
            return WorkResult::new(budget, 0, WorkStatus::InsufficientInput);
        };
        span.consume(n);
        self.count.fetch_add(n, Ordering::Relaxed);
        WorkResult::new(budget, n, WorkStatus::Ok)
    }

    fn available_input_samples(&self, counts: &mut Vec<usize>) -> usize {
        counts.clear();
        counts.push(self.input.available());
        counts[0]
    }

    fn input_port_count(&self) -> usize {
        1
    }

    fn input_port_any(&mut self, index: usize) -> Option<&mut dyn Any> {
        (index == 0).then_some(&mut self.input as &mut dyn Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn source_reports_done_after_draining() {
        let mut graph = Graph::new();
        let src = graph.add_block(VectorSource::new(vec![1i32, 2, 3]));
        let sink_block = CollectSink::<i32>::new();
        let collected = sink_block.handle();
        let sink = graph.add_block(sink_block);
        graph.connect::<i32>(src, 0, sink, 0, 16);
        graph.init().unwrap();

        let blocks = graph.blocks_mut();
        assert_eq!(blocks[src.0].work(usize::MAX).status, WorkStatus::Ok);
        assert_eq!(blocks[src.0].work(usize::MAX).status, WorkStatus::Done);
        assert_eq!(blocks[sink.0].work(usize::MAX).performed, 3);
        assert_eq!(
            blocks[sink.0].work(usize::MAX).status,
            WorkStatus::InsufficientInput
        );
        assert_eq!(&*collected.lock(), &[1, 2, 3]);
    }

    #[test]
    fn counting_source_counts_then_reports_done() {
        let mut graph = Graph::new();
        let src = graph.add_block(CountingSource::<i64>::new(5));
        let sink_block = CollectSink::<i64>::new();
        let collected = sink_block.handle();
        let sink = graph.add_block(sink_block);
        graph.connect::<i64>(src, 0, sink, 0, 16);
        graph.init().unwrap();

        let blocks = graph.blocks_mut();
        assert_eq!(blocks[src.0].work(usize::MAX).status, WorkStatus::Ok);
        assert_eq!(blocks[src.0].work(usize::MAX).status, WorkStatus::Done);
        assert_eq!(blocks[sink.0].work(usize::MAX).performed, 5);
        assert_eq!(&*collected.lock(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn counting_source_resumes_across_budgeted_calls() {
        let mut graph = Graph::new();
        let src = graph.add_block(CountingSource::<i64>::new(7));
        let sink_block = CollectSink::<i64>::new();
        let collected = sink_block.handle();
        let sink = graph.add_block(sink_block);
        graph.connect::<i64>(src, 0, sink, 0, 16);
        graph.init().unwrap();

        let blocks = graph.blocks_mut();
        assert_eq!(blocks[src.0].work(3).performed, 3);
        assert_eq!(blocks[src.0].work(usize::MAX).performed, 4);
        assert_eq!(blocks[src.0].work(usize::MAX).status, WorkStatus::Done);
        blocks[sink.0].work(usize::MAX);
        assert_eq!(&*collected.lock(), &[0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn copy_block_respects_budget() {
        let mut graph = Graph::new();
        let src = graph.add_block(VectorSource::new((0..10i64).collect()));
        let copy = graph.add_block(CopyBlock::<i64>::new());
        let sink_block = NullSink::<i64>::new();
        let count = sink_block.count_handle();
        let sink = graph.add_block(sink_block);
        graph.connect::<i64>(src, 0, copy, 0, 16);
        graph.connect::<i64>(copy, 0, sink, 0, 16);
        graph.init().unwrap();

        let blocks = graph.blocks_mut();
        blocks[src.0].work(usize::MAX);
        let result = blocks[copy.0].work(4);
        assert_eq!(result.performed, 4);
        assert_eq!(result.status, WorkStatus::Ok);
        blocks[sink.0].work(usize::MAX);
        assert_eq!(count.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn available_input_samples_reports_per_port() {
        let mut graph = Graph::new();
        let src = graph.add_block(VectorSource::new(vec![1u32; 7]));
        let sink = graph.add_block(NullSink::<u32>::new());
        graph.connect::<u32>(src, 0, sink, 0, 16);
        graph.init().unwrap();

        graph.blocks_mut()[src.0].work(usize::MAX);
        let mut counts = Vec::new();
        assert_eq!(
            graph.blocks()[sink.0].available_input_samples(&mut counts),
            7
        );
        assert_eq!(counts, vec![7]);
    }
}
