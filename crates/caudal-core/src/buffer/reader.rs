//! Consumer side: reader handles and scoped consumable windows.

use std::cell::Cell;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::Result;
use crate::sequence::{Sequence, SequenceRegistry, remove_sequence};

use super::{ProducerKind, Shared, phys};

/// What happens when a [`ConsumableInput`] is dropped without an explicit
/// `consume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanReleasePolicy {
    /// Consume the span's full length automatically.
    ProcessAll,
    /// Consume nothing (the default for plain `get` calls).
    #[default]
    ProcessNone,
    /// Dropping without `consume` is a programming error: panics in debug
    /// builds, behaves like `ProcessNone` in release.
    Terminate,
}

/// Bookkeeping for the earliest un-consumed read window.
///
/// All spans handed out before `consume` takes effect alias this window; the
/// reader cursor moves only once the last of them is gone.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: i64,
    len: usize,
    refs: usize,
    pending: Option<usize>,
    auto: usize,
}

/// Consumer handle owning a private cursor registered with the buffer.
///
/// A reader created on a live buffer starts at the current write position and
/// observes only samples published after it joined. Dropping the reader
/// deregisters the cursor, releasing any slots it pinned.
pub struct BufferReader<T> {
    shared: Arc<Shared<T>>,
    seq: Arc<Sequence>,
    /// Highest sequence known to be consecutively published (multi-producer
    /// prefix-scan cache; equals the writer cursor in single mode).
    high_cache: Cell<i64>,
    window: Cell<Option<Window>>,
    last_consumed: Cell<usize>,
    /// Empty dependents set for consumer-side waits on the writer cursor.
    no_dependents: SequenceRegistry,
}

impl<T> BufferReader<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>, seq: Arc<Sequence>) -> Self {
        let joined_at = seq.value();
        Self {
            shared,
            seq,
            high_cache: Cell::new(joined_at),
            window: Cell::new(None),
            last_consumed: Cell::new(0),
            no_dependents: SequenceRegistry::default(),
        }
    }

    /// Last consumed sequence; `-1` before anything was consumed.
    pub fn position(&self) -> i64 {
        self.seq.value()
    }

    /// Samples ready to read: published position minus this reader's cursor.
    pub fn available(&self) -> usize {
        (self.highest_published() - self.seq.value()) as usize
    }

    /// Samples consumed when the most recent window closed; resets to 0 when
    /// a new window opens.
    pub fn n_samples_consumed(&self) -> usize {
        self.last_consumed.get()
    }

    /// True while an open window has a `consume` request not yet applied.
    pub fn is_consume_requested(&self) -> bool {
        self.window.get().is_some_and(|w| w.pending.is_some())
    }

    fn highest_published(&self) -> i64 {
        match self.shared.kind {
            ProducerKind::Single => self.shared.cursor.value(),
            ProducerKind::Multi => {
                let published = self
                    .shared
                    .published
                    .as_ref()
                    .expect("multi-producer buffer has a publish array");
                let claimed = self.shared.claim.value();
                let mut high = self.high_cache.get();
                // Advance over the gap-free published prefix only: a claimed
                // but not yet published slot stops the scan, so out-of-order
                // producer completion is never observable.
                while high < claimed {
                    let next = high + 1;
                    if published[phys(next, self.shared.capacity)].load(Ordering::Acquire) == next
                    {
                        high = next;
                    } else {
                        break;
                    }
                }
                self.high_cache.set(high);
                high
            }
        }
    }
}

impl<T: Clone> BufferReader<T> {
    /// Read window over all currently available samples
    /// ([`SpanReleasePolicy::ProcessNone`]). Never blocks.
    pub fn get(&self) -> ConsumableInput<'_, T> {
        self.acquire(SpanReleasePolicy::ProcessNone, None)
    }

    /// Read window over `n` samples ([`SpanReleasePolicy::ProcessNone`]).
    ///
    /// `n` beyond `available()` (with no window already open) is a contract
    /// breach: panics in debug builds, clamps to the available count in
    /// release. While an earlier window is un-consumed the result aliases it
    /// and `n` is clamped to that window's length.
    pub fn get_n(&self, n: usize) -> ConsumableInput<'_, T> {
        self.acquire(SpanReleasePolicy::ProcessNone, Some(n))
    }

    /// [`get`](Self::get) with an explicit release policy.
    pub fn get_with_policy(&self, policy: SpanReleasePolicy) -> ConsumableInput<'_, T> {
        self.acquire(policy, None)
    }

    /// [`get_n`](Self::get_n) with an explicit release policy.
    pub fn get_n_with_policy(
        &self,
        policy: SpanReleasePolicy,
        n: usize,
    ) -> ConsumableInput<'_, T> {
        self.acquire(policy, Some(n))
    }

    /// Blocks per the buffer's wait strategy until at least `n` samples are
    /// readable; returns the then-available count. Timed strategies surface
    /// [`CoreError::Timeout`](crate::CoreError).
    pub fn wait_for(&self, n: usize) -> Result<usize> {
        let n = n.min(self.shared.capacity);
        loop {
            let avail = self.available();
            if avail >= n {
                return Ok(avail);
            }
            let target = self.seq.value() + n as i64;
            match self.shared.kind {
                ProducerKind::Single => {
                    self.shared
                        .wait
                        .wait_for(target, &self.shared.cursor, &self.no_dependents)?;
                }
                ProducerKind::Multi => {
                    // The claim cursor is a lower bound for the published
                    // prefix; re-check availability after it advances.
                    self.shared
                        .wait
                        .wait_for(target, &self.shared.claim, &self.no_dependents)?;
                    std::thread::yield_now();
                }
            }
        }
    }

    fn acquire(&self, policy: SpanReleasePolicy, n: Option<usize>) -> ConsumableInput<'_, T> {
        if let Some(mut window) = self.window.get() {
            let len = n.map_or(window.len, |n| n.min(window.len));
            window.refs += 1;
            self.window.set(Some(window));
            return ConsumableInput {
                reader: self,
                start: window.start,
                len,
                policy,
                windowed: true,
            };
        }

        let avail = self.available();
        let want = n.unwrap_or(avail);
        let len = if want > avail {
            if cfg!(debug_assertions) {
                panic!("get({want}) exceeds {avail} available samples");
            }
            avail
        } else {
            want
        };

        let start = self.seq.value() + 1;
        if len == 0 {
            // Empty spans carry no window: later gets see fresh state.
            return ConsumableInput {
                reader: self,
                start,
                len: 0,
                policy,
                windowed: false,
            };
        }

        self.last_consumed.set(0);
        self.window.set(Some(Window {
            start,
            len,
            refs: 1,
            pending: None,
            auto: 0,
        }));
        ConsumableInput {
            reader: self,
            start,
            len,
            policy,
            windowed: true,
        }
    }

}

impl<T> Drop for BufferReader<T> {
    fn drop(&mut self) {
        remove_sequence(&self.shared.readers, &self.seq);
        // A writer parked on this reader's cursor must re-check the registry.
        self.shared.wait.signal_all_when_blocking();
    }
}

/// A read-only, contiguous window into the buffer.
///
/// Call [`consume`](Self::consume) with the number of samples processed; the
/// reader cursor advances when the window's last live span goes away. What an
/// un-consumed drop does is governed by the [`SpanReleasePolicy`].
pub struct ConsumableInput<'a, T> {
    reader: &'a BufferReader<T>,
    start: i64,
    len: usize,
    policy: SpanReleasePolicy,
    windowed: bool,
}

impl<T: Clone> ConsumableInput<'_, T> {
    /// Requests consumption of the first `k ≤ len` samples and releases this
    /// span. Returns `false` (debug: panics) on a second consume for the same
    /// window or `k` beyond the span.
    pub fn consume(self, k: usize) -> bool {
        if k > self.len {
            if cfg!(debug_assertions) {
                panic!("consume({k}) exceeds span of {}", self.len);
            }
            return false;
        }
        if !self.windowed {
            return k == 0;
        }
        let Some(mut window) = self.reader.window.get() else {
            return false;
        };
        if window.pending.is_some() {
            if cfg!(debug_assertions) {
                panic!("consume() called twice on one read window");
            }
            return false;
        }
        window.pending = Some(k);
        self.reader.window.set(Some(window));
        // Drop of `self` runs next and applies the request once the last
        // span over this window is gone.
        true
    }

    /// True once `consume` has been requested for the underlying window.
    pub fn is_consume_requested(&self) -> bool {
        self.windowed
            && self
                .reader
                .window
                .get()
                .is_some_and(|w| w.pending.is_some())
    }
}

impl<T: Clone> Deref for ConsumableInput<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        let capacity = self.reader.shared.capacity;
        // SAFETY: [start, start + len) was published before the cursor /
        // publish-mark loads that sized this window (Acquire pairing with the
        // producer's Release), and the capacity check keeps writers away from
        // un-consumed slots.
        unsafe {
            self.reader
                .shared
                .storage
                .slice(phys(self.start, capacity), self.len)
        }
    }
}

impl<T> Drop for ConsumableInput<'_, T> {
    fn drop(&mut self) {
        if self.windowed {
            self.drop_windowed();
        }
    }
}

impl<T> ConsumableInput<'_, T> {
    fn drop_windowed(&mut self) {
        // Split out so the Drop impl needs no `T: Clone` bound.
        let reader: &BufferReader<T> = self.reader;
        let Some(mut window) = reader.window.get() else {
            return;
        };
        window.refs -= 1;
        if window.pending.is_none() {
            match self.policy {
                SpanReleasePolicy::ProcessAll => window.auto = window.auto.max(self.len),
                SpanReleasePolicy::Terminate => {
                    if cfg!(debug_assertions) {
                        reader.window.set(Some(window));
                        panic!("Terminate span dropped without consume()");
                    }
                }
                SpanReleasePolicy::ProcessNone => {}
            }
        }
        if window.refs == 0 {
            let k = window.pending.unwrap_or(window.auto);
            reader.window.set(None);
            if k > 0 {
                reader.seq.add_and_get(k as i64);
                reader.shared.wait.signal_all_when_blocking();
            }
            reader.last_consumed.set(k);
        } else {
            reader.window.set(Some(window));
        }
    }
}
