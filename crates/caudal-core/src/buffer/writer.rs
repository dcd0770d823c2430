//! Producer side: writer handles and scoped reservation windows.

use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::Result;
use crate::sequence::min_sequence;

use super::{ProducerKind, Shared, phys};

/// Producer handle for a [`CircularBuffer`](super::CircularBuffer).
///
/// Single-producer mode: use exactly one writer at a time (a second live
/// writer is a contract breach). Multi-producer mode: mint one writer per
/// producing thread; slot claims are linearised by CAS.
pub struct BufferWriter<T> {
    shared: Arc<Shared<T>>,
    /// Samples published from the most recent reservation; reset on reserve.
    last_published: Cell<usize>,
}

impl<T> BufferWriter<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self {
            shared,
            last_published: Cell::new(0),
        }
    }

    /// Free slots from this producer's point of view:
    /// `capacity − (produced − min(reader cursors))`.
    pub fn available(&self) -> usize {
        let produced = self.shared.produced();
        let min_reader = min_sequence(&self.shared.readers, produced);
        (self.shared.capacity as i64 - (produced - min_reader)) as usize
    }

    /// Samples published from the current/most recent reservation.
    pub fn n_samples_published(&self) -> usize {
        self.last_published.get()
    }

    fn clamp_request(&self, n: usize) -> usize {
        if n > self.shared.capacity {
            if cfg!(debug_assertions) {
                panic!(
                    "reserve({n}) exceeds buffer capacity {}",
                    self.shared.capacity
                );
            }
            return self.shared.capacity;
        }
        n
    }
}

impl<T: Clone> BufferWriter<T> {
    /// Claims an exclusive window of `n` slots, blocking per the buffer's
    /// wait strategy while readers still pin the tail of the ring.
    ///
    /// Timed strategies surface [`CoreError::Timeout`](crate::CoreError);
    /// untimed ones never fail.
    pub fn reserve(&mut self, n: usize) -> Result<ReservedOutput<'_, T>> {
        let n = self.clamp_request(n);
        self.last_published.set(0);
        match self.shared.kind {
            ProducerKind::Single => {
                let last = self.shared.cursor.value();
                let target = last + n as i64 - self.shared.capacity as i64;
                if min_sequence(&self.shared.readers, last) < target {
                    self.shared
                        .wait
                        .wait_for(target, &self.shared.cursor, &self.shared.readers)?;
                }
                Ok(ReservedOutput::new(self, last + 1, n))
            }
            ProducerKind::Multi => loop {
                let current = self.shared.claim.value();
                let end = current + n as i64;
                let target = end - self.shared.capacity as i64;
                if min_sequence(&self.shared.readers, current) < target {
                    self.shared
                        .wait
                        .wait_for(target, &self.shared.claim, &self.shared.readers)?;
                    continue;
                }
                if self.shared.claim.compare_and_set(current, end) {
                    return Ok(ReservedOutput::new(self, current + 1, n));
                }
            },
        }
    }

    /// Non-blocking [`reserve`](Self::reserve): `None` when fewer than `n`
    /// slots are free right now.
    pub fn try_reserve(&mut self, n: usize) -> Option<ReservedOutput<'_, T>> {
        let n = self.clamp_request(n);
        self.last_published.set(0);
        match self.shared.kind {
            ProducerKind::Single => {
                let last = self.shared.cursor.value();
                let target = last + n as i64 - self.shared.capacity as i64;
                if min_sequence(&self.shared.readers, last) < target {
                    return None;
                }
                Some(ReservedOutput::new(self, last + 1, n))
            }
            ProducerKind::Multi => loop {
                let current = self.shared.claim.value();
                let end = current + n as i64;
                let target = end - self.shared.capacity as i64;
                if min_sequence(&self.shared.readers, current) < target {
                    return None;
                }
                if self.shared.claim.compare_and_set(current, end) {
                    return Some(ReservedOutput::new(self, current + 1, n));
                }
            },
        }
    }

    /// Reserves `n` slots, fills them through `fill`, publishes all of them.
    ///
    /// A panic inside `fill` unwinds through this call without advancing the
    /// cursor — the reservation is discarded as if never made.
    pub fn publish<F>(&mut self, fill: F, n: usize) -> Result<()>
    where
        F: FnOnce(&mut [T]),
    {
        let mut span = self.reserve(n)?;
        fill(&mut span);
        let len = span.len();
        span.publish(len);
        Ok(())
    }

    /// Like [`publish`](Self::publish) but returns `false` instead of
    /// blocking when capacity is insufficient. Panics from `fill` propagate.
    pub fn try_publish<F>(&mut self, fill: F, n: usize) -> bool
    where
        F: FnOnce(&mut [T]),
    {
        let Some(mut span) = self.try_reserve(n) else {
            return false;
        };
        fill(&mut span);
        let len = span.len();
        span.publish(len);
        true
    }
}

/// An exclusive, scoped write window returned by
/// [`BufferWriter::reserve`].
///
/// Dereferences to a contiguous `&mut [T]` (wrap point included). Call
/// [`publish`](Self::publish) with the number of samples actually produced;
/// dropping the window unpublished publishes nothing — in single-producer
/// mode that is a perfect no-op, in multi-producer mode the claim is rolled
/// back when no later claim exists.
pub struct ReservedOutput<'a, T> {
    writer: &'a BufferWriter<T>,
    /// First sequence of the claimed interval.
    start: i64,
    len: usize,
    committed: bool,
}

impl<'a, T: Clone> ReservedOutput<'a, T> {
    fn new(writer: &'a BufferWriter<T>, start: i64, len: usize) -> Self {
        Self {
            writer,
            start,
            len,
            committed: false,
        }
    }

    /// Publishes the first `k ≤ len` samples of the window.
    ///
    /// `k > len` is a contract breach: panics in debug builds, clamps in
    /// release.
    pub fn publish(mut self, k: usize) {
        let k = if k > self.len {
            if cfg!(debug_assertions) {
                panic!("publish({k}) exceeds reserved window of {}", self.len);
            }
            self.len
        } else {
            k
        };
        self.commit(k);
    }

    fn commit(&mut self, k: usize) {
        if self.committed {
            return;
        }
        self.committed = true;
        let shared = &self.writer.shared;
        let capacity = shared.capacity;
        if k > 0 {
            // SAFETY: we hold the claim over [start, start + len).
            unsafe {
                shared.storage.mirror(phys(self.start, capacity), k, capacity);
            }
        }
        match shared.kind {
            ProducerKind::Single => {
                if k > 0 {
                    shared.cursor.set(self.start + k as i64 - 1);
                }
            }
            ProducerKind::Multi => {
                let published = shared
                    .published
                    .as_ref()
                    .expect("multi-producer buffer has a publish array");
                for seq in self.start..self.start + k as i64 {
                    published[phys(seq, capacity)].store(seq, Ordering::Release);
                }
                if k < self.len {
                    // Try to hand the unused tail back. Succeeds only while we
                    // are still the newest claim; otherwise the tail must be
                    // marked published (contents unchanged) to keep the
                    // reader's prefix scan gap-free.
                    let end = self.start + self.len as i64 - 1;
                    let back = self.start + k as i64 - 1;
                    if !shared.claim.compare_and_set(end, back) {
                        for seq in self.start + k as i64..=end {
                            published[phys(seq, capacity)].store(seq, Ordering::Release);
                        }
                    }
                }
            }
        }
        self.writer.last_published.set(k);
        shared.wait.signal_all_when_blocking();
    }

    /// Window length (equals the reserved `n`).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }
}

impl<T: Clone> Deref for ReservedOutput<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        let capacity = self.writer.shared.capacity;
        // SAFETY: exclusive claim over [start, start + len); contiguity is
        // guaranteed by the mirrored/double-mapped storage.
        unsafe {
            self.writer
                .shared
                .storage
                .slice(phys(self.start, capacity), self.len)
        }
    }
}

impl<T: Clone> DerefMut for ReservedOutput<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        let capacity = self.writer.shared.capacity;
        // SAFETY: as `deref`, plus the window is exclusively ours until
        // publish or drop.
        unsafe {
            self.writer
                .shared
                .storage
                .slice_mut(phys(self.start, capacity), self.len)
        }
    }
}

impl<T> Drop for ReservedOutput<'_, T> {
    fn drop(&mut self) {
        if !self.committed {
            // Publish nothing: single-producer cursors stay put, multi-producer
            // claims roll back where possible.
            self.drop_uncommitted();
        }
    }
}

impl<T> ReservedOutput<'_, T> {
    fn drop_uncommitted(&mut self) {
        self.committed = true;
        let shared = &self.writer.shared;
        if let ProducerKind::Multi = shared.kind {
            let capacity = shared.capacity;
            let end = self.start + self.len as i64 - 1;
            if self.len > 0 && !shared.claim.compare_and_set(end, self.start - 1) {
                let published = shared
                    .published
                    .as_ref()
                    .expect("multi-producer buffer has a publish array");
                for seq in self.start..=end {
                    published[phys(seq, capacity)].store(seq, Ordering::Release);
                }
            }
        }
        self.writer.last_published.set(0);
        shared.wait.signal_all_when_blocking();
    }
}
