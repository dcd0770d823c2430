//! The packed progress word: lock-free quiescence detection across workers.
//!
//! One 64-bit atomic packs `(progress_count: u32, done_count: u32)`. A worker
//! that moved samples CASes in `(progress_count + 1, 0)`; a worker that found
//! nothing to do increments `done_count` — unless a peer advanced
//! `progress_count` since its last observation, in which case it retries
//! immediately (work stealing by observation). All workers terminate when
//! `done_count` reaches the batch count: every worker has then observed a
//! full pass with no productive work anywhere.
//!
//! Parked waiters sit on a condvar keyed to the current word value, the
//! futex-style analogue of C++ `atomic::wait`.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

/// Packs `(progress, done)` into one atomic word.
#[derive(Debug, Default)]
pub struct ProgressWord {
    word: AtomicU64,
    gate: Mutex<()>,
    cond: Condvar,
}

/// Extracts the progress counter (upper 32 bits).
#[inline]
pub fn progress_count(word: u64) -> u32 {
    (word >> 32) as u32
}

/// Extracts the done counter (lower 32 bits).
#[inline]
pub fn done_count(word: u64) -> u32 {
    word as u32
}

/// Packs the two counters into a word.
#[inline]
pub fn pack(progress: u32, done: u32) -> u64 {
    ((progress as u64) << 32) | done as u64
}

impl ProgressWord {
    /// A zeroed word.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets both counters; called before workers launch.
    pub fn reset(&self) {
        self.word.store(0, Ordering::Release);
    }

    /// Current word value.
    #[inline]
    pub fn load(&self) -> u64 {
        self.word.load(Ordering::Acquire)
    }

    /// Single CAS attempt.
    #[inline]
    pub fn compare_and_set(&self, current: u64, next: u64) -> bool {
        self.word
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Records productive work: `(progress + 1, 0)`. Returns the new word.
    pub fn note_progress(&self) -> u64 {
        loop {
            let current = self.load();
            let next = pack(progress_count(current).wrapping_add(1), 0);
            if self.compare_and_set(current, next) {
                self.notify_all();
                return next;
            }
        }
    }

    /// Records an unproductive pass observed against `seen_progress`.
    ///
    /// Increments `done` only when no peer has advanced the progress counter
    /// since; otherwise the word is republished unchanged and the caller
    /// should retry its pass immediately. Returns the new word.
    pub fn note_idle(&self, seen_progress: u32) -> u64 {
        loop {
            let current = self.load();
            let progress = progress_count(current);
            let done = done_count(current);
            let next = if progress == seen_progress {
                pack(progress, done.wrapping_add(1))
            } else {
                current
            };
            if next == current || self.compare_and_set(current, next) {
                self.notify_all();
                return next;
            }
        }
    }

    /// Wakes every parked worker.
    pub fn notify_all(&self) {
        let _guard = self.gate.lock();
        self.cond.notify_all();
    }

    /// Parks until the word differs from `seen` or `cancelled` turns true.
    pub fn wait_change<F>(&self, seen: u64, cancelled: F)
    where
        F: Fn() -> bool,
    {
        let mut guard = self.gate.lock();
        while self.load() == seen && !cancelled() {
            self.cond.wait(&mut guard);
        }
    }
}
