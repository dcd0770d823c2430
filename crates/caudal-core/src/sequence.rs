//! Atomic stream cursors and the reader-cursor registry helpers.
//!
//! A [`Sequence`] is a position in an infinite logical stream. Physical slot
//! indices are derived from it modulo the buffer capacity. The writer owns one
//! cursor; every reader owns one, registered with the buffer through a weak
//! reference so that dropping a reader handle deregisters it lazily.

use std::sync::{Arc, Weak};

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

/// Initial value of every cursor: one before the first publishable slot.
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// A cache-line-aligned atomic stream position.
///
/// Padding keeps neighbouring cursors on distinct cache lines so a busy
/// writer does not invalidate the line a reader is spinning on.
#[derive(Debug)]
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Creates a sequence at an explicit position.
    pub fn new(value: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(value)),
        }
    }

    /// Current position (acquire).
    #[inline]
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Overwrites the position (release).
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Atomically replaces `expected` with `next`. Returns `true` on success.
    #[inline]
    pub fn compare_and_set(&self, expected: i64, next: i64) -> bool {
        self.value
            .compare_exchange(expected, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Adds one and returns the new position.
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Adds `delta` and returns the new position.
    #[inline]
    pub fn add_and_get(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::AcqRel) + delta
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

/// Shared registry of reader cursors, held weakly by the buffer.
///
/// The lock guards registration and deregistration only; the streaming hot
/// path reads the vector under a read lock and never blocks a publish.
pub type SequenceRegistry = RwLock<Vec<Weak<Sequence>>>;

/// Minimum of `floor` and every live position in `registry`.
///
/// `floor` caps the result and is returned unchanged when no cursor is
/// alive. Dead weak entries are skipped (they are pruned on the next
/// [`remove_sequence`] call).
pub fn min_sequence(registry: &SequenceRegistry, floor: i64) -> i64 {
    let guard = registry.read();
    let mut min = floor;
    for weak in guard.iter() {
        if let Some(seq) = weak.upgrade() {
            min = min.min(seq.value());
        }
    }
    min
}

/// Registers `seq`, first publishing the cursor's current position to it.
///
/// The order matters: the new sequence is moved to the live write position
/// *before* it becomes visible to the writer's capacity check, so a reader
/// joining a running buffer never pins historical slots.
pub fn add_sequence(registry: &SequenceRegistry, cursor: i64, seq: &Arc<Sequence>) {
    seq.set(cursor);
    registry.write().push(Arc::downgrade(seq));
}

/// Deregisters `seq` and prunes any entries whose reader is gone.
pub fn remove_sequence(registry: &SequenceRegistry, seq: &Arc<Sequence>) {
    let mut guard = registry.write();
    guard.retain(|weak| match weak.upgrade() {
        Some(live) => !Arc::ptr_eq(&live, seq),
        None => false,
    });
}
