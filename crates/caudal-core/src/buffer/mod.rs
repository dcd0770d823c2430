//! Lock-free circular buffer for one or many producers and any number of
//! independent consumers.
//!
//! The buffer is a fixed-capacity ring over `T`. Coordination happens
//! exclusively through atomic [`Sequence`] cursors: the writer publishes a
//! monotonically increasing position, every reader trails it with a private
//! cursor, and capacity checks compare the writer position against the
//! minimum reader position. Data slots themselves carry no synchronisation.
//!
//! Wrap-around windows are contiguous: storage is either a
//! [`DoubleMappedRegion`](crate::mem::DoubleMappedRegion) (the same physical
//! pages mapped twice; the default on unix) or a mirrored heap allocation
//! of `2 × capacity` slots whose publish path keeps both halves identical.
//! Either way a window of `len ≤ capacity` starting anywhere in
//! `[0, capacity)` is one plain slice.
//!
//! # Safety model
//!
//! Slot access goes through raw pointers. This is sound because:
//!
//! 1. a slot is written only between claim and publish, and the claim
//!    protocol hands each in-flight sequence interval to exactly one writer;
//! 2. a reader dereferences a slot only after loading a cursor (or per-slot
//!    publish mark) with `Acquire` that the writer stored with `Release`
//!    after finishing the write;
//! 3. a slot becomes writable again only after every reader cursor has
//!    passed it, observed with `Acquire` by the capacity check.

mod reader;
mod writer;

pub use reader::{BufferReader, ConsumableInput, SpanReleasePolicy};
pub use writer::{BufferWriter, ReservedOutput};

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;

#[cfg(unix)]
use crate::error::{CoreError, Result};
use crate::sequence::{Sequence, SequenceRegistry, add_sequence};
use crate::wait::{WaitStrategy, default_strategy};

#[cfg(unix)]
use crate::mem::{DoubleMappedRegion, aligned_capacity, page_size};

/// How many producers may claim slots concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerKind {
    /// One producer; the writer cursor advances CAS-free.
    Single,
    /// Many producers; slots are claimed by CAS on a shared claim cursor and
    /// marked ready through a per-slot publish array.
    Multi,
}

/// Logical sequence → physical slot index.
#[inline]
pub(crate) fn phys(seq: i64, capacity: usize) -> usize {
    seq.rem_euclid(capacity as i64) as usize
}

/// Ring storage with a hardware or software mirror.
pub(crate) enum Storage<T> {
    /// `2 × capacity` heap slots; the publish path clones each published slot
    /// into its twin half so wrap-around windows stay contiguous.
    Mirrored { slots: Box<[UnsafeCell<T>]> },
    /// One physical allocation mapped twice; the mirror is free.
    #[cfg(unix)]
    DoubleMapped {
        region: DoubleMappedRegion,
        /// Live slot count; these are dropped in place before unmapping.
        capacity: usize,
        _marker: std::marker::PhantomData<T>,
    },
}

impl<T> Drop for Storage<T> {
    fn drop(&mut self) {
        if !std::mem::needs_drop::<T>() {
            return;
        }
        #[cfg(unix)]
        {
            let dm_capacity = match self {
                Storage::DoubleMapped { capacity, .. } => Some(*capacity),
                Storage::Mirrored { .. } => None,
            };
            if let Some(capacity) = dm_capacity {
                let base = self.base();
                for i in 0..capacity {
                    // SAFETY: every ring slot stays initialized from
                    // construction until here; the mirror half aliases the
                    // same objects and is not dropped separately.
                    unsafe { std::ptr::drop_in_place(base.add(i)) };
                }
            }
        }
    }
}

// SAFETY: slot access is serialised by the cursor protocol described in the
// module docs; the storage itself is inert.
unsafe impl<T: Send + Sync> Send for Storage<T> {}
unsafe impl<T: Send + Sync> Sync for Storage<T> {}

impl<T> Storage<T> {
    #[inline]
    fn base(&self) -> *mut T {
        match self {
            Storage::Mirrored { slots } => slots.as_ptr() as *mut T,
            #[cfg(unix)]
            Storage::DoubleMapped { region, .. } => region.as_ptr() as *mut T,
        }
    }

    /// Shared view of `len` slots starting at physical index `first`.
    ///
    /// # Safety
    ///
    /// `first < capacity`, `len <= capacity`, and every covered sequence must
    /// be published (readers) or exclusively claimed (writers).
    #[inline]
    pub(crate) unsafe fn slice(&self, first: usize, len: usize) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.base().add(first), len) }
    }

    /// Mutable view of `len` slots starting at physical index `first`.
    ///
    /// # Safety
    ///
    /// As [`slice`](Self::slice), plus exclusive claim over the whole range.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slice_mut(&self, first: usize, len: usize) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.base().add(first), len) }
    }
}

impl<T: Clone> Storage<T> {
    /// Re-establishes the mirror for `len` just-written slots at `first`.
    ///
    /// Must run after the claim-holder finished writing and before the range
    /// is published. No-op for double-mapped storage.
    ///
    /// # Safety
    ///
    /// Caller holds the claim over the written range; twin slots of an
    /// in-flight claim are unreachable by readers.
    pub(crate) unsafe fn mirror(&self, first: usize, len: usize, capacity: usize) {
        match self {
            Storage::Mirrored { .. } => {
                let base = self.base();
                for p in first..first + len {
                    let twin = if p < capacity { p + capacity } else { p - capacity };
                    // SAFETY: p is claimed, twin is its unreachable double.
                    unsafe { (*base.add(twin)) = (*base.add(p)).clone() };
                }
            }
            #[cfg(unix)]
            Storage::DoubleMapped { .. } => {}
        }
    }
}

/// State shared by the buffer handle, its writers and its readers.
pub(crate) struct Shared<T> {
    pub(crate) storage: Storage<T>,
    pub(crate) capacity: usize,
    /// Last published sequence (single-producer mode).
    pub(crate) cursor: Sequence,
    /// Last claimed sequence (multi-producer mode).
    pub(crate) claim: Sequence,
    /// Per-slot publish marks, multi-producer mode only. A slot at physical
    /// index `p` is readable for sequence `i` once `published[p] == i`.
    pub(crate) published: Option<Box<[AtomicI64]>>,
    pub(crate) readers: SequenceRegistry,
    pub(crate) wait: Arc<dyn WaitStrategy>,
    pub(crate) kind: ProducerKind,
}

impl<T> Shared<T> {
    /// Highest sequence handed to any producer so far.
    #[inline]
    pub(crate) fn produced(&self) -> i64 {
        match self.kind {
            ProducerKind::Single => self.cursor.value(),
            ProducerKind::Multi => self.claim.value(),
        }
    }
}

/// The buffer handle: a cheaply clonable owner from which writers and
/// readers are minted. All handles share one ring; the ring lives until the
/// last handle (buffer, writer or reader) is dropped.
pub struct CircularBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CircularBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Default> CircularBuffer<T> {
    /// Single-producer buffer of at least `min_size` slots.
    ///
    /// Attempts double-mapped storage where the platform offers it and
    /// silently falls back to mirrored heap storage when the kernel refuses
    /// the mapping. Use [`try_new`](Self::try_new) to surface the refusal
    /// instead.
    pub fn new(min_size: usize) -> Self {
        #[cfg(unix)]
        if let Ok(buffer) =
            Self::with_double_mapping(min_size, ProducerKind::Single, default_strategy())
        {
            return buffer;
        }
        Self::with_options(min_size, ProducerKind::Single, default_strategy())
    }

    /// Single-producer buffer of at least `min_size` slots, preferring
    /// double-mapped storage.
    ///
    /// On unix a kernel refusal (address space, backing file) is surfaced as
    /// [`CoreError::ResourceExhausted`](crate::CoreError); mirrored heap
    /// storage is used only where the double-map primitive does not exist at
    /// all. Graph edges are built through this constructor so resource
    /// exhaustion reaches `Graph::init` callers.
    pub fn try_new(min_size: usize) -> crate::error::Result<Self> {
        #[cfg(unix)]
        {
            Self::with_double_mapping(min_size, ProducerKind::Single, default_strategy())
        }
        #[cfg(not(unix))]
        {
            Ok(Self::with_options(
                min_size,
                ProducerKind::Single,
                default_strategy(),
            ))
        }
    }

    /// Buffer on mirrored heap storage (the portable path) with an explicit
    /// producer mode and wait strategy.
    ///
    /// The capacity is `min_size` rounded up to the next power of two (and at
    /// least 2).
    pub fn with_options(
        min_size: usize,
        kind: ProducerKind,
        wait: Arc<dyn WaitStrategy>,
    ) -> Self {
        let capacity = min_size.max(2).next_power_of_two();
        let slots = (0..2 * capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self::from_storage(Storage::Mirrored { slots }, capacity, kind, wait)
    }

    fn from_storage(
        storage: Storage<T>,
        capacity: usize,
        kind: ProducerKind,
        wait: Arc<dyn WaitStrategy>,
    ) -> Self {
        let published = match kind {
            ProducerKind::Single => None,
            ProducerKind::Multi => Some(
                (0..capacity)
                    .map(|_| AtomicI64::new(-1))
                    .collect::<Vec<_>>()
                    .into_boxed_slice(),
            ),
        };
        Self {
            shared: Arc::new(Shared {
                storage,
                capacity,
                cursor: Sequence::default(),
                claim: Sequence::default(),
                published,
                readers: SequenceRegistry::default(),
                wait,
                kind,
            }),
        }
    }

    /// Number of slots in the ring (after rounding).
    pub fn size(&self) -> usize {
        self.shared.capacity
    }

    /// Producer mode chosen at construction.
    pub fn producer_kind(&self) -> ProducerKind {
        self.shared.kind
    }

    /// Current value of the publish cursor (single-producer) or claim cursor
    /// (multi-producer). Diagnostic only.
    pub fn cursor_value(&self) -> i64 {
        self.shared.produced()
    }

    /// Number of currently registered (live) readers.
    pub fn n_readers(&self) -> usize {
        self.shared
            .readers
            .read()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Mints a producer handle.
    ///
    /// In [`ProducerKind::Single`] mode exactly one writer may be in use at a
    /// time; concurrent single-mode writers are a contract breach.
    pub fn new_writer(&self) -> BufferWriter<T> {
        BufferWriter::new(Arc::clone(&self.shared))
    }

    /// Mints a consumer handle whose cursor starts at the current write
    /// position — a reader joining a live stream observes no history.
    pub fn new_reader(&self) -> BufferReader<T> {
        let seq = Arc::new(Sequence::default());
        add_sequence(&self.shared.readers, self.shared.produced(), &seq);
        BufferReader::new(Arc::clone(&self.shared), seq)
    }
}

#[cfg(unix)]
impl<T: Clone + Default> CircularBuffer<T> {
    /// Buffer backed by a double-mapped region: wrap-around windows are
    /// physically contiguous with no mirror copies on publish.
    ///
    /// Capacity is rounded so the ring occupies a whole number of pages.
    /// Heap-owning elements are fine — teardown drops the `capacity` live
    /// slots in place before unmapping.
    pub fn with_double_mapping(
        min_size: usize,
        kind: ProducerKind,
        wait: Arc<dyn WaitStrategy>,
    ) -> Result<Self> {
        let stride = std::mem::size_of::<T>().max(1);
        let page = page_size();
        if std::mem::align_of::<T>() > page {
            return Err(CoreError::InvalidArgument(format!(
                "element alignment {} exceeds the page size {page}",
                std::mem::align_of::<T>()
            )));
        }
        let capacity = aligned_capacity(min_size, stride, page);
        let bytes = capacity
            .checked_mul(stride)
            .ok_or_else(|| CoreError::ResourceExhausted("ring byte size overflows".into()))?;
        let region = DoubleMappedRegion::new(bytes)?;
        debug_assert!(region.len() >= bytes);
        let storage = Storage::DoubleMapped {
            region,
            capacity,
            _marker: std::marker::PhantomData,
        };
        // Fill the ring with defaults; the mirror half tracks automatically.
        let base: *mut T = storage.base();
        for i in 0..capacity {
            // SAFETY: freshly mapped exclusive region of `capacity` slots.
            unsafe { base.add(i).write(T::default()) };
        }
        Ok(Self::from_storage(storage, capacity, kind, wait))
    }
}
