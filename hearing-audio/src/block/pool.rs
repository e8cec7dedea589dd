use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

use crate::constants::{BlockSize, MAX_POOL_SIZE};
use crate::error::{ConfigError, PoolExhausted};

use super::ref_types::AudioBlockMut;

/// Lock-free pool allocator for fixed-length `f32` audio blocks.
///
/// Uses a multi-word atomic bitmap to track which slots are allocated, and
/// per-slot atomic reference counts for shared ownership. Every operation is
/// lock-free, so blocks may be allocated and released from a DMA/ISR context
/// while the graph tick is running.
///
/// The pool is an explicit context object: handles borrow it, and a graph is
/// built around a reference to it.
pub struct AudioBlockPool {
    block_len: usize,
    capacity: usize,
    /// Bit N of word W = 1 means slot `W * 32 + N` is allocated.
    bitmap: Box<[AtomicU32]>,
    /// Per-slot reference counts.
    refcounts: Box<[AtomicU8]>,
    /// Block storage, `capacity * block_len` samples.
    storage: Box<[UnsafeCell<f32>]>,
    /// High-water mark of allocated blocks.
    peak: AtomicUsize,
}

// SAFETY: All shared bookkeeping is atomic. A slot's storage is written only
// through a unique `AudioBlockMut` (refcount 1, just claimed through the
// bitmap) and is read-only while shared.
unsafe impl Sync for AudioBlockPool {}

impl AudioBlockPool {
    /// Create a pool of `capacity` blocks of `block_size` samples each.
    ///
    /// Capacity is fixed for the lifetime of the pool.
    pub fn new(block_size: BlockSize, capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 || capacity > MAX_POOL_SIZE {
            return Err(ConfigError::PoolCapacity {
                requested: capacity,
                max: MAX_POOL_SIZE,
            });
        }
        let block_len = block_size.samples();
        let words = capacity.div_ceil(32);
        let bitmap: Vec<AtomicU32> = (0..words).map(|_| AtomicU32::new(0)).collect();
        let refcounts: Vec<AtomicU8> = (0..capacity).map(|_| AtomicU8::new(0)).collect();
        let storage: Vec<UnsafeCell<f32>> =
            (0..capacity * block_len).map(|_| UnsafeCell::new(0.0)).collect();

        #[cfg(feature = "tracing")]
        tracing::debug!("pool: {capacity} blocks of {block_len} samples");

        Ok(AudioBlockPool {
            block_len,
            capacity,
            bitmap: bitmap.into_boxed_slice(),
            refcounts: refcounts.into_boxed_slice(),
            storage: storage.into_boxed_slice(),
            peak: AtomicUsize::new(0),
        })
    }

    /// Allocate a zeroed block with refcount 1.
    ///
    /// Never blocks: when every slot is in use the caller gets
    /// [`PoolExhausted`] and is expected to skip this tick.
    pub fn allocate(&self) -> Result<AudioBlockMut<'_>, PoolExhausted> {
        match self.alloc_slot() {
            Some(slot) => Ok(AudioBlockMut::new(self, slot)),
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!("pool: exhausted ({} blocks)", self.capacity);
                Err(PoolExhausted)
            }
        }
    }

    /// Claim a free slot, returning its index.
    pub(crate) fn alloc_slot(&self) -> Option<u8> {
        for (w, word) in self.bitmap.iter().enumerate() {
            let valid = self.word_mask(w);
            loop {
                let bits = word.load(Ordering::Acquire);
                let free = !bits & valid;
                if free == 0 {
                    break; // this word is full, try the next
                }
                let bit = 1u32 << free.trailing_zeros();
                if word
                    .compare_exchange_weak(bits, bits | bit, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    let slot = w * 32 + free.trailing_zeros() as usize;
                    self.refcounts[slot].store(1, Ordering::Release);
                    // SAFETY: the bitmap CAS gave us exclusive ownership of the slot.
                    unsafe { self.block_slice_mut(slot as u8).fill(0.0) };
                    self.peak.fetch_max(self.allocated_count(), Ordering::Relaxed);
                    return Some(slot as u8);
                }
                // raced with another context, retry this word
            }
        }
        None
    }

    /// Mask of bits in word `w` that correspond to real slots.
    fn word_mask(&self, w: usize) -> u32 {
        let remaining = self.capacity - w * 32;
        if remaining >= 32 {
            u32::MAX
        } else {
            (1u32 << remaining) - 1
        }
    }

    /// Increment the reference count for a slot.
    ///
    /// # Panics
    ///
    /// Panics if the count is already `u8::MAX`. The count is left
    /// unchanged, so the slot is never released while handles are live.
    pub(crate) fn inc_ref(&self, slot: u8) {
        debug_assert!((slot as usize) < self.capacity);
        let old = self.refcounts[slot as usize]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
            .unwrap_or_else(|_| panic!("audio block refcount overflow on slot {slot}"));
        debug_assert!(old > 0, "inc_ref on unallocated slot");
    }

    /// Decrement the reference count for a slot, freeing it at zero.
    pub(crate) fn dec_ref(&self, slot: u8) {
        debug_assert!((slot as usize) < self.capacity);
        let old = self.refcounts[slot as usize].fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old > 0, "dec_ref on slot with refcount 0");
        if old == 1 {
            let slot = slot as usize;
            self.bitmap[slot / 32].fetch_and(!(1u32 << (slot % 32)), Ordering::Release);
        }
    }

    /// Current reference count of a slot.
    pub fn refcount(&self, slot: u8) -> u8 {
        self.refcounts[slot as usize].load(Ordering::Acquire)
    }

    /// Samples per block.
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Total number of blocks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of blocks currently allocated.
    pub fn allocated_count(&self) -> usize {
        self.bitmap
            .iter()
            .map(|w| w.load(Ordering::Acquire).count_ones() as usize)
            .sum()
    }

    /// Highest number of simultaneously allocated blocks seen.
    pub fn peak_count(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Restart peak tracking from the current occupancy.
    pub fn reset_peak(&self) {
        self.peak.store(self.allocated_count(), Ordering::Relaxed);
    }

    /// Shared view of a slot's samples.
    ///
    /// # Safety
    /// The slot must be allocated and no `AudioBlockMut` may exist for it.
    pub(crate) unsafe fn block_slice(&self, slot: u8) -> &[f32] {
        let start = slot as usize * self.block_len;
        let ptr = UnsafeCell::raw_get(self.storage.as_ptr().add(start));
        core::slice::from_raw_parts(ptr, self.block_len)
    }

    /// Exclusive view of a slot's samples.
    ///
    /// # Safety
    /// The caller must hold the only reference to the slot.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn block_slice_mut(&self, slot: u8) -> &mut [f32] {
        let start = slot as usize * self.block_len;
        let ptr = UnsafeCell::raw_get(self.storage.as_ptr().add(start));
        core::slice::from_raw_parts_mut(ptr, self.block_len)
    }
}
