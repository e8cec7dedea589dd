//! Lock-free single-producer single-consumer (SPSC) ring buffer.
//!
//! Carries blocks between the sample-delivery context (DMA completion ISR)
//! and the graph tick without a critical section.
//!
//! # Safety Contract
//!
//! - Only ONE context may call [`push()`](SpscQueue::push) (the "producer").
//! - Only ONE context may call [`pop()`](SpscQueue::pop) (the "consumer").
//! - The two may preempt each other freely.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

/// A lock-free single-producer single-consumer queue of `N` slots.
///
/// `N` must be a power of two. Head and tail are free-running counters
/// (wrapping), so all `N` slots are usable and `head - tail` is the length.
pub struct SpscQueue<T, const N: usize> {
    buffer: [UnsafeCell<MaybeUninit<T>>; N],
    /// Total pushes (only modified by the producer).
    head: AtomicUsize,
    /// Total pops (only modified by the consumer).
    tail: AtomicUsize,
}

// SAFETY: values move between contexts, hence `T: Send`. The producer only
// writes slots in `[tail + len, tail + N)`, the consumer only reads slots in
// `[tail, head)`, and the Release/Acquire pairs on head/tail order the slot
// accesses against the index updates.
unsafe impl<T: Send, const N: usize> Sync for SpscQueue<T, N> {}
unsafe impl<T: Send, const N: usize> Send for SpscQueue<T, N> {}

impl<T, const N: usize> SpscQueue<T, N> {
    const MASK: usize = N - 1;

    /// Create an empty queue.
    ///
    /// # Panics
    ///
    /// Compile-time assertion: `N` must be a non-zero power of two.
    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "SPSC queue length must be a power of two");

        SpscQueue {
            // SAFETY: an array of MaybeUninit needs no initialization.
            buffer: unsafe {
                MaybeUninit::<[UnsafeCell<MaybeUninit<T>>; N]>::uninit().assume_init()
            },
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Push a value (producer side).
    ///
    /// Returns `Err(val)` if the queue is full, handing the value back.
    pub fn push(&self, val: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        if head.wrapping_sub(self.tail.load(Ordering::Acquire)) >= N {
            return Err(val);
        }

        // SAFETY: sole producer, and the slot is outside `[tail, head)`.
        unsafe {
            (*self.buffer[head & Self::MASK].get()).write(val);
        }

        self.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Pop the oldest value (consumer side).
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: sole consumer, and `tail != head` means the slot holds a value.
        let val = unsafe { (*self.buffer[tail & Self::MASK].get()).assume_init_read() };

        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(val)
    }

    /// `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` if a push would fail.
    pub fn is_full(&self) -> bool {
        self.len() >= N
    }

    /// Number of queued values.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// Number of slots.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for SpscQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for SpscQueue<T, N> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}
