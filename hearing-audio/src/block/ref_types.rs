use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::error::PoolExhausted;

use super::pool::AudioBlockPool;

/// Exclusive (mutable) handle to an audio block in a pool.
///
/// There is exactly one `AudioBlockMut` per allocated slot, so holding one
/// means holding the only reference. Dropping it releases the block.
pub struct AudioBlockMut<'a> {
    pool: &'a AudioBlockPool,
    slot: u8,
}

impl<'a> AudioBlockMut<'a> {
    /// Wrap a slot that was just allocated with refcount 1.
    pub(crate) fn new(pool: &'a AudioBlockPool, slot: u8) -> Self {
        AudioBlockMut { pool, slot }
    }

    /// Convert this exclusive handle into a shared one.
    /// No data copy, no refcount change.
    pub fn into_shared(self) -> AudioBlockRef<'a> {
        let this = core::mem::ManuallyDrop::new(self);
        AudioBlockRef {
            pool: this.pool,
            slot: this.slot,
        }
    }

    /// Pool slot index.
    pub fn slot(&self) -> u8 {
        self.slot
    }
}

impl Deref for AudioBlockMut<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        // SAFETY: unique handle, refcount == 1.
        unsafe { self.pool.block_slice(self.slot) }
    }
}

impl DerefMut for AudioBlockMut<'_> {
    fn deref_mut(&mut self) -> &mut [f32] {
        // SAFETY: unique handle, refcount == 1.
        unsafe { self.pool.block_slice_mut(self.slot) }
    }
}

impl Drop for AudioBlockMut<'_> {
    fn drop(&mut self) {
        self.pool.dec_ref(self.slot);
    }
}

impl fmt::Debug for AudioBlockMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBlockMut").field("slot", &self.slot).finish()
    }
}

/// Shared (read-only) handle to an audio block in a pool.
///
/// Cloning increments the refcount; dropping decrements it. The slot returns
/// to the pool when the last handle is dropped.
pub struct AudioBlockRef<'a> {
    pool: &'a AudioBlockPool,
    slot: u8,
}

impl<'a> AudioBlockRef<'a> {
    /// Pool slot index.
    pub fn slot(&self) -> u8 {
        self.slot
    }

    /// Number of live handles to this block.
    pub fn refcount(&self) -> u8 {
        self.pool.refcount(self.slot)
    }

    /// Release this reference. Same as dropping it.
    pub fn release(self) {}

    /// Obtain an exclusively owned, writable block with the same samples.
    ///
    /// - Sole owner (refcount == 1): converts in place, no copy.
    /// - Shared: allocates a new block, copies the samples and releases this
    ///   reference. If the pool is exhausted the reference is still released
    ///   and [`PoolExhausted`] is returned.
    pub fn into_mut(self) -> Result<AudioBlockMut<'a>, PoolExhausted> {
        if self.pool.refcount(self.slot) == 1 {
            let this = core::mem::ManuallyDrop::new(self);
            return Ok(AudioBlockMut::new(this.pool, this.slot));
        }
        let mut copy = self.pool.allocate()?;
        copy.copy_from_slice(&self);
        Ok(copy)
    }
}

impl<'a> From<AudioBlockMut<'a>> for AudioBlockRef<'a> {
    fn from(block: AudioBlockMut<'a>) -> Self {
        block.into_shared()
    }
}

impl Deref for AudioBlockRef<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        // SAFETY: slot is allocated and immutable while shared.
        unsafe { self.pool.block_slice(self.slot) }
    }
}

impl Clone for AudioBlockRef<'_> {
    fn clone(&self) -> Self {
        self.pool.inc_ref(self.slot);
        AudioBlockRef {
            pool: self.pool,
            slot: self.slot,
        }
    }
}

impl Drop for AudioBlockRef<'_> {
    fn drop(&mut self) {
        self.pool.dec_ref(self.slot);
    }
}

impl fmt::Debug for AudioBlockRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBlockRef")
            .field("slot", &self.slot)
            .field("refcount", &self.refcount())
            .finish()
    }
}
