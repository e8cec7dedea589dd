//! Fixed-size audio blocks and the pool they live in.
//!
//! - [`AudioBlockPool`] owns the storage and hands out blocks in O(1).
//! - [`AudioBlockMut`] is the unique, writable handle returned by
//!   [`AudioBlockPool::allocate`].
//! - [`AudioBlockRef`] is the shared handle used for fan-out; it converts back
//!   to a writable block with clone-on-write ([`AudioBlockRef::into_mut`]).

pub mod pool;
mod ref_types;

pub use pool::AudioBlockPool;
pub use ref_types::{AudioBlockMut, AudioBlockRef};
