//! Sample delivery between the graph and the outside world.
//!
//! The core never touches codec, pin or DMA hardware. Whatever produces and
//! consumes samples (a DMA-complete interrupt on the target, a test harness on
//! the host) exchanges whole blocks with the graph through lock-free queues.
//!
//! ## Components
//!
//! | Node | Inputs | Outputs | Description |
//! |------|--------|---------|-------------|
//! | [`AudioInputQueue`] | 0 | 1 | Queue → audio graph |
//! | [`AudioOutputQueue`] | 1 | 0 | Audio graph → queue |
//!
//! ## Utilities
//!
//! - [`spsc`]: lock-free single-producer single-consumer ring buffer
//! - [`convert`]: Q15 `i16` ↔ `f32` sample conversion and the
//!   [`push_i16`]/[`pop_i16`] helpers used from the delivery context

pub mod convert;
pub mod queue;
pub mod spsc;

pub use convert::{pop_i16, push_i16};
pub use queue::{AudioInputQueue, AudioOutputQueue, BlockQueue};
pub use spsc::SpscQueue;
