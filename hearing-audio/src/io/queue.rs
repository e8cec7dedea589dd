//! Graph endpoints fed by lock-free block queues.
//!
//! The sample-delivery context (codec DMA interrupt, a test harness, a file
//! reader) owns the far end of each queue:
//!
//! ```text
//! capture ISR ──push──▶ BlockQueue ──▶ AudioInputQueue ──▶ … graph …
//! … graph … ──▶ AudioOutputQueue ──▶ BlockQueue ──pop──▶ playback ISR
//! ```
//!
//! Both nodes only borrow their queue (`'q`), so the queue outlives the graph
//! and stays reachable from the other context.

use crate::block::AudioBlockRef;
use crate::node::{AudioNode, NodeIo};

use super::spsc::SpscQueue;

/// Block queue between sample delivery and the graph.
pub type BlockQueue<'a, const N: usize> = SpscQueue<AudioBlockRef<'a>, N>;

/// Moves blocks from a queue into the graph, one per tick.
///
/// Implements [`AudioNode`] with 0 inputs and 1 output. An empty queue
/// produces no output for that tick (underrun).
pub struct AudioInputQueue<'q, 'a, const N: usize> {
    queue: &'q BlockQueue<'a, N>,
    underruns: u32,
}

impl<'q, 'a, const N: usize> AudioInputQueue<'q, 'a, N> {
    /// Consume blocks from `queue`.
    pub fn new(queue: &'q BlockQueue<'a, N>) -> Self {
        AudioInputQueue { queue, underruns: 0 }
    }

    /// Ticks on which no block was waiting.
    pub fn underruns(&self) -> u32 {
        self.underruns
    }
}

impl<'a, const N: usize> AudioNode<'a> for AudioInputQueue<'_, 'a, N> {
    fn num_inputs(&self) -> usize {
        0
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn update(&mut self, io: &mut NodeIo<'_, 'a>) {
        match self.queue.pop() {
            Some(block) => io.transmit(0, block),
            None => self.underruns = self.underruns.wrapping_add(1),
        }
    }

    fn name(&self) -> &'static str {
        "input_queue"
    }
}

/// Moves blocks from the graph into a queue, one per tick.
///
/// Implements [`AudioNode`] with 1 input and 0 outputs. When the queue is
/// full the block is dropped (released back to the pool).
pub struct AudioOutputQueue<'q, 'a, const N: usize> {
    queue: &'q BlockQueue<'a, N>,
    dropped: u32,
}

impl<'q, 'a, const N: usize> AudioOutputQueue<'q, 'a, N> {
    /// Produce blocks into `queue`.
    pub fn new(queue: &'q BlockQueue<'a, N>) -> Self {
        AudioOutputQueue { queue, dropped: 0 }
    }

    /// Blocks discarded because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl<'a, const N: usize> AudioNode<'a> for AudioOutputQueue<'_, 'a, N> {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        0
    }

    fn update(&mut self, io: &mut NodeIo<'_, 'a>) {
        if let Some(block) = io.receive(0) {
            if self.queue.push(block).is_err() {
                self.dropped = self.dropped.wrapping_add(1);
            }
        }
    }

    fn name(&self) -> &'static str {
        "output_queue"
    }
}
