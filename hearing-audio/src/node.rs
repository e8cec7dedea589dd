use crate::block::{AudioBlockMut, AudioBlockPool, AudioBlockRef};
use crate::error::{ConfigError, PoolExhausted};
use crate::graph::Ports;

/// Core trait for all audio processing nodes.
///
/// A node declares a fixed number of input slots and outputs, and is updated
/// exactly once per tick. It talks to the rest of the graph only through the
/// [`NodeIo`] handed to [`update`](AudioNode::update).
///
/// `'a` is the lifetime of the block pool the graph runs on.
pub trait AudioNode<'a> {
    /// Number of input slots. Must not change after registration.
    fn num_inputs(&self) -> usize;

    /// Number of outputs. Must not change after registration.
    fn num_outputs(&self) -> usize;

    /// Process one tick.
    fn update(&mut self, io: &mut NodeIo<'_, 'a>);

    /// Check the node against the graph's block length at registration.
    fn prepare(&mut self, _block_len: usize) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Short label used in profiling output.
    fn name(&self) -> &'static str {
        "node"
    }
}

/// A node's view of the graph during [`AudioNode::update`].
pub struct NodeIo<'g, 'a> {
    pub(crate) pool: &'a AudioBlockPool,
    pub(crate) node: usize,
    pub(crate) ports: &'g mut Ports<'a>,
}

impl<'a> NodeIo<'_, 'a> {
    /// Take the pending block from an input slot, if any.
    pub fn receive(&mut self, input: usize) -> Option<AudioBlockRef<'a>> {
        self.ports.take(self.node, input)
    }

    /// Take the pending block from an input slot as an exclusively owned,
    /// writable block, copying it first if other consumers still hold it.
    ///
    /// Returns `None` if the slot is empty or the copy could not be allocated.
    pub fn receive_writable(&mut self, input: usize) -> Option<AudioBlockMut<'a>> {
        self.receive(input)?.into_mut().ok()
    }

    /// Allocate a fresh block from the graph's pool.
    pub fn allocate(&self) -> Result<AudioBlockMut<'a>, PoolExhausted> {
        self.pool.allocate()
    }

    /// Send a block to every destination connected to `output`.
    ///
    /// Each destination gets its own reference. A block still pending in a
    /// destination slot is released and replaced.
    pub fn transmit(&mut self, output: usize, block: impl Into<AudioBlockRef<'a>>) {
        self.ports.route(self.node, output, block.into());
    }

    /// Samples per block for this graph.
    pub fn block_len(&self) -> usize {
        self.pool.block_len()
    }
}
