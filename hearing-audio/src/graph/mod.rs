//! Explicitly built audio graph driven by a single periodic tick.
//!
//! Nodes are registered with a [`GraphBuilder`] in processing order (sources
//! first, then downstream consumers) and wired with
//! [`connect`](GraphBuilder::connect). The built [`StreamGraph`] calls every
//! node's `update()` exactly once per [`run_tick`](StreamGraph::run_tick), in
//! registration order.
//!
//! ```ignore
//! let pool = AudioBlockPool::new(BlockSize::S128, 16)?;
//! let mut builder = GraphBuilder::new(&pool);
//! let input = builder.add_node(AudioInputQueue::new(&from_adc))?;
//! let aid = builder.add_node(HearingAid::new(filterbank, compressor)?)?;
//! let output = builder.add_node(AudioOutputQueue::new(&to_dac))?;
//! builder.connect(input, 0, aid, 0)?;
//! builder.connect(aid, 0, output, 0)?;
//! let mut graph = builder.build();
//!
//! // In the software interrupt raised by the audio timer:
//! graph.service(&TRIGGER);
//! ```
//!
//! ## Block routing
//!
//! - Each input slot holds at most one pending block. Transmitting into an
//!   occupied slot releases the older block (counted in
//!   [`TickStats::overwritten`]); a slow consumer loses audio instead of
//!   stalling the tick.
//! - Fan-out clones the shared handle per destination (refcount increment,
//!   no copy).
//! - Pool exhaustion degrades gracefully: nodes skip their output for the tick.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::block::{AudioBlockMut, AudioBlockPool, AudioBlockRef};
use crate::constants::MAX_FAN_OUT;
use crate::error::ConfigError;
use crate::node::{AudioNode, NodeIo};

/// Handle to a node registered in a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Registration index, which is also the execution position.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Source of a free-running cycle counter used for profiling.
///
/// On Cortex-M this is typically the DWT cycle counter. Wrap-around is
/// handled by the graph.
pub trait CycleClock {
    /// Current counter value.
    fn cycles(&self) -> u32;
}

/// Clock that always reads zero; disables profiling.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullClock;

impl CycleClock for NullClock {
    fn cycles(&self) -> u32 {
        0
    }
}

impl<F: Fn() -> u32> CycleClock for F {
    fn cycles(&self) -> u32 {
        self()
    }
}

/// Per-node cycle accounting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    /// Cycles spent in the node's last update.
    pub cycles: u32,
    /// Largest per-update cycle count since the last reset.
    pub cycles_max: u32,
}

/// Whole-graph accounting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    /// Completed passes.
    pub ticks: u32,
    /// Cycles spent in the last pass, summed over nodes.
    pub cycles_total: u32,
    /// Largest pass total since the last reset.
    pub cycles_total_max: u32,
    /// Pending blocks released because a newer block replaced them.
    pub overwritten: u32,
}

impl TickStats {
    /// Convert a cycle count to percent of one block period.
    pub fn usage_percent(cycles: u32, cpu_hz: f32, sample_rate: f32, block_len: usize) -> f32 {
        let period = cpu_hz / sample_rate * block_len as f32;
        if period <= 0.0 {
            return 0.0;
        }
        cycles as f32 * 100.0 / period
    }
}

/// Flattened input slots and fan-out lists, shared by every node's [`NodeIo`].
pub(crate) struct Ports<'a> {
    inputs: Vec<Option<AudioBlockRef<'a>>>,
    input_base: Vec<usize>,
    input_count: Vec<usize>,
    output_base: Vec<usize>,
    output_count: Vec<usize>,
    /// Destination input slots for every (node, output), flattened.
    routes: Vec<Vec<usize>>,
    overwritten: u32,
}

impl<'a> Ports<'a> {
    pub(crate) fn take(&mut self, node: usize, input: usize) -> Option<AudioBlockRef<'a>> {
        if input >= self.input_count[node] {
            debug_assert!(false, "node {node} has no input {input}");
            return None;
        }
        self.inputs[self.input_base[node] + input].take()
    }

    pub(crate) fn route(&mut self, node: usize, output: usize, block: AudioBlockRef<'a>) {
        if output >= self.output_count[node] {
            debug_assert!(false, "node {node} has no output {output}");
            return;
        }
        for &dst in &self.routes[self.output_base[node] + output] {
            if self.inputs[dst].replace(block.clone()).is_some() {
                self.overwritten = self.overwritten.wrapping_add(1);
            }
        }
    }
}

struct Registered<'a, 'g> {
    node: Box<dyn AudioNode<'a> + 'g>,
    stats: NodeStats,
}

/// Collects nodes and connections, then produces a [`StreamGraph`].
///
/// `'a` is the lifetime of the block pool; `'g` bounds whatever the nodes and
/// the clock borrow (queues, shared counters).
pub struct GraphBuilder<'a, 'g> {
    pool: &'a AudioBlockPool,
    nodes: Vec<Box<dyn AudioNode<'a> + 'g>>,
    connections: Vec<(usize, usize, usize, usize)>,
    clock: Box<dyn CycleClock + 'g>,
}

impl<'a, 'g> GraphBuilder<'a, 'g> {
    /// Start a graph whose blocks come from `pool`.
    pub fn new(pool: &'a AudioBlockPool) -> Self {
        GraphBuilder {
            pool,
            nodes: Vec::new(),
            connections: Vec::new(),
            clock: Box::new(NullClock),
        }
    }

    /// Use `clock` for per-node cycle accounting.
    pub fn with_clock(mut self, clock: impl CycleClock + 'g) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Register a node. Registration order is execution order.
    ///
    /// The node's [`prepare`](AudioNode::prepare) check runs here, so a node
    /// that cannot work with the pool's block length is rejected up front.
    pub fn add_node(&mut self, mut node: impl AudioNode<'a> + 'g) -> Result<NodeId, ConfigError> {
        node.prepare(self.pool.block_len())?;
        let id = NodeId(self.nodes.len());
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "graph_add: {} node {} ({} in, {} out)",
            node.name(),
            id.0,
            node.num_inputs(),
            node.num_outputs()
        );
        self.nodes.push(Box::new(node));
        Ok(id)
    }

    /// Connect `src`'s output `output` to `dst`'s input slot `input`.
    ///
    /// One output may feed up to [`MAX_FAN_OUT`] inputs.
    pub fn connect(
        &mut self,
        src: NodeId,
        output: usize,
        dst: NodeId,
        input: usize,
    ) -> Result<(), ConfigError> {
        let source = self.nodes.get(src.0).ok_or(ConfigError::UnknownNode(src.0))?;
        if output >= source.num_outputs() {
            return Err(ConfigError::NoSuchOutput { node: src.0, output });
        }
        let dest = self.nodes.get(dst.0).ok_or(ConfigError::UnknownNode(dst.0))?;
        if input >= dest.num_inputs() {
            return Err(ConfigError::NoSuchInput { node: dst.0, input });
        }
        let fan_out = self
            .connections
            .iter()
            .filter(|&&(s, o, _, _)| s == src.0 && o == output)
            .count();
        if fan_out >= MAX_FAN_OUT {
            return Err(ConfigError::FanOut {
                node: src.0,
                output,
                max: MAX_FAN_OUT,
            });
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_connect: {}:{} → {}:{}", src.0, output, dst.0, input);
        self.connections.push((src.0, output, dst.0, input));
        Ok(())
    }

    /// Freeze the topology.
    pub fn build(self) -> StreamGraph<'a, 'g> {
        let mut input_base = Vec::with_capacity(self.nodes.len());
        let mut input_count = Vec::with_capacity(self.nodes.len());
        let mut output_base = Vec::with_capacity(self.nodes.len());
        let mut output_count = Vec::with_capacity(self.nodes.len());
        let (mut inputs, mut outputs) = (0, 0);
        for node in &self.nodes {
            input_base.push(inputs);
            input_count.push(node.num_inputs());
            output_base.push(outputs);
            output_count.push(node.num_outputs());
            inputs += node.num_inputs();
            outputs += node.num_outputs();
        }

        let mut routes = alloc::vec![Vec::new(); outputs];
        for &(src, output, dst, input) in &self.connections {
            routes[output_base[src] + output].push(input_base[dst] + input);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "graph_build: {} nodes, {} connections",
            self.nodes.len(),
            self.connections.len()
        );

        StreamGraph {
            pool: self.pool,
            nodes: self
                .nodes
                .into_iter()
                .map(|node| Registered {
                    node,
                    stats: NodeStats::default(),
                })
                .collect(),
            ports: Ports {
                inputs: (0..inputs).map(|_| None).collect(),
                input_base,
                input_count,
                output_base,
                output_count,
                routes,
                overwritten: 0,
            },
            clock: self.clock,
            stats: TickStats::default(),
        }
    }
}

/// A built graph: fixed nodes, fixed connections, one pass per tick.
pub struct StreamGraph<'a, 'g> {
    pool: &'a AudioBlockPool,
    nodes: Vec<Registered<'a, 'g>>,
    ports: Ports<'a>,
    clock: Box<dyn CycleClock + 'g>,
    stats: TickStats,
}

impl<'a> StreamGraph<'a, '_> {
    /// Run one full pass: every node's `update()` once, in registration order.
    pub fn run_tick(&mut self) {
        let mut total: u32 = 0;
        for (index, entry) in self.nodes.iter_mut().enumerate() {
            let start = self.clock.cycles();
            let mut io = NodeIo {
                pool: self.pool,
                node: index,
                ports: &mut self.ports,
            };
            entry.node.update(&mut io);
            let elapsed = self.clock.cycles().wrapping_sub(start);
            entry.stats.cycles = elapsed;
            entry.stats.cycles_max = entry.stats.cycles_max.max(elapsed);
            total = total.saturating_add(elapsed);
        }
        self.stats.ticks = self.stats.ticks.wrapping_add(1);
        self.stats.cycles_total = total;
        self.stats.cycles_total_max = self.stats.cycles_total_max.max(total);
    }

    /// Run one pass if `trigger` has a pending request.
    ///
    /// Returns `true` if a pass ran. Requests that arrived while a pass was
    /// running were coalesced into the single pending request.
    pub fn service(&mut self, trigger: &TickTrigger) -> bool {
        if !trigger.begin() {
            return false;
        }
        self.run_tick();
        trigger.finish();
        true
    }

    /// Inject a block on `node`'s output from outside the tick.
    pub fn transmit(&mut self, node: NodeId, output: usize, block: impl Into<AudioBlockRef<'a>>) {
        self.ports.route(node.0, output, block.into());
    }

    /// Take the pending block from `node`'s input slot.
    pub fn receive(&mut self, node: NodeId, input: usize) -> Option<AudioBlockRef<'a>> {
        self.ports.take(node.0, input)
    }

    /// [`receive`](Self::receive) followed by clone-on-write.
    pub fn receive_writable(&mut self, node: NodeId, input: usize) -> Option<AudioBlockMut<'a>> {
        self.receive(node, input)?.into_mut().ok()
    }

    /// Cycle accounting for one node.
    pub fn node_stats(&self, node: NodeId) -> NodeStats {
        self.nodes[node.0].stats
    }

    /// Name reported by a node.
    pub fn node_name(&self, node: NodeId) -> &'static str {
        self.nodes[node.0].node.name()
    }

    /// Whole-graph accounting.
    pub fn stats(&self) -> TickStats {
        TickStats {
            overwritten: self.ports.overwritten,
            ..self.stats
        }
    }

    /// Restart max tracking from the latest values.
    pub fn reset_max(&mut self) {
        self.stats.cycles_total_max = self.stats.cycles_total;
        for entry in &mut self.nodes {
            entry.stats.cycles_max = entry.stats.cycles;
        }
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if no node is registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The pool blocks are drawn from.
    pub fn pool(&self) -> &'a AudioBlockPool {
        self.pool
    }
}

/// ISR-safe tick request flag.
///
/// A timer interrupt calls [`request`](Self::request); the audio context calls
/// [`StreamGraph::service`]. Requests never start a second pass while one is
/// in flight: extra requests are coalesced and counted as overruns.
#[derive(Debug, Default)]
pub struct TickTrigger {
    pending: AtomicBool,
    busy: AtomicBool,
    overruns: AtomicU32,
}

impl TickTrigger {
    /// Create an idle trigger.
    pub const fn new() -> Self {
        TickTrigger {
            pending: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            overruns: AtomicU32::new(0),
        }
    }

    /// Ask for a pass. Safe to call from any context.
    pub fn request(&self) {
        let was_pending = self.pending.swap(true, Ordering::AcqRel);
        if was_pending || self.busy.load(Ordering::Acquire) {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// `true` while a pass is running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// `true` if a request is waiting.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Requests that arrived while a pass was running or already pending.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    fn begin(&self) -> bool {
        if self.busy.swap(true, Ordering::AcqRel) {
            return false;
        }
        if !self.pending.swap(false, Ordering::AcqRel) {
            self.busy.store(false, Ordering::Release);
            return false;
        }
        true
    }

    fn finish(&self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod verification_tests;
