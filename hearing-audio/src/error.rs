//! Error types.
//!
//! Configuration problems are detected once, while the pool, filterbank,
//! compressor and graph are being built. The only condition reported while
//! streaming is [`PoolExhausted`], which callers handle by skipping a tick.

use thiserror::Error;

/// Every block of the pool is currently referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("audio block pool exhausted")]
pub struct PoolExhausted;

/// A block of samples could not be handed to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// No free block to copy the samples into.
    #[error(transparent)]
    PoolExhausted(#[from] PoolExhausted),

    /// The queue towards the graph is full.
    #[error("block queue full")]
    QueueFull,
}

/// Fatal configuration error, reported at initialization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Block length is not one of 32, 64 or 128.
    #[error("unsupported block size {0} (expected 32, 64 or 128)")]
    UnsupportedBlockSize(usize),

    /// Pool capacity is zero or above the bitmap limit.
    #[error("pool capacity {requested} outside 1..={max}")]
    PoolCapacity {
        /// Requested number of blocks.
        requested: usize,
        /// Largest supported number of blocks.
        max: usize,
    },

    /// Chunk and window lengths cannot be processed by either filterbank regime.
    #[error("chunk size {chunk} is incompatible with window size {window}")]
    IncompatibleSizes {
        /// Samples per chunk.
        chunk: usize,
        /// Filter window length.
        window: usize,
    },

    /// Number of channels is zero or above the supported maximum.
    #[error("channel count {0} outside 1..=32")]
    ChannelCount(usize),

    /// Coefficient array does not match the configured channel layout.
    #[error("expected {expected} coefficient values, got {actual}")]
    CoefficientLength {
        /// Length implied by channels, window and chunk.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },

    /// Two components disagree on the number of channels.
    #[error("channel mismatch: expected {expected}, got {actual}")]
    ChannelMismatch {
        /// Channel count of the filterbank.
        expected: usize,
        /// Channel count supplied.
        actual: usize,
    },

    /// Two components disagree on the chunk length.
    #[error("chunk mismatch: expected {expected} samples, got {actual}")]
    ChunkMismatch {
        /// Chunk length required.
        expected: usize,
        /// Chunk length supplied.
        actual: usize,
    },

    /// FFT backend length does not match the transform the filterbank needs.
    #[error("FFT backend length {actual}, expected {expected}")]
    TransformLength {
        /// Required transform length.
        expected: usize,
        /// Backend transform length.
        actual: usize,
    },

    /// Crossover frequencies are not strictly ascending inside (0, fs/2).
    #[error("crossover frequencies must ascend strictly inside (0, fs/2)")]
    Crossover,

    /// A numeric parameter is out of range or not finite.
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f32,
    },

    /// A connection refers to a node that was never registered.
    #[error("unknown node {0}")]
    UnknownNode(usize),

    /// A connection refers to an input slot the node does not have.
    #[error("node {node} has no input {input}")]
    NoSuchInput {
        /// Destination node index.
        node: usize,
        /// Requested input slot.
        input: usize,
    },

    /// A connection refers to an output the node does not have.
    #[error("node {node} has no output {output}")]
    NoSuchOutput {
        /// Source node index.
        node: usize,
        /// Requested output.
        output: usize,
    },
    /// An output already feeds the maximum number of inputs.
    #[error("node {node} output {output} already feeds {max} inputs")]
    FanOut {
        /// Source node index.
        node: usize,
        /// Saturated output.
        output: usize,
        /// Fan-out limit.
        max: usize,
    },
}
