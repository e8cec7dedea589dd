//! Build-wide audio parameters.

use crate::error::ConfigError;

/// Default number of samples per audio block.
pub const AUDIO_BLOCK_SAMPLES: usize = 128;

/// Upper bound on pool capacity (six 32-bit bitmap words).
pub const MAX_POOL_SIZE: usize = 192;

/// Maximum number of filterbank / compressor channels.
pub const MAX_CHANNELS: usize = 32;

/// Maximum number of inputs a single node output may feed.
///
/// Block refcounts are 8-bit: the sender's handle plus one clone per
/// destination must stay below `u8::MAX`.
pub const MAX_FAN_OUT: usize = 254;

/// Reduced sample rate used by low-latency hearing-aid builds.
pub const AUDIO_SAMPLE_RATE_24K: f32 = 24_000.0;

/// Number of samples in every block of a graph.
///
/// Fixed when the pool is created and shared by every node of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockSize {
    /// 32 samples per block.
    S32,
    /// 64 samples per block.
    S64,
    /// 128 samples per block.
    #[default]
    S128,
}

impl BlockSize {
    /// Number of samples in one block.
    pub const fn samples(self) -> usize {
        match self {
            BlockSize::S32 => 32,
            BlockSize::S64 => 64,
            BlockSize::S128 => 128,
        }
    }
}

impl TryFrom<usize> for BlockSize {
    type Error = ConfigError;

    fn try_from(samples: usize) -> Result<Self, Self::Error> {
        match samples {
            32 => Ok(BlockSize::S32),
            64 => Ok(BlockSize::S64),
            128 => Ok(BlockSize::S128),
            other => Err(ConfigError::UnsupportedBlockSize(other)),
        }
    }
}
