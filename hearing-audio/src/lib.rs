//! # hearing-audio
//!
//! A `no_std` block-streaming audio framework with a multiband wide dynamic
//! range compression (WDRC) hearing-aid chain. Fixed-size reference-counted
//! blocks flow through an explicitly built graph of nodes; one synchronous
//! pass runs per tick, driven by a periodic interrupt.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Memory | [`block`] | Fixed-size audio block pool with refcounted handles |
//! | Trait | [`node`] | `AudioNode` contract and the `NodeIo` port view |
//! | Graph | [`graph`] | `GraphBuilder`, `StreamGraph`, tick trigger, cycle stats |
//! | I/O | [`io`] | Lock-free block queues and `i16` sample conversion |
//! | DSP | [`dsp`] / [`nodes`] | Filterbank, compressor, fast dB math (feature-gated) |
//!
//! ## Quick start
//!
//! ```ignore
//! use hearing_audio::block::AudioBlockPool;
//! use hearing_audio::constants::BlockSize;
//! use hearing_audio::dsp::Radix2Fft;
//! use hearing_audio::graph::{GraphBuilder, TickTrigger};
//! use hearing_audio::io::{pop_i16, push_i16, AudioInputQueue, AudioOutputQueue, BlockQueue, SpscQueue};
//! use hearing_audio::nodes::HearingAid;
//!
//! static TRIGGER: TickTrigger = TickTrigger::new();
//!
//! let pool = AudioBlockPool::new(BlockSize::S32, 16)?;
//! let from_adc: BlockQueue<'_, 4> = SpscQueue::new();
//! let to_dac: BlockQueue<'_, 4> = SpscQueue::new();
//!
//! let aid = HearingAid::fit(&prescription, &wdrc, 128, 32, Radix2Fft::new(64)?)?;
//! let mut builder = GraphBuilder::new(&pool);
//! let input = builder.add_node(AudioInputQueue::new(&from_adc))?;
//! let aid = builder.add_node(aid)?;
//! let output = builder.add_node(AudioOutputQueue::new(&to_dac))?;
//! builder.connect(input, 0, aid, 0)?;
//! builder.connect(aid, 0, output, 0)?;
//! let mut graph = builder.build();
//!
//! // Capture DMA complete:
//! push_i16(&pool, &from_adc, &adc_samples)?;
//! TRIGGER.request();
//!
//! // Audio software interrupt:
//! graph.service(&TRIGGER);
//!
//! // Playback DMA complete:
//! pop_i16(&to_dac, &mut dac_samples);
//! ```
//!
//! ## Features
//!
//! | Feature | Default | Enables |
//! |---------|---------|---------|
//! | `dsp` | yes | Filterbank, compressor, fast math, the `HearingAid` node |
//! | `rustfft` | yes | `RustFftBackend` FFT backend |
//! | `tracing` | no | `tracing` events at build time and on pool exhaustion |
//!
//! ## Audio parameters
//!
//! - **Block size:** 32, 64 or 128 samples ([`constants::BlockSize`])
//! - **Sample format:** `f32` inside the graph, `i16` at the queues
//! - **Block pool:** up to 192 blocks ([`constants::MAX_POOL_SIZE`])
//! - **Channels:** up to 32 ([`constants::MAX_CHANNELS`])

#![no_std]

extern crate alloc;

pub mod constants;
pub mod error;
pub mod block;
pub mod node;
pub mod io;
pub mod graph;

#[cfg(feature = "dsp")]
pub mod dsp;

#[cfg(feature = "dsp")]
pub mod nodes;
