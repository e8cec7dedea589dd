//! Multiband WDRC hearing-aid node.

use alloc::vec;
use alloc::vec::Vec;

use crate::dsp::compressor::Compressor;
use crate::dsp::fft::FftBackend;
use crate::dsp::filterbank::Filterbank;
use crate::dsp::prepare::{prepare_compressor, prepare_filterbank, Prescription, WdrcSpec};
use crate::error::ConfigError;
use crate::node::{AudioNode, NodeIo};

/// Compress, split, compress per band, recombine, compress. One input, one
/// output.
///
/// Each tick the input block is processed in place:
///
/// ```text
/// input stage → analyze → per-channel stages → synthesize → output stage
/// ```
///
/// The filterbank chunk must equal the graph's block length; this is checked
/// when the node is added to a graph.
pub struct HearingAid<B> {
    filterbank: Filterbank<B>,
    compressor: Compressor,
    bands: Vec<f32>,
}

impl<B: FftBackend> HearingAid<B> {
    /// Combine a filterbank and a compressor with the same channel count.
    pub fn new(filterbank: Filterbank<B>, compressor: Compressor) -> Result<Self, ConfigError> {
        if compressor.channels() != filterbank.channels() {
            return Err(ConfigError::ChannelMismatch {
                expected: filterbank.channels(),
                actual: compressor.channels(),
            });
        }
        let bands = vec![0.0; filterbank.channels() * filterbank.chunk()];
        Ok(HearingAid {
            filterbank,
            compressor,
            bands,
        })
    }

    /// Build the whole chain from a prescription.
    ///
    /// `fft` must have the transform length implied by `window` and `chunk`.
    pub fn fit(
        rx: &Prescription,
        wdrc: &WdrcSpec,
        window: usize,
        chunk: usize,
        mut fft: B,
    ) -> Result<Self, ConfigError> {
        let coeffs = prepare_filterbank(rx, wdrc.sample_rate, window, chunk, &mut fft)?;
        let compressor = Compressor::new(&prepare_compressor(rx, wdrc)?)?;
        Self::new(Filterbank::new(coeffs, fft)?, compressor)
    }

    /// The compressor chain, for envelope inspection.
    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    /// The filterbank.
    pub fn filterbank(&self) -> &Filterbank<B> {
        &self.filterbank
    }

    /// Clear filterbank overlap and every envelope.
    pub fn reset(&mut self) {
        self.filterbank.reset();
        self.compressor.reset();
    }

    /// Run one chunk through the chain in place.
    pub fn process(&mut self, x: &mut [f32]) {
        self.compressor.process_input(x);
        self.filterbank.analyze(x, &mut self.bands);
        self.compressor.process_channels(&mut self.bands);
        self.filterbank.synthesize(&self.bands, x);
        self.compressor.process_output(x);
    }
}

impl<'a, B: FftBackend> AudioNode<'a> for HearingAid<B> {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn prepare(&mut self, block_len: usize) -> Result<(), ConfigError> {
        if self.filterbank.chunk() != block_len {
            return Err(ConfigError::ChunkMismatch {
                expected: block_len,
                actual: self.filterbank.chunk(),
            });
        }
        Ok(())
    }

    fn update(&mut self, io: &mut NodeIo<'_, 'a>) {
        // Nothing pending, or a shared block could not be copied: skip.
        let mut block = match io.receive_writable(0) {
            Some(b) => b,
            None => return,
        };
        self.process(&mut block);
        io.transmit(0, block);
    }

    fn name(&self) -> &'static str {
        "hearing_aid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::AudioBlockPool;
    use crate::constants::BlockSize;
    use crate::dsp::compressor::{ChannelParams, CompressorConfig, EnvelopeCoeffs, KneeParams};
    use crate::dsp::fast_math::Approximation;
    use crate::dsp::fft::Radix2Fft;
    use crate::dsp::filterbank::FilterbankCoefficients;
    use crate::dsp::prepare::design_filterbank_taps;
    use crate::graph::GraphBuilder;
    use crate::io::{AudioInputQueue, AudioOutputQueue, BlockQueue, SpscQueue};
    use libm::{fabsf, sinf};

    const CROSSOVERS: [f32; 3] = [500.0, 1500.0, 4000.0];

    /// Linear gain everywhere: ratio 1, limiter far out of reach.
    fn flat_knee(gain_db: f32) -> KneeParams {
        KneeParams {
            gain_db,
            knee_db: 0.0,
            ratio: 1.0,
            limit_db: 200.0,
        }
    }

    fn hearing_aid(window: usize, chunk: usize, band_gain_db: f32) -> HearingAid<Radix2Fft> {
        let n = if chunk < window { 2 * chunk } else { 2 * window };
        let mut fft = Radix2Fft::new(n).unwrap();
        let taps = design_filterbank_taps(&CROSSOVERS, 24_000.0, window).unwrap();
        let coeffs = FilterbankCoefficients::from_taps(&taps, 4, window, chunk, &mut fft).unwrap();
        let env = EnvelopeCoeffs {
            attack: 0.5,
            release: 0.99,
        };
        let config = CompressorConfig {
            max_db: 119.0,
            broadband: flat_knee(0.0),
            broadband_envelope: env,
            channels: vec![
                ChannelParams {
                    knee: flat_knee(band_gain_db),
                    envelope: env,
                };
                4
            ],
            approximation: Approximation::DEFAULT,
        };
        let compressor = Compressor::new(&config).unwrap();
        HearingAid::new(Filterbank::new(coeffs, fft).unwrap(), compressor).unwrap()
    }

    fn tone(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.01 * sinf(i as f32 * 0.21) + 0.005 * sinf(i as f32 * 1.7))
            .collect()
    }

    /// Feed `x` block by block through a graph ending in an output queue.
    fn run(aid: HearingAid<Radix2Fft>, block_size: BlockSize, x: &[f32]) -> Vec<f32> {
        let pool = AudioBlockPool::new(block_size, 8).unwrap();
        let from_adc: BlockQueue<'_, 4> = SpscQueue::new();
        let to_dac: BlockQueue<'_, 4> = SpscQueue::new();
        let mut b = GraphBuilder::new(&pool);
        let input = b.add_node(AudioInputQueue::new(&from_adc)).unwrap();
        let node = b.add_node(aid).unwrap();
        let out = b.add_node(AudioOutputQueue::new(&to_dac)).unwrap();
        b.connect(input, 0, node, 0).unwrap();
        b.connect(node, 0, out, 0).unwrap();
        let mut graph = b.build();

        let mut y = Vec::with_capacity(x.len());
        for chunk in x.chunks_exact(block_size.samples()) {
            let mut block = pool.allocate().unwrap();
            block.copy_from_slice(chunk);
            from_adc.push(block.into_shared()).unwrap();
            graph.run_tick();
            let processed = to_dac.pop().unwrap();
            y.extend_from_slice(&processed);
        }
        drop(graph);
        assert_eq!(pool.allocated_count(), 0);
        y
    }

    fn max_error(x: &[f32], y: &[f32], gain: f32, delay: usize) -> f32 {
        let peak = x.iter().fold(0.0f32, |m, &v| m.max(fabsf(v)));
        let err = (delay..y.len()).fold(0.0f32, |m, n| m.max(fabsf(y[n] - gain * x[n - delay])));
        err / (gain * peak)
    }

    #[test]
    fn unity_settings_are_a_pure_delay() {
        let x = tone(32 * 30);
        let y = run(hearing_aid(128, 32, 0.0), BlockSize::S32, &x);
        assert!(max_error(&x, &y, 1.0, 64) < 1e-3);
    }

    #[test]
    fn band_gain_scales_output() {
        let x = tone(128 * 8);
        let y = run(hearing_aid(128, 128, 20.0), BlockSize::S128, &x);
        assert!(max_error(&x, &y, 10.0, 64) < 1e-3);
    }

    #[test]
    fn silence_stays_silent() {
        let mut aid = hearing_aid(64, 64, 30.0);
        let mut x = vec![0.0; 64];
        aid.process(&mut x);
        assert!(x.iter().all(|&v| v == 0.0));
        assert_eq!(aid.compressor().input_peak(), 0.0);
    }

    #[test]
    fn rejects_chunk_other_than_block_len() {
        let pool = AudioBlockPool::new(BlockSize::S64, 4).unwrap();
        let mut b = GraphBuilder::new(&pool);
        assert_eq!(
            b.add_node(hearing_aid(128, 32, 0.0)).err(),
            Some(ConfigError::ChunkMismatch {
                expected: 64,
                actual: 32
            })
        );
    }

    #[test]
    fn rejects_channel_mismatch() {
        let aid = hearing_aid(128, 32, 0.0);
        let env = EnvelopeCoeffs {
            attack: 0.0,
            release: 0.0,
        };
        let compressor = Compressor::new(&CompressorConfig {
            max_db: 119.0,
            broadband: flat_knee(0.0),
            broadband_envelope: env,
            channels: vec![
                ChannelParams {
                    knee: flat_knee(0.0),
                    envelope: env,
                };
                3
            ],
            approximation: Approximation::DEFAULT,
        })
        .unwrap();
        assert_eq!(
            HearingAid::new(aid.filterbank, compressor).err(),
            Some(ConfigError::ChannelMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn no_input_means_no_output() {
        let pool = AudioBlockPool::new(BlockSize::S32, 4).unwrap();
        let to_dac: BlockQueue<'_, 2> = SpscQueue::new();
        let mut b = GraphBuilder::new(&pool);
        let node = b.add_node(hearing_aid(128, 32, 0.0)).unwrap();
        let out = b.add_node(AudioOutputQueue::new(&to_dac)).unwrap();
        b.connect(node, 0, out, 0).unwrap();
        let mut graph = b.build();
        graph.run_tick();
        assert!(to_dac.is_empty());
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn fitted_from_prescription() {
        let rx = Prescription {
            attack_ms: 5.0,
            release_ms: 50.0,
            max_db: 119.0,
            crossovers: CROSSOVERS.to_vec(),
            gain_db: vec![0.0, 5.0, 10.0, 15.0],
            ratio: vec![1.0, 1.5, 2.0, 2.0],
            knee_db: vec![40.0; 4],
            limit_db: vec![100.0; 4],
        };
        let wdrc = WdrcSpec {
            attack_ms: 1.0,
            release_ms: 50.0,
            sample_rate: 24_000.0,
            max_db: 119.0,
            gain_db: 0.0,
            knee_db: 105.0,
            ratio: 10.0,
            limit_db: 105.0,
        };
        let mut aid = HearingAid::fit(&rx, &wdrc, 128, 32, Radix2Fft::new(64).unwrap()).unwrap();
        assert_eq!(aid.filterbank().channels(), 4);

        let mut x = tone(32 * 4);
        for chunk in x.chunks_exact_mut(32) {
            aid.process(chunk);
        }
        assert!(x.iter().all(|v| v.is_finite()));
        assert!(aid.compressor().channel_peak(3) > 0.0);
    }
}
