//! End-to-end tests of the streaming hearing-aid pipeline.
//!
//! Every test wires the same chain the firmware runs:
//!
//! ```text
//! capture queue → AudioInputQueue → HearingAid → AudioOutputQueue → playback queue
//! ```
//!
//! and checks:
//!
//! - **Pool accounting:** no block leaks after sustained streaming
//! - **Graceful exhaustion:** a tick without free blocks produces nothing
//! - **Compression:** 40 dB more input gives 20 dB more output at 2:1
//! - **Clone-on-write:** a node writing a shared block leaves other readers intact
//! - **Trigger servicing:** one pass per request, overruns counted

#[cfg(all(test, feature = "dsp"))]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use libm::{fabsf, sinf};

    use crate::block::AudioBlockPool;
    use crate::constants::{BlockSize, AUDIO_SAMPLE_RATE_24K};
    use crate::dsp::fft::Radix2Fft;
    use crate::dsp::prepare::{Prescription, WdrcSpec};
    use crate::error::DeliveryError;
    use crate::graph::{GraphBuilder, TickTrigger};
    use crate::io::{pop_i16, push_i16, AudioInputQueue, AudioOutputQueue, BlockQueue, SpscQueue};
    use crate::nodes::HearingAid;

    const WINDOW: usize = 128;
    const CHUNK: usize = 32;

    fn prescription() -> Prescription {
        Prescription {
            attack_ms: 5.0,
            release_ms: 50.0,
            max_db: 119.0,
            crossovers: vec![500.0, 2000.0, 5000.0],
            gain_db: vec![10.0; 4],
            ratio: vec![2.0; 4],
            knee_db: vec![40.0; 4],
            limit_db: vec![120.0; 4],
        }
    }

    fn wdrc() -> WdrcSpec {
        WdrcSpec {
            attack_ms: 1.0,
            release_ms: 50.0,
            sample_rate: AUDIO_SAMPLE_RATE_24K,
            max_db: 119.0,
            gain_db: 0.0,
            knee_db: 105.0,
            ratio: 10.0,
            limit_db: 105.0,
        }
    }

    fn hearing_aid() -> HearingAid<Radix2Fft> {
        HearingAid::fit(
            &prescription(),
            &wdrc(),
            WINDOW,
            CHUNK,
            Radix2Fft::new(2 * CHUNK).unwrap(),
        )
        .unwrap()
    }

    /// 1 kHz at 24 kHz.
    fn tone(amplitude: f32, start: usize, out: &mut [f32]) {
        let w = 2.0 * core::f32::consts::PI * 1000.0 / AUDIO_SAMPLE_RATE_24K;
        for (i, s) in out.iter_mut().enumerate() {
            *s = amplitude * sinf(w * (start + i) as f32);
        }
    }

    fn peak(x: &[f32]) -> f32 {
        x.iter().fold(0.0f32, |m, &v| m.max(fabsf(v)))
    }

    /// Stream `ticks` blocks of a tone and return the output peak over the
    /// last quarter of the run.
    fn steady_state_peak(amplitude: f32, ticks: usize) -> f32 {
        let pool = AudioBlockPool::new(BlockSize::S32, 8).unwrap();
        let from_adc: BlockQueue<'_, 4> = SpscQueue::new();
        let to_dac: BlockQueue<'_, 4> = SpscQueue::new();
        let mut b = GraphBuilder::new(&pool);
        let input = b.add_node(AudioInputQueue::new(&from_adc)).unwrap();
        let aid = b.add_node(hearing_aid()).unwrap();
        let output = b.add_node(AudioOutputQueue::new(&to_dac)).unwrap();
        b.connect(input, 0, aid, 0).unwrap();
        b.connect(aid, 0, output, 0).unwrap();
        let mut g = b.build();

        let mut level = 0.0f32;
        for t in 0..ticks {
            let mut block = pool.allocate().unwrap();
            tone(amplitude, t * CHUNK, &mut block);
            from_adc.push(block.into_shared()).unwrap();
            g.run_tick();
            let out = to_dac.pop().unwrap();
            if t >= ticks * 3 / 4 {
                level = level.max(peak(&out));
            }
        }
        level
    }

    // ═══════════════════════════════════════════════════════════════════
    //  Verification 1: sustained streaming, no leaks
    // ═══════════════════════════════════════════════════════════════════

    #[test]
    fn verify_streaming_without_leaks() {
        let pool = AudioBlockPool::new(BlockSize::S32, 8).unwrap();
        let from_adc: BlockQueue<'_, 4> = SpscQueue::new();
        let to_dac: BlockQueue<'_, 4> = SpscQueue::new();
        let mut b = GraphBuilder::new(&pool);
        let input = b.add_node(AudioInputQueue::new(&from_adc)).unwrap();
        let aid = b.add_node(hearing_aid()).unwrap();
        let output = b.add_node(AudioOutputQueue::new(&to_dac)).unwrap();
        b.connect(input, 0, aid, 0).unwrap();
        b.connect(aid, 0, output, 0).unwrap();
        let mut g = b.build();
        assert_eq!(g.node_name(aid), "hearing_aid");

        let mut samples = [0.0f32; CHUNK];
        let mut pcm = [0i16; CHUNK];
        let mut played = [0i16; CHUNK];
        for t in 0..200 {
            tone(0.25, t * CHUNK, &mut samples);
            for (p, &s) in pcm.iter_mut().zip(&samples) {
                *p = crate::io::convert::f32_to_i16(s);
            }
            push_i16(&pool, &from_adc, &pcm).unwrap();
            g.run_tick();
            assert!(pop_i16(&to_dac, &mut played), "tick {t} produced nothing");
            // Between ticks nothing is held except queued blocks.
            assert_eq!(pool.allocated_count(), 0, "leak after tick {t}");
        }

        assert!(played.iter().any(|&s| s != 0));
        assert_eq!(g.stats().ticks, 200);
        assert_eq!(g.stats().overwritten, 0);
        // One capture block, at most one copy in flight.
        assert!(pool.peak_count() <= 2);
    }

    // ═══════════════════════════════════════════════════════════════════
    //  Verification 2: pool exhaustion skips output, recovers afterwards
    // ═══════════════════════════════════════════════════════════════════

    #[test]
    fn verify_exhausted_pool_skips_tick() {
        let pool = AudioBlockPool::new(BlockSize::S32, 4).unwrap();
        let from_adc: BlockQueue<'_, 4> = SpscQueue::new();
        let to_dac: BlockQueue<'_, 4> = SpscQueue::new();
        let mut b = GraphBuilder::new(&pool);
        let input = b.add_node(AudioInputQueue::new(&from_adc)).unwrap();
        let aid = b.add_node(hearing_aid()).unwrap();
        let output = b.add_node(AudioOutputQueue::new(&to_dac)).unwrap();
        b.connect(input, 0, aid, 0).unwrap();
        b.connect(aid, 0, output, 0).unwrap();
        let mut g = b.build();

        let held: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();
        assert!(pool.allocate().is_err());
        assert_eq!(
            push_i16(&pool, &from_adc, &[100; CHUNK]),
            Err(DeliveryError::PoolExhausted(crate::error::PoolExhausted))
        );
        g.run_tick();
        assert!(to_dac.is_empty());

        drop(held);
        assert_eq!(pool.allocated_count(), 0);
        push_i16(&pool, &from_adc, &[100; CHUNK]).unwrap();
        g.run_tick();
        assert_eq!(to_dac.len(), 1);
        drop(g);
        while to_dac.pop().is_some() {}
        assert_eq!(pool.allocated_count(), 0);
    }

    // ═══════════════════════════════════════════════════════════════════
    //  Verification 3: 2:1 compression above the kneepoint
    // ═══════════════════════════════════════════════════════════════════

    #[test]
    fn verify_compression_ratio() {
        // -60 dBFS and -20 dBFS: 59 and 99 dB SPL, both above the 40 dB knee.
        let quiet = steady_state_peak(0.001, 120);
        let loud = steady_state_peak(0.1, 120);
        assert!(quiet > 0.0);
        let gain = loud / quiet;
        // 40 dB more input, 20 dB more output.
        assert!((9.0..11.0).contains(&gain), "loud/quiet = {gain}");
    }

    // ═══════════════════════════════════════════════════════════════════
    //  Verification 4: clone-on-write keeps the dry path intact
    // ═══════════════════════════════════════════════════════════════════

    #[test]
    fn verify_shared_input_is_copied_before_processing() {
        let pool = AudioBlockPool::new(BlockSize::S32, 8).unwrap();
        let from_adc: BlockQueue<'_, 4> = SpscQueue::new();
        let wet: BlockQueue<'_, 4> = SpscQueue::new();
        let dry: BlockQueue<'_, 4> = SpscQueue::new();
        let mut b = GraphBuilder::new(&pool);
        let input = b.add_node(AudioInputQueue::new(&from_adc)).unwrap();
        let aid = b.add_node(hearing_aid()).unwrap();
        let wet_out = b.add_node(AudioOutputQueue::new(&wet)).unwrap();
        let dry_out = b.add_node(AudioOutputQueue::new(&dry)).unwrap();
        b.connect(input, 0, aid, 0).unwrap();
        b.connect(input, 0, dry_out, 0).unwrap();
        b.connect(aid, 0, wet_out, 0).unwrap();
        let mut g = b.build();

        for t in 0..8 {
            let mut block = pool.allocate().unwrap();
            tone(0.05, t * CHUNK, &mut block);
            let expected: Vec<f32> = block.to_vec();
            let slot = block.slot();
            from_adc.push(block.into_shared()).unwrap();
            g.run_tick();

            let dry_block = dry.pop().unwrap();
            let wet_block = wet.pop().unwrap();
            assert_eq!(dry_block.slot(), slot);
            assert_ne!(wet_block.slot(), slot);
            assert_eq!(&dry_block[..], &expected[..]);
        }
        assert_eq!(pool.allocated_count(), 0);
    }

    // ═══════════════════════════════════════════════════════════════════
    //  Verification 5: trigger-driven servicing
    // ═══════════════════════════════════════════════════════════════════

    #[test]
    fn verify_trigger_driven_passes() {
        static TRIGGER: TickTrigger = TickTrigger::new();

        let pool = AudioBlockPool::new(BlockSize::S32, 8).unwrap();
        let from_adc: BlockQueue<'_, 8> = SpscQueue::new();
        let to_dac: BlockQueue<'_, 8> = SpscQueue::new();
        let mut b = GraphBuilder::new(&pool);
        let input = b.add_node(AudioInputQueue::new(&from_adc)).unwrap();
        let aid = b.add_node(hearing_aid()).unwrap();
        let output = b.add_node(AudioOutputQueue::new(&to_dac)).unwrap();
        b.connect(input, 0, aid, 0).unwrap();
        b.connect(aid, 0, output, 0).unwrap();
        let mut g = b.build();

        assert!(!g.service(&TRIGGER));
        for _ in 0..3 {
            push_i16(&pool, &from_adc, &[1000; CHUNK]).unwrap();
        }

        // Two requests before the audio context runs: one pass, one overrun.
        TRIGGER.request();
        TRIGGER.request();
        assert!(g.service(&TRIGGER));
        assert!(!g.service(&TRIGGER));
        assert_eq!(TRIGGER.overruns(), 1);
        assert_eq!(to_dac.len(), 1);
        assert_eq!(from_adc.len(), 2);

        TRIGGER.request();
        assert!(g.service(&TRIGGER));
        assert_eq!(g.stats().ticks, 2);
        assert_eq!(to_dac.len(), 2);

        drop(g);
        while from_adc.pop().is_some() {}
        while to_dac.pop().is_some() {}
        assert_eq!(pool.allocated_count(), 0);
    }
}
