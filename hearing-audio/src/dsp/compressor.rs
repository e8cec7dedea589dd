//! Wide dynamic range compression (WDRC) with envelope-driven gain.
//!
//! Every stage does the same three things per sample:
//!
//! 1. Track the signal's peak with an asymmetric one-pole follower
//!    ([`EnvelopeCoeffs`]), state carried across chunks.
//! 2. Convert the peak to a level, `max_db + 20·log10(peak)`, and read the gain
//!    off a three-region knee curve ([`KneeCurve`]).
//! 3. Multiply the **original** sample by the linear gain.
//!
//! [`Compressor`] chains three stages per tick: a broadband input stage
//! before the filterbank, one stage per channel, and a broadband output stage
//! after synthesis. Input and output share knee parameters but keep separate
//! envelope state.

use alloc::vec::Vec;

use crate::constants::MAX_CHANNELS;
use crate::error::ConfigError;

use super::fast_math::{from_db, to_db, Approximation, DbScale};

/// Residual slope of the output level above the limiter threshold.
pub const LIMITER_SLOPE: f32 = 0.1;

/// Envelope follower coefficients.
///
/// `attack` and `release` are pole positions in `[0, 1)`: larger is slower.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeCoeffs {
    /// Smoothing applied while the input is at or above the peak.
    pub attack: f32,
    /// Per-sample decay factor while the input is below the peak.
    pub release: f32,
}

impl EnvelopeCoeffs {
    /// Advance the follower by one sample and return the new peak.
    #[inline]
    pub fn step(&self, peak: f32, x: f32) -> f32 {
        let mag = libm::fabsf(x);
        if mag >= peak {
            self.attack * peak + (1.0 - self.attack) * mag
        } else {
            self.release * peak
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_unit("attack", self.attack)?;
        check_unit("release", self.release)
    }
}

/// Follow the peak of `x`, writing the per-sample trace to `trace`.
///
/// `peak` is the follower state: read at the start, updated at the end.
pub fn envelope_follow(x: &[f32], peak: &mut f32, coeffs: EnvelopeCoeffs, trace: &mut [f32]) {
    let mut p = *peak;
    for (t, &s) in trace.iter_mut().zip(x) {
        p = coeffs.step(p, s);
        *t = p;
    }
    *peak = p;
}

/// Compressor knee parameters, all in dB (ratio excepted).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KneeParams {
    /// Gain applied below the kneepoint.
    pub gain_db: f32,
    /// Input level where compression starts.
    pub knee_db: f32,
    /// Compression ratio (input dB per output dB above the knee).
    pub ratio: f32,
    /// Output level the limiter holds.
    pub limit_db: f32,
}

impl KneeParams {
    fn validate(&self) -> Result<(), ConfigError> {
        check_finite("gain_db", self.gain_db)?;
        check_finite("knee_db", self.knee_db)?;
        check_finite("limit_db", self.limit_db)?;
        if !(self.ratio > 0.0 && self.ratio.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "ratio",
                value: self.ratio,
            });
        }
        Ok(())
    }
}

/// A knee curve with its derived constants precomputed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KneeCurve {
    gain_db: f32,
    /// Kneepoint, lowered so `knee_db + gain_db <= limit_db`.
    knee_db: f32,
    ratio: f32,
    limit_db: f32,
    /// `1/ratio - 1`.
    slope: f32,
    /// Output level at the kneepoint minus `knee_db / ratio`.
    offset_db: f32,
    /// Input level where the compressive segment meets the limiter.
    limit_in_db: f32,
}

impl KneeCurve {
    /// Precompute the curve. `params` must already be validated.
    pub fn new(params: KneeParams) -> Self {
        let KneeParams {
            gain_db,
            mut knee_db,
            ratio,
            limit_db,
        } = params;
        if knee_db + gain_db > limit_db {
            knee_db = limit_db - gain_db;
        }
        let offset_db = gain_db + knee_db * (1.0 - 1.0 / ratio);
        KneeCurve {
            gain_db,
            knee_db,
            ratio,
            limit_db,
            slope: 1.0 / ratio - 1.0,
            offset_db,
            limit_in_db: ratio * (limit_db - offset_db),
        }
    }

    /// Gain in dB for an input level in dB.
    #[inline]
    pub fn gain_db(&self, level_db: f32) -> f32 {
        if level_db < self.knee_db && self.ratio >= 1.0 {
            self.gain_db
        } else if level_db > self.limit_in_db {
            self.limit_db + (level_db - self.limit_in_db) * LIMITER_SLOPE - level_db
        } else {
            self.slope * level_db + self.offset_db
        }
    }

    /// Effective kneepoint after clamping.
    pub fn knee_db(&self) -> f32 {
        self.knee_db
    }

    /// Input level at which limiting starts.
    pub fn limiter_input_db(&self) -> f32 {
        self.limit_in_db
    }
}

/// Gain in dB for every level in `levels_db`.
pub fn wdrc_gain(levels_db: &[f32], curve: &KneeCurve, gains_db: &mut [f32]) {
    for (g, &level) in gains_db.iter_mut().zip(levels_db) {
        *g = curve.gain_db(level);
    }
}

/// Envelope and knee settings for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelParams {
    /// Knee parameters.
    pub knee: KneeParams,
    /// Envelope follower.
    pub envelope: EnvelopeCoeffs,
}

/// Everything the compressor chain needs, derived once from a prescription.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressorConfig {
    /// Level in dB SPL of a full-scale (1.0) peak.
    pub max_db: f32,
    /// Knee shared by the input and output stages.
    pub broadband: KneeParams,
    /// Envelope shared by the input and output stages.
    pub broadband_envelope: EnvelopeCoeffs,
    /// One entry per filterbank channel.
    pub channels: Vec<ChannelParams>,
    /// dB conversion strategy.
    pub approximation: Approximation,
}

impl CompressorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_finite("max_db", self.max_db)?;
        if self.channels.is_empty() || self.channels.len() > MAX_CHANNELS {
            return Err(ConfigError::ChannelCount(self.channels.len()));
        }
        self.broadband.validate()?;
        self.broadband_envelope.validate()?;
        for ch in &self.channels {
            ch.knee.validate()?;
            ch.envelope.validate()?;
        }
        Ok(())
    }
}

struct Stage {
    curve: KneeCurve,
    envelope: EnvelopeCoeffs,
    peak: f32,
}

impl Stage {
    fn new(knee: KneeParams, envelope: EnvelopeCoeffs) -> Self {
        Stage {
            curve: KneeCurve::new(knee),
            envelope,
            peak: 0.0,
        }
    }

    /// Follow, look up and apply the gain in place.
    fn process(&mut self, x: &mut [f32], max_db: f32, approx: Approximation) {
        let mut peak = self.peak;
        for s in x.iter_mut() {
            peak = self.envelope.step(peak, *s);
            let level = max_db + to_db(peak, DbScale::Amplitude, approx);
            *s *= from_db(self.curve.gain_db(level), DbScale::Amplitude, approx);
        }
        self.peak = peak;
    }
}

/// The three-stage WDRC chain with its envelope state.
pub struct Compressor {
    max_db: f32,
    approx: Approximation,
    input: Stage,
    output: Stage,
    channels: Vec<Stage>,
}

impl Compressor {
    /// Validate `config` and precompute the knee curves.
    pub fn new(config: &CompressorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "compressor: {} channels, max {} dB",
            config.channels.len(),
            config.max_db
        );

        Ok(Compressor {
            max_db: config.max_db,
            approx: config.approximation,
            input: Stage::new(config.broadband, config.broadband_envelope),
            output: Stage::new(config.broadband, config.broadband_envelope),
            channels: config
                .channels
                .iter()
                .map(|ch| Stage::new(ch.knee, ch.envelope))
                .collect(),
        })
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// Broadband compression before the filterbank (envelope slot 0).
    pub fn process_input(&mut self, x: &mut [f32]) {
        self.input.process(x, self.max_db, self.approx);
    }

    /// Per-channel compression of `nc` consecutive equal-length band signals.
    ///
    /// `bands.len()` must be a multiple of the channel count. Debug builds
    /// assert this; release builds leave a mis-sized buffer untouched.
    pub fn process_channels(&mut self, bands: &mut [f32]) {
        let nc = self.channels.len();
        debug_assert_eq!(bands.len() % nc, 0, "process_channels: band buffer size");
        let cs = bands.len() / nc;
        if cs == 0 || cs * nc != bands.len() {
            return;
        }
        for (stage, band) in self.channels.iter_mut().zip(bands.chunks_exact_mut(cs)) {
            stage.process(band, self.max_db, self.approx);
        }
    }

    /// Broadband compression after synthesis (envelope slot 1).
    pub fn process_output(&mut self, x: &mut [f32]) {
        self.output.process(x, self.max_db, self.approx);
    }

    /// Envelope state of the input stage.
    pub fn input_peak(&self) -> f32 {
        self.input.peak
    }

    /// Envelope state of the output stage.
    pub fn output_peak(&self) -> f32 {
        self.output.peak
    }

    /// Envelope state of channel `k`.
    pub fn channel_peak(&self, k: usize) -> f32 {
        self.channels[k].peak
    }

    /// Zero every envelope.
    pub fn reset(&mut self) {
        self.input.peak = 0.0;
        self.output.peak = 0.0;
        for stage in &mut self.channels {
            stage.peak = 0.0;
        }
    }
}

fn check_finite(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

fn check_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use libm::{fabsf, logf};

    const KNEE: KneeParams = KneeParams {
        gain_db: 20.0,
        knee_db: 45.0,
        ratio: 3.0,
        limit_db: 100.0,
    };

    const ENV: EnvelopeCoeffs = EnvelopeCoeffs {
        attack: 0.9,
        release: 0.99,
    };

    fn config(channels: usize) -> CompressorConfig {
        CompressorConfig {
            max_db: 119.0,
            broadband: KNEE,
            broadband_envelope: ENV,
            channels: vec![
                ChannelParams {
                    knee: KNEE,
                    envelope: ENV,
                };
                channels
            ],
            approximation: Approximation::DEFAULT,
        }
    }

    #[test]
    fn constant_gain_below_knee() {
        let curve = KneeCurve::new(KNEE);
        for level in [-40.0, 0.0, 20.0, 44.9] {
            assert_eq!(curve.gain_db(level), 20.0);
        }
    }

    #[test]
    fn compressive_slope_between_knee_and_limiter() {
        let curve = KneeCurve::new(KNEE);
        let g1 = curve.gain_db(50.0);
        let g2 = curve.gain_db(65.0);
        // 15 dB more input, 5 dB more output at 3:1
        assert!(fabsf((65.0 + g2) - (50.0 + g1) - 5.0) < 1e-4);
        // continuous at the knee
        assert!(fabsf(curve.gain_db(45.0) - 20.0) < 1e-4);
    }

    #[test]
    fn output_level_is_monotonic() {
        let curve = KneeCurve::new(KNEE);
        let mut prev = f32::NEG_INFINITY;
        for i in 0..2000 {
            let level = -20.0 + i as f32 * 0.1;
            let out = level + curve.gain_db(level);
            assert!(out >= prev - 1e-4, "output fell at {level}");
            prev = out;
        }
    }

    #[test]
    fn limiter_bounds_output() {
        let curve = KneeCurve::new(KNEE);
        let start = curve.limiter_input_db();
        assert!(fabsf(start + curve.gain_db(start) - 100.0) < 1e-3);
        for level in [start + 1.0, start + 10.0, start + 60.0] {
            let out = level + curve.gain_db(level);
            let bound = 100.0 + (level - start) * LIMITER_SLOPE;
            assert!(out <= bound + 1e-3, "{level} dB in -> {out} dB out");
            assert!(out > 100.0);
        }
    }

    #[test]
    fn kneepoint_clamped_below_limiter() {
        let curve = KneeCurve::new(KneeParams {
            gain_db: 30.0,
            knee_db: 80.0,
            ratio: 2.0,
            limit_db: 90.0,
        });
        assert_eq!(curve.knee_db(), 60.0);
        assert!(fabsf(60.0 + curve.gain_db(60.0) - 90.0) < 1e-4);
    }

    #[test]
    fn wdrc_gain_over_slice() {
        let curve = KneeCurve::new(KNEE);
        let levels = [10.0, 45.0, 60.0];
        let mut gains = [0.0; 3];
        wdrc_gain(&levels, &curve, &mut gains);
        for (g, l) in gains.iter().zip(levels) {
            assert_eq!(*g, curve.gain_db(l));
        }
    }

    /// Samples for `coeff^n` to fall below 1%.
    fn settle(coeff: f32) -> usize {
        (logf(0.01) / logf(coeff)) as usize + 1
    }

    #[test]
    fn envelope_step_response() {
        let a = 0.5;
        let x = vec![a; 200];
        let mut trace = vec![0.0; 200];
        let mut peak = 0.0;
        envelope_follow(&x, &mut peak, ENV, &mut trace);

        let n = settle(ENV.attack);
        assert!(trace[n - 1] >= 0.99 * a);
        assert!(trace[n / 2] < 0.99 * a);
        assert_eq!(peak, trace[199]);

        let silence = vec![0.0; 1000];
        let mut decay = vec![0.0; 1000];
        envelope_follow(&silence, &mut peak, ENV, &mut decay);
        let n = settle(ENV.release);
        assert!(decay[n - 1] <= 0.01 * a * 1.001);
        assert!(decay[n / 2] > 0.01 * a);
    }

    #[test]
    fn envelope_state_persists_across_chunks() {
        let x: Vec<f32> = (0..64).map(|i| if i % 3 == 0 { 0.8 } else { -0.2 }).collect();
        let mut whole = vec![0.0; 64];
        let mut peak = 0.0;
        envelope_follow(&x, &mut peak, ENV, &mut whole);

        let mut split = vec![0.0; 64];
        let mut peak2 = 0.0;
        envelope_follow(&x[..20], &mut peak2, ENV, &mut split[..20]);
        envelope_follow(&x[20..], &mut peak2, ENV, &mut split[20..]);
        assert_eq!(whole, split);
        assert_eq!(peak, peak2);
    }

    #[test]
    fn quiet_signal_gets_knee_gain() {
        let mut comp = Compressor::new(&config(1)).unwrap();
        // -100 dBFS + 119 = 19 dB SPL, below the 45 dB knee: +20 dB
        let amp = 1e-5;
        let mut x = vec![amp; 256];
        comp.process_input(&mut x);
        let gain = x[255] / amp;
        assert!(fabsf(gain - 10.0) < 0.01, "gain {gain}");
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "band buffer size"))]
    fn mis_sized_bands_are_rejected() {
        let mut comp = Compressor::new(&config(4)).unwrap();
        let mut bands = vec![0.5; 4 * 32 + 1];
        comp.process_channels(&mut bands);
        assert!(bands.iter().all(|&v| v == 0.5));
        assert_eq!(comp.channel_peak(0), 0.0);
    }

    #[test]
    fn stages_keep_separate_envelopes() {
        let mut comp = Compressor::new(&config(4)).unwrap();
        let mut x = vec![0.5; 32];
        comp.process_input(&mut x);
        assert!(comp.input_peak() > 0.0);
        assert_eq!(comp.output_peak(), 0.0);
        assert_eq!(comp.channel_peak(0), 0.0);

        let mut bands = vec![0.0; 4 * 32];
        bands[2 * 32..3 * 32].fill(0.25);
        comp.process_channels(&mut bands);
        assert_eq!(comp.channel_peak(0), 0.0);
        assert!(comp.channel_peak(2) > 0.0);

        comp.reset();
        assert_eq!(comp.input_peak(), 0.0);
        assert_eq!(comp.channel_peak(2), 0.0);
    }

    #[test]
    fn loud_input_is_limited() {
        let knee = KneeParams {
            limit_db: 80.0,
            ..KNEE
        };
        let mut cfg = config(1);
        cfg.broadband = knee;
        let mut comp = Compressor::new(&cfg).unwrap();
        // full scale = 119 dB SPL; limiting starts at 90 dB in
        let start = KneeCurve::new(knee).limiter_input_db();
        assert!(fabsf(start - 90.0) < 1e-4);

        let mut x = vec![1.0; 4096];
        comp.process_output(&mut x);
        let out_db = 119.0 + 20.0 * libm::log10f(x[4095]);
        assert!(out_db <= 80.0 + (119.0 - start) * LIMITER_SLOPE + 0.01, "{out_db}");
        assert!(out_db > 80.0);
    }

    #[test]
    fn rejects_bad_parameters() {
        let mut bad = config(2);
        bad.channels[1].knee.ratio = 0.0;
        assert_eq!(
            Compressor::new(&bad).err(),
            Some(ConfigError::InvalidParameter { name: "ratio", value: 0.0 })
        );

        let mut bad = config(2);
        bad.broadband.gain_db = f32::NAN;
        assert!(Compressor::new(&bad).is_err());

        let mut bad = config(2);
        bad.broadband_envelope.release = 1.0;
        assert!(Compressor::new(&bad).is_err());

        assert_eq!(
            Compressor::new(&config(0)).err(),
            Some(ConfigError::ChannelCount(0))
        );
    }
}
