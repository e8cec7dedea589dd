//! Turn a fitting prescription into filterbank and compressor coefficients.
//!
//! Runs once at startup, off the audio path. Nothing in the streaming core
//! reads a [`Prescription`]; it only sees the [`FilterbankCoefficients`] and
//! [`CompressorConfig`] produced here.

use alloc::vec::Vec;

use crate::constants::MAX_CHANNELS;
use crate::error::ConfigError;

use super::compressor::{ChannelParams, CompressorConfig, EnvelopeCoeffs, KneeParams};
use super::fast_math::Approximation;
use super::fft::FftBackend;
use super::filterbank::FilterbankCoefficients;

/// Per-channel hearing-aid prescription.
///
/// Channel `k` spans `crossovers[k-1]..crossovers[k]` Hz, so there is one
/// crossover fewer than channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Prescription {
    /// Attack time of the channel envelopes, in ms.
    pub attack_ms: f32,
    /// Release time of the channel envelopes, in ms.
    pub release_ms: f32,
    /// Level of a full-scale signal, in dB SPL. Must match the
    /// [`WdrcSpec::max_db`] it is fitted with.
    pub max_db: f32,
    /// Band edges in Hz, strictly ascending.
    pub crossovers: Vec<f32>,
    /// Compression-start gain per channel, in dB.
    pub gain_db: Vec<f32>,
    /// Compression ratio per channel.
    pub ratio: Vec<f32>,
    /// Compression-start kneepoint per channel, in dB SPL.
    pub knee_db: Vec<f32>,
    /// Output limiting threshold per channel, in dB SPL.
    pub limit_db: Vec<f32>,
}

impl Prescription {
    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.gain_db.len()
    }
}

/// Broadband WDRC settings for the input and output stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WdrcSpec {
    /// Attack time, in ms.
    pub attack_ms: f32,
    /// Release time, in ms.
    pub release_ms: f32,
    /// Sample rate, in Hz.
    pub sample_rate: f32,
    /// Level of a full-scale signal, in dB SPL.
    pub max_db: f32,
    /// Compression-start gain, in dB.
    pub gain_db: f32,
    /// Compression-start kneepoint, in dB SPL.
    pub knee_db: f32,
    /// Compression ratio.
    pub ratio: f32,
    /// Output limiting threshold, in dB SPL.
    pub limit_db: f32,
}

/// Envelope coefficients from ANSI S3.22 attack and release times.
pub fn envelope_coeffs(attack_ms: f32, release_ms: f32, sample_rate: f32) -> EnvelopeCoeffs {
    let a = f64::from(attack_ms) * f64::from(sample_rate) / 2425.0;
    let r = f64::from(release_ms) * f64::from(sample_rate) / 1782.0;
    EnvelopeCoeffs {
        attack: (a / (1.0 + a)) as f32,
        release: (r / (10.0 + r)) as f32,
    }
}

/// Build the compressor chain settings.
pub fn prepare_compressor(
    rx: &Prescription,
    wdrc: &WdrcSpec,
) -> Result<CompressorConfig, ConfigError> {
    let nc = rx.channels();
    if nc == 0 || nc > MAX_CHANNELS {
        return Err(ConfigError::ChannelCount(nc));
    }
    for len in [rx.ratio.len(), rx.knee_db.len(), rx.limit_db.len(), rx.crossovers.len() + 1] {
        if len != nc {
            return Err(ConfigError::ChannelMismatch {
                expected: nc,
                actual: len,
            });
        }
    }
    check_time("attack_ms", rx.attack_ms)?;
    check_time("release_ms", rx.release_ms)?;
    check_time("attack_ms", wdrc.attack_ms)?;
    check_time("release_ms", wdrc.release_ms)?;
    if !rx.max_db.is_finite() || rx.max_db != wdrc.max_db {
        return Err(ConfigError::InvalidParameter {
            name: "max_db",
            value: rx.max_db,
        });
    }
    if !(wdrc.sample_rate > 0.0 && wdrc.sample_rate.is_finite()) {
        return Err(ConfigError::InvalidParameter {
            name: "sample_rate",
            value: wdrc.sample_rate,
        });
    }

    let channel_env = envelope_coeffs(rx.attack_ms, rx.release_ms, wdrc.sample_rate);
    let channels = (0..nc)
        .map(|k| ChannelParams {
            knee: KneeParams {
                gain_db: rx.gain_db[k],
                knee_db: rx.knee_db[k],
                ratio: rx.ratio[k],
                limit_db: rx.limit_db[k],
            },
            envelope: channel_env,
        })
        .collect();

    Ok(CompressorConfig {
        max_db: wdrc.max_db,
        broadband: KneeParams {
            gain_db: wdrc.gain_db,
            knee_db: wdrc.knee_db,
            ratio: wdrc.ratio,
            limit_db: wdrc.limit_db,
        },
        broadband_envelope: envelope_coeffs(wdrc.attack_ms, wdrc.release_ms, wdrc.sample_rate),
        channels,
        approximation: Approximation::DEFAULT,
    })
}

/// Design complementary band-pass FIR filters, `window` taps per channel.
///
/// Channel `k` is the difference of Hamming-windowed sinc low-passes at
/// `crossovers[k]` and `crossovers[k-1]`; the lowest channel starts at DC and
/// the highest ends with an impulse at the centre tap. The channels therefore
/// sum to a pure delay of `window / 2` samples.
///
/// Returns `crossovers.len() + 1` filters concatenated channel by channel.
pub fn design_filterbank_taps(
    crossovers: &[f32],
    sample_rate: f32,
    window: usize,
) -> Result<Vec<f32>, ConfigError> {
    let nc = crossovers.len() + 1;
    if nc > MAX_CHANNELS {
        return Err(ConfigError::ChannelCount(nc));
    }
    if window < 2 || window % 2 != 0 {
        return Err(ConfigError::InvalidParameter {
            name: "window",
            value: window as f32,
        });
    }
    let nyquist = sample_rate / 2.0;
    let mut prev = 0.0;
    for &f in crossovers {
        if !(f > prev && f < nyquist) {
            return Err(ConfigError::Crossover);
        }
        prev = f;
    }

    let centre = window / 2;
    let fs = f64::from(sample_rate);
    let hamming = |n: usize| {
        0.54 - 0.46 * libm::cos(2.0 * core::f64::consts::PI * n as f64 / window as f64)
    };
    // Windowed ideal low-pass at `cutoff` Hz; `None` is the all-pass impulse.
    let lowpass = |cutoff: Option<f64>, n: usize| -> f64 {
        let d = n as f64 - centre as f64;
        match cutoff {
            None => {
                if n == centre {
                    1.0
                } else {
                    0.0
                }
            }
            Some(fc) => {
                let w = 2.0 * fc / fs;
                let ideal = if n == centre {
                    w
                } else {
                    libm::sin(core::f64::consts::PI * w * d) / (core::f64::consts::PI * d)
                };
                ideal * hamming(n)
            }
        }
    };

    let edge = |k: usize| -> Option<f64> { crossovers.get(k).map(|&f| f64::from(f)) };
    let mut taps = Vec::with_capacity(nc * window);
    for k in 0..nc {
        for n in 0..window {
            let upper = lowpass(edge(k), n);
            let lower = if k == 0 { 0.0 } else { lowpass(edge(k - 1), n) };
            taps.push((upper - lower) as f32);
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("prepare: {nc} bands, {window} taps, fs {sample_rate}");

    Ok(taps)
}

/// Design the filterbank for `rx` and transform it with `fft`.
pub fn prepare_filterbank<B: FftBackend>(
    rx: &Prescription,
    sample_rate: f32,
    window: usize,
    chunk: usize,
    fft: &mut B,
) -> Result<FilterbankCoefficients, ConfigError> {
    if rx.crossovers.len() + 1 != rx.channels() {
        return Err(ConfigError::ChannelMismatch {
            expected: rx.channels(),
            actual: rx.crossovers.len() + 1,
        });
    }
    let taps = design_filterbank_taps(&rx.crossovers, sample_rate, window)?;
    FilterbankCoefficients::from_taps(&taps, rx.channels(), window, chunk, fft)
}

fn check_time(name: &'static str, ms: f32) -> Result<(), ConfigError> {
    if ms >= 0.0 && ms.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value: ms })
    }
}
