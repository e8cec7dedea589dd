//! FFT overlap-add FIR filterbank.
//!
//! Splits each chunk of `cs` input samples into `nc` band signals, each the
//! input convolved with that channel's `nw`-tap FIR filter, and sums bands back
//! into one signal. Two regimes, chosen from the sizes:
//!
//! - **Short chunk** (`cs < nw`): each filter is partitioned into `nw / cs`
//!   sub-windows of `cs` taps. One forward transform of the zero-padded chunk
//!   (length `2·cs`) is multiplied with every sub-window spectrum, and each
//!   inverse is accumulated into the channel's tail at offset `j·cs`.
//! - **Long chunk** (`cs >= nw`): the chunk is walked in `nw`-sample segments
//!   (the last may be partial). Each zero-padded segment (length `2·nw`) is
//!   transformed once, multiplied per channel and overlap-added with the
//!   channel's `nw`-sample tail.
//!
//! Only the non-negative-frequency bins are multiplied; the negative half is
//! rebuilt by conjugate symmetry before the inverse transform.

use alloc::vec;
use alloc::vec::Vec;

use crate::constants::MAX_CHANNELS;
use crate::error::ConfigError;

use super::fft::{rebuild_negative_bins, Complex32, FftBackend};

const ZERO: Complex32 = Complex32 { re: 0.0, im: 0.0 };

/// Which overlap-add scheme a size combination uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// `cs < nw`: partitioned filter, one transform per chunk.
    ShortChunk,
    /// `cs >= nw`: whole filter, one transform per `nw` segment.
    LongChunk,
}

/// Frequency-domain filter coefficients for every channel.
///
/// Layout: channel-major, then sub-window-major, then bin. Each entry holds
/// the `N/2 + 1` non-negative-frequency bins of a length-`N` transform, with
/// the inverse transform's `1/N` scale already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterbankCoefficients {
    channels: usize,
    window: usize,
    chunk: usize,
    bins: Vec<Complex32>,
}

impl FilterbankCoefficients {
    /// Wrap externally prepared bins after validating the layout.
    pub fn from_bins(
        channels: usize,
        window: usize,
        chunk: usize,
        bins: Vec<Complex32>,
    ) -> Result<Self, ConfigError> {
        validate_sizes(channels, window, chunk)?;
        let coeffs = FilterbankCoefficients {
            channels,
            window,
            chunk,
            bins,
        };
        let expected = channels * coeffs.sub_windows() * coeffs.bins_per_entry();
        if coeffs.bins.len() != expected {
            return Err(ConfigError::CoefficientLength {
                expected,
                actual: coeffs.bins.len(),
            });
        }
        Ok(coeffs)
    }

    /// Transform `channels` time-domain FIR filters of `window` taps each
    /// (concatenated channel by channel) with `fft`.
    pub fn from_taps<B: FftBackend>(
        taps: &[f32],
        channels: usize,
        window: usize,
        chunk: usize,
        fft: &mut B,
    ) -> Result<Self, ConfigError> {
        validate_sizes(channels, window, chunk)?;
        if taps.len() != channels * window {
            return Err(ConfigError::CoefficientLength {
                expected: channels * window,
                actual: taps.len(),
            });
        }
        let n = transform_len(window, chunk);
        if fft.len() != n {
            return Err(ConfigError::TransformLength {
                expected: n,
                actual: fft.len(),
            });
        }

        let (segment, sub_windows) = match regime(window, chunk) {
            Regime::ShortChunk => (chunk, window / chunk),
            Regime::LongChunk => (window, 1),
        };
        let nf = n / 2 + 1;
        let scale = 1.0 / n as f32;

        let mut bins = Vec::with_capacity(channels * sub_windows * nf);
        let mut buf = vec![ZERO; n];
        for channel in taps.chunks_exact(window) {
            for part in channel.chunks_exact(segment) {
                buf.fill(ZERO);
                for (b, &t) in buf.iter_mut().zip(part) {
                    b.re = t;
                }
                fft.forward(&mut buf);
                bins.extend(buf[..nf].iter().map(|&b| b * scale));
            }
        }

        Ok(FilterbankCoefficients {
            channels,
            window,
            chunk,
            bins,
        })
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// FIR length in samples.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Samples per chunk.
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// Regime implied by the sizes.
    pub fn regime(&self) -> Regime {
        regime(self.window, self.chunk)
    }

    /// FFT length the filterbank needs.
    pub fn transform_len(&self) -> usize {
        transform_len(self.window, self.chunk)
    }

    fn sub_windows(&self) -> usize {
        match self.regime() {
            Regime::ShortChunk => self.window / self.chunk,
            Regime::LongChunk => 1,
        }
    }

    fn bins_per_entry(&self) -> usize {
        self.transform_len() / 2 + 1
    }

    /// Bins of one channel's sub-window.
    fn entry(&self, channel: usize, sub_window: usize) -> &[Complex32] {
        let nf = self.bins_per_entry();
        let start = (channel * self.sub_windows() + sub_window) * nf;
        &self.bins[start..start + nf]
    }
}

fn regime(window: usize, chunk: usize) -> Regime {
    if chunk < window {
        Regime::ShortChunk
    } else {
        Regime::LongChunk
    }
}

fn transform_len(window: usize, chunk: usize) -> usize {
    match regime(window, chunk) {
        Regime::ShortChunk => 2 * chunk,
        Regime::LongChunk => 2 * window,
    }
}

fn validate_sizes(channels: usize, window: usize, chunk: usize) -> Result<(), ConfigError> {
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(ConfigError::ChannelCount(channels));
    }
    let ok = chunk > 0
        && window > 0
        && match regime(window, chunk) {
            Regime::ShortChunk => chunk.is_power_of_two() && window % chunk == 0,
            Regime::LongChunk => window.is_power_of_two(),
        };
    if !ok {
        #[cfg(feature = "tracing")]
        tracing::warn!("filterbank: chunk {chunk} incompatible with window {window}");
        return Err(ConfigError::IncompatibleSizes { chunk, window });
    }
    Ok(())
}

/// Streaming filterbank: coefficients, transform backend and overlap state.
pub struct Filterbank<B> {
    coeffs: FilterbankCoefficients,
    fft: B,
    spectrum: Vec<Complex32>,
    product: Vec<Complex32>,
    /// Per-channel overlap tails, `tail_len()` samples each.
    tails: Vec<f32>,
}

impl<B: FftBackend> Filterbank<B> {
    /// Pair coefficients with a backend of the matching transform length.
    pub fn new(coeffs: FilterbankCoefficients, fft: B) -> Result<Self, ConfigError> {
        let n = coeffs.transform_len();
        if fft.len() != n {
            #[cfg(feature = "tracing")]
            tracing::warn!("filterbank: backend length {} != {}", fft.len(), n);
            return Err(ConfigError::TransformLength {
                expected: n,
                actual: fft.len(),
            });
        }
        let tail_len = match coeffs.regime() {
            Regime::ShortChunk => coeffs.window + coeffs.chunk,
            Regime::LongChunk => coeffs.window,
        };
        let tails = vec![0.0; coeffs.channels * tail_len];

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "filterbank: {} channels, window {}, chunk {}, {:?}",
            coeffs.channels,
            coeffs.window,
            coeffs.chunk,
            coeffs.regime()
        );

        Ok(Filterbank {
            coeffs,
            fft,
            spectrum: vec![ZERO; n],
            product: vec![ZERO; n],
            tails,
        })
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.coeffs.channels
    }

    /// Samples per chunk.
    pub fn chunk(&self) -> usize {
        self.coeffs.chunk
    }

    /// The coefficients in use.
    pub fn coefficients(&self) -> &FilterbankCoefficients {
        &self.coeffs
    }

    /// Clear the overlap state, as if only silence had been processed.
    pub fn reset(&mut self) {
        self.tails.fill(0.0);
    }

    /// Split one chunk into bands.
    ///
    /// `bands` receives channel `k` at `bands[k·cs..(k+1)·cs]`.
    ///
    /// `x` must be `cs` samples and `bands` `nc·cs` samples. Debug builds
    /// assert this; release builds return without touching `bands`.
    pub fn analyze(&mut self, x: &[f32], bands: &mut [f32]) {
        let cs = self.coeffs.chunk;
        debug_assert_eq!(x.len(), cs, "analyze: input is not one chunk");
        debug_assert_eq!(bands.len(), self.coeffs.channels * cs, "analyze: band buffer size");
        if x.len() != cs || bands.len() != self.coeffs.channels * cs {
            return;
        }
        match self.coeffs.regime() {
            Regime::ShortChunk => self.analyze_short(x, bands),
            Regime::LongChunk => self.analyze_long(x, bands),
        }
    }

    fn analyze_short(&mut self, x: &[f32], bands: &mut [f32]) {
        let cs = self.coeffs.chunk;
        let nw = self.coeffs.window;
        let n = 2 * cs;
        let nf = cs + 1;
        let tail_len = nw + cs;

        load_real(&mut self.spectrum, x);
        self.fft.forward(&mut self.spectrum);

        for (k, (band, tail)) in bands
            .chunks_exact_mut(cs)
            .zip(self.tails.chunks_exact_mut(tail_len))
            .enumerate()
        {
            for j in 0..nw / cs {
                let h = self.coeffs.entry(k, j);
                self.fft
                    .multiply(&mut self.product[..nf], &self.spectrum[..nf], h);
                rebuild_negative_bins(&mut self.product);
                self.fft.inverse(&mut self.product);
                for (t, p) in tail[j * cs..j * cs + n].iter_mut().zip(&self.product) {
                    *t += p.re;
                }
            }
            band.copy_from_slice(&tail[..cs]);
            tail.copy_within(cs.., 0);
            tail[nw..].fill(0.0);
        }
    }

    fn analyze_long(&mut self, x: &[f32], bands: &mut [f32]) {
        let cs = self.coeffs.chunk;
        let nw = self.coeffs.window;
        let nf = nw + 1;

        let mut start = 0;
        while start < cs {
            let ni = nw.min(cs - start);
            load_real(&mut self.spectrum, &x[start..start + ni]);
            self.fft.forward(&mut self.spectrum);

            for (k, (band, tail)) in bands
                .chunks_exact_mut(cs)
                .zip(self.tails.chunks_exact_mut(nw))
                .enumerate()
            {
                let h = self.coeffs.entry(k, 0);
                self.fft
                    .multiply(&mut self.product[..nf], &self.spectrum[..nf], h);
                rebuild_negative_bins(&mut self.product);
                self.fft.inverse(&mut self.product);

                for i in 0..ni {
                    band[start + i] = self.product[i].re + tail[i];
                }
                // The part of the old tail not yet emitted carries into the new one.
                for i in 0..nw {
                    let carried = if ni + i < nw { tail[ni + i] } else { 0.0 };
                    tail[i] = self.product[ni + i].re + carried;
                }
            }
            start += ni;
        }
    }

    /// Sum `nc` band signals sample by sample into one chunk, unweighted.
    ///
    /// `bands` must be `nc·cs` samples and `y` `cs` samples. Debug builds
    /// assert this; release builds return without touching `y`.
    pub fn synthesize(&self, bands: &[f32], y: &mut [f32]) {
        let cs = self.coeffs.chunk;
        debug_assert_eq!(y.len(), cs, "synthesize: output is not one chunk");
        debug_assert_eq!(bands.len(), self.coeffs.channels * cs, "synthesize: band buffer size");
        if y.len() != cs || bands.len() != self.coeffs.channels * cs {
            return;
        }
        y.copy_from_slice(&bands[..cs]);
        for band in bands[cs..].chunks_exact(cs) {
            for (out, &b) in y.iter_mut().zip(band) {
                *out += b;
            }
        }
    }
}

/// Copy `x` into the real parts of `buf` and zero everything else.
fn load_real(buf: &mut [Complex32], x: &[f32]) {
    buf.fill(ZERO);
    for (b, &s) in buf.iter_mut().zip(x) {
        b.re = s;
    }
}
