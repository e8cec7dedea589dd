//! FFT backend contract used by the filterbank.
//!
//! The filterbank only needs an in-place complex transform of one fixed
//! power-of-two length plus an element-wise complex multiply. Any
//! implementation (a CMSIS-DSP binding, a hardware accelerator, `rustfft` on
//! the host) plugs in through [`FftBackend`].
//!
//! | Backend | Feature | Notes |
//! |---------|---------|-------|
//! | [`Radix2Fft`] | always | `no_std`, precomputed twiddles |
//! | [`RustFftBackend`] | `rustfft` | host builds, SIMD-planned |

use alloc::vec::Vec;

pub use num_complex::Complex32;

use crate::error::ConfigError;

/// In-place complex FFT of a fixed length.
///
/// `inverse` is unnormalized: `inverse(forward(x)) == len() · x`. The
/// filterbank folds the `1/N` scale into its coefficients.
pub trait FftBackend {
    /// Transform length.
    fn len(&self) -> usize;

    /// Forward transform (`e^{-j…}` kernel) of `buf`, which has `len()` points.
    fn forward(&mut self, buf: &mut [Complex32]);

    /// Unnormalized inverse transform of `buf`, which has `len()` points.
    fn inverse(&mut self, buf: &mut [Complex32]);

    /// `dst[k] = a[k] · b[k]` over the shortest of the three slices.
    fn multiply(&self, dst: &mut [Complex32], a: &[Complex32], b: &[Complex32]) {
        complex_multiply(dst, a, b);
    }
}

/// Element-wise complex product.
#[inline]
pub fn complex_multiply(dst: &mut [Complex32], a: &[Complex32], b: &[Complex32]) {
    for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
        *d = x * y;
    }
}

/// Fill the negative-frequency half of a spectrum from the non-negative half.
///
/// For a real time-domain signal `X[N-k] = conj(X[k])`. Bins `0..=N/2` must
/// already be valid; bins `N/2+1..N` are overwritten.
pub fn rebuild_negative_bins(buf: &mut [Complex32]) {
    let n = buf.len();
    for k in 1..n / 2 {
        buf[n - k] = buf[k].conj();
    }
}

/// Iterative radix-2 decimation-in-time FFT.
///
/// Twiddles and the bit-reversal permutation are computed once at
/// construction; transforms do not allocate.
pub struct Radix2Fft {
    len: usize,
    /// `e^{-2πjk/N}` for `k in 0..N/2`.
    twiddles: Vec<Complex32>,
    /// Swap pairs `(i, j)` with `i < j` of the bit-reversal permutation.
    swaps: Vec<(u16, u16)>,
}

impl Radix2Fft {
    /// Plan a transform of `len` points (a power of two, 2..=32768).
    pub fn new(len: usize) -> Result<Self, ConfigError> {
        if !len.is_power_of_two() || !(2..=32768).contains(&len) {
            return Err(ConfigError::TransformLength {
                expected: len.next_power_of_two().clamp(2, 32768),
                actual: len,
            });
        }

        let twiddles = (0..len / 2)
            .map(|k| {
                let angle = -2.0 * core::f64::consts::PI * k as f64 / len as f64;
                Complex32::new(libm::cos(angle) as f32, libm::sin(angle) as f32)
            })
            .collect();

        let mut swaps = Vec::new();
        let mut j = 0usize;
        for i in 1..len {
            let mut bit = len >> 1;
            while j & bit != 0 {
                j ^= bit;
                bit >>= 1;
            }
            j ^= bit;
            if i < j {
                swaps.push((i as u16, j as u16));
            }
        }

        Ok(Radix2Fft {
            len,
            twiddles,
            swaps,
        })
    }

    fn transform(&self, buf: &mut [Complex32], inverse: bool) {
        debug_assert_eq!(buf.len(), self.len);
        for &(i, j) in &self.swaps {
            buf.swap(i as usize, j as usize);
        }

        let n = self.len;
        let mut size = 2;
        while size <= n {
            let half = size / 2;
            let stride = n / size;
            for start in (0..n).step_by(size) {
                for m in 0..half {
                    let mut w = self.twiddles[m * stride];
                    if inverse {
                        w = w.conj();
                    }
                    let a = buf[start + m];
                    let t = w * buf[start + m + half];
                    buf[start + m] = a + t;
                    buf[start + m + half] = a - t;
                }
            }
            size <<= 1;
        }
    }
}

impl FftBackend for Radix2Fft {
    fn len(&self) -> usize {
        self.len
    }

    fn forward(&mut self, buf: &mut [Complex32]) {
        self.transform(buf, false);
    }

    fn inverse(&mut self, buf: &mut [Complex32]) {
        self.transform(buf, true);
    }
}

#[cfg(feature = "rustfft")]
pub use self::rustfft_backend::RustFftBackend;

#[cfg(feature = "rustfft")]
mod rustfft_backend {
    use alloc::sync::Arc;
    use alloc::vec;
    use alloc::vec::Vec;

    use rustfft::FftPlanner;

    use super::{Complex32, FftBackend};
    use crate::error::ConfigError;

    /// [`FftBackend`] on top of `rustfft`'s planner.
    pub struct RustFftBackend {
        forward: Arc<dyn rustfft::Fft<f32>>,
        inverse: Arc<dyn rustfft::Fft<f32>>,
        scratch: Vec<Complex32>,
        len: usize,
    }

    impl RustFftBackend {
        /// Plan forward and inverse transforms of `len` points (a power of two).
        pub fn new(len: usize) -> Result<Self, ConfigError> {
            if !len.is_power_of_two() || len < 2 {
                return Err(ConfigError::TransformLength {
                    expected: len.next_power_of_two().max(2),
                    actual: len,
                });
            }
            let mut planner = FftPlanner::new();
            let forward = planner.plan_fft_forward(len);
            let inverse = planner.plan_fft_inverse(len);
            let scratch_len = forward
                .get_inplace_scratch_len()
                .max(inverse.get_inplace_scratch_len());
            Ok(RustFftBackend {
                forward,
                inverse,
                scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
                len,
            })
        }
    }

    impl FftBackend for RustFftBackend {
        fn len(&self) -> usize {
            self.len
        }

        fn forward(&mut self, buf: &mut [Complex32]) {
            self.forward.process_with_scratch(buf, &mut self.scratch);
        }

        fn inverse(&mut self, buf: &mut [Complex32]) {
            self.inverse.process_with_scratch(buf, &mut self.scratch);
        }
    }
}
