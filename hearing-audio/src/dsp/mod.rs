//! Signal processing for the hearing-aid chain.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`fast_math`] | Approximate `log2`/`exp2` and dB conversion |
//! | [`fft`] | FFT backend contract and a portable radix-2 backend |
//! | [`filterbank`] | FFT overlap-add FIR analysis/synthesis |
//! | [`compressor`] | Envelope followers and WDRC gain curves |
//! | [`prepare`] | Prescription → coefficients, run once at startup |

pub mod compressor;
pub mod fast_math;
pub mod fft;
pub mod filterbank;
pub mod prepare;

pub use compressor::{Compressor, CompressorConfig, EnvelopeCoeffs, KneeCurve, KneeParams};
pub use fast_math::{Approximation, DbScale};
pub use fft::{FftBackend, Radix2Fft};
pub use filterbank::{Filterbank, FilterbankCoefficients, Regime};
pub use prepare::{Prescription, WdrcSpec};
