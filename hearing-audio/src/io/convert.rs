//! Fixed-point ↔ floating-point sample conversion.
//!
//! Codecs and DMA buffers carry signed 16-bit samples; the graph works on
//! `f32` in `[-1.0, 1.0)`. Conversion uses Q15 scaling (`1.0 ↔ 32768`),
//! rounds to nearest and saturates. It is implemented once here and shared
//! by every sample-delivery path.

use crate::block::{AudioBlockPool, AudioBlockRef};
use crate::error::DeliveryError;

use super::spsc::SpscQueue;

const Q15_SCALE: f32 = 32768.0;

/// Saturate an `i32` to `i16` range (`-32768..=32767`).
///
/// Maps to ARM `SSAT #16`.
#[inline(always)]
pub fn saturate16(val: i32) -> i16 {
    #[cfg(all(target_arch = "arm", target_feature = "dsp"))]
    {
        let out: i32;
        unsafe {
            core::arch::asm!(
                "ssat {out}, #16, {val}",
                out = out(reg) out,
                val = in(reg) val,
            );
        }
        out as i16
    }
    #[cfg(not(all(target_arch = "arm", target_feature = "dsp")))]
    {
        val.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

/// One Q15 sample to `f32`.
#[inline(always)]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / Q15_SCALE
}

/// One `f32` sample to Q15, rounded and saturated. NaN maps to 0.
#[inline(always)]
pub fn f32_to_i16(sample: f32) -> i16 {
    let scaled = libm::roundf(sample * Q15_SCALE);
    if scaled.is_nan() {
        return 0;
    }
    // `as` saturates at the i32 limits; saturate16 narrows the rest.
    saturate16(scaled as i32)
}

/// Convert `src` into `dst`; extra `dst` samples are zeroed.
pub fn samples_from_i16(dst: &mut [f32], src: &[i16]) {
    let n = dst.len().min(src.len());
    for (d, &s) in dst[..n].iter_mut().zip(src) {
        *d = i16_to_f32(s);
    }
    dst[n..].fill(0.0);
}

/// Convert `src` into `dst`; extra `dst` samples are zeroed.
pub fn samples_to_i16(dst: &mut [i16], src: &[f32]) {
    let n = dst.len().min(src.len());
    for (d, &s) in dst[..n].iter_mut().zip(src) {
        *d = f32_to_i16(s);
    }
    dst[n..].fill(0);
}

/// Copy one block of codec samples into a pool block and queue it for the
/// graph. Called from the capture (DMA complete) context.
pub fn push_i16<'a, const N: usize>(
    pool: &'a AudioBlockPool,
    queue: &SpscQueue<AudioBlockRef<'a>, N>,
    samples: &[i16],
) -> Result<(), DeliveryError> {
    let mut block = pool.allocate()?;
    samples_from_i16(&mut block, samples);
    queue
        .push(block.into_shared())
        .map_err(|_| DeliveryError::QueueFull)
}

/// Take one block produced by the graph and write it as codec samples.
/// Called from the playback (DMA complete) context.
///
/// On underrun `dst` is filled with silence and `false` is returned.
pub fn pop_i16<const N: usize>(queue: &SpscQueue<AudioBlockRef<'_>, N>, dst: &mut [i16]) -> bool {
    match queue.pop() {
        Some(block) => {
            samples_to_i16(dst, &block);
            true
        }
        None => {
            dst.fill(0);
            false
        }
    }
}
