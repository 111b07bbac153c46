use ndarray::{Array2, ArrayView2, s};

use crate::error::{RefrainError, Result};

/// Slice one cover's representation matrix into fixed-width frames.
///
/// The time axis is resampled once per factor in `scale` (linear
/// interpolation), each resampled rendition is cut into non-overlapping
/// `frame_size`-wide windows with the trailing remainder dropped, and the
/// per-factor frame sequences are concatenated in pair order. Time order is
/// preserved within each rendition.
///
/// Fails with `InvalidInput` when not even one frame fits at any scale.
pub fn segment_and_scale(
    repr: ArrayView2<'_, f32>,
    frame_size: usize,
    scale: (f32, f32),
) -> Result<Vec<Array2<f32>>> {
    if frame_size == 0 {
        return Err(RefrainError::Configuration(
            "frame_size must be positive".to_string(),
        ));
    }
    let (primary, secondary) = scale;
    if primary <= 0.0 || secondary <= 0.0 {
        return Err(RefrainError::Configuration(format!(
            "scale factors must be positive, got ({primary}, {secondary})"
        )));
    }

    let (num_features, num_samples) = repr.dim();
    if num_features == 0 || num_samples == 0 {
        return Err(RefrainError::InvalidInput(
            "empty representation matrix".to_string(),
        ));
    }

    let mut frames = Vec::new();
    for factor in [primary, secondary] {
        let resampled = resample_time(repr, factor);
        let resampled_len = resampled.ncols();
        for k in 0..resampled_len / frame_size {
            let frame = resampled
                .slice(s![.., k * frame_size..(k + 1) * frame_size])
                .to_owned();
            frames.push(frame);
        }
    }

    if frames.is_empty() {
        return Err(RefrainError::InvalidInput(format!(
            "representation too short: {num_samples} time samples yield no \
             {frame_size}-wide frames at scales ({primary}, {secondary})"
        )));
    }

    Ok(frames)
}

/// Resample the time axis by `factor` with linear interpolation.
///
/// A factor below 1 compresses (fewer output columns), above 1 stretches.
fn resample_time(repr: ArrayView2<'_, f32>, factor: f32) -> Array2<f32> {
    let (num_features, num_samples) = repr.dim();
    if (factor - 1.0).abs() < f32::EPSILON {
        return repr.to_owned();
    }

    let new_len = ((num_samples as f32) * factor).floor() as usize;
    let mut out = Array2::zeros((num_features, new_len));
    let step = 1.0 / factor;
    for t in 0..new_len {
        let src = t as f32 * step;
        let i0 = (src.floor() as usize).min(num_samples - 1);
        let i1 = (i0 + 1).min(num_samples - 1);
        let w = src - i0 as f32;
        for f in 0..num_features {
            out[[f, t]] = repr[[f, i0]].mul_add(1.0 - w, repr[[f, i1]] * w);
        }
    }
    out
}
