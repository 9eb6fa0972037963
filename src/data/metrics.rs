//! Per-pixel quality metrics over correlation curves.
//!
//! Lag index 0 carries the correlation amplitude, not noise behaviour, and
//! is excluded from both metrics.

use ndarray::{Array2, Array3, Axis, Zip};

use crate::error::{ImfcsError, Result};

/// Normalized root-mean-square deviation between observed and fitted
/// curves: `sqrt(sum_{lag>=1} (observed - predicted)^2) * n_fit`, per
/// pixel. `n_fit` is the per-pixel particle-number estimate.
pub fn nrmsd(
    observed: &Array3<f64>,
    predicted: &Array3<f64>,
    n_fit: &Array2<f64>,
) -> Result<Array2<f64>> {
    if observed.dim() != predicted.dim() {
        let (h, w, l) = predicted.dim();
        let (oh, ow, ol) = observed.dim();
        return Err(ImfcsError::DimensionMismatch {
            expected: vec![oh, ow, ol],
            actual: vec![h, w, l],
        });
    }

    let (height, width, _) = observed.dim();
    let mut rmsd = Array2::zeros((height, width));

    Zip::indexed(&mut rmsd).for_each(|(i, j), out| {
        let sum: f64 = observed
            .slice(ndarray::s![i, j, 1..])
            .iter()
            .zip(predicted.slice(ndarray::s![i, j, 1..]).iter())
            .map(|(o, p)| (o - p) * (o - p))
            .sum();
        *out = sum.sqrt() * n_fit[[i, j]];
    });

    Ok(rmsd)
}

/// Signal-to-noise ratio of a correlation curve per pixel:
/// `mean / std` over lag indices `1..last_lag` (population std).
pub fn snr(cf: &Array3<f64>, last_lag: usize) -> Array2<f64> {
    let (height, width, num_lag) = cf.dim();
    let last_lag = last_lag.min(num_lag);
    if last_lag <= 1 {
        return Array2::from_elem((height, width), f64::NAN);
    }
    let window = cf.slice(ndarray::s![.., .., 1..last_lag]);
    let Some(mean) = window.mean_axis(Axis(2)) else {
        return Array2::from_elem((height, width), f64::NAN);
    };
    let std = window.std_axis(Axis(2), 0.0);
    mean / std
}
