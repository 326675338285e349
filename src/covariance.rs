use faer::{Col, Mat};
use itertools::Itertools;
use tracing::debug;

use crate::{
    error::{AnnealError, Result},
    math::weighted_mean,
};

/// Smallest eigenvalue kept, relative to the largest one.
pub const CONDITION_RATIO: f64 = 1e-3;

/// Weighted covariance of the rows of `theta`.
///
/// The weights need not be normalized; they are scaled to unit mass. The lower
/// triangle is accumulated and mirrored, so the result is exactly symmetric.
pub fn weighted_covariance(theta: &Mat<f64>, weights: &[f64]) -> Result<Mat<f64>> {
    let (samples, parameters) = (theta.nrows(), theta.ncols());
    if weights.len() != samples {
        return Err(AnnealError::DimensionMismatch {
            what: "weights",
            expected: samples,
            found: weights.len(),
        });
    }
    let total: f64 = weights.iter().sum();
    if !(total.is_finite() && total > 0.) {
        return Err(AnnealError::DegenerateWeights(total));
    }

    let means = (0..parameters)
        .map(|col| weighted_mean(weights, (0..samples).map(|row| theta[(row, col)])))
        .collect_vec();

    let mut sigma = Mat::zeros(parameters, parameters);
    for (row, &w) in weights.iter().enumerate() {
        let w = w / total;
        if w == 0. {
            continue;
        }
        for i in 0..parameters {
            let di = theta[(row, i)] - means[i];
            for j in 0..=i {
                sigma[(i, j)] += w * di * (theta[(row, j)] - means[j]);
            }
        }
    }

    for i in 0..parameters {
        for j in 0..i {
            sigma[(j, i)] = sigma[(i, j)];
        }
    }

    Ok(sigma)
}

/// Floor the spectrum of a symmetric matrix at `ratio` times its largest
/// eigenvalue (in magnitude) and rebuild it.
///
/// The result is symmetric and, unless the input is zero, positive definite
/// with condition number at most `1 / ratio`. Matrices that already satisfy
/// the bound come back unchanged up to rounding.
pub fn condition_matrix(sigma: &Mat<f64>, ratio: f64) -> Result<Mat<f64>> {
    let dim = sigma.nrows();
    if sigma.ncols() != dim {
        return Err(AnnealError::DimensionMismatch {
            what: "covariance",
            expected: dim,
            found: sigma.ncols(),
        });
    }
    if dim == 0 {
        return Ok(sigma.clone());
    }

    let eig = sigma
        .self_adjoint_eigen(faer::Side::Lower)
        .map_err(|err| AnnealError::Eigendecomposition(format!("{err:?}")))?;

    let vals = eig.S().column_vector().iter().copied().collect_vec();
    let largest = vals
        .iter()
        .copied()
        .sorted_by(|a, b| a.abs().total_cmp(&b.abs()))
        .last()
        .unwrap_or(0.);
    let floor = ratio * largest.abs();

    let clamped_count = vals.iter().filter(|&&val| val < floor).count();
    let clamped = Col::from_fn(dim, |i| if vals[i] < floor { floor } else { vals[i] });

    let u = eig.U();
    let rebuilt = u * clamped.into_diagonal() * u.transpose();

    debug!(floor, clamped = clamped_count, "conditioned covariance");

    Ok(Mat::from_fn(dim, dim, |i, j| {
        0.5 * (rebuilt[(i, j)] + rebuilt[(j, i)])
    }))
}
