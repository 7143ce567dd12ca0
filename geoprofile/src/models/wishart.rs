//! Expectations under a Normal-Wishart variational posterior.
//!
//! Each component posterior is `q(μ, Λ) = N(μ | m, (βΛ)⁻¹) W(Λ | W, ν)`. It is
//! stored through the covariance point estimate `Σ = W⁻¹ / ν`, so
//! `ν (x - m)ᵀ W (x - m) = (x - m)ᵀ Σ⁻¹ (x - m)` and `ln|W| = -ln|Σ| - d ln ν`.

use std::f64::consts::{LN_2, PI};

use nalgebra::{DMatrix, DVector};
use special::Gamma;

/// Lower Cholesky factor of a symmetric positive-definite matrix.
#[derive(Clone, Debug)]
pub(crate) struct CholeskyFactor {
    lower: DMatrix<f64>,
    ln_det: f64,
}

impl CholeskyFactor {
    /// `None` if `matrix` is not numerically positive definite.
    pub fn new(matrix: &DMatrix<f64>) -> Option<Self> {
        let lower = matrix.clone().cholesky()?.l();
        let ln_det = 2.0 * lower.diagonal().iter().map(|v| v.ln()).sum::<f64>();
        ln_det.is_finite().then_some(Self { lower, ln_det })
    }

    /// Factor `matrix`, retrying once with `reg` added to the diagonal.
    ///
    /// Returns the matrix that was actually factored.
    pub fn regularized(matrix: &DMatrix<f64>, reg: f64) -> Option<(DMatrix<f64>, Self)> {
        if let Some(factor) = Self::new(matrix) {
            return Some((matrix.clone(), factor));
        }
        let n = matrix.nrows();
        let bumped = matrix + DMatrix::identity(n, n) * reg;
        Self::new(&bumped).map(|factor| (bumped, factor))
    }

    /// `ln |A|`
    pub const fn ln_det(&self) -> f64 {
        self.ln_det
    }

    /// `L⁻¹ v`
    pub fn whiten(&self, v: &DVector<f64>) -> DVector<f64> {
        self.lower
            .solve_lower_triangular(v)
            .unwrap_or_else(|| DVector::from_element(v.len(), f64::INFINITY))
    }

    /// `vᵀ A⁻¹ v`
    pub fn mahalanobis(&self, v: &DVector<f64>) -> f64 {
        self.whiten(v).norm_squared()
    }

    /// `ln(1 + vᵀ A⁻¹ v / s)` without overflowing for very distant `v`.
    pub fn ln1p_mahalanobis(&self, v: &DVector<f64>, s: f64) -> f64 {
        let scale = v.amax();
        if scale == 0.0 {
            return 0.0;
        }
        let unit = self.whiten(&(v / scale)).norm_squared();
        let maha = unit * scale * scale;
        if maha.is_finite() {
            (maha / s).ln_1p()
        } else {
            2.0 * scale.ln() + (unit / s).ln()
        }
    }
}

/// `E[ln |Λ|] = Σ_{i<d} ψ((ν - i) / 2) + d ln 2 + ln |W|`
#[allow(clippy::cast_precision_loss)]
pub(crate) fn expected_ln_det_precision(dof: f64, ln_det_cov: f64, dim: usize) -> f64 {
    let d = dim as f64;
    let ln_det_w = -ln_det_cov - d * dof.ln();
    (0..dim)
        .map(|i| (0.5 * (dof - i as f64)).digamma())
        .sum::<f64>()
        + d * LN_2
        + ln_det_w
}

/// `E[ln N(x | μ, Λ⁻¹)]` under the component posterior.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn expected_ln_gaussian(
    x: &DVector<f64>,
    mean: &DVector<f64>,
    cov: &CholeskyFactor,
    mean_precision: f64,
    dof: f64,
) -> f64 {
    let dim = x.len();
    let d = dim as f64;
    let maha = cov.mahalanobis(&(x - mean));
    0.5 * expected_ln_det_precision(dof, cov.ln_det(), dim)
        - 0.5 * d * (2.0 * PI).ln()
        - 0.5 * (d / mean_precision + maha)
}

/// Wishart contribution to the lower bound of one component:
/// `ν/2 ln |W| + ν d/2 ln 2 + Σ_{i<d} ln Γ((ν - i) / 2)`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn ln_wishart_norm(dof: f64, ln_det_cov: f64, dim: usize) -> f64 {
    let d = dim as f64;
    let ln_det_w = -ln_det_cov - d * dof.ln();
    0.5 * dof * ln_det_w
        + 0.5 * dof * d * LN_2
        + (0..dim)
            .map(|i| Gamma::ln_gamma(0.5 * (dof - i as f64)).0)
            .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use nalgebra::{dmatrix, dvector};

    use super::*;

    #[test]
    fn factor_of_diagonal_matrix() {
        let a = dmatrix![4.0, 0.0; 0.0, 9.0];
        let f = CholeskyFactor::new(&a).unwrap();
        assert::close(f.ln_det(), 36.0_f64.ln(), 1e-12);
        assert::close(f.mahalanobis(&dvector![2.0, 3.0]), 2.0, 1e-12);
    }

    #[test]
    fn singular_matrix_is_regularized() {
        let a = dmatrix![1.0, 1.0; 1.0, 1.0];
        assert!(CholeskyFactor::new(&a).is_none());

        let (bumped, f) = CholeskyFactor::regularized(&a, 1e-3).unwrap();
        assert::close(bumped[(0, 0)], 1.001, 1e-12);
        assert!(f.ln_det().is_finite());
    }

    #[test]
    fn distant_points_do_not_overflow() {
        let f = CholeskyFactor::new(&dmatrix![1e-8, 0.0; 0.0, 1e-8]).unwrap();
        let near = f.ln1p_mahalanobis(&dvector![1e-4, 0.0], 3.0);
        assert::close(near, (1.0_f64 + 1.0 / 3.0).ln(), 1e-10);

        let far = f.ln1p_mahalanobis(&dvector![1e300, -1e300], 3.0);
        assert!(far.is_finite());
        assert!(far > near);
    }

    #[test]
    fn expected_ln_det_precision_is_consistent_with_wishart_mean() {
        // For large ν, E[ln|Λ|] -> ln|E[Λ]| = -ln|Σ|.
        let dof = 1e7;
        let ln_det_cov = 3.0_f64.ln();
        let e = expected_ln_det_precision(dof, ln_det_cov, 2);
        assert::close(e, -ln_det_cov, 1e-5);
    }

    #[test]
    fn wishart_normaliser_in_closed_form() {
        // ν = d = 2, Σ = I: ln|W| = -2 ln 2, so only ln Γ(1) + ln Γ(1/2) remains
        let ln_norm = ln_wishart_norm(2.0, 0.0, 2);
        assert::close(ln_norm, 0.5 * PI.ln(), 1e-12);
    }
}
