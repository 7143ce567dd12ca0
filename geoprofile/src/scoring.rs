//! Posterior-predictive density of a fitted mixture.
//!
//! Integrating each component's Normal-Wishart posterior out of the Gaussian
//! likelihood gives a multivariate Student-t. Components fit on few
//! observations therefore get heavier tails than a plug-in Gaussian would.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use rv::misc::LogSumExp;
use rv::traits::HasDensity;
use special::Gamma;

use crate::data::ObservationSet;
use crate::error::{ProfileError, Result};
use crate::models::mixture::{GaussianMixtureModel, MixtureComponent};
use crate::models::wishart::CholeskyFactor;

/// Multivariate Student-t predictive of one mixture component.
#[derive(Clone, Debug)]
pub struct StudentTPredictive {
    mean: DVector<f64>,
    dof: f64,
    scale: CholeskyFactor,
    ln_norm: f64,
}

impl StudentTPredictive {
    /// Predictive of `component`, adding `reg_covar` to the scale diagonal.
    ///
    /// Returns `None` if the scale matrix is not positive definite.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(component: &MixtureComponent, reg_covar: f64) -> Option<Self> {
        let d = component.mean.len() as f64;
        let beta = component.mean_precision;
        let nu = component.degrees_of_freedom;
        let dof = nu - d + 1.0;

        let n = component.mean.len();
        let scale = &component.covariance * (nu * (1.0 + beta) / (beta * dof))
            + DMatrix::identity(n, n) * reg_covar;
        let scale = CholeskyFactor::new(&scale)?;

        let ln_norm = Gamma::ln_gamma(0.5 * (dof + d)).0
            - Gamma::ln_gamma(0.5 * dof).0
            - 0.5 * d * (dof * PI).ln()
            - 0.5 * scale.ln_det();

        Some(Self {
            mean: component.mean.clone(),
            dof,
            scale,
            ln_norm,
        })
    }

    pub const fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    pub const fn dof(&self) -> f64 {
        self.dof
    }
}

impl HasDensity<DVector<f64>> for StudentTPredictive {
    #[allow(clippy::cast_precision_loss)]
    fn ln_f(&self, x: &DVector<f64>) -> f64 {
        let d = x.len() as f64;
        self.ln_norm
            - 0.5 * (self.dof + d) * self.scale.ln1p_mahalanobis(&(x - &self.mean), self.dof)
    }
}

/// Evaluates log-densities under a fitted [`GaussianMixtureModel`].
///
/// The model is borrowed, never modified; the per-component predictives are
/// factored once on construction.
#[derive(Clone, Debug)]
pub struct MixtureScorer<'a> {
    model: &'a GaussianMixtureModel,
    /// `(ln weight, predictive)` of every component with non-zero weight.
    components: Vec<(f64, StudentTPredictive)>,
}

impl<'a> MixtureScorer<'a> {
    /// # Errors
    /// [`ProfileError::NumericalDegeneracy`] if a component's predictive scale
    /// cannot be factored.
    pub fn new(model: &'a GaussianMixtureModel) -> Result<Self> {
        let components = model
            .components()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.weight > 0.0)
            .map(|(component, c)| {
                StudentTPredictive::new(c, model.reg_covar())
                    .map(|t| (c.weight.ln(), t))
                    .ok_or(ProfileError::NumericalDegeneracy {
                        component,
                        iteration: None,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { model, components })
    }

    pub const fn model(&self) -> &'a GaussianMixtureModel {
        self.model
    }

    /// `ln Σ_k π_k St(x | k)`
    ///
    /// # Errors
    /// [`ProfileError::DimensionMismatch`] if `x` does not match the model.
    pub fn ln_density(&self, x: &DVector<f64>) -> Result<f64> {
        self.model.check_dim(x)?;
        Ok(self
            .components
            .iter()
            .map(|(ln_w, t)| ln_w + t.ln_f(x))
            .logsumexp())
    }

    /// Log-density of every point, in input order.
    ///
    /// # Errors
    /// See [`MixtureScorer::ln_density`].
    pub fn score_grid(&self, points: &[DVector<f64>]) -> Result<Vec<f64>> {
        points.par_iter().map(|x| self.ln_density(x)).collect()
    }

    /// Average predictive log-likelihood of `observations`.
    ///
    /// # Errors
    /// See [`MixtureScorer::ln_density`].
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_ln_density(&self, observations: &ObservationSet) -> Result<f64> {
        let total: f64 = self.score_grid(observations.points())?.iter().sum();
        Ok(total / observations.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::dvector;
    use rv::misc::linspace;

    use super::*;
    use crate::models::mixture::tests::two_component_model;
    use crate::utils::trapz;

    #[test]
    fn density_at_the_mean_is_the_normalizer() {
        let model = two_component_model();
        let t = StudentTPredictive::new(&model.components()[0], model.reg_covar()).unwrap();
        assert::close(t.ln_f(&dvector![0.0, 0.0]), t.ln_norm, 1e-12);
        assert::close(t.dof(), 71.0, 1e-12);
    }

    #[test]
    fn mixture_density_integrates_to_one() {
        let model = two_component_model();
        let scorer = MixtureScorer::new(&model).unwrap();

        let xs: Vec<f64> = linspace(-15.0, 25.0, 401);
        let row_integrals: Vec<f64> = xs
            .iter()
            .map(|&y| {
                let fs: Vec<f64> = xs
                    .iter()
                    .map(|&x| scorer.ln_density(&dvector![x, y]).unwrap().exp())
                    .collect();
                trapz(&fs, &xs)
            })
            .collect();
        let integral = trapz(&row_integrals, &xs);
        assert::close(integral, 1.0, 1e-3);
    }

    #[test]
    fn distant_points_stay_finite() {
        let model = two_component_model();
        let scorer = MixtureScorer::new(&model).unwrap();
        for p in [
            dvector![1e6, -1e6],
            dvector![1e150, 1e150],
            dvector![-1e300, 3.0],
        ] {
            let ln_p = scorer.ln_density(&p).unwrap();
            assert!(ln_p.is_finite(), "{p} -> {ln_p}");
        }
    }

    #[test]
    fn grid_scores_follow_input_order() {
        let model = two_component_model();
        let scorer = MixtureScorer::new(&model).unwrap();
        let points = vec![dvector![0.0, 0.0], dvector![10.0, 10.0], dvector![5.0, 5.0]];
        let scores = scorer.score_grid(&points).unwrap();
        for (p, s) in points.iter().zip(&scores) {
            assert_eq!(*s, scorer.ln_density(p).unwrap());
        }
        // the heavier component gives the higher peak
        assert!(scores[0] > scores[1]);
        assert!(scores[1] > scores[2]);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let model = two_component_model();
        let scorer = MixtureScorer::new(&model).unwrap();
        assert_eq!(
            scorer.ln_density(&dvector![1.0]),
            Err(ProfileError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        );
        assert!(scorer
            .score_grid(&[dvector![0.0, 0.0], dvector![1.0, 2.0, 3.0]])
            .is_err());
    }

    #[test]
    fn mean_ln_density_averages_observations() {
        let model = two_component_model();
        let scorer = MixtureScorer::new(&model).unwrap();
        let obs = ObservationSet::from_rows(&[[0.0, 0.0], [10.0, 10.0]]).unwrap();
        let expected = 0.5
            * (scorer.ln_density(&dvector![0.0, 0.0]).unwrap()
                + scorer.ln_density(&dvector![10.0, 10.0]).unwrap());
        assert::close(scorer.mean_ln_density(&obs).unwrap(), expected, 1e-12);
    }
}
