use std::fmt::Debug;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use rv::misc::LogSumExp;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result};
use crate::utils::NoPrettyPrint;

use super::stick::{expected_ln_weights, StickPosterior};
use super::wishart::{expected_ln_gaussian, CholeskyFactor};

/// One component of a fitted mixture.
///
/// `mean`, `covariance` and `weight` are the point summaries used for
/// reporting; `stick`, `mean_precision` and `degrees_of_freedom` are the
/// remaining variational parameters needed for predictive scoring.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct MixtureComponent {
    /// Expected mixing weight, normalised over the truncation.
    pub weight: f64,
    /// Posterior mean of the component location.
    pub mean: DVector<f64>,
    /// Covariance point estimate `W⁻¹ / ν`, regularised and positive definite.
    pub covariance: DMatrix<f64>,
    /// Beta posterior of this component's stick fraction.
    pub stick: StickPosterior,
    /// Position of this component's break in the stick, zero first.
    pub stick_rank: usize,
    /// Precision scaling `β` of the mean posterior.
    pub mean_precision: f64,
    /// Wishart degrees of freedom `ν`.
    pub degrees_of_freedom: f64,
    /// Sum of responsibilities at the last update.
    pub effective_count: f64,
}

/// How the variational optimisation ended.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Convergence {
    /// Number of variational iterations run.
    pub n_iter: usize,
    /// `true` if the lower bound changed by less than the tolerance,
    /// `false` if the iteration budget ran out first.
    pub converged: bool,
    /// Final evidence lower bound.
    pub lower_bound: f64,
}

/// Truncated Dirichlet-process Gaussian mixture produced by
/// [`VariationalDpFitter`](crate::variational::VariationalDpFitter).
///
/// Always holds exactly `K` components in creation order; unused components
/// keep a near-zero weight instead of being removed.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, PartialEq)]
pub struct GaussianMixtureModel {
    dim: usize,
    concentration: f64,
    reg_covar: f64,
    components: Vec<MixtureComponent>,
    convergence: Convergence,
}

impl Debug for GaussianMixtureModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let means: Vec<_> = self
            .components
            .iter()
            .map(|c| NoPrettyPrint::new(c.mean.as_slice().to_vec()))
            .collect();

        f.debug_struct("GaussianMixtureModel")
            .field("dim", &self.dim)
            .field("concentration", &self.concentration)
            .field("weights", &NoPrettyPrint::new(self.weights()))
            .field("means", &NoPrettyPrint::new(means))
            .field("convergence", &self.convergence)
            .finish_non_exhaustive()
    }
}

impl GaussianMixtureModel {
    pub(crate) fn new(
        dim: usize,
        concentration: f64,
        reg_covar: f64,
        components: Vec<MixtureComponent>,
        convergence: Convergence,
    ) -> Self {
        Self {
            dim,
            concentration,
            reg_covar,
            components,
            convergence,
        }
    }

    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Truncation level `K`.
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[MixtureComponent] {
        &self.components
    }

    pub const fn concentration(&self) -> f64 {
        self.concentration
    }

    /// Diagonal floor added to every covariance, reused when scoring.
    pub const fn reg_covar(&self) -> f64 {
        self.reg_covar
    }

    pub const fn convergence(&self) -> Convergence {
        self.convergence
    }

    pub const fn is_converged(&self) -> bool {
        self.convergence.converged
    }

    pub const fn lower_bound(&self) -> f64 {
        self.convergence.lower_bound
    }

    pub fn weights(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.weight).collect()
    }

    /// Indices of components whose weight exceeds `threshold`.
    pub fn active_components(&self, threshold: f64) -> Vec<usize> {
        self.components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.weight > threshold)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of components whose weight exceeds `threshold`.
    pub fn n_active(&self, threshold: f64) -> usize {
        self.components
            .iter()
            .filter(|c| c.weight > threshold)
            .count()
    }

    /// Means of the active components, heaviest first: the estimated anchor
    /// points.
    pub fn anchor_points(&self, threshold: f64) -> Vec<(DVector<f64>, f64)> {
        let mut anchors: Vec<(DVector<f64>, f64)> = self
            .components
            .iter()
            .filter(|c| c.weight > threshold)
            .map(|c| (c.mean.clone(), c.weight))
            .collect();
        anchors.sort_by(|a, b| b.1.total_cmp(&a.1));
        anchors
    }

    /// Posterior responsibilities of every component for each point.
    ///
    /// # Errors
    /// [`ProfileError::DimensionMismatch`] if a point has the wrong length and
    /// [`ProfileError::NumericalDegeneracy`] if a component covariance cannot
    /// be factored.
    pub fn predict_proba(&self, points: &[DVector<f64>]) -> Result<Vec<Vec<f64>>> {
        let factors = self
            .components
            .iter()
            .enumerate()
            .map(|(component, c)| {
                CholeskyFactor::regularized(&c.covariance, self.reg_covar)
                    .map(|(_, f)| f)
                    .ok_or(ProfileError::NumericalDegeneracy {
                        component,
                        iteration: None,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let ln_weights = expected_ln_weights(&self.sticks(), &self.stick_order());

        points
            .par_iter()
            .map(|x| {
                self.check_dim(x)?;
                let ln_p: Vec<f64> = self
                    .components
                    .iter()
                    .zip(&factors)
                    .zip(&ln_weights)
                    .map(|((c, f), ln_w)| {
                        ln_w + expected_ln_gaussian(
                            x,
                            &c.mean,
                            f,
                            c.mean_precision,
                            c.degrees_of_freedom,
                        )
                    })
                    .collect();
                let norm = ln_p.iter().copied().logsumexp();
                Ok(ln_p.into_iter().map(|v| (v - norm).exp()).collect())
            })
            .collect()
    }

    /// Most responsible component for each point.
    ///
    /// # Errors
    /// See [`GaussianMixtureModel::predict_proba`].
    pub fn predict(&self, points: &[DVector<f64>]) -> Result<Vec<usize>> {
        Ok(self
            .predict_proba(points)?
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map_or(0, |(i, _)| i)
            })
            .collect())
    }

    fn sticks(&self) -> Vec<StickPosterior> {
        self.components.iter().map(|c| c.stick).collect()
    }

    /// Component indices in stick order.
    pub fn stick_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.components.len()).collect();
        order.sort_by_key(|&k| self.components[k].stick_rank);
        order
    }

    pub(crate) fn check_dim(&self, x: &DVector<f64>) -> Result<()> {
        if x.len() == self.dim {
            Ok(())
        } else {
            Err(ProfileError::DimensionMismatch {
                expected: self.dim,
                found: x.len(),
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use nalgebra::{dmatrix, dvector};

    use super::*;

    /// Two hand-built components far apart, the second one nearly empty.
    pub(crate) fn two_component_model() -> GaussianMixtureModel {
        let component = |weight: f64, mean: DVector<f64>, n: f64, stick, stick_rank| {
            MixtureComponent {
                weight,
                mean,
                covariance: dmatrix![1.0, 0.0; 0.0, 1.0],
                stick,
                stick_rank,
                mean_precision: 1.0 + n,
                degrees_of_freedom: 2.0 + n,
                effective_count: n,
            }
        };
        GaussianMixtureModel::new(
            2,
            1.0,
            1e-6,
            vec![
                component(0.7, dvector![0.0, 0.0], 70.0, StickPosterior::new(71.0, 31.0), 0),
                component(0.3, dvector![10.0, 10.0], 30.0, StickPosterior::new(31.0, 1.0), 1),
            ],
            Convergence {
                n_iter: 12,
                converged: true,
                lower_bound: -123.0,
            },
        )
    }

    #[test]
    fn active_queries() {
        let model = two_component_model();
        assert_eq!(model.n_components(), 2);
        assert_eq!(model.n_active(0.5), 1);
        assert_eq!(model.n_active(0.01), 2);
        assert_eq!(model.active_components(0.5), vec![0]);

        let anchors = model.anchor_points(0.01);
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].0, dvector![0.0, 0.0]);
        assert::close(anchors[1].1, 0.3, 1e-12);
    }

    #[test]
    fn predict_assigns_to_nearest_component() {
        let model = two_component_model();
        let labels = model
            .predict(&[dvector![0.1, -0.2], dvector![9.5, 10.3]])
            .unwrap();
        assert_eq!(labels, vec![0, 1]);

        let proba = model.predict_proba(&[dvector![5.0, 5.0]]).unwrap();
        assert::close(proba[0].iter().sum::<f64>(), 1.0, 1e-12);
    }

    #[test]
    fn stick_order_follows_ranks() {
        let mut model = two_component_model();
        assert_eq!(model.stick_order(), vec![0, 1]);

        model.components.swap(0, 1);
        assert_eq!(model.stick_order(), vec![1, 0]);
        let labels = model
            .predict(&[dvector![0.1, -0.2], dvector![9.5, 10.3]])
            .unwrap();
        assert_eq!(labels, vec![1, 0]);
    }

    #[test]
    fn predict_rejects_wrong_dimension() {
        let model = two_component_model();
        let err = model.predict(&[dvector![1.0, 2.0, 3.0]]).unwrap_err();
        assert_eq!(
            err,
            ProfileError::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn debug_is_compact() {
        let s = format!("{:#?}", two_component_model());
        assert!(s.contains("weights: [0.7, 0.3]"), "{s}");
    }
}
