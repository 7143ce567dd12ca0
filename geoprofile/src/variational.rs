//! Truncated stick-breaking variational inference for a Dirichlet-process
//! Gaussian mixture.
//!
//! Every component carries a Normal-Wishart posterior and every stick break a
//! Beta posterior. The fit alternates responsibility and parameter updates
//! until the evidence lower bound stops moving.

pub mod init;

use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use rv::misc::LogSumExp;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use init::Initialization;

use crate::data::ObservationSet;
use crate::error::{ProfileError, Result};
use crate::models::mixture::{Convergence, GaussianMixtureModel, MixtureComponent};
use crate::models::stick::StickBreaking;
use crate::models::wishart::{expected_ln_gaussian, ln_wishart_norm, CholeskyFactor};

/// Fewest observations for which a covariance can be estimated.
pub const MIN_OBSERVATIONS: usize = 2;

/// Weight above which a component is reported as active in fit logs.
const LOG_ACTIVE_THRESHOLD: f64 = 0.01;

/// Options for [`VariationalDpFitter`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, PartialEq)]
pub struct FitOptions {
    /// Truncation level `K`, the largest number of components.
    pub n_components: usize,
    /// Dirichlet-process concentration `α`; small values favour few
    /// dominant components.
    pub concentration: f64,
    /// Maximum number of variational iterations per initialisation.
    pub max_iter: usize,
    /// Convergence tolerance on the change of the lower bound.
    pub tol: f64,
    /// Number of initialisations; the one with the highest lower bound wins.
    ///
    /// A single run can settle in a split of one cluster into several
    /// substantial components. Restarts are drawn one after another from the
    /// same random source, so the result stays deterministic.
    pub n_init: usize,
    pub init: Initialization,
    /// Added to the diagonal of every covariance.
    pub reg_covar: f64,
    /// Prior precision scaling `β₀` of the component means.
    pub mean_precision_prior: f64,
    /// Prior Wishart degrees of freedom `ν₀`. `None` uses the dimensionality.
    pub degrees_of_freedom_prior: Option<f64>,
    /// Multiplier applied to the data covariance to form the prior
    /// covariance.
    ///
    /// Defaults to one, the unscaled empirical covariance of the reference
    /// behaviour. The weak default `ν₀ = d` already makes the prior broad;
    /// values above one widen it further.
    pub covariance_prior_scale: f64,
    /// Seed for the initialisation when fitting through
    /// [`VariationalDpFitter::fit`].
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            n_components: 10,
            concentration: 1e-2,
            max_iter: 1000,
            tol: 1e-6,
            n_init: 4,
            init: Initialization::Random,
            reg_covar: 1e-6,
            mean_precision_prior: 1.0,
            degrees_of_freedom_prior: None,
            covariance_prior_scale: 1.0,
            seed: 42,
        }
    }
}

fn finite_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ProfileError::invalid(name, value, "must be finite and > 0"))
    }
}

impl FitOptions {
    /// Check every option against its domain.
    ///
    /// # Errors
    /// [`ProfileError::InvalidParameter`] naming the first offending option.
    #[allow(clippy::cast_precision_loss)]
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(ProfileError::invalid(
                "n_components",
                0.0,
                "at least one component is required",
            ));
        }
        if self.max_iter == 0 {
            return Err(ProfileError::invalid("max_iter", 0.0, "must be >= 1"));
        }
        if self.n_init == 0 {
            return Err(ProfileError::invalid("n_init", 0.0, "must be >= 1"));
        }
        finite_positive("concentration", self.concentration)?;
        finite_positive("tol", self.tol)?;
        finite_positive("reg_covar", self.reg_covar)?;
        finite_positive("mean_precision_prior", self.mean_precision_prior)?;
        finite_positive("covariance_prior_scale", self.covariance_prior_scale)?;
        if let Some(dof) = self.degrees_of_freedom_prior {
            let min = (crate::data::DIM - 1) as f64;
            if !(dof.is_finite() && dof > min) {
                return Err(ProfileError::invalid(
                    "degrees_of_freedom_prior",
                    dof,
                    "must be finite and greater than dimensionality - 1",
                ));
            }
        }
        Ok(())
    }
}

/// Normal-Wishart prior shared by every component.
#[derive(Clone, Debug)]
struct NormalWishartPrior {
    mean: DVector<f64>,
    mean_precision: f64,
    dof: f64,
    /// Inverse Wishart scale `W₀⁻¹`.
    covariance: DMatrix<f64>,
}

impl NormalWishartPrior {
    /// Centred on the data with the (scaled) sample covariance as spread.
    ///
    /// Falls back to the diagonal when the sample covariance is singular, for
    /// instance with collinear observations.
    #[allow(clippy::cast_precision_loss)]
    fn from_data(observations: &ObservationSet, options: &FitOptions) -> Result<Self> {
        let dim = observations.dim();
        let reg = DMatrix::identity(dim, dim) * options.reg_covar;
        let scaled = observations.covariance() * options.covariance_prior_scale;

        let full = &scaled + &reg;
        let covariance = if CholeskyFactor::new(&full).is_some() {
            full
        } else {
            let diag = scaled.diagonal().map(|v| v.max(options.reg_covar));
            let diagonal = DMatrix::from_diagonal(&diag);
            if CholeskyFactor::new(&diagonal).is_none() {
                return Err(ProfileError::invalid(
                    "covariance_prior_scale",
                    options.covariance_prior_scale,
                    "prior covariance is not positive definite",
                ));
            }
            diagonal
        };

        Ok(Self {
            mean: observations.centroid(),
            mean_precision: options.mean_precision_prior,
            dof: options.degrees_of_freedom_prior.unwrap_or(dim as f64),
            covariance,
        })
    }

    /// A component that has seen no data.
    fn component(&self, reg_covar: f64) -> Option<ComponentPosterior> {
        let covariance = &self.covariance / self.dof;
        let (covariance, factor) = CholeskyFactor::regularized(&covariance, reg_covar)?;
        Some(ComponentPosterior {
            mean: self.mean.clone(),
            covariance,
            factor,
            mean_precision: self.mean_precision,
            dof: self.dof,
            count: 0.0,
        })
    }

    /// Conjugate update of the prior with one component's statistics.
    fn posterior(&self, stats: &SufficientStats, reg_covar: f64) -> Option<ComponentPosterior> {
        let n = stats.count;
        let mean_precision = self.mean_precision + n;
        let mean = (&self.mean * self.mean_precision + &stats.mean * n) / mean_precision;
        let dof = self.dof + n;

        let diff = &stats.mean - &self.mean;
        let scale = &self.covariance
            + &stats.scatter * n
            + (&diff * diff.transpose()) * (n * self.mean_precision / mean_precision);
        let (covariance, factor) = CholeskyFactor::regularized(&(scale / dof), reg_covar)?;

        Some(ComponentPosterior {
            mean,
            covariance,
            factor,
            mean_precision,
            dof,
            count: n,
        })
    }
}

/// Responsibility-weighted statistics of one component.
struct SufficientStats {
    count: f64,
    mean: DVector<f64>,
    /// Weighted scatter about `mean` divided by `count`, regularised.
    scatter: DMatrix<f64>,
}

impl SufficientStats {
    fn collect(points: &[DVector<f64>], resp: &[Vec<f64>], k: usize, reg_covar: f64) -> Self {
        let dim = points[0].len();
        let count = resp.iter().map(|r| r[k]).sum::<f64>() + 10.0 * f64::EPSILON;

        let mean = points
            .iter()
            .zip(resp)
            .fold(DVector::<f64>::zeros(dim), |acc, (x, r)| acc + x * r[k])
            / count;

        let scatter = points
            .iter()
            .zip(resp)
            .fold(DMatrix::<f64>::zeros(dim, dim), |acc, (x, r)| {
                let diff = x - &mean;
                acc + (&diff * diff.transpose()) * r[k]
            })
            / count
            + DMatrix::identity(dim, dim) * reg_covar;

        Self {
            count,
            mean,
            scatter,
        }
    }
}

#[derive(Clone, Debug)]
struct ComponentPosterior {
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    factor: CholeskyFactor,
    mean_precision: f64,
    dof: f64,
    count: f64,
}

/// Mutable state of a single variational run.
struct FitState<'a> {
    points: &'a [DVector<f64>],
    prior: &'a NormalWishartPrior,
    reg_covar: f64,
    sticks: StickBreaking,
    components: Vec<ComponentPosterior>,
}

impl<'a> FitState<'a> {
    fn new(
        points: &'a [DVector<f64>],
        prior: &'a NormalWishartPrior,
        options: &FitOptions,
    ) -> Result<Self> {
        let reset = prior.component(options.reg_covar).ok_or(ProfileError::invalid(
            "covariance_prior_scale",
            options.covariance_prior_scale,
            "prior covariance is not positive definite",
        ))?;
        Ok(Self {
            points,
            prior,
            reg_covar: options.reg_covar,
            sticks: StickBreaking::new(options.concentration, options.n_components)?,
            components: vec![reset; options.n_components],
        })
    }

    /// Log responsibilities, one row per observation.
    fn e_step(&self) -> Vec<Vec<f64>> {
        let ln_weights = self.sticks.expected_ln_weights();
        self.points
            .par_iter()
            .map(|x| {
                let ln_p: Vec<f64> = self
                    .components
                    .iter()
                    .zip(&ln_weights)
                    .map(|(c, ln_w)| {
                        ln_w + expected_ln_gaussian(x, &c.mean, &c.factor, c.mean_precision, c.dof)
                    })
                    .collect();
                let norm = ln_p.iter().copied().logsumexp();
                ln_p.into_iter().map(|v| v - norm).collect()
            })
            .collect()
    }

    /// Update sticks and component posteriors from responsibilities.
    ///
    /// A component whose covariance cannot be factored even after
    /// regularisation is reset to the prior.
    fn m_step(&mut self, resp: &[Vec<f64>], iteration: usize) {
        let n_components = self.components.len();
        let stats: Vec<SufficientStats> = (0..n_components)
            .into_par_iter()
            .map(|k| SufficientStats::collect(self.points, resp, k, self.reg_covar))
            .collect();

        let counts: Vec<f64> = stats.iter().map(|s| s.count).collect();
        self.sticks.update(&counts);

        let prior = self.prior;
        let reg_covar = self.reg_covar;
        let updated: Vec<Option<ComponentPosterior>> = stats
            .par_iter()
            .map(|s| prior.posterior(s, reg_covar))
            .collect();

        for (k, (slot, next)) in self.components.iter_mut().zip(updated).enumerate() {
            match next {
                Some(component) => *slot = component,
                None => {
                    warn!(
                        "Component {} is numerically degenerate at iteration {}; resetting to prior",
                        k, iteration
                    );
                    if let Some(reset) = prior.component(reg_covar) {
                        *slot = reset;
                    }
                }
            }
        }
    }

    /// Evidence lower bound, up to a constant.
    fn lower_bound(&self, log_resp: &[Vec<f64>]) -> f64 {
        let dim = self.prior.mean.len();
        #[allow(clippy::cast_precision_loss)]
        let d = dim as f64;

        let entropy: f64 = log_resp
            .iter()
            .flatten()
            .map(|&l| {
                let r = l.exp();
                if r > 0.0 {
                    -r * l
                } else {
                    0.0
                }
            })
            .sum();
        let wishart: f64 = self
            .components
            .iter()
            .map(|c| ln_wishart_norm(c.dof, c.factor.ln_det(), dim))
            .sum();
        let mean_precision: f64 = self.components.iter().map(|c| c.mean_precision.ln()).sum();

        entropy + wishart + self.sticks.ln_normalizer() - 0.5 * d * mean_precision
    }

    fn into_model(self, concentration: f64, convergence: Convergence) -> GaussianMixtureModel {
        let dim = self.prior.mean.len();
        let weights = self.sticks.expected_weights();
        let ranks = self.sticks.ranks();
        let components = self
            .components
            .into_iter()
            .zip(self.sticks.breaks())
            .zip(weights.into_iter().zip(ranks))
            .map(|((c, stick), (weight, stick_rank))| MixtureComponent {
                weight,
                mean: c.mean,
                covariance: c.covariance,
                stick: *stick,
                stick_rank,
                mean_precision: c.mean_precision,
                degrees_of_freedom: c.dof,
                effective_count: c.count,
            })
            .collect();
        GaussianMixtureModel::new(dim, concentration, self.reg_covar, components, convergence)
    }
}

fn exp_rows(log_resp: &[Vec<f64>]) -> Vec<Vec<f64>> {
    log_resp
        .iter()
        .map(|row| row.iter().map(|l| l.exp()).collect())
        .collect()
}

/// Fits a [`GaussianMixtureModel`] to an [`ObservationSet`].
#[derive(Clone, Debug, Default)]
pub struct VariationalDpFitter {
    options: FitOptions,
}

impl VariationalDpFitter {
    /// # Errors
    /// If `options` fails [`FitOptions::validate`].
    pub fn new(options: FitOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub const fn options(&self) -> &FitOptions {
        &self.options
    }

    /// Fit with an initialisation seeded from [`FitOptions::seed`].
    ///
    /// # Errors
    /// See [`VariationalDpFitter::fit_with_rng`].
    pub fn fit(&self, observations: &ObservationSet) -> Result<GaussianMixtureModel> {
        let mut rng = Xoshiro256Plus::seed_from_u64(self.options.seed);
        self.fit_with_rng(observations, &mut rng)
    }

    /// Fit drawing initial responsibilities from `rng`.
    ///
    /// Running out of iterations is not an error; inspect
    /// [`GaussianMixtureModel::convergence`].
    ///
    /// # Errors
    /// [`ProfileError::TooFewObservations`] for fewer than
    /// [`MIN_OBSERVATIONS`] points and [`ProfileError::InvalidParameter`] for
    /// invalid options.
    pub fn fit_with_rng<R: Rng>(
        &self,
        observations: &ObservationSet,
        rng: &mut R,
    ) -> Result<GaussianMixtureModel> {
        self.options.validate()?;
        if observations.len() < MIN_OBSERVATIONS {
            return Err(ProfileError::TooFewObservations {
                found: observations.len(),
                required: MIN_OBSERVATIONS,
            });
        }

        let options = &self.options;
        let prior = NormalWishartPrior::from_data(observations, options)?;
        let points = observations.points();

        let mut best: Option<(FitState, Convergence)> = None;
        for run in 0..options.n_init {
            let mut state = FitState::new(points, &prior, options)?;
            let resp = options
                .init
                .responsibilities(points, options.n_components, rng);
            state.m_step(&resp, 0);

            let mut lower_bound = f64::NEG_INFINITY;
            let mut convergence = Convergence {
                n_iter: 0,
                converged: false,
                lower_bound,
            };
            for iteration in 1..=options.max_iter {
                let prev = lower_bound;
                let log_resp = state.e_step();
                state.m_step(&exp_rows(&log_resp), iteration);
                lower_bound = state.lower_bound(&log_resp);

                let change = lower_bound - prev;
                debug!(
                    "Run {}, iteration {}: lower bound {:.6} (change {:.3e})",
                    run, iteration, lower_bound, change
                );
                convergence = Convergence {
                    n_iter: iteration,
                    converged: change.abs() < options.tol,
                    lower_bound,
                };
                if convergence.converged {
                    break;
                }
            }

            if !convergence.converged {
                warn!(
                    "Run {} did not converge within {} iterations (lower bound {:.6})",
                    run, options.max_iter, lower_bound
                );
            }

            let better = best
                .as_ref()
                .map_or(true, |(_, c)| convergence.lower_bound > c.lower_bound);
            if better {
                best = Some((state, convergence));
            }
        }

        let (state, convergence) = best.ok_or(ProfileError::invalid(
            "n_init",
            0.0,
            "must be >= 1",
        ))?;
        let model = state.into_model(options.concentration, convergence);
        info!(
            "Variational fit finished after {} iterations (converged: {}, lower bound {:.6}, active components: {})",
            convergence.n_iter,
            convergence.converged,
            convergence.lower_bound,
            model.n_active(LOG_ACTIVE_THRESHOLD)
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use rv::dist::Gaussian;
    use rv::traits::Sampleable;

    use super::*;

    fn blob(n: usize, center: (f64, f64), sd: f64, rng: &mut Xoshiro256Plus) -> Vec<(f64, f64)> {
        let gx = Gaussian::new(center.0, sd).unwrap();
        let gy = Gaussian::new(center.1, sd).unwrap();
        let xs: Vec<f64> = gx.sample(n, rng);
        let ys: Vec<f64> = gy.sample(n, rng);
        xs.into_iter().zip(ys).collect()
    }

    fn tight_cluster() -> ObservationSet {
        let mut rng = Xoshiro256Plus::seed_from_u64(0xABCD);
        ObservationSet::new(blob(50, (3.0, -2.0), 0.05, &mut rng)).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let options = FitOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.n_components, 10);
        assert_eq!(options.max_iter, 1000);
        assert_eq!(options.init, Initialization::Random);
        assert!(options.n_init > 1);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let bad = [
            FitOptions {
                n_components: 0,
                ..FitOptions::default()
            },
            FitOptions {
                concentration: 0.0,
                ..FitOptions::default()
            },
            FitOptions {
                tol: -1.0,
                ..FitOptions::default()
            },
            FitOptions {
                max_iter: 0,
                ..FitOptions::default()
            },
            FitOptions {
                n_init: 0,
                ..FitOptions::default()
            },
            FitOptions {
                reg_covar: f64::NAN,
                ..FitOptions::default()
            },
            FitOptions {
                degrees_of_freedom_prior: Some(0.5),
                ..FitOptions::default()
            },
        ];
        for options in bad {
            let err = VariationalDpFitter::new(options.clone()).unwrap_err();
            assert!(err.is_invalid_input(), "{options:?} gave {err}");
        }
    }

    #[test]
    fn prior_covariance_scales_the_data_covariance() {
        let obs = tight_cluster();
        let options = FitOptions {
            covariance_prior_scale: 4.0,
            ..FitOptions::default()
        };
        let prior = NormalWishartPrior::from_data(&obs, &options).unwrap();
        let expected = obs.covariance() * 4.0 + DMatrix::identity(2, 2) * options.reg_covar;
        assert::close(
            prior.covariance.as_slice().to_vec(),
            expected.as_slice().to_vec(),
            1e-12,
        );
        assert_eq!(FitOptions::default().covariance_prior_scale, 1.0);
    }

    #[test]
    fn single_observation_is_rejected() {
        let obs = ObservationSet::from_rows(&[[51.5, -0.1]]).unwrap();
        let err = VariationalDpFitter::default().fit(&obs).unwrap_err();
        assert_eq!(
            err,
            ProfileError::TooFewObservations {
                found: 1,
                required: 2
            }
        );
    }

    #[test]
    fn fit_is_deterministic() {
        let obs = tight_cluster();
        let fitter = VariationalDpFitter::default();
        let a = fitter.fit(&obs).unwrap();
        let b = fitter.fit(&obs).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn always_returns_k_components_with_unit_weight() {
        let obs = tight_cluster();
        for (n_components, concentration) in [(1, 1e-2), (3, 1.0), (10, 1e-2), (10, 5.0)] {
            for init in [Initialization::KMeans, Initialization::Random] {
                let fitter = VariationalDpFitter::new(FitOptions {
                    n_components,
                    concentration,
                    init,
                    max_iter: 200,
                    ..FitOptions::default()
                })
                .unwrap();
                let model = fitter.fit(&obs).unwrap();
                assert_eq!(model.n_components(), n_components);
                assert::close(model.weights().iter().sum::<f64>(), 1.0, 1e-6);
                assert!(model.lower_bound().is_finite());
            }
        }
    }

    #[test]
    fn single_cluster_collapses_to_one_component() {
        let obs = tight_cluster();
        let model = VariationalDpFitter::default().fit(&obs).unwrap();

        assert_eq!(model.n_active(0.01), 1, "{model:?}");
        let (anchor, weight) = &model.anchor_points(0.01)[0];
        assert!(*weight > 0.9, "{weight}");
        assert!((anchor[0] - 3.0).abs() < 0.05, "{anchor}");
        assert!((anchor[1] + 2.0).abs() < 0.05, "{anchor}");
    }

    #[test]
    fn single_cluster_collapses_for_every_seed() {
        for seed in 0..10 {
            let mut rng = Xoshiro256Plus::seed_from_u64(seed);
            let obs = ObservationSet::new(blob(40, (3.0, -2.0), 0.05, &mut rng)).unwrap();
            let fitter = VariationalDpFitter::new(FitOptions {
                concentration: 1e-3,
                seed,
                ..FitOptions::default()
            })
            .unwrap();
            let model = fitter.fit(&obs).unwrap();

            assert_eq!(model.n_active(0.01), 1, "seed {seed}: {model:?}");
            let (anchor, _) = &model.anchor_points(0.01)[0];
            let offset = (anchor - DVector::from_column_slice(&[3.0, -2.0])).norm();
            assert!(offset < 0.05, "seed {seed}: anchor at {anchor}");
        }
    }

    #[test]
    fn sticks_are_ordered_by_effective_count() {
        let obs = tight_cluster();
        for init in [Initialization::KMeans, Initialization::Random] {
            let fitter = VariationalDpFitter::new(FitOptions {
                init,
                ..FitOptions::default()
            })
            .unwrap();
            let model = fitter.fit(&obs).unwrap();
            let counts: Vec<f64> = model
                .stick_order()
                .into_iter()
                .map(|k| model.components()[k].effective_count)
                .collect();
            assert!(counts.windows(2).all(|w| w[0] >= w[1]), "{counts:?}");
        }
    }

    #[test]
    fn more_components_than_observations() {
        let obs = ObservationSet::from_rows(&[[0.0, 0.0], [1.0, 0.5], [0.2, 1.0]]).unwrap();
        let model = VariationalDpFitter::default().fit(&obs).unwrap();
        assert_eq!(model.n_components(), 10);
        assert::close(model.weights().iter().sum::<f64>(), 1.0, 1e-6);
        assert!(model
            .components()
            .iter()
            .all(|c| c.covariance.clone().cholesky().is_some()));
    }

    #[test]
    fn collinear_points_still_fit() {
        let obs = ObservationSet::new((0..20).map(|i| (f64::from(i), 2.0 * f64::from(i)))).unwrap();
        let model = VariationalDpFitter::default().fit(&obs).unwrap();
        assert::close(model.weights().iter().sum::<f64>(), 1.0, 1e-6);
    }

    #[test]
    fn duplicate_points_still_fit() {
        let obs = ObservationSet::from_rows(&[[1.0, 1.0]; 8]).unwrap();
        let model = VariationalDpFitter::default().fit(&obs).unwrap();
        let anchors = model.anchor_points(0.01);
        assert!(!anchors.is_empty());
        assert::close(anchors[0].0.as_slice().to_vec(), vec![1.0, 1.0], 1e-6);
    }

    #[test]
    fn tiny_iteration_budget_reports_non_convergence() {
        let fitter = VariationalDpFitter::new(FitOptions {
            max_iter: 1,
            ..FitOptions::default()
        })
        .unwrap();
        let model = fitter.fit(&tight_cluster()).unwrap();
        assert!(!model.is_converged());
        assert_eq!(model.convergence().n_iter, 1);
    }

    #[test]
    fn restarts_keep_the_best_lower_bound() {
        let obs = tight_cluster();
        let single = VariationalDpFitter::new(FitOptions {
            init: Initialization::Random,
            n_init: 1,
            ..FitOptions::default()
        })
        .unwrap()
        .fit(&obs)
        .unwrap();
        let multi = VariationalDpFitter::new(FitOptions {
            init: Initialization::Random,
            n_init: 5,
            ..FitOptions::default()
        })
        .unwrap()
        .fit(&obs)
        .unwrap();
        // The first restart draws the same initialisation as the single run.
        assert!(multi.lower_bound() >= single.lower_bound());
    }
}
