//! End-to-end geographic profile: fit, grid, score, normalise, filter.

use nalgebra::DVector;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::ObservationSet;
use crate::error::{ProfileError, Result};
use crate::models::mixture::GaussianMixtureModel;
use crate::scoring::MixtureScorer;
use crate::surface::{DensityGridBuilder, DensitySample, Grid, SurfaceNormalizer};
use crate::variational::{FitOptions, VariationalDpFitter};

/// Every knob of a [`GeoProfiler`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileConfig {
    pub fit: FitOptions,
    pub grid: DensityGridBuilder,
    /// Normalised density a grid point must exceed to be kept as a sample.
    pub density_threshold: f64,
    /// Weight a component must exceed to count as an anchor.
    pub active_threshold: f64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            fit: FitOptions::default(),
            grid: DensityGridBuilder::default(),
            density_threshold: 0.1,
            active_threshold: 0.01,
        }
    }
}

impl ProfileConfig {
    /// # Errors
    /// [`ProfileError::InvalidParameter`] for the first invalid option.
    pub fn validate(&self) -> Result<()> {
        self.fit.validate()?;
        self.grid.validate()?;
        SurfaceNormalizer::new(self.density_threshold)?;
        if !(0.0..=1.0).contains(&self.active_threshold) {
            return Err(ProfileError::invalid(
                "active_threshold",
                self.active_threshold,
                "must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Runs the whole profiling pipeline for one observation set.
#[derive(Clone, Debug, Default)]
pub struct GeoProfiler {
    config: ProfileConfig,
}

impl GeoProfiler {
    /// # Errors
    /// If `config` fails [`ProfileConfig::validate`].
    pub fn new(config: ProfileConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub const fn config(&self) -> &ProfileConfig {
        &self.config
    }

    /// # Errors
    /// Input validation errors from the fitter, and
    /// [`ProfileError::DegenerateSurface`] if the surface is flat over the
    /// grid.
    pub fn profile<'a>(&self, observations: &'a ObservationSet) -> Result<GeoProfile<'a>> {
        self.config.validate()?;
        let model = VariationalDpFitter::new(self.config.fit.clone())?.fit(observations)?;

        let grid = self.config.grid.build(observations)?;
        let points = grid.points();
        let ln_densities = MixtureScorer::new(&model)?.score_grid(&points)?;

        let normalizer = SurfaceNormalizer::new(self.config.density_threshold)?;
        let surface = normalizer.normalize(&ln_densities)?;
        let samples = normalizer.filter(&points, &surface);

        info!(
            "Profiled {} observations: {} active components, {} of {} grid points above {}",
            observations.len(),
            model.n_active(self.config.active_threshold),
            samples.len(),
            grid.len(),
            self.config.density_threshold
        );

        Ok(GeoProfile {
            observations,
            model,
            grid,
            points,
            surface,
            samples,
            active_threshold: self.config.active_threshold,
        })
    }
}

/// Output of [`GeoProfiler::profile`], ready to hand to a renderer.
#[derive(Clone, Debug)]
pub struct GeoProfile<'a> {
    observations: &'a ObservationSet,
    model: GaussianMixtureModel,
    grid: Grid,
    points: Vec<DVector<f64>>,
    surface: Vec<f64>,
    samples: Vec<DensitySample>,
    active_threshold: f64,
}

impl<'a> GeoProfile<'a> {
    pub const fn observations(&self) -> &'a ObservationSet {
        self.observations
    }

    pub const fn model(&self) -> &GaussianMixtureModel {
        &self.model
    }

    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Grid points in surface order.
    pub fn points(&self) -> &[DVector<f64>] {
        &self.points
    }

    /// Normalised density of every grid point.
    pub fn surface(&self) -> &[f64] {
        &self.surface
    }

    /// Grid points above the density threshold.
    pub fn samples(&self) -> &[DensitySample] {
        &self.samples
    }

    pub fn n_active(&self) -> usize {
        self.model.n_active(self.active_threshold)
    }

    /// Estimated anchor points, heaviest first.
    pub fn anchor_points(&self) -> Vec<(DVector<f64>, f64)> {
        self.model.anchor_points(self.active_threshold)
    }

    /// Grid point of maximum density.
    pub fn peak(&self) -> Option<DensitySample> {
        self.surface
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, &density)| DensitySample {
                point: self.points[i].clone(),
                density,
            })
    }
}
