use nalgebra::DVector;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result};

/// One grid point of the rendered surface.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct DensitySample {
    pub point: DVector<f64>,
    /// Normalised density in `[0, 1]`.
    pub density: f64,
}

/// Min-max scales densities over a grid and drops the faint ones.
///
/// The scale is relative to the grid it is given: the densest grid point
/// maps to one and the faintest to zero, so values from grids with different
/// bounds are not comparable.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceNormalizer {
    /// Samples with a normalised density at or below this are dropped.
    pub threshold: f64,
}

impl Default for SurfaceNormalizer {
    fn default() -> Self {
        Self { threshold: 0.1 }
    }
}

impl SurfaceNormalizer {
    /// # Errors
    /// See [`SurfaceNormalizer::validate`].
    pub fn new(threshold: f64) -> Result<Self> {
        let normalizer = Self { threshold };
        normalizer.validate()?;
        Ok(normalizer)
    }

    /// # Errors
    /// [`ProfileError::InvalidParameter`] unless the threshold is in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if (0.0..=1.0).contains(&self.threshold) {
            Ok(())
        } else {
            Err(ProfileError::invalid(
                "density_threshold",
                self.threshold,
                "must be in [0, 1]",
            ))
        }
    }

    /// Map log-densities to `[0, 1]` linear densities.
    ///
    /// `-inf` is a valid input (zero density). Scaling is done relative to the
    /// largest log-density so very peaked or very flat surfaces neither
    /// overflow nor underflow before the division.
    ///
    /// # Errors
    /// [`ProfileError::NonFiniteDensity`] for NaN or `+inf` input and
    /// [`ProfileError::DegenerateSurface`] if every density is the same.
    pub fn normalize(&self, ln_densities: &[f64]) -> Result<Vec<f64>> {
        if let Some(index) = ln_densities
            .iter()
            .position(|l| l.is_nan() || *l == f64::INFINITY)
        {
            return Err(ProfileError::NonFiniteDensity { index });
        }
        if ln_densities.is_empty() {
            return Ok(Vec::new());
        }

        let ln_max = ln_densities
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if ln_max == f64::NEG_INFINITY {
            return Err(ProfileError::DegenerateSurface { value: 0.0 });
        }

        let shifted: Vec<f64> = ln_densities.iter().map(|l| (l - ln_max).exp()).collect();
        let lo = shifted.iter().copied().fold(f64::INFINITY, f64::min);
        let span = 1.0 - lo;
        if span <= 0.0 {
            return Err(ProfileError::DegenerateSurface {
                value: ln_max.exp(),
            });
        }

        let scaled: Vec<f64> = shifted.into_iter().map(|p| (p - lo) / span).collect();
        if scaled.iter().all(|p| p.is_finite()) {
            Ok(scaled)
        } else {
            Err(ProfileError::DegenerateSurface {
                value: ln_max.exp(),
            })
        }
    }

    /// Samples whose density is strictly above the threshold, in grid order.
    ///
    /// `points` and `densities` are paired by index; any excess in the longer
    /// slice is ignored.
    pub fn filter(&self, points: &[DVector<f64>], densities: &[f64]) -> Vec<DensitySample> {
        points
            .iter()
            .zip(densities)
            .filter(|(_, &d)| d > self.threshold)
            .map(|(p, &density)| DensitySample {
                point: p.clone(),
                density,
            })
            .collect()
    }
}
