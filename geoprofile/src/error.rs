//! Errors for geographic profiling (input validation, scoring and surface
//! normalisation).
//!
//! Numerical trouble inside the variational fit is recovered locally and only
//! logged; the variants here are the conditions a caller has to act on.
//!
//! ## Conventions
//! - **Indices are 0-based**, components are addressed by creation index.
//! - A fit that runs out of iterations is *not* an error, see
//!   [`Convergence`](crate::models::mixture::Convergence).

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    // ---- Input validation ----
    /// The observation set contains no points.
    #[error("observation set is empty")]
    EmptyObservations,

    /// Too few observations to estimate a covariance.
    #[error("at least {required} observations are required, found {found}")]
    TooFewObservations { found: usize, required: usize },

    /// An observation coordinate is NaN or infinite.
    #[error("observation {index} has a non-finite coordinate on axis {axis}: {value}")]
    NonFiniteObservation {
        index: usize,
        axis: usize,
        value: f64,
    },

    /// A configuration parameter is outside its domain.
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    // ---- Scoring ----
    /// A query point does not have the model's dimensionality.
    #[error("dimension mismatch: model has {expected} dimensions, point has {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A component's scale matrix is not positive definite even after
    /// regularisation.
    #[error("component {component} is numerically degenerate (iteration {iteration:?})")]
    NumericalDegeneracy {
        component: usize,
        iteration: Option<usize>,
    },

    // ---- Surface ----
    /// Every grid point has the same density so min-max scaling is undefined.
    #[error("density surface is flat (every value is {value}), cannot normalise")]
    DegenerateSurface { value: f64 },

    /// A log-density handed to the normaliser is NaN or `+inf`.
    #[error("log-density at grid index {index} is not finite")]
    NonFiniteDensity { index: usize },
}

impl ProfileError {
    /// Whether this error rejects the caller's input before any computation.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::EmptyObservations
                | Self::TooFewObservations { .. }
                | Self::NonFiniteObservation { .. }
                | Self::InvalidParameter { .. }
        )
    }

    pub(crate) const fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}
