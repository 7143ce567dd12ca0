//! Geographic profiling with a Dirichlet-process Gaussian mixture.
//!
//! Observations are fit with truncated stick-breaking variational inference
//! ([`variational`]); the fitted [`GaussianMixtureModel`] is scored on a
//! regular grid with its posterior-predictive density ([`scoring`]) and the
//! scores are normalised into a display surface ([`surface`]). [`profile`]
//! chains these stages.
//!
//! ```no_run
//! use geoprofile::{GeoProfiler, ObservationSet};
//!
//! # fn main() -> geoprofile::Result<()> {
//! let observations = ObservationSet::new(vec![(51.526, -0.078), (51.527, -0.079), (51.541, -0.088)])?;
//! let profile = GeoProfiler::default().profile(&observations)?;
//! for (anchor, weight) in profile.anchor_points() {
//!     println!("{anchor:?} ({weight:.2})");
//! }
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod error;
pub mod models;
pub mod profile;
pub mod scoring;
pub mod surface;
pub mod utils;
pub mod variational;

pub use data::{BoundingBox, ObservationSet};
pub use error::{ProfileError, Result};
pub use models::{Convergence, GaussianMixtureModel, MixtureComponent};
pub use profile::{GeoProfile, GeoProfiler, ProfileConfig};
pub use scoring::{MixtureScorer, StudentTPredictive};
pub use surface::{DensityGridBuilder, DensitySample, Grid, Padding, SurfaceNormalizer};
pub use variational::{FitOptions, Initialization, VariationalDpFitter};
