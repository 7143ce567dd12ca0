//! Density surfaces: the evaluation grid and its normalisation for display.

pub mod grid;
pub mod normalize;

pub use grid::{DensityGridBuilder, Grid, Padding};
pub use normalize::{DensitySample, SurfaceNormalizer};
