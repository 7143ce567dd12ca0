use itertools::Itertools;
use nalgebra::DVector;
use rv::misc::linspace;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::data::{BoundingBox, ObservationSet, DIM};
use crate::error::{ProfileError, Result};

/// How far the grid extends beyond the observations on every side.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Padding {
    /// Fixed margin in coordinate units.
    Absolute(f64),
    /// Margin as a fraction of the observed extent along each axis.
    Fraction(f64),
}

impl Default for Padding {
    fn default() -> Self {
        Self::Absolute(0.01)
    }
}

impl Padding {
    fn value(self) -> f64 {
        match self {
            Self::Absolute(v) | Self::Fraction(v) => v,
        }
    }

    fn margins(self, bounds: &BoundingBox) -> [f64; DIM] {
        match self {
            Self::Absolute(v) => [v; DIM],
            Self::Fraction(f) => std::array::from_fn(|axis| f * bounds.extent(axis)),
        }
    }
}

/// Builds the regular lattice on which a density surface is evaluated.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DensityGridBuilder {
    pub padding: Padding,
    /// Points per axis.
    pub resolution: usize,
}

impl Default for DensityGridBuilder {
    fn default() -> Self {
        Self {
            padding: Padding::default(),
            resolution: 100,
        }
    }
}

impl DensityGridBuilder {
    /// # Errors
    /// See [`DensityGridBuilder::validate`].
    pub fn new(padding: Padding, resolution: usize) -> Result<Self> {
        let builder = Self {
            padding,
            resolution,
        };
        builder.validate()?;
        Ok(builder)
    }

    /// # Errors
    /// [`ProfileError::InvalidParameter`] if the padding is negative or not
    /// finite, or the resolution is below two or above `i32::MAX`.
    #[allow(clippy::cast_precision_loss)]
    pub fn validate(&self) -> Result<()> {
        let pad = self.padding.value();
        if !(pad.is_finite() && pad >= 0.0) {
            return Err(ProfileError::invalid(
                "padding",
                pad,
                "must be finite and >= 0",
            ));
        }
        if self.resolution < 2 {
            return Err(ProfileError::invalid(
                "resolution",
                self.resolution as f64,
                "at least two points per axis are required",
            ));
        }
        if i32::try_from(self.resolution).is_err() {
            return Err(ProfileError::invalid(
                "resolution",
                self.resolution as f64,
                "must fit in an i32",
            ));
        }
        Ok(())
    }

    /// Grid over the padded bounding box of `observations`.
    ///
    /// # Errors
    /// See [`DensityGridBuilder::validate`].
    pub fn build(&self, observations: &ObservationSet) -> Result<Grid> {
        self.validate()?;
        let bbox = observations.bounding_box();
        Ok(Grid {
            bounds: bbox.expand(self.padding.margins(&bbox)),
            resolution: self.resolution,
        })
    }
}

/// A `resolution × resolution` lattice over `bounds`.
///
/// Points are ordered with the first axis varying fastest.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grid {
    bounds: BoundingBox,
    resolution: usize,
}

impl Grid {
    pub const fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub const fn resolution(&self) -> usize {
        self.resolution
    }

    /// Total number of points.
    pub const fn len(&self) -> usize {
        self.resolution * self.resolution
    }

    pub const fn is_empty(&self) -> bool {
        self.resolution == 0
    }

    /// Evenly spaced coordinates along `axis`, both ends included.
    pub fn axis(&self, axis: usize) -> Vec<f64> {
        // resolution is checked against i32::MAX when the grid is built
        let num = i32::try_from(self.resolution).unwrap_or(i32::MAX);
        linspace(self.bounds.min[axis], self.bounds.max[axis], num)
    }

    pub fn points(&self) -> Vec<DVector<f64>> {
        let xs = self.axis(0);
        let ys = self.axis(1);
        ys.iter()
            .cartesian_product(xs.iter())
            .map(|(&y, &x)| DVector::from_column_slice(&[x, y]))
            .collect()
    }
}
