use std::ops::Index;

use nalgebra::{DMatrix, DVector};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result};

/// Dimensionality of every observation (planar coordinates, e.g. lat/lon).
pub const DIM: usize = 2;

/// An ordered, validated, non-empty collection of 2D observations.
///
/// Points are stored as column vectors so they can be handed directly to the
/// linear algebra in the fitter and scorer.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationSet {
    points: Vec<DVector<f64>>,
}

impl ObservationSet {
    /// Build an observation set from `(x, y)` pairs.
    ///
    /// # Errors
    /// [`ProfileError::EmptyObservations`] if `pairs` is empty and
    /// [`ProfileError::NonFiniteObservation`] if any coordinate is NaN or infinite.
    pub fn new<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let points: Vec<DVector<f64>> = pairs
            .into_iter()
            .map(|(x, y)| DVector::from_column_slice(&[x, y]))
            .collect();

        if points.is_empty() {
            return Err(ProfileError::EmptyObservations);
        }

        for (index, p) in points.iter().enumerate() {
            if let Some((axis, &value)) = p.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                return Err(ProfileError::NonFiniteObservation { index, axis, value });
            }
        }

        Ok(Self { points })
    }

    /// Build an observation set from `[x, y]` rows.
    ///
    /// # Errors
    /// See [`ObservationSet::new`].
    pub fn from_rows(rows: &[[f64; DIM]]) -> Result<Self> {
        Self::new(rows.iter().map(|[x, y]| (*x, *y)))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`, construction rejects empty sets.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub const fn dim(&self) -> usize {
        DIM
    }

    pub fn points(&self) -> &[DVector<f64>] {
        &self.points
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &DVector<f64>> {
        self.points.iter()
    }

    /// Arithmetic mean of the observations.
    #[allow(clippy::cast_precision_loss)]
    pub fn centroid(&self) -> DVector<f64> {
        let sum = self
            .points
            .iter()
            .fold(DVector::<f64>::zeros(DIM), |acc, p| acc + p);
        sum / self.points.len() as f64
    }

    /// Unbiased sample covariance (`n - 1` denominator).
    ///
    /// A single observation has no spread, so its covariance is the zero matrix.
    #[allow(clippy::cast_precision_loss)]
    pub fn covariance(&self) -> DMatrix<f64> {
        let n = self.points.len();
        if n < 2 {
            return DMatrix::zeros(DIM, DIM);
        }
        let mean = self.centroid();
        let scatter = self.points.iter().fold(DMatrix::<f64>::zeros(DIM, DIM), |acc, p| {
            let diff = p - &mean;
            acc + &diff * diff.transpose()
        });
        scatter / (n - 1) as f64
    }

    /// Axis-aligned bounding box of the observations.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut min = [f64::INFINITY; DIM];
        let mut max = [f64::NEG_INFINITY; DIM];
        for p in &self.points {
            for axis in 0..DIM {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        BoundingBox { min, max }
    }
}

impl Index<usize> for ObservationSet {
    type Output = DVector<f64>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

/// Axis-aligned rectangle, `min[axis] <= max[axis]`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: [f64; DIM],
    pub max: [f64; DIM],
}

impl BoundingBox {
    pub fn extent(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    /// Grow each side of the box by `margins[axis]`.
    #[must_use]
    pub fn expand(&self, margins: [f64; DIM]) -> Self {
        let mut min = self.min;
        let mut max = self.max;
        for axis in 0..DIM {
            min[axis] -= margins[axis];
            max[axis] += margins[axis];
        }
        Self { min, max }
    }

    pub fn contains(&self, point: &DVector<f64>) -> bool {
        (0..DIM).all(|axis| (self.min[axis]..=self.max[axis]).contains(&point[axis]))
    }
}
