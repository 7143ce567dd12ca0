pub mod observations;

pub use observations::{BoundingBox, ObservationSet, DIM};
