//! Fitted mixture models and the variational families they are built from.

pub mod mixture;
pub mod stick;
pub(crate) mod wishart;

pub use mixture::{Convergence, GaussianMixtureModel, MixtureComponent};
pub use stick::{BreakSequence, PartialWeights, StickBreaking, StickPosterior};
