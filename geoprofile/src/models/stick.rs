//! Truncated stick-breaking posterior over mixture weights.
//!
//! Under a Dirichlet process with concentration `α` the `k`-th weight is
//! `π_k = v_k ∏_{j<k} (1 - v_j)` with `v_k ~ Beta(1, α)`. The variational
//! posterior keeps one `Beta(a_k, b_k)` per break; with `K` breaks the last
//! component absorbs whatever stick remains.
//!
//! Components are exchangeable under the variational posterior, so the
//! breaks are assigned to components in order of decreasing effective count.
//! Components keep their index; only the position of their break moves.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use special::{Beta as _, Gamma as _};

use crate::error::{ProfileError, Result};

/// Beta posterior over one stick fraction `v_k`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StickPosterior {
    /// Pseudo-count for breaking at this component.
    pub alpha: f64,
    /// Pseudo-count for passing on to later components.
    pub beta: f64,
}

impl StickPosterior {
    pub const fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    /// `E[v]`
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// `E[ln v]`
    pub fn expected_ln_break(&self) -> f64 {
        self.alpha.digamma() - (self.alpha + self.beta).digamma()
    }

    /// `E[ln (1 - v)]`
    pub fn expected_ln_pass(&self) -> f64 {
        self.beta.digamma() - (self.alpha + self.beta).digamma()
    }

    pub fn ln_beta(&self) -> f64 {
        self.alpha.ln_beta(self.beta)
    }
}

/// Stick-breaking posterior truncated at a fixed number of components.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct StickBreaking {
    concentration: f64,
    /// One break per component, indexed by component.
    breaks: Vec<StickPosterior>,
    /// Components in stick order.
    order: Vec<usize>,
}

impl StickBreaking {
    /// Prior sticks, `Beta(1, α)` for each of `n_components` breaks.
    ///
    /// # Errors
    /// If `concentration` is not finite and positive or `n_components` is zero.
    pub fn new(concentration: f64, n_components: usize) -> Result<Self> {
        if !(concentration.is_finite() && concentration > 0.0) {
            return Err(ProfileError::invalid(
                "concentration",
                concentration,
                "must be finite and > 0",
            ));
        }
        if n_components == 0 {
            return Err(ProfileError::invalid(
                "n_components",
                0.0,
                "at least one component is required",
            ));
        }
        Ok(Self {
            concentration,
            breaks: vec![StickPosterior::new(1.0, concentration); n_components],
            order: (0..n_components).collect(),
        })
    }

    pub const fn concentration(&self) -> f64 {
        self.concentration
    }

    /// Break of every component, by component index.
    pub fn breaks(&self) -> &[StickPosterior] {
        &self.breaks
    }

    /// Component indices in the order their breaks are taken from the stick.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Position of every component's break in the stick.
    pub fn ranks(&self) -> Vec<usize> {
        let mut ranks = vec![0; self.order.len()];
        for (rank, &k) in self.order.iter().enumerate() {
            ranks[k] = rank;
        }
        ranks
    }

    pub fn len(&self) -> usize {
        self.breaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breaks.is_empty()
    }

    /// Condition the sticks on the effective counts of each component.
    ///
    /// The stick order is first re-sorted by decreasing count, ties keeping
    /// their previous order. Then, walking the stick,
    /// `a_k = 1 + N_k` and `b_k = α + Σ_{j after k} N_j`.
    ///
    /// # Panics
    /// If `counts` does not have one entry per break.
    pub fn update(&mut self, counts: &[f64]) {
        assert_eq!(
            counts.len(),
            self.breaks.len(),
            "one effective count per component is required"
        );
        self.order.sort_by(|&i, &j| counts[j].total_cmp(&counts[i]));

        let mut remaining: f64 = counts.iter().sum();
        for &k in &self.order {
            remaining -= counts[k];
            let stick = &mut self.breaks[k];
            stick.alpha = 1.0 + counts[k];
            stick.beta = self.concentration + remaining.max(0.0);
        }
    }

    /// `E[ln π_k] = E[ln v_k] + Σ_{j before k} E[ln(1 - v_j)]`, by component.
    pub fn expected_ln_weights(&self) -> Vec<f64> {
        expected_ln_weights(&self.breaks, &self.order)
    }

    /// Mixing weights from the expected break fractions, normalised over the
    /// truncated components.
    pub fn expected_weights(&self) -> Vec<f64> {
        let breaks = BreakSequence(self.order.iter().map(|&k| self.breaks[k].mean()).collect());
        let in_order = PartialWeights::from(&breaks).normalized();

        let mut weights = vec![0.0; self.breaks.len()];
        for (&k, w) in self.order.iter().zip(in_order) {
            weights[k] = w;
        }
        weights
    }

    /// `Σ_k ln B(a_k, b_k)`, the stick contribution to the lower bound.
    pub fn ln_normalizer(&self) -> f64 {
        self.breaks.iter().map(StickPosterior::ln_beta).sum()
    }
}

/// `E[ln π_k]` for every component, given its break and the order in which
/// breaks are taken from the stick.
///
/// # Panics
/// If `order` names a component outside `sticks`.
pub fn expected_ln_weights(sticks: &[StickPosterior], order: &[usize]) -> Vec<f64> {
    let mut ln_weights = vec![f64::NEG_INFINITY; sticks.len()];
    let mut passed = 0.0;
    for &k in order {
        let stick = &sticks[k];
        ln_weights[k] = stick.expected_ln_break() + passed;
        passed += stick.expected_ln_pass();
    }
    ln_weights
}

/// Fractions broken off the remaining stick, each in `[0, 1]`.
pub struct BreakSequence(pub Vec<f64>);

/// Weights of the first components of a stick-breaking sequence; they sum to
/// at most one.
pub struct PartialWeights(pub Vec<f64>);

impl From<&BreakSequence> for PartialWeights {
    fn from(bs: &BreakSequence) -> Self {
        let mut remaining = 1.0;
        let ws =
            bs.0.iter()
                .map(|v| {
                    debug_assert!((0.0..=1.0).contains(v));
                    let w = v * remaining;
                    remaining *= 1.0 - v;
                    w
                })
                .collect();
        Self(ws)
    }
}

impl PartialWeights {
    /// Mass not yet assigned to any of the listed components.
    pub fn remaining(&self) -> f64 {
        (1.0 - self.0.iter().sum::<f64>()).max(0.0)
    }

    /// Rescale so the weights sum to one.
    pub fn normalized(self) -> Vec<f64> {
        let total: f64 = self.0.iter().sum();
        if total > 0.0 {
            self.0.into_iter().map(|w| w / total).collect()
        } else {
            #[allow(clippy::cast_precision_loss)]
            let uniform = 1.0 / self.0.len() as f64;
            vec![uniform; self.0.len()]
        }
    }
}
