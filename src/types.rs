//! Core types shared across the optimizer.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A hyper-rectangular search domain `[lower, upper] ⊂ ℝ^d`.
///
/// All internal bookkeeping happens in coordinates normalized to the unit
/// box `[0, 1]^d`; the domain holds the affine map between the two.
///
/// # Examples
///
/// ```
/// use gpso::Domain;
///
/// let domain = Domain::new(vec![-1.0, -1.0], vec![1.0, 1.0]).unwrap();
/// assert_eq!(domain.dim(), 2);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Domain {
    /// Creates a domain from per-axis lower and upper bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyDomain`] for zero dimensions,
    /// [`Error::DimensionMismatch`] if the bound vectors differ in length,
    /// and [`Error::InvalidBounds`] if any interval is empty, inverted, or
    /// non-finite.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.is_empty() {
            return Err(Error::EmptyDomain);
        }
        if lower.len() != upper.len() {
            return Err(Error::DimensionMismatch {
                expected: lower.len(),
                got: upper.len(),
            });
        }
        for (axis, (&low, &high)) in lower.iter().zip(&upper).enumerate() {
            if !low.is_finite() || !high.is_finite() || high <= low {
                return Err(Error::InvalidBounds { axis, low, high });
            }
        }
        Ok(Self { lower, upper })
    }

    /// The number of dimensions.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// The per-axis lower bounds.
    #[must_use]
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// The per-axis upper bounds.
    #[must_use]
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }
}

/// A single evaluated point in ORIGINAL (domain) coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// The coordinates where the objective was evaluated.
    pub x: Vec<f64>,
    /// The objective value observed there.
    pub value: f64,
}

/// The objective function being maximized.
///
/// Receives a point in ORIGINAL (non-normalized) coordinates and returns a
/// finite scalar. The optimizer may call it tens to thousands of times, so
/// this is where all the expensive work lives.
///
/// # Closures work directly
///
/// Any `FnMut(&[f64]) -> f64` closure implements `Objective` through the
/// blanket impl, so plain closures can be passed straight to
/// [`Gpso::run`](crate::Gpso::run):
///
/// ```
/// use gpso::{Domain, Gpso};
///
/// let domain = Domain::new(vec![0.0], vec![1.0]).unwrap();
/// let mut opt = Gpso::builder().varsigma(3.0).build().unwrap();
/// let result = opt.run(|x: &[f64]| -(x[0] - 0.25).powi(2), &domain, 10).unwrap();
/// assert!(result.solution.value <= 0.0);
/// ```
pub trait Objective {
    /// Evaluates the objective at `x` (original coordinates).
    fn evaluate(&mut self, x: &[f64]) -> f64;
}

/// Blanket implementation: any `FnMut(&[f64]) -> f64` is an `Objective`.
impl<F> Objective for F
where
    F: FnMut(&[f64]) -> f64,
{
    fn evaluate(&mut self, x: &[f64]) -> f64 {
        self(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_rejects_empty() {
        assert!(matches!(
            Domain::new(vec![], vec![]),
            Err(Error::EmptyDomain)
        ));
    }

    #[test]
    fn test_domain_rejects_mismatched_bounds() {
        assert!(matches!(
            Domain::new(vec![0.0, 0.0], vec![1.0]),
            Err(Error::DimensionMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_domain_rejects_zero_width_axis() {
        assert!(matches!(
            Domain::new(vec![0.0, 2.0], vec![1.0, 2.0]),
            Err(Error::InvalidBounds { axis: 1, .. })
        ));
    }

    #[test]
    fn test_domain_rejects_non_finite_bounds() {
        assert!(matches!(
            Domain::new(vec![f64::NEG_INFINITY], vec![1.0]),
            Err(Error::InvalidBounds { axis: 0, .. })
        ));
    }
}
