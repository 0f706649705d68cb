//! Mean, covariance, and likelihood functions as small tagged variants.
//!
//! Each variant implements `eval` plus the partial derivatives the trainer
//! needs (`grad` with respect to its own log-scale hyperparameters). No
//! runtime reflection: the set of functions is closed.

use serde::{Deserialize, Serialize};

/// Euclidean distance between two points.
fn dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Prior mean function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeanFn {
    /// A constant mean, the single hyperparameter being the constant itself.
    #[default]
    Const,
}

impl MeanFn {
    /// Evaluates the mean at a point.
    #[must_use]
    pub fn eval(&self, mean: f64, _x: &[f64]) -> f64 {
        match self {
            MeanFn::Const => mean,
        }
    }

    /// Derivative of the mean with respect to its hyperparameter.
    #[must_use]
    pub fn grad(&self, _mean: f64, _x: &[f64]) -> f64 {
        match self {
            MeanFn::Const => 1.0,
        }
    }
}

/// Isotropic covariance function.
///
/// Hyperparameters are stored log-scale as `[log ℓ, log sf]` (lengthscale
/// and signal standard deviation).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CovFn {
    /// Isotropic Matérn kernel of degree `d ∈ {1, 3, 5}` (ν = d/2).
    ///
    /// Degree 5 is the usual smoothness compromise for surrogate modeling.
    MaternIso(u8),
    /// Isotropic squared-exponential kernel.
    SqExpIso,
}

impl Default for CovFn {
    fn default() -> Self {
        CovFn::MaternIso(5)
    }
}

impl CovFn {
    /// The number of hyperparameters this kernel consumes.
    #[must_use]
    pub const fn n_hyp(&self) -> usize {
        2
    }

    /// Evaluates `k(a, b)` under log-scale hyperparameters `[log ℓ, log sf]`.
    ///
    /// # Panics
    ///
    /// Panics on an unsupported Matérn degree; the degree is a construction
    /// bug, not a runtime condition.
    #[must_use]
    pub fn eval(&self, hyp: &[f64], a: &[f64], b: &[f64]) -> f64 {
        let ell = hyp[0].exp();
        let sf2 = (2.0 * hyp[1]).exp();
        let t = dist(a, b) / ell;
        match self {
            CovFn::MaternIso(1) => sf2 * (-t).exp(),
            CovFn::MaternIso(3) => {
                let s = 3.0_f64.sqrt() * t;
                sf2 * (1.0 + s) * (-s).exp()
            }
            CovFn::MaternIso(5) => {
                let s = 5.0_f64.sqrt() * t;
                sf2 * (1.0 + s + s * s / 3.0) * (-s).exp()
            }
            CovFn::MaternIso(d) => panic!("unsupported Matérn degree {d} (expected 1, 3, or 5)"),
            CovFn::SqExpIso => sf2 * (-0.5 * t * t).exp(),
        }
    }

    /// Partial derivative `∂k(a, b)/∂hyp[j]` at log-scale hyperparameters.
    ///
    /// `j = 0` differentiates with respect to `log ℓ`, `j = 1` with respect
    /// to `log sf`.
    #[must_use]
    pub fn grad(&self, hyp: &[f64], a: &[f64], b: &[f64], j: usize) -> f64 {
        if j == 1 {
            // k ∝ sf², so ∂k/∂log sf = 2k for every kernel here.
            return 2.0 * self.eval(hyp, a, b);
        }
        let ell = hyp[0].exp();
        let sf2 = (2.0 * hyp[1]).exp();
        let t = dist(a, b) / ell;
        match self {
            CovFn::MaternIso(1) => sf2 * t * (-t).exp(),
            CovFn::MaternIso(3) => {
                let s = 3.0_f64.sqrt() * t;
                sf2 * s * s * (-s).exp()
            }
            CovFn::MaternIso(5) => {
                let s = 5.0_f64.sqrt() * t;
                sf2 * (s * s + s * s * s) / 3.0 * (-s).exp()
            }
            CovFn::MaternIso(d) => panic!("unsupported Matérn degree {d} (expected 1, 3, or 5)"),
            CovFn::SqExpIso => sf2 * (-0.5 * t * t).exp() * t * t,
        }
    }
}

/// Observation-noise model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LikFn {
    /// Gaussian noise with log standard deviation `lik`.
    #[default]
    Gauss,
}

impl LikFn {
    /// The noise variance `σn²` for log standard deviation `lik`.
    #[must_use]
    pub fn noise_var(&self, lik: f64) -> f64 {
        match self {
            LikFn::Gauss => (2.0 * lik).exp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HYP: [f64; 2] = [0.0, 0.0]; // ℓ = 1, sf = 1

    #[test]
    fn test_kernels_equal_signal_variance_at_zero_distance() {
        let x = [0.3, 0.7];
        for cov in [
            CovFn::MaternIso(1),
            CovFn::MaternIso(3),
            CovFn::MaternIso(5),
            CovFn::SqExpIso,
        ] {
            assert!((cov.eval(&HYP, &x, &x) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_kernels_decay_with_distance() {
        let a = [0.0];
        for cov in [CovFn::MaternIso(5), CovFn::SqExpIso] {
            let near = cov.eval(&HYP, &a, &[0.1]);
            let far = cov.eval(&HYP, &a, &[2.0]);
            assert!(near > far);
            assert!(far > 0.0);
        }
    }

    #[test]
    fn test_cov_grad_matches_finite_differences() {
        let a = [0.2, 0.4];
        let b = [0.9, 0.1];
        let eps = 1e-6;
        for cov in [
            CovFn::MaternIso(1),
            CovFn::MaternIso(3),
            CovFn::MaternIso(5),
            CovFn::SqExpIso,
        ] {
            for j in 0..cov.n_hyp() {
                let mut plus = HYP;
                let mut minus = HYP;
                plus[j] += eps;
                minus[j] -= eps;
                let numeric = (cov.eval(&plus, &a, &b) - cov.eval(&minus, &a, &b)) / (2.0 * eps);
                let analytic = cov.grad(&HYP, &a, &b, j);
                assert!(
                    (numeric - analytic).abs() < 1e-6,
                    "{cov:?} hyp {j}: numeric {numeric} vs analytic {analytic}"
                );
            }
        }
    }

    #[test]
    fn test_gauss_noise_variance_is_exp_of_twice_lik() {
        let lik = -4.0;
        assert!((LikFn::Gauss.noise_var(lik) - (-8.0_f64).exp()).abs() < 1e-18);
    }
}
