//! Gaussian-process inference: posterior prediction and hyperparameter
//! training.
//!
//! The surrogate treats this module as a numeric library with two entry
//! points mirroring the usual GP toolbox contract:
//!
//! - [`fit`] factors `K + σn²·I` once and returns a [`Predictor`] for cheap
//!   repeated posterior queries. Factorization failure is reported as
//!   `None`; the caller decides whether to retry with more noise.
//! - [`train`] minimizes the negative log marginal likelihood over
//!   `[mean, log ℓ, log sf, lik]` with nonlinear conjugate gradients
//!   (Polak-Ribière with restart, backtracking Armijo line search).
//!
//! All inputs are expected in normalized `[0, 1]^d` coordinates.

mod functions;

pub use functions::{CovFn, LikFn, MeanFn};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// GP hyperparameters, log-scale where the quantity is positive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparams {
    /// The constant prior mean.
    pub mean: f64,
    /// Covariance hyperparameters, `[log ℓ, log sf]` for isotropic kernels.
    pub cov: Vec<f64>,
    /// Log standard deviation of the observation noise.
    pub lik: f64,
}

impl Hyperparams {
    /// Flattens into the trainer's parameter vector `[mean, cov…, lik]`.
    fn pack(&self) -> Vec<f64> {
        let mut params = Vec::with_capacity(self.cov.len() + 2);
        params.push(self.mean);
        params.extend_from_slice(&self.cov);
        params.push(self.lik);
        params
    }

    /// Rebuilds hyperparameters from a packed parameter vector.
    fn unpack(&self, params: &[f64]) -> Self {
        Self {
            mean: params[0],
            cov: params[1..1 + self.cov.len()].to_vec(),
            lik: params[1 + self.cov.len()],
        }
    }
}

/// A fitted GP ready for posterior predictions.
pub struct Predictor {
    /// Cholesky factor of `K + σn²·I`.
    cholesky: nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>,
    /// `α = (K + σn²·I)⁻¹ (y − m)`.
    alpha: DVector<f64>,
    /// Training inputs.
    x_train: Vec<Vec<f64>>,
    hyp: Hyperparams,
    mean: MeanFn,
    cov: CovFn,
}

impl Predictor {
    /// Posterior mean and standard deviation at a query point.
    ///
    /// The standard deviation is floored at machine epsilon so that a
    /// predicted point can never be mistaken for a truly evaluated one.
    #[must_use]
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_fn(self.x_train.len(), |i, _| {
            self.cov.eval(&self.hyp.cov, x, &self.x_train[i])
        });
        let mu = self.mean.eval(self.hyp.mean, x) + k_star.dot(&self.alpha);
        let v = self.cholesky.solve(&k_star);
        let var = (self.cov.eval(&self.hyp.cov, x, x) - k_star.dot(&v)).max(0.0);
        (mu, var.sqrt().max(f64::EPSILON))
    }
}

/// Builds the kernel matrix `K + σn²·I` over the training inputs.
fn kernel_matrix(
    cov: CovFn,
    cov_hyp: &[f64],
    noise_var: f64,
    x_train: &[Vec<f64>],
) -> DMatrix<f64> {
    let n = x_train.len();
    DMatrix::from_fn(n, n, |i, j| {
        let k = cov.eval(cov_hyp, &x_train[i], &x_train[j]);
        if i == j {
            k + noise_var
        } else {
            k
        }
    })
}

/// Fits a GP to the training data.
///
/// Returns `None` if the Cholesky factorization of `K + σn²·I` fails; the
/// caller is responsible for retrying with a larger noise level.
#[must_use]
pub fn fit(
    hyp: &Hyperparams,
    mean: MeanFn,
    cov: CovFn,
    lik: LikFn,
    x_train: &[Vec<f64>],
    y_train: &[f64],
) -> Option<Predictor> {
    let n = x_train.len();
    if n == 0 {
        return None;
    }
    let k = kernel_matrix(cov, &hyp.cov, lik.noise_var(hyp.lik), x_train);
    let cholesky = nalgebra::linalg::Cholesky::new(k)?;
    let yc = DVector::from_fn(n, |i, _| y_train[i] - mean.eval(hyp.mean, &x_train[i]));
    let alpha = cholesky.solve(&yc);
    Some(Predictor {
        cholesky,
        alpha,
        x_train: x_train.to_vec(),
        hyp: hyp.clone(),
        mean,
        cov,
    })
}

/// Negative log marginal likelihood and its gradient at packed parameters.
///
/// Returns `None` when the kernel matrix is not positive definite at these
/// parameters; the trainer treats that as an infeasible step.
#[allow(clippy::cast_precision_loss)]
fn nlml(
    template: &Hyperparams,
    params: &[f64],
    mean: MeanFn,
    cov: CovFn,
    lik: LikFn,
    x_train: &[Vec<f64>],
    y_train: &[f64],
) -> Option<(f64, Vec<f64>)> {
    let hyp = template.unpack(params);
    let n = x_train.len();
    let noise_var = lik.noise_var(hyp.lik);
    let k = kernel_matrix(cov, &hyp.cov, noise_var, x_train);
    let cholesky = nalgebra::linalg::Cholesky::new(k)?;

    let yc = DVector::from_fn(n, |i, _| y_train[i] - mean.eval(hyp.mean, &x_train[i]));
    let alpha = cholesky.solve(&yc);

    let log_det: f64 = cholesky.l().diagonal().iter().map(|d| d.ln()).sum();
    let value = 0.5 * yc.dot(&alpha)
        + log_det
        + 0.5 * n as f64 * (2.0 * core::f64::consts::PI).ln();

    // ∂nlml/∂θ = ½ tr((K⁻¹ − ααᵀ) ∂K/∂θ)
    let a = cholesky.inverse() - &alpha * alpha.transpose();

    let mut grad = Vec::with_capacity(params.len());
    grad.push(-alpha.sum() * mean.grad(hyp.mean, &x_train[0]));
    for j in 0..cov.n_hyp() {
        let dk = DMatrix::from_fn(n, n, |i, l| cov.grad(&hyp.cov, &x_train[i], &x_train[l], j));
        grad.push(0.5 * a.component_mul(&dk).sum());
    }
    // ∂K/∂lik = 2σn²·I
    grad.push(noise_var * a.trace());

    Some((value, grad))
}

/// Gradient-norm threshold below which training stops early.
const GRAD_TOL: f64 = 1e-6;
/// Armijo sufficient-decrease constant.
const ARMIJO_C1: f64 = 1e-4;
/// Maximum step halvings per line search.
const MAX_BACKTRACKS: usize = 30;

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Optimizes hyperparameters by minimizing the negative log marginal
/// likelihood.
///
/// Runs up to `max_iter` Polak-Ribière conjugate-gradient iterations with a
/// backtracking Armijo line search. If the likelihood cannot be evaluated at
/// the starting point, the initial hyperparameters are returned unchanged.
#[must_use]
pub fn train(
    hyp0: &Hyperparams,
    mean: MeanFn,
    cov: CovFn,
    lik: LikFn,
    x_train: &[Vec<f64>],
    y_train: &[f64],
    max_iter: usize,
) -> Hyperparams {
    let mut params = hyp0.pack();
    let Some((mut fx, mut grad)) = nlml(hyp0, &params, mean, cov, lik, x_train, y_train) else {
        return hyp0.clone();
    };
    let mut dir: Vec<f64> = grad.iter().map(|g| -g).collect();

    for _ in 0..max_iter {
        if norm(&grad) < GRAD_TOL {
            break;
        }

        let mut slope = dot(&grad, &dir);
        if slope >= 0.0 {
            // Conjugacy lost; restart along steepest descent.
            dir = grad.iter().map(|g| -g).collect();
            slope = -dot(&grad, &grad);
        }

        let mut t = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let candidate: Vec<f64> = params
                .iter()
                .zip(&dir)
                .map(|(p, d)| p + t * d)
                .collect();
            if let Some((fc, gc)) = nlml(hyp0, &candidate, mean, cov, lik, x_train, y_train) {
                if fc.is_finite() && fc <= fx + ARMIJO_C1 * t * slope {
                    accepted = Some((candidate, fc, gc));
                    break;
                }
            }
            t *= 0.5;
        }
        let Some((next, fx_next, grad_next)) = accepted else {
            break;
        };

        // Polak-Ribière with restart on negative beta.
        let denom = dot(&grad, &grad);
        let beta = if denom > f64::MIN_POSITIVE {
            let diff: Vec<f64> = grad_next.iter().zip(&grad).map(|(n, o)| n - o).collect();
            (dot(&grad_next, &diff) / denom).max(0.0)
        } else {
            0.0
        };
        dir = grad_next
            .iter()
            .zip(&dir)
            .map(|(g, d)| -g + beta * d)
            .collect();
        params = next;
        fx = fx_next;
        grad = grad_next;
    }

    hyp0.unpack(&params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = [0.1, 0.3, 0.45, 0.6, 0.8, 0.95]
            .iter()
            .map(|&v| vec![v])
            .collect();
        let y: Vec<f64> = x.iter().map(|p| (4.0 * p[0]).sin()).collect();
        (x, y)
    }

    fn default_hyp() -> Hyperparams {
        Hyperparams {
            mean: 0.0,
            cov: vec![0.25_f64.ln(), 0.0],
            lik: (1e-4_f64).ln(),
        }
    }

    #[test]
    fn test_fit_interpolates_training_points() {
        let (x, y) = toy_data();
        let hyp = default_hyp();
        let predictor =
            fit(&hyp, MeanFn::Const, CovFn::MaternIso(5), LikFn::Gauss, &x, &y).unwrap();

        for (xi, &yi) in x.iter().zip(&y) {
            let (mu, sigma) = predictor.predict(xi);
            assert!((mu - yi).abs() < 1e-3, "posterior mean {mu} far from {yi}");
            assert!(sigma < 1e-2, "posterior std {sigma} too large at a training point");
            assert!(sigma > 0.0, "posterior std must stay strictly positive");
        }
    }

    #[test]
    fn test_fit_uncertainty_grows_away_from_data() {
        let (x, y) = toy_data();
        let hyp = default_hyp();
        let predictor =
            fit(&hyp, MeanFn::Const, CovFn::MaternIso(5), LikFn::Gauss, &x, &y).unwrap();

        let (_, sigma_near) = predictor.predict(&[0.45]);
        let (_, sigma_far) = predictor.predict(&[0.22]);
        assert!(sigma_far > sigma_near);
    }

    #[test]
    fn test_fit_empty_training_set_fails() {
        let hyp = default_hyp();
        assert!(fit(&hyp, MeanFn::Const, CovFn::MaternIso(5), LikFn::Gauss, &[], &[]).is_none());
    }

    #[test]
    fn test_nlml_gradient_matches_finite_differences() {
        let (x, y) = toy_data();
        let hyp = Hyperparams {
            mean: 0.1,
            cov: vec![-0.5, -0.2],
            lik: -2.0,
        };
        let params = hyp.pack();
        let (_, grad) = nlml(
            &hyp,
            &params,
            MeanFn::Const,
            CovFn::MaternIso(5),
            LikFn::Gauss,
            &x,
            &y,
        )
        .unwrap();

        let eps = 1e-5;
        for j in 0..params.len() {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[j] += eps;
            minus[j] -= eps;
            let (fp, _) = nlml(
                &hyp,
                &plus,
                MeanFn::Const,
                CovFn::MaternIso(5),
                LikFn::Gauss,
                &x,
                &y,
            )
            .unwrap();
            let (fm, _) = nlml(
                &hyp,
                &minus,
                MeanFn::Const,
                CovFn::MaternIso(5),
                LikFn::Gauss,
                &x,
                &y,
            )
            .unwrap();
            let numeric = (fp - fm) / (2.0 * eps);
            assert!(
                (numeric - grad[j]).abs() < 1e-4 * (1.0 + numeric.abs()),
                "param {j}: numeric {numeric} vs analytic {}",
                grad[j]
            );
        }
    }

    #[test]
    fn test_train_does_not_increase_nlml() {
        let (x, y) = toy_data();
        let hyp0 = Hyperparams {
            mean: 0.5,
            cov: vec![0.0, 0.5],
            lik: -2.0,
        };
        let trained = train(
            &hyp0,
            MeanFn::Const,
            CovFn::MaternIso(5),
            LikFn::Gauss,
            &x,
            &y,
            100,
        );

        let (before, _) = nlml(
            &hyp0,
            &hyp0.pack(),
            MeanFn::Const,
            CovFn::MaternIso(5),
            LikFn::Gauss,
            &x,
            &y,
        )
        .unwrap();
        let (after, _) = nlml(
            &hyp0,
            &trained.pack(),
            MeanFn::Const,
            CovFn::MaternIso(5),
            LikFn::Gauss,
            &x,
            &y,
        )
        .unwrap();
        assert!(after <= before, "training increased nlml: {before} -> {after}");
    }

    #[test]
    fn test_train_single_point_is_stable() {
        let x = vec![vec![0.5, 0.5]];
        let y = vec![3.0];
        let hyp0 = default_hyp();
        let trained = train(
            &hyp0,
            MeanFn::Const,
            CovFn::MaternIso(5),
            LikFn::Gauss,
            &x,
            &y,
            100,
        );
        assert!(trained.mean.is_finite());
        assert!(trained.cov.iter().all(|v| v.is_finite()));
        assert!(trained.lik.is_finite());
    }
}
