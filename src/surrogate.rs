//! GP surrogate over the normalized unit box.
//!
//! The surrogate keeps the single table every other component indexes into:
//! one row per sample point with its estimated score `μ`, posterior standard
//! deviation `σ`, and cached upper confidence bound `u = μ + ς·σ`. Rows with
//! `σ = 0` are *evaluated* (the objective was actually called there); rows
//! with `σ > 0` are *GP-based* (predicted only). The two populations are
//! tracked separately because the exploration schedule ς depends on the
//! number of GP-based rows.
//!
//! All coordinates stored here live in `[0, 1]^d`; the surrogate owns the
//! affine map to and from the original domain.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gp::{self, CovFn, Hyperparams, LikFn, MeanFn, Predictor};
use crate::types::Domain;

/// Bounds clamping the log-noise hyperparameter after each training run.
pub const LIK_BOUNDS: (f64, f64) = (-12.0, -1.0);

/// One row of the surrogate's sample table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// The sample point in normalized `[0, 1]^d` coordinates.
    pub x: Vec<f64>,
    /// The estimated score: the true objective value when evaluated, the
    /// posterior mean otherwise.
    pub mu: f64,
    /// Posterior standard deviation; exactly zero iff the row is evaluated.
    pub sigma: f64,
    /// Cached upper confidence bound `μ + ς·σ` (`μ` for evaluated rows).
    pub ucb: f64,
}

impl SampleRecord {
    /// Whether this row holds a true objective value.
    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.sigma == 0.0
    }
}

/// The GP configuration the surrogate trains and predicts with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpConfig {
    /// Current hyperparameters.
    pub hyp: Hyperparams,
    /// Prior mean function.
    pub mean: MeanFn,
    /// Covariance function.
    pub cov: CovFn,
    /// Observation-noise model.
    pub lik: LikFn,
    /// Maximum optimizer iterations per training run.
    pub train_iters: usize,
}

impl GpConfig {
    /// A default configuration: constant mean, isotropic Matérn 5/2, Gauss
    /// likelihood at noise standard deviation `sigma`, quarter-box
    /// lengthscale, unit signal deviation.
    #[must_use]
    pub fn with_noise(sigma: f64) -> Self {
        Self {
            hyp: Hyperparams {
                mean: 0.0,
                cov: vec![0.25_f64.ln(), 0.0],
                lik: sigma.ln(),
            },
            mean: MeanFn::Const,
            cov: CovFn::MaternIso(5),
            lik: LikFn::Gauss,
            train_iters: 100,
        }
    }
}

/// The exploration-constant schedule `ς(M)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum VarsigmaSchedule {
    /// A fixed exploration constant.
    Constant(f64),
    /// `ς(M) = √max(0, 4·ln(π·M) − 2·ln(12·η))`: the bound keeping
    /// `P(UCB ≤ f)` below `η` across `M` predicted samples.
    ErrorBound {
        /// Acceptable probability that the UCB undershoots the objective.
        eta: f64,
    },
}

impl VarsigmaSchedule {
    /// The exploration constant for `m` GP-based samples.
    #[must_use]
    pub fn value(&self, m: usize) -> f64 {
        match *self {
            VarsigmaSchedule::Constant(v) => v,
            VarsigmaSchedule::ErrorBound { eta } => {
                #[allow(clippy::cast_precision_loss)]
                let m = m as f64;
                (4.0 * (core::f64::consts::PI * m).ln() - 2.0 * (12.0 * eta).ln())
                    .max(0.0)
                    .sqrt()
            }
        }
    }
}

/// The sample table plus the GP it feeds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Surrogate {
    lower: Vec<f64>,
    upper: Vec<f64>,
    samples: Vec<SampleRecord>,
    n_evaluated: usize,
    n_gp_based: usize,
    gp: GpConfig,
    varsigma: VarsigmaSchedule,
}

impl Surrogate {
    /// Creates an empty surrogate over `domain`.
    #[must_use]
    pub fn new(domain: &Domain, gp: GpConfig, varsigma: VarsigmaSchedule) -> Self {
        Self {
            lower: domain.lower().to_vec(),
            upper: domain.upper().to_vec(),
            samples: Vec::new(),
            n_evaluated: 0,
            n_gp_based: 0,
            gp,
            varsigma,
        }
    }

    /// The number of dimensions.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// The total number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The number of rows holding true objective values.
    #[must_use]
    pub fn n_evaluated(&self) -> usize {
        self.n_evaluated
    }

    /// The number of GP-predicted rows.
    #[must_use]
    pub fn n_gp_based(&self) -> usize {
        self.n_gp_based
    }

    /// The exploration schedule.
    #[must_use]
    pub fn schedule(&self) -> &VarsigmaSchedule {
        &self.varsigma
    }

    /// The GP configuration (hyperparameters included).
    #[must_use]
    pub fn gp(&self) -> &GpConfig {
        &self.gp
    }

    /// The row at index `k`.
    #[must_use]
    pub fn record(&self, k: usize) -> &SampleRecord {
        &self.samples[k]
    }

    /// All rows, in append order.
    #[must_use]
    pub fn records(&self) -> &[SampleRecord] {
        &self.samples
    }

    /// Whether row `k` is GP-predicted.
    #[must_use]
    pub fn is_gp_based(&self, k: usize) -> bool {
        self.samples[k].sigma > 0.0
    }

    /// Maps a point from original coordinates into `[0, 1]^d`.
    #[must_use]
    pub fn normalize(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(&self.lower)
            .zip(&self.upper)
            .map(|((v, lo), up)| (v - lo) / (up - lo))
            .collect()
    }

    /// Maps a point from `[0, 1]^d` back into original coordinates.
    #[must_use]
    pub fn denormalize(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(&self.lower)
            .zip(&self.upper)
            .map(|((v, lo), up)| lo + v * (up - lo))
            .collect()
    }

    /// Appends a row at a normalized point and returns its index.
    ///
    /// `sigma = 0` rows count as evaluated, `sigma > 0` as GP-based.
    ///
    /// # Panics
    ///
    /// Panics on a negative `sigma`; that is a caller bug, not a runtime
    /// condition.
    pub fn append(&mut self, x: Vec<f64>, mu: f64, sigma: f64) -> usize {
        assert!(sigma >= 0.0, "posterior std must be non-negative");
        debug_assert_eq!(x.len(), self.dim());
        debug_assert!(x.iter().all(|v| (0.0..=1.0).contains(v)));
        if sigma > 0.0 {
            self.n_gp_based += 1;
        } else {
            self.n_evaluated += 1;
        }
        let ucb = if sigma > 0.0 {
            mu + self.varsigma.value(self.n_gp_based) * sigma
        } else {
            mu
        };
        self.samples.push(SampleRecord { x, mu, sigma, ucb });
        self.samples.len() - 1
    }

    /// Appends a row given in original coordinates.
    pub fn append_unscaled(&mut self, x: &[f64], mu: f64, sigma: f64) -> usize {
        let x = self.normalize(x);
        self.append(x, mu, sigma)
    }

    /// Overwrites the score of row `k`, keeping the evaluated/GP-based
    /// counts consistent with the σ transition.
    ///
    /// # Panics
    ///
    /// Panics on a negative `sigma`.
    pub fn update(&mut self, k: usize, mu: f64, sigma: f64) {
        assert!(sigma >= 0.0, "posterior std must be non-negative");
        let was_evaluated = self.samples[k].sigma == 0.0;
        let is_evaluated = sigma == 0.0;
        match (was_evaluated, is_evaluated) {
            (false, true) => {
                self.n_gp_based -= 1;
                self.n_evaluated += 1;
            }
            (true, false) => {
                self.n_evaluated -= 1;
                self.n_gp_based += 1;
            }
            _ => {}
        }
        let vs = self.varsigma.value(self.n_gp_based);
        let record = &mut self.samples[k];
        record.mu = mu;
        record.sigma = sigma;
        record.ucb = if is_evaluated { mu } else { mu + vs * sigma };
    }

    /// Recomputes the cached UCB of every row at the current `ς(Ng)`.
    pub fn ucb_refresh(&mut self) {
        let vs = self.varsigma.value(self.n_gp_based);
        for record in &mut self.samples {
            record.ucb = if record.sigma > 0.0 {
                record.mu + vs * record.sigma
            } else {
                record.mu
            };
        }
    }

    /// The best evaluated row: `(index, record)` with the highest `μ`, ties
    /// broken by lowest index. `None` while nothing has been evaluated.
    #[must_use]
    pub fn best_evaluated(&self) -> Option<(usize, &SampleRecord)> {
        let mut best: Option<(usize, &SampleRecord)> = None;
        for (k, record) in self.samples.iter().enumerate() {
            if record.sigma == 0.0 && best.map_or(true, |(_, b)| record.mu > b.mu) {
                best = Some((k, record));
            }
        }
        best
    }

    fn evaluated_data(&self) -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut x_train = Vec::with_capacity(self.n_evaluated);
        let mut y_train = Vec::with_capacity(self.n_evaluated);
        for record in &self.samples {
            if record.sigma == 0.0 {
                x_train.push(record.x.clone());
                y_train.push(record.mu);
            }
        }
        (x_train, y_train)
    }

    /// Fits the GP on the evaluated rows and returns a predictor for
    /// repeated posterior queries.
    ///
    /// On factorization failure the log-noise is raised by 1 and the fit
    /// retried, as long as it stays below 0.
    ///
    /// # Errors
    ///
    /// [`Error::GpNumerical`] once the noise ramp is exhausted;
    /// [`Error::Internal`] when no row has been evaluated yet.
    pub fn predictor(&mut self) -> Result<Predictor> {
        let (x_train, y_train) = self.evaluated_data();
        if x_train.is_empty() {
            return Err(Error::Internal("GP prediction requires an evaluated sample"));
        }
        loop {
            if let Some(predictor) = gp::fit(
                &self.gp.hyp,
                self.gp.mean,
                self.gp.cov,
                self.gp.lik,
                &x_train,
                &y_train,
            ) {
                return Ok(predictor);
            }
            self.gp.hyp.lik += 1.0;
            if self.gp.hyp.lik >= 0.0 {
                return Err(Error::GpNumerical {
                    lik: self.gp.hyp.lik,
                });
            }
        }
    }

    /// Posterior `(μ, σ)` at each normalized query point, using ONLY the
    /// evaluated rows as training data.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`predictor`](Self::predictor).
    pub fn predict(&mut self, queries: &[Vec<f64>]) -> Result<Vec<(f64, f64)>> {
        let predictor = self.predictor()?;
        Ok(queries.iter().map(|x| predictor.predict(x)).collect())
    }

    /// Re-optimizes the GP hyperparameters on the evaluated rows.
    ///
    /// After training the log-noise is clamped into [`LIK_BOUNDS`], and any
    /// GP-based rows are re-predicted under the new hyperparameters with
    /// their UCBs refreshed.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`predictor`](Self::predictor) when
    /// re-predicting GP-based rows.
    pub fn train(&mut self) -> Result<()> {
        let (x_train, y_train) = self.evaluated_data();
        if x_train.is_empty() {
            return Err(Error::Internal("GP training requires an evaluated sample"));
        }
        let mut hyp = gp::train(
            &self.gp.hyp,
            self.gp.mean,
            self.gp.cov,
            self.gp.lik,
            &x_train,
            &y_train,
            self.gp.train_iters,
        );
        hyp.lik = hyp.lik.clamp(LIK_BOUNDS.0, LIK_BOUNDS.1);
        self.gp.hyp = hyp;

        if self.n_gp_based > 0 {
            let pending: Vec<usize> = (0..self.samples.len())
                .filter(|&k| self.samples[k].sigma > 0.0)
                .collect();
            let queries: Vec<Vec<f64>> = pending.iter().map(|&k| self.samples[k].x.clone()).collect();
            let predictions = self.predict(&queries)?;
            for (&k, (mu, sigma)) in pending.iter().zip(predictions) {
                self.update(k, mu, sigma);
            }
            self.ucb_refresh();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_domain(dim: usize) -> Domain {
        Domain::new(vec![0.0; dim], vec![1.0; dim]).unwrap()
    }

    fn surrogate(dim: usize) -> Surrogate {
        Surrogate::new(
            &unit_domain(dim),
            GpConfig::with_noise(1e-4),
            VarsigmaSchedule::Constant(3.0),
        )
    }

    #[test]
    fn test_counts_track_append_and_update() {
        let mut s = surrogate(2);
        let k0 = s.append(vec![0.5, 0.5], 1.0, 0.0);
        let k1 = s.append(vec![0.2, 0.8], 0.5, 0.3);
        assert_eq!((s.n_evaluated(), s.n_gp_based()), (1, 1));
        assert_eq!(s.n_evaluated() + s.n_gp_based(), s.len());

        // GP-based -> evaluated
        s.update(k1, 0.7, 0.0);
        assert_eq!((s.n_evaluated(), s.n_gp_based()), (2, 0));

        // evaluated -> GP-based
        s.update(k0, 1.0, 0.1);
        assert_eq!((s.n_evaluated(), s.n_gp_based()), (1, 1));
        assert_eq!(s.n_evaluated() + s.n_gp_based(), s.len());
    }

    #[test]
    fn test_ucb_refresh_distinguishes_populations() {
        let mut s = surrogate(1);
        s.append(vec![0.5], 2.0, 0.0);
        s.append(vec![0.2], 1.0, 0.5);
        s.ucb_refresh();

        assert_eq!(s.record(0).ucb, 2.0);
        assert!((s.record(1).ucb - (1.0 + 3.0 * 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_denormalize_round_trip() {
        let domain = Domain::new(vec![-3.0, 2.0], vec![5.0, 4.5]).unwrap();
        let s = Surrogate::new(
            &domain,
            GpConfig::with_noise(1e-4),
            VarsigmaSchedule::Constant(3.0),
        );
        let x = vec![1.25, 3.75];
        let back = s.denormalize(&s.normalize(&x));
        for (a, b) in x.iter().zip(&back) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_append_unscaled_normalizes_first() {
        let domain = Domain::new(vec![-2.0], vec![2.0]).unwrap();
        let mut s = Surrogate::new(
            &domain,
            GpConfig::with_noise(1e-4),
            VarsigmaSchedule::Constant(3.0),
        );
        let k = s.append_unscaled(&[1.0], 0.5, 0.0);
        assert!((s.record(k).x[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_best_evaluated_ignores_gp_rows_and_breaks_ties_low() {
        let mut s = surrogate(1);
        s.append(vec![0.1], 5.0, 0.0);
        s.append(vec![0.2], 9.0, 0.4); // GP-based, highest μ
        s.append(vec![0.3], 5.0, 0.0); // tie with row 0
        let (k, record) = s.best_evaluated().unwrap();
        assert_eq!(k, 0);
        assert_eq!(record.mu, 5.0);
    }

    #[test]
    fn test_predict_marks_points_with_positive_sigma() {
        let mut s = surrogate(1);
        for (x, y) in [(0.1, 0.0), (0.5, 1.0), (0.9, 0.5)] {
            s.append(vec![x], y, 0.0);
        }
        let predictions = s.predict(&[vec![0.3], vec![0.5]]).unwrap();
        for (_, sigma) in predictions {
            assert!(sigma > 0.0);
        }
    }

    #[test]
    fn test_train_clamps_lik_and_refreshes_gp_rows() {
        let mut s = surrogate(1);
        for (x, y) in [(0.1, 0.2), (0.4, 0.9), (0.7, 0.4), (0.9, 0.1)] {
            s.append(vec![x], y, 0.0);
        }
        s.append(vec![0.25], 0.0, 1.0); // stale GP row
        s.train().unwrap();

        let lik = s.gp().hyp.lik;
        assert!((LIK_BOUNDS.0..=LIK_BOUNDS.1).contains(&lik), "lik {lik} escaped bounds");

        let stale = s.record(4);
        assert!(stale.sigma > 0.0);
        assert!(stale.sigma < 1.0, "GP row was not re-predicted");
        assert_eq!(s.n_evaluated() + s.n_gp_based(), s.len());
    }

    #[test]
    fn test_varsigma_error_bound_schedule() {
        let schedule = VarsigmaSchedule::ErrorBound { eta: 0.05 };
        assert_eq!(schedule.value(0), 0.0);
        let expected =
            (4.0 * (core::f64::consts::PI * 4.0).ln() - 2.0 * (12.0 * 0.05_f64).ln()).sqrt();
        assert!((schedule.value(4) - expected).abs() < 1e-12);
        assert!(schedule.value(8) > schedule.value(4));
    }

    #[test]
    #[should_panic(expected = "non-negative")]
    fn test_negative_sigma_is_a_caller_bug() {
        let mut s = surrogate(1);
        s.append(vec![0.5], 1.0, -0.1);
    }

    #[test]
    fn test_lik_clamp_is_exact_at_the_bound() {
        assert_eq!((-15.3_f64).clamp(LIK_BOUNDS.0, LIK_BOUNDS.1), -12.0);
        assert_eq!((0.5_f64).clamp(LIK_BOUNDS.0, LIK_BOUNDS.1), -1.0);
    }
}
