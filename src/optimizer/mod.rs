//! The GPSO orchestrator: initialization, the four-step iteration, the
//! hyperparameter retrain cadence, and finalization.
//!
//! One iteration flows through the two owned components in a fixed order:
//! refresh UCBs and promote credible predictions (step 1), select one leaf
//! per depth with strictly increasing UCBs and force-evaluate GP-based
//! winners (step 2), prune selections whose bounded virtual expansion cannot
//! beat the next selected depth (step 3), then commit the surviving splits
//! (step 4). Hyperparameters retrain between iterations on a quadratic
//! schedule.

mod persistence;

pub use persistence::{Snapshot, SNAPSHOT_VERSION};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::{Observer, RunView};
use crate::gp::Predictor;
use crate::surrogate::{GpConfig, Surrogate, VarsigmaSchedule};
use crate::tree::{trisect, ChildSpec, PartitionTree, Trisection};
use crate::types::{Domain, Evaluation, Objective};

/// Configuration for a [`Gpso`] optimizer.
///
/// Usually assembled through [`Gpso::builder`]; kept public so snapshots are
/// self-contained.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsoConfig {
    /// Initial observation-noise standard deviation.
    pub sigma: f64,
    /// Exploration-constant schedule.
    pub schedule: VarsigmaSchedule,
    /// Retrain cadence constant; `None` resolves to `2·d` at initialization.
    pub upc: Option<usize>,
    /// Maximum optimizer iterations per hyperparameter training run.
    pub train_iters: usize,
    /// Whether per-iteration records are logged at info level.
    pub verbose: bool,
}

impl Default for GpsoConfig {
    fn default() -> Self {
        Self {
            sigma: 1e-4,
            schedule: VarsigmaSchedule::ErrorBound { eta: 0.05 },
            upc: None,
            train_iters: 100,
            verbose: false,
        }
    }
}

/// What one iteration left behind.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// The look-ahead bound XI the iteration ran with.
    pub xi: f64,
    /// The number of leaf splits committed.
    pub n_selected: usize,
    /// The best evaluated objective value at iteration end.
    pub lb: f64,
}

/// Outcome of a single [`Gpso::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The iteration ran to completion.
    Progressed,
    /// Step 2 found no eligible leaf; the search frontier is exhausted.
    Exhausted,
}

/// The result of a finished run, in ORIGINAL coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsoResult {
    /// Every truly evaluated sample.
    pub samples: Vec<Evaluation>,
    /// The best evaluated sample.
    pub solution: Evaluation,
}

/// Live run state owned by the optimizer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct RunState {
    pub(crate) surrogate: Surrogate,
    pub(crate) tree: PartitionTree,
    pub(crate) xi: f64,
    pub(crate) lb: f64,
    pub(crate) retrain_n: usize,
    pub(crate) upc: usize,
    pub(crate) iterations: Vec<IterationRecord>,
}

/// A leaf chosen at some depth during step 2.
#[derive(Clone, Copy, Debug)]
struct SelectedLeaf {
    /// Node index within its depth.
    node: usize,
    /// Surrogate index of the leaf's representative sample.
    sample: usize,
    /// The UCB the leaf was selected with.
    ucb: f64,
}

/// GP-surrogate optimizer over a ternary partition of the search box.
///
/// # Examples
///
/// ```
/// use gpso::{Domain, Gpso};
///
/// // Maximize a smooth bump on [-1, 1]².
/// let domain = Domain::new(vec![-1.0, -1.0], vec![1.0, 1.0]).unwrap();
/// let mut opt = Gpso::builder().varsigma(3.0).build().unwrap();
/// let result = opt
///     .run(|x: &[f64]| -(x[0] * x[0] + x[1] * x[1]), &domain, 20)
///     .unwrap();
/// assert!(result.solution.value <= 0.0);
/// assert_eq!(result.samples.len(), opt.n_evaluated());
/// ```
pub struct Gpso {
    config: GpsoConfig,
    state: Option<RunState>,
    observers: Vec<Box<dyn Observer>>,
}

impl std::fmt::Debug for Gpso {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gpso")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for Gpso {
    fn default() -> Self {
        Self::new()
    }
}

impl Gpso {
    /// Creates an optimizer with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GpsoConfig::default(),
            state: None,
            observers: Vec::new(),
        }
    }

    /// Returns a [`GpsoBuilder`] for configuring an optimizer.
    #[must_use]
    pub fn builder() -> GpsoBuilder {
        GpsoBuilder::default()
    }

    pub(crate) fn with_config(config: GpsoConfig) -> Self {
        Self {
            config,
            state: None,
            observers: Vec::new(),
        }
    }

    pub(crate) fn config(&self) -> &GpsoConfig {
        &self.config
    }

    pub(crate) fn run_state(&self) -> Option<&RunState> {
        self.state.as_ref()
    }

    pub(crate) fn set_run_state(&mut self, state: RunState) {
        self.state = Some(state);
    }

    /// Registers an observer for lifecycle events.
    pub fn add_observer(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// The number of truly evaluated samples so far.
    #[must_use]
    pub fn n_evaluated(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.surrogate.n_evaluated())
    }

    /// The surrogate, once initialized.
    #[must_use]
    pub fn surrogate(&self) -> Option<&Surrogate> {
        self.state.as_ref().map(|s| &s.surrogate)
    }

    /// The partition tree, once initialized.
    #[must_use]
    pub fn tree(&self) -> Option<&PartitionTree> {
        self.state.as_ref().map(|s| &s.tree)
    }

    /// The per-iteration records so far.
    #[must_use]
    pub fn iterations(&self) -> &[IterationRecord] {
        match &self.state {
            Some(state) => &state.iterations,
            None => &[],
        }
    }

    /// The best evaluated sample in ORIGINAL coordinates.
    #[must_use]
    pub fn best(&self) -> Option<Evaluation> {
        let state = self.state.as_ref()?;
        let (_, record) = state.surrogate.best_evaluated()?;
        Some(Evaluation {
            x: state.surrogate.denormalize(&record.x),
            value: record.mu,
        })
    }

    /// Runs the full optimization: initialize, iterate until `n_max`
    /// evaluations or an exhausted frontier, finalize.
    ///
    /// # Errors
    ///
    /// Configuration errors surface immediately; numerical and observer
    /// errors abort the run.
    pub fn run<O: Objective>(
        &mut self,
        mut objective: O,
        domain: &Domain,
        n_max: usize,
    ) -> Result<GpsoResult> {
        if n_max == 0 {
            return Err(Error::InvalidBudget(n_max));
        }
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("gpso_run", dim = domain.dim(), n_max).entered();

        self.initialize(&mut objective, domain)?;
        while self.n_evaluated() < n_max {
            match self.step(&mut objective)? {
                StepOutcome::Progressed => {}
                StepOutcome::Exhausted => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("search frontier exhausted; terminating early");
                    break;
                }
            }
        }
        self.finalize()
    }

    /// Evaluates the domain midpoint, trains the GP, and seeds the tree.
    ///
    /// # Errors
    ///
    /// Configuration errors from the resolved cadence, numerical errors from
    /// the initial training, and observer errors from `PostInitialise`.
    pub fn initialize<O: Objective + ?Sized>(
        &mut self,
        objective: &mut O,
        domain: &Domain,
    ) -> Result<()> {
        let dim = domain.dim();
        let upc = self.config.upc.unwrap_or(2 * dim);
        if upc == 0 {
            return Err(Error::InvalidCadence(upc));
        }

        let mut surrogate = Surrogate::new(
            domain,
            GpConfig {
                train_iters: self.config.train_iters,
                ..GpConfig::with_noise(self.config.sigma)
            },
            self.config.schedule,
        );

        let x_center = vec![0.5; dim];
        let f_center = objective.evaluate(&surrogate.denormalize(&x_center));
        let k_center = surrogate.append(x_center, f_center, 0.0);
        surrogate.train()?;

        let tree = PartitionTree::new(dim, k_center);
        self.state = Some(RunState {
            surrogate,
            tree,
            xi: 1.0,
            lb: f_center,
            retrain_n: 1,
            upc,
            iterations: Vec::new(),
        });

        #[cfg(feature = "tracing")]
        tracing::info!(f_center, "initialized at domain midpoint");

        self.notify(|observer, view| observer.post_initialise(view))
    }

    /// Runs one full iteration (steps 1-4 plus the retrain check).
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialised`] before [`initialize`](Self::initialize);
    /// numerical and observer errors as in [`run`](Self::run).
    pub fn step<O: Objective + ?Sized>(&mut self, objective: &mut O) -> Result<StepOutcome> {
        if self.state.is_none() {
            return Err(Error::NotInitialised);
        }
        let Some(record) = self.iterate(objective)? else {
            return Ok(StepOutcome::Exhausted);
        };
        self.notify(|observer, view| observer.post_iteration(view, &record))?;

        if self.retrain_due() {
            self.retrain()?;
            self.notify(|observer, view| observer.post_update(view))?;
        }
        Ok(StepOutcome::Progressed)
    }

    /// Assembles the run result from every evaluated sample.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialised`] before initialization; observer errors from
    /// `PreFinalise`.
    pub fn finalize(&mut self) -> Result<GpsoResult> {
        if self.state.is_none() {
            return Err(Error::NotInitialised);
        }
        self.notify(|observer, view| observer.pre_finalise(view))?;

        let state = self.state.as_ref().expect("state checked above");
        let surrogate = &state.surrogate;
        let mut samples = Vec::with_capacity(surrogate.n_evaluated());
        for record in surrogate.records().iter().filter(|r| r.is_evaluated()) {
            samples.push(Evaluation {
                x: surrogate.denormalize(&record.x),
                value: record.mu,
            });
        }
        let mut solution: Option<&Evaluation> = None;
        for sample in &samples {
            if solution.map_or(true, |best| sample.value > best.value) {
                solution = Some(sample);
            }
        }
        let solution = solution
            .cloned()
            .ok_or(Error::Internal("finalized without an evaluated sample"))?;
        Ok(GpsoResult { samples, solution })
    }

    /// One iteration over the owned state; `None` means step 2 selected
    /// nothing and the frontier is exhausted.
    fn iterate<O: Objective + ?Sized>(
        &mut self,
        objective: &mut O,
    ) -> Result<Option<IterationRecord>> {
        let state = self.state.as_mut().expect("iterate without state");
        let lb_entry = state.lb;
        let xi = state.xi;

        // Step 1: promote every prediction whose UCB clears the current
        // best. LB only rises between iterations, so these rows are the
        // only credible promotion candidates.
        state.surrogate.ucb_refresh();
        let candidates: Vec<usize> = (0..state.surrogate.len())
            .filter(|&k| {
                state.surrogate.is_gp_based(k) && state.surrogate.record(k).ucb > state.lb
            })
            .collect();
        for &k in &candidates {
            let x = state.surrogate.denormalize(&state.surrogate.record(k).x);
            let y = objective.evaluate(&x);
            state.surrogate.update(k, y, 0.0);
        }
        if !candidates.is_empty() {
            state.surrogate.ucb_refresh();
        }
        if let Some((_, best)) = state.surrogate.best_evaluated() {
            state.lb = best.mu;
        }

        // Step 2: per depth, pick the leaf with the highest UCB strictly
        // above everything selected at shallower depths. A GP-based winner
        // is evaluated on the spot and the depth rescanned from its entry
        // threshold, so no selected leaf stays GP-based.
        let depth = state.tree.depth();
        let mut selection: Vec<Option<SelectedLeaf>> = vec![None; depth];
        let mut v_max = f64::NEG_INFINITY;
        for h in 0..depth {
            let v_entry = v_max;
            loop {
                let mut best: Option<(usize, usize, f64)> = None;
                for i in 0..state.tree.width(h) {
                    if !state.tree.is_leaf(h, i) {
                        continue;
                    }
                    let k = state.tree.sample_idx(h, i);
                    let u = state.surrogate.record(k).ucb;
                    if u > v_entry && best.map_or(true, |(_, _, b)| u > b) {
                        best = Some((i, k, u));
                    }
                }
                let Some((i, k, u)) = best else { break };
                if state.surrogate.is_gp_based(k) {
                    let x = state.surrogate.denormalize(&state.surrogate.record(k).x);
                    let y = objective.evaluate(&x);
                    state.surrogate.update(k, y, 0.0);
                    state.surrogate.ucb_refresh();
                    if y > state.lb {
                        state.lb = y;
                    }
                    continue;
                }
                selection[h] = Some(SelectedLeaf { node: i, sample: k, ucb: u });
                v_max = u;
                break;
            }
        }

        let n_sel = selection.iter().flatten().count();
        if n_sel == 0 {
            return Ok(None);
        }

        // The evaluated set is frozen for the rest of the iteration, so one
        // factorization serves every remaining prediction.
        let predictor = state.surrogate.predictor()?;
        let ng = state.surrogate.n_gp_based();

        // Step 3: drop a selection when a depth-bounded virtual expansion
        // shows it cannot reach the UCB of the next selected depth.
        for h in 0..depth {
            if selection[h].is_none() {
                continue;
            }
            let Some(h_next) = ((h + 1)..depth).find(|&j| selection[j].is_some()) else {
                break;
            };
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let cap = (((h + 1) as f64 + xi).ceil().min(depth as f64) as usize)
                .saturating_sub(h + 1);
            let sdepth = (h_next - h).min(cap);
            if sdepth == 0 {
                continue;
            }
            let threshold = selection[h + sdepth].map_or(f64::NEG_INFINITY, |s| s.ucb);
            let sel = selection[h].expect("selection checked above");
            let keep = {
                let (box_lower, box_upper) = state.tree.bounds(h, sel.node);
                let center = &state.surrogate.record(sel.sample).x;
                lookahead(
                    &predictor,
                    state.surrogate.schedule(),
                    box_lower,
                    box_upper,
                    center,
                    sdepth,
                    threshold,
                    ng,
                    n_sel,
                )
            };
            if !keep {
                selection[h] = None;
            }
        }

        // Step 4: trisect every survivor; the outer children get fresh
        // GP-based rows, the middle child inherits the parent's sample.
        let mut n_split = 0;
        for (h, slot) in selection.iter().enumerate() {
            let Some(sel) = *slot else { continue };
            let center = state.surrogate.record(sel.sample).x.clone();
            let Trisection {
                children,
                outer_centers,
                ..
            } = {
                let (box_lower, box_upper) = state.tree.bounds(h, sel.node);
                trisect(box_lower, box_upper, &center)
            };
            let [c_lo, c_hi] = outer_centers;
            let (mu_lo, sigma_lo) = predictor.predict(&c_lo);
            let (mu_hi, sigma_hi) = predictor.predict(&c_hi);
            let k_lo = state.surrogate.append(c_lo, mu_lo, sigma_lo);
            let k_hi = state.surrogate.append(c_hi, mu_hi, sigma_hi);
            let [(lo_l, up_l), (lo_m, up_m), (lo_h, up_h)] = children;
            state.tree.split(
                h,
                sel.node,
                [
                    ChildSpec { lower: lo_l, upper: up_l, sample_idx: k_lo },
                    ChildSpec { lower: lo_m, upper: up_m, sample_idx: sel.sample },
                    ChildSpec { lower: lo_h, upper: up_h, sample_idx: k_hi },
                ],
            );
            n_split += 1;
        }
        state.surrogate.ucb_refresh();

        if let Some((_, best)) = state.surrogate.best_evaluated() {
            state.lb = best.mu;
        }
        let improved = state.lb > lb_entry;
        let xi_bound = xi_max(state.surrogate.dim());
        state.xi = if improved {
            (state.xi + 4.0).min(xi_bound)
        } else {
            (state.xi - 0.5).max(1.0)
        };

        let record = IterationRecord {
            xi,
            n_selected: n_split,
            lb: state.lb,
        };
        state.iterations.push(record);

        #[cfg(feature = "tracing")]
        {
            let iteration = state.iterations.len();
            if self.config.verbose {
                tracing::info!(iteration, xi, n_split, lb = state.lb, "iteration complete");
            } else {
                tracing::debug!(iteration, xi, n_split, lb = state.lb, "iteration complete");
            }
            if improved {
                tracing::info!(lb = state.lb, "new best value found");
            }
        }

        Ok(Some(record))
    }

    fn retrain_due(&self) -> bool {
        let Some(state) = self.state.as_ref() else {
            return false;
        };
        2 * state.tree.n_splits() >= state.upc * state.retrain_n * (state.retrain_n + 1)
    }

    fn retrain(&mut self) -> Result<()> {
        let state = self.state.as_mut().expect("retrain without state");
        state.surrogate.train()?;
        state.retrain_n = next_retrain_counter(state.tree.n_splits(), state.upc);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            n_splits = state.tree.n_splits(),
            retrain_n = state.retrain_n,
            "hyperparameters retrained"
        );
        Ok(())
    }

    /// Dispatches an event to every observer with a read-only state view.
    fn notify<F>(&mut self, event: F) -> Result<()>
    where
        F: Fn(&mut dyn Observer, &RunView<'_>) -> Result<()>,
    {
        let Some(state) = self.state.as_ref() else {
            return Ok(());
        };
        let view = RunView {
            surrogate: &state.surrogate,
            tree: &state.tree,
            xi: state.xi,
            best: state.lb,
        };
        for observer in &mut self.observers {
            event(observer.as_mut(), &view)?;
        }
        Ok(())
    }
}

/// The look-ahead cap: how deep step 3 may virtually expand.
fn xi_max(dim: usize) -> f64 {
    if dim < 10 {
        8.0
    } else if dim < 20 {
        5.0
    } else {
        3.0
    }
}

/// The retrain counter after a training run at `ns` total splits:
/// `⌈(√(1 + 8·Ns/upc) − 1)/2⌉`, so retrain gaps grow linearly.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn next_retrain_counter(ns: usize, upc: usize) -> usize {
    let ns = ns as f64;
    let upc = upc as f64;
    ((((1.0 + 8.0 * ns / upc).sqrt() - 1.0) / 2.0).ceil().max(1.0)) as usize
}

/// Virtually expands a selected box to `sdepth` levels, predicting both
/// outer-child centers per virtual node. Returns `true` (keep the
/// selection) as soon as any predicted `μ + ς·σ` reaches `threshold`;
/// exhausting the expansion below it drops the selection.
#[allow(clippy::too_many_arguments)]
fn lookahead(
    predictor: &Predictor,
    schedule: &VarsigmaSchedule,
    lower: &[f64],
    upper: &[f64],
    center: &[f64],
    sdepth: usize,
    threshold: f64,
    ng: usize,
    n_sel: usize,
) -> bool {
    let mut frontier = vec![(lower.to_vec(), upper.to_vec(), center.to_vec())];
    for level in 1..=sdepth {
        // Each virtual level would add two GP samples per selected leaf.
        let vs = schedule.value(ng + 2 * (n_sel + level - 1));
        let mut next = Vec::with_capacity(frontier.len() * 3);
        for (box_lower, box_upper, box_center) in &frontier {
            let tri = trisect(box_lower, box_upper, box_center);
            for c in &tri.outer_centers {
                let (mu, sigma) = predictor.predict(c);
                if mu + vs * sigma >= threshold {
                    return true;
                }
            }
            if level < sdepth {
                let [(lo_l, up_l), (lo_m, up_m), (lo_h, up_h)] = tri.children;
                let [c_lo, c_hi] = tri.outer_centers;
                next.push((lo_l, up_l, c_lo));
                next.push((lo_m, up_m, box_center.clone()));
                next.push((lo_h, up_h, c_hi));
            }
        }
        frontier = next;
    }
    false
}

/// A builder for configuring a [`Gpso`] optimizer.
///
/// All options have defaults:
///
/// | Option | Default | Description |
/// |--------|---------|-------------|
/// | `sigma` | `1e-4` | Initial observation-noise standard deviation |
/// | `eta` | `0.05` | UCB undershoot probability for the ς schedule |
/// | `varsigma` | — | Fixed exploration constant (replaces the schedule) |
/// | `upc` | `2·d` | Hyperparameter retrain cadence constant |
/// | `train_iters` | `100` | CG iterations per training run |
/// | `verbose` | `false` | Per-iteration records at info level |
///
/// # Examples
///
/// ```
/// use gpso::Gpso;
///
/// let opt = Gpso::builder()
///     .sigma(1e-3)
///     .eta(0.1)
///     .upc(6)
///     .verbose(true)
///     .build()
///     .unwrap();
/// drop(opt);
/// ```
#[derive(Clone, Debug, Default)]
pub struct GpsoBuilder {
    sigma: Option<f64>,
    schedule: Option<VarsigmaSchedule>,
    upc: Option<usize>,
    train_iters: Option<usize>,
    verbose: bool,
}

impl GpsoBuilder {
    /// Sets the initial observation-noise standard deviation.
    ///
    /// Default: `1e-4`.
    #[must_use]
    pub fn sigma(mut self, sigma: f64) -> Self {
        self.sigma = Some(sigma);
        self
    }

    /// Uses the error-bound ς schedule with undershoot probability `eta`.
    ///
    /// Default: `0.05`. Mutually exclusive with [`varsigma`](Self::varsigma);
    /// the last call wins.
    #[must_use]
    pub fn eta(mut self, eta: f64) -> Self {
        self.schedule = Some(VarsigmaSchedule::ErrorBound { eta });
        self
    }

    /// Uses a fixed exploration constant instead of the ς schedule.
    #[must_use]
    pub fn varsigma(mut self, varsigma: f64) -> Self {
        self.schedule = Some(VarsigmaSchedule::Constant(varsigma));
        self
    }

    /// Sets the retrain cadence constant.
    ///
    /// Default: `2·d`, resolved at initialization.
    #[must_use]
    pub fn upc(mut self, upc: usize) -> Self {
        self.upc = Some(upc);
        self
    }

    /// Sets the CG iteration cap per hyperparameter training run.
    ///
    /// Default: 100.
    #[must_use]
    pub fn train_iters(mut self, iters: usize) -> Self {
        self.train_iters = Some(iters);
        self
    }

    /// Logs per-iteration records at info level (requires the `tracing`
    /// feature to have any effect).
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builds the configured optimizer.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidNoise`], [`Error::InvalidEta`],
    /// [`Error::InvalidVarsigma`], or [`Error::InvalidCadence`] when a
    /// setting is out of range.
    pub fn build(self) -> Result<Gpso> {
        let defaults = GpsoConfig::default();
        let sigma = self.sigma.unwrap_or(defaults.sigma);
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(Error::InvalidNoise(sigma));
        }
        let schedule = self.schedule.unwrap_or(defaults.schedule);
        match schedule {
            VarsigmaSchedule::Constant(v) if !v.is_finite() || v <= 0.0 => {
                return Err(Error::InvalidVarsigma(v));
            }
            VarsigmaSchedule::ErrorBound { eta } if !(0.0..1.0).contains(&eta) || eta == 0.0 => {
                return Err(Error::InvalidEta(eta));
            }
            _ => {}
        }
        if self.upc == Some(0) {
            return Err(Error::InvalidCadence(0));
        }
        Ok(Gpso::with_config(GpsoConfig {
            sigma,
            schedule,
            upc: self.upc,
            train_iters: self.train_iters.unwrap_or(defaults.train_iters),
            verbose: self.verbose,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_domain(dim: usize) -> Domain {
        Domain::new(vec![0.0; dim], vec![1.0; dim]).unwrap()
    }

    #[test]
    fn test_step_before_initialize_fails() {
        let mut opt = Gpso::new();
        let mut objective = |_: &[f64]| 0.0;
        assert!(matches!(
            opt.step(&mut objective),
            Err(Error::NotInitialised)
        ));
    }

    #[test]
    fn test_zero_budget_is_a_configuration_error() {
        let domain = unit_domain(1);
        let mut opt = Gpso::new();
        assert!(matches!(
            opt.run(|_: &[f64]| 0.0, &domain, 0),
            Err(Error::InvalidBudget(0))
        ));
    }

    #[test]
    fn test_budget_equal_to_initial_evaluations_runs_zero_iterations() {
        let domain = Domain::new(vec![-2.0], vec![4.0]).unwrap();
        let mut opt = Gpso::builder().varsigma(3.0).build().unwrap();
        let result = opt.run(|x: &[f64]| -x[0] * x[0], &domain, 1).unwrap();

        // Only the midpoint was evaluated and it is the solution.
        assert_eq!(result.samples.len(), 1);
        assert!((result.solution.x[0] - 1.0).abs() < 1e-12);
        assert!((result.solution.value + 1.0).abs() < 1e-12);
        assert!(opt.iterations().is_empty());
    }

    #[test]
    fn test_builder_rejects_bad_settings() {
        assert!(matches!(
            Gpso::builder().sigma(0.0).build(),
            Err(Error::InvalidNoise(_))
        ));
        assert!(matches!(
            Gpso::builder().eta(1.5).build(),
            Err(Error::InvalidEta(_))
        ));
        assert!(matches!(
            Gpso::builder().varsigma(-3.0).build(),
            Err(Error::InvalidVarsigma(_))
        ));
        assert!(matches!(
            Gpso::builder().upc(0).build(),
            Err(Error::InvalidCadence(0))
        ));
    }

    #[test]
    fn test_retrain_counter_formula() {
        // At the first trigger (Ns = upc) the counter stays at 1, then grows
        // with the square root of the split count.
        assert_eq!(next_retrain_counter(4, 4), 1);
        assert_eq!(next_retrain_counter(5, 4), 2);
        assert_eq!(next_retrain_counter(12, 4), 2);
        assert_eq!(next_retrain_counter(13, 4), 3);
    }

    #[test]
    fn test_xi_cap_scales_down_with_dimension() {
        assert_eq!(xi_max(2), 8.0);
        assert_eq!(xi_max(10), 5.0);
        assert_eq!(xi_max(19), 5.0);
        assert_eq!(xi_max(20), 3.0);
    }

    #[test]
    fn test_step_one_promotes_confident_prediction() {
        // A synthetic GP-based row with μ = 10, σ = 0.1 under ς = 3 has
        // UCB 10.3 > LB = 9 and must be evaluated by step 1.
        let domain = unit_domain(2);
        let mut opt = Gpso::builder().varsigma(3.0).build().unwrap();
        let mut calls: Vec<Vec<f64>> = Vec::new();
        let mut objective = |x: &[f64]| {
            calls.push(x.to_vec());
            9.0 - (x[0] - 0.5).powi(2) - (x[1] - 0.5).powi(2)
        };
        opt.initialize(&mut objective, &domain).unwrap();
        assert_eq!(opt.n_evaluated(), 1);

        let injected = vec![0.125, 0.625];
        let state = opt.state.as_mut().unwrap();
        let k = state.surrogate.append(injected.clone(), 10.0, 0.1);
        opt.step(&mut objective).unwrap();

        let state = opt.state.as_ref().unwrap();
        assert!(
            !state.surrogate.is_gp_based(k),
            "step 1 must promote the injected row to evaluated"
        );
        let expected = 9.0 - (0.125_f64 - 0.5).powi(2) - (0.625_f64 - 0.5).powi(2);
        assert!((state.surrogate.record(k).mu - expected).abs() < 1e-12);
        assert!(calls.iter().any(|x| x == &injected));
    }

    #[test]
    fn test_nan_objective_exhausts_the_frontier() {
        // NaN scores fail every strict comparison, so step 2 cannot select
        // a leaf and the run stops after the initial evaluation.
        let domain = unit_domain(2);
        let mut opt = Gpso::builder().varsigma(3.0).build().unwrap();
        let result = opt.run(|_: &[f64]| f64::NAN, &domain, 10).unwrap();
        assert_eq!(result.samples.len(), 1);
        assert_eq!(opt.iterations().len(), 0);
    }

    #[test]
    fn test_selection_is_never_gp_based_after_step_two() {
        let domain = unit_domain(2);
        let mut opt = Gpso::builder().varsigma(3.0).build().unwrap();
        let mut objective =
            |x: &[f64]| -(x[0] - 0.3).powi(2) - (x[1] - 0.7).powi(2);
        opt.initialize(&mut objective, &domain).unwrap();
        for _ in 0..5 {
            opt.step(&mut objective).unwrap();
        }
        // Every leaf that was split had an evaluated representative: middle
        // children inherit their parent's sample, so any interior node's
        // sample must be evaluated.
        let state = opt.state.as_ref().unwrap();
        for h in 0..state.tree.depth() {
            for i in 0..state.tree.width(h) {
                if !state.tree.is_leaf(h, i) {
                    let k = state.tree.sample_idx(h, i);
                    assert!(
                        !state.surrogate.is_gp_based(k),
                        "split node ({h}, {i}) had a GP-based representative"
                    );
                }
            }
        }
    }

    #[test]
    fn test_observer_error_aborts_the_run() {
        struct Failing;
        impl Observer for Failing {
            fn post_iteration(
                &mut self,
                _run: &RunView<'_>,
                _record: &IterationRecord,
            ) -> Result<()> {
                Err(Error::Observer("boom".into()))
            }
        }

        let domain = unit_domain(1);
        let mut opt = Gpso::builder().varsigma(3.0).build().unwrap();
        opt.add_observer(Failing);
        let err = opt.run(|x: &[f64]| -x[0], &domain, 5).unwrap_err();
        assert!(matches!(err, Error::Observer(_)));
        // Core state stays consistent: a snapshot can still be taken.
        assert!(opt.snapshot().is_ok());
    }
}
