//! A GP-surrogate global optimizer (GPSO) for expensive black-box functions.
//!
//! This library maximizes an expensive objective `f: ℝ^d → ℝ` over a
//! hyper-rectangle under a fixed evaluation budget. It combines Bayesian
//! optimization — a Gaussian-process surrogate with an upper-confidence-bound
//! (UCB) acquisition — with a DIRECT-style hierarchical partition of the
//! (normalized) search box into thirds along the longest side.
//!
//! # Quick start
//!
//! ```
//! use gpso::{Domain, Gpso};
//!
//! // Maximize f(x) = -‖x - c‖² on [-1, 1]².
//! let c = [0.3, -0.4];
//! let domain = Domain::new(vec![-1.0, -1.0], vec![1.0, 1.0]).unwrap();
//!
//! let mut opt = Gpso::builder().varsigma(3.0).build().unwrap();
//! let result = opt
//!     .run(
//!         |x: &[f64]| -(x[0] - c[0]).powi(2) - (x[1] - c[1]).powi(2),
//!         &domain,
//!         30,
//!     )
//!     .unwrap();
//!
//! println!("best {:?} -> {}", result.solution.x, result.solution.value);
//! ```
//!
//! # Algorithm overview
//!
//! 1. **Initialize** — evaluate the domain midpoint, train the GP
//!    hyperparameters on it, seed the partition tree with the unit box.
//! 2. **Iterate** until the budget is spent:
//!    - *Promote* every GP-predicted sample whose UCB exceeds the best
//!      evaluated value by actually evaluating the objective there.
//!    - *Select* at most one leaf per tree depth, requiring strictly
//!      increasing UCBs with depth; GP-based winners are evaluated on the
//!      spot so every selection rests on a true objective value.
//!    - *Prune* selections whose bounded virtual expansion (up to XI levels
//!      of imaginary splits, scored by GP prediction) cannot reach the UCB
//!      of the next selected depth.
//!    - *Split* the survivors into thirds along their longest side; the two
//!      outer children enter the surrogate as GP-predicted samples, the
//!      middle child inherits the parent's sample.
//! 3. **Finalize** — return every evaluated sample and the argmax, in
//!    original coordinates.
//!
//! Hyperparameters retrain between iterations on a quadratic cadence, so
//! retraining stays cheap relative to the search as the tree grows.
//!
//! # Staged API
//!
//! [`Gpso::run`] wraps the whole lifecycle. For checkpointing or custom
//! stopping rules, drive the stages yourself with
//! [`initialize`](Gpso::initialize), [`step`](Gpso::step), and
//! [`finalize`](Gpso::finalize), and persist between steps with
//! [`save`](Gpso::save)/[`load`](Gpso::load):
//!
//! ```
//! use gpso::{Domain, Gpso, StepOutcome};
//!
//! let domain = Domain::new(vec![0.0], vec![1.0]).unwrap();
//! let mut objective = |x: &[f64]| -(x[0] - 0.7).powi(2);
//!
//! let mut opt = Gpso::builder().varsigma(3.0).build().unwrap();
//! opt.initialize(&mut objective, &domain).unwrap();
//! while opt.n_evaluated() < 12 {
//!     if opt.step(&mut objective).unwrap() == StepOutcome::Exhausted {
//!         break;
//!     }
//! }
//! let result = opt.finalize().unwrap();
//! assert!(result.solution.value <= 0.0);
//! ```
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `sigma` | `1e-4` | Initial observation-noise standard deviation |
//! | `eta` | `0.05` | UCB undershoot probability driving the ς schedule |
//! | `varsigma` | — | Fixed exploration constant instead of the schedule |
//! | `upc` | `2·d` | Hyperparameter retrain cadence constant |
//! | `train_iters` | `100` | CG iterations per hyperparameter training |
//! | `verbose` | `false` | Per-iteration records at info level |
//!
//! # Feature flags
//!
//! - `tracing`: structured logging of iterations, retraining, and early
//!   termination via the `tracing` crate.

mod error;
pub mod events;
pub mod gp;
mod optimizer;
pub mod surrogate;
pub mod tree;
mod types;

pub use error::{Error, Result};
pub use events::{Observer, RunView};
pub use optimizer::{
    Gpso, GpsoBuilder, GpsoConfig, GpsoResult, IterationRecord, Snapshot, StepOutcome,
    SNAPSHOT_VERSION,
};
pub use surrogate::{GpConfig, SampleRecord, Surrogate, VarsigmaSchedule};
pub use tree::{ChildSpec, PartitionTree, Trisection};
pub use types::{Domain, Evaluation, Objective};
