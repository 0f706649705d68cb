#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the search domain has no dimensions.
    #[error("search domain must have at least one dimension")]
    EmptyDomain,

    /// Returned when a bound pair does not describe a non-empty interval.
    #[error("invalid bounds on axis {axis}: lower ({low}) must be finite and less than upper ({high})")]
    InvalidBounds {
        /// The axis with the offending bounds.
        axis: usize,
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when the two bound vectors of a domain differ in length.
    #[error("bound dimension mismatch: lower has {expected} entries but upper has {got}")]
    DimensionMismatch {
        /// The number of lower-bound entries.
        expected: usize,
        /// The number of upper-bound entries.
        got: usize,
    },

    /// Returned when the evaluation budget is zero.
    #[error("invalid budget: {0} (the budget must allow at least the initial evaluation)")]
    InvalidBudget(usize),

    /// Returned when the hyperparameter retrain cadence is zero.
    #[error("invalid retrain cadence: {0} (must be at least 1)")]
    InvalidCadence(usize),

    /// Returned when the confidence-bound probability is outside (0, 1).
    #[error("invalid eta: {0} must be in (0.0, 1.0)")]
    InvalidEta(f64),

    /// Returned when a fixed exploration constant is not positive.
    #[error("invalid varsigma: {0} must be positive")]
    InvalidVarsigma(f64),

    /// Returned when the initial observation-noise level is not positive.
    #[error("invalid noise level: {0} must be positive and finite")]
    InvalidNoise(f64),

    /// Returned when stepping or finalizing an optimizer that was never
    /// initialized.
    #[error("optimizer is not initialized: call initialize() or run() first")]
    NotInitialised,

    /// Returned when GP prediction keeps failing after ramping the log-noise
    /// up to its ceiling.
    #[error("GP prediction failed after raising log-noise to {lik}")]
    GpNumerical {
        /// The log-noise level reached when prediction was abandoned.
        lik: f64,
    },

    /// Returned when an event observer fails.
    #[error("observer error: {0}")]
    Observer(String),

    /// Returned when a snapshot cannot be written or read.
    #[error("storage error: {0}")]
    Storage(String),

    /// Returned when an internal invariant is violated.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;
