//! Observer hooks fired at the optimizer's lifecycle boundaries.
//!
//! Hooks run synchronously between steps and receive a read-only
//! [`RunView`], so handlers cannot mutate core state. A hook returning an
//! error aborts the run with [`Error::Observer`](crate::Error::Observer);
//! the optimizer is left in its consistent post-step form, so a snapshot
//! taken afterwards can resume the run.

use crate::error::Result;
use crate::optimizer::IterationRecord;
use crate::surrogate::Surrogate;
use crate::tree::PartitionTree;

/// A read-only view of the optimizer state handed to observers.
#[derive(Clone, Copy)]
pub struct RunView<'a> {
    /// The surrogate's sample table.
    pub surrogate: &'a Surrogate,
    /// The partition tree.
    pub tree: &'a PartitionTree,
    /// The current look-ahead bound XI.
    pub xi: f64,
    /// The best evaluated objective value so far.
    pub best: f64,
}

/// Lifecycle hooks for watching a run.
///
/// Every hook has a no-op default, so implementors override only what they
/// need:
///
/// ```
/// use gpso::events::{Observer, RunView};
/// use gpso::IterationRecord;
///
/// #[derive(Default)]
/// struct BestTracker {
///     history: Vec<f64>,
/// }
///
/// impl Observer for BestTracker {
///     fn post_iteration(&mut self, _run: &RunView<'_>, record: &IterationRecord) -> gpso::Result<()> {
///         self.history.push(record.lb);
///         Ok(())
///     }
/// }
/// ```
pub trait Observer {
    /// Fired once after the initial evaluation, training, and tree seeding.
    fn post_initialise(&mut self, _run: &RunView<'_>) -> Result<()> {
        Ok(())
    }

    /// Fired after every completed iteration with its record.
    fn post_iteration(&mut self, _run: &RunView<'_>, _record: &IterationRecord) -> Result<()> {
        Ok(())
    }

    /// Fired after each hyperparameter retraining.
    fn post_update(&mut self, _run: &RunView<'_>) -> Result<()> {
        Ok(())
    }

    /// Fired right before the result is assembled.
    fn pre_finalise(&mut self, _run: &RunView<'_>) -> Result<()> {
        Ok(())
    }
}
