//! Saving and restoring optimizer state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Gpso, GpsoConfig, IterationRecord, RunState};
use crate::error::{Error, Result};
use crate::surrogate::Surrogate;
use crate::tree::PartitionTree;

/// The snapshot schema version written by this crate.
pub const SNAPSHOT_VERSION: &str = "0.1";

/// A serializable snapshot of a run.
///
/// Holds everything a fresh process needs to continue the run exactly where
/// it stopped: the full sample table, the partition tree, the adaptive
/// look-ahead bound, and the retrain counter. Observers are **not**
/// included; re-register them after loading.
///
/// Numeric arrays round-trip exactly: `serde_json` emits the shortest
/// decimal form that parses back to the same `f64`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version, currently `"0.1"`.
    pub version: String,
    /// The build-time configuration.
    pub config: GpsoConfig,
    /// The current look-ahead bound XI.
    pub xi: f64,
    /// The best evaluated objective value.
    pub lb: f64,
    /// The retrain counter `n`.
    pub retrain_n: usize,
    /// The resolved retrain cadence constant.
    pub upc: usize,
    /// Per-iteration records so far.
    pub iterations: Vec<IterationRecord>,
    /// The partition tree, level arrays included.
    pub tree: PartitionTree,
    /// The surrogate: bounds, sample table, counts, and GP configuration.
    pub surrogate: Surrogate,
}

impl Gpso {
    /// Captures the current run state as a [`Snapshot`].
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialised`] before [`initialize`](Gpso::initialize).
    pub fn snapshot(&self) -> Result<Snapshot> {
        let state = self.run_state().ok_or(Error::NotInitialised)?;
        Ok(Snapshot {
            version: SNAPSHOT_VERSION.to_string(),
            config: self.config().clone(),
            xi: state.xi,
            lb: state.lb,
            retrain_n: state.retrain_n,
            upc: state.upc,
            iterations: state.iterations.clone(),
            tree: state.tree.clone(),
            surrogate: state.surrogate.clone(),
        })
    }

    /// Rebuilds an optimizer from a snapshot.
    ///
    /// The restored instance continues exactly where the snapshot was
    /// taken; a subsequent [`step`](Gpso::step) behaves as if the run had
    /// never been interrupted.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] on a version mismatch.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Storage(format!(
                "unsupported snapshot version {:?} (expected {SNAPSHOT_VERSION:?})",
                snapshot.version
            )));
        }
        let mut optimizer = Gpso::with_config(snapshot.config);
        optimizer.set_run_state(RunState {
            surrogate: snapshot.surrogate,
            tree: snapshot.tree,
            xi: snapshot.xi,
            lb: snapshot.lb,
            retrain_n: snapshot.retrain_n,
            upc: snapshot.upc,
            iterations: snapshot.iterations,
        });
        Ok(optimizer)
    }

    /// Saves the current run state to a JSON file.
    ///
    /// The write is atomic: the snapshot lands in a temp file in the same
    /// directory and is renamed over the target, so a crash mid-write never
    /// leaves a corrupt file behind.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialised`] before initialization, [`Error::Storage`]
    /// on I/O or serialization failure.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot()?;

        let parent = path.parent().unwrap_or(Path::new("."));
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));
        let file =
            std::fs::File::create(&tmp_path).map_err(|e| Error::Storage(e.to_string()))?;
        serde_json::to_writer_pretty(file, &snapshot)
            .map_err(|e| Error::Storage(e.to_string()))?;
        std::fs::rename(&tmp_path, path).map_err(|e| Error::Storage(e.to_string()))
    }

    /// Loads an optimizer from a JSON snapshot file.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] on I/O, parse, or version failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file =
            std::fs::File::open(path.as_ref()).map_err(|e| Error::Storage(e.to_string()))?;
        let snapshot: Snapshot = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| Error::Storage(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }
}
