//! Ternary partition tree over the normalized unit box.
//!
//! Nodes are axis-aligned boxes stored per depth as parallel arrays; a node
//! refers to its representative sample only through an index into the
//! surrogate's table, so ownership stays a strict DAG. Nodes are append-only
//! and never deleted, which keeps every stored index valid for the lifetime
//! of a run.

use serde::{Deserialize, Serialize};

/// One depth of the tree: parallel arrays over its nodes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Level {
    lower: Vec<Vec<f64>>,
    upper: Vec<Vec<f64>>,
    sample_idx: Vec<usize>,
    leaf: Vec<bool>,
}

impl Level {
    fn push(&mut self, lower: Vec<f64>, upper: Vec<f64>, sample_idx: usize) {
        self.lower.push(lower);
        self.upper.push(upper);
        self.sample_idx.push(sample_idx);
        self.leaf.push(true);
    }

    fn len(&self) -> usize {
        self.sample_idx.len()
    }
}

/// A child box handed to [`PartitionTree::split`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChildSpec {
    /// Lower corner of the child box.
    pub lower: Vec<f64>,
    /// Upper corner of the child box.
    pub upper: Vec<f64>,
    /// Surrogate index of the child's representative sample.
    pub sample_idx: usize,
}

/// Depth-indexed ternary partition of the unit box.
///
/// Depth 0 always holds exactly one node, the full `[0, 1]^d` box. Splitting
/// a leaf retires it from the frontier and appends its three children one
/// depth below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionTree {
    levels: Vec<Level>,
    n_splits: usize,
}

impl PartitionTree {
    /// Creates a tree whose single root leaf covers `[0, 1]^d` and points at
    /// sample `center_idx`.
    #[must_use]
    pub fn new(dim: usize, center_idx: usize) -> Self {
        let mut root = Level::default();
        root.push(vec![0.0; dim], vec![1.0; dim], center_idx);
        Self {
            levels: vec![root],
            n_splits: 0,
        }
    }

    /// The number of depths currently present.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// The number of nodes at depth `h`.
    #[must_use]
    pub fn width(&self, h: usize) -> usize {
        self.levels[h].len()
    }

    /// Whether node `(h, i)` has never been split.
    #[must_use]
    pub fn is_leaf(&self, h: usize, i: usize) -> bool {
        self.levels[h].leaf[i]
    }

    /// The surrogate index of the representative sample of node `(h, i)`.
    #[must_use]
    pub fn sample_idx(&self, h: usize, i: usize) -> usize {
        self.levels[h].sample_idx[i]
    }

    /// The box extents of node `(h, i)`.
    #[must_use]
    pub fn bounds(&self, h: usize, i: usize) -> (&[f64], &[f64]) {
        let level = &self.levels[h];
        (&level.lower[i], &level.upper[i])
    }

    /// The total number of splits performed since construction.
    #[must_use]
    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Splits leaf `(h, i)`: marks it interior and appends the three child
    /// leaves at depth `h + 1`.
    ///
    /// # Panics
    ///
    /// Panics when `(h, i)` is not a leaf; splitting an interior node is a
    /// caller bug.
    pub fn split(&mut self, h: usize, i: usize, children: [ChildSpec; 3]) {
        assert!(self.levels[h].leaf[i], "node ({h}, {i}) is already split");
        self.levels[h].leaf[i] = false;
        if h + 1 == self.levels.len() {
            self.levels.push(Level::default());
        }
        let below = &mut self.levels[h + 1];
        for child in children {
            below.push(child.lower, child.upper, child.sample_idx);
        }
        self.n_splits += 1;
    }
}

/// The three boxes produced by trisecting a parent along its longest side.
#[derive(Clone, Debug, PartialEq)]
pub struct Trisection {
    /// The coordinate that was split.
    pub axis: usize,
    /// The `lo`, `mid`, `hi` child boxes as `(lower, upper)` pairs.
    pub children: [(Vec<f64>, Vec<f64>); 3],
    /// Representative points of the `lo` and `hi` children. The `mid` child
    /// keeps the parent's point, which already sits in the middle third.
    pub outer_centers: [Vec<f64>; 2],
}

/// Trisects a box along its longest side (ties broken by lowest axis).
///
/// `center` is the parent's representative point; the outer children's
/// representatives inherit every coordinate from it except the split axis,
/// where they sit at the centers of the outer thirds.
#[must_use]
pub fn trisect(lower: &[f64], upper: &[f64], center: &[f64]) -> Trisection {
    let mut axis = 0;
    let mut widest = f64::NEG_INFINITY;
    for (s, (lo, up)) in lower.iter().zip(upper).enumerate() {
        let width = up - lo;
        if width > widest {
            widest = width;
            axis = s;
        }
    }

    let third = (upper[axis] - lower[axis]) / 3.0;
    let cut_lo = lower[axis] + third;
    let cut_hi = lower[axis] + 2.0 * third;

    let boxed = |lo_s: f64, up_s: f64| {
        let mut lo = lower.to_vec();
        let mut up = upper.to_vec();
        lo[axis] = lo_s;
        up[axis] = up_s;
        (lo, up)
    };
    let centered = |c_s: f64| {
        let mut c = center.to_vec();
        c[axis] = c_s;
        c
    };

    Trisection {
        axis,
        children: [
            boxed(lower[axis], cut_lo),
            boxed(cut_lo, cut_hi),
            boxed(cut_hi, upper[axis]),
        ],
        outer_centers: [
            centered((5.0 * lower[axis] + upper[axis]) / 6.0),
            centered((lower[axis] + 5.0 * upper[axis]) / 6.0),
        ],
    }
}
