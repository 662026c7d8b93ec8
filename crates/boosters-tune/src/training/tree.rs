//! Structure-of-arrays regression trees and forests.

use thiserror::Error;

use crate::data::DataFrame;

/// Node index within one tree. The root is 0.
pub type NodeId = u32;

/// Structural defects found by [`Tree::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("node {node} has {side} child {child} out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    #[error("node {node} is its own child")]
    SelfLoop { node: NodeId },
    #[error("node {node} reached twice")]
    DuplicateVisit { node: NodeId },
    #[error("cycle through node {node}")]
    CycleDetected { node: NodeId },
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
}

/// How a split node routes present values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SplitRule {
    /// Values below the threshold go left.
    #[default]
    LessThan,
    /// The category whose code equals the threshold goes left.
    Equals,
}

/// The test a split node applies to one frame column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitCondition {
    pub column: usize,
    pub rule: SplitRule,
    pub threshold: f32,
    /// Side taken by missing values.
    pub default_left: bool,
}

impl SplitCondition {
    #[inline]
    pub fn goes_left(&self, value: f32) -> bool {
        if value.is_nan() {
            return self.default_left;
        }
        match self.rule {
            SplitRule::LessThan => value < self.threshold,
            SplitRule::Equals => value == self.threshold,
        }
    }
}

/// A binary regression tree stored as parallel arrays.
///
/// Split nodes apply a [`SplitCondition`] to one frame column: a threshold
/// for ordered features, one category against the rest for categorical
/// ones. Missing values follow `default_left`. Split nodes also record the
/// penalised gain and the total curvature of the rows they split, which the
/// regularisation line search reads back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    split_columns: Vec<u32>,
    rules: Vec<SplitRule>,
    thresholds: Vec<f32>,
    default_left: Vec<bool>,
    left_children: Vec<NodeId>,
    right_children: Vec<NodeId>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f64>,
    gains: Vec<f64>,
    curvatures: Vec<f64>,
}

/// Bytes one node occupies across the parallel arrays.
pub const NODE_BYTES: usize = 4 + 1 + 4 + 1 + 4 + 4 + 1 + 8 + 8 + 8;

impl Tree {
    /// A tree holding a single leaf.
    pub fn leaf(value: f64, curvature: f64) -> Self {
        let mut tree = Self::default();
        tree.push_leaf(value, curvature);
        tree
    }

    /// Append a leaf, returning its id.
    pub fn push_leaf(&mut self, value: f64, curvature: f64) -> NodeId {
        let id = self.is_leaf.len() as NodeId;
        self.split_columns.push(0);
        self.rules.push(SplitRule::LessThan);
        self.thresholds.push(0.0);
        self.default_left.push(false);
        self.left_children.push(0);
        self.right_children.push(0);
        self.is_leaf.push(true);
        self.leaf_values.push(value);
        self.gains.push(0.0);
        self.curvatures.push(curvature);
        id
    }

    /// Turn leaf `node` into a split with two new leaf children.
    ///
    /// `left` and `right` are `(value, curvature)` of the children. Returns
    /// their ids.
    pub fn split(
        &mut self,
        node: NodeId,
        condition: SplitCondition,
        gain: f64,
        left: (f64, f64),
        right: (f64, f64),
    ) -> (NodeId, NodeId) {
        let left_id = self.push_leaf(left.0, left.1);
        let right_id = self.push_leaf(right.0, right.1);
        let n = node as usize;
        self.split_columns[n] = condition.column as u32;
        self.rules[n] = condition.rule;
        self.thresholds[n] = condition.threshold;
        self.default_left[n] = condition.default_left;
        self.left_children[n] = left_id;
        self.right_children[n] = right_id;
        self.is_leaf[n] = false;
        self.leaf_values[n] = 0.0;
        self.gains[n] = gain;
        (left_id, right_id)
    }

    /// Overwrite the value of leaf `node`.
    pub fn set_leaf_value(&mut self, node: NodeId, value: f64) {
        self.leaf_values[node as usize] = value;
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> f64 {
        self.leaf_values[node as usize]
    }

    pub fn n_splits(&self) -> usize {
        self.is_leaf.iter().filter(|&&leaf| !leaf).count()
    }

    /// Sum of penalised gain over split nodes.
    pub fn split_gain(&self) -> f64 {
        self.split_nodes().map(|n| self.gains[n]).sum()
    }

    /// Sum of curvature over split nodes.
    pub fn split_curvature(&self) -> f64 {
        self.split_nodes().map(|n| self.curvatures[n]).sum()
    }

    /// Depth of the deepest leaf; a single leaf has depth 0.
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0 as NodeId, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if self.is_leaf(node) {
                max_depth = max_depth.max(depth);
            } else {
                stack.push((self.left_children[node as usize], depth + 1));
                stack.push((self.right_children[node as usize], depth + 1));
            }
        }
        max_depth
    }

    /// Condition of split node `node`.
    pub fn condition(&self, node: NodeId) -> Option<SplitCondition> {
        let n = node as usize;
        (n < self.n_nodes() && !self.is_leaf[n]).then(|| SplitCondition {
            column: self.split_columns[n] as usize,
            rule: self.rules[n],
            threshold: self.thresholds[n],
            default_left: self.default_left[n],
        })
    }

    /// Largest frame column any split reads.
    pub fn max_split_column(&self) -> Option<usize> {
        self.split_nodes().map(|n| self.split_columns[n] as usize).max()
    }

    /// Leaf reached by `row` of `frame`.
    pub fn leaf_for<F: DataFrame + ?Sized>(&self, frame: &F, row: usize) -> NodeId {
        let mut node: NodeId = 0;
        while let Some(condition) = self.condition(node) {
            let n = node as usize;
            node = if condition.goes_left(frame.value(row, condition.column)) {
                self.left_children[n]
            } else {
                self.right_children[n]
            };
        }
        node
    }

    #[inline]
    pub fn predict_row<F: DataFrame + ?Sized>(&self, frame: &F, row: usize) -> f64 {
        self.leaf_value(self.leaf_for(frame, row))
    }

    fn split_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.n_nodes()).filter(|&n| !self.is_leaf[n])
    }

    /// Check that the nodes form a tree rooted at 0.
    ///
    /// Iterative DFS with colour marking: every node must be reached exactly
    /// once and every child index must be in bounds.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }

        const UNVISITED: u8 = 0;
        const VISITING: u8 = 1;
        const DONE: u8 = 2;

        let mut colour = vec![UNVISITED; n_nodes];
        let mut stack: Vec<(NodeId, bool)> = vec![(0, false)];

        while let Some((node, finished)) = stack.pop() {
            let n = node as usize;
            if finished {
                colour[n] = DONE;
                continue;
            }
            match colour[n] {
                VISITING => return Err(TreeValidationError::CycleDetected { node }),
                DONE => return Err(TreeValidationError::DuplicateVisit { node }),
                _ => {}
            }
            colour[n] = VISITING;
            stack.push((node, true));

            if self.is_leaf(node) {
                continue;
            }
            for (side, child) in [("right", self.right_children[n]), ("left", self.left_children[n])] {
                if child == node {
                    return Err(TreeValidationError::SelfLoop { node });
                }
                if child as usize >= n_nodes {
                    return Err(TreeValidationError::ChildOutOfBounds {
                        node,
                        side,
                        child,
                        n_nodes,
                    });
                }
                stack.push((child, false));
            }
        }

        match colour.iter().position(|&c| c == UNVISITED) {
            Some(node) => Err(TreeValidationError::UnreachableNode { node: node as NodeId }),
            None => Ok(()),
        }
    }
}

/// An additive ensemble: `base_score + Σ tree(row)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forest {
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl Forest {
    pub fn new(base_score: f64) -> Self {
        Self {
            base_score,
            trees: Vec::new(),
        }
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn memory_usage(&self) -> usize {
        self.trees.iter().map(|tree| tree.n_nodes() * NODE_BYTES).sum()
    }

    /// Raw (link-scale) prediction for `row`.
    pub fn predict_row<F: DataFrame + ?Sized>(&self, frame: &F, row: usize) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|tree| tree.predict_row(frame, row))
                .sum::<f64>()
    }
}
