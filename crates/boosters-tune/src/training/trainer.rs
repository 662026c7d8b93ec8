//! The tree-construction collaborator and its reference implementation.

use crate::data::DataFrame;
use crate::error::TrainError;
use crate::features::{FeatureDataType, FeatureKind, FeatureSampleDistribution};
use crate::mask::RowMask;
use crate::tuning::Hyperparameters;
use crate::utils::{derive_seed, seeded_rng};

use super::tree::{Forest, NodeId, SplitCondition, SplitRule, Tree};
use super::{Loss, TrainingProgress};

// =============================================================================
// Collaborator interface
// =============================================================================

/// Read-only tables every training call shares.
///
/// Built once per build and then shared across fold workers.
#[derive(Clone, Debug)]
pub struct TrainingContext {
    pub dependent_variable: usize,
    /// Frame column of each selected feature.
    pub feature_columns: Vec<usize>,
    /// Semantic type of each selected feature.
    pub feature_types: Vec<FeatureDataType>,
    pub sample_distribution: FeatureSampleDistribution,
}

impl TrainingContext {
    #[inline]
    pub fn n_features(&self) -> usize {
        self.feature_columns.len()
    }

    /// Split-search kind of `feature`; continuous when types are unknown.
    #[inline]
    pub fn feature_kind(&self, feature: usize) -> FeatureKind {
        self.feature_types
            .get(feature)
            .map_or(FeatureKind::Continuous, |data_type| data_type.kind)
    }

    /// Largest frame column a model trained on this context reads.
    pub fn max_feature_column(&self) -> Option<usize> {
        self.feature_columns.iter().copied().max()
    }

    /// Heap bytes held by the tables.
    pub fn memory_usage(&self) -> usize {
        self.feature_columns.capacity() * std::mem::size_of::<usize>()
            + self.feature_types.capacity() * std::mem::size_of::<FeatureDataType>()
            + self.sample_distribution.weights().len() * std::mem::size_of::<f64>()
    }
}

/// One forest-training job.
#[derive(Clone, Copy, Debug)]
pub struct TrainRequest<'a> {
    pub train_rows: &'a RowMask,
    /// Rows the returned loss is measured on; empty means the train rows.
    pub test_rows: &'a RowMask,
    pub hyperparameters: &'a Hyperparameters,
    /// Seed for feature bagging; derive it from the job's coordinates.
    pub seed: u64,
    /// Receives one unit per tree, `maximum_number_trees` units in total.
    pub progress: &'a TrainingProgress,
}

/// A trained forest with the statistics the orchestrator reads back.
#[derive(Clone, Debug)]
pub struct TrainedForest<M> {
    pub model: M,
    /// Mean loss over the request's test rows.
    pub test_loss: f64,
    pub n_trees: usize,
    /// Sum of split gains over every tree.
    pub split_gain: f64,
    /// Sum of split-node curvature over every tree.
    pub split_curvature: f64,
    pub n_splits: usize,
}

/// A trained model that can score frame rows.
pub trait ForestModel: Send + Sync {
    /// Raw (link-scale) prediction for `row`.
    fn predict_row<F: DataFrame + ?Sized>(&self, frame: &F, row: usize) -> f64;

    fn n_trees(&self) -> usize;

    /// Bytes held by the model, reported to memory observers.
    fn memory_usage(&self) -> usize {
        0
    }
}

impl ForestModel for Forest {
    #[inline]
    fn predict_row<F: DataFrame + ?Sized>(&self, frame: &F, row: usize) -> f64 {
        Forest::predict_row(self, frame, row)
    }

    #[inline]
    fn n_trees(&self) -> usize {
        Forest::n_trees(self)
    }

    fn memory_usage(&self) -> usize {
        Forest::memory_usage(self)
    }
}

/// Trains a boosted forest for one hyperparameter set.
///
/// Treated by the orchestrator as expensive and free of side effects beyond
/// its result and progress reports. Must be deterministic for a fixed
/// request.
pub trait TreeTrainer: Send + Sync {
    type Model: ForestModel;

    /// Loss the trainer minimises.
    fn loss(&self) -> Loss;

    fn train_forest<F: DataFrame>(
        &self,
        frame: &F,
        context: &TrainingContext,
        request: TrainRequest<'_>,
    ) -> Result<TrainedForest<Self::Model>, TrainError>;
}

// =============================================================================
// ForestTrainer
// =============================================================================

/// Exact greedy gradient-boosted regression trees.
///
/// Each tree fits the loss's gradient and curvature at the current
/// predictions. A split on a node at depth `d` is kept when
///
/// ```text
/// 0.5·(G_L²/(H_L+λ) + G_R²/(H_R+λ) − G²/(H+λ)) − γ − α·exp((d/limit − 1)/tol) > 0
/// ```
///
/// and leaves take the value `−η·G/(H+λ)`. Missing values go to whichever
/// side gives the larger gain. Boosting stops early when a tree finds no
/// split.
///
/// Split candidates depend on the [`FeatureKind`]: every cut between sorted
/// values for continuous features, `< 0.5` for one-hot indicators, and one
/// category against the rest for categorical codes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForestTrainer {
    loss: Loss,
}

impl ForestTrainer {
    pub fn new(loss: Loss) -> Self {
        Self { loss }
    }
}

#[derive(Clone, Copy, Debug)]
struct Split {
    condition: SplitCondition,
    gain: f64,
    /// `(gradient, curvature)` sums routed to each side, missing rows included.
    left: (f64, f64),
    right: (f64, f64),
}

/// A candidate partition of the present rows, scored with the missing rows
/// on their better side.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    gain: f64,
    default_left: bool,
    left: (f64, f64),
    right: (f64, f64),
}

/// Gradient statistics of the node being split.
struct NodeScorer {
    lambda: f64,
    penalty: f64,
    parent: f64,
    present: (f64, f64),
    missing: (f64, f64),
}

impl NodeScorer {
    /// Score sending `left` of the present statistics left and the rest right.
    fn score(&self, left: (f64, f64)) -> Candidate {
        let (left_g, left_h) = left;
        let (right_g, right_h) = (self.present.0 - left_g, self.present.1 - left_h);
        let (missing_g, missing_h) = self.missing;
        let lambda = self.lambda;

        let missing_left = 0.5
            * (score(left_g + missing_g, left_h + missing_h, lambda) + score(right_g, right_h, lambda)
                - self.parent)
            - self.penalty;
        let missing_right = 0.5
            * (score(left_g, left_h, lambda) + score(right_g + missing_g, right_h + missing_h, lambda)
                - self.parent)
            - self.penalty;
        let default_left = missing_left >= missing_right;
        let (left, right) = if default_left {
            ((left_g + missing_g, left_h + missing_h), (right_g, right_h))
        } else {
            ((left_g, left_h), (right_g + missing_g, right_h + missing_h))
        };
        Candidate {
            gain: missing_left.max(missing_right),
            default_left,
            left,
            right,
        }
    }
}

/// Keep `candidate` if it beats the current best with positive gain.
fn consider(best: &mut Option<Split>, column: usize, rule: SplitRule, threshold: f32, candidate: Candidate) {
    if candidate.gain > 0.0 && best.map_or(true, |b| candidate.gain > b.gain) {
        *best = Some(Split {
            condition: SplitCondition {
                column,
                rule,
                threshold,
                default_left: candidate.default_left,
            },
            gain: candidate.gain,
            left: candidate.left,
            right: candidate.right,
        });
    }
}

struct NodeTask {
    node: NodeId,
    depth: usize,
    rows: Vec<usize>,
}

#[inline]
fn score(gradient: f64, curvature: f64, lambda: f64) -> f64 {
    let denominator = curvature + lambda;
    if denominator > 0.0 {
        gradient * gradient / denominator
    } else {
        0.0
    }
}

#[inline]
fn leaf_weight(gradient: f64, curvature: f64, hyperparameters: &Hyperparameters) -> f64 {
    let denominator = curvature + hyperparameters.leaf_weight_penalty_multiplier;
    if denominator > 0.0 {
        -hyperparameters.eta * gradient / denominator
    } else {
        0.0
    }
}

impl ForestTrainer {
    /// Grow one tree over the training rows listed in `rows` and return it
    /// with the leaf each row landed in.
    #[allow(clippy::too_many_arguments)]
    fn grow_tree<F: DataFrame>(
        &self,
        frame: &F,
        rows: &[usize],
        gradients: &[f64],
        curvatures: &[f64],
        features: &[(usize, FeatureKind)],
        hyperparameters: &Hyperparameters,
    ) -> (Tree, Vec<NodeId>) {
        let total_g: f64 = gradients.iter().sum();
        let total_h: f64 = curvatures.iter().sum();
        let mut tree = Tree::leaf(leaf_weight(total_g, total_h, hyperparameters), total_h);
        let mut leaf_of_row: Vec<NodeId> = vec![0; rows.len()];
        let hard_depth_limit = hyperparameters.hard_depth_limit();

        let mut stack = vec![NodeTask {
            node: 0,
            depth: 0,
            rows: (0..rows.len()).collect(),
        }];

        while let Some(task) = stack.pop() {
            if task.depth >= hard_depth_limit || task.rows.len() < 2 {
                continue;
            }
            let Some(split) = best_split(
                frame,
                rows,
                &task.rows,
                gradients,
                curvatures,
                features,
                task.depth,
                hyperparameters,
            ) else {
                continue;
            };

            let condition = split.condition;
            let (left, right) = tree.split(
                task.node,
                condition,
                split.gain,
                (leaf_weight(split.left.0, split.left.1, hyperparameters), split.left.1),
                (leaf_weight(split.right.0, split.right.1, hyperparameters), split.right.1),
            );

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                task.rows.into_iter().partition(|&position| {
                    condition.goes_left(frame.value(rows[position], condition.column))
                });
            for &position in &left_rows {
                leaf_of_row[position] = left;
            }
            for &position in &right_rows {
                leaf_of_row[position] = right;
            }

            stack.push(NodeTask {
                node: right,
                depth: task.depth + 1,
                rows: right_rows,
            });
            stack.push(NodeTask {
                node: left,
                depth: task.depth + 1,
                rows: left_rows,
            });
        }

        (tree, leaf_of_row)
    }
}

/// Best penalised split of the rows at `positions`, if any has positive gain.
#[allow(clippy::too_many_arguments)]
fn best_split<F: DataFrame>(
    frame: &F,
    rows: &[usize],
    positions: &[usize],
    gradients: &[f64],
    curvatures: &[f64],
    features: &[(usize, FeatureKind)],
    depth: usize,
    hyperparameters: &Hyperparameters,
) -> Option<Split> {
    let lambda = hyperparameters.leaf_weight_penalty_multiplier;
    let penalty = hyperparameters.tree_size_penalty_multiplier + hyperparameters.depth_penalty(depth);
    let node_g: f64 = positions.iter().map(|&p| gradients[p]).sum();
    let node_h: f64 = positions.iter().map(|&p| curvatures[p]).sum();
    let parent = score(node_g, node_h, lambda);

    let mut best: Option<Split> = None;
    let mut present: Vec<(f32, f64, f64)> = Vec::with_capacity(positions.len());

    for &(column, kind) in features {
        present.clear();
        let (mut missing_g, mut missing_h) = (0.0, 0.0);
        for &p in positions {
            let value = frame.value(rows[p], column);
            if value.is_nan() {
                missing_g += gradients[p];
                missing_h += curvatures[p];
            } else {
                present.push((value, gradients[p], curvatures[p]));
            }
        }
        if present.len() < 2 {
            continue;
        }
        let scorer = NodeScorer {
            lambda,
            penalty,
            parent,
            present: (node_g - missing_g, node_h - missing_h),
            missing: (missing_g, missing_h),
        };

        match kind {
            FeatureKind::Continuous => best_threshold(&mut present, &scorer, column, &mut best),
            FeatureKind::OneHotIndicator => {
                let (mut zero_g, mut zero_h, mut n_zero) = (0.0, 0.0, 0);
                for &(value, g, h) in &present {
                    if value < 0.5 {
                        zero_g += g;
                        zero_h += h;
                        n_zero += 1;
                    }
                }
                if n_zero > 0 && n_zero < present.len() {
                    consider(&mut best, column, SplitRule::LessThan, 0.5, scorer.score((zero_g, zero_h)));
                }
            }
            FeatureKind::Categorical => best_category(&mut present, &scorer, column, &mut best),
        }
    }
    best
}

/// Every cut between consecutive distinct values.
fn best_threshold(
    present: &mut [(f32, f64, f64)],
    scorer: &NodeScorer,
    column: usize,
    best: &mut Option<Split>,
) {
    present.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (mut left_g, mut left_h) = (0.0, 0.0);
    for i in 0..present.len() - 1 {
        left_g += present[i].1;
        left_h += present[i].2;
        let (lower, upper) = (present[i].0, present[i + 1].0);
        if lower == upper {
            continue;
        }
        let midpoint = lower + (upper - lower) * 0.5;
        let threshold = if midpoint > lower { midpoint } else { upper };
        consider(best, column, SplitRule::LessThan, threshold, scorer.score((left_g, left_h)));
    }
}

/// Each category code against all the others.
fn best_category(
    present: &mut [(f32, f64, f64)],
    scorer: &NodeScorer,
    column: usize,
    best: &mut Option<Split>,
) {
    present.sort_by(|a, b| a.0.total_cmp(&b.0));
    if present[0].0 == present[present.len() - 1].0 {
        return;
    }
    let mut start = 0;
    while start < present.len() {
        let code = present[start].0;
        let (mut code_g, mut code_h) = (0.0, 0.0);
        let mut end = start;
        while end < present.len() && present[end].0 == code {
            code_g += present[end].1;
            code_h += present[end].2;
            end += 1;
        }
        consider(best, column, SplitRule::Equals, code, scorer.score((code_g, code_h)));
        start = end;
    }
}

impl TreeTrainer for ForestTrainer {
    type Model = Forest;

    fn loss(&self) -> Loss {
        self.loss
    }

    fn train_forest<F: DataFrame>(
        &self,
        frame: &F,
        context: &TrainingContext,
        request: TrainRequest<'_>,
    ) -> Result<TrainedForest<Forest>, TrainError> {
        if request.train_rows.len() != frame.n_rows() {
            return Err(TrainError::MaskLengthMismatch {
                mask: request.train_rows.len(),
                frame: frame.n_rows(),
            });
        }
        if context.feature_columns.is_empty() {
            return Err(TrainError::NoFeatures);
        }
        let rows: Vec<usize> = request.train_rows.iter_ones().collect();
        if rows.is_empty() {
            return Err(TrainError::EmptyTrainingSet);
        }

        let hyperparameters = request.hyperparameters;
        let dependent = context.dependent_variable;
        let targets: Vec<f64> = rows.iter().map(|&r| frame.value(r, dependent) as f64).collect();
        let base_score = self.loss.base_score(&targets);
        let mut forest = Forest::new(base_score);
        let mut predictions = vec![base_score; rows.len()];
        let mut gradients = vec![0.0; rows.len()];
        let mut curvatures = vec![0.0; rows.len()];
        let maximum_trees = hyperparameters.maximum_number_trees;

        for index in 0..maximum_trees {
            for (i, (&prediction, &target)) in predictions.iter().zip(&targets).enumerate() {
                gradients[i] = self.loss.gradient(prediction, target);
                curvatures[i] = self.loss.curvature(prediction, target);
            }

            let mut rng = seeded_rng(derive_seed(request.seed, index as u64));
            let features: Vec<(usize, FeatureKind)> = context
                .sample_distribution
                .sample(hyperparameters.feature_bag_fraction, &mut rng)
                .into_iter()
                .map(|feature| (context.feature_columns[feature], context.feature_kind(feature)))
                .collect();

            let (tree, leaf_of_row) =
                self.grow_tree(frame, &rows, &gradients, &curvatures, &features, hyperparameters);
            request.progress.add(1);

            if tree.n_splits() == 0 {
                request.progress.add((maximum_trees - index - 1) as u64);
                break;
            }
            for (prediction, &leaf) in predictions.iter_mut().zip(&leaf_of_row) {
                *prediction += tree.leaf_value(leaf);
            }
            forest.trees.push(tree);
        }

        let test_loss = if request.test_rows.count() == 0 {
            predictions
                .iter()
                .zip(&targets)
                .map(|(&p, &y)| self.loss.value(p, y))
                .sum::<f64>()
                / rows.len() as f64
        } else {
            let (sum, n) = request
                .test_rows
                .iter_ones()
                .fold((0.0, 0usize), |(sum, n), row| {
                    let prediction = forest.predict_row(frame, row);
                    let target = frame.value(row, dependent) as f64;
                    (sum + self.loss.value(prediction, target), n + 1)
                });
            sum / n as f64
        };
        if !test_loss.is_finite() {
            return Err(TrainError::NonFiniteLoss(test_loss));
        }

        Ok(TrainedForest {
            test_loss,
            n_trees: forest.n_trees(),
            split_gain: forest.trees.iter().map(Tree::split_gain).sum(),
            split_curvature: forest.trees.iter().map(Tree::split_curvature).sum(),
            n_splits: forest.trees.iter().map(Tree::n_splits).sum(),
            model: forest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnFrame, ColumnMeta};
    use crate::features::{determine_feature_data_types, select_features_and_encode_categories};
    use crate::mask::MissingFeatureMasks;
    use crate::utils::Parallelism;

    fn step_frame(n: usize) -> (ColumnFrame, TrainingContext) {
        let x: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let noise: Vec<f32> = (0..n).map(|i| ((i * 37) % 11) as f32).collect();
        let y: Vec<f32> = (0..n).map(|i| if i < n / 2 { 1.0 } else { 5.0 }).collect();
        let mut frame = ColumnFrame::from_columns([
            (ColumnMeta::numeric("y"), y),
            (ColumnMeta::numeric("x"), x),
            (ColumnMeta::numeric("noise"), noise),
        ])
        .unwrap();
        let mut missing = MissingFeatureMasks::compute(&frame, Parallelism::Sequential);
        let eligible = missing.eligible_rows(0);
        let encoding = select_features_and_encode_categories(
            &mut frame,
            0,
            &eligible,
            &mut missing,
            0.05,
            Parallelism::Sequential,
        )
        .unwrap();
        let context = TrainingContext {
            dependent_variable: 0,
            feature_columns: encoding.feature_columns(),
            feature_types: determine_feature_data_types(&frame, &encoding, &eligible, Parallelism::Sequential),
            sample_distribution: FeatureSampleDistribution::initialize(&encoding).unwrap(),
        };
        (frame, context)
    }

    fn hyperparameters(trees: usize) -> Hyperparameters {
        Hyperparameters {
            eta: 1.0,
            maximum_number_trees: trees,
            feature_bag_fraction: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn fits_a_step_in_one_split() {
        let (frame, context) = step_frame(100);
        let rows = RowMask::full(100);
        let progress = TrainingProgress::detached(1);
        let trained = ForestTrainer::new(Loss::SquaredError)
            .train_forest(
                &frame,
                &context,
                TrainRequest {
                    train_rows: &rows,
                    test_rows: &RowMask::new(100),
                    hyperparameters: &hyperparameters(1),
                    seed: 0,
                    progress: &progress,
                },
            )
            .unwrap();

        assert_eq!(trained.n_trees, 1);
        let tree = &trained.model.trees[0];
        assert!(tree.validate().is_ok());
        assert_eq!(frame.value(0, 0), 1.0);
        assert!((trained.model.predict_row(&frame, 0) - 1.0).abs() < 1e-9);
        assert!((trained.model.predict_row(&frame, 99) - 5.0).abs() < 1e-9);
        assert!(trained.test_loss < 1e-12);
        // The first split separates the halves: gain = 0.5 * (n * var) = 0.5 * 100 * 4.
        assert!((tree.split_gain() - 200.0).abs() < 1e-6);
        assert_eq!(progress.completed(), 1);
    }

    /// Codes 0, 1 and 2 in turn; only code 1 has a high target.
    fn middle_category_frame(n: usize) -> ColumnFrame {
        let code: Vec<f32> = (0..n).map(|i| (i % 3) as f32).collect();
        let y: Vec<f32> = code.iter().map(|&c| if c == 1.0 { 10.0 } else { 0.0 }).collect();
        ColumnFrame::from_columns([(ColumnMeta::numeric("y"), y), (ColumnMeta::categorical("code"), code)])
            .unwrap()
    }

    fn root_split(frame: &ColumnFrame, kind: FeatureKind) -> Split {
        let n = frame.n_rows();
        let rows: Vec<usize> = (0..n).collect();
        let loss = Loss::SquaredError;
        let gradients: Vec<f64> = rows.iter().map(|&r| loss.gradient(0.0, frame.value(r, 0) as f64)).collect();
        let curvatures: Vec<f64> = rows.iter().map(|&r| loss.curvature(0.0, frame.value(r, 0) as f64)).collect();
        best_split(frame, &rows, &rows, &gradients, &curvatures, &[(1, kind)], 0, &hyperparameters(1)).unwrap()
    }

    #[test]
    fn categorical_split_isolates_one_category() {
        let frame = middle_category_frame(90);

        let categorical = root_split(&frame, FeatureKind::Categorical);
        assert_eq!(categorical.condition.rule, SplitRule::Equals);
        assert_eq!(categorical.condition.threshold, 1.0);
        assert_eq!(categorical.left.1, 30.0);

        let ordinal = root_split(&frame, FeatureKind::Continuous);
        assert_eq!(ordinal.condition.rule, SplitRule::LessThan);
        assert!(categorical.gain > ordinal.gain);

        let context = TrainingContext {
            dependent_variable: 0,
            feature_columns: vec![1],
            feature_types: vec![FeatureDataType {
                kind: FeatureKind::Categorical,
                is_integer: true,
                min: 0.0,
                max: 2.0,
                n_distinct: 3,
            }],
            sample_distribution: FeatureSampleDistribution::uniform(1).unwrap(),
        };
        let rows = RowMask::full(90);
        let progress = TrainingProgress::detached(1);
        let trained = ForestTrainer::new(Loss::SquaredError)
            .train_forest(
                &frame,
                &context,
                TrainRequest {
                    train_rows: &rows,
                    test_rows: &RowMask::new(90),
                    hyperparameters: &Hyperparameters {
                        tree_size_penalty_multiplier: 1e-6,
                        ..hyperparameters(1)
                    },
                    seed: 0,
                    progress: &progress,
                },
            )
            .unwrap();
        let tree = &trained.model.trees[0];
        assert_eq!(tree.n_splits(), 1);
        assert_eq!(tree.condition(0).map(|c| c.rule), Some(SplitRule::Equals));
        assert!(trained.test_loss < 1e-12);
    }

    #[test]
    fn indicator_split_uses_half_threshold() {
        let n = 40;
        let flag: Vec<f32> = (0..n).map(|i| (i % 2) as f32).collect();
        let y: Vec<f32> = flag.iter().map(|&f| 3.0 * f).collect();
        let frame =
            ColumnFrame::from_columns([(ColumnMeta::numeric("y"), y), (ColumnMeta::numeric("flag"), flag)]).unwrap();
        let split = root_split(&frame, FeatureKind::OneHotIndicator);
        assert_eq!(split.condition.rule, SplitRule::LessThan);
        assert_eq!(split.condition.threshold, 0.5);
        assert_eq!(split.left.1, 20.0);
    }

    #[test]
    fn stops_early_without_splits_and_accounts_progress() {
        let (frame, context) = step_frame(100);
        let rows = RowMask::full(100);
        let progress = TrainingProgress::detached(10);
        let trained = ForestTrainer::new(Loss::SquaredError)
            .train_forest(
                &frame,
                &context,
                TrainRequest {
                    train_rows: &rows,
                    test_rows: &RowMask::new(100),
                    hyperparameters: &hyperparameters(10),
                    seed: 0,
                    progress: &progress,
                },
            )
            .unwrap();

        assert!(trained.n_trees < 10);
        assert_eq!(progress.completed(), 10);
    }

    #[test]
    fn tree_size_penalty_blocks_splits() {
        let (frame, context) = step_frame(100);
        let rows = RowMask::full(100);
        let progress = TrainingProgress::detached(1);
        let request_hyperparameters = Hyperparameters {
            tree_size_penalty_multiplier: 1e6,
            ..hyperparameters(1)
        };
        let trained = ForestTrainer::new(Loss::SquaredError)
            .train_forest(
                &frame,
                &context,
                TrainRequest {
                    train_rows: &rows,
                    test_rows: &RowMask::new(100),
                    hyperparameters: &request_hyperparameters,
                    seed: 0,
                    progress: &progress,
                },
            )
            .unwrap();
        assert_eq!(trained.n_trees, 0);
        assert_eq!(trained.n_splits, 0);
    }

    #[test]
    fn rejects_empty_training_set() {
        let (frame, context) = step_frame(20);
        let progress = TrainingProgress::detached(1);
        let err = ForestTrainer::default()
            .train_forest(
                &frame,
                &context,
                TrainRequest {
                    train_rows: &RowMask::new(20),
                    test_rows: &RowMask::new(20),
                    hyperparameters: &hyperparameters(1),
                    seed: 0,
                    progress: &progress,
                },
            )
            .unwrap_err();
        assert_eq!(err, TrainError::EmptyTrainingSet);
    }

    #[test]
    fn logistic_loss_trains() {
        let n = 200;
        let x: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let y: Vec<f32> = (0..n).map(|i| if i % 10 < 7 && i > 60 { 1.0 } else { 0.0 }).collect();
        let frame = ColumnFrame::from_columns([
            (ColumnMeta::numeric("y"), y),
            (ColumnMeta::numeric("x"), x),
        ])
        .unwrap();
        let context = TrainingContext {
            dependent_variable: 0,
            feature_columns: vec![1],
            feature_types: Vec::new(),
            sample_distribution: FeatureSampleDistribution::uniform(1).unwrap(),
        };
        let rows = RowMask::full(n);
        let progress = TrainingProgress::detached(5);
        let trained = ForestTrainer::new(Loss::BinomialLogistic)
            .train_forest(
                &frame,
                &context,
                TrainRequest {
                    train_rows: &rows,
                    test_rows: &RowMask::new(n),
                    hyperparameters: &Hyperparameters {
                        eta: 0.3,
                        ..hyperparameters(5)
                    },
                    seed: 1,
                    progress: &progress,
                },
            )
            .unwrap();
        let p = frame.column(0).iter().map(|&t| t as f64).sum::<f64>() / n as f64;
        let base_loss = -(p * p.ln() + (1.0 - p) * (1.0 - p).ln());
        assert!(trained.test_loss < base_loss);
    }
}
