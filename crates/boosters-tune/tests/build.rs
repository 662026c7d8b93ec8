//! End-to-end builds through the factory.

mod common;

use boosters_tune::features::select_features_and_encode_categories;
use boosters_tune::mask::MissingFeatureMasks;
use boosters_tune::tuning::{Hyperparameter, MINIMUM_ETA};
use boosters_tune::{
    BoostedTreeFactory, BuildError, ColumnFrame, ColumnMeta, ConfigError, DataError, DataFrame,
    Loss, Parallelism, TrainError,
};
use common::{
    classification_frame, eligible_rows, fix_regularizers, regression_frame, Recorder,
    FREQUENT_CATEGORIES, TARGET,
};
use proptest::prelude::*;

#[test]
fn regression_build_and_train() {
    let n_rows = 1_000;
    let mut frame = regression_frame(n_rows, 7);
    let recorder = Recorder::default();
    let mut factory = BoostedTreeFactory::construct_from_parameters(2, Loss::SquaredError);
    fix_regularizers(&mut factory)
        .maximum_number_trees(10)
        .maximum_optimisation_rounds_per_hyperparameter(1);
    recorder.attach(&mut factory);

    let mut tree = factory.build_for(&mut frame, TARGET).unwrap();

    assert_eq!(factory.number_extra_columns_for_train(), FREQUENT_CATEGORIES);
    assert_eq!(frame.n_columns(), 4 + FREQUENT_CATEGORIES);
    assert_eq!(tree.eligible_rows().count(), eligible_rows(n_rows));
    assert_eq!(tree.context().n_features(), 2 + FREQUENT_CATEGORIES);
    assert_eq!(tree.number_folds(), 4);
    assert_eq!(tree.number_rounds(), 4);
    assert!(recorder.memory() > 0);
    assert!(tree.model().is_none());

    tree.train(&frame).unwrap();

    assert_eq!(tree.rounds_completed(), 4);
    assert_eq!(recorder.states().len(), 4);
    assert!(tree.best_loss().is_some_and(f64::is_finite));

    let predictions = tree.predict(&frame).unwrap();
    let targets: Vec<f64> = tree
        .eligible_rows()
        .iter_ones()
        .map(|row| frame.value(row, TARGET) as f64)
        .collect();
    let mean = targets.iter().sum::<f64>() / targets.len() as f64;
    let variance = targets.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / targets.len() as f64;
    let mse = tree
        .eligible_rows()
        .iter_ones()
        .zip(&targets)
        .map(|(row, y)| (predictions[row] - y).powi(2))
        .sum::<f64>()
        / targets.len() as f64;
    assert!(mse < variance, "mse {mse} variance {variance}");
}

#[test]
fn ten_thousand_rows_three_categories() {
    let n_rows = 10_000;
    let colour: Vec<f32> = (0..n_rows)
        .map(|row| match row % 10 {
            0..=5 => 0.0,
            6..=8 => 1.0,
            _ => 2.0,
        })
        .collect();
    let y: Vec<f32> = colour
        .iter()
        .enumerate()
        .map(|(row, &c)| 3.0 * c + ((row * 31) % 17) as f32 * 0.05)
        .collect();
    let mut frame = ColumnFrame::from_columns([
        (ColumnMeta::categorical("colour"), colour),
        (ColumnMeta::numeric("y"), y),
    ])
    .unwrap();

    let mut factory = BoostedTreeFactory::construct_from_parameters(1, Loss::SquaredError);
    fix_regularizers(&mut factory)
        .minimum_frequency_to_one_hot_encode(0.2)
        .number_folds(5)
        .rows_per_feature(50)
        .maximum_number_trees(3);
    assert_eq!(factory.number_extra_columns_for_train(), 5);

    let tree = factory.build_for(&mut frame, 1).unwrap();

    assert_eq!(factory.number_extra_columns_for_train(), 2);
    assert_eq!(frame.n_columns(), 4);
    assert_eq!(frame.column_meta(2).name, "colour=0");
    assert_eq!(frame.column_meta(3).name, "colour=1");
    assert_eq!(tree.feature_columns(), &[2, 3]);
    assert_eq!(tree.number_folds(), 5);
    assert!(tree.eligible_rows().count() * 4 / 5 >= 2 * 50);
}

#[test]
fn several_categorical_columns_fit_the_extra_column_bound() {
    let n_rows = 1_000;
    let mut columns: Vec<(ColumnMeta, Vec<f32>)> = (0..4)
        .map(|bit| {
            let codes = (0..n_rows).map(|row| ((row >> bit) & 1) as f32).collect();
            (ColumnMeta::categorical(format!("flag{bit}")), codes)
        })
        .collect();
    let y = (0..n_rows)
        .map(|row: usize| (row & 0b1111).count_ones() as f32 + ((row * 31) % 17) as f32 * 0.05)
        .collect();
    columns.push((ColumnMeta::numeric("y"), y));
    let mut frame = ColumnFrame::from_columns(columns).unwrap();

    let mut factory = BoostedTreeFactory::construct_from_parameters(1, Loss::SquaredError);
    fix_regularizers(&mut factory)
        .minimum_frequency_to_one_hot_encode(0.4)
        .maximum_number_trees(2);
    let per_column = factory.number_extra_columns_for_train();
    assert_eq!(per_column, 2);
    let estimate = factory.memory_estimate(n_rows, 5);

    factory.build_for(&mut frame, 4).unwrap();

    let extra = factory.number_extra_columns_for_train();
    assert_eq!(extra, 8);
    assert!(extra <= 4 * per_column);
    assert_eq!(frame.n_columns(), 5 + extra);
    assert!(estimate.extra_columns >= extra * n_rows * std::mem::size_of::<f32>());
}

#[test]
fn predicting_needs_the_encoded_columns() {
    let n_rows = 600;
    let mut frame = regression_frame(n_rows, 4);
    let mut factory = BoostedTreeFactory::construct_from_parameters(1, Loss::SquaredError);
    fix_regularizers(&mut factory)
        .maximum_number_trees(3)
        .maximum_optimisation_rounds_per_hyperparameter(0);
    let mut tree = factory.build_for(&mut frame, TARGET).unwrap();
    assert_eq!(tree.predict(&frame), Err(TrainError::NotTrained));
    tree.train(&frame).unwrap();

    let original = regression_frame(n_rows, 4);
    assert_eq!(
        tree.predict(&original),
        Err(TrainError::MissingFeatureColumns {
            required: 3 + FREQUENT_CATEGORIES,
            available: 4,
        })
    );
    assert_eq!(tree.predict(&frame).unwrap().len(), n_rows);
}

#[test]
fn classification_predicts_probabilities() {
    let mut frame = classification_frame(600, 3);
    let mut factory = BoostedTreeFactory::construct_from_parameters(1, Loss::BinomialLogistic);
    fix_regularizers(&mut factory)
        .eta(0.3)
        .maximum_number_trees(20)
        .maximum_optimisation_rounds_per_hyperparameter(0);

    let mut tree = factory.build_for(&mut frame, 2).unwrap();
    tree.train(&frame).unwrap();
    let probabilities = tree.predict(&frame).unwrap();

    assert!(probabilities.iter().all(|&p| p > 0.0 && p < 1.0));
    let (mut positive, mut negative) = ((0.0, 0), (0.0, 0));
    for (row, &p) in probabilities.iter().enumerate() {
        if frame.value(row, 2) == 1.0 {
            positive = (positive.0 + p, positive.1 + 1);
        } else {
            negative = (negative.0 + p, negative.1 + 1);
        }
    }
    assert!(positive.0 / positive.1 as f64 > negative.0 / negative.1 as f64);
}

#[test]
fn unset_regularizers_are_line_searched() {
    let mut frame = regression_frame(600, 11);
    let recorder = Recorder::default();
    let mut factory = BoostedTreeFactory::construct_from_parameters(1, Loss::SquaredError);
    factory
        .maximum_number_trees(3)
        .maximum_optimisation_rounds_per_hyperparameter(0);
    recorder.attach(&mut factory);

    let mut tree = factory.build_for(&mut frame, TARGET).unwrap();
    for hyperparameter in Hyperparameter::REGULARIZERS {
        assert!(tree.search_space().interval(hyperparameter).is_some());
    }
    assert_eq!(tree.search_space().len(), 7);

    let hyperparameters = tree.hyperparameters();
    for hyperparameter in Hyperparameter::REGULARIZERS {
        let value = hyperparameter.get(&hyperparameters);
        assert!(value.is_finite() && value >= 0.0, "{}: {value}", hyperparameter.name());
    }

    tree.train(&frame).unwrap();
    assert_eq!(tree.progress().completed(), tree.progress().total());
    assert_eq!(recorder.progress().last().copied(), Some(1.0));
}

#[test]
fn progress_is_monotone_and_finishes() {
    let mut frame = regression_frame(800, 5);
    let recorder = Recorder::default();
    let mut factory = BoostedTreeFactory::construct_from_parameters(2, Loss::SquaredError);
    fix_regularizers(&mut factory)
        .maximum_number_trees(5)
        .maximum_optimisation_rounds_per_hyperparameter(1);
    recorder.attach(&mut factory);

    let mut tree = factory.build_for(&mut frame, TARGET).unwrap();
    tree.train(&frame).unwrap();

    let progress = recorder.progress();
    assert_eq!(progress.first().copied(), Some(0.0));
    assert_eq!(progress.last().copied(), Some(1.0));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn memory_is_released_on_drop() {
    let mut frame = regression_frame(800, 9);
    let recorder = Recorder::default();
    let mut factory = BoostedTreeFactory::construct_from_parameters(1, Loss::SquaredError);
    fix_regularizers(&mut factory)
        .maximum_number_trees(5)
        .maximum_optimisation_rounds_per_hyperparameter(1);
    recorder.attach(&mut factory);

    let estimate = factory.estimate_memory_usage(frame.n_rows(), frame.n_columns());
    let mut tree = factory.build_for(&mut frame, TARGET).unwrap();
    let after_build = recorder.memory();
    assert!(after_build > 0);

    tree.train(&frame).unwrap();
    let after_train = recorder.memory();
    assert!(after_train > after_build);
    assert!((after_train as usize) <= estimate, "reported {after_train} estimate {estimate}");

    drop(tree);
    assert_eq!(recorder.memory(), 0);
}

#[test]
fn eta_lower_bound() {
    let mut frame = regression_frame(600, 1);
    let mut factory = BoostedTreeFactory::construct_from_parameters(1, Loss::SquaredError);
    fix_regularizers(&mut factory)
        .maximum_number_trees(2)
        .maximum_optimisation_rounds_per_hyperparameter(0)
        .eta(MINIMUM_ETA);
    let tree = factory.build_for(&mut frame, TARGET).unwrap();
    assert_eq!(tree.hyperparameters().eta, MINIMUM_ETA);

    let mut frame = regression_frame(600, 1);
    factory.eta(MINIMUM_ETA * 0.999);
    let error = factory.build_for(&mut frame, TARGET).unwrap_err();
    assert!(matches!(error, BuildError::Config(ConfigError::InvalidEta { .. })), "{error:?}");
    assert_eq!(frame.n_columns(), 4);
}

#[test]
fn no_eligible_rows() {
    let n = 200;
    let mut frame = ColumnFrame::from_columns([
        (ColumnMeta::numeric("x"), (0..n).map(|i| i as f32).collect()),
        (ColumnMeta::numeric("y"), vec![f32::NAN; n]),
    ])
    .unwrap();
    let mut factory = BoostedTreeFactory::construct_from_parameters(1, Loss::SquaredError);
    assert!(matches!(
        factory.build_for(&mut frame, 1),
        Err(BuildError::Data(DataError::NoEligibleRows))
    ));
}

#[test]
fn no_usable_features() {
    let n = 200;
    let mut frame = ColumnFrame::from_columns([
        (ColumnMeta::numeric("constant"), vec![1.0; n]),
        (ColumnMeta::numeric("y"), (0..n).map(|i| (i % 7) as f32).collect()),
    ])
    .unwrap();
    let mut factory = BoostedTreeFactory::construct_from_parameters(1, Loss::SquaredError);
    assert!(matches!(
        factory.build_for(&mut frame, 1),
        Err(BuildError::Data(DataError::NoUsableFeatures))
    ));
}

#[test]
fn too_few_rows_for_folds() {
    let mut frame = regression_frame(120, 2);
    let mut factory = BoostedTreeFactory::construct_from_parameters(1, Loss::SquaredError);
    assert!(matches!(
        factory.build_for(&mut frame, TARGET),
        Err(BuildError::Data(DataError::InsufficientRows { .. }))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn one_hot_columns_match_frequency_threshold(
        codes in prop::collection::vec(0u32..8, 50..300),
        minimum_frequency in 0.01f64..0.5,
    ) {
        let n = codes.len();
        let mut frame = ColumnFrame::from_columns([
            (ColumnMeta::categorical("code"), codes.iter().map(|&c| c as f32).collect()),
            (ColumnMeta::numeric("y"), (0..n).map(|i| (i % 5) as f32).collect()),
        ])
        .unwrap();
        let mut counts = [0usize; 8];
        for &code in &codes {
            counts[code as usize] += 1;
        }
        let expected = counts
            .iter()
            .filter(|&&count| count > 0 && count as f64 / n as f64 >= minimum_frequency)
            .count();

        let mut missing = MissingFeatureMasks::compute(&frame, Parallelism::Sequential);
        let eligible = missing.eligible_rows(1);
        let encoding = select_features_and_encode_categories(
            &mut frame,
            1,
            &eligible,
            &mut missing,
            minimum_frequency,
            Parallelism::Sequential,
        )
        .unwrap();

        prop_assert_eq!(encoding.number_extra_columns(), expected);
        prop_assert_eq!(frame.n_columns(), 2 + expected);
        prop_assert!(expected <= (1.0 / minimum_frequency).floor() as usize);
    }
}
