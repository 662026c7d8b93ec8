//! Synthetic frames shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use boosters_tune::{BoostedTreeFactory, ColumnFrame, ColumnMeta};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Column of the dependent variable in [`regression_frame`].
pub const TARGET: usize = 3;

/// Categories 0, 1 and 2 cover about 50%, 30% and 17% of rows; 3, 4 and 5
/// about 1% each.
pub const FREQUENT_CATEGORIES: usize = 3;

const CATEGORY_EFFECT: [f32; 6] = [0.0, 1.0, -1.0, 0.5, 0.5, 0.5];

/// Columns `x0`, `x1`, `colour` (categorical) and `y`.
///
/// Every 50th `x0` and every 97th `y` is missing.
pub fn regression_frame(n_rows: usize, seed: u64) -> ColumnFrame {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut x0 = Vec::with_capacity(n_rows);
    let mut x1 = Vec::with_capacity(n_rows);
    let mut colour = Vec::with_capacity(n_rows);
    let mut y = Vec::with_capacity(n_rows);

    for row in 0..n_rows {
        let a: f32 = rng.gen_range(-1.0..1.0);
        let b: f32 = rng.gen_range(0.0..10.0);
        let u: f64 = rng.gen();
        let category = if u < 0.5 {
            0
        } else if u < 0.8 {
            1
        } else if u < 0.97 {
            2
        } else {
            3 + row % 3
        };
        let noise: f32 = rng.gen_range(-0.1..0.1);

        x0.push(if row % 50 == 49 { f32::NAN } else { a });
        x1.push(b);
        colour.push(category as f32);
        y.push(if row % 97 == 0 {
            f32::NAN
        } else {
            2.0 * a + 0.3 * b + CATEGORY_EFFECT[category] + noise
        });
    }

    ColumnFrame::from_columns([
        (ColumnMeta::numeric("x0"), x0),
        (ColumnMeta::numeric("x1"), x1),
        (ColumnMeta::categorical("colour"), colour),
        (ColumnMeta::numeric("y"), y),
    ])
    .expect("columns have equal length")
}

/// Rows of [`regression_frame`] with a present target.
pub fn eligible_rows(n_rows: usize) -> usize {
    n_rows - (0..n_rows).filter(|row| row % 97 == 0).count()
}

/// Two numeric features and a 0/1 target.
pub fn classification_frame(n_rows: usize, seed: u64) -> ColumnFrame {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut x0 = Vec::with_capacity(n_rows);
    let mut x1 = Vec::with_capacity(n_rows);
    let mut y = Vec::with_capacity(n_rows);
    for _ in 0..n_rows {
        let a: f32 = rng.gen_range(-1.0..1.0);
        let b: f32 = rng.gen_range(-1.0..1.0);
        let noise: f32 = rng.gen_range(-0.2..0.2);
        x0.push(a);
        x1.push(b);
        y.push(if 2.0 * a + 0.5 * b + noise > 0.0 { 1.0 } else { 0.0 });
    }
    ColumnFrame::from_columns([
        (ColumnMeta::numeric("x0"), x0),
        (ColumnMeta::numeric("x1"), x1),
        (ColumnMeta::numeric("y"), y),
    ])
    .expect("columns have equal length")
}

/// Fix the regularisers so builds skip the line searches.
pub fn fix_regularizers(factory: &mut BoostedTreeFactory) -> &mut BoostedTreeFactory {
    factory
        .depth_penalty_multiplier(0.0)
        .tree_size_penalty_multiplier(0.0)
        .leaf_weight_penalty_multiplier(0.0)
}

/// Progress fractions and net memory reported to a factory's callbacks.
#[derive(Clone, Default)]
pub struct Recorder {
    pub progress: Arc<Mutex<Vec<f64>>>,
    pub memory: Arc<AtomicI64>,
    pub states: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn attach(&self, factory: &mut BoostedTreeFactory) {
        let progress = Arc::clone(&self.progress);
        let memory = Arc::clone(&self.memory);
        let states = Arc::clone(&self.states);
        factory
            .progress_callback(move |fraction| progress.lock().unwrap().push(fraction))
            .memory_usage_callback(move |delta| {
                memory.fetch_add(delta, Ordering::SeqCst);
            })
            .training_state_callback(move |persist| {
                let mut bytes: Vec<u8> = Vec::new();
                persist(&mut bytes as &mut dyn std::io::Write).expect("write state");
                states.lock().unwrap().push(String::from_utf8(bytes).expect("utf-8 json"));
            });
    }

    pub fn progress(&self) -> Vec<f64> {
        self.progress.lock().unwrap().clone()
    }

    pub fn memory(&self) -> i64 {
        self.memory.load(Ordering::SeqCst)
    }

    pub fn states(&self) -> Vec<String> {
        self.states.lock().unwrap().clone()
    }
}
