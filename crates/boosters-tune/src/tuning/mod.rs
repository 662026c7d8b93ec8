//! Hyperparameter initialisation and search.
//!
//! - [`Hyperparameters`], [`Tunable`], [`Hyperparameter`]: values, options
//!   and searchable dimensions
//! - [`initialize_hyperparameters`], [`initialize_unset_regularization_hyperparameters`]:
//!   data-driven starting values and search intervals
//! - [`estimate_tree_gain_and_curvature`], [`test_loss_line_search`]: scale
//!   and bracket the regularisation multipliers
//! - [`BayesianOptimiser`], [`GaussianProcess`]: sequential search over the
//!   resulting [`SearchSpace`]

mod bayesian;
mod gaussian_process;
mod hyperparameters;
mod initialization;
mod line_search;
mod search_space;

pub use bayesian::{BayesianOptimiser, Observation, LENGTH_SCALE_GRID, SURROGATE_NOISE};
pub use gaussian_process::{expected_improvement, matern52, GaussianProcess};
pub use hyperparameters::{Hyperparameter, Hyperparameters, Tunable, MAXIMUM_NUMBER_TREES, MINIMUM_ETA};
pub use initialization::{
    initial_eta, initial_maximum_number_trees, initialize_hyperparameters,
    initialize_unset_regularization_hyperparameters, line_search_work, number_free_hyperparameters,
    number_hyperparameter_tuning_rounds, MAXIMUM_NUMBER_OPTIMISATION_ROUNDS,
};
pub use line_search::{
    estimate_tree_gain_and_curvature, fit_quadratic, test_loss_line_search, LineSearchRange,
    TreeGainAndCurvature, LINE_SEARCH_RANGE, MAX_LINE_SEARCH_ITERATIONS,
};
pub use search_space::{SearchDimension, SearchInterval, SearchSpace};
