//! Feature selection, categorical encoding, feature typing, and bagging.
//!
//! Run in this order during a build:
//!
//! 1. [`select_features_and_encode_categories`] appends indicator columns
//! 2. [`determine_feature_data_types`] classifies the encoded columns
//! 3. [`FeatureSampleDistribution::initialize`] weights them for bagging

mod data_types;
mod encoder;
mod sampling;

pub use data_types::{determine_feature_data_types, FeatureDataType, FeatureKind};
pub use encoder::{
    select_features_and_encode_categories, DropReason, EncodedFeature, FeatureEncoding,
    FeatureSource,
};
pub use sampling::{FeatureSampleDistribution, FEATURE_WEIGHT_FLOOR};
