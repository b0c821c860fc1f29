//! Error taxonomy for the estimator adapter

use crate::estimator::EstimatorFamily;
use thiserror::Error;

/// Errors surfaced by the adapter. All of these propagate to the
/// immediate caller; nothing is retried or swallowed internally.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Predict was attempted with no persisted trained state.
    #[error("model must be trained before prediction")]
    ModelNotTrained,

    /// Multi-output wrapping was requested for an estimator family that
    /// supports neither regression nor classification.
    #[error("{family} estimators do not support multi-output prediction")]
    NoMultiOutputSupport { family: EstimatorFamily },

    /// The unsupervised adapter was asked to predict with a
    /// non-clusterer estimator.
    #[error("estimator is not a clusterer: {family}")]
    UnsupportedEstimatorFamily { family: EstimatorFamily },

    /// A transductive clusterer was asked for more labels than it
    /// produced during training.
    #[error(
        "transductive clusterer labels exhausted: {available} rows were \
         clustered during training, record {requested} has no label"
    )]
    ClusterLabelsExhausted { available: usize, requested: usize },

    /// No estimator variant is registered under the given name.
    #[error("no estimator registered under {name:?}")]
    UnknownEstimator { name: String },

    /// A record did not carry a feature the adapter needs.
    #[error("record {key:?} has no feature {feature:?}")]
    MissingFeature { key: String, feature: String },

    /// A feature value has no numeric flattening (e.g. text used as a
    /// model input).
    #[error("feature {feature:?} has no numeric representation")]
    NonNumericFeature { feature: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid hyperparameter {key:?}: {reason}")]
    InvalidHyperparameter { key: String, reason: String },

    /// No records matched the configured features during training.
    #[error("no training records matched the configured features")]
    EmptyTrainingSet,

    /// A persisted artifact exists but cannot be interpreted.
    #[error("corrupt persisted state: {0}")]
    CorruptState(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Failure reported by a pluggable estimator implementation.
    #[error(transparent)]
    Estimator(#[from] anyhow::Error),
}
