//! Adapter layer for pluggable tabular estimators
//!
//! This crate lets a data pipeline train and query arbitrary,
//! pluggable estimators without knowing estimator-specific details:
//! - Configuration fingerprinting for cache-key derivation
//! - Disk-persisted confidence caching keyed by that fingerprint
//! - Estimator lifecycle management with persisted trained state
//! - Automatic single-output to multi-output wrapping
//! - Clusterer dispatch (inductive vs transductive)
//! - Lazy per-record prediction streaming
//!
//! Records come in through the [`RecordSource`] capability; estimators
//! come in through [`EstimatorVariant`] implementations resolved by
//! name from an [`EstimatorRegistry`].

pub mod cache;
pub mod config;
pub mod error;
pub mod estimator;
pub mod fingerprint;
pub mod model;
pub mod models;
pub mod source;

pub use cache::ConfidenceCache;
pub use config::{Hyperparameters, ModelConfig};
pub use error::ModelError;
pub use estimator::{
    Estimator, EstimatorFamily, EstimatorRegistry, EstimatorVariant, MultiOutputEstimator,
    MultiOutputKind,
};
pub use fingerprint::fingerprint;
pub use model::{
    ClusterStream, PredictionStream, SupervisedModel, UnsupervisedModel, CONFIDENCE_FILE,
    CONFIDENCE_FILE_UNSUPERVISED, TRAINED_STATE_FILE,
};
pub use models::{Feature, FeatureKind, FeatureValue, Prediction, Record, Target};
pub use source::{MemorySource, RecordSource, RecordStream};
