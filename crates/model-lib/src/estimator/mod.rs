//! Pluggable estimator capability
//!
//! Estimators are opaque, swappable numeric implementations behind the
//! [`Estimator`] trait: `fit` on a matrix (with optional targets),
//! `predict` on new rows, plus the metadata the adapter dispatches on
//! (family, multi-output tag, inductive vs transductive clustering).
//! Named variants are resolved at configuration time through an
//! [`EstimatorRegistry`]; no runtime reflection is involved.

mod builtin;
mod multioutput;

pub use builtin::{
    KMeansVariant, LeastSquaresVariant, NearestCentroidVariant, SingleLinkageVariant,
};
pub use multioutput::{MultiOutputEstimator, MultiOutputKind};

use crate::config::Hyperparameters;
use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The family an estimator belongs to, governing wrapping and
/// dispatch rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorFamily {
    Regressor,
    Classifier,
    Clusterer,
}

impl fmt::Display for EstimatorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatorFamily::Regressor => write!(f, "regressor"),
            EstimatorFamily::Classifier => write!(f, "classifier"),
            EstimatorFamily::Clusterer => write!(f, "clusterer"),
        }
    }
}

/// Trait for estimator implementations.
///
/// Inputs and outputs are dense row-major f64 matrices. Supervised
/// estimators receive `y` rows parallel to `x`; clusterers are fit
/// with `y = None`.
pub trait Estimator: Send + Sync {
    fn family(&self) -> EstimatorFamily;

    fn fit(&mut self, x: &[Vec<f64>], y: Option<&[Vec<f64>]>) -> Result<(), ModelError>;

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError>;

    /// Whether this estimator is already a multi-output decorator. Set
    /// by the wrapping step itself; the adapter never inspects type
    /// names.
    fn is_multi_output(&self) -> bool {
        false
    }

    /// Whether the estimator can label rows it was not trained on.
    /// Transductive clusterers return false and only serve
    /// [`Estimator::training_labels`].
    fn supports_predict(&self) -> bool {
        true
    }

    /// Precomputed labels for the training set, where the estimator
    /// keeps them.
    fn training_labels(&self) -> Option<&[i64]> {
        None
    }

    /// Serialize the trained state for persistence.
    fn save_state(&self) -> Result<serde_json::Value, ModelError>;
}

/// A named estimator implementation: constructs fresh instances from
/// hyperparameters and reloads persisted trained state.
pub trait EstimatorVariant: Send + Sync {
    fn name(&self) -> &'static str;

    /// Construct an untrained estimator. Hyperparameters are forwarded
    /// verbatim; unknown keys are the variant's business.
    fn construct(&self, hyperparams: &Hyperparameters) -> Result<Box<dyn Estimator>, ModelError>;

    /// Rebuild a trained estimator from its persisted state.
    fn load(&self, state: &serde_json::Value) -> Result<Box<dyn Estimator>, ModelError>;
}

/// Registry of named estimator variants, resolved at configuration
/// time.
#[derive(Clone, Default)]
pub struct EstimatorRegistry {
    variants: HashMap<&'static str, Arc<dyn EstimatorVariant>>,
}

impl EstimatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in variants.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LeastSquaresVariant));
        registry.register(Arc::new(NearestCentroidVariant));
        registry.register(Arc::new(KMeansVariant));
        registry.register(Arc::new(SingleLinkageVariant));
        registry
    }

    pub fn register(&mut self, variant: Arc<dyn EstimatorVariant>) {
        self.variants.insert(variant.name(), variant);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn EstimatorVariant>, ModelError> {
        self.variants
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownEstimator {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.variants.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_resolves_all_variants() {
        let registry = EstimatorRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec![
                "k-means",
                "linear-regression",
                "nearest-centroid",
                "single-linkage"
            ]
        );
        for name in registry.names() {
            assert!(registry.resolve(name).is_ok());
        }
    }

    #[test]
    fn test_unknown_estimator() {
        let registry = EstimatorRegistry::builtin();
        assert!(matches!(
            registry.resolve("gradient-boosting"),
            Err(ModelError::UnknownEstimator { name }) if name == "gradient-boosting"
        ));
    }

    #[test]
    fn test_family_display() {
        assert_eq!(EstimatorFamily::Regressor.to_string(), "regressor");
        assert_eq!(EstimatorFamily::Clusterer.to_string(), "clusterer");
    }
}
