//! Model configuration
//!
//! A configuration names the artifact directory, the prediction
//! target(s), the input features, and the estimator hyperparameters.
//! Hyperparameters are opaque key/value pairs forwarded verbatim to
//! estimator construction; by construction they never contain the
//! data-selection fields (location, predict, features).

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::models::{Feature, Target};

/// Opaque estimator hyperparameters with a stable iteration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hyperparameters(BTreeMap<String, Value>);

impl Hyperparameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Iterate in stable (sorted-key) order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64, ModelError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(v) => v.as_u64().ok_or_else(|| ModelError::InvalidHyperparameter {
                key: key.to_string(),
                reason: format!("expected a non-negative integer, got {v}"),
            }),
        }
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, ModelError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| ModelError::InvalidHyperparameter {
                key: key.to_string(),
                reason: format!("expected a number, got {v}"),
            }),
        }
    }
}

/// Immutable configuration for one model instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Directory for persisted artifacts (trained state, confidence cache).
    pub location: PathBuf,
    /// Prediction target: one feature, or an ordered set for multi-output.
    pub predict: Target,
    /// Ordered input features.
    pub features: Vec<Feature>,
    /// Estimator-specific hyperparameters, forwarded verbatim.
    #[serde(default)]
    pub hyperparams: Hyperparameters,
}

impl ModelConfig {
    pub fn new(location: impl Into<PathBuf>, predict: Target, features: Vec<Feature>) -> Self {
        Self {
            location: location.into(),
            predict,
            features,
            hyperparams: Hyperparameters::new(),
        }
    }

    /// Builder-style hyperparameter attachment.
    pub fn with_hyperparam(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.hyperparams = self.hyperparams.with(key, value);
        self
    }

    /// Input feature names in declaration order.
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    /// Check the configuration invariants: non-empty features, and
    /// target names disjoint from input feature names.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.features.is_empty() {
            return Err(ModelError::InvalidConfig(
                "at least one input feature is required".to_string(),
            ));
        }
        let feature_names = self.feature_names();
        for target in self.predict.names() {
            if feature_names.contains(&target) {
                return Err(ModelError::InvalidConfig(format!(
                    "prediction target {target:?} is also an input feature"
                )));
            }
        }
        if let Target::Multi(targets) = &self.predict {
            if targets.is_empty() {
                return Err(ModelError::InvalidConfig(
                    "multi-output target set is empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
