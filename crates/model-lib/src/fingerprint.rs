//! Configuration fingerprints
//!
//! A fingerprint is the cache key for a model configuration: the
//! SHA-384 digest of every hyperparameter (key then string form, in
//! stable order) followed by the input feature names in declaration
//! order. Data-selection fields (location, predict, features) never
//! participate; the feature names do, so reordering or renaming inputs
//! changes the key.

use crate::config::Hyperparameters;
use serde_json::Value;
use sha2::{Digest, Sha384};

/// Derive the fingerprint for a hyperparameter set and ordered feature
/// names. Pure function of its inputs.
pub fn fingerprint(hyperparams: &Hyperparameters, feature_names: &[String]) -> String {
    let mut hasher = Sha384::new();
    for (key, value) in hyperparams.iter() {
        hasher.update(key.as_bytes());
        hasher.update(value_repr(value).as_bytes());
    }
    for name in feature_names {
        hasher.update(name.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// String form of a hyperparameter value. JSON strings contribute
/// their raw contents rather than their quoted JSON text.
fn value_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
