//! Estimator lifecycle management
//!
//! A model owns one estimator for its scoped lifetime: opened against
//! a configured artifact directory, it loads persisted trained state
//! when present (or constructs a fresh estimator from hyperparameters),
//! serves train/predict, and guarantees the confidence cache is
//! flushed on every exit path.

mod supervised;
mod unsupervised;

pub use supervised::{PredictionStream, SupervisedModel};
pub use unsupervised::{ClusterStream, UnsupervisedModel};

use crate::cache::{read_if_present, write_atomic, ConfidenceCache};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::estimator::{Estimator, EstimatorVariant, MultiOutputEstimator, MultiOutputKind};
use crate::fingerprint::fingerprint;
use crate::models::{FeatureKind, FeatureValue, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// File under `location` holding the persisted trained state. Its
/// presence is the sole signal that training has occurred.
pub const TRAINED_STATE_FILE: &str = "trained.json";

/// Confidence cache file for the supervised adapter.
pub const CONFIDENCE_FILE: &str = "confidence.json";

/// Confidence cache file for the unsupervised adapter.
pub const CONFIDENCE_FILE_UNSUPERVISED: &str = "confidence_unsupervised.json";

/// Envelope persisted to [`TRAINED_STATE_FILE`].
#[derive(Serialize, Deserialize)]
struct TrainedState {
    estimator: String,
    multi_output: Option<MultiOutputKind>,
    labels: Option<Vec<String>>,
    trained_at: i64,
    state: Value,
}

/// State shared by the supervised and unsupervised adapters.
pub(crate) struct ModelState {
    pub(crate) config: ModelConfig,
    pub(crate) variant: Arc<dyn EstimatorVariant>,
    pub(crate) estimator: Box<dyn Estimator>,
    pub(crate) cache: ConfidenceCache,
    pub(crate) fingerprint: String,
    pub(crate) feature_names: Vec<String>,
    /// Label table for textual single-output classification, index =
    /// encoded class.
    pub(crate) labels: Option<Vec<String>>,
    flushed: bool,
}

impl ModelState {
    /// Open a model: validate the configuration, load persisted state
    /// if present, and load the confidence cache.
    pub(crate) fn open(
        config: ModelConfig,
        variant: Arc<dyn EstimatorVariant>,
        cache_file: &str,
    ) -> Result<Self, ModelError> {
        config.validate()?;
        std::fs::create_dir_all(&config.location)?;

        let feature_names = config.feature_names();
        let fingerprint = fingerprint(&config.hyperparams, &feature_names);
        let cache = ConfidenceCache::load(config.location.join(cache_file))?;

        let trained_path = config.location.join(TRAINED_STATE_FILE);
        let (estimator, labels) = match read_if_present(&trained_path)? {
            Some(data) => {
                let envelope: TrainedState = serde_json::from_slice(&data).map_err(|e| {
                    ModelError::CorruptState(format!(
                        "trained state {} is unreadable: {e}",
                        trained_path.display()
                    ))
                })?;
                if envelope.estimator != variant.name() {
                    return Err(ModelError::CorruptState(format!(
                        "trained state was produced by estimator {:?}, configured {:?}",
                        envelope.estimator,
                        variant.name()
                    )));
                }
                let estimator: Box<dyn Estimator> = match envelope.multi_output {
                    Some(kind) => Box::new(MultiOutputEstimator::load(
                        kind,
                        Arc::clone(&variant),
                        config.hyperparams.clone(),
                        &envelope.state,
                    )?),
                    None => variant.load(&envelope.state)?,
                };
                debug!(
                    estimator = variant.name(),
                    trained_at = envelope.trained_at,
                    "Loaded persisted trained state"
                );
                (estimator, envelope.labels)
            }
            None => (variant.construct(&config.hyperparams)?, None),
        };

        Ok(Self {
            config,
            variant,
            estimator,
            cache,
            fingerprint,
            feature_names,
            labels,
            flushed: false,
        })
    }

    pub(crate) fn trained_path(&self) -> PathBuf {
        self.config.location.join(TRAINED_STATE_FILE)
    }

    pub(crate) fn is_trained(&self) -> bool {
        self.trained_path().is_file()
    }

    /// Persist the current estimator (and label table) atomically.
    pub(crate) fn persist_trained(&self) -> Result<(), ModelError> {
        let multi_output = if self.estimator.is_multi_output() {
            Some(MultiOutputKind::for_family(self.estimator.family())?)
        } else {
            None
        };
        let envelope = TrainedState {
            estimator: self.variant.name().to_string(),
            multi_output,
            labels: self.labels.clone(),
            trained_at: chrono::Utc::now().timestamp(),
            state: self.estimator.save_state()?,
        };
        write_atomic(&self.trained_path(), &serde_json::to_vec_pretty(&envelope)?)?;
        debug!(path = %self.trained_path().display(), "Trained state persisted");
        Ok(())
    }

    /// Flatten a record's named features into one row, in the given
    /// order: scalars contribute one element, lists contribute their
    /// elements in order.
    pub(crate) fn flatten(&self, record: &Record, names: &[String]) -> Result<Vec<f64>, ModelError> {
        let mut row = Vec::with_capacity(names.len());
        for name in names {
            let value = record
                .feature(name)
                .ok_or_else(|| ModelError::MissingFeature {
                    key: record.key().to_string(),
                    feature: name.clone(),
                })?;
            row.extend(value.components(name)?);
        }
        Ok(row)
    }

    pub(crate) fn confidence(&self) -> f64 {
        self.cache.get(&self.fingerprint)
    }

    pub(crate) fn set_confidence(&mut self, value: f64) {
        self.cache.set(self.fingerprint.clone(), value);
    }

    /// Flush the confidence cache, unconditionally.
    pub(crate) fn flush(&mut self) -> Result<(), ModelError> {
        self.cache.flush()?;
        self.flushed = true;
        Ok(())
    }
}

impl Drop for ModelState {
    fn drop(&mut self) {
        // Guarantee a flush on exit paths that skipped close().
        if !self.flushed {
            if let Err(e) = self.cache.flush() {
                warn!(error = %e, "Failed to flush confidence cache on drop");
            }
        }
    }
}

/// Cast a raw predicted scalar to a numeric declared kind.
pub(crate) fn cast_numeric(kind: FeatureKind, raw: f64) -> FeatureValue {
    match kind {
        FeatureKind::Integer => FeatureValue::Integer(raw.round() as i64),
        FeatureKind::Float => FeatureValue::Float(raw),
        // Textual targets are decoded elsewhere; falling through here
        // keeps the raw value visible rather than losing it.
        FeatureKind::Text => FeatureValue::Float(raw),
    }
}
