//! Supervised adapter: train on feature/target rows, stream
//! per-record predictions.

use super::{cast_numeric, ModelState, CONFIDENCE_FILE};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::estimator::{Estimator, EstimatorVariant, MultiOutputEstimator, MultiOutputKind};
use crate::models::{FeatureKind, FeatureValue, Record, Target};
use crate::source::{RecordSource, RecordStream};
use anyhow::anyhow;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{debug, info};

/// Supervised model adapter.
///
/// Opening loads persisted trained state (if any) and the confidence
/// cache; dropping or closing flushes the cache. `train` buffers the
/// whole matching dataset in memory before fitting; `predict` buffers
/// one row at a time.
pub struct SupervisedModel {
    inner: ModelState,
}

impl SupervisedModel {
    pub fn open(
        config: ModelConfig,
        variant: Arc<dyn EstimatorVariant>,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            inner: ModelState::open(config, variant, CONFIDENCE_FILE)?,
        })
    }

    /// The configuration fingerprint keying this model's confidence.
    pub fn fingerprint(&self) -> &str {
        &self.inner.fingerprint
    }

    /// Cached confidence for this configuration; NaN when never set.
    pub fn confidence(&self) -> f64 {
        self.inner.confidence()
    }

    pub fn set_confidence(&mut self, value: f64) {
        self.inner.set_confidence(value);
    }

    /// Whether the current estimator is a multi-output decorator.
    pub fn is_multi_output(&self) -> bool {
        self.inner.estimator.is_multi_output()
    }

    /// Flush the confidence cache and consume the model.
    pub fn close(mut self) -> Result<(), ModelError> {
        self.inner.flush()
    }

    /// Pull every record carrying the configured features and target
    /// names, fit the estimator, and persist the trained state.
    ///
    /// If the target is multi-valued and the estimator is not already
    /// a multi-output decorator, it is wrapped per its family before
    /// fitting; families that are neither regressor nor classifier
    /// fail with [`ModelError::NoMultiOutputSupport`].
    pub async fn train(&mut self, source: &dyn RecordSource) -> Result<(), ModelError> {
        let mut wanted = self.inner.feature_names.clone();
        wanted.extend(self.inner.config.predict.names());
        let mut records = source.with_features(&wanted).await?;

        let mut xdata: Vec<Vec<f64>> = Vec::new();
        let mut ydata: Vec<Vec<f64>> = Vec::new();
        let mut labels: Vec<String> = Vec::new();
        while let Some(record) = records.next().await {
            let record = record?;
            xdata.push(self.inner.flatten(&record, &self.inner.feature_names)?);
            ydata.push(self.target_row(&record, &mut labels)?);
        }
        if xdata.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        info!(records = xdata.len(), "Training data assembled");

        if self.inner.config.predict.is_multi() && !self.inner.estimator.is_multi_output() {
            let kind = MultiOutputKind::for_family(self.inner.estimator.family())?;
            self.inner.estimator = Box::new(MultiOutputEstimator::wrap(
                kind,
                Arc::clone(&self.inner.variant),
                self.inner.config.hyperparams.clone(),
            ));
        }

        self.inner.estimator.fit(&xdata, Some(&ydata))?;
        self.inner.labels = if labels.is_empty() { None } else { Some(labels) };
        self.inner.persist_trained()
    }

    /// Start a lazy prediction pass over the source. Fails with
    /// [`ModelError::ModelNotTrained`] if no trained state has been
    /// persisted.
    pub async fn predict<'a>(
        &'a self,
        source: &dyn RecordSource,
    ) -> Result<PredictionStream<'a>, ModelError> {
        if !self.inner.is_trained() {
            return Err(ModelError::ModelNotTrained);
        }
        let records = source.with_features(&self.inner.feature_names).await?;
        Ok(PredictionStream {
            model: self,
            records,
            // Model-level score: the same cached value annotates every
            // record in this call.
            confidence: self.inner.confidence(),
        })
    }

    /// Assemble one flattened target row, label-encoding textual
    /// single targets through `labels`.
    fn target_row(&self, record: &Record, labels: &mut Vec<String>) -> Result<Vec<f64>, ModelError> {
        match &self.inner.config.predict {
            Target::Single(feature) => {
                let value =
                    record
                        .feature(&feature.name)
                        .ok_or_else(|| ModelError::MissingFeature {
                            key: record.key().to_string(),
                            feature: feature.name.clone(),
                        })?;
                if feature.kind == FeatureKind::Text {
                    let text = match value {
                        FeatureValue::Text(s) => s.clone(),
                        FeatureValue::Integer(v) => v.to_string(),
                        FeatureValue::Float(v) => v.to_string(),
                        other => {
                            return Err(ModelError::InvalidConfig(format!(
                                "textual target {:?} cannot encode {other:?}",
                                feature.name
                            )))
                        }
                    };
                    return Ok(vec![encode_label(labels, &text)]);
                }
                let components = value.components(&feature.name)?;
                if components.len() != 1 {
                    return Err(ModelError::InvalidConfig(format!(
                        "single prediction target {:?} flattens to {} elements; \
                         declare a multi-output target instead",
                        feature.name,
                        components.len()
                    )));
                }
                Ok(components)
            }
            Target::Multi(features) => {
                let mut row = Vec::with_capacity(features.len());
                for feature in features {
                    let value =
                        record
                            .feature(&feature.name)
                            .ok_or_else(|| ModelError::MissingFeature {
                                key: record.key().to_string(),
                                feature: feature.name.clone(),
                            })?;
                    row.extend(value.components(&feature.name)?);
                }
                Ok(row)
            }
        }
    }

    fn decode_label(&self, raw: f64) -> Result<String, ModelError> {
        let table = self.inner.labels.as_ref().ok_or_else(|| {
            ModelError::CorruptState(
                "textual target but no label table in trained state".to_string(),
            )
        })?;
        let index = raw.round();
        if index < 0.0 || index as usize >= table.len() {
            return Err(ModelError::CorruptState(format!(
                "predicted class {index} outside the label table ({} entries)",
                table.len()
            )));
        }
        Ok(table[index as usize].clone())
    }
}

fn encode_label(labels: &mut Vec<String>, text: &str) -> f64 {
    match labels.iter().position(|l| l == text) {
        Some(index) => index as f64,
        None => {
            labels.push(text.to_string());
            (labels.len() - 1) as f64
        }
    }
}

/// Lazy per-record prediction pass. Each `next().await` pulls one
/// record from the source, predicts on its single flattened row, and
/// yields the record with its prediction annotations attached, in
/// source order.
pub struct PredictionStream<'a> {
    model: &'a SupervisedModel,
    records: RecordStream,
    confidence: f64,
}

impl PredictionStream<'_> {
    pub async fn next(&mut self) -> Option<Result<Record, ModelError>> {
        let record = match self.records.next().await? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };
        Some(self.annotate(record))
    }

    fn annotate(&self, mut record: Record) -> Result<Record, ModelError> {
        let inner = &self.model.inner;
        let row = inner.flatten(&record, &inner.feature_names)?;
        let output = inner.estimator.predict(&[row])?;
        let prediction = output
            .first()
            .ok_or_else(|| ModelError::Estimator(anyhow!("estimator returned no prediction")))?;

        match &inner.config.predict {
            Target::Multi(targets) => {
                debug!(record = record.key(), values = ?prediction, "Predicted values");
                for (t, feature) in targets.iter().enumerate() {
                    let raw = *prediction.get(t).ok_or_else(|| {
                        ModelError::Estimator(anyhow!(
                            "estimator returned {} outputs for {} targets",
                            prediction.len(),
                            targets.len()
                        ))
                    })?;
                    record.predicted(feature.name.as_str(), FeatureValue::Float(raw), self.confidence);
                }
            }
            Target::Single(feature) => {
                let raw = *prediction.first().ok_or_else(|| {
                    ModelError::Estimator(anyhow!("estimator returned an empty prediction row"))
                })?;
                let value = match feature.kind {
                    FeatureKind::Text => FeatureValue::Text(self.model.decode_label(raw)?),
                    kind => cast_numeric(kind, raw),
                };
                debug!(
                    record = record.key(),
                    target = %feature.name,
                    value = ?value,
                    "Predicted value"
                );
                record.predicted(feature.name.as_str(), value, self.confidence);
            }
        }
        Ok(record)
    }
}
