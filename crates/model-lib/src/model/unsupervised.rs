//! Unsupervised adapter: clusterer training and label dispatch
//!
//! Training fits on input features alone. Prediction distinguishes
//! inductive clusterers (native predict on new rows) from transductive
//! ones, which only carry labels for their training set and are served
//! one label per record, in order.

use super::{ModelState, CONFIDENCE_FILE_UNSUPERVISED};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::estimator::{Estimator, EstimatorFamily, EstimatorVariant};
use crate::models::{Feature, FeatureKind, FeatureValue, Record, Target};
use crate::source::{RecordSource, RecordStream};
use anyhow::anyhow;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Unsupervised model adapter for clustering estimators.
pub struct UnsupervisedModel {
    inner: ModelState,
}

impl UnsupervisedModel {
    pub fn open(
        config: ModelConfig,
        variant: Arc<dyn EstimatorVariant>,
    ) -> Result<Self, ModelError> {
        if config.predict.is_multi() {
            return Err(ModelError::InvalidConfig(
                "unsupervised adapter requires a single prediction target".to_string(),
            ));
        }
        Ok(Self {
            inner: ModelState::open(config, variant, CONFIDENCE_FILE_UNSUPERVISED)?,
        })
    }

    pub fn fingerprint(&self) -> &str {
        &self.inner.fingerprint
    }

    pub fn confidence(&self) -> f64 {
        self.inner.confidence()
    }

    pub fn set_confidence(&mut self, value: f64) {
        self.inner.set_confidence(value);
    }

    /// Flush the confidence cache and consume the model.
    pub fn close(mut self) -> Result<(), ModelError> {
        self.inner.flush()
    }

    /// Fit the clusterer on input features alone and persist the
    /// trained state.
    pub async fn train(&mut self, source: &dyn RecordSource) -> Result<(), ModelError> {
        let mut records = source.with_features(&self.inner.feature_names).await?;

        let mut xdata: Vec<Vec<f64>> = Vec::new();
        while let Some(record) = records.next().await {
            let record = record?;
            xdata.push(self.inner.flatten(&record, &self.inner.feature_names)?);
        }
        if xdata.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        info!(records = xdata.len(), "Training data assembled");

        self.inner.estimator.fit(&xdata, None)?;
        self.inner.persist_trained()
    }

    /// Start a lazy cluster-label pass over the source.
    ///
    /// Fails with [`ModelError::ModelNotTrained`] without persisted
    /// trained state, and with [`ModelError::UnsupportedEstimatorFamily`]
    /// if the estimator is not a clusterer. Transductive clusterers are
    /// served from their precomputed training labels, one per record;
    /// pulling past the end is [`ModelError::ClusterLabelsExhausted`].
    pub async fn predict<'a>(
        &'a self,
        source: &dyn RecordSource,
    ) -> Result<ClusterStream<'a>, ModelError> {
        if !self.inner.is_trained() {
            return Err(ModelError::ModelNotTrained);
        }
        let family = self.inner.estimator.family();
        if family != EstimatorFamily::Clusterer {
            return Err(ModelError::UnsupportedEstimatorFamily { family });
        }

        let mode = if self.inner.estimator.supports_predict() {
            Mode::Inductive
        } else {
            warn!(
                "Transductive clusterer: ensure the data being passed is the training data"
            );
            Mode::Transductive { cursor: 0 }
        };

        let records = source.with_features(&self.inner.feature_names).await?;
        Ok(ClusterStream {
            model: self,
            records,
            confidence: self.inner.confidence(),
            mode,
        })
    }

    fn target(&self) -> Result<&Feature, ModelError> {
        match &self.inner.config.predict {
            Target::Single(feature) => Ok(feature),
            // open() rejects multi targets.
            Target::Multi(_) => Err(ModelError::InvalidConfig(
                "unsupervised adapter requires a single prediction target".to_string(),
            )),
        }
    }
}

enum Mode {
    Inductive,
    Transductive { cursor: usize },
}

/// Lazy per-record cluster labelling pass. For transductive
/// clusterers the label cursor is stateful across `next` calls within
/// this one stream.
pub struct ClusterStream<'a> {
    model: &'a UnsupervisedModel,
    records: RecordStream,
    confidence: f64,
    mode: Mode,
}

impl ClusterStream<'_> {
    pub async fn next(&mut self) -> Option<Result<Record, ModelError>> {
        let record = match self.records.next().await? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };
        Some(self.annotate(record))
    }

    fn annotate(&mut self, mut record: Record) -> Result<Record, ModelError> {
        let inner = &self.model.inner;
        let row = inner.flatten(&record, &inner.feature_names)?;

        let label: i64 = match &mut self.mode {
            Mode::Inductive => {
                let output = inner.estimator.predict(&[row])?;
                let raw = output.first().and_then(|p| p.first()).copied().ok_or_else(
                    || ModelError::Estimator(anyhow!("clusterer returned no prediction")),
                )?;
                raw.round() as i64
            }
            Mode::Transductive { cursor } => {
                let labels = inner.estimator.training_labels().ok_or_else(|| {
                    ModelError::CorruptState(
                        "transductive clusterer has no training labels".to_string(),
                    )
                })?;
                if *cursor >= labels.len() {
                    return Err(ModelError::ClusterLabelsExhausted {
                        available: labels.len(),
                        requested: *cursor + 1,
                    });
                }
                let label = labels[*cursor];
                *cursor += 1;
                label
            }
        };

        let target = self.model.target()?;
        let value = match target.kind {
            FeatureKind::Text => FeatureValue::Text(label.to_string()),
            FeatureKind::Integer => FeatureValue::Integer(label),
            FeatureKind::Float => FeatureValue::Float(label as f64),
        };
        debug!(record = record.key(), cluster = label, "Predicted cluster");
        record.predicted(target.name.as_str(), value, self.confidence);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{KMeansVariant, LeastSquaresVariant, SingleLinkageVariant};
    use crate::source::MemorySource;
    use tempfile::tempdir;

    fn clustered_source() -> MemorySource {
        MemorySource::new(vec![
            Record::new("r1").with_feature("a", 0.0).with_feature("b", 0.1),
            Record::new("r2").with_feature("a", 0.1).with_feature("b", 0.0),
            Record::new("r3").with_feature("a", 9.0).with_feature("b", 9.1),
        ])
    }

    fn cluster_config(dir: &std::path::Path) -> ModelConfig {
        ModelConfig::new(
            dir,
            Target::Single(Feature::integer("cluster")),
            vec![Feature::float("a"), Feature::float("b")],
        )
    }

    #[tokio::test]
    async fn test_inductive_clusterer_predicts_new_rows() {
        let dir = tempdir().unwrap();
        let mut model =
            UnsupervisedModel::open(cluster_config(dir.path()), Arc::new(KMeansVariant)).unwrap();
        model.train(&clustered_source()).await.unwrap();

        let inference = MemorySource::new(vec![
            Record::new("q1").with_feature("a", 0.05).with_feature("b", 0.05),
            Record::new("q2").with_feature("a", 8.9).with_feature("b", 9.0),
        ]);
        let mut stream = model.predict(&inference).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();

        let c1 = first.prediction("cluster").unwrap().value.clone();
        let c2 = second.prediction("cluster").unwrap().value.clone();
        assert_ne!(c1, c2);
    }

    #[tokio::test]
    async fn test_transductive_labels_exhaust() {
        let dir = tempdir().unwrap();
        let mut model =
            UnsupervisedModel::open(cluster_config(dir.path()), Arc::new(SingleLinkageVariant))
                .unwrap();
        model.train(&clustered_source()).await.unwrap();

        // Four records against three clustered training rows.
        let inference = MemorySource::new(vec![
            Record::new("q1").with_feature("a", 0.0).with_feature("b", 0.1),
            Record::new("q2").with_feature("a", 0.1).with_feature("b", 0.0),
            Record::new("q3").with_feature("a", 9.0).with_feature("b", 9.1),
            Record::new("q4").with_feature("a", 9.1).with_feature("b", 9.0),
        ]);
        let mut stream = model.predict(&inference).await.unwrap();
        for _ in 0..3 {
            stream.next().await.unwrap().unwrap();
        }
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ModelError::ClusterLabelsExhausted {
                available: 3,
                requested: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_non_clusterer_rejected_at_predict() {
        let dir = tempdir().unwrap();

        // Persist regressor trained state through the supervised path.
        let supervised_config = ModelConfig::new(
            dir.path(),
            Target::Single(Feature::float("y")),
            vec![Feature::float("a"), Feature::float("b")],
        );
        let mut supervised =
            crate::model::SupervisedModel::open(supervised_config, Arc::new(LeastSquaresVariant))
                .unwrap();
        let source = MemorySource::new(vec![
            Record::new("r1")
                .with_feature("a", 0.0)
                .with_feature("b", 0.1)
                .with_feature("y", 1.0),
            Record::new("r2")
                .with_feature("a", 1.0)
                .with_feature("b", 1.1)
                .with_feature("y", 2.0),
        ]);
        supervised.train(&source).await.unwrap();
        supervised.close().unwrap();

        // The unsupervised adapter loads that state and must refuse to
        // treat a regressor as a clusterer.
        let config = ModelConfig::new(
            dir.path(),
            Target::Single(Feature::integer("cluster")),
            vec![Feature::float("a"), Feature::float("b")],
        );
        let model = UnsupervisedModel::open(config, Arc::new(LeastSquaresVariant)).unwrap();
        let inference =
            MemorySource::new(vec![Record::new("q1").with_feature("a", 0.0).with_feature("b", 0.0)]);
        assert!(matches!(
            model.predict(&inference).await,
            Err(ModelError::UnsupportedEstimatorFamily {
                family: EstimatorFamily::Regressor
            })
        ));
    }

    #[tokio::test]
    async fn test_multi_target_rejected_at_open() {
        let dir = tempdir().unwrap();
        let config = ModelConfig::new(
            dir.path(),
            Target::Multi(vec![Feature::integer("c1"), Feature::integer("c2")]),
            vec![Feature::float("a")],
        );
        assert!(matches!(
            UnsupervisedModel::open(config, Arc::new(KMeansVariant)),
            Err(ModelError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_textual_cluster_target() {
        let dir = tempdir().unwrap();
        let config = ModelConfig::new(
            dir.path(),
            Target::Single(Feature::text("cluster")),
            vec![Feature::float("a"), Feature::float("b")],
        );
        let mut model = UnsupervisedModel::open(config, Arc::new(KMeansVariant)).unwrap();
        model.train(&clustered_source()).await.unwrap();

        let inference = MemorySource::new(vec![Record::new("q1")
            .with_feature("a", 0.0)
            .with_feature("b", 0.0)]);
        let mut stream = model.predict(&inference).await.unwrap();
        let record = stream.next().await.unwrap().unwrap();
        assert!(matches!(
            record.prediction("cluster").unwrap().value,
            FeatureValue::Text(_)
        ));
    }
}
