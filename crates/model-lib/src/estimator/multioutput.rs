//! Multi-output decorator
//!
//! Wraps a single-output regressor or classifier so it can serve a
//! multi-valued prediction target: one freshly constructed underlying
//! estimator is fitted per target column. The wrapper carries an
//! explicit multi-output tag so the adapter never has to inspect type
//! names to recognise it.

use super::{Estimator, EstimatorFamily, EstimatorVariant};
use crate::config::Hyperparameters;
use crate::error::ModelError;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Which family the decorator was built for. Persisted alongside the
/// trained state so the wrapper can be rebuilt on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiOutputKind {
    Regressor,
    Classifier,
}

impl MultiOutputKind {
    /// The decorator applicable to an estimator family, if any.
    pub fn for_family(family: EstimatorFamily) -> Result<Self, ModelError> {
        match family {
            EstimatorFamily::Regressor => Ok(MultiOutputKind::Regressor),
            EstimatorFamily::Classifier => Ok(MultiOutputKind::Classifier),
            EstimatorFamily::Clusterer => Err(ModelError::NoMultiOutputSupport { family }),
        }
    }

    fn family(self) -> EstimatorFamily {
        match self {
            MultiOutputKind::Regressor => EstimatorFamily::Regressor,
            MultiOutputKind::Classifier => EstimatorFamily::Classifier,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct MultiOutputState {
    columns: Vec<Value>,
}

/// Per-target-column decorator over a single-output estimator variant.
pub struct MultiOutputEstimator {
    kind: MultiOutputKind,
    variant: Arc<dyn EstimatorVariant>,
    hyperparams: Hyperparameters,
    columns: Vec<Box<dyn Estimator>>,
}

impl MultiOutputEstimator {
    /// Build an unfitted decorator around a variant. The wrapped
    /// single-output instance, if any, is discarded; fresh per-column
    /// instances are constructed at fit time.
    pub fn wrap(
        kind: MultiOutputKind,
        variant: Arc<dyn EstimatorVariant>,
        hyperparams: Hyperparameters,
    ) -> Self {
        Self {
            kind,
            variant,
            hyperparams,
            columns: Vec::new(),
        }
    }

    /// Rebuild a fitted decorator from persisted state.
    pub fn load(
        kind: MultiOutputKind,
        variant: Arc<dyn EstimatorVariant>,
        hyperparams: Hyperparameters,
        state: &Value,
    ) -> Result<Self, ModelError> {
        let state: MultiOutputState = serde_json::from_value(state.clone())?;
        let columns = state
            .columns
            .iter()
            .map(|column| variant.load(column))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            kind,
            variant,
            hyperparams,
            columns,
        })
    }

    pub fn kind(&self) -> MultiOutputKind {
        self.kind
    }

    /// Number of fitted target columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

impl Estimator for MultiOutputEstimator {
    fn family(&self) -> EstimatorFamily {
        self.kind.family()
    }

    fn fit(&mut self, x: &[Vec<f64>], y: Option<&[Vec<f64>]>) -> Result<(), ModelError> {
        let y = y.ok_or_else(|| {
            ModelError::Estimator(anyhow!("multi-output decorator requires targets"))
        })?;
        let width = y.first().map(|row| row.len()).unwrap_or(0);
        if width == 0 {
            return Err(ModelError::Estimator(anyhow!("empty target matrix")));
        }
        if y.iter().any(|row| row.len() != width) {
            return Err(ModelError::Estimator(anyhow!("ragged target matrix")));
        }

        let mut columns = Vec::with_capacity(width);
        for t in 0..width {
            let column_y: Vec<Vec<f64>> = y.iter().map(|row| vec![row[t]]).collect();
            let mut column = self.variant.construct(&self.hyperparams)?;
            column.fit(x, Some(&column_y))?;
            columns.push(column);
        }
        self.columns = columns;
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        if self.columns.is_empty() {
            return Err(ModelError::Estimator(anyhow!(
                "multi-output decorator not fitted"
            )));
        }
        let mut out = vec![Vec::with_capacity(self.columns.len()); x.len()];
        for column in &self.columns {
            let predictions = column.predict(x)?;
            for (row, prediction) in out.iter_mut().zip(predictions) {
                let value = prediction.first().copied().ok_or_else(|| {
                    ModelError::Estimator(anyhow!("column estimator returned an empty prediction"))
                })?;
                row.push(value);
            }
        }
        Ok(out)
    }

    fn is_multi_output(&self) -> bool {
        true
    }

    fn save_state(&self) -> Result<Value, ModelError> {
        let columns = self
            .columns
            .iter()
            .map(|column| column.save_state())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::to_value(MultiOutputState { columns })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{LeastSquaresVariant, NearestCentroidVariant};

    fn rows(data: &[&[f64]]) -> Vec<Vec<f64>> {
        data.iter().map(|r| r.to_vec()).collect()
    }

    #[test]
    fn test_kind_for_family() {
        assert_eq!(
            MultiOutputKind::for_family(EstimatorFamily::Regressor).unwrap(),
            MultiOutputKind::Regressor
        );
        assert_eq!(
            MultiOutputKind::for_family(EstimatorFamily::Classifier).unwrap(),
            MultiOutputKind::Classifier
        );
        assert!(matches!(
            MultiOutputKind::for_family(EstimatorFamily::Clusterer),
            Err(ModelError::NoMultiOutputSupport { .. })
        ));
    }

    #[test]
    fn test_fits_one_estimator_per_column() {
        let mut wrapper = MultiOutputEstimator::wrap(
            MultiOutputKind::Regressor,
            Arc::new(LeastSquaresVariant),
            Hyperparameters::new(),
        );
        let x = rows(&[&[1.0], &[2.0], &[3.0]]);
        // y1 = 2x, y2 = -x + 10
        let y = rows(&[&[2.0, 9.0], &[4.0, 8.0], &[6.0, 7.0]]);
        wrapper.fit(&x, Some(&y)).unwrap();

        assert!(wrapper.is_multi_output());
        assert_eq!(wrapper.width(), 2);

        let out = wrapper.predict(&rows(&[&[4.0]])).unwrap();
        assert!((out[0][0] - 8.0).abs() < 1e-3, "got {}", out[0][0]);
        assert!((out[0][1] - 6.0).abs() < 1e-3, "got {}", out[0][1]);
    }

    #[test]
    fn test_classifier_columns() {
        let mut wrapper = MultiOutputEstimator::wrap(
            MultiOutputKind::Classifier,
            Arc::new(NearestCentroidVariant),
            Hyperparameters::new(),
        );
        let x = rows(&[&[0.0], &[0.1], &[9.0], &[9.1]]);
        let y = rows(&[&[1.0, 5.0], &[1.0, 5.0], &[2.0, 6.0], &[2.0, 6.0]]);
        wrapper.fit(&x, Some(&y)).unwrap();

        let out = wrapper.predict(&rows(&[&[0.05], &[8.8]])).unwrap();
        assert_eq!(out[0], vec![1.0, 5.0]);
        assert_eq!(out[1], vec![2.0, 6.0]);
    }

    #[test]
    fn test_state_roundtrip() {
        let variant: Arc<dyn EstimatorVariant> = Arc::new(LeastSquaresVariant);
        let mut wrapper = MultiOutputEstimator::wrap(
            MultiOutputKind::Regressor,
            Arc::clone(&variant),
            Hyperparameters::new(),
        );
        let x = rows(&[&[1.0], &[2.0]]);
        let y = rows(&[&[1.0, 10.0], &[2.0, 20.0]]);
        wrapper.fit(&x, Some(&y)).unwrap();

        let state = wrapper.save_state().unwrap();
        let reloaded = MultiOutputEstimator::load(
            MultiOutputKind::Regressor,
            variant,
            Hyperparameters::new(),
            &state,
        )
        .unwrap();

        let out = reloaded.predict(&rows(&[&[3.0]])).unwrap();
        assert!((out[0][0] - 3.0).abs() < 1e-3);
        assert!((out[0][1] - 30.0).abs() < 1e-2);
    }

    #[test]
    fn test_unfitted_predict_fails() {
        let wrapper = MultiOutputEstimator::wrap(
            MultiOutputKind::Regressor,
            Arc::new(LeastSquaresVariant),
            Hyperparameters::new(),
        );
        assert!(wrapper.predict(&rows(&[&[1.0]])).is_err());
    }
}
