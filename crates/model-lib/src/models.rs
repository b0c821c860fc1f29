//! Core data models for the estimator adapter

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Declared element type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Integer,
    Float,
    Text,
}

/// A named feature with a declared element type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub kind: FeatureKind,
}

impl Feature {
    pub fn new(name: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Shorthand for a float-valued feature.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FeatureKind::Float)
    }

    /// Shorthand for an integer-valued feature.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FeatureKind::Integer)
    }

    /// Shorthand for a text-valued feature.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FeatureKind::Text)
    }
}

/// The prediction target: one feature, or an ordered set of features
/// for multi-output estimation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Single(Feature),
    Multi(Vec<Feature>),
}

impl Target {
    /// Target feature names in declaration order.
    pub fn names(&self) -> Vec<String> {
        match self {
            Target::Single(f) => vec![f.name.clone()],
            Target::Multi(fs) => fs.iter().map(|f| f.name.clone()).collect(),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Target::Multi(_))
    }
}

/// A feature value carried by a record. Scalars flatten to a single
/// element, list values flatten element-wise; text has no numeric
/// flattening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Integer(i64),
    Float(f64),
    Text(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

impl FeatureValue {
    /// Numeric components of this value in order, for matrix assembly.
    pub fn components(&self, feature: &str) -> Result<Vec<f64>, ModelError> {
        match self {
            FeatureValue::Integer(v) => Ok(vec![*v as f64]),
            FeatureValue::Float(v) => Ok(vec![*v]),
            FeatureValue::IntList(vs) => Ok(vs.iter().map(|v| *v as f64).collect()),
            FeatureValue::FloatList(vs) => Ok(vs.clone()),
            FeatureValue::Text(_) => Err(ModelError::NonNumericFeature {
                feature: feature.to_string(),
            }),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Integer(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

/// A prediction annotation: value plus the model-level confidence in
/// effect when it was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub value: FeatureValue,
    pub confidence: f64,
}

/// A record pulled from an external source. The adapter reads input
/// features and writes prediction annotations; it does not own record
/// lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    key: String,
    features: HashMap<String, FeatureValue>,
    predictions: BTreeMap<String, Prediction>,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            features: HashMap::new(),
            predictions: BTreeMap::new(),
        }
    }

    /// Builder-style feature attachment.
    pub fn with_feature(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(name.into(), value.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureValue> {
        self.features.get(name)
    }

    /// Whether the record carries every named feature.
    pub fn has_features(&self, names: &[String]) -> bool {
        names.iter().all(|n| self.features.contains_key(n))
    }

    /// Attach a prediction annotation, overwriting any prior value for
    /// the same target name.
    pub fn predicted(&mut self, name: impl Into<String>, value: FeatureValue, confidence: f64) {
        self.predictions
            .insert(name.into(), Prediction { value, confidence });
    }

    pub fn prediction(&self, name: &str) -> Option<&Prediction> {
        self.predictions.get(name)
    }

    pub fn predictions(&self) -> impl Iterator<Item = (&str, &Prediction)> {
        self.predictions.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_components() {
        assert_eq!(
            FeatureValue::Integer(3).components("a").unwrap(),
            vec![3.0]
        );
        assert_eq!(FeatureValue::Float(2.5).components("a").unwrap(), vec![2.5]);
    }

    #[test]
    fn test_list_components_preserve_order() {
        let value = FeatureValue::FloatList(vec![1.0, 2.0, 3.0]);
        assert_eq!(value.components("a").unwrap(), vec![1.0, 2.0, 3.0]);

        let value = FeatureValue::IntList(vec![4, 5]);
        assert_eq!(value.components("a").unwrap(), vec![4.0, 5.0]);
    }

    #[test]
    fn test_text_has_no_components() {
        let err = FeatureValue::Text("abc".to_string())
            .components("city")
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::NonNumericFeature { feature } if feature == "city"
        ));
    }

    #[test]
    fn test_record_annotations() {
        let mut record = Record::new("r1").with_feature("a", 1.0);
        assert!(record.prediction("y").is_none());

        record.predicted("y", FeatureValue::Float(4.2), 0.9);
        let p = record.prediction("y").unwrap();
        assert_eq!(p.value, FeatureValue::Float(4.2));
        assert!((p.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_has_features() {
        let record = Record::new("r1").with_feature("a", 1.0).with_feature("b", 2.0);
        assert!(record.has_features(&["a".to_string(), "b".to_string()]));
        assert!(!record.has_features(&["a".to_string(), "c".to_string()]));
    }

    #[test]
    fn test_target_names() {
        let single = Target::Single(Feature::float("y"));
        assert_eq!(single.names(), vec!["y"]);
        assert!(!single.is_multi());

        let multi = Target::Multi(vec![Feature::float("y1"), Feature::float("y2")]);
        assert_eq!(multi.names(), vec!["y1", "y2"]);
        assert!(multi.is_multi());
    }
}
