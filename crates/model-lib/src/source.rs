//! Record source capability
//!
//! The adapter consumes training and inference data through this
//! abstract capability: iterate records that carry a requested set of
//! named features. The storage layer behind it is someone else's
//! concern; an in-memory implementation ships here for embedding
//! pipelines and tests.

use crate::error::ModelError;
use crate::models::Record;
use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

/// Lazy sequence of records from a source.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record, ModelError>> + Send>>;

/// Trait for record storage implementations.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Iterate records that carry every one of the named features, in
    /// source order.
    async fn with_features(&self, names: &[String]) -> Result<RecordStream, ModelError>;
}

/// In-memory record source.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn with_features(&self, names: &[String]) -> Result<RecordStream, ModelError> {
        let matching: Vec<Result<Record, ModelError>> = self
            .records
            .iter()
            .filter(|r| r.has_features(names))
            .cloned()
            .map(Ok)
            .collect();
        Ok(Box::pin(tokio_stream::iter(matching)))
    }
}
