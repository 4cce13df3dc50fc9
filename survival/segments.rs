use crate::cache::ModelCache;
use crate::config::{ConfigError, EngineConfig};
use crate::data::TrainingSample;
use crate::error::SurvivalError;
use crate::model::FitReport;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Customer segment label, e.g. "new", "loyal", "at_risk".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One independently trained model cache per customer segment.
pub struct SegmentModels {
    config: EngineConfig,
    caches: DashMap<SegmentId, Arc<ModelCache>, ahash::RandomState>,
}

impl SegmentModels {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            caches: DashMap::with_hasher(ahash::RandomState::new()),
        })
    }

    /// Trains the segment's model, creating its cache on first use. A failed
    /// fit leaves the segment's previous model serving.
    pub fn build(
        &self,
        segment: &SegmentId,
        samples: &[TrainingSample],
    ) -> Result<FitReport, SurvivalError> {
        let cache = Arc::clone(
            self.caches
                .entry(segment.clone())
                .or_insert_with(|| Arc::new(ModelCache::with_validated(self.config.clone())))
                .value(),
        );
        log::info!("Training segment '{segment}' on {} samples", samples.len());
        cache.build_cox_model(samples)
    }

    pub fn get(&self, segment: &SegmentId) -> Option<Arc<ModelCache>> {
        self.caches.get(segment).map(|entry| Arc::clone(entry.value()))
    }

    /// Segment ids in sorted order.
    pub fn segments(&self) -> Vec<SegmentId> {
        let mut ids: Vec<_> = self.caches.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn remove(&self, segment: &SegmentId) -> Option<Arc<ModelCache>> {
        self.caches.remove(segment).map(|(_, cache)| cache)
    }
}
