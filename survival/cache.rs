//! Thread-safe holder of the current model and its per-subject curves.
//!
//! Readers clone an `Arc` to the current [`ModelSnapshot`] and work against it
//! without holding any lock, so a retrain running concurrently can never hand
//! a reader coefficients from one fit and a baseline from another. Each
//! snapshot owns its curve cache; installing a new model drops every curve
//! computed under the old one.
//!
//! Between installs the curve map grows with every distinct subject served.
//! Long-running callers bound it with [`ModelCache::clear_curves`]; a cleared
//! subject is recomputed on its next request that carries features.

use crate::config::{ConfigError, EngineConfig};
use crate::curve::SurvivalCurve;
use crate::data::{CustomerMetrics, SubjectId, TrainingSample, build_training_samples};
use crate::error::SurvivalError;
use crate::model::{CoxModel, FitReport, ModelError, RiskFactor};
use crate::predictor::FeatureVector;
use dashmap::DashMap;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Untrained,
    /// `generation` increases by one with every installed model.
    Trained { generation: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub subject_id: SubjectId,
    pub churn_probability: f64,
    pub expected_time_to_event: f64,
}

struct CachedCurve {
    features: FeatureVector,
    curve: SurvivalCurve,
}

/// One installed model plus the curves computed from it.
pub struct ModelSnapshot {
    generation: u64,
    model: CoxModel,
    curves: DashMap<SubjectId, Arc<CachedCurve>, ahash::RandomState>,
}

impl ModelSnapshot {
    fn new(generation: u64, model: CoxModel) -> Self {
        Self {
            generation,
            model,
            curves: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn model(&self) -> &CoxModel {
        &self.model
    }

    pub fn cached_curves(&self) -> usize {
        self.curves.len()
    }

    fn curve_for(
        &self,
        subject: &SubjectId,
        features: Option<&FeatureVector>,
    ) -> Result<Arc<CachedCurve>, SurvivalError> {
        let cached = self.curves.get(subject).map(|entry| Arc::clone(entry.value()));
        if let Some(hit) = cached {
            if features.is_none_or(|f| hit.features == *f) {
                log::trace!("curve cache hit for {subject}");
                return Ok(hit);
            }
        }

        let Some(features) = features else {
            return Err(SurvivalError::SubjectNotFound(subject.clone()));
        };
        log::trace!("curve cache miss for {subject}");
        let entry = Arc::new(CachedCurve {
            features: *features,
            curve: self.model.survival_curve(features)?,
        });
        self.curves.insert(subject.clone(), Arc::clone(&entry));
        Ok(entry)
    }

    fn cached_features(&self, subject: &SubjectId) -> Result<FeatureVector, SurvivalError> {
        self.curves
            .get(subject)
            .map(|entry| entry.features)
            .ok_or_else(|| SurvivalError::SubjectNotFound(subject.clone()))
    }

    fn churn_probability(
        &self,
        subject: &SubjectId,
        features: Option<&FeatureVector>,
        neutral: f64,
    ) -> Result<f64, SurvivalError> {
        Ok(self
            .curve_for(subject, features)?
            .curve
            .churn_probability(neutral))
    }

    fn time_to_event(
        &self,
        subject: &SubjectId,
        features: Option<&FeatureVector>,
    ) -> Result<f64, SurvivalError> {
        self.curve_for(subject, features)?
            .curve
            .expected_time_to_event(&self.model.baseline)
    }
}

pub struct ModelCache {
    config: EngineConfig,
    current: RwLock<Option<Arc<ModelSnapshot>>>,
    generations: AtomicU64,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::with_validated(EngineConfig::default())
    }
}

impl ModelCache {
    /// Creates an untrained cache, rejecting an invalid `config`.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_validated(config))
    }

    pub(crate) fn with_validated(config: EngineConfig) -> Self {
        Self {
            config,
            current: RwLock::new(None),
            generations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> ModelState {
        match self.current_snapshot() {
            Some(snapshot) => ModelState::Trained {
                generation: snapshot.generation,
            },
            None => ModelState::Untrained,
        }
    }

    fn current_snapshot(&self) -> Option<Arc<ModelSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The model currently serving predictions.
    pub fn snapshot(&self) -> Result<Arc<ModelSnapshot>, SurvivalError> {
        self.current_snapshot().ok_or(SurvivalError::ModelNotTrained)
    }

    fn install(&self, model: CoxModel) -> u64 {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        *current = Some(Arc::new(ModelSnapshot::new(generation, model)));
        generation
    }

    /// Fits a new model and swaps it in.
    ///
    /// Fitting happens outside any lock. On failure the previous model, if
    /// any, keeps serving and the error is returned.
    pub fn build_cox_model(&self, samples: &[TrainingSample]) -> Result<FitReport, SurvivalError> {
        match CoxModel::fit(samples, &self.config) {
            Ok(model) => {
                let report = model.fit;
                let generation = self.install(model);
                log::info!("Installed Cox model generation {generation}");
                Ok(report)
            }
            Err(err) => {
                if let ModelState::Trained { generation } = self.state() {
                    log::warn!("Retrain failed ({err}); generation {generation} keeps serving");
                }
                Err(err)
            }
        }
    }

    pub fn build_from_metrics(
        &self,
        records: &[CustomerMetrics],
    ) -> Result<FitReport, SurvivalError> {
        self.build_cox_model(&build_training_samples(records)?)
    }

    /// Drops the model and every cached curve.
    pub fn reset(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        log::info!("Model cache reset to untrained");
    }

    /// Evicts every cached curve of the serving model and returns how many were
    /// dropped. The model itself keeps serving.
    pub fn clear_curves(&self) -> usize {
        let Some(snapshot) = self.current_snapshot() else {
            return 0;
        };
        let evicted = snapshot.curves.len();
        snapshot.curves.clear();
        log::debug!("Evicted {evicted} cached curves from generation {}", snapshot.generation);
        evicted
    }

    /// Probability the subject churns by the last observed event time.
    ///
    /// Without `features` the subject's cached curve is used; a cached curve
    /// built from different features is recomputed.
    pub fn predict_churn_probability(
        &self,
        subject: &SubjectId,
        features: Option<&FeatureVector>,
    ) -> Result<f64, SurvivalError> {
        self.snapshot()?.churn_probability(
            subject,
            features,
            self.config.neutral_churn_probability,
        )
    }

    pub fn predict_time_to_event(
        &self,
        subject: &SubjectId,
        features: Option<&FeatureVector>,
    ) -> Result<f64, SurvivalError> {
        self.snapshot()?.time_to_event(subject, features)
    }

    /// Per-predictor contributions to the subject's linear predictor, largest
    /// magnitude first. Without `features` the cached subject's features are used.
    pub fn churn_risk_factors(
        &self,
        subject: &SubjectId,
        features: Option<&FeatureVector>,
    ) -> Result<Vec<RiskFactor>, SurvivalError> {
        let snapshot = self.snapshot()?;
        let features = match features {
            Some(features) => *features,
            None => snapshot.cached_features(subject)?,
        };
        snapshot.model.risk_factors(&features)
    }

    /// Predicts many subjects in parallel against one model snapshot.
    pub fn predict_batch(
        &self,
        requests: &[(SubjectId, FeatureVector)],
    ) -> Result<Vec<Result<Prediction, SurvivalError>>, SurvivalError> {
        let snapshot = self.snapshot()?;
        let neutral = self.config.neutral_churn_probability;
        Ok(requests
            .par_iter()
            .map(|(subject, features)| {
                let churn_probability = snapshot.churn_probability(subject, Some(features), neutral)?;
                let expected_time_to_event = snapshot.time_to_event(subject, Some(features))?;
                Ok(Prediction {
                    subject_id: subject.clone(),
                    churn_probability,
                    expected_time_to_event,
                })
            })
            .collect())
    }

    pub fn save_model(&self) -> Result<Vec<u8>, ModelError> {
        let snapshot = self.snapshot()?;
        Ok(snapshot.model.to_toml_string()?.into_bytes())
    }

    /// Replaces the current model with a persisted one. Invalid bytes leave the
    /// current model untouched.
    pub fn load_model(&self, bytes: &[u8]) -> Result<(), ModelError> {
        let model = CoxModel::from_toml_bytes(bytes)?;
        let generation = self.install(model);
        log::info!("Loaded persisted Cox model as generation {generation}");
        Ok(())
    }
}
