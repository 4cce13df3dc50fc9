//! The fitted Cox model artifact.
//!
//! A [`CoxModel`] is everything prediction needs: coefficients in canonical
//! predictor order, the Breslow baseline, and a summary of the fit that
//! produced them. It saves to and loads from human-readable TOML.

use crate::baseline::BaselineHazard;
use crate::config::EngineConfig;
use crate::curve::{SurvivalCurve, survival_curve};
use crate::data::TrainingSample;
use crate::error::SurvivalError;
use crate::newton::{NewtonOptions, NewtonStatus, run_newton};
use crate::predictor::{CoefficientVector, FeatureVector, NUM_PREDICTORS, Predictor};
use crate::risk_set::RiskSets;
use crate::working::CoxPartialLikelihood;
use itertools::Itertools;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Bumped whenever the persisted layout changes incompatibly.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Summary of the optimisation that produced a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub iterations: usize,
    pub status: NewtonStatus,
    pub penalized_log_likelihood: f64,
    pub num_samples: usize,
    pub num_events: usize,
    /// Whether the information matrix needed the extra diagonal boost.
    #[serde(default)]
    pub used_singular_fallback: bool,
}

/// One predictor's share of a subject's linear predictor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskFactor {
    pub predictor: Predictor,
    pub contribution: f64,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Model file is not valid UTF-8: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
    #[error("Model format version {found} is not supported (expected {expected}).")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("Persisted model is invalid: {0}")]
    InvalidModel(String),
    #[error(transparent)]
    Survival(#[from] SurvivalError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoxModel {
    pub format_version: u32,
    pub coefficients: CoefficientVector,
    pub baseline: BaselineHazard,
    pub fit: FitReport,
}

impl CoxModel {
    /// Fits coefficients by penalised Newton-Raphson, then the Breslow baseline.
    pub fn fit(samples: &[TrainingSample], config: &EngineConfig) -> Result<Self, SurvivalError> {
        config
            .validate()
            .map_err(|err| SurvivalError::InvalidConfig {
                reason: err.to_string(),
            })?;
        let min_samples = config.min_samples.max(1);
        if samples.len() < min_samples {
            return Err(SurvivalError::insufficient(format!(
                "{} samples supplied, at least {min_samples} required",
                samples.len()
            )));
        }

        let times: Vec<f64> = samples.iter().map(TrainingSample::time_to_event).collect();
        let events: Vec<bool> = samples.iter().map(TrainingSample::event_occurred).collect();
        let risk_sets = RiskSets::build(&times, &events)?;
        if risk_sets.is_empty() {
            return Err(SurvivalError::insufficient(
                "no events observed; every subject is censored",
            ));
        }
        let num_events = risk_sets.num_events();

        let design = Array2::from_shape_fn((samples.len(), NUM_PREDICTORS), |(i, j)| {
            samples[i].features().as_slice()[j]
        });

        log::info!(
            "Fitting Cox model on {} samples ({} events, {} distinct event times)",
            samples.len(),
            num_events,
            risk_sets.len()
        );

        let mut working = CoxPartialLikelihood::new(design, risk_sets)?;
        let result = run_newton(&mut working, &NewtonOptions::from(config))?;

        let mut coefficients = CoefficientVector::zeros();
        for (slot, beta) in coefficients.0.iter_mut().zip(result.beta.iter()) {
            *slot = *beta;
        }
        let baseline = BaselineHazard::estimate(samples, &coefficients)?;

        let fit = FitReport {
            iterations: result.iterations,
            status: result.status,
            penalized_log_likelihood: result.penalized_log_likelihood,
            num_samples: samples.len(),
            num_events,
            used_singular_fallback: result.used_singular_fallback,
        };
        log::info!(
            "Cox fit finished: {:?} after {} iterations, penalised loglik {:.4}",
            fit.status,
            fit.iterations,
            fit.penalized_log_likelihood
        );

        Ok(Self {
            format_version: MODEL_FORMAT_VERSION,
            coefficients,
            baseline,
            fit,
        })
    }

    pub fn linear_predictor(&self, features: &FeatureVector) -> Result<f64, SurvivalError> {
        if !features.is_finite() {
            return Err(SurvivalError::NonFiniteInput { field: "features" });
        }
        Ok(self.coefficients.linear_predictor(features))
    }

    pub fn survival_curve(&self, features: &FeatureVector) -> Result<SurvivalCurve, SurvivalError> {
        survival_curve(self.linear_predictor(features)?, &self.baseline)
    }

    /// Per-predictor contributions, largest magnitude first. Ties keep
    /// canonical predictor order.
    pub fn risk_factors(&self, features: &FeatureVector) -> Result<Vec<RiskFactor>, SurvivalError> {
        if !features.is_finite() {
            return Err(SurvivalError::NonFiniteInput { field: "features" });
        }
        Ok(self
            .coefficients
            .iter()
            .map(|(predictor, weight)| RiskFactor {
                predictor,
                contribution: weight * features.get(predictor),
            })
            .sorted_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()))
            .collect())
    }

    /// Checks a loaded model before it is allowed to serve predictions.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found: self.format_version,
                expected: MODEL_FORMAT_VERSION,
            });
        }
        if !self.coefficients.is_finite() {
            return Err(ModelError::InvalidModel(
                "coefficients must be finite".to_string(),
            ));
        }
        self.baseline
            .validate()
            .map_err(|err| ModelError::InvalidModel(err.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ModelError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        let model: Self = toml::from_str(std::str::from_utf8(bytes)?)?;
        model.validate()?;
        Ok(model)
    }

    /// Saves the model to a file in a human-readable TOML format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let toml_string = self.to_toml_string()?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let bytes = fs::read(path)?;
        Self::from_toml_bytes(&bytes)
    }
}
