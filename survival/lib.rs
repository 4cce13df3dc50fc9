#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

//! Survival-analysis engine for customer retention.
//!
//! A Cox proportional-hazards model is fit from customer histories by
//! Newton-Raphson on the ridge-penalised partial likelihood. The fitted
//! coefficients feed a Breslow baseline hazard, and together they produce a
//! survival curve per customer from which churn probability and expected
//! time-to-churn are derived.
//!
//! Data flows one way:
//!
//! ```text
//! CustomerMetrics -> TrainingSample -> RiskSets -> Newton -> CoefficientVector
//!                                                               |
//!                      churn probability / time-to-event <- SurvivalCurve <- BaselineHazard
//! ```
//!
//! [`cache::ModelCache`] is the entry point for services: it owns the fitted
//! model and the per-subject curve cache and is safe to share across threads.

pub mod baseline;
pub mod cache;
pub mod config;
pub mod curve;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod linalg;
pub mod model;
pub mod newton;
pub mod predictor;
pub mod retention;
pub mod risk_set;
pub mod segments;
pub mod working;

pub use cache::{ModelCache, ModelState, Prediction};
pub use config::EngineConfig;
pub use data::{CustomerMetrics, SubjectId, TrainingSample};
pub use error::SurvivalError;
pub use model::CoxModel;
pub use predictor::{CoefficientVector, FeatureVector, Predictor};
