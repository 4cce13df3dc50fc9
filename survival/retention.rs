//! Glue between the survival engine and retention decisions.
//!
//! Two policies live here: the conservative churn probability used when no
//! model can answer, and the bounds that keep a proposed retention discount
//! inside what the product's ABC category allows.

use crate::cache::ModelCache;
use crate::config::ConfigError;
use crate::data::SubjectId;
use crate::error::SurvivalError;
use crate::predictor::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discount limits. Category A products are capped hardest, and category C
/// products get a minimum discount whenever the discount is known to lift
/// sales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscountBounds {
    pub floor: f64,
    pub ceiling: f64,
    pub category_a_cap: f64,
    pub category_b_cap: f64,
    pub category_c_floor: f64,
}

impl Default for DiscountBounds {
    fn default() -> Self {
        Self {
            floor: 0.05,
            ceiling: 0.5,
            category_a_cap: 0.2,
            category_b_cap: 0.3,
            category_c_floor: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Churn probability assumed when the model cannot produce one.
    pub fallback_churn_probability: f64,
    pub discount: DiscountBounds,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            fallback_churn_probability: 0.2,
            discount: DiscountBounds::default(),
        }
    }
}

impl RetentionPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.fallback_churn_probability) {
            return Err(ConfigError::Invalid(format!(
                "fallback_churn_probability must lie in [0, 1], got {}",
                self.fallback_churn_probability
            )));
        }
        let d = &self.discount;
        let all = [
            d.floor,
            d.ceiling,
            d.category_a_cap,
            d.category_b_cap,
            d.category_c_floor,
        ];
        if !all.into_iter().all(in_unit) || d.floor > d.ceiling {
            return Err(ConfigError::Invalid(format!(
                "discount bounds must lie in [0, 1] with floor <= ceiling, got {d:?}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbcCategory {
    A,
    B,
    C,
}

impl fmt::Display for AbcCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AbcCategory::A => "A",
            AbcCategory::B => "B",
            AbcCategory::C => "C",
        };
        f.write_str(label)
    }
}

impl FromStr for AbcCategory {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(AbcCategory::A),
            "B" | "b" => Ok(AbcCategory::B),
            "C" | "c" => Ok(AbcCategory::C),
            other => Err(ConfigError::Invalid(format!(
                "unknown ABC category '{other}'"
            ))),
        }
    }
}

impl DiscountBounds {
    /// Clamps a proposed discount.
    ///
    /// A non-positive proposal means "no discount" and stays 0 unless a
    /// category C floor applies. Positive proposals are first held inside
    /// `[floor, ceiling]`, then the category rule is applied.
    pub fn bound(&self, proposed: f64, category: Option<AbcCategory>, lift_factor: f64) -> f64 {
        let mut discount = if proposed.is_finite() && proposed > 0.0 {
            proposed.clamp(self.floor, self.ceiling)
        } else {
            0.0
        };
        match category {
            Some(AbcCategory::A) => discount = discount.min(self.category_a_cap),
            Some(AbcCategory::B) => discount = discount.min(self.category_b_cap),
            Some(AbcCategory::C) if lift_factor > 0.0 => {
                discount = discount.max(self.category_c_floor)
            }
            _ => {}
        }
        discount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChurnEstimate {
    pub probability: f64,
    pub source: EstimateSource,
}

/// Answers churn questions for retention code, degrading to the policy's
/// fallback when the model cannot.
pub struct RetentionAdvisor<'a> {
    cache: &'a ModelCache,
    policy: &'a RetentionPolicy,
}

impl<'a> RetentionAdvisor<'a> {
    pub fn new(cache: &'a ModelCache, policy: &'a RetentionPolicy) -> Self {
        Self { cache, policy }
    }

    /// Model churn probability, or the fallback on `ModelNotTrained` and
    /// numerical failures. Other errors are returned.
    pub fn churn_estimate(
        &self,
        subject: &SubjectId,
        features: Option<&FeatureVector>,
    ) -> Result<ChurnEstimate, SurvivalError> {
        match self.cache.predict_churn_probability(subject, features) {
            Ok(probability) => Ok(ChurnEstimate {
                probability,
                source: EstimateSource::Model,
            }),
            Err(err @ (SurvivalError::ModelNotTrained | SurvivalError::Numerical { .. })) => {
                log::debug!(
                    "using fallback churn probability {} for {subject}: {err}",
                    self.policy.fallback_churn_probability
                );
                Ok(ChurnEstimate {
                    probability: self.policy.fallback_churn_probability,
                    source: EstimateSource::Fallback,
                })
            }
            Err(err) => Err(err),
        }
    }

    pub fn bound_discount(
        &self,
        proposed: f64,
        category: Option<AbcCategory>,
        lift_factor: f64,
    ) -> f64 {
        self.policy.discount.bound(proposed, category, lift_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TrainingSample;
    use approx::assert_abs_diff_eq;

    #[test]
    fn category_caps_apply_after_global_bounds() {
        let bounds = DiscountBounds::default();
        assert_abs_diff_eq!(bounds.bound(0.45, Some(AbcCategory::A), 0.0), 0.2);
        assert_abs_diff_eq!(bounds.bound(0.45, Some(AbcCategory::B), 0.0), 0.3);
        assert_abs_diff_eq!(bounds.bound(0.9, None, 0.0), 0.5);
        assert_abs_diff_eq!(bounds.bound(0.01, None, 0.0), 0.05);
    }

    #[test]
    fn category_c_floor_needs_positive_lift() {
        let bounds = DiscountBounds::default();
        assert_abs_diff_eq!(bounds.bound(0.06, Some(AbcCategory::C), 1.2), 0.1);
        assert_abs_diff_eq!(bounds.bound(0.06, Some(AbcCategory::C), 0.0), 0.06);
        assert_abs_diff_eq!(bounds.bound(-0.3, Some(AbcCategory::C), 0.5), 0.1);
        assert_abs_diff_eq!(bounds.bound(-0.3, Some(AbcCategory::A), 0.5), 0.0);
    }

    #[test]
    fn untrained_model_falls_back() {
        let cache = ModelCache::default();
        let policy = RetentionPolicy::default();
        let advisor = RetentionAdvisor::new(&cache, &policy);
        let estimate = advisor.churn_estimate(&"u1".into(), None).unwrap();
        assert_eq!(estimate.source, EstimateSource::Fallback);
        assert_abs_diff_eq!(estimate.probability, 0.2);
    }

    #[test]
    fn missing_subject_is_not_masked() {
        let cache = ModelCache::default();
        let samples: Vec<_> = [(1.0, 3.0, true), (0.0, 6.0, true), (0.5, 9.0, false)]
            .iter()
            .map(|&(x, t, e)| {
                TrainingSample::new(FeatureVector::new([x, 0.0, 0.0, 0.0, 0.0, 0.0]), t, e)
                    .unwrap()
            })
            .collect();
        cache.build_cox_model(&samples).unwrap();
        let policy = RetentionPolicy::default();
        let advisor = RetentionAdvisor::new(&cache, &policy);
        assert!(matches!(
            advisor.churn_estimate(&"nobody".into(), None),
            Err(SurvivalError::SubjectNotFound(_))
        ));
        let estimate = advisor
            .churn_estimate(&"somebody".into(), Some(&FeatureVector::default()))
            .unwrap();
        assert_eq!(estimate.source, EstimateSource::Model);
    }

    #[test]
    fn category_labels_parse() {
        assert_eq!("b".parse::<AbcCategory>().unwrap(), AbcCategory::B);
        assert!("D".parse::<AbcCategory>().is_err());
    }
}
