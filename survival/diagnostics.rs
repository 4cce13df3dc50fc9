//! Fit-quality measures for a trained model.

use crate::data::TrainingSample;
use crate::error::SurvivalError;
use crate::model::CoxModel;
use rayon::prelude::*;

/// Harrell's concordance for one model on one sample set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Concordance {
    /// Concordant pairs plus half the tied pairs, over comparable pairs.
    pub index: f64,
    pub comparable_pairs: u64,
    pub concordant_pairs: u64,
    pub tied_pairs: u64,
}

/// Harrell's C.
///
/// A pair is comparable when the subject with the shorter time had an event
/// (or both share a time and only one had an event). It is concordant when
/// that subject also has the larger linear predictor.
pub fn concordance_index(
    model: &CoxModel,
    samples: &[TrainingSample],
) -> Result<Concordance, SurvivalError> {
    let risk: Vec<f64> = samples
        .iter()
        .map(|s| model.linear_predictor(s.features()))
        .collect::<Result<_, _>>()?;

    let (comparable, concordant, tied) = (0..samples.len())
        .into_par_iter()
        .filter(|&i| samples[i].event_occurred())
        .map(|i| {
            let ti = samples[i].time_to_event();
            let mut counts = (0u64, 0u64, 0u64);
            for (j, other) in samples.iter().enumerate() {
                let tj = other.time_to_event();
                let comparable = ti < tj || (ti == tj && !other.event_occurred());
                if j == i || !comparable {
                    continue;
                }
                counts.0 += 1;
                if risk[i] > risk[j] {
                    counts.1 += 1;
                } else if risk[i] == risk[j] {
                    counts.2 += 1;
                }
            }
            counts
        })
        .reduce(|| (0, 0, 0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));

    if comparable == 0 {
        return Err(SurvivalError::insufficient(
            "no comparable pairs for the concordance index",
        ));
    }
    Ok(Concordance {
        index: (concordant as f64 + 0.5 * tied as f64) / comparable as f64,
        comparable_pairs: comparable,
        concordant_pairs: concordant,
        tied_pairs: tied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::BaselineHazard;
    use crate::model::{FitReport, MODEL_FORMAT_VERSION};
    use crate::newton::NewtonStatus;
    use crate::predictor::{CoefficientVector, FeatureVector};
    use approx::assert_abs_diff_eq;

    fn model_with_recency_weight(weight: f64) -> CoxModel {
        CoxModel {
            format_version: MODEL_FORMAT_VERSION,
            coefficients: CoefficientVector([weight, 0.0, 0.0, 0.0, 0.0, 0.0]),
            baseline: BaselineHazard::default(),
            fit: FitReport {
                iterations: 1,
                status: NewtonStatus::Converged,
                penalized_log_likelihood: 0.0,
                num_samples: 0,
                num_events: 0,
                used_singular_fallback: false,
            },
        }
    }

    fn sample(x: f64, time: f64, event: bool) -> TrainingSample {
        TrainingSample::new(FeatureVector::new([x, 0.0, 0.0, 0.0, 0.0, 0.0]), time, event).unwrap()
    }

    fn ordered_samples() -> Vec<TrainingSample> {
        vec![
            sample(4.0, 1.0, true),
            sample(3.0, 2.0, true),
            sample(2.0, 3.0, false),
            sample(1.0, 4.0, true),
        ]
    }

    #[test]
    fn perfectly_ordered_risk_scores_one() {
        let c = concordance_index(&model_with_recency_weight(1.0), &ordered_samples()).unwrap();
        // Comparable: (0,1) (0,2) (0,3) (1,2) (1,3); subject 2 is censored.
        assert_eq!(c.comparable_pairs, 5);
        assert_abs_diff_eq!(c.index, 1.0);
    }

    #[test]
    fn reversed_risk_scores_zero() {
        let c = concordance_index(&model_with_recency_weight(-1.0), &ordered_samples()).unwrap();
        assert_abs_diff_eq!(c.index, 0.0);
    }

    #[test]
    fn constant_risk_scores_one_half() {
        let c = concordance_index(&model_with_recency_weight(0.0), &ordered_samples()).unwrap();
        assert_eq!(c.tied_pairs, c.comparable_pairs);
        assert_abs_diff_eq!(c.index, 0.5);
    }

    #[test]
    fn all_censored_has_no_comparable_pairs() {
        let samples = vec![sample(1.0, 1.0, false), sample(2.0, 2.0, false)];
        assert!(matches!(
            concordance_index(&model_with_recency_weight(1.0), &samples),
            Err(SurvivalError::InsufficientData { .. })
        ));
    }
}
