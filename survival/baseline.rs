use crate::data::TrainingSample;
use crate::error::SurvivalError;
use crate::predictor::CoefficientVector;
use serde::{Deserialize, Serialize};

/// Breslow cumulative baseline hazard, one entry per distinct event time.
///
/// `time_points` is strictly increasing and `cumulative_hazard` is
/// non-decreasing and non-negative; both have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineHazard {
    time_points: Vec<f64>,
    cumulative_hazard: Vec<f64>,
}

impl BaselineHazard {
    /// Builds a baseline from stored values, checking its invariants.
    pub fn new(time_points: Vec<f64>, cumulative_hazard: Vec<f64>) -> Result<Self, SurvivalError> {
        let baseline = Self {
            time_points,
            cumulative_hazard,
        };
        baseline.validate()?;
        Ok(baseline)
    }

    pub fn validate(&self) -> Result<(), SurvivalError> {
        if self.time_points.len() != self.cumulative_hazard.len() {
            return Err(SurvivalError::DimensionMismatch);
        }
        if self.time_points.iter().any(|t| !t.is_finite()) {
            return Err(SurvivalError::NonFiniteInput {
                field: "time_points",
            });
        }
        if self.cumulative_hazard.iter().any(|h| !h.is_finite()) {
            return Err(SurvivalError::NonFiniteInput {
                field: "cumulative_hazard",
            });
        }
        if self.time_points.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SurvivalError::numerical(
                "baseline time points must be strictly increasing",
            ));
        }
        if self.cumulative_hazard.first().is_some_and(|h| *h < 0.0)
            || self.cumulative_hazard.windows(2).any(|w| w[0] > w[1])
        {
            return Err(SurvivalError::numerical(
                "cumulative hazard must be non-negative and non-decreasing",
            ));
        }
        Ok(())
    }

    /// Breslow estimator for fitted `coefficients`.
    ///
    /// Each event contributes `1 / sum(exp(lp))` over its risk set; tied events
    /// each contribute and share one time point.
    pub fn estimate(
        samples: &[TrainingSample],
        coefficients: &CoefficientVector,
    ) -> Result<Self, SurvivalError> {
        if samples.is_empty() {
            return Err(SurvivalError::insufficient(
                "cannot estimate a baseline hazard without samples",
            ));
        }

        let risk: Vec<f64> = samples
            .iter()
            .map(|s| coefficients.linear_predictor(s.features()).exp())
            .collect();
        if risk.iter().any(|r| !r.is_finite()) {
            return Err(SurvivalError::numerical(
                "relative risk overflowed while estimating the baseline hazard",
            ));
        }

        let mut order: Vec<usize> = (0..samples.len()).collect();
        order.sort_by(|&a, &b| {
            samples[a]
                .time_to_event()
                .total_cmp(&samples[b].time_to_event())
        });

        // at_risk[k] = total risk of subjects at sorted positions k..n
        let mut at_risk = vec![0.0; order.len() + 1];
        for k in (0..order.len()).rev() {
            at_risk[k] = at_risk[k + 1] + risk[order[k]];
        }

        let mut time_points = Vec::new();
        let mut cumulative_hazard = Vec::new();
        let mut running = 0.0;
        let mut group_start = 0;
        for k in 0..order.len() {
            let sample = &samples[order[k]];
            let time = sample.time_to_event();
            if time != samples[order[group_start]].time_to_event() {
                group_start = k;
            }
            if !sample.event_occurred() {
                continue;
            }
            let risk_sum = at_risk[group_start];
            if !risk_sum.is_finite() {
                return Err(SurvivalError::numerical(format!(
                    "risk sum at t={time} is {risk_sum}"
                )));
            }
            // Every weight underflowed; the time carries no hazard information.
            if risk_sum <= 0.0 {
                continue;
            }
            running += 1.0 / risk_sum;
            if time_points.last() == Some(&time) {
                if let Some(last) = cumulative_hazard.last_mut() {
                    *last = running;
                }
            } else {
                time_points.push(time);
                cumulative_hazard.push(running);
            }
        }

        Ok(Self {
            time_points,
            cumulative_hazard,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.time_points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.time_points.is_empty()
    }

    pub fn time_points(&self) -> &[f64] {
        &self.time_points
    }

    pub fn cumulative_hazard(&self) -> &[f64] {
        &self.cumulative_hazard
    }
}
