use crate::baseline::BaselineHazard;
use crate::error::SurvivalError;
use itertools::Itertools;

/// Survival probabilities for one subject at each baseline time point.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalCurve {
    linear_predictor: f64,
    probabilities: Vec<f64>,
}

/// `S(t_k) = exp(-H0(t_k) * exp(lp))`, kept strictly positive.
pub fn survival_curve(
    linear_predictor: f64,
    baseline: &BaselineHazard,
) -> Result<SurvivalCurve, SurvivalError> {
    if !linear_predictor.is_finite() {
        return Err(SurvivalError::numerical(format!(
            "linear predictor is {linear_predictor}"
        )));
    }
    let relative_risk = linear_predictor.exp();
    let probabilities = baseline
        .cumulative_hazard()
        .iter()
        .map(|&h| {
            if h == 0.0 {
                1.0
            } else {
                (-h * relative_risk).exp().clamp(f64::MIN_POSITIVE, 1.0)
            }
        })
        .collect();
    Ok(SurvivalCurve {
        linear_predictor,
        probabilities,
    })
}

impl SurvivalCurve {
    pub fn linear_predictor(&self) -> f64 {
        self.linear_predictor
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// `1 - S(t_last)`, or `neutral` when the curve has no points.
    pub fn churn_probability(&self, neutral: f64) -> f64 {
        match self.probabilities.last() {
            Some(&last) => (1.0 - last).clamp(0.0, 1.0),
            None => neutral,
        }
    }

    /// Trapezoidal area under the curve between the first and last time point.
    pub fn expected_time_to_event(&self, baseline: &BaselineHazard) -> Result<f64, SurvivalError> {
        if baseline.len() != self.probabilities.len() {
            return Err(SurvivalError::DimensionMismatch);
        }
        if self.probabilities.len() < 2 {
            return Err(SurvivalError::insufficient(
                "expected time-to-event needs at least two time points",
            ));
        }
        Ok(baseline
            .time_points()
            .iter()
            .zip(&self.probabilities)
            .tuple_windows()
            .map(|((t0, s0), (t1, s1))| 0.5 * (s0 + s1) * (t1 - t0))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn baseline() -> BaselineHazard {
        BaselineHazard::new(vec![1.0, 3.0, 6.0], vec![0.1, 0.4, 0.9]).unwrap()
    }

    #[test]
    fn zero_linear_predictor_uses_baseline_directly() {
        let curve = survival_curve(0.0, &baseline()).unwrap();
        let expected = [(-0.1_f64).exp(), (-0.4_f64).exp(), (-0.9_f64).exp()];
        for (got, want) in curve.probabilities().iter().zip(expected) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(
            curve.churn_probability(0.5),
            1.0 - (-0.9_f64).exp(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn curve_is_monotone_and_bounded() {
        for lp in [-30.0, -2.0, 0.0, 1.5, 40.0] {
            let curve = survival_curve(lp, &baseline()).unwrap();
            let probs = curve.probabilities();
            assert!(probs.iter().all(|&s| s > 0.0 && s <= 1.0));
            assert!(probs.windows(2).all(|w| w[1] <= w[0]));
        }
    }

    #[test]
    fn higher_risk_means_higher_churn() {
        let low = survival_curve(-1.0, &baseline()).unwrap().churn_probability(0.5);
        let high = survival_curve(1.0, &baseline()).unwrap().churn_probability(0.5);
        assert!(high > low);
    }

    #[test]
    fn empty_curve_reports_neutral_probability() {
        let curve = survival_curve(0.3, &BaselineHazard::default()).unwrap();
        assert!(curve.is_empty());
        assert_eq!(curve.churn_probability(0.5), 0.5);
    }

    #[test]
    fn expected_time_is_trapezoid_area() {
        let base = baseline();
        let curve = survival_curve(0.0, &base).unwrap();
        let s: Vec<f64> = curve.probabilities().to_vec();
        let expected = 0.5 * (s[0] + s[1]) * 2.0 + 0.5 * (s[1] + s[2]) * 3.0;
        assert_abs_diff_eq!(
            curve.expected_time_to_event(&base).unwrap(),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn expected_time_needs_two_points() {
        let base = BaselineHazard::new(vec![2.0], vec![0.2]).unwrap();
        let curve = survival_curve(0.0, &base).unwrap();
        assert!(matches!(
            curve.expected_time_to_event(&base),
            Err(SurvivalError::InsufficientData { .. })
        ));
    }
}
