use crate::error::SurvivalError;
use crate::risk_set::RiskSets;
use ndarray::{Array1, Array2, ArrayView1};

/// Log-likelihood and its derivatives at one coefficient vector.
#[derive(Debug, Clone)]
pub struct WorkingState {
    pub log_likelihood: f64,
    pub gradient: Array1<f64>,
    /// Observed information, the negated Hessian. Positive semi-definite.
    pub information: Array2<f64>,
}

/// A model the Newton driver can evaluate at arbitrary coefficients.
pub trait WorkingModel {
    fn num_coefficients(&self) -> usize;
    fn update(&mut self, beta: &Array1<f64>) -> Result<WorkingState, SurvivalError>;
}

/// Cox partial likelihood over a fixed design and risk-set structure.
pub struct CoxPartialLikelihood {
    design: Array2<f64>,
    risk_sets: RiskSets,
}

impl CoxPartialLikelihood {
    pub fn new(design: Array2<f64>, risk_sets: RiskSets) -> Result<Self, SurvivalError> {
        if design.nrows() == 0 {
            return Err(SurvivalError::insufficient("no samples"));
        }
        if design.ncols() == 0 {
            return Err(SurvivalError::insufficient("no predictors"));
        }
        if risk_sets.is_empty() {
            return Err(SurvivalError::insufficient("no events observed"));
        }
        if design.iter().any(|v| !v.is_finite()) {
            return Err(SurvivalError::NonFiniteInput { field: "features" });
        }
        Ok(Self { design, risk_sets })
    }

    pub fn risk_sets(&self) -> &RiskSets {
        &self.risk_sets
    }
}

fn add_scaled_outer(target: &mut Array2<f64>, scale: f64, x: ArrayView1<'_, f64>) {
    let p = x.len();
    for j in 0..p {
        let xj = scale * x[j];
        for k in 0..=j {
            target[(j, k)] += xj * x[k];
        }
    }
}

fn mirror_lower(target: &mut Array2<f64>) {
    let p = target.nrows();
    for j in 0..p {
        for k in 0..j {
            target[(k, j)] = target[(j, k)];
        }
    }
}

impl WorkingModel for CoxPartialLikelihood {
    fn num_coefficients(&self) -> usize {
        self.design.ncols()
    }

    fn update(&mut self, beta: &Array1<f64>) -> Result<WorkingState, SurvivalError> {
        if beta.len() != self.design.ncols() {
            return Err(SurvivalError::DimensionMismatch);
        }
        let eta = self.design.dot(beta);
        if eta.iter().any(|v| !v.is_finite()) {
            return Err(SurvivalError::numerical("linear predictor became non-finite"));
        }

        // Shift by the largest predictor so exp() cannot overflow; every quantity
        // below is a ratio of risk-set sums, which the shift leaves unchanged.
        let shift = eta.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights = eta.mapv(|e| (e - shift).exp());

        let p = self.design.ncols();
        let mut gradient = Array1::<f64>::zeros(p);
        let mut information = Array2::<f64>::zeros((p, p));
        let mut log_likelihood = 0.0;

        for risk_set in self.risk_sets.iter() {
            let mut s0 = 0.0;
            let mut s1 = Array1::<f64>::zeros(p);
            let mut s2 = Array2::<f64>::zeros((p, p));
            for &i in risk_set.members {
                let w = weights[i];
                let x = self.design.row(i);
                s0 += w;
                s1.scaled_add(w, &x);
                add_scaled_outer(&mut s2, w, x);
            }
            if !(s0.is_finite() && s0 > 0.0) {
                return Err(SurvivalError::numerical(format!(
                    "risk-set weight sum at t={} is {s0}",
                    risk_set.time
                )));
            }
            mirror_lower(&mut s2);

            let mean = &s1 / s0;
            let mut covariance = &s2 / s0;
            for j in 0..p {
                for k in 0..p {
                    covariance[(j, k)] -= mean[j] * mean[k];
                }
            }

            let log_s0 = s0.ln() + shift;
            for &d in risk_set.events {
                gradient += &self.design.row(d);
                gradient -= &mean;
                information += &covariance;
                log_likelihood += eta[d] - log_s0;
            }
        }

        Ok(WorkingState {
            log_likelihood,
            gradient,
            information,
        })
    }
}
