use crate::config::EngineConfig;
use crate::error::SurvivalError;
use crate::linalg::SpdFactor;
use crate::working::{WorkingModel, WorkingState};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Relative slack when comparing penalised log-likelihoods, so a step that only
/// loses to rounding near the optimum is still accepted.
const ACCEPT_SLACK: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct NewtonOptions {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub ridge_lambda: f64,
    pub singular_ridge_boost: f64,
    pub max_step_halvings: usize,
}

impl From<&EngineConfig> for NewtonOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            ridge_lambda: config.ridge_lambda,
            singular_ridge_boost: config.singular_ridge_boost,
            max_step_halvings: config.max_step_halvings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewtonStatus {
    Converged,
    MaxIterations,
    /// No halving of the Newton step improved the objective.
    Stalled,
}

#[derive(Debug, Clone)]
pub struct NewtonResult {
    pub beta: Array1<f64>,
    pub penalized_log_likelihood: f64,
    pub gradient: Array1<f64>,
    pub status: NewtonStatus,
    pub iterations: usize,
    pub penalized_information: Array2<f64>,
    pub used_singular_fallback: bool,
}

struct Penalized {
    log_likelihood: f64,
    gradient: Array1<f64>,
    information: Array2<f64>,
}

fn penalize(beta: &Array1<f64>, state: WorkingState, lambda: f64) -> Penalized {
    let WorkingState {
        log_likelihood,
        mut gradient,
        mut information,
    } = state;
    gradient.scaled_add(-lambda, beta);
    information.diag_mut().mapv_inplace(|d| d + lambda);
    Penalized {
        log_likelihood: log_likelihood - 0.5 * lambda * beta.dot(beta),
        gradient,
        information,
    }
}

/// Solves `information * step = gradient`. On a failed factorization the
/// diagonal is boosted once and the solve retried.
fn newton_step(
    information: &Array2<f64>,
    gradient: &Array1<f64>,
    boost: f64,
) -> Result<(Array1<f64>, bool), SurvivalError> {
    let solve = |factor: SpdFactor| {
        factor
            .solve(gradient)
            .map_err(|err| SurvivalError::numerical(err.to_string()))
    };
    match SpdFactor::new(information) {
        Ok(factor) => Ok((solve(factor)?, false)),
        Err(first) => {
            log::warn!(
                "information matrix not positive definite ({first}); retrying with diagonal boost {boost}"
            );
            let mut boosted = information.clone();
            boosted.diag_mut().mapv_inplace(|d| d + boost);
            let factor = SpdFactor::new(&boosted).map_err(|err| {
                SurvivalError::numerical(format!(
                    "information matrix is singular even after ridge boost: {err}"
                ))
            })?;
            Ok((solve(factor)?, true))
        }
    }
}

fn max_abs(values: &Array1<f64>) -> f64 {
    values.iter().map(|v| v.abs()).fold(0.0, f64::max)
}

fn finish(
    beta: Array1<f64>,
    current: Penalized,
    status: NewtonStatus,
    iterations: usize,
    used_singular_fallback: bool,
) -> Result<NewtonResult, SurvivalError> {
    if beta.iter().any(|v| !v.is_finite()) {
        return Err(SurvivalError::numerical("coefficients became non-finite"));
    }
    Ok(NewtonResult {
        beta,
        penalized_log_likelihood: current.log_likelihood,
        gradient: current.gradient,
        status,
        iterations,
        penalized_information: current.information,
        used_singular_fallback,
    })
}

/// Maximises the ridge-penalised log-likelihood of `model` from `beta = 0`.
pub fn run_newton<M: WorkingModel>(
    model: &mut M,
    options: &NewtonOptions,
) -> Result<NewtonResult, SurvivalError> {
    let lambda = options.ridge_lambda;
    let mut beta = Array1::<f64>::zeros(model.num_coefficients());
    let mut current = penalize(&beta, model.update(&beta)?, lambda);
    let mut used_singular_fallback = false;

    for iteration in 0..options.max_iterations {
        let (mut step, fell_back) =
            newton_step(&current.information, &current.gradient, options.singular_ridge_boost)?;
        used_singular_fallback |= fell_back;

        let mut halvings = 0;
        let accepted = loop {
            let trial = &beta + &step;
            let evaluated = match model.update(&trial) {
                Ok(state) => Some(penalize(&trial, state, lambda)),
                Err(SurvivalError::Numerical { .. }) => None,
                Err(err) => return Err(err),
            };
            if let Some(candidate) = evaluated {
                let slack = ACCEPT_SLACK * (1.0 + current.log_likelihood.abs());
                if candidate.log_likelihood.is_finite()
                    && candidate.log_likelihood + slack >= current.log_likelihood
                {
                    break Some((trial, candidate));
                }
            }
            if halvings == options.max_step_halvings {
                break None;
            }
            step.mapv_inplace(|v| 0.5 * v);
            halvings += 1;
        };

        let Some((trial, candidate)) = accepted else {
            log::warn!(
                "Newton iteration {} could not improve the penalised log-likelihood after {} step halvings",
                iteration + 1,
                options.max_step_halvings
            );
            return finish(
                beta,
                current,
                NewtonStatus::Stalled,
                iteration,
                used_singular_fallback,
            );
        };

        beta = trial;
        current = candidate;
        let change = max_abs(&step);
        log::debug!(
            "Newton iteration {}: penalised loglik {:.6}, max |step| {:.3e}, halvings {}",
            iteration + 1,
            current.log_likelihood,
            change,
            halvings
        );

        if change < options.tolerance {
            return finish(
                beta,
                current,
                NewtonStatus::Converged,
                iteration + 1,
                used_singular_fallback,
            );
        }
    }

    log::warn!(
        "Newton-Raphson did not converge within {} iterations; keeping the last coefficients",
        options.max_iterations
    );
    finish(
        beta,
        current,
        NewtonStatus::MaxIterations,
        options.max_iterations,
        used_singular_fallback,
    )
}
