use faer::Mat;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    cooling_step::CoolingStep,
    covariance::{condition_matrix, weighted_covariance, CONDITION_RATIO},
    dbeta::{solve, DbetaOutcome, SolverKind},
    error::{AnnealError, Result},
    math::median,
    resample::{rank_and_shuffle, ResampleSummary},
};

/// Settings for the CoV annealing schedule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CovSettings {
    /// Accept a temperature increment once the weight CoV is this close to `target`.
    pub tolerance: f64,
    /// Upper bound on solver iterations per increment.
    pub max_iterations: u64,
    /// The desired coefficient of variation of the importance weights.
    pub target: f64,
    pub beta_min: f64,
    pub beta_max: f64,
    pub solver: SolverKind,
    /// Eigenvalues of the proposal covariance are floored at this fraction of
    /// the largest one.
    pub condition_ratio: f64,
}

impl Default for CovSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            max_iterations: 1000,
            target: 1.0,
            beta_min: 0.,
            beta_max: 1.,
            solver: SolverKind::Brent,
            condition_ratio: CONDITION_RATIO,
        }
    }
}

impl CovSettings {
    pub fn validate(&self) -> Result<()> {
        if self.beta_min != 0. || self.beta_max != 1. {
            return Err(AnnealError::InvalidSettings(format!(
                "temperature range must be [0, 1], got [{}, {}]",
                self.beta_min, self.beta_max
            )));
        }
        if !(self.tolerance > 0. && self.tolerance.is_finite()) {
            return Err(AnnealError::InvalidSettings(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.target > 0. && self.target.is_finite()) {
            return Err(AnnealError::InvalidSettings(format!(
                "target CoV must be positive, got {}",
                self.target
            )));
        }
        if self.max_iterations == 0 {
            return Err(AnnealError::InvalidSettings(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.condition_ratio > 0. && self.condition_ratio < 1.) {
            return Err(AnnealError::InvalidSettings(format!(
                "condition ratio must be in (0, 1), got {}",
                self.condition_ratio
            )));
        }
        Ok(())
    }
}

/// The result of pushing one cooling step forward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoolingSummary {
    pub beta: f64,
    pub dbeta: f64,
    pub cov: f64,
    /// Median data log-likelihood before resampling
    pub median: f64,
    pub resample: ResampleSummary,
}

/// Annealing schedule that keeps the CoV of the importance weights near a
/// target value; after Ching & Chen (2007).
///
/// The scheduler owns its random stream and nothing else that changes between
/// calls: the temperature lives on the [`CoolingStep`] and each increment is
/// reported back through [`DbetaOutcome`].
#[derive(Debug)]
pub struct CovScheduler<R: Rng> {
    settings: CovSettings,
    rng: R,
}

impl CovScheduler<ChaCha8Rng> {
    pub fn seeded(seed: u64, settings: CovSettings) -> Result<Self> {
        Self::new(ChaCha8Rng::seed_from_u64(seed), settings)
    }
}

impl<R: Rng> CovScheduler<R> {
    pub fn new(rng: R, settings: CovSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings, rng })
    }

    pub fn settings(&self) -> &CovSettings {
        &self.settings
    }

    /// The random stream, shared with whoever mutates the ensemble between stages.
    pub fn rng(&mut self) -> &mut R {
        &mut self.rng
    }

    /// Solve for the next temperature increment from temperature `beta`.
    ///
    /// `weights` receives the normalized importance weights at the accepted
    /// increment; it must be as long as `llk`.
    pub fn dbeta(
        &self,
        llk: &[f64],
        median: f64,
        beta: f64,
        weights: &mut [f64],
    ) -> Result<DbetaOutcome> {
        solve(
            &self.settings.solver,
            llk,
            median,
            beta,
            weights,
            &self.settings,
        )
    }

    /// Store the conditioned weighted covariance of the step's samples in its `sigma`.
    pub fn compute_covariance(&self, step: &mut CoolingStep, weights: &[f64]) -> Result<()> {
        let sigma = weighted_covariance(step.theta(), weights)?;
        let sigma = self.condition_covariance(&sigma)?;
        step.set_sigma(sigma);
        Ok(())
    }

    pub fn condition_covariance(&self, sigma: &Mat<f64>) -> Result<Mat<f64>> {
        condition_matrix(sigma, self.settings.condition_ratio)
    }

    pub fn rank_and_shuffle(
        &mut self,
        step: &mut CoolingStep,
        weights: &[f64],
    ) -> Result<ResampleSummary> {
        rank_and_shuffle(step, weights, &mut self.rng)
    }

    /// Advance `step` along the cooling schedule.
    ///
    /// Chooses the next temperature, estimates the proposal covariance from the
    /// current samples and resamples the ensemble according to the new
    /// importance weights.
    pub fn update(&mut self, step: &mut CoolingStep) -> Result<CoolingSummary> {
        let samples = step.samples();
        if samples < 2 {
            return Err(AnnealError::TooFewSamples(samples));
        }

        let median = median(step.data());
        let mut weights = vec![0f64; samples];
        let outcome = self.dbeta(step.data(), median, step.beta(), &mut weights)?;
        step.set_beta(outcome.beta)?;

        self.compute_covariance(step, &weights)?;
        let resample = self.rank_and_shuffle(step, &weights)?;

        debug!(
            beta = outcome.beta,
            dbeta = outcome.dbeta,
            cov = outcome.cov,
            unique = resample.unique,
            "cooling step updated"
        );

        Ok(CoolingSummary {
            beta: outcome.beta,
            dbeta: outcome.dbeta,
            cov: outcome.cov,
            median,
            resample,
        })
    }
}
