use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    cooling_step::{CoolingStep, ParameterStatistics},
    error::{AnnealError, Result},
    metropolis::{AcceptanceStats, Metropolis, MetropolisSettings},
    model::Model,
    resample::ResampleSummary,
    scheduler::{CovScheduler, CovSettings},
};

/// Settings for a complete annealing run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealerSettings {
    /// The number of particles in the ensemble
    pub chains: usize,
    /// The run stops once `beta + beta_tolerance >= 1`.
    pub beta_tolerance: f64,
    /// Hard cap on the number of annealing stages.
    pub max_stages: u64,
    pub seed: u64,
    pub cov: CovSettings,
    pub metropolis: MetropolisSettings,
}

impl Default for AnnealerSettings {
    fn default() -> Self {
        Self {
            chains: 1024,
            beta_tolerance: 1e-3,
            max_stages: 1000,
            seed: 0,
            cov: CovSettings::default(),
            metropolis: MetropolisSettings::default(),
        }
    }
}

impl AnnealerSettings {
    /// Parse settings from a TOML document; missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: Self = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chains < 2 {
            return Err(AnnealError::InvalidSettings(format!(
                "need at least two chains, got {}",
                self.chains
            )));
        }
        if !(self.beta_tolerance >= 0. && self.beta_tolerance < 1.) {
            return Err(AnnealError::InvalidSettings(format!(
                "beta tolerance must be in [0, 1), got {}",
                self.beta_tolerance
            )));
        }
        self.cov.validate()?;
        self.metropolis.validate()
    }
}

/// Everything that happened during one annealing stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub iteration: u64,
    pub beta: f64,
    pub dbeta: f64,
    pub cov: f64,
    pub resample: ResampleSummary,
    pub acceptance: AcceptanceStats,
    /// Proposal scaling used for the next stage
    pub scaling: f64,
    pub statistics: ParameterStatistics,
}

/// The final ensemble and the history of the run.
#[derive(Debug, Clone)]
pub struct AnnealingTrace {
    pub step: CoolingStep,
    pub stages: Vec<StageRecord>,
}

impl AnnealingTrace {
    pub fn beta(&self) -> f64 {
        self.step.beta()
    }

    /// True when the run reached the posterior rather than the stage cap.
    pub fn converged(&self, settings: &AnnealerSettings) -> bool {
        self.step.beta() + settings.beta_tolerance >= 1.
    }
}

/// Drives a model from its prior to its posterior: cool, resample, walk,
/// repeat.
#[derive(Debug)]
pub struct Annealer {
    settings: AnnealerSettings,
    scheduler: CovScheduler<ChaCha8Rng>,
    sampler: Metropolis,
}

impl Annealer {
    pub fn new(settings: AnnealerSettings) -> Result<Self> {
        settings.validate()?;
        let scheduler = CovScheduler::seeded(settings.seed, settings.cov)?;
        let sampler = Metropolis::new(settings.metropolis)?;
        Ok(Self {
            settings,
            scheduler,
            sampler,
        })
    }

    pub fn settings(&self) -> &AnnealerSettings {
        &self.settings
    }

    /// Build the first cooling step from samples of the model's prior.
    pub fn start<M: Model>(&mut self, model: &M) -> Result<CoolingStep> {
        let chains = self.settings.chains;
        let parameters = model.parameters();
        let mut step = CoolingStep::new(chains, parameters);
        let mut sample = vec![0f64; parameters];
        for row in 0..chains {
            model
                .init_sample(self.scheduler.rng(), &mut sample)
                .map_err(AnnealError::Model)?;
            let densities = model
                .densities(&sample, step.beta())
                .map_err(AnnealError::Model)?;
            step.set_particle(row, &sample, densities);
        }
        Ok(step)
    }

    /// Run one annealing stage on `step`.
    pub fn stage<M: Model>(&mut self, model: &M, step: &mut CoolingStep) -> Result<StageRecord> {
        let cooling = self.scheduler.update(step)?;
        step.iteration += 1;
        step.update_posterior();

        let acceptance = self.sampler.walk(model, step, self.scheduler.rng())?;
        let scaling = self.sampler.adjust_scaling(&acceptance);
        let statistics = step.parameter_statistics();

        info!(
            iteration = step.iteration,
            beta = cooling.beta,
            dbeta = cooling.dbeta,
            cov = cooling.cov,
            unique = cooling.resample.unique,
            acceptance = acceptance.acceptance_rate(),
            scaling,
            "annealing stage"
        );

        Ok(StageRecord {
            iteration: step.iteration,
            beta: cooling.beta,
            dbeta: cooling.dbeta,
            cov: cooling.cov,
            resample: cooling.resample,
            acceptance,
            scaling,
            statistics,
        })
    }

    /// Anneal `model` from its prior until the temperature reaches one or the
    /// stage cap is hit.
    pub fn run<M: Model>(&mut self, model: &M) -> Result<AnnealingTrace> {
        let mut step = self.start(model)?;
        let mut stages = Vec::new();
        while step.beta() + self.settings.beta_tolerance < 1.
            && (stages.len() as u64) < self.settings.max_stages
        {
            stages.push(self.stage(model, &mut step)?);
        }
        info!(
            beta = step.beta(),
            stages = stages.len(),
            "annealing finished"
        );
        Ok(AnnealingTrace { step, stages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_toml_settings() {
        let settings = AnnealerSettings::from_toml_str(
            r#"
            chains = 64
            seed = 7

            [cov]
            solver = "grid"
            tolerance = 0.01

            [metropolis]
            steps = 3
            "#,
        )
        .unwrap();
        assert_eq!(settings.chains, 64);
        assert_eq!(settings.seed, 7);
        assert_eq!(settings.cov.solver, crate::dbeta::SolverKind::Grid);
        assert_eq!(settings.cov.tolerance, 0.01);
        assert_eq!(settings.cov.target, 1.);
        assert_eq!(settings.metropolis.steps, 3);
        assert_eq!(settings.metropolis.scaling, 0.1);

        assert!(matches!(
            AnnealerSettings::from_toml_str("chains = 1"),
            Err(AnnealError::InvalidSettings(_))
        ));
        assert!(matches!(
            AnnealerSettings::from_toml_str("chains = \"many\""),
            Err(AnnealError::Config(_))
        ));
        assert!(matches!(
            AnnealerSettings::from_toml_str("[cov]\nbeta_max = 0.5"),
            Err(AnnealError::InvalidSettings(_))
        ));
    }

    #[test]
    fn check_default_roundtrip_through_toml() {
        let text = toml::to_string(&AnnealerSettings::default()).unwrap();
        let parsed = AnnealerSettings::from_toml_str(&text).unwrap();
        assert_eq!(parsed, AnnealerSettings::default());
    }
}
