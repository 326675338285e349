//! Annealed sequential Monte Carlo.
//!
//! A population of parameter samples is carried from the prior (`beta = 0`) to
//! the posterior (`beta = 1`). At each stage [`CovScheduler`] picks the next
//! temperature so that the importance weights keep a target coefficient of
//! variation, estimates and conditions the weighted sample covariance, and
//! resamples the population. [`Metropolis`] then decorrelates the replicated
//! samples, and [`Annealer`] ties the stages together.

pub(crate) mod math;

pub mod annealer;
pub mod cooling_step;
pub mod covariance;
pub mod dbeta;
pub mod distributions;
pub mod error;
pub mod metropolis;
pub mod model;
pub mod resample;
pub mod scheduler;

pub use annealer::{Annealer, AnnealerSettings, AnnealingTrace, StageRecord};
pub use cooling_step::{CoolingStep, ParameterStatistics};
pub use covariance::{condition_matrix, weighted_covariance, CONDITION_RATIO};
pub use dbeta::{Brent, DbetaOutcome, DbetaSolver, Grid, SolverKind};
pub use distributions::{
    Density, DistributionSet, Gaussian, ParameterSet, Prior, Uniform, UnitGaussian,
};
pub use error::{AnnealError, Result};
pub use metropolis::{AcceptanceStats, Metropolis, MetropolisSettings};
pub use model::{Model, ParameterModel};
pub use resample::{rank_and_shuffle, ResampleSummary};
pub use scheduler::{CoolingSummary, CovScheduler, CovSettings};
