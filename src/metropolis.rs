use faer::Mat;
use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    cooling_step::CoolingStep,
    error::{AnnealError, Result},
    model::Model,
};

/// Settings for the random-walk mutation kernel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetropolisSettings {
    /// Initial scale factor; the proposal covariance is `scaling^2 * sigma`.
    pub scaling: f64,
    /// Weight of accepted proposals when adapting the scale.
    pub acceptance_weight: f64,
    /// Weight of rejected proposals when adapting the scale.
    pub rejection_weight: f64,
    /// Length of each Markov chain per annealing stage.
    pub steps: u64,
}

impl Default for MetropolisSettings {
    fn default() -> Self {
        Self {
            scaling: 0.1,
            acceptance_weight: 8.,
            rejection_weight: 1.,
            steps: 20,
        }
    }
}

impl MetropolisSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.scaling > 0. && self.scaling.is_finite()) {
            return Err(AnnealError::InvalidSettings(format!(
                "proposal scaling must be positive, got {}",
                self.scaling
            )));
        }
        if !(self.acceptance_weight >= 0.
            && self.rejection_weight >= 0.
            && self.acceptance_weight + self.rejection_weight > 0.)
        {
            return Err(AnnealError::InvalidSettings(
                "acceptance and rejection weights must be non-negative and not both zero"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome counts of the proposals made during one walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcceptanceStats {
    pub accepted: u64,
    /// Proposals outside of the prior support
    pub rejected: u64,
    /// Proposals turned down by the Metropolis test
    pub unlikely: u64,
}

impl AcceptanceStats {
    pub fn total(&self) -> u64 {
        self.accepted + self.rejected + self.unlikely
    }

    pub fn acceptance_rate(&self) -> f64 {
        self.accepted as f64 / self.total() as f64
    }
}

const MIN_SCALING: f64 = 0.1;
const MAX_SCALING: f64 = 1.;

/// Random-walk Metropolis over every chain of a cooling step, with proposals
/// drawn from the step's conditioned covariance.
#[derive(Debug, Clone)]
pub struct Metropolis {
    settings: MetropolisSettings,
    scaling: f64,
}

impl Metropolis {
    pub fn new(settings: MetropolisSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            scaling: settings.scaling,
        })
    }

    pub fn scaling(&self) -> f64 {
        self.scaling
    }

    /// Lower Cholesky factor of `scaling^2 * sigma`.
    fn proposal_factor(&self, sigma: &Mat<f64>) -> Result<Mat<f64>> {
        let s2 = self.scaling * self.scaling;
        let dim = sigma.nrows();
        let scaled = Mat::from_fn(dim, dim, |i, j| s2 * sigma[(i, j)]);
        let llt = scaled
            .llt(faer::Side::Lower)
            .map_err(|_| AnnealError::Cholesky)?;
        Ok(llt.L().to_owned())
    }

    /// Advance every chain of `step` by `steps` Metropolis updates at the
    /// step's temperature.
    pub fn walk<M: Model, R: Rng + ?Sized>(
        &self,
        model: &M,
        step: &mut CoolingStep,
        rng: &mut R,
    ) -> Result<AcceptanceStats> {
        let samples = step.samples();
        let parameters = step.parameters();
        if model.parameters() != parameters {
            return Err(AnnealError::DimensionMismatch {
                what: "model parameters",
                expected: parameters,
                found: model.parameters(),
            });
        }
        let factor = self.proposal_factor(step.sigma())?;
        let beta = step.beta();

        let mut stats = AcceptanceStats::default();
        let mut normal = vec![0f64; parameters];

        for _ in 0..self.settings.steps {
            let candidates = (0..samples)
                .map(|row| {
                    normal
                        .iter_mut()
                        .for_each(|z| *z = rng.sample(StandardNormal));
                    (0..parameters)
                        .map(|i| {
                            let shift: f64 =
                                (0..=i).map(|k| factor[(i, k)] * normal[k]).sum();
                            step.theta()[(row, i)] + shift
                        })
                        .collect::<Vec<f64>>()
                })
                .collect::<Vec<_>>();

            let densities = candidates
                .par_iter()
                .map(|candidate| {
                    if model.verify(candidate) {
                        model.densities(candidate, beta).map(Some)
                    } else {
                        Ok(None)
                    }
                })
                .collect::<anyhow::Result<Vec<_>>>()
                .map_err(AnnealError::Model)?;

            let dice = (0..samples)
                .map(|_| rng.random::<f64>())
                .collect::<Vec<_>>();

            for (row, (candidate, density)) in candidates.iter().zip(densities).enumerate() {
                let Some(density) = density else {
                    stats.rejected += 1;
                    continue;
                };
                let diff = density[2] - step.posterior()[row];
                if dice[row].ln() > diff {
                    stats.unlikely += 1;
                    continue;
                }
                stats.accepted += 1;
                step.set_particle(row, candidate, density);
            }
        }

        Ok(stats)
    }

    /// Rescale the proposal from the acceptance rate of the last walk.
    pub fn adjust_scaling(&mut self, stats: &AcceptanceStats) -> f64 {
        if stats.total() == 0 {
            return self.scaling;
        }
        let aw = self.settings.acceptance_weight;
        let rw = self.settings.rejection_weight;
        let kc = (aw * stats.acceptance_rate() + rw) / (aw + rw);
        self.scaling = kc.clamp(MIN_SCALING, MAX_SCALING);
        debug!(
            acceptance = stats.acceptance_rate(),
            scaling = self.scaling,
            "adjusted proposal scaling"
        );
        self.scaling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_models::BoxedGaussian;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn prepared_step(model: &BoxedGaussian, samples: usize, beta: f64) -> CoolingStep {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut step = CoolingStep::new(samples, model.parameters());
        step.set_beta(beta).unwrap();
        let mut sample = vec![0.; model.parameters()];
        for row in 0..samples {
            model.init_sample(&mut rng, &mut sample).unwrap();
            let densities = model.densities(&sample, beta).unwrap();
            step.set_particle(row, &sample, densities);
        }
        let identity = Mat::from_fn(model.parameters(), model.parameters(), |i, j| {
            if i == j {
                1.
            } else {
                0.
            }
        });
        step.set_sigma(identity);
        step
    }

    #[test]
    fn check_walk_keeps_chains_consistent() {
        let model = BoxedGaussian::new(vec![0.5, -0.5], 0.3, (-2., 2.)).unwrap();
        let mut step = prepared_step(&model, 64, 0.4);
        let sampler = Metropolis::new(MetropolisSettings {
            scaling: 0.5,
            steps: 5,
            ..Default::default()
        })
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let stats = sampler.walk(&model, &mut step, &mut rng).unwrap();

        assert_eq!(stats.total(), 64 * 5);
        assert!(stats.accepted > 0);
        for row in 0..64 {
            let sample = step.sample(row);
            assert!(model.verify(&sample));
            let [prior, data, posterior] = model.densities(&sample, 0.4).unwrap();
            assert_relative_eq!(step.prior()[row], prior);
            assert_relative_eq!(step.data()[row], data);
            assert_relative_eq!(step.posterior()[row], posterior);
        }
    }

    #[test]
    fn check_walk_rejects_singular_covariance() {
        let model = BoxedGaussian::new(vec![0., 0.], 1., (-2., 2.)).unwrap();
        let mut step = prepared_step(&model, 4, 0.);
        step.set_sigma(Mat::zeros(2, 2));
        let sampler = Metropolis::new(MetropolisSettings::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        assert!(matches!(
            sampler.walk(&model, &mut step, &mut rng),
            Err(AnnealError::Cholesky)
        ));
    }

    #[test]
    fn check_scaling_adaptation() {
        let mut sampler = Metropolis::new(MetropolisSettings::default()).unwrap();
        let all = AcceptanceStats {
            accepted: 10,
            rejected: 0,
            unlikely: 0,
        };
        assert_eq!(sampler.adjust_scaling(&all), 1.);
        let none = AcceptanceStats {
            accepted: 0,
            rejected: 3,
            unlikely: 7,
        };
        assert_relative_eq!(sampler.adjust_scaling(&none), 1. / 9.);
        let half = AcceptanceStats {
            accepted: 5,
            rejected: 0,
            unlikely: 5,
        };
        assert_relative_eq!(sampler.adjust_scaling(&half), 5. / 9.);
        assert_relative_eq!(
            sampler.adjust_scaling(&AcceptanceStats::default()),
            5. / 9.
        );
    }
}
