//! The forward-model side of the annealer.
//!
//! A model supplies the prior and data log-likelihoods of parameter vectors;
//! everything about how the data likelihood is computed stays behind this
//! trait.

use anyhow::Result;
use rand::Rng;

use crate::distributions::DistributionSet;

/// A Bayesian model that can be annealed from its prior to its posterior.
///
/// Implementations must be thread-safe: the annealer evaluates candidate
/// samples for different chains in parallel.
pub trait Model: Send + Sync {
    /// The number of model parameters.
    fn parameters(&self) -> usize;

    /// Draw a starting sample from the initializing prior into `sample`.
    fn init_sample<R: Rng + ?Sized>(&self, rng: &mut R, sample: &mut [f64]) -> Result<()>;

    /// Log density of `sample` under the prior.
    fn prior_log_likelihood(&self, sample: &[f64]) -> f64;

    /// Log likelihood of the observed data given `sample`.
    fn data_log_likelihood(&self, sample: &[f64]) -> Result<f64>;

    /// Whether `sample` lies inside the support of the prior.
    ///
    /// Samples that fail verification are rejected without evaluating the
    /// data likelihood.
    fn verify(&self, _sample: &[f64]) -> bool {
        true
    }

    /// Prior, data and tempered posterior log-likelihoods of `sample` at `beta`.
    fn densities(&self, sample: &[f64], beta: f64) -> Result<[f64; 3]> {
        let prior = self.prior_log_likelihood(sample);
        let data = self.data_log_likelihood(sample)?;
        Ok([prior, data, prior + beta * data])
    }
}

/// A model assembled from a [`DistributionSet`] prior and a data
/// log-likelihood function of the sample.
pub struct ParameterModel<F> {
    priors: DistributionSet,
    likelihood: F,
}

impl<F> ParameterModel<F>
where
    F: Fn(&[f64]) -> Result<f64> + Send + Sync,
{
    pub fn new(priors: DistributionSet, likelihood: F) -> Self {
        Self { priors, likelihood }
    }

    pub fn priors(&self) -> &DistributionSet {
        &self.priors
    }
}

impl<F> Model for ParameterModel<F>
where
    F: Fn(&[f64]) -> Result<f64> + Send + Sync,
{
    fn parameters(&self) -> usize {
        self.priors.parameters()
    }

    fn init_sample<R: Rng + ?Sized>(&self, rng: &mut R, sample: &mut [f64]) -> Result<()> {
        self.priors.init_sample(rng, sample)
    }

    fn prior_log_likelihood(&self, sample: &[f64]) -> f64 {
        self.priors.log_pdf(sample)
    }

    fn data_log_likelihood(&self, sample: &[f64]) -> Result<f64> {
        (self.likelihood)(sample)
    }

    fn verify(&self, sample: &[f64]) -> bool {
        self.priors.verify(sample)
    }
}

pub mod test_models {
    use anyhow::{ensure, Result};
    use rand::Rng;

    use super::Model;
    use crate::distributions::{DistributionSet, ParameterSet, Uniform};

    /// Independent Gaussian likelihood around `mu` with a uniform box prior.
    #[derive(Debug, Clone)]
    pub struct BoxedGaussian {
        mu: Vec<f64>,
        sigma: f64,
        priors: DistributionSet,
    }

    impl BoxedGaussian {
        pub fn new(mu: Vec<f64>, sigma: f64, support: (f64, f64)) -> Result<Self> {
            ensure!(sigma > 0., "sigma must be positive");
            let prior = Uniform::new(support.0, support.1)?;
            ensure!(
                mu.iter().all(|m| (support.0..support.1).contains(m)),
                "mean outside of prior support"
            );
            let priors = DistributionSet::new(vec![ParameterSet::new(mu.len(), prior)]);
            Ok(Self { mu, sigma, priors })
        }

        pub fn mu(&self) -> &[f64] {
            &self.mu
        }
    }

    impl Model for BoxedGaussian {
        fn parameters(&self) -> usize {
            self.mu.len()
        }

        fn init_sample<R: Rng + ?Sized>(&self, rng: &mut R, sample: &mut [f64]) -> Result<()> {
            self.priors.init_sample(rng, sample)
        }

        fn prior_log_likelihood(&self, sample: &[f64]) -> f64 {
            self.priors.log_pdf(sample)
        }

        fn data_log_likelihood(&self, sample: &[f64]) -> Result<f64> {
            ensure!(sample.len() == self.mu.len(), "wrong sample length");
            let norm = 0.5 * (2. * std::f64::consts::PI * self.sigma * self.sigma).ln();
            Ok(sample
                .iter()
                .zip(self.mu.iter())
                .map(|(&x, &mu)| {
                    let z = (x - mu) / self.sigma;
                    -0.5 * z * z - norm
                })
                .sum())
        }

        fn verify(&self, sample: &[f64]) -> bool {
            self.priors.verify(sample)
        }
    }
}
