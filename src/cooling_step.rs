use faer::Mat;
use itertools::izip;

use crate::{
    error::{AnnealError, Result},
    math::{mean, sd_m},
};

/// The state of the annealing calculation at one temperature.
///
/// Rows of `theta` are particles; the three density vectors hold one entry per
/// particle in the same order. The scheduler reorders and replicates rows in
/// place, so all four always move together.
#[derive(Debug, Clone)]
pub struct CoolingStep {
    beta: f64,
    theta: Mat<f64>,
    prior: Vec<f64>,
    data: Vec<f64>,
    posterior: Vec<f64>,
    sigma: Mat<f64>,
    /// The sequence number of the annealing stage that produced this state
    pub iteration: u64,
}

/// Per-parameter mean and standard deviation over the current sample set.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStatistics {
    pub mean: Vec<f64>,
    pub sd: Vec<f64>,
}

impl CoolingStep {
    /// A zeroed step at `beta = 0`.
    pub fn new(samples: usize, parameters: usize) -> Self {
        Self {
            beta: 0.,
            theta: Mat::zeros(samples, parameters),
            prior: vec![0.; samples],
            data: vec![0.; samples],
            posterior: vec![0.; samples],
            sigma: Mat::zeros(parameters, parameters),
            iteration: 0,
        }
    }

    /// Assemble a step from existing parts, checking that the shapes agree.
    pub fn from_parts(
        beta: f64,
        theta: Mat<f64>,
        prior: Vec<f64>,
        data: Vec<f64>,
        posterior: Vec<f64>,
    ) -> Result<Self> {
        if !(0. ..=1.).contains(&beta) {
            return Err(AnnealError::BetaOutOfRange(beta));
        }
        let samples = theta.nrows();
        for (what, found) in [
            ("prior", prior.len()),
            ("data", data.len()),
            ("posterior", posterior.len()),
        ] {
            if found != samples {
                return Err(AnnealError::DimensionMismatch {
                    what,
                    expected: samples,
                    found,
                });
            }
        }
        let parameters = theta.ncols();
        Ok(Self {
            beta,
            theta,
            prior,
            data,
            posterior,
            sigma: Mat::zeros(parameters, parameters),
            iteration: 0,
        })
    }

    pub fn samples(&self) -> usize {
        self.theta.nrows()
    }

    pub fn parameters(&self) -> usize {
        self.theta.ncols()
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn set_beta(&mut self, beta: f64) -> Result<()> {
        if !(0. ..=1.).contains(&beta) {
            return Err(AnnealError::BetaOutOfRange(beta));
        }
        self.beta = beta;
        Ok(())
    }

    pub fn theta(&self) -> &Mat<f64> {
        &self.theta
    }

    pub fn theta_mut(&mut self) -> &mut Mat<f64> {
        &mut self.theta
    }

    pub fn prior(&self) -> &[f64] {
        &self.prior
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn posterior(&self) -> &[f64] {
        &self.posterior
    }

    pub fn sigma(&self) -> &Mat<f64> {
        &self.sigma
    }

    pub(crate) fn set_sigma(&mut self, sigma: Mat<f64>) {
        debug_assert_eq!(sigma.nrows(), self.parameters());
        debug_assert_eq!(sigma.ncols(), self.parameters());
        self.sigma = sigma;
    }

    /// Mutable views of the three density vectors, in (prior, data, posterior) order.
    pub fn densities_mut(&mut self) -> (&mut [f64], &mut [f64], &mut [f64]) {
        (&mut self.prior, &mut self.data, &mut self.posterior)
    }

    /// Copy of row `index` of the sample matrix.
    pub fn sample(&self, index: usize) -> Vec<f64> {
        (0..self.parameters())
            .map(|col| self.theta[(index, col)])
            .collect()
    }

    pub fn set_sample(&mut self, index: usize, values: &[f64]) {
        assert!(values.len() == self.parameters());
        values
            .iter()
            .enumerate()
            .for_each(|(col, &val)| self.theta[(index, col)] = val);
    }

    /// Overwrite the sample and densities of particle `index`.
    pub(crate) fn set_particle(&mut self, index: usize, values: &[f64], densities: [f64; 3]) {
        self.set_sample(index, values);
        let [prior, data, posterior] = densities;
        self.prior[index] = prior;
        self.data[index] = data;
        self.posterior[index] = posterior;
    }

    /// Recompute `posterior = prior + beta * data` for every particle.
    pub fn update_posterior(&mut self) {
        let beta = self.beta;
        izip!(&mut self.posterior, &self.prior, &self.data)
            .for_each(|(post, &prior, &data)| *post = prior + beta * data);
    }

    pub fn parameter_statistics(&self) -> ParameterStatistics {
        let (mean, sd): (Vec<f64>, Vec<f64>) = (0..self.parameters())
            .map(|col| {
                let values = (0..self.samples())
                    .map(|row| self.theta[(row, col)])
                    .collect::<Vec<_>>();
                let m = mean(&values);
                (m, sd_m(&values, m))
            })
            .unzip();
        ParameterStatistics { mean, sd }
    }
}
