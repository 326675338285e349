//! Prior and initialization distributions for model parameters.
//!
//! Each distribution acts on one scalar parameter. A [`DistributionSet`] lays
//! out contiguous [`ParameterSet`]s along the sample vector, and each set has
//! its own prior and its own distribution for drawing starting samples.

use std::f64::consts::PI;

use anyhow::ensure;
use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::error::{AnnealError, Result};

/// A univariate density over one parameter.
pub trait Density {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64;

    fn log_pdf(&self, x: f64) -> f64;

    /// Whether `x` lies inside the support.
    fn verify(&self, _x: f64) -> bool {
        true
    }
}

/// Uniform density on the closed interval `[low, high]`.
#[derive(Debug, Clone)]
pub struct Uniform {
    low: f64,
    high: f64,
    sampler: rand_distr::Uniform<f64>,
}

impl Uniform {
    pub fn new(low: f64, high: f64) -> Result<Self> {
        let sampler = rand_distr::Uniform::new_inclusive(low, high).map_err(|err| {
            AnnealError::InvalidSettings(format!("uniform support [{low}, {high}]: {err}"))
        })?;
        if low >= high {
            return Err(AnnealError::InvalidSettings(format!(
                "empty uniform support [{low}, {high}]"
            )));
        }
        Ok(Self { low, high, sampler })
    }

    pub fn support(&self) -> (f64, f64) {
        (self.low, self.high)
    }
}

impl Density for Uniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.sampler.sample(rng)
    }

    fn log_pdf(&self, x: f64) -> f64 {
        if self.verify(x) {
            -(self.high - self.low).ln()
        } else {
            f64::NEG_INFINITY
        }
    }

    fn verify(&self, x: f64) -> bool {
        self.low <= x && x <= self.high
    }
}

#[inline]
fn gaussian_log_pdf(z: f64, sigma: f64) -> f64 {
    -0.5 * z * z - sigma.ln() - 0.5 * (2. * PI).ln()
}

#[derive(Debug, Clone, Copy)]
pub struct Gaussian {
    mean: f64,
    sigma: f64,
    sampler: Normal<f64>,
}

impl Gaussian {
    pub fn new(mean: f64, sigma: f64) -> Result<Self> {
        if !(sigma > 0. && sigma.is_finite()) {
            return Err(AnnealError::InvalidSettings(format!(
                "gaussian sigma must be positive, got {sigma}"
            )));
        }
        let sampler = Normal::new(mean, sigma).map_err(|err| {
            AnnealError::InvalidSettings(format!("gaussian({mean}, {sigma}): {err}"))
        })?;
        Ok(Self {
            mean,
            sigma,
            sampler,
        })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl Density for Gaussian {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.sampler.sample(rng)
    }

    fn log_pdf(&self, x: f64) -> f64 {
        gaussian_log_pdf((x - self.mean) / self.sigma, self.sigma)
    }
}

/// Standard normal density.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitGaussian;

impl Density for UnitGaussian {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        StandardNormal.sample(rng)
    }

    fn log_pdf(&self, x: f64) -> f64 {
        gaussian_log_pdf(x, 1.)
    }
}

/// Any of the supported parameter densities.
#[derive(Debug, Clone)]
pub enum Prior {
    Uniform(Uniform),
    Gaussian(Gaussian),
    UnitGaussian(UnitGaussian),
}

impl Density for Prior {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Prior::Uniform(d) => d.sample(rng),
            Prior::Gaussian(d) => d.sample(rng),
            Prior::UnitGaussian(d) => d.sample(rng),
        }
    }

    fn log_pdf(&self, x: f64) -> f64 {
        match self {
            Prior::Uniform(d) => d.log_pdf(x),
            Prior::Gaussian(d) => d.log_pdf(x),
            Prior::UnitGaussian(d) => d.log_pdf(x),
        }
    }

    fn verify(&self, x: f64) -> bool {
        match self {
            Prior::Uniform(d) => d.verify(x),
            Prior::Gaussian(d) => d.verify(x),
            Prior::UnitGaussian(d) => d.verify(x),
        }
    }
}

impl From<Uniform> for Prior {
    fn from(value: Uniform) -> Self {
        Prior::Uniform(value)
    }
}

impl From<Gaussian> for Prior {
    fn from(value: Gaussian) -> Self {
        Prior::Gaussian(value)
    }
}

impl From<UnitGaussian> for Prior {
    fn from(value: UnitGaussian) -> Self {
        Prior::UnitGaussian(value)
    }
}

/// `count` consecutive parameters sharing a prior and an initializer.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    pub count: usize,
    /// Density used for the prior likelihood and support checks
    pub prior: Prior,
    /// Density the starting samples are drawn from
    pub prep: Prior,
}

impl ParameterSet {
    /// A set whose starting samples are drawn from its prior.
    pub fn new(count: usize, prior: impl Into<Prior>) -> Self {
        let prior = prior.into();
        Self {
            count,
            prep: prior.clone(),
            prior,
        }
    }

    pub fn with_prep(mut self, prep: impl Into<Prior>) -> Self {
        self.prep = prep.into();
        self
    }
}

/// The parameter sets of a model, laid out back to back.
#[derive(Debug, Clone, Default)]
pub struct DistributionSet {
    sets: Vec<ParameterSet>,
}

impl DistributionSet {
    pub fn new(sets: Vec<ParameterSet>) -> Self {
        Self { sets }
    }

    pub fn push(&mut self, set: ParameterSet) {
        self.sets.push(set);
    }

    pub fn sets(&self) -> &[ParameterSet] {
        &self.sets
    }

    /// Total number of parameters over all sets.
    pub fn parameters(&self) -> usize {
        self.sets.iter().map(|set| set.count).sum()
    }

    fn slices<'a>(
        &'a self,
        sample: &'a [f64],
    ) -> impl Iterator<Item = (&'a ParameterSet, &'a [f64])> {
        let mut offset = 0;
        self.sets.iter().map(move |set| {
            let part = &sample[offset..offset + set.count];
            offset += set.count;
            (set, part)
        })
    }

    /// Fill `sample` with draws from each set's initializer.
    pub fn init_sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        sample: &mut [f64],
    ) -> anyhow::Result<()> {
        ensure!(
            sample.len() == self.parameters(),
            "sample has {} entries, the parameter sets need {}",
            sample.len(),
            self.parameters()
        );
        let mut rest = sample;
        for set in self.sets.iter() {
            let (part, tail) = std::mem::take(&mut rest).split_at_mut(set.count);
            part.iter_mut().for_each(|x| *x = set.prep.sample(rng));
            rest = tail;
        }
        Ok(())
    }

    /// Sum of the prior log densities of every parameter.
    pub fn log_pdf(&self, sample: &[f64]) -> f64 {
        if sample.len() != self.parameters() {
            return f64::NEG_INFINITY;
        }
        self.slices(sample)
            .map(|(set, part)| part.iter().map(|&x| set.prior.log_pdf(x)).sum::<f64>())
            .sum()
    }

    /// Whether every parameter lies inside the support of its prior.
    pub fn verify(&self, sample: &[f64]) -> bool {
        sample.len() == self.parameters()
            && self
                .slices(sample)
                .all(|(set, part)| part.iter().all(|&x| set.prior.verify(x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn check_uniform() {
        let d = Uniform::new(-1., 3.).unwrap();
        assert_relative_eq!(d.log_pdf(0.), -(4f64.ln()));
        assert_relative_eq!(d.log_pdf(3.), -(4f64.ln()));
        assert_eq!(d.log_pdf(3.5), f64::NEG_INFINITY);
        assert!(!d.verify(-1.5));

        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for _ in 0..1000 {
            assert!(d.verify(d.sample(&mut rng)));
        }

        assert!(Uniform::new(2., 2.).is_err());
        assert!(Uniform::new(2., 1.).is_err());
        assert!(Uniform::new(f64::NAN, 1.).is_err());
    }

    #[test]
    fn check_gaussian() {
        let d = Gaussian::new(2., 0.5).unwrap();
        assert_relative_eq!(
            d.log_pdf(2.),
            -(0.5 * (2. * PI).sqrt()).ln(),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            d.log_pdf(3.) - d.log_pdf(2.),
            -2.,
            epsilon = 1e-12
        );
        assert!(d.verify(1e6));
        assert!(Gaussian::new(0., 0.).is_err());
        assert!(Gaussian::new(0., f64::INFINITY).is_err());

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let draws = (0..20000).map(|_| d.sample(&mut rng)).collect::<Vec<_>>();
        let m = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((m - 2.).abs() < 0.02, "mean {m}");
    }

    #[test]
    fn check_unit_gaussian_matches_gaussian() {
        let unit = UnitGaussian;
        let standard = Gaussian::new(0., 1.).unwrap();
        for x in [-2., -0.3, 0., 1.7] {
            assert_relative_eq!(unit.log_pdf(x), standard.log_pdf(x), epsilon = 1e-12);
        }
    }

    #[test]
    fn check_set_layout() {
        let set = DistributionSet::new(vec![
            ParameterSet::new(2, Uniform::new(0., 2.).unwrap()),
            ParameterSet::new(1, UnitGaussian).with_prep(Uniform::new(-0.1, 0.1).unwrap()),
        ]);
        assert_eq!(set.parameters(), 3);

        let sample = [1., 0.5, 0.];
        assert!(set.verify(&sample));
        assert_relative_eq!(
            set.log_pdf(&sample),
            -2. * 2f64.ln() + UnitGaussian.log_pdf(0.),
            epsilon = 1e-12
        );
        assert!(!set.verify(&[3., 0.5, 0.]));
        assert_eq!(set.log_pdf(&[3., 0.5, 0.]), f64::NEG_INFINITY);
        assert!(!set.verify(&[1., 0.5]));

        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut draw = [0.; 3];
        for _ in 0..100 {
            set.init_sample(&mut rng, &mut draw).unwrap();
            assert!((0. ..=2.).contains(&draw[0]));
            assert!((0. ..=2.).contains(&draw[1]));
            assert!(draw[2].abs() <= 0.1);
        }
        assert!(set.init_sample(&mut rng, &mut [0.; 4]).is_err());
    }
}
