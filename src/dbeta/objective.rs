use crate::{
    error::{AnnealError, Result},
    math::{mean, scale, sd_m},
};

/// Reported as both objective and CoV when the weights degenerate.
pub const DEGENERATE_SENTINEL: f64 = 1e100;

/// The result of evaluating the CoV objective at one temperature increment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CovEvaluation {
    pub dbeta: f64,
    /// Coefficient of variation of the normalized weights
    pub cov: f64,
    /// `(cov - target)^2`, the quantity the solvers minimize
    pub metric: f64,
}

/// Coefficient of variation of the importance weights as a function of `dbeta`.
///
/// Every evaluation overwrites the weight buffer with
/// `w_i = exp(dbeta * (llk_i - median))`, normalized to unit mean, so after the
/// last call the buffer holds the weights at the last evaluated increment.
#[derive(Debug)]
pub struct CovObjective<'a> {
    llk: &'a [f64],
    median: f64,
    target: f64,
    weights: &'a mut [f64],
    last: Option<CovEvaluation>,
}

impl<'a> CovObjective<'a> {
    pub fn new(
        llk: &'a [f64],
        median: f64,
        target: f64,
        weights: &'a mut [f64],
    ) -> Result<Self> {
        if weights.len() != llk.len() {
            return Err(AnnealError::DimensionMismatch {
                what: "weights",
                expected: llk.len(),
                found: weights.len(),
            });
        }
        Ok(Self {
            llk,
            median,
            target,
            weights,
            last: None,
        })
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn last(&self) -> Option<CovEvaluation> {
        self.last
    }

    pub fn eval(&mut self, dbeta: f64) -> CovEvaluation {
        let median = self.median;
        self.weights
            .iter_mut()
            .zip(self.llk.iter())
            .for_each(|(w, &llk)| *w = (dbeta * (llk - median)).exp());

        let total_mean = mean(self.weights);
        scale(self.weights, total_mean.recip());

        let m = mean(self.weights);
        let cov = sd_m(self.weights, m) / m;

        let evaluation = if cov.is_finite() {
            let diff = cov - self.target;
            CovEvaluation {
                dbeta,
                cov,
                metric: diff * diff,
            }
        } else {
            CovEvaluation {
                dbeta,
                cov: DEGENERATE_SENTINEL,
                metric: DEGENERATE_SENTINEL,
            }
        };
        self.last = Some(evaluation);
        evaluation
    }

    pub fn weights(&self) -> &[f64] {
        self.weights
    }
}
