//! Search for the next temperature increment.
//!
//! Both strategies minimize `(cov(dbeta) - target)^2` over `[0, beta_max - beta]`
//! and share the same skip-to-the-end shortcut; they differ only in how they
//! explore the bracket.

mod brent;
mod grid;
mod objective;

pub use brent::Brent;
pub use grid::Grid;
pub use objective::{CovEvaluation, CovObjective, DEGENERATE_SENTINEL};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::Result, scheduler::CovSettings};

/// Offset from zero for the first interior probe; `cov` is zero at `dbeta = 0`.
pub const INITIAL_GUESS: f64 = 5e-5;

/// A point of the bracket together with its objective value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    pub x: f64,
    pub f: f64,
}

/// The primed search interval handed to a solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub low: Probe,
    pub guess: Probe,
    pub high: Probe,
}

/// The accepted temperature increment and the state it leads to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbetaOutcome {
    pub dbeta: f64,
    /// The new temperature, `beta + dbeta`
    pub beta: f64,
    /// CoV of the weights at the accepted increment
    pub cov: f64,
}

/// A strategy for locating the increment inside a primed bracket.
pub trait DbetaSolver {
    fn name(&self) -> &'static str;

    /// Return the best increment found in `bracket`.
    ///
    /// Implementations may leave the objective evaluated anywhere; the caller
    /// re-evaluates at the returned point.
    fn minimize(&self, objective: &mut CovObjective, bracket: Bracket, settings: &CovSettings)
        -> f64;
}

/// The solver strategies available through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Bracketed golden-section / parabolic minimization
    #[default]
    Brent,
    /// Iteratively refined grid scan
    Grid,
}

impl DbetaSolver for SolverKind {
    fn name(&self) -> &'static str {
        match self {
            SolverKind::Brent => Brent.name(),
            SolverKind::Grid => Grid.name(),
        }
    }

    fn minimize(
        &self,
        objective: &mut CovObjective,
        bracket: Bracket,
        settings: &CovSettings,
    ) -> f64 {
        match self {
            SolverKind::Brent => Brent.minimize(objective, bracket, settings),
            SolverKind::Grid => Grid.minimize(objective, bracket, settings),
        }
    }
}

/// Find the increment that takes the weight CoV closest to `settings.target`.
///
/// `weights` is overwritten with the normalized weights at the accepted
/// increment and must have the same length as `llk`.
pub fn solve<S: DbetaSolver + ?Sized>(
    solver: &S,
    llk: &[f64],
    median: f64,
    beta: f64,
    weights: &mut [f64],
    settings: &CovSettings,
) -> Result<DbetaOutcome> {
    let beta_max = settings.beta_max;
    let high = (beta_max - beta).max(0.);
    let low = settings.beta_min;
    let guess = if high > INITIAL_GUESS {
        low + INITIAL_GUESS
    } else {
        0.5 * (low + high)
    };

    let mut objective = CovObjective::new(llk, median, settings.target, weights)?;

    let at_high = objective.eval(high);
    if at_high.cov < settings.target || (at_high.cov - settings.target).abs() < settings.tolerance
    {
        debug!(cov = at_high.cov, "skipping to beta = {beta_max}");
        return Ok(DbetaOutcome {
            dbeta: high,
            beta: beta_max,
            cov: at_high.cov,
        });
    }

    let f_low = objective.eval(low).metric;
    let f_guess = objective.eval(guess).metric;
    let bracket = Bracket {
        low: Probe { x: low, f: f_low },
        guess: Probe {
            x: guess,
            f: f_guess,
        },
        high: Probe {
            x: high,
            f: at_high.metric,
        },
    };

    debug!(
        method = solver.name(),
        median,
        target = settings.target,
        tolerance = settings.tolerance,
        max_iterations = settings.max_iterations,
        "calculating dbeta"
    );

    let dbeta = solver
        .minimize(&mut objective, bracket, settings)
        .clamp(low, high);
    let accepted = objective.eval(dbeta);

    Ok(DbetaOutcome {
        dbeta,
        beta: (beta + dbeta).min(beta_max),
        cov: accepted.cov,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{mean, median};
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn spread_llk(n: usize, sd: f64) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let normal = Normal::new(-100., sd).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    #[test]
    fn check_shortcut_jumps_to_one() {
        let llk = vec![-2.; 50];
        let mut weights = vec![0.; 50];
        let settings = CovSettings::default();
        for kind in [SolverKind::Brent, SolverKind::Grid] {
            let out = solve(&kind, &llk, -2., 0.3, &mut weights, &settings).unwrap();
            assert_eq!(out.dbeta, 1. - 0.3);
            assert_eq!(out.beta, 1.);
            assert_eq!(out.cov, 0.);
        }
    }

    #[test]
    fn check_shortcut_at_unit_temperature() {
        let llk = spread_llk(40, 50.);
        let mut weights = vec![0.; 40];
        let out = solve(
            &SolverKind::Brent,
            &llk,
            median(&llk),
            1.,
            &mut weights,
            &CovSettings::default(),
        )
        .unwrap();
        assert_eq!(out.dbeta, 0.);
        assert_eq!(out.beta, 1.);
    }

    /// Two equal groups of particles whose weight ratio at `dbeta` is chosen so
    /// the CoV comes out at `cov`.
    fn two_group_llk(n: usize, cov: f64, dbeta: f64) -> Vec<f64> {
        let q = cov / (n as f64 / (n as f64 - 1.)).sqrt();
        let gap = ((1. + q) / (1. - q)).ln() / dbeta;
        (0..n).map(|i| if i % 2 == 0 { 0. } else { -gap }).collect()
    }

    #[test]
    fn check_shortcut_within_tolerance_above_target() {
        let beta = 0.25;
        let llk = two_group_llk(64, 1.0005, 1. - beta);
        let m = median(&llk);
        let settings = CovSettings::default();

        let mut weights = vec![0.; llk.len()];
        let at_high = CovObjective::new(&llk, m, settings.target, &mut weights)
            .unwrap()
            .eval(1. - beta);
        assert!(at_high.cov > settings.target, "cov {}", at_high.cov);
        assert!(at_high.cov < settings.target + settings.tolerance);

        for kind in [SolverKind::Brent, SolverKind::Grid] {
            let out = solve(&kind, &llk, m, beta, &mut weights, &settings).unwrap();
            assert_eq!(out.dbeta, 1. - beta, "{kind:?}");
            assert_eq!(out.beta, 1., "{kind:?}");
        }
    }

    #[test]
    fn check_mismatched_weights_are_rejected() {
        let llk = [1., 2., 3.];
        let mut weights = [0.; 2];
        for kind in [SolverKind::Brent, SolverKind::Grid] {
            assert!(matches!(
                solve(&kind, &llk, 2., 0., &mut weights, &CovSettings::default()),
                Err(crate::error::AnnealError::DimensionMismatch { .. })
            ));
        }
    }

    #[test]
    fn check_both_solvers_hit_target() {
        let llk = spread_llk(500, 200.);
        let m = median(&llk);
        let settings = CovSettings::default();
        for kind in [SolverKind::Brent, SolverKind::Grid] {
            let mut weights = vec![0.; llk.len()];
            let out = solve(&kind, &llk, m, 0., &mut weights, &settings).unwrap();
            assert!(out.dbeta > 0., "{kind:?}");
            assert!(out.dbeta < 1., "{kind:?}");
            assert!((out.cov - 1.).abs() < 0.05, "{kind:?}: cov {}", out.cov);
            assert!(weights.iter().all(|&w| w >= 0.));
            assert!((mean(&weights) - 1.).abs() < 1e-9);
        }
    }

    #[test]
    fn check_increment_stays_in_bounds() {
        let llk = spread_llk(200, 30.);
        let m = median(&llk);
        let settings = CovSettings::default();
        for beta in [0., 0.2, 0.9, 0.99999] {
            for kind in [SolverKind::Brent, SolverKind::Grid] {
                let mut weights = vec![0.; llk.len()];
                let out = solve(&kind, &llk, m, beta, &mut weights, &settings).unwrap();
                assert!(out.dbeta >= 0.);
                assert!(out.dbeta <= 1. - beta + 1e-15);
                assert!(out.beta <= 1.);
                assert!((out.beta - (beta + out.dbeta)).abs() < 1e-12);
            }
        }
    }
}
