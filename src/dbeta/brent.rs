use tracing::debug;

use super::{Bracket, CovObjective, DbetaSolver};
use crate::scheduler::CovSettings;

/// (3 - sqrt(5)) / 2
const GOLDEN: f64 = 0.381_966_0;

/// Brent's derivative-free minimizer, primed with a known bracket.
///
/// Iterates until the CoV at the latest probe is within `tolerance` of the
/// target or `max_iterations` is exhausted. Running out of iterations is not an
/// error; the best point seen so far is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct Brent;

#[derive(Debug)]
struct BrentState {
    x_minimum: f64,
    f_minimum: f64,
    x_lower: f64,
    x_upper: f64,
    v: f64,
    w: f64,
    f_v: f64,
    f_w: f64,
    // the last two step lengths
    d: f64,
    e: f64,
}

impl BrentState {
    fn new(objective: &mut CovObjective, bracket: Bracket) -> Self {
        let Bracket { low, guess, high } = bracket;
        let v = low.x + GOLDEN * (high.x - low.x);
        let f_v = objective.eval(v).metric;
        Self {
            x_minimum: guess.x,
            f_minimum: guess.f,
            x_lower: low.x,
            x_upper: high.x,
            v,
            w: v,
            f_v,
            f_w: f_v,
            d: 0.,
            e: 0.,
        }
    }

    fn iterate(&mut self, objective: &mut CovObjective) {
        let x_left = self.x_lower;
        let x_right = self.x_upper;
        let z = self.x_minimum;
        let f_z = self.f_minimum;
        let (v, w, f_v, f_w) = (self.v, self.w, self.f_v, self.f_w);

        let mut d = self.e;
        let mut e = self.d;

        let w_lower = z - x_left;
        let w_upper = x_right - z;
        let tolerance = f64::EPSILON.sqrt() * z.abs();
        let midpoint = 0.5 * (x_left + x_right);

        let (mut p, mut q, mut r) = (0f64, 0f64, 0f64);

        if e.abs() > tolerance {
            // fit a parabola through z, w and v
            r = (z - w) * (f_z - f_v);
            q = (z - v) * (f_z - f_w);
            p = (z - v) * q - (z - w) * r;
            q = 2. * (q - r);

            if q > 0. {
                p = -p;
            } else {
                q = -q;
            }

            r = e;
            e = d;
        }

        if p.abs() < (0.5 * q * r).abs() && p < q * w_lower && p < q * w_upper {
            let t2 = 2. * tolerance;
            d = p / q;
            let u = z + d;
            if (u - x_left) < t2 || (x_right - u) < t2 {
                d = if z < midpoint { tolerance } else { -tolerance };
            }
        } else {
            e = if z < midpoint { x_right - z } else { -(z - x_left) };
            d = GOLDEN * e;
        }

        let u = if d.abs() >= tolerance {
            z + d
        } else if d > 0. {
            z + tolerance
        } else {
            z - tolerance
        };

        self.e = e;
        self.d = d;

        let f_u = objective.eval(u).metric;

        if f_u <= f_z {
            if u < z {
                self.x_upper = z;
            } else {
                self.x_lower = z;
            }
            self.v = w;
            self.f_v = f_w;
            self.w = z;
            self.f_w = f_z;
            self.x_minimum = u;
            self.f_minimum = f_u;
        } else {
            if u < z {
                self.x_lower = u;
            } else {
                self.x_upper = u;
            }
            if f_u <= f_w || w == z {
                self.v = w;
                self.f_v = f_w;
                self.w = u;
                self.f_w = f_u;
            } else if f_u <= f_v || v == z || v == w {
                self.v = u;
                self.f_v = f_u;
            }
        }
    }
}

impl DbetaSolver for Brent {
    fn name(&self) -> &'static str {
        "brent"
    }

    fn minimize(
        &self,
        objective: &mut CovObjective,
        bracket: Bracket,
        settings: &CovSettings,
    ) -> f64 {
        let target = objective.target();
        let mut state = BrentState::new(objective, bracket);

        for iteration in 1..=settings.max_iterations {
            state.iterate(objective);
            let Some(last) = objective.last() else {
                break;
            };
            let converged = (last.cov - target).abs() < settings.tolerance;
            debug!(
                iteration,
                lower = state.x_lower,
                upper = state.x_upper,
                dbeta = last.dbeta,
                cov = last.cov,
                err = last.cov - target,
                metric = last.metric,
                converged,
            );
            if converged {
                break;
            }
        }

        state.x_minimum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbeta::Probe;

    #[test]
    fn check_brent_stops_on_iteration_budget() {
        // weights of two far-apart groups; the search has to walk down from 1
        let llk = (0..64)
            .map(|i| if i % 2 == 0 { 0. } else { -40. })
            .collect::<Vec<_>>();
        let mut weights = vec![0.; llk.len()];
        let mut objective = CovObjective::new(&llk, -20., 1., &mut weights).unwrap();
        let f = |o: &mut CovObjective, x: f64| Probe {
            x,
            f: o.eval(x).metric,
        };
        let bracket = Bracket {
            low: f(&mut objective, 0.),
            guess: f(&mut objective, 5e-5),
            high: f(&mut objective, 1.),
        };
        let settings = CovSettings {
            max_iterations: 3,
            ..CovSettings::default()
        };
        let x = Brent.minimize(&mut objective, bracket, &settings);
        assert!((0. ..=1.).contains(&x));

        let settings = CovSettings::default();
        let x_full = Brent.minimize(&mut objective, bracket, &settings);
        let eval = objective.eval(x_full);
        assert!((eval.cov - 1.).abs() < 1e-2, "cov {}", eval.cov);
    }

    #[test]
    fn check_brent_starts_from_primed_guess() {
        let llk = (0..32).map(|i| i as f64).collect::<Vec<_>>();
        let mut weights = vec![0.; llk.len()];
        let mut objective = CovObjective::new(&llk, 15.5, 1., &mut weights).unwrap();
        // a known value of zero at the guess cannot be improved on
        let bracket = Bracket {
            low: Probe {
                x: 0.,
                f: objective.eval(0.).metric,
            },
            guess: Probe { x: 0.123, f: 0. },
            high: Probe {
                x: 1.,
                f: objective.eval(1.).metric,
            },
        };
        let settings = CovSettings {
            max_iterations: 1,
            ..CovSettings::default()
        };
        assert_eq!(Brent.minimize(&mut objective, bracket, &settings), 0.123);
    }
}
