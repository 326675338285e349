use tracing::debug;

use super::{Bracket, CovObjective, DbetaSolver};
use crate::scheduler::CovSettings;

const DIVISIONS: usize = 10;
const REFINEMENTS: usize = 10;

/// Iterative grid refinement.
///
/// Each pass scans the bracket in `DIVISIONS` equal steps and narrows it to the
/// sub-interval where the CoV first reaches the target. Coarser than [`super::Brent`],
/// but monotone, which helps on badly behaved likelihood surfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grid;

impl DbetaSolver for Grid {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn minimize(
        &self,
        objective: &mut CovObjective,
        bracket: Bracket,
        settings: &CovSettings,
    ) -> f64 {
        let target = objective.target();
        let mut low = bracket.low.x;
        let mut high = bracket.high.x;
        let mut guess = low;

        for pass in 0..=REFINEMENTS {
            let step = (high - low) / DIVISIONS as f64;
            let mut found = false;
            let mut crossed = false;
            let mut cov = f64::NAN;

            for index in 0..=DIVISIONS {
                guess = low + index as f64 * step;
                cov = objective.eval(guess).cov;
                if (cov - target).abs() < settings.tolerance {
                    found = true;
                    crossed = true;
                    break;
                }
                if cov >= target {
                    found = index == 0;
                    crossed = true;
                    break;
                }
            }
            if !crossed {
                guess = high;
            }

            debug!(pass, low, high, dbeta = guess, cov, "grid refinement");

            if found {
                break;
            }
            high = guess;
            low = guess - step;
        }

        guess
    }
}
