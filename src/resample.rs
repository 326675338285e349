use itertools::Itertools;
use rand::Rng;
use tracing::warn;

use crate::{
    cooling_step::CoolingStep,
    error::{AnnealError, Result},
    math::cumulative_ticks,
};

/// What a resampling pass did to the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResampleSummary {
    /// Number of distinct original particles that survived
    pub unique: usize,
    /// Slots filled by replication
    pub filled: usize,
    /// Slots that had to be padded with the most replicated particle
    pub padded: usize,
}

/// Draw a multiplicity for every particle from the weights.
///
/// The weights partition `[0, sum(w))` into consecutive bins; each of the `n`
/// uniform draws lands in exactly one of them. Zero-weight bins are never hit.
pub fn multiplicities<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Result<Vec<usize>> {
    let n = weights.len();
    let ticks = cumulative_ticks(weights);
    let total = ticks[n];
    if !(total.is_finite() && total > 0.) || weights.iter().any(|&w| !(w >= 0.)) {
        return Err(AnnealError::DegenerateWeights(total));
    }

    let mut counts = vec![0usize; n];
    for _ in 0..n {
        let u = rng.random::<f64>() * total;
        let bin = ticks.partition_point(|&tick| tick <= u) - 1;
        counts[bin.min(n - 1)] += 1;
    }
    Ok(counts)
}

/// Replace the weighted ensemble by an equally weighted one of the same size.
///
/// Particles are ranked by multiplicity, highest first (ties keep their
/// original order), and each is copied into as many consecutive slots as it
/// was drawn. Samples and all three density vectors move together.
///
/// The multiplicities sum to the ensemble size and the stable descending sort
/// places every drawn particle ahead of the undrawn ones, so the replication
/// loop always fills every slot and `padded` is zero. The padding branch only
/// guards that invariant; reaching it would be a bug in [`multiplicities`].
pub fn rank_and_shuffle<R: Rng + ?Sized>(
    step: &mut CoolingStep,
    weights: &[f64],
    rng: &mut R,
) -> Result<ResampleSummary> {
    let samples = step.samples();
    if weights.len() != samples {
        return Err(AnnealError::DimensionMismatch {
            what: "weights",
            expected: samples,
            found: weights.len(),
        });
    }

    let counts = multiplicities(weights, rng)?;
    let ranked = (0..samples)
        .sorted_by(|&a, &b| counts[b].cmp(&counts[a]))
        .collect_vec();

    let old = step.clone();
    let particle = |index: usize| {
        (
            old.sample(index),
            [old.prior()[index], old.data()[index], old.posterior()[index]],
        )
    };

    let mut done = 0;
    let mut unique = 0;
    for &index in ranked.iter() {
        let count = counts[index];
        if count == 0 {
            break;
        }
        let (values, densities) = particle(index);
        for _ in 0..count.min(samples - done) {
            step.set_particle(done, &values, densities);
            done += 1;
        }
        unique += 1;
    }

    let filled = done;
    if filled < samples {
        warn!(
            filled,
            samples, "resampling under-filled the ensemble; padding with the top particle"
        );
        let (values, densities) = particle(ranked[0]);
        while done < samples {
            step.set_particle(done, &values, densities);
            done += 1;
        }
    }

    Ok(ResampleSummary {
        unique,
        filled,
        padded: samples - filled,
    })
}
