use itertools::{izip, Itertools};

/// Median of a slice, averaging the two central values for even lengths.
///
/// The input is copied before sorting, so the caller's ordering is preserved.
pub(crate) fn median(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    let sorted = values
        .iter()
        .copied()
        .sorted_by(|a, b| a.total_cmp(b))
        .collect_vec();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

#[inline]
pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation around a known mean, with an `n - 1` denominator.
pub(crate) fn sd_m(values: &[f64], mean: f64) -> f64 {
    let n = values.len() as f64;
    let ss: f64 = values
        .iter()
        .map(|&x| {
            let diff = x - mean;
            diff * diff
        })
        .sum();
    (ss / (n - 1.)).sqrt()
}

/// Weighted mean `sum(w x) / sum(w)`.
pub(crate) fn weighted_mean(weights: &[f64], values: impl Iterator<Item = f64>) -> f64 {
    let mut total = 0f64;
    let mut weight_sum = 0f64;
    izip!(weights, values).for_each(|(&w, x)| {
        total += w * x;
        weight_sum += w;
    });
    total / weight_sum
}

pub(crate) fn scale(values: &mut [f64], factor: f64) {
    values.iter_mut().for_each(|x| *x *= factor);
}

/// Cumulative sums with a leading zero: `ticks[i + 1] = ticks[i] + w[i]`.
pub(crate) fn cumulative_ticks(weights: &[f64]) -> Vec<f64> {
    let mut ticks = Vec::with_capacity(weights.len() + 1);
    ticks.push(0f64);
    weights.iter().fold(0f64, |tick, &w| {
        let next = tick + w;
        ticks.push(next);
        next
    });
    ticks
}
