//! Deterministic Statistics
//!
//! The closed-form statistics the aggregator relies on. Percentiles use
//! linear interpolation on the continuous 0-indexed rank `p * (n - 1)`;
//! standard deviation is the sample form (denominator `n - 1`, zero for
//! fewer than two values). Order-dependent measures (drawdown, streaks)
//! take their input sequence as-is - the caller owns the sort.

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1). Zero when fewer than two values.
pub fn sample_stddev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / n as f64;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sum_sq / (n - 1) as f64).sqrt()
}

/// Interpolated percentile over a pre-sorted ascending slice.
///
/// `p` is a fraction in `[0, 1]`. `None` for an empty slice.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    if n == 1 {
        return Some(sorted[0]);
    }
    let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let weight = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * weight)
}

/// Median over a pre-sorted ascending slice.
pub fn median_sorted(sorted: &[f64]) -> Option<f64> {
    percentile_sorted(sorted, 0.5)
}

/// Max drawdown of the running cumulative sum of `outcomes`, in input
/// order. Both the cumulative sum and its running peak start at zero, so
/// an immediately negative sequence still registers as drawdown.
pub fn max_drawdown(outcomes: &[f64]) -> f64 {
    let mut cumulative = 0.0f64;
    let mut peak = 0.0f64;
    let mut max_dd = 0.0f64;
    for outcome in outcomes {
        cumulative += outcome;
        if cumulative > peak {
            peak = cumulative;
        }
        let dd = peak - cumulative;
        if dd > max_dd {
            max_dd = dd;
        }
    }
    max_dd
}

/// Longest run of outcomes `<= 0`, in input order.
pub fn max_consecutive_losses(outcomes: &[f64]) -> u32 {
    let mut current = 0u32;
    let mut longest = 0u32;
    for outcome in outcomes {
        if *outcome <= 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn mean_and_stddev_basics() {
        assert_eq!(mean(&[]), None);
        assert!((mean(&[1.0, 2.0, 3.0]).unwrap() - 2.0).abs() < EPS);
        assert_eq!(sample_stddev(&[]), 0.0);
        assert_eq!(sample_stddev(&[5.0]), 0.0);
        // [2, 4, 4, 4, 5, 5, 7, 9]: sample variance = 32/7.
        let s = sample_stddev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((s - (32.0f64 / 7.0).sqrt()).abs() < EPS);
    }

    #[test]
    fn percentile_singleton_collapses() {
        let v = [0.42];
        assert_eq!(percentile_sorted(&v, 0.10), Some(0.42));
        assert_eq!(percentile_sorted(&v, 0.50), Some(0.42));
        assert_eq!(percentile_sorted(&v, 0.90), Some(0.42));
    }

    #[test]
    fn percentile_interpolation_reference_values() {
        let v = [-0.20, -0.10, 0.00, 0.05, 0.10, 0.15, 0.20, 0.25, 0.30, 0.40];
        assert!((percentile_sorted(&v, 0.25).unwrap() - 0.0125).abs() < EPS);
        assert!((percentile_sorted(&v, 0.50).unwrap() - 0.125).abs() < EPS);
        assert!((percentile_sorted(&v, 0.75).unwrap() - 0.2375).abs() < EPS);
    }

    #[test]
    fn percentile_extremes_hit_min_max() {
        let v = [1.0, 2.0, 3.0];
        assert_eq!(percentile_sorted(&v, 0.0), Some(1.0));
        assert_eq!(percentile_sorted(&v, 1.0), Some(3.0));
    }

    #[test]
    fn drawdown_reference_sequence() {
        let outcomes = [0.10, 0.20, -0.15, -0.10, 0.05, -0.25];
        assert!((max_drawdown(&outcomes) - 0.45).abs() < EPS);
    }

    #[test]
    fn drawdown_from_zero_peak() {
        // Immediately negative: peak stays 0, drawdown is the trough depth.
        assert!((max_drawdown(&[-0.10, -0.20]) - 0.30).abs() < EPS);
        assert_eq!(max_drawdown(&[]), 0.0);
        assert_eq!(max_drawdown(&[0.1, 0.2]), 0.0);
    }

    #[test]
    fn consecutive_losses_reference_sequence() {
        // W L L W L L L W L
        let outcomes = [0.1, -0.1, -0.1, 0.1, -0.1, -0.1, -0.1, 0.1, -0.1];
        assert_eq!(max_consecutive_losses(&outcomes), 3);
    }

    #[test]
    fn zero_outcome_counts_as_loss_in_streaks() {
        assert_eq!(max_consecutive_losses(&[0.0, 0.0, 0.1, 0.0]), 2);
    }
}
