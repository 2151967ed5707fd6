//! Mathematical utility functions.

/// Log-sum-exp of a slice; `-inf` for an empty slice.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Normalize log-weights into probabilities in place.
pub fn softmax_in_place(log_weights: &mut [f64]) {
    let lse = log_sum_exp(log_weights);
    for w in log_weights.iter_mut() {
        *w = (*w - lse).exp();
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator); zero below two values.
pub fn variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - 1) as f64
}

pub fn squared_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}
