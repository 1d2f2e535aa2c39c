//! Exponential Moving Average.
//!
//! Recursive: EMA[t] = k * value[t] + (1 - k) * EMA[t-1], k = 2/(period+1).
//! Seeded with the first sample, so the output is defined from index 0.

/// Compute an EMA series over `values`. Same length as the input.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    if values.is_empty() {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    out.push(prev);

    for &v in &values[1..] {
        prev = v * k + prev * (1.0 - k);
        out.push(prev);
    }

    out
}
