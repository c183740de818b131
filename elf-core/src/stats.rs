//! Small statistics helpers shared by the fraud detector and meta-observer.

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator); 0.0 below two samples.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Sample standard deviation.
pub fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Least-squares fit of `value = slope * t + intercept`.
/// Returns `(slope, intercept, residual_std)`; `None` below two points or
/// with zero spread in `t`.
pub fn linear_fit(t: &[f64], values: &[f64]) -> Option<(f64, f64, f64)> {
    if t.len() != values.len() || t.len() < 2 {
        return None;
    }
    let n = t.len() as f64;
    let mean_t = mean(t);
    let mean_v = mean(values);

    let ss_tt: f64 = t.iter().map(|x| (x - mean_t).powi(2)).sum();
    if ss_tt == 0.0 {
        return None;
    }
    let ss_tv: f64 =
        t.iter().zip(values).map(|(x, y)| (x - mean_t) * (y - mean_v)).sum();

    let slope = ss_tv / ss_tt;
    let intercept = mean_v - slope * mean_t;

    let residual_ss: f64 = t
        .iter()
        .zip(values)
        .map(|(x, y)| {
            let predicted = slope * x + intercept;
            (y - predicted).powi(2)
        })
        .sum();
    let residual_std = (residual_ss / n).sqrt();

    Some((slope, intercept, residual_std))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_variance_basics() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((mean(&values) - 2.5).abs() < 1e-12);
        // sample variance of 1..4 is 5/3
        assert!((sample_variance(&values) - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(sample_variance(&[1.0]), 0.0);
    }

    #[test]
    fn perfect_line_fits_exactly() {
        let t: Vec<f64> = (0..10).map(f64::from).collect();
        let values: Vec<f64> = t.iter().map(|x| 2.0 * x + 1.0).collect();
        let (slope, intercept, residual) = linear_fit(&t, &values).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
        assert!(residual < 1e-9);
    }

    #[test]
    fn degenerate_fits_return_none() {
        assert!(linear_fit(&[1.0], &[2.0]).is_none());
        assert!(linear_fit(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
    }
}
