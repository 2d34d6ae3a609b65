//! Small reductions shared by the summary, rolling and aggregation code.
//!
//! Two standard deviations live here on purpose: the population form
//! (denominator `n`) for descriptive summaries and cross-subject aggregates,
//! and the sample form (denominator `n - 1`) for moving windows.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn sum_squared_deviations(values: &[f64], mean: f64) -> f64 {
    values
        .iter()
        .map(|&x| {
            let diff = x - mean;
            diff * diff
        })
        .sum::<f64>()
}

/// Population standard deviation, `None` for an empty slice.
pub fn population_stdev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some((sum_squared_deviations(values, m) / values.len() as f64).sqrt())
}

/// Sample standard deviation. `NaN` below two values.
pub fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    (sum_squared_deviations(values, m) / (values.len() - 1) as f64).sqrt()
}

/// Standard error of the mean from the population standard deviation.
pub fn standard_error(values: &[f64]) -> Option<f64> {
    population_stdev(values).map(|sd| sd / (values.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_and_sample_forms_differ() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), Some(5.0));
        assert_eq!(population_stdev(&values), Some(2.0));
        assert!((sample_stdev(&values) - 2.138_089_935_299_395).abs() < 1e-12);
        assert_eq!(standard_error(&values), Some(2.0 / 8f64.sqrt()));
    }

    #[test]
    fn empty_and_single_inputs() {
        assert_eq!(mean(&[]), None);
        assert_eq!(population_stdev(&[]), None);
        assert_eq!(population_stdev(&[36.6]), Some(0.0));
        assert!(sample_stdev(&[36.6]).is_nan());
        assert!(sample_stdev(&[]).is_nan());
    }
}
