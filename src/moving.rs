use crate::cycles::{CycleLabel, ExperimentSeries};
use crate::error::{AnalysisError, Result};
use crate::normalize::SecondsOfDay;
use crate::stats;
use chrono::NaiveDate;
use log::debug;
use std::ops::Range;

/// Slice of `len` values reduced for position `index` (0-based).
///
/// With `right = window / 2` and `left = right + 1`, interior positions take
/// `right` values on each side of the point. Near the start the slice is
/// anchored at 0 and near the end it runs to `len`, so edge windows shrink
/// instead of wrapping. For an even `window` the interior slice holds
/// `window + 1` values.
pub fn window_bounds(index: usize, len: usize, window: usize) -> Range<usize> {
    let right = window / 2;
    let left = right + 1;
    let count = index + 1;

    if count <= right {
        0..(count + right).min(len)
    } else if count + right >= len {
        // count > right here, so count >= left
        (count - left)..len
    } else {
        (count - left)..(count + right)
    }
}

fn moving_reduce<F>(series: &[f64], window: usize, reduce: F) -> Result<Vec<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    if window == 0 {
        return Err(AnalysisError::InvalidWindow(window));
    }
    Ok((0..series.len())
        .map(|i| reduce(&series[window_bounds(i, series.len(), window)]))
        .collect())
}

/// Centered moving average with shrinking edge windows. The output has the
/// same length as `series`.
pub fn moving_average(series: &[f64], window: usize) -> Result<Vec<f64>> {
    debug!(
        "Moving average over {} points, window {}",
        series.len(),
        window
    );
    moving_reduce(series, window, |values| {
        values.iter().sum::<f64>() / values.len() as f64
    })
}

/// Centered moving sample standard deviation (`n - 1`), same windows as
/// [`moving_average`]. Positions whose window holds a single value are
/// `NaN`, which happens everywhere for `window == 1`.
pub fn moving_stdev(series: &[f64], window: usize) -> Result<Vec<f64>> {
    debug!(
        "Moving stdev over {} points, window {}",
        series.len(),
        window
    );
    moving_reduce(series, window, stats::sample_stdev)
}

/// Moving statistics of one (day, subject, cycle) bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct MovingSeries {
    pub day: NaiveDate,
    pub subject: String,
    pub cycle: CycleLabel,
    pub times: Vec<SecondsOfDay>,
    pub values: Vec<f64>,
    pub average: Vec<f64>,
    pub stdev: Vec<f64>,
}

/// Windows every bucket of `series` independently. Missing values are
/// dropped before windowing.
pub fn moving_series(
    series: &ExperimentSeries,
    average_window: usize,
    stdev_window: usize,
) -> Result<Vec<MovingSeries>> {
    series
        .iter()
        .map(|(day, subject, cycle, samples)| {
            let (times, values): (Vec<SecondsOfDay>, Vec<f64>) = samples
                .iter()
                .filter_map(|s| s.value.map(|v| (s.time, v)))
                .unzip();
            Ok(MovingSeries {
                day,
                subject: subject.to_string(),
                cycle,
                average: moving_average(&values, average_window)?,
                stdev: moving_stdev(&values, stdev_window)?,
                times,
                values,
            })
        })
        .collect()
}
