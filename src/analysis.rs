use crate::aggregate::{
    aggregate, daily_time_averages, every_nth, treatment_windows, AggregatePoint, Reduction,
    Selection,
};
use crate::calibration::{calibrate, round2};
use crate::config::ExperimentConfig;
use crate::cycles::{reassign_days, CalendarRecording, CycleLabel, ExperimentSeries};
use crate::error::Result;
use crate::moving::{moving_series, MovingSeries};
use crate::normalize::{normalize, NormalizeReport, RawReading, SecondsOfDay};
use crate::summary::{moving_stdev_means, summarize, MovingStdevMean, SummaryRow};
use chrono::NaiveDate;
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Day range an aggregate covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateWindow {
    Entire,
    PreTreatment,
    PostTreatment,
}

impl fmt::Display for AggregateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateWindow::Entire => write!(f, "entire"),
            AggregateWindow::PreTreatment => write!(f, "pre"),
            AggregateWindow::PostTreatment => write!(f, "post"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupAggregate {
    pub group: String,
    pub window: AggregateWindow,
    pub reduction: Reduction,
    pub days: Vec<NaiveDate>,
    pub subjects: Vec<String>,
    pub points: Vec<AggregatePoint>,
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub normalize: NormalizeReport,
    /// Subjects dropped for lack of calibration coefficients.
    pub uncalibrated: BTreeSet<String>,
    pub days: Vec<NaiveDate>,
    pub subjects: Vec<String>,
    /// Every reading including missing ones, as used for alignment.
    pub all_readings: ExperimentSeries,
    /// Readings with a value.
    pub series: ExperimentSeries,
    pub summary: Vec<SummaryRow>,
    pub moving: Vec<MovingSeries>,
    pub aggregates: Vec<GroupAggregate>,
    pub moving_stdev_means: Vec<MovingStdevMean>,
    pub daily_averages: BTreeMap<NaiveDate, Vec<(SecondsOfDay, f64)>>,
}

/// Runs the whole pipeline over raw export cells.
pub fn run_analysis(raw: Vec<RawReading>, config: &ExperimentConfig) -> Result<AnalysisReport> {
    config.validate()?;

    let (readings, normalize_report) = normalize(raw);
    info!(
        "Normalized {} readings, rejected {}",
        normalize_report.accepted,
        normalize_report.rejected()
    );

    let before = readings.len();
    let readings: Vec<_> = readings
        .into_iter()
        .filter(|r| !config.is_excluded(&r.subject))
        .collect();
    if readings.len() < before {
        info!(
            "Skipped {} readings of excluded subjects {:?}",
            before - readings.len(),
            config.excluded_subjects
        );
    }

    let (readings, uncalibrated) = if config.calibration.is_empty() {
        info!("No calibration configured, using exported values rounded to 2 decimals");
        let rounded = readings
            .into_iter()
            .map(|mut r| {
                r.value = r.value.map(round2);
                r
            })
            .collect();
        (rounded, BTreeSet::new())
    } else {
        let outcome = calibrate(readings, &config.calibration);
        (outcome.readings, outcome.uncalibrated)
    };

    let recording = CalendarRecording::from_readings(readings)?;
    let all_readings = reassign_days(&recording, &config.light_cycle);
    let series = all_readings.without_missing();
    let days = all_readings.days();
    let subjects = all_readings.subjects();
    info!(
        "Reassigned {} readings into {} days for {} subjects",
        all_readings.reading_count(),
        days.len(),
        subjects.len()
    );

    let summary = summarize(&series, &days, &subjects, &CycleLabel::ALL);
    let moving = moving_series(
        &series,
        config.moving_average_window,
        config.moving_stdev_window,
    )?;

    let aggregates = group_aggregates(&all_readings, &days, &subjects, config)?;

    let moving_stdev_means = moving_stdev_means(
        &series,
        &subjects,
        &days,
        config.moving_stdev_summary_days,
        &config.excluded_buckets,
        config.moving_stdev_window,
    )?;

    let daily_averages = daily_time_averages(&series);

    Ok(AnalysisReport {
        normalize: normalize_report,
        uncalibrated,
        days,
        subjects,
        all_readings,
        series,
        summary,
        moving,
        aggregates,
        moving_stdev_means,
        daily_averages,
    })
}

fn day_windows(
    days: &[NaiveDate],
    config: &ExperimentConfig,
) -> Vec<(AggregateWindow, Vec<NaiveDate>)> {
    let mut windows = vec![(AggregateWindow::Entire, days.to_vec())];
    if let Some(start) = config.treatment_start {
        let split = treatment_windows(
            days,
            start,
            config.pre_treatment_days.unwrap_or(usize::MAX),
            config.post_treatment_days.unwrap_or(usize::MAX),
        );
        windows.push((AggregateWindow::PreTreatment, split.pre));
        windows.push((AggregateWindow::PostTreatment, split.post));
    }
    windows
}

fn group_aggregates(
    all_readings: &ExperimentSeries,
    days: &[NaiveDate],
    present: &[String],
    config: &ExperimentConfig,
) -> Result<Vec<GroupAggregate>> {
    let windows = day_windows(days, config);
    let mut out = Vec::new();

    for group in &config.groups {
        let mut roster = Vec::new();
        for subject in &group.subjects {
            if present.contains(subject) {
                roster.push(subject.clone());
            } else {
                warn!("Group {}: no readings for subject {}", group.name, subject);
            }
        }
        if roster.is_empty() {
            warn!("Group {} has no subjects with data, skipping", group.name);
            continue;
        }

        for (window, window_days) in &windows {
            let selection = Selection::new(window_days.clone(), config.aggregate_cycles.clone())
                .excluding(&config.excluded_buckets);
            for reduction in Reduction::ALL {
                let points = aggregate(all_readings, &selection, &roster, reduction)?;
                out.push(GroupAggregate {
                    group: group.name.clone(),
                    window: *window,
                    reduction,
                    days: window_days.clone(),
                    subjects: roster.clone(),
                    points: every_nth(&points, config.sample_every),
                });
            }
        }
        info!(
            "Aggregated group {} ({} subjects) over {} windows",
            group.name,
            roster.len(),
            windows.len()
        );
    }
    Ok(out)
}
