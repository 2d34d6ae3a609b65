use crate::analysis::{AnalysisReport, GroupAggregate};
use crate::moving::MovingSeries;
use crate::normalize::{Rejection, SecondsOfDay};
use crate::summary::{BucketSummary, MovingStdevMean, SummaryRow, NO_DATA};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

fn create_writer(dir: &Path, name: &str) -> Result<csv::Writer<File>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    let full_path = dir.join(name);
    println!("Writing results to {}", full_path.display());
    let file = File::create(&full_path)
        .with_context(|| format!("Failed to create {}", full_path.display()))?;
    Ok(csv::Writer::from_writer(file))
}

fn format_value(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

/// Writes every report file of one run into `dir`.
pub fn write_reports(dir: &Path, report: &AnalysisReport) -> Result<()> {
    write_summary(dir, &report.summary)?;
    write_moving_stats(dir, &report.moving)?;
    write_group_aggregates(dir, &report.aggregates)?;
    write_daily_averages(dir, &report.daily_averages)?;
    write_moving_stdev_means(dir, &report.moving_stdev_means)?;
    write_rejections(dir, &report.normalize.rejections)?;
    Ok(())
}

pub fn write_summary(dir: &Path, rows: &[SummaryRow]) -> Result<()> {
    let mut writer = create_writer(dir, "summary.csv")?;
    writer.write_record(["day", "subject", "cycle", "n", "mean", "sem", "stdev"])?;

    for row in rows {
        let day = row.day.to_string();
        let cycle = row.cycle.to_string();
        match row.summary {
            BucketSummary::Stats {
                n,
                mean,
                sem,
                stdev,
            } => writer.write_record([
                day,
                row.subject.clone(),
                cycle,
                n.to_string(),
                mean.to_string(),
                sem.to_string(),
                stdev.to_string(),
            ])?,
            BucketSummary::NoData => writer.write_record([
                day,
                row.subject.clone(),
                cycle,
                "0".to_string(),
                NO_DATA.to_string(),
                String::new(),
                String::new(),
            ])?,
        }
    }

    writer.flush()?;
    Ok(())
}

pub fn write_moving_stats(dir: &Path, series: &[MovingSeries]) -> Result<()> {
    let mut writer = create_writer(dir, "moving_stats.csv")?;
    writer.write_record([
        "day",
        "subject",
        "cycle",
        "time",
        "value",
        "moving_average",
        "moving_stdev",
    ])?;

    for s in series {
        for i in 0..s.values.len() {
            writer.write_record([
                s.day.to_string(),
                s.subject.clone(),
                s.cycle.to_string(),
                s.times[i].to_string(),
                s.values[i].to_string(),
                format_value(s.average[i]),
                // single-point windows have no stdev
                format_value(s.stdev[i]),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

pub fn write_group_aggregates(dir: &Path, aggregates: &[GroupAggregate]) -> Result<()> {
    let mut writer = create_writer(dir, "group_aggregates.csv")?;
    writer.write_record([
        "group",
        "window",
        "reduction",
        "index",
        "value",
        "contributors",
    ])?;

    for aggregate in aggregates {
        for point in &aggregate.points {
            writer.write_record([
                aggregate.group.clone(),
                aggregate.window.to_string(),
                aggregate.reduction.to_string(),
                point.index.to_string(),
                point.value.map(format_value).unwrap_or_default(),
                point.contributors.to_string(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

pub fn write_daily_averages(
    dir: &Path,
    averages: &BTreeMap<NaiveDate, Vec<(SecondsOfDay, f64)>>,
) -> Result<()> {
    let mut writer = create_writer(dir, "daily_averages.csv")?;
    writer.write_record(["day", "time", "mean"])?;
    for (day, points) in averages {
        for (time, mean) in points {
            writer.write_record([day.to_string(), time.to_string(), mean.to_string()])?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_moving_stdev_means(dir: &Path, means: &[MovingStdevMean]) -> Result<()> {
    let mut writer = create_writer(dir, "moving_stdev_means.csv")?;
    writer.write_record(["subject", "cycle", "first_day", "last_day", "mean"])?;
    for m in means {
        let day_bound = |d: Option<&NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        writer.write_record([
            m.subject.clone(),
            m.cycle.to_string(),
            day_bound(m.days.first()),
            day_bound(m.days.last()),
            m.mean.map(format_value).unwrap_or_else(|| NO_DATA.to_string()),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_rejections(dir: &Path, rejections: &[Rejection]) -> Result<()> {
    let mut writer = create_writer(dir, "rejections.csv")?;
    if rejections.is_empty() {
        writer.write_record(["subject", "date", "clock", "value", "reason"])?;
    }
    for rejection in rejections {
        writer.serialize(rejection)?;
    }
    writer.flush()?;
    Ok(())
}
