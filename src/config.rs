use crate::aggregate::ExcludedBucket;
use crate::calibration::CalibrationTable;
use crate::cycles::{CycleLabel, LightCycle};
use crate::error::{AnalysisError, Result};
use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

const MOVING_AVERAGE_SETTING: &str = "moving average number of points";
const MOVING_STDEV_SETTING: &str = "moving standard deviation number of points";

/// Reorganize core body temperature exports into light/dark cycles and
/// compare treatment groups
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing logger exports or path to a single export CSV
    #[arg(help = "Directory containing logger exports or path to a single export CSV")]
    pub input_path: PathBuf,

    /// Experiment configuration (JSON)
    #[arg(long, env = "CBT_CONFIG")]
    pub config: PathBuf,

    /// Settings CSV with "moving average number of points" style rows
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Directory for the CSV reports; nothing is written when omitted
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Moving average window, overrides the config and settings files
    #[arg(long)]
    pub mavg_window: Option<usize>,

    /// Moving standard deviation window, overrides the config and settings files
    #[arg(long)]
    pub mstdev_window: Option<usize>,

    /// Keep every n-th point of the group aggregates
    #[arg(long)]
    pub sample_every: Option<usize>,

    /// Cycles included in group aggregates, in order (e.g. Dark,Light)
    #[arg(long, value_delimiter = ',')]
    pub cycles: Option<Vec<CycleLabel>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentGroup {
    pub name: String,
    pub subjects: Vec<String>,
}

/// Everything one experiment run needs, read once and passed down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub light_cycle: LightCycle,
    pub groups: Vec<TreatmentGroup>,
    pub moving_average_window: usize,
    pub moving_stdev_window: usize,
    pub treatment_start: Option<NaiveDate>,
    /// Days before `treatment_start` in the pre-treatment window; all of
    /// them when unset.
    pub pre_treatment_days: Option<usize>,
    /// Final days from `treatment_start` on in the post-treatment window;
    /// all of them when unset.
    pub post_treatment_days: Option<usize>,
    /// Per-subject coefficients. Leave empty for already calibrated exports,
    /// whose values are then only rounded to 2 decimals.
    pub calibration: CalibrationTable,
    /// Subjects ignored entirely, e.g. animals with failed implants.
    pub excluded_subjects: Vec<String>,
    pub excluded_buckets: Vec<ExcludedBucket>,
    pub aggregate_cycles: Vec<CycleLabel>,
    pub sample_every: usize,
    /// Trailing logical days averaged for the per-cycle moving stdev report.
    pub moving_stdev_summary_days: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            light_cycle: LightCycle::default(),
            groups: Vec::new(),
            moving_average_window: 21,
            moving_stdev_window: 8,
            treatment_start: None,
            pre_treatment_days: None,
            post_treatment_days: None,
            calibration: CalibrationTable::default(),
            excluded_subjects: Vec::new(),
            excluded_buckets: Vec::new(),
            aggregate_cycles: vec![CycleLabel::Dark, CycleLabel::Light],
            sample_every: 1,
            moving_stdev_summary_days: 2,
        }
    }
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.light_cycle.validate()?;
        if self.moving_average_window == 0 {
            return Err(AnalysisError::InvalidWindow(self.moving_average_window));
        }
        if self.moving_stdev_window == 0 {
            return Err(AnalysisError::InvalidWindow(self.moving_stdev_window));
        }
        if self.sample_every == 0 {
            return Err(AnalysisError::InvalidConfig(
                "sample_every must be at least 1".to_string(),
            ));
        }
        if self.aggregate_cycles.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "aggregate_cycles must name at least one cycle".to_string(),
            ));
        }

        let mut owner: HashMap<&str, &str> = HashMap::new();
        for group in &self.groups {
            if self.groups.iter().filter(|g| g.name == group.name).count() > 1 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "group {} is declared more than once",
                    group.name
                )));
            }
            for subject in &group.subjects {
                match owner.insert(subject.as_str(), group.name.as_str()) {
                    Some(first) if first != group.name => {
                        return Err(AnalysisError::OverlappingGroups {
                            subject: subject.clone(),
                            first: first.to_string(),
                            second: group.name.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    pub fn apply_settings(&mut self, settings: &WindowSettings) {
        if let Some(window) = settings.moving_average {
            self.moving_average_window = window;
        }
        if let Some(window) = settings.moving_stdev {
            self.moving_stdev_window = window;
        }
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(window) = args.mavg_window {
            self.moving_average_window = window;
        }
        if let Some(window) = args.mstdev_window {
            self.moving_stdev_window = window;
        }
        if let Some(step) = args.sample_every {
            self.sample_every = step;
        }
        if let Some(cycles) = &args.cycles {
            self.aggregate_cycles = cycles.clone();
        }
    }

    pub fn is_excluded(&self, subject: &str) -> bool {
        self.excluded_subjects.iter().any(|s| s == subject)
    }
}

/// Window sizes found in a settings CSV.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct WindowSettings {
    pub moving_average: Option<usize>,
    pub moving_stdev: Option<usize>,
}

/// Scans a settings CSV for rows whose first cell names a window and whose
/// second cell holds its size.
pub fn read_window_settings(path: &Path) -> anyhow::Result<WindowSettings> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open settings: {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    let mut settings = WindowSettings::default();

    for result in rdr.records() {
        let record = result?;
        let (Some(name), Some(value)) = (record.get(0), record.get(1)) else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let slot = match name.as_str() {
            MOVING_AVERAGE_SETTING => &mut settings.moving_average,
            MOVING_STDEV_SETTING => &mut settings.moving_stdev,
            _ => continue,
        };
        let window: usize = value.trim().parse().with_context(|| {
            format!("Setting {:?} is not a whole number: {:?}", name, value)
        })?;
        *slot = Some(window);
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cbt-cycles-config-{}-{}", std::process::id(), name))
    }

    fn group(name: &str, subjects: &[&str]) -> TreatmentGroup {
        TreatmentGroup {
            name: name.to_string(),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn parses_json_with_defaults() {
        let json = r#"{
            "light_cycle": {"start": "06:00", "end": "17:59"},
            "groups": [
                {"name": "Vehicle", "subjects": ["3", "6"]},
                {"name": "Acyline", "subjects": ["2", "4"]}
            ],
            "treatment_start": "2014-08-14",
            "calibration": {"2": {"slope": 1.0, "intercept": 0.1}},
            "excluded_buckets": [{"day": "2014-08-14", "cycle": "Light"}]
        }"#;
        let config: ExperimentConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.light_cycle.end.to_string(), "17:59:00");
        assert_eq!(config.groups[1].name, "Acyline");
        assert_eq!(config.moving_average_window, 21);
        assert_eq!(config.moving_stdev_window, 8);
        assert_eq!(
            config.treatment_start,
            NaiveDate::from_ymd_opt(2014, 8, 14)
        );
        assert!(config.calibration.get("2").is_ok());
        assert_eq!(config.excluded_buckets[0].cycle, CycleLabel::Light);
        assert_eq!(
            config.aggregate_cycles,
            vec![CycleLabel::Dark, CycleLabel::Light]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_light_bounds_fail_to_parse() {
        let json = r#"{"light_cycle": {"start": "sunrise", "end": "18:00"}}"#;
        assert!(serde_json::from_str::<ExperimentConfig>(json).is_err());
    }

    #[test]
    fn overlapping_groups_are_rejected() {
        let config = ExperimentConfig {
            groups: vec![group("Vehicle", &["3", "6"]), group("Acyline", &["2", "6"])],
            ..ExperimentConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(AnalysisError::OverlappingGroups {
                subject: "6".to_string(),
                first: "Vehicle".to_string(),
                second: "Acyline".to_string(),
            })
        );
    }

    #[test]
    fn zero_windows_and_steps_are_rejected() {
        let config = ExperimentConfig {
            moving_stdev_window: 0,
            ..ExperimentConfig::default()
        };
        assert_eq!(config.validate(), Err(AnalysisError::InvalidWindow(0)));

        let config = ExperimentConfig {
            sample_every: 0,
            ..ExperimentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn inverted_light_cycle_is_rejected() {
        let mut config = ExperimentConfig::default();
        std::mem::swap(&mut config.light_cycle.start, &mut config.light_cycle.end);
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvertedLightCycle { .. })
        ));
    }

    #[test]
    fn reads_window_settings_from_csv() {
        let path = temp_path("user_modify.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "Experiment settings,").unwrap();
        writeln!(file, "moving average number of points,15").unwrap();
        writeln!(file, "Moving Standard Deviation Number Of Points, 6 ").unwrap();
        writeln!(file, "notes").unwrap();
        drop(file);

        let settings = read_window_settings(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(
            settings,
            WindowSettings {
                moving_average: Some(15),
                moving_stdev: Some(6),
            }
        );

        let mut config = ExperimentConfig::default();
        config.apply_settings(&settings);
        assert_eq!(config.moving_average_window, 15);
        assert_eq!(config.moving_stdev_window, 6);
    }

    #[test]
    fn command_line_overrides_win() {
        let args = Args::parse_from([
            "cbt-cycles",
            "data",
            "--config",
            "experiment.json",
            "--mavg-window",
            "9",
            "--cycles",
            "Light,Dark",
        ]);
        let mut config = ExperimentConfig::default();
        config.apply_settings(&WindowSettings {
            moving_average: Some(15),
            moving_stdev: Some(6),
        });
        config.apply_args(&args);

        assert_eq!(config.moving_average_window, 9);
        assert_eq!(config.moving_stdev_window, 6);
        assert_eq!(
            config.aggregate_cycles,
            vec![CycleLabel::Light, CycleLabel::Dark]
        );
    }
}
