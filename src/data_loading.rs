use crate::normalize::{parse_timestamp, RawReading};
use anyhow::{bail, Context, Result};
use chrono::{Days, NaiveDate};
use csv::StringRecord;
use log::{debug, info};
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXPORT_EXTENSIONS: &[&str] = &["csv", "txt"];
const FILE_DATE_FORMATS: &[&str] = &["%m-%d-%y", "%m-%d-%Y", "%Y-%m-%d"];

/// Where the useful parts of an export sit.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportLayout {
    /// Zero-based row of the header, after any preamble.
    pub header_row: usize,
    pub headers: Vec<String>,
    pub time_column: usize,
    /// Column index and subject id for each temperature column.
    pub subject_columns: Vec<(usize, String)>,
}

/// All export files under `input`, sorted by path. A file path is returned
/// as is.
pub fn discover_exports(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut exports = Vec::new();
    for entry in WalkDir::new(input).follow_links(true) {
        let entry =
            entry.with_context(|| format!("Failed to walk export directory: {}", input.display()))?;
        let path = entry.path();
        let is_export = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| EXPORT_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if entry.file_type().is_file() && is_export {
            exports.push(path.to_path_buf());
        }
    }
    exports.sort();

    if exports.is_empty() {
        bail!("No export files found in {}", input.display());
    }
    Ok(exports)
}

/// Calendar date leading the part of a file name before the first comma,
/// e.g. `8-11-14, Dark Cycle.csv` or `8-11-14 Light only, Light Cycle.csv`.
pub fn date_from_file_name(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    let token = stem.split(',').next()?.split_whitespace().next()?;
    FILE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
}

/// `"2 Veh Deg. C Data"` -> `"2"`
pub fn subject_label(column: &str) -> Option<String> {
    column.split_whitespace().next().map(str::to_string)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(needle)
}

/// Finds the header row past any preamble: the first row with a `Time`
/// column next to at least one other named column.
pub fn detect_layout(records: &[StringRecord]) -> Option<ExportLayout> {
    for (row, record) in records.iter().enumerate() {
        let headers: Vec<String> = record.iter().map(|h| h.trim().to_string()).collect();
        let Some(time_column) = headers.iter().position(|h| contains_ignore_case(h, "time"))
        else {
            continue;
        };

        let others = || {
            headers
                .iter()
                .enumerate()
                .filter(move |(i, h)| *i != time_column && !h.is_empty())
        };
        let mut subject_columns: Vec<(usize, String)> = others()
            .filter(|(_, h)| contains_ignore_case(h, "data"))
            .filter_map(|(i, h)| subject_label(h).map(|s| (i, s)))
            .collect();
        if subject_columns.is_empty() {
            subject_columns = others()
                .filter_map(|(i, h)| subject_label(h).map(|s| (i, s)))
                .collect();
        }
        if subject_columns.is_empty() {
            continue;
        }

        return Some(ExportLayout {
            header_row: row,
            headers,
            time_column,
            subject_columns,
        });
    }
    None
}

pub fn read_records(path: &Path) -> Result<Vec<StringRecord>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open export: {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // preamble rows are shorter than data rows
        .from_reader(file);

    let mut records = Vec::new();
    for result in rdr.records() {
        records.push(result.with_context(|| format!("Failed to read {}", path.display()))?);
    }
    Ok(records)
}

/// Reads one wide export into raw readings, one per subject column per row.
///
/// Bare clock times get their calendar date from the file name, advanced by
/// a day whenever the clock goes backwards. Cells are passed on unparsed;
/// rejecting bad ones is the normalizer's job.
pub fn read_export(path: &Path) -> Result<Vec<RawReading>> {
    let records = read_records(path)?;
    let layout = detect_layout(&records)
        .with_context(|| format!("No header with a Time column in {}", path.display()))?;
    let rows = &records[layout.header_row + 1..];

    let first_embedded = || {
        rows.iter()
            .filter_map(|r| r.get(layout.time_column))
            .find_map(|cell| parse_timestamp(cell).ok().and_then(|(date, _)| date))
    };
    let Some(mut date) = date_from_file_name(path).or_else(first_embedded) else {
        bail!(
            "Cannot tell the calendar date of {}: prefix the file name with it (e.g. \"8-11-14, Dark Cycle.csv\") or export full date-times",
            path.display()
        );
    };

    let mut readings = Vec::new();
    let mut previous_clock = None;
    for record in rows {
        let clock = record.get(layout.time_column).unwrap_or("").trim();
        if clock.is_empty() {
            continue;
        }

        if let Ok((embedded, time)) = parse_timestamp(clock) {
            match embedded {
                Some(embedded) => date = embedded,
                None => {
                    if previous_clock.is_some_and(|prev| time < prev) {
                        date = date
                            .checked_add_days(Days::new(1))
                            .with_context(|| format!("Date overflow in {}", path.display()))?;
                        debug!("Clock wrapped in {}, now on {}", path.display(), date);
                    }
                }
            }
            previous_clock = Some(time);
        }

        for (column, subject) in &layout.subject_columns {
            readings.push(RawReading {
                subject: subject.clone(),
                date,
                clock: clock.to_string(),
                value: record.get(*column).unwrap_or("").to_string(),
            });
        }
    }

    info!(
        "Loaded {} cells for {} subjects from {}",
        readings.len(),
        layout.subject_columns.len(),
        path.display()
    );
    Ok(readings)
}

pub fn load_exports(paths: &[PathBuf]) -> Result<Vec<RawReading>> {
    let mut all = Vec::new();
    for path in paths {
        println!("Loading file: {}", path.display());
        all.extend(read_export(path)?);
    }
    Ok(all)
}
