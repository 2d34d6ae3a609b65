use anyhow::{Context, Result};
use cbt_cycles::data_loading::{date_from_file_name, detect_layout, read_records};
use std::path::Path;

/// The single export path argument, if that is exactly what was given.
fn export_argument(args: &[String]) -> Option<&str> {
    match args {
        [_, file] => Some(file.as_str()),
        _ => None,
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(file) = export_argument(&args) else {
        let program = args.first().map(String::as_str).unwrap_or("inspect_export");
        println!("Usage: {} <export_file>", program);
        std::process::exit(1);
    };

    let path = Path::new(file);
    let records = read_records(path)?;
    let layout = detect_layout(&records)
        .with_context(|| format!("No header with a Time column in {}", path.display()))?;

    println!("\nHeader (row {}):", layout.header_row + 1);
    println!("{:#?}", layout.headers);
    println!(
        "\nTime column: {} ({})",
        layout.time_column, layout.headers[layout.time_column]
    );
    println!("\nSubject columns:");
    for (column, subject) in &layout.subject_columns {
        println!("  {:>3}  subject {:<6} {}", column, subject, layout.headers[*column]);
    }
    match date_from_file_name(path) {
        Some(date) => println!("\nFile date: {}", date),
        None => println!("\nFile date: none, time cells must carry dates"),
    }
    println!("Data rows: {}", records.len() - layout.header_row - 1);

    Ok(())
}
