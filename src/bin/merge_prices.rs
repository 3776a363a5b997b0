#![cfg(not(tarpaulin_include))]

use dealer_price::config::Settings;
use dealer_price::merger::PriceImporter;
use dealer_price::store::CsvSheetStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Rebuild the price and combinations tables from the supplier workbooks.
///
/// Usage: `merge_prices [config.toml] [input_dir]`
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;
    let input_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| settings.import.input_dir.clone());

    if !input_dir.is_dir() {
        eprintln!("Error: input folder {} does not exist", input_dir.display());
        return Ok(());
    }

    let store = CsvSheetStore::new(&settings.sheets.data_dir)?;
    let importer = PriceImporter::new(&store, &settings.sheets, &settings.import);
    let summary = importer.import_folder(&input_dir)?;

    println!(
        "Imported {} rows from {} sheets in {} files",
        summary.price_rows, summary.sheets_read, summary.files_read
    );
    match summary.combination_rows {
        Some(rows) => println!("Imported {} combination rows", rows),
        None => println!("No combinations workbook found"),
    }
    for (file, error) in &summary.failures {
        eprintln!("Failed: {} - {}", file, error);
    }
    Ok(())
}
