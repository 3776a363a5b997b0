//! Import of price spreadsheets exported by suppliers.
//!
//! Every workbook in the input folder is flattened into the price table:
//! each sheet's header row is located, its cells projected onto the fixed
//! price columns, and rows without a spec dropped. The bundled-set workbook
//! is imported separately into the combinations table.

use crate::config::{ImportSettings, SheetSettings};
use crate::error::PriceError;
use crate::record::{Column, normalize_header};
use crate::store::SheetStore;
use calamine::{Data, Reader, open_workbook_auto};
use csv::ReaderBuilder;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const SOURCE_FILE_COLUMN: &str = "來源檔案";
pub const SOURCE_SHEET_COLUMN: &str = "來源分頁";
pub const SERIES_COLUMN: &str = "系列";

/// Sheets of the combinations workbook that hold no set data.
pub const SKIPPED_COMBINATION_SHEETS: [&str; 2] = ["DATA", "經銷價(總)"];

/// How many leading rows are searched for the header row.
const HEADER_SCAN_ROWS: usize = 20;

/// One sheet as rows of cell text.
pub type Grid = Vec<Vec<String>>;

/// A workbook's sheets, in workbook order.
pub type Workbook = Vec<(String, Grid)>;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportSummary {
    pub files_read: usize,
    pub sheets_read: usize,
    pub price_rows: usize,
    /// `None` when no combinations workbook was found.
    pub combination_rows: Option<usize>,
    /// File name and error for each file that could not be read.
    pub failures: Vec<(String, String)>,
}

/// Index of the header row: the first of the leading rows whose joined,
/// normalized cells mention the spec column and a price column. Defaults to 0.
pub fn find_header_row(grid: &[Vec<String>]) -> usize {
    grid.iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| {
            let joined: String = row.iter().map(|cell| normalize_header(cell)).collect();
            joined.contains(Column::Spec.header())
                && (joined.contains(Column::DealerPrice.header()) || joined.contains(Column::ListPrice.header()))
        })
        .unwrap_or(0)
}

/// Header line of the price table: the fixed columns plus source file and sheet.
pub fn price_table_headers() -> Vec<String> {
    Column::ALL
        .iter()
        .map(|c| c.header().to_string())
        .chain([SOURCE_FILE_COLUMN.to_string(), SOURCE_SHEET_COLUMN.to_string()])
        .collect()
}

/// Project one supplier sheet onto the price table columns.
///
/// Missing columns are blank; rows whose spec is blank are dropped.
pub fn project_price_sheet(grid: &[Vec<String>], file: &str, sheet: &str) -> Grid {
    let header_idx = find_header_row(grid);
    let Some(header) = grid.get(header_idx) else {
        return Vec::new();
    };
    let header: Vec<String> = header.iter().map(|h| normalize_header(h)).collect();
    let positions: Vec<Option<usize>> = Column::ALL
        .iter()
        .map(|column| header.iter().position(|h| h == column.header()))
        .collect();
    let spec_pos = header.iter().position(|h| h == Column::Spec.header());

    grid.iter()
        .skip(header_idx + 1)
        .filter(|row| {
            spec_pos
                .and_then(|pos| row.get(pos))
                .is_some_and(|spec| !spec.trim().is_empty())
        })
        .map(|row| {
            positions
                .iter()
                .map(|pos| pos.and_then(|p| row.get(p)).cloned().unwrap_or_default())
                .chain([file.to_string(), sheet.to_string()])
                .collect()
        })
        .collect()
}

/// Rows of one combinations sheet keyed by its first-row headers, with the
/// sheet name added under the series column. Entirely blank rows are dropped.
fn combination_rows(grid: &[Vec<String>], sheet: &str) -> (Vec<String>, Grid) {
    let Some(first) = grid.first() else {
        return (Vec::new(), Vec::new());
    };
    let mut headers: Vec<String> = first
        .iter()
        .enumerate()
        .map(|(i, h)| match h.trim() {
            "" => format!("Unnamed: {}", i),
            name => name.to_string(),
        })
        .collect();
    headers.push(SERIES_COLUMN.to_string());

    let rows = grid
        .iter()
        .skip(1)
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| {
            let mut cells: Vec<String> = (0..headers.len() - 1)
                .map(|i| row.get(i).cloned().unwrap_or_default())
                .collect();
            cells.push(sheet.to_string());
            cells
        })
        .collect();
    (headers, rows)
}

/// Stack combination sheets under the union of their headers, in order of
/// first appearance.
pub fn merge_combination_sheets(workbook: &[(String, Grid)]) -> (Vec<String>, Grid) {
    let mut headers: Vec<String> = Vec::new();
    let mut merged: Vec<(Vec<String>, Grid)> = Vec::new();

    for (sheet, grid) in workbook {
        if SKIPPED_COMBINATION_SHEETS.contains(&sheet.as_str()) {
            continue;
        }
        let (sheet_headers, rows) = combination_rows(grid, sheet);
        for header in &sheet_headers {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }
        info!(" - combination sheet: {}", sheet);
        merged.push((sheet_headers, rows));
    }

    let rows = merged
        .into_iter()
        .flat_map(|(sheet_headers, rows)| {
            let mapping: Vec<Option<usize>> = headers
                .iter()
                .map(|h| sheet_headers.iter().position(|s| s == h))
                .collect();
            rows.into_iter().map(move |row| {
                mapping
                    .iter()
                    .map(|pos| pos.and_then(|p| row.get(p)).cloned().unwrap_or_default())
                    .collect::<Vec<String>>()
            })
        })
        .collect();
    (headers, rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read every sheet of an `.xlsx`/`.xls` workbook, or a `.csv` file as a
/// single sheet named after the file stem.
pub fn read_workbook(path: &Path) -> Result<Workbook, PriceError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    if extension.as_deref() == Some("csv") {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;
        let mut grid = Vec::new();
        for record in reader.records() {
            grid.push(record?.iter().map(str::to_string).collect());
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Sheet1")
            .to_string();
        return Ok(vec![(name, grid)]);
    }

    let mut workbook = open_workbook_auto(path)?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        let grid = range.rows().map(|row| row.iter().map(cell_text).collect()).collect();
        sheets.push((name, grid));
    }
    Ok(sheets)
}

fn is_spreadsheet(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()).map(|ext| ext.to_lowercase()).as_deref(),
        Some("xlsx") | Some("xls") | Some("csv")
    )
}

/// Writes imported workbooks into a sheet store.
pub struct PriceImporter<'a> {
    store: &'a dyn SheetStore,
    price_table: String,
    combinations_table: String,
    combination_file: String,
}

impl<'a> PriceImporter<'a> {
    pub fn new(store: &'a dyn SheetStore, sheets: &SheetSettings, import: &ImportSettings) -> Self {
        PriceImporter {
            store,
            price_table: sheets.price_table.clone(),
            combinations_table: sheets.combinations_table.clone(),
            combination_file: import.combination_file.clone(),
        }
    }

    /// Import every spreadsheet in `dir`.
    ///
    /// A file that fails to read is logged, recorded in the summary and
    /// skipped. Tables are only replaced when at least one row was read.
    pub fn import_folder(&self, dir: &Path) -> Result<ImportSummary, PriceError> {
        let mut files: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_spreadsheet(path))
            .collect();
        files.sort();

        let mut summary = ImportSummary::default();
        let mut price_rows: Grid = Vec::new();
        let mut combination_path = None;

        info!("--- Importing price sheets from {} ---", dir.display());
        for path in files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if file_name == self.combination_file {
                combination_path = Some(path);
                continue;
            }

            match read_workbook(&path) {
                Ok(workbook) => {
                    summary.files_read += 1;
                    for (sheet, grid) in workbook {
                        let rows = project_price_sheet(&grid, &file_name, &sheet);
                        if rows.is_empty() {
                            continue;
                        }
                        info!(" - read: {} / {} ({} rows)", file_name, sheet, rows.len());
                        summary.sheets_read += 1;
                        price_rows.extend(rows);
                    }
                }
                Err(e) => {
                    warn!(" x failed: {} - {}", file_name, e);
                    summary.failures.push((file_name, e.to_string()));
                }
            }
        }

        if !price_rows.is_empty() {
            self.store
                .replace_table(&self.price_table, &price_table_headers(), &price_rows)?;
            info!("Price table '{}' updated with {} rows", self.price_table, price_rows.len());
        }
        summary.price_rows = price_rows.len();

        match combination_path {
            Some(path) => match read_workbook(&path) {
                Ok(workbook) => {
                    let (headers, rows) = merge_combination_sheets(&workbook);
                    if !rows.is_empty() {
                        self.store.replace_table(&self.combinations_table, &headers, &rows)?;
                        info!("Combinations table '{}' updated with {} rows", self.combinations_table, rows.len());
                    }
                    summary.combination_rows = Some(rows.len());
                }
                Err(e) => {
                    warn!(" x combinations failed: {} - {}", self.combination_file, e);
                    summary.failures.push((self.combination_file.clone(), e.to_string()));
                }
            },
            None => warn!("{} not found, combinations not updated", self.combination_file),
        }

        Ok(summary)
    }
}
