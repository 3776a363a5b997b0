//! Named tables of string cells, the stand-in for the remote spreadsheet.
//!
//! Everything above this layer only needs "all rows of a table", "find a row
//! by key", "update a cell", "append a row" and "replace a table".

use crate::error::PriceError;
use crate::record::RawRow;
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashMap;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::debug;

pub trait SheetStore: Send + Sync {
    /// Every data row of `table`, in sheet order.
    fn all_rows(&self, table: &str) -> Result<Vec<RawRow>, PriceError>;

    /// Index of the first row whose `column` equals `key` (both trimmed).
    fn find_row(&self, table: &str, column: &str, key: &str) -> Result<Option<usize>, PriceError>;

    fn update_cell(&self, table: &str, row: usize, column: &str, value: &str) -> Result<(), PriceError>;

    /// Append a row. Unknown columns are added to the header; a missing table is created.
    fn append_row(&self, table: &str, row: RawRow) -> Result<(), PriceError>;

    /// Clear `table` and write `headers` and `rows` in its place.
    fn replace_table(&self, table: &str, headers: &[String], rows: &[Vec<String>]) -> Result<(), PriceError>;
}

/// Header line plus data rows of one sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut table = Table { headers, rows: Vec::new() };
        for row in rows {
            table.push_padded(row);
        }
        table
    }

    fn push_padded(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len().max(row.len()), String::new());
        self.rows.push(row);
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    pub fn raw_rows(&self) -> Vec<RawRow> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .zip(row.iter())
                    .map(|(header, value)| (header.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }

    pub fn find(&self, column: &str, key: &str) -> Option<usize> {
        let col = self.column_index(column)?;
        let key = key.trim();
        self.rows
            .iter()
            .position(|row| row.get(col).map(|v| v.trim() == key).unwrap_or(false))
    }

    fn update(&mut self, table: &str, row: usize, column: &str, value: &str) -> Result<(), PriceError> {
        let col = self.column_index(column).ok_or_else(|| PriceError::ColumnNotFound {
            table: table.to_string(),
            column: column.to_string(),
        })?;
        let cells = self.rows.get_mut(row).ok_or_else(|| PriceError::RowOutOfRange {
            table: table.to_string(),
            row,
        })?;
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value.to_string();
        Ok(())
    }

    fn append(&mut self, mut row: RawRow) {
        let mut new_columns: Vec<String> = row
            .keys()
            .filter(|key| self.column_index(key).is_none())
            .cloned()
            .collect();
        new_columns.sort();
        self.headers.extend(new_columns);

        let cells = self
            .headers
            .iter()
            .map(|header| row.remove(header).unwrap_or_default())
            .collect();
        self.push_padded(cells);
    }
}

/// Tables kept in memory. Used for tests and demos.
#[derive(Debug, Default)]
pub struct MemorySheetStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, table: Table) -> Self {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), table);
        self
    }

    pub fn table(&self, name: &str) -> Option<Table> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl SheetStore for MemorySheetStore {
    fn all_rows(&self, table: &str) -> Result<Vec<RawRow>, PriceError> {
        self.table(table)
            .map(|t| t.raw_rows())
            .ok_or_else(|| PriceError::TableNotFound(table.to_string()))
    }

    fn find_row(&self, table: &str, column: &str, key: &str) -> Result<Option<usize>, PriceError> {
        self.table(table)
            .map(|t| t.find(column, key))
            .ok_or_else(|| PriceError::TableNotFound(table.to_string()))
    }

    fn update_cell(&self, table: &str, row: usize, column: &str, value: &str) -> Result<(), PriceError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let sheet = tables
            .get_mut(table)
            .ok_or_else(|| PriceError::TableNotFound(table.to_string()))?;
        sheet.update(table, row, column, value)
    }

    fn append_row(&self, table: &str, row: RawRow) -> Result<(), PriceError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.entry(table.to_string()).or_default().append(row);
        Ok(())
    }

    fn replace_table(&self, table: &str, headers: &[String], rows: &[Vec<String>]) -> Result<(), PriceError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.insert(table.to_string(), Table::new(headers.to_vec(), rows.to_vec()));
        Ok(())
    }
}

/// One `<table>.csv` file per table inside a directory.
///
/// Writes go through a temporary file and a rename, under a single lock.
#[derive(Debug)]
pub struct CsvSheetStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvSheetStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, PriceError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            create_dir_all(&dir)?;
        }
        Ok(CsvSheetStore {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", table))
    }

    pub fn read_table(&self, table: &str) -> Result<Table, PriceError> {
        let path = self.table_path(table);
        if !path.exists() {
            return Err(PriceError::TableNotFound(table.to_string()));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        debug!("Read {} rows from {}", rows.len(), path.display());
        Ok(Table::new(headers, rows))
    }

    fn write_table(&self, table: &str, sheet: &Table) -> Result<(), PriceError> {
        let path = self.table_path(table);
        let tmp = path.with_extension("csv.tmp");
        {
            let mut writer = WriterBuilder::new().flexible(true).from_path(&tmp)?;
            writer.write_record(&sheet.headers)?;
            for row in &sheet.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        debug!("Wrote {} rows to {}", sheet.rows.len(), path.display());
        Ok(())
    }

    fn modify<F>(&self, table: &str, create_missing: bool, change: F) -> Result<(), PriceError>
    where
        F: FnOnce(&mut Table) -> Result<(), PriceError>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sheet = match self.read_table(table) {
            Ok(sheet) => sheet,
            Err(PriceError::TableNotFound(_)) if create_missing => Table::default(),
            Err(e) => return Err(e),
        };
        change(&mut sheet)?;
        self.write_table(table, &sheet)
    }
}

impl SheetStore for CsvSheetStore {
    fn all_rows(&self, table: &str) -> Result<Vec<RawRow>, PriceError> {
        Ok(self.read_table(table)?.raw_rows())
    }

    fn find_row(&self, table: &str, column: &str, key: &str) -> Result<Option<usize>, PriceError> {
        Ok(self.read_table(table)?.find(column, key))
    }

    fn update_cell(&self, table: &str, row: usize, column: &str, value: &str) -> Result<(), PriceError> {
        self.modify(table, false, |sheet| sheet.update(table, row, column, value))
    }

    fn append_row(&self, table: &str, row: RawRow) -> Result<(), PriceError> {
        self.modify(table, true, |sheet| {
            sheet.append(row);
            Ok(())
        })
    }

    fn replace_table(&self, table: &str, headers: &[String], rows: &[Vec<String>]) -> Result<(), PriceError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_table(table, &Table::new(headers.to_vec(), rows.to_vec()))
    }
}
