//! Price table rows and the search over them.
//!
//! Rows arrive from the sheet store as loosely typed `column -> text` maps.
//! [`normalize_row`] turns one into a [`PriceRecord`] against a fixed column
//! schema, and [`search`] filters a record set by a free-text query.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

/// A raw spreadsheet row: column name to cell text.
pub type RawRow = HashMap<String, String>;

/// Value of the order-only column that marks a special-order product.
pub const ORDER_ONLY_MARKER: &str = "V";

lazy_static! {
    static ref NON_NUMERIC: Regex = Regex::new(r"[^0-9.]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// The fixed set of price table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Identifier,
    Spec,
    ListPrice,
    DealerPrice,
    Description,
    OrderOnly,
}

impl Column {
    /// Every column, in price table order.
    pub const ALL: [Column; 6] = [
        Column::Identifier,
        Column::Spec,
        Column::ListPrice,
        Column::DealerPrice,
        Column::Description,
        Column::OrderOnly,
    ];

    /// Columns the search box looks at.
    pub const SEARCHABLE: [Column; 3] = [Column::Identifier, Column::Spec, Column::Description];

    /// Header text of the column in the price spreadsheet (already normalized).
    pub fn header(self) -> &'static str {
        match self {
            Column::Identifier => "NO.",
            Column::Spec => "規格",
            Column::ListPrice => "牌價",
            Column::DealerPrice => "經銷價",
            Column::Description => "說明",
            Column::OrderOnly => "訂購品(V)",
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    /// Position of the source row in the price table. Unlike `spec`, it is
    /// unique within one load: merged supplier sheets may repeat a part number.
    pub row: usize,
    pub identifier: String,
    /// Part number; never blank.
    pub spec: String,
    pub list_price: Option<f64>,
    /// `None` means "price on request": the record cannot be quoted.
    pub dealer_price: Option<f64>,
    pub description: String,
    pub is_order_only: bool,
}

impl PriceRecord {
    pub fn is_quotable(&self) -> bool {
        self.dealer_price.is_some()
    }

    fn field(&self, column: Column) -> &str {
        match column {
            Column::Identifier => &self.identifier,
            Column::Spec => &self.spec,
            Column::Description => &self.description,
            _ => "",
        }
    }
}

/// Parse a currency-like cell such as `"NT$1,250.00"`.
///
/// Every character other than an ASCII digit or `.` is dropped and the rest is
/// parsed as a float. Returns `None` when nothing parsable remains.
pub fn parse_currency(raw: &str) -> Option<f64> {
    let cleaned = NON_NUMERIC.replace_all(raw, "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Normalize a header cell: all whitespace removed, full-width parentheses
/// folded to ASCII.
pub fn normalize_header(raw: &str) -> String {
    WHITESPACE
        .replace_all(raw, "")
        .replace('（', "(")
        .replace('）', ")")
}

/// Build a record from a raw row, or `None` if the row has a blank spec.
///
/// Columns are looked up by normalized header; a missing column reads as blank.
/// The record's `row` is 0; [`normalize_rows`] sets it to the source position.
pub fn normalize_row(row: &RawRow) -> Option<PriceRecord> {
    let cells: HashMap<String, &str> = row
        .iter()
        .map(|(key, value)| (normalize_header(key), value.as_str()))
        .collect();
    let text = |column: Column| cell_text(&cells, column);

    let spec = text(Column::Spec);
    if spec.is_empty() {
        return None;
    }

    Some(PriceRecord {
        row: 0,
        identifier: text(Column::Identifier).to_string(),
        spec: spec.to_string(),
        list_price: parse_currency(text(Column::ListPrice)),
        dealer_price: parse_currency(text(Column::DealerPrice)),
        description: text(Column::Description).to_string(),
        is_order_only: text(Column::OrderOnly) == ORDER_ONLY_MARKER,
    })
}

fn cell_text<'a>(cells: &HashMap<String, &'a str>, column: Column) -> &'a str {
    cells.get(column.header()).copied().unwrap_or("").trim()
}

/// Normalize a whole table, dropping rows without a spec. Source order is kept
/// and each record remembers the index of the row it came from.
pub fn normalize_rows(rows: &[RawRow]) -> Vec<PriceRecord> {
    rows.iter()
        .enumerate()
        .filter_map(|(row, raw)| normalize_row(raw).map(|record| PriceRecord { row, ..record }))
        .collect()
}

/// Case-insensitive substring match of `query` against the searchable fields.
///
/// A blank query matches every record. Any other query is used as typed,
/// surrounding spaces included.
pub fn matches(record: &PriceRecord, query: &str) -> bool {
    if query.trim().is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    Column::SEARCHABLE
        .iter()
        .any(|column| record.field(*column).to_lowercase().contains(&needle))
}

/// Stable filter of `records` by `query`.
pub fn search<'a>(records: &'a [PriceRecord], query: &str) -> Vec<&'a PriceRecord> {
    records.iter().filter(|record| matches(record, query)).collect()
}

/// The record read from source row `row`, provided its spec is still `spec`.
///
/// A page rendered before a reload may carry a row index that now points at
/// another part; the spec check turns that into a miss.
pub fn find_by_row<'a>(records: &'a [PriceRecord], row: usize, spec: &str) -> Option<&'a PriceRecord> {
    let spec = spec.trim();
    records
        .iter()
        .find(|record| record.row == row)
        .filter(|record| record.spec == spec)
}
