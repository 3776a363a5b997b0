//! Number formatting and the view models the pages and API render.

use crate::quote::QuoteState;
use crate::record::PriceRecord;
use serde::Serialize;

/// Shown in place of a missing price.
pub const PRICE_ON_REQUEST: &str = "Inquire";

/// Whole currency units with `,` thousands separators, e.g. `12,500`.
pub fn format_currency(value: f64) -> String {
    let formatted = format!("{:.0}", value);
    let (sign, digits) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted.as_str()),
    };

    let mut grouped = String::new();
    for (i, ch) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let grouped: String = grouped.chars().rev().collect();
    if sign.is_empty() || grouped.chars().all(|c| c == '0') {
        grouped
    } else {
        format!("{}{}", sign, grouped)
    }
}

pub fn format_price(value: Option<f64>) -> String {
    match value {
        Some(v) => format_currency(v),
        None => PRICE_ON_REQUEST.to_string(),
    }
}

/// Discount percentages always show two decimals.
pub fn format_percent(value: f64) -> String {
    format!("{:.2}", value)
}

/// Page layout variants. Both render the same record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    Table,
    Cards,
}

impl Layout {
    pub fn from_query(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("cards") | Some("card") => Layout::Cards,
            _ => Layout::Table,
        }
    }

    pub fn is_cards(self) -> bool {
        self == Layout::Cards
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub row: usize,
    pub identifier: String,
    pub spec: String,
    pub list_price: String,
    pub dealer_price: String,
    pub description: String,
    pub order_only: bool,
    pub quotable: bool,
}

impl From<&PriceRecord> for RecordView {
    fn from(record: &PriceRecord) -> Self {
        RecordView {
            row: record.row,
            identifier: record.identifier.clone(),
            spec: record.spec.clone(),
            list_price: format_price(record.list_price),
            dealer_price: format_price(record.dealer_price),
            description: record.description.clone(),
            order_only: record.is_order_only,
            quotable: record.is_quotable(),
        }
    }
}

/// Calculator triple with both raw and display values.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteView {
    pub spec: String,
    pub row: usize,
    pub base_price: f64,
    pub discount_percent: f64,
    pub sale_price: f64,
    pub base_price_text: String,
    pub discount_text: String,
    pub sale_price_text: String,
}

impl From<&QuoteState> for QuoteView {
    fn from(state: &QuoteState) -> Self {
        QuoteView {
            spec: state.record_key.clone(),
            row: state.row,
            base_price: state.base_price,
            discount_percent: state.discount_percent,
            sale_price: state.sale_price,
            base_price_text: format_currency(state.base_price),
            discount_text: format_percent(state.discount_percent),
            sale_price_text: format_currency(state.sale_price),
        }
    }
}
