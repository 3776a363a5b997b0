//! Two-way discount and price calculator.
//!
//! A quote starts from a record's dealer price. Editing the discount
//! recomputes the sale price and editing the sale price recomputes the
//! discount; an edit never recomputes the field that was edited.

use crate::error::PriceError;
use crate::record::PriceRecord;
use serde::Serialize;

/// Discount every fresh quote starts at.
pub const FULL_PRICE_PERCENT: f64 = 100.0;

/// Round to the nearest whole currency unit, ties going up.
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sale price for `discount_percent` of `base_price`, in whole units.
pub fn sale_from_discount(base_price: f64, discount_percent: f64) -> f64 {
    round_half_up(base_price * discount_percent / 100.0)
}

/// Discount percentage (two decimals) that `sale_price` represents.
///
/// A zero base price yields 0.
pub fn discount_from_sale(base_price: f64, sale_price: f64) -> f64 {
    if base_price > 0.0 {
        round_to_cents(sale_price / base_price * 100.0)
    } else {
        0.0
    }
}

/// Calculator fields for the record being quoted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteState {
    /// Spec of the record the quote belongs to.
    pub record_key: String,
    /// Source row of that record.
    pub row: usize,
    pub base_price: f64,
    pub discount_percent: f64,
    pub sale_price: f64,
}

impl QuoteState {
    /// Fresh quote at full dealer price.
    ///
    /// Records without a dealer price are rejected.
    pub fn start(record: &PriceRecord) -> Result<Self, PriceError> {
        let base_price = record
            .dealer_price
            .ok_or_else(|| PriceError::PriceOnRequest(record.spec.clone()))?;
        Ok(QuoteState {
            record_key: record.spec.clone(),
            row: record.row,
            base_price,
            discount_percent: FULL_PRICE_PERCENT,
            sale_price: base_price,
        })
    }

    /// Whether `record` is the one this quote was started from, at the same
    /// dealer price.
    pub fn is_for(&self, record: &PriceRecord) -> bool {
        self.row == record.row && self.record_key == record.spec && record.dealer_price == Some(self.base_price)
    }

    pub fn with_discount(&self, discount_percent: f64) -> Result<Self, PriceError> {
        let discount_percent = checked_amount(discount_percent)?;
        Ok(QuoteState {
            discount_percent,
            sale_price: sale_from_discount(self.base_price, discount_percent),
            ..self.clone()
        })
    }

    pub fn with_sale_price(&self, sale_price: f64) -> Result<Self, PriceError> {
        let sale_price = checked_amount(sale_price)?;
        Ok(QuoteState {
            sale_price,
            discount_percent: discount_from_sale(self.base_price, sale_price),
            ..self.clone()
        })
    }
}

fn checked_amount(value: f64) -> Result<f64, PriceError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(PriceError::InvalidAmount(value))
    }
}

/// User actions on the calculator.
#[derive(Debug, Clone)]
pub enum QuoteEvent {
    Select(PriceRecord),
    EditDiscount(f64),
    EditPrice(f64),
    Deselect,
}

/// Per-login calculator session.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QuoteSession {
    #[default]
    Uninitialized,
    Active(QuoteState),
}

impl QuoteSession {
    /// Apply `event` and return the next session.
    ///
    /// On error `self` is untouched, so the caller keeps the previous state.
    pub fn apply(&self, event: QuoteEvent) -> Result<QuoteSession, PriceError> {
        match (self, event) {
            (QuoteSession::Active(state), QuoteEvent::Select(record)) if state.is_for(&record) => Ok(self.clone()),
            (_, QuoteEvent::Select(record)) => Ok(QuoteSession::Active(QuoteState::start(&record)?)),
            (QuoteSession::Active(state), QuoteEvent::EditDiscount(discount)) => {
                Ok(QuoteSession::Active(state.with_discount(discount)?))
            }
            (QuoteSession::Active(state), QuoteEvent::EditPrice(price)) => {
                Ok(QuoteSession::Active(state.with_sale_price(price)?))
            }
            (QuoteSession::Uninitialized, QuoteEvent::EditDiscount(_))
            | (QuoteSession::Uninitialized, QuoteEvent::EditPrice(_)) => Err(PriceError::NoActiveQuote),
            (_, QuoteEvent::Deselect) => Ok(QuoteSession::Uninitialized),
        }
    }

    pub fn state(&self) -> Option<&QuoteState> {
        match self {
            QuoteSession::Active(state) => Some(state),
            QuoteSession::Uninitialized => None,
        }
    }
}
