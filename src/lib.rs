/*!
# Dealer Price List

A password-protected price lookup for authorized dealers, built in Rust.

## Overview

Dealers sign in, search the price list by part number or description, and
work out a quote from the dealer price: enter a discount to get the sale
price, or enter a sale price to get the discount. The price list lives in a
spreadsheet that is refreshed from supplier exports.

## Architecture

### Core
- **record**: price table schema, currency parsing, row normalization, search
- **quote**: discount/price conversion and the per-user quote session
- **display**: number formatting and view models

### Data
- **store**: named tables of string cells (CSV directory or in memory)
- **cache**: time-boxed snapshot of the normalized price list
- **merger**: import of supplier workbooks into the price and combinations tables

### Web (feature `web`)
- **login**: password hashing, login, password change/reset, sessions
- **mailer**: SMTP delivery of reset passwords
- **app**: routing, pages and the JSON API

## REST API Endpoints

- `GET /api/records?q=` - Filtered price records
- `GET /api/quote` - Current quote of the signed-in user
- `POST /api/quote` - Calculator action (`select`, `edit_discount`, `edit_price`, `deselect`)
- `POST /api/refresh` - Reload the price list from the store
*/

pub mod cache;
pub mod config;
pub mod display;
pub mod error;
pub mod merger;
pub mod quote;
pub mod record;
pub mod store;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod mailer;

pub use error::PriceError;
pub use quote::{QuoteEvent, QuoteSession, QuoteState, discount_from_sale, sale_from_discount};
pub use record::{PriceRecord, RawRow, matches, normalize_row, normalize_rows, parse_currency, search};
