use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::RecordError;
use super::period::parse_price_date;

/// A manually maintained price point: `date,symbol,price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// The date exactly as written, e.g. `May 30, 2025`.
    pub date_text: String,
    pub date: NaiveDate,
    pub symbol: String,
    pub price: Decimal,
}

impl PriceRecord {
    pub fn parse(date: &str, symbol: &str, price: &str) -> Result<Self, RecordError> {
        let date_text = date.trim();
        let parsed = parse_price_date(date_text).map_err(|_| RecordError::InvalidDate {
            column: "date",
            value: date_text.to_string(),
        })?;
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(RecordError::MissingValue { column: "symbol" });
        }
        let price_text = price.trim();
        let price = Decimal::from_str(price_text).map_err(|_| RecordError::InvalidNumber {
            column: "price",
            value: price_text.to_string(),
        })?;
        Ok(PriceRecord {
            date_text: date_text.to_string(),
            date: parsed,
            symbol: symbol.to_string(),
            price,
        })
    }
}

/// A spin-off: shares of `dst` were created out of holdings in `src`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinOffRecord {
    pub dst: String,
    pub src: String,
}

impl SpinOffRecord {
    pub fn parse(dst: &str, src: &str) -> Result<Self, RecordError> {
        let (dst, src) = (dst.trim(), src.trim());
        if dst.is_empty() {
            return Err(RecordError::MissingValue { column: "dst" });
        }
        if src.is_empty() {
            return Err(RecordError::MissingValue { column: "src" });
        }
        Ok(SpinOffRecord { dst: dst.to_string(), src: src.to_string() })
    }
}
