use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Discount price cannot be equal to zero")]
    ZeroPrice,
}

/// Availability bucket derived from a quantity, never stored independently of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockStatus {
    #[serde(rename = "out-of-stock")]
    OutOfStock,
    #[serde(rename = "low-on-stock")]
    LowOnStock,
    #[serde(rename = "in-stock")]
    InStock,
}

impl StockStatus {
    /// Wire form of the status, identical to its serde rename.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::OutOfStock => "out-of-stock",
            StockStatus::LowOnStock => "low-on-stock",
            StockStatus::InStock => "in-stock",
        }
    }
}

/// Derive the stock status for a quantity: zero is out of stock, one through
/// three is low, anything above is in stock.
pub fn stock_status(quantity: u32) -> StockStatus {
    match quantity {
        0 => StockStatus::OutOfStock,
        1..=3 => StockStatus::LowOnStock,
        _ => StockStatus::InStock,
    }
}

/// Percentage saved when `discounted` replaces `price`, rounded to two decimals.
///
/// Rounding nudges the value by `f64::EPSILON` before rounding so that values
/// like `1.005` land on `1.01` instead of falling to `1.0` through binary
/// representation error.
///
/// # Errors
///
/// Returns `PricingError::ZeroPrice` when either amount is zero.
pub fn discount_percentage(price: f64, discounted: f64) -> Result<f64, PricingError> {
    if price == 0.0 || discounted == 0.0 {
        return Err(PricingError::ZeroPrice);
    }
    let percentage = (100.0 * (price - discounted)) / price;
    Ok(round2(percentage))
}

fn round2(value: f64) -> f64 {
    ((value + f64::EPSILON) * 100.0).round() / 100.0
}
