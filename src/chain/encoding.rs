//! Price encoding for the oracle pallet
//!
//! Prices travel as `(CurrencyId, base_units)` pairs where
//! `base_units = trunc(price * 10^decimals)`, rendered as a decimal string.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};

use crate::error::EncodeError;
use crate::types::{CurrencyId, PriceBatch};

/// Fixed-point precision of the oracle pallet (1 unit = 10^12 base units)
pub const DEFAULT_SCALE_DECIMALS: u32 = 12;

/// Largest precision representable by `Decimal`
pub const MAX_SCALE_DECIMALS: u32 = 28;

/// One encoded oracle value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedValue {
    pub currency: CurrencyId,
    pub value: u128,
}

impl FeedValue {
    pub fn new(currency: CurrencyId, value: u128) -> Self {
        Self { currency, value }
    }
}

impl Serialize for FeedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // u128 exceeds JSON number precision, so the value goes out as a string
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.currency)?;
        tuple.serialize_element(&self.value.to_string())?;
        tuple.end()
    }
}

/// Convert a price into integer base units, truncating excess precision.
///
/// Returns `None` for negative prices or when the result does not fit.
pub fn to_base_unit(price: Decimal, decimals: u32) -> Option<u128> {
    if price.is_sign_negative() && !price.is_zero() {
        return None;
    }
    if decimals > MAX_SCALE_DECIMALS {
        return None;
    }
    let scale = Decimal::try_from_i128_with_scale(10i128.pow(decimals), 0).ok()?;
    price.checked_mul(scale)?.trunc().to_u128()
}

/// Encode a whole batch, preserving order
pub fn encode_values(batch: &PriceBatch, decimals: u32) -> Result<Vec<FeedValue>, EncodeError> {
    batch
        .points
        .iter()
        .map(|point| {
            if point.price.is_sign_negative() && !point.price.is_zero() {
                return Err(EncodeError::NegativePrice {
                    currency: point.currency.clone(),
                    price: point.price.to_string(),
                });
            }
            let value = to_base_unit(point.price, decimals).ok_or_else(|| EncodeError::Overflow {
                currency: point.currency.clone(),
                price: point.price.to_string(),
            })?;
            Ok(FeedValue::new(CurrencyId::Token(point.currency.clone()), value))
        })
        .collect()
}
