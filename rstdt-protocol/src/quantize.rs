//! Lookup-table quantization.
//!
//! Each record attribute is reduced to a 2-bit index into a fixed table.
//! Encoder and decoder must share byte-identical tables; there is no table
//! versioning on the wire.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};

/// Price bucket breakpoints, ascending. A price maps to the first bucket whose
/// breakpoint is at least the price, saturating at the last bucket.
pub const PRICE_LOOKUP: [u32; 4] = [50, 100, 200, 300];

/// Representable ratings.
pub const RATING_LOOKUP: [u8; 4] = [1, 3, 4, 5];

/// Representable amenity bitmasks.
pub const AMENITIES_LOOKUP: [u8; 4] = [0b0000, 0b1000, 0b1010, 0b1111];

/// Mask for a 2-bit table index.
pub const INDEX_MASK: u8 = 0b11;

/// How values missing from an exact-match table are treated on encode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizePolicy {
    /// Unmatched ratings and amenities silently become index 0.
    #[default]
    Lenient,
    /// Unmatched ratings and amenities are rejected.
    Strict,
}

/// Returns the bucket index for a price.
pub fn quantize_price(price: u32) -> u8 {
    PRICE_LOOKUP
        .iter()
        .position(|&breakpoint| price <= breakpoint)
        .unwrap_or(PRICE_LOOKUP.len() - 1) as u8
}

/// Returns the representative price of a bucket.
pub fn dequantize_price(index: u8) -> u32 {
    PRICE_LOOKUP[(index & INDEX_MASK) as usize]
}

/// Returns the table index of a rating, or 0 if it is not in the table.
pub fn quantize_rating(rating: u8) -> u8 {
    exact_index(&RATING_LOOKUP, rating).unwrap_or(0)
}

pub fn dequantize_rating(index: u8) -> u8 {
    RATING_LOOKUP[(index & INDEX_MASK) as usize]
}

/// Returns the table index of an amenity mask, or 0 if it is not in the table.
pub fn quantize_amenities(amenities: u8) -> u8 {
    exact_index(&AMENITIES_LOOKUP, amenities).unwrap_or(0)
}

pub fn dequantize_amenities(index: u8) -> u8 {
    AMENITIES_LOOKUP[(index & INDEX_MASK) as usize]
}

/// Quantizes a rating under the given policy.
pub fn quantize_rating_with(rating: u8, policy: QuantizePolicy) -> Result<u8, ProtocolError> {
    quantize_exact("rating", &RATING_LOOKUP, rating, policy)
}

/// Quantizes an amenity mask under the given policy.
pub fn quantize_amenities_with(
    amenities: u8,
    policy: QuantizePolicy,
) -> Result<u8, ProtocolError> {
    quantize_exact("amenities", &AMENITIES_LOOKUP, amenities, policy)
}

fn quantize_exact(
    field: &'static str,
    table: &[u8; 4],
    value: u8,
    policy: QuantizePolicy,
) -> Result<u8, ProtocolError> {
    match (exact_index(table, value), policy) {
        (Some(index), _) => Ok(index),
        (None, QuantizePolicy::Lenient) => Ok(0),
        (None, QuantizePolicy::Strict) => Err(ProtocolError::Unrepresentable {
            field,
            value: value as u32,
        }),
    }
}

fn exact_index(table: &[u8; 4], value: u8) -> Option<u8> {
    table.iter().position(|&v| v == value).map(|i| i as u8)
}
