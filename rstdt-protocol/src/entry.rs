//! Bit-packed catalog entries.
//!
//! Each record is packed into 9 bits and sent as a 16-bit big-endian field:
//!
//! ```text
//!  15        9   8   7   6   5   4   3   2   1   0
//! +-----------+-----------+-------+-------+-------+
//! |  unused   |    id     | price | rating| amen. |
//! +-----------+-----------+-------+-------+-------+
//! ```

use crate::error::ProtocolError;
use crate::quantize::{
    dequantize_amenities, dequantize_price, dequantize_rating, quantize_amenities_with,
    quantize_price, quantize_rating_with, QuantizePolicy, AMENITIES_LOOKUP, INDEX_MASK,
    RATING_LOOKUP,
};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Size of one packed entry on the wire.
pub const ENTRY_SIZE: usize = 2;

/// Largest record id that fits the 3-bit id field.
pub const MAX_RECORD_ID: u8 = 0b111;

const ID_SHIFT: u16 = 6;
const PRICE_SHIFT: u16 = 4;
const RATING_SHIFT: u16 = 2;
const ID_MASK: u16 = 0b111;
const INDEX_MASK_16: u16 = INDEX_MASK as u16;

/// A catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub id: u8,
    pub price: u32,
    pub rating: u8,
    /// 4-bit feature flag set.
    pub amenities: u8,
}

impl Record {
    pub fn new(id: u8, price: u32, rating: u8, amenities: u8) -> Self {
        Self {
            id,
            price,
            rating,
            amenities,
        }
    }

    /// Returns the record as the peer will see it after a pack/unpack cycle.
    pub fn quantized(&self) -> Record {
        unpack_entry(pack_unchecked(self, QuantizePolicy::Lenient).unwrap_or(0))
    }

    /// Returns whether rating and amenities survive quantization unchanged.
    pub fn is_exactly_representable(&self) -> bool {
        RATING_LOOKUP.contains(&self.rating) && AMENITIES_LOOKUP.contains(&self.amenities)
    }
}

/// Packs a record using the lenient quantization policy.
pub fn pack_entry(record: &Record) -> Result<u16, ProtocolError> {
    pack_entry_with(record, QuantizePolicy::Lenient)
}

/// Packs a record into its 9-bit form.
///
/// Fails with [`ProtocolError::InvalidArgument`] if `id` does not fit 3 bits.
pub fn pack_entry_with(record: &Record, policy: QuantizePolicy) -> Result<u16, ProtocolError> {
    if record.id > MAX_RECORD_ID {
        return Err(ProtocolError::InvalidArgument {
            field: "id",
            value: record.id as u32,
            max: MAX_RECORD_ID as u32,
        });
    }
    pack_unchecked(record, policy)
}

fn pack_unchecked(record: &Record, policy: QuantizePolicy) -> Result<u16, ProtocolError> {
    let price = quantize_price(record.price) as u16;
    let rating = quantize_rating_with(record.rating, policy)? as u16;
    let amenities = quantize_amenities_with(record.amenities, policy)? as u16;

    Ok(((record.id as u16 & ID_MASK) << ID_SHIFT)
        | (price << PRICE_SHIFT)
        | (rating << RATING_SHIFT)
        | amenities)
}

/// Unpacks a 16-bit field into a record of quantization representatives.
pub fn unpack_entry(packed: u16) -> Record {
    let id = ((packed >> ID_SHIFT) & ID_MASK) as u8;
    let price = ((packed >> PRICE_SHIFT) & INDEX_MASK_16) as u8;
    let rating = ((packed >> RATING_SHIFT) & INDEX_MASK_16) as u8;
    let amenities = (packed & INDEX_MASK_16) as u8;

    Record {
        id,
        price: dequantize_price(price),
        rating: dequantize_rating(rating),
        amenities: dequantize_amenities(amenities),
    }
}

/// Encodes records in order, two bytes each.
pub fn encode_entries(records: &[Record]) -> Result<Bytes, ProtocolError> {
    encode_entries_with(records, QuantizePolicy::Lenient)
}

pub fn encode_entries_with(
    records: &[Record],
    policy: QuantizePolicy,
) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::with_capacity(records.len() * ENTRY_SIZE);
    for record in records {
        buf.put_u16(pack_entry_with(record, policy)?);
    }
    Ok(buf.freeze())
}

/// Decodes a body of packed entries in arrival order.
pub fn decode_entries(bytes: &[u8]) -> Result<Vec<Record>, ProtocolError> {
    if bytes.len() % ENTRY_SIZE != 0 {
        return Err(ProtocolError::TruncatedInput {
            needed: bytes.len() + 1,
            available: bytes.len(),
        });
    }

    Ok(bytes
        .chunks_exact(ENTRY_SIZE)
        .map(|chunk| unpack_entry(u16::from_be_bytes([chunk[0], chunk[1]])))
        .collect())
}
