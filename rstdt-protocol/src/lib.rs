//! # rstdt-protocol
//!
//! Wire protocol implementation for rstdt.
//!
//! This crate provides:
//! - One-byte request header with 3-bit opcode and resource fields
//! - Big-endian price-range payload
//! - Lookup-table quantization of record attributes
//! - 9-bit packed catalog entries carried in 16-bit fields
//! - Length-prefixed response framing
//!
//! Everything here is pure: no I/O and no mutable state.

pub mod codec;
pub mod entry;
pub mod error;
pub mod frame;
pub mod header;
pub mod quantize;

pub use codec::{Decoder, Encoder};
pub use entry::{
    decode_entries, encode_entries, encode_entries_with, pack_entry, pack_entry_with,
    unpack_entry, Record, ENTRY_SIZE, MAX_RECORD_ID,
};
pub use error::ProtocolError;
pub use frame::{
    PriceRange, Request, ResponseFrame, LENGTH_PREFIX_SIZE, MAX_BODY_SIZE, PRICE_RANGE_SIZE,
};
pub use header::{decode_header, encode_header, Header, Opcode, HEADER_SIZE, MAX_FIELD_VALUE};
pub use quantize::{QuantizePolicy, AMENITIES_LOOKUP, PRICE_LOOKUP, RATING_LOOKUP};

/// Default port for the rstdt server.
pub const DEFAULT_PORT: u16 = 9999;

/// Number of resources addressable by the 3-bit resource field.
pub const MAX_RESOURCES: usize = 8;
