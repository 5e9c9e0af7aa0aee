//! Request and response framing.
//!
//! Request layout:
//!
//! ```text
//! +--------+-----------+-----------+
//! | header | price_min | price_max |
//! | 1 byte |  2 bytes  |  2 bytes  |
//! +--------+-----------+-----------+
//!          ^ present only for opcodes that carry a payload
//! ```
//!
//! Response layout:
//!
//! ```text
//! +--------+-------------------------------+
//! | length | body (packed entries)         |
//! | 2 bytes| length bytes, always even     |
//! +--------+-------------------------------+
//! ```

use crate::entry::ENTRY_SIZE;
use crate::error::ProtocolError;
use crate::header::{Header, HEADER_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the price-range payload.
pub const PRICE_RANGE_SIZE: usize = 4;

/// Size of the response length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Largest body a response can carry: the largest even `u16`.
pub const MAX_BODY_SIZE: usize = (u16::MAX as usize / ENTRY_SIZE) * ENTRY_SIZE;

/// Inclusive price filter sent with a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceRange {
    pub min: u16,
    pub max: u16,
}

impl PriceRange {
    pub fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    /// Returns whether a price falls within the range, bounds included.
    pub fn contains(&self, price: u32) -> bool {
        u32::from(self.min) <= price && price <= u32::from(self.max)
    }

    pub fn encode(&self) -> [u8; PRICE_RANGE_SIZE] {
        let [a, b] = self.min.to_be_bytes();
        let [c, d] = self.max.to_be_bytes();
        [a, b, c, d]
    }

    /// Decodes a range from the first four bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < PRICE_RANGE_SIZE {
            return Err(ProtocolError::TruncatedInput {
                needed: PRICE_RANGE_SIZE,
                available: buf.len(),
            });
        }
        Ok(Self {
            min: u16::from_be_bytes([buf[0], buf[1]]),
            max: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }
}

/// A request as sent by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub header: Header,
    pub price_range: Option<PriceRange>,
}

impl Request {
    /// Creates a search request.
    pub fn search(resource_id: u8, price_range: PriceRange) -> Self {
        Self {
            header: Header::search(resource_id),
            price_range: Some(price_range),
        }
    }

    /// Creates a request consisting of a bare header.
    pub fn bare(header: Header) -> Self {
        Self {
            header,
            price_range: None,
        }
    }

    /// Encodes the request. The price range is written only when the opcode
    /// carries a payload; a search without a range sends `0..=u16::MAX`.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + PRICE_RANGE_SIZE);
        buf.put_u8(self.header.encode()?);

        if self.header.opcode.has_payload() {
            let range = self
                .price_range
                .unwrap_or_else(|| PriceRange::new(0, u16::MAX));
            buf.put_slice(&range.encode());
        }

        Ok(buf)
    }
}

/// Length-prefixed response framing.
pub struct ResponseFrame;

impl ResponseFrame {
    /// Frames a response body.
    pub fn encode(body: &[u8]) -> Result<BytesMut, ProtocolError> {
        if body.len() > MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge {
                size: body.len(),
                max: MAX_BODY_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
        buf.put_u16(body.len() as u16);
        buf.put_slice(body);
        Ok(buf)
    }

    /// Returns the framed empty response.
    pub fn empty() -> BytesMut {
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE);
        buf.put_u16(0);
        buf
    }

    /// Decodes one response body from the front of `buf`.
    ///
    /// Returns `Ok(None)` if more data is needed. Bytes are consumed only when
    /// a complete frame is available.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let body_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        if buf.len() < LENGTH_PREFIX_SIZE + body_len {
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(buf.split_to(body_len).freeze()))
    }
}
