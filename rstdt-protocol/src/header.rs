//! One-byte request header.
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! +---+---+---+---+---+---+---+---+
//! |  opcode   | resource  | rsvd  |
//! +---+---+---+---+---+---+---+---+
//! ```
//!
//! The reserved bits are written as zero and ignored on decode.

use crate::error::ProtocolError;

/// Size of the request header in bytes.
pub const HEADER_SIZE: usize = 1;

/// Largest value either 3-bit header field can hold.
pub const MAX_FIELD_VALUE: u8 = 0b111;

const OPCODE_SHIFT: u8 = 5;
const RESOURCE_SHIFT: u8 = 2;

/// Request opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Price-range search over one resource. Carries a 4-byte payload.
    Search,
    /// Any other 3-bit value. The server answers these with an empty response.
    Unsupported(u8),
}

impl Opcode {
    /// Wire value of the search opcode.
    pub const SEARCH: u8 = 0;

    pub fn from_bits(bits: u8) -> Self {
        match bits & MAX_FIELD_VALUE {
            Self::SEARCH => Opcode::Search,
            other => Opcode::Unsupported(other),
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            Opcode::Search => Self::SEARCH,
            Opcode::Unsupported(bits) => *bits,
        }
    }

    /// Returns whether requests with this opcode carry a price-range payload.
    pub fn has_payload(&self) -> bool {
        matches!(self, Opcode::Search)
    }
}

/// A decoded request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: Opcode,
    pub resource_id: u8,
}

impl Header {
    pub fn new(opcode: Opcode, resource_id: u8) -> Self {
        Self {
            opcode,
            resource_id,
        }
    }

    /// Creates a search header for the given resource.
    pub fn search(resource_id: u8) -> Self {
        Self::new(Opcode::Search, resource_id)
    }

    /// Encodes the header into its single wire byte.
    pub fn encode(&self) -> Result<u8, ProtocolError> {
        encode_header(self.opcode.bits(), self.resource_id)
    }

    /// Decodes a header byte. Every byte decodes to some header.
    pub fn decode(byte: u8) -> Self {
        let (opcode, resource_id) = decode_header(byte);
        Self {
            opcode: Opcode::from_bits(opcode),
            resource_id,
        }
    }
}

/// Packs an opcode and resource id into a header byte.
///
/// Both values must fit in 3 bits; larger values would spill into the
/// neighbouring field, so they are rejected with [`ProtocolError::InvalidArgument`].
pub fn encode_header(opcode: u8, resource_id: u8) -> Result<u8, ProtocolError> {
    check_field("opcode", opcode)?;
    check_field("resource_id", resource_id)?;
    Ok((opcode << OPCODE_SHIFT) | (resource_id << RESOURCE_SHIFT))
}

/// Splits a header byte into `(opcode, resource_id)`.
pub fn decode_header(byte: u8) -> (u8, u8) {
    let opcode = (byte >> OPCODE_SHIFT) & MAX_FIELD_VALUE;
    let resource_id = (byte >> RESOURCE_SHIFT) & MAX_FIELD_VALUE;
    (opcode, resource_id)
}

fn check_field(field: &'static str, value: u8) -> Result<(), ProtocolError> {
    if value > MAX_FIELD_VALUE {
        return Err(ProtocolError::InvalidArgument {
            field,
            value: value as u32,
            max: MAX_FIELD_VALUE as u32,
        });
    }
    Ok(())
}
