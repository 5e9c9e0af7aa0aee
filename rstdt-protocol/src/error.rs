//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("truncated input: need {needed} bytes, got {available}")]
    TruncatedInput { needed: usize, available: usize },

    #[error("invalid argument: {field} = {value} exceeds maximum {max}")]
    InvalidArgument {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("{field} value {value} has no exact entry in its lookup table")]
    Unrepresentable { field: &'static str, value: u32 },

    #[error("response body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },
}

impl ProtocolError {
    /// Returns whether the error came from an incomplete frame rather than bad values.
    pub fn is_truncation(&self) -> bool {
        matches!(self, ProtocolError::TruncatedInput { .. })
    }
}
