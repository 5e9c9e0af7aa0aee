//! Encoder and decoder for rstdt requests and responses.

use crate::entry::{decode_entries, encode_entries_with, Record};
use crate::error::ProtocolError;
use crate::frame::{Request, ResponseFrame};
use crate::quantize::QuantizePolicy;
use bytes::{Bytes, BytesMut};

/// Encodes requests and responses.
pub struct Encoder;

impl Encoder {
    /// Encodes a request.
    pub fn encode_request(request: &Request) -> Result<BytesMut, ProtocolError> {
        request.encode()
    }

    /// Packs records and frames them as a response, using lenient quantization.
    pub fn encode_response(records: &[Record]) -> Result<BytesMut, ProtocolError> {
        Self::encode_response_with(records, QuantizePolicy::Lenient)
    }

    /// Packs records and frames them as a response.
    pub fn encode_response_with(
        records: &[Record],
        policy: QuantizePolicy,
    ) -> Result<BytesMut, ProtocolError> {
        let body = encode_entries_with(records, policy)?;
        ResponseFrame::encode(&body)
    }

    /// Returns the zero-length response used for empty or rejected requests.
    pub fn empty_response() -> BytesMut {
        ResponseFrame::empty()
    }
}

/// Buffers response bytes and yields complete responses.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next raw response body.
    pub fn decode_body(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        ResponseFrame::decode(&mut self.buffer)
    }

    /// Attempts to decode the next response into records.
    pub fn decode_response(&mut self) -> Result<Option<Vec<Record>>, ProtocolError> {
        match self.decode_body()? {
            Some(body) => Ok(Some(decode_entries(&body)?)),
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PriceRange;

    fn hotels() -> Vec<Record> {
        vec![Record::new(1, 250, 5, 0b1111), Record::new(2, 150, 3, 0b1010)]
    }

    #[test]
    fn test_encode_response_framing() {
        let encoded = Encoder::encode_response(&hotels()).unwrap();
        assert_eq!(encoded.as_ref(), &[0x00, 0x04, 0x00, 0x7F, 0x00, 0xA6]);
    }

    #[test]
    fn test_encoder_decoder_roundtrip() {
        let encoded = Encoder::encode_response(&hotels()).unwrap();

        let mut decoder = Decoder::new();
        decoder.extend(&encoded);

        let records = decoder.decode_response().unwrap().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], Record::new(1, 300, 5, 0b1111));
        assert_eq!(records[1], Record::new(2, 200, 3, 0b1010));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_partial_response_decoding() {
        let encoded = Encoder::encode_response(&hotels()).unwrap();
        let mut decoder = Decoder::new();

        decoder.extend(&encoded[..3]);
        assert!(decoder.decode_response().unwrap().is_none());

        decoder.extend(&encoded[3..]);
        let records = decoder.decode_response().unwrap().unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_odd_body_is_truncated_input() {
        let mut decoder = Decoder::new();
        decoder.extend(&[0x00, 0x03, 0x00, 0x40, 0x00]);
        let err = decoder.decode_response().unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn test_empty_response_decodes_to_nothing() {
        let mut decoder = Decoder::new();
        decoder.extend(&Encoder::empty_response());
        assert!(decoder.decode_response().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_strict_response_encoding() {
        let records = [Record::new(3, 75, 2, 0b1000)];
        assert!(Encoder::encode_response(&records).is_ok());
        assert!(Encoder::encode_response_with(&records, QuantizePolicy::Strict).is_err());
    }

    #[test]
    fn test_encode_request() {
        let request = Request::search(0, PriceRange::new(100, 300));
        let encoded = Encoder::encode_request(&request).unwrap();
        assert_eq!(encoded.len(), 5);
    }

    #[test]
    fn test_decoder_buffered() {
        let mut decoder = Decoder::default();
        assert_eq!(decoder.buffered(), 0);

        decoder.extend(b"abc");
        assert_eq!(decoder.buffered(), 3);

        decoder.clear();
        assert_eq!(decoder.buffered(), 0);
    }
}
