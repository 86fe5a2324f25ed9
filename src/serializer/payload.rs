//! Record payload codecs.

use std::io::{self, Read, Write};

use facepack_format::Record;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde_json::{Map, Value};

use crate::descriptor::IMAGE_KIND;

/// Errors for payload encoding and decoding
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("JSON canonicalization failed: {0}")]
    Canonical(String),

    #[error("deflate failed: {0}")]
    Compression(#[from] io::Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A decoded record payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    /// Raw image bytes.
    Image(Vec<u8>),
    /// Inflated component data.
    Data(Value),
}

/// JCS-canonicalize `data` and deflate it.
pub fn encode_data(data: &Map<String, Value>) -> Result<Vec<u8>, PayloadError> {
    let json = serde_json_canonicalizer::to_vec(data)
        .map_err(|e| PayloadError::Canonical(e.to_string()))?;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Decode the payload of a container record according to its kind.
pub fn decode_payload(record: &Record) -> Result<DecodedPayload, PayloadError> {
    if record.kind == IMAGE_KIND {
        return Ok(DecodedPayload::Image(record.payload.clone()));
    }
    let mut json = Vec::new();
    DeflateDecoder::new(record.payload.as_slice()).read_to_end(&mut json)?;
    Ok(DecodedPayload::Data(serde_json::from_slice(&json)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encoded_json_is_key_sorted() {
        let mut data = Map::new();
        data.insert("zeta".to_string(), json!(1));
        data.insert("alpha".to_string(), json!({"b": true, "a": null}));

        let mut json = Vec::new();
        DeflateDecoder::new(encode_data(&data).unwrap().as_slice())
            .read_to_end(&mut json)
            .unwrap();
        assert_eq!(
            String::from_utf8(json).unwrap(),
            r#"{"alpha":{"a":null,"b":true},"zeta":1}"#
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let record = Record::new("Text", b"not deflate at all".to_vec());
        assert!(decode_payload(&record).is_err());
    }

    #[test]
    fn test_decode_image_is_passthrough() {
        let record = Record::new("Image", vec![1, 2, 3]);
        assert_eq!(
            decode_payload(&record).unwrap(),
            DecodedPayload::Image(vec![1, 2, 3])
        );
    }
}
