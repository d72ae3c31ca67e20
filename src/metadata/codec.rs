//! Interchangeable encodings for the side-car record.
//!
//! A [`MetadataStore`](super::MetadataStore) is bound to exactly one codec
//! for its whole lifetime; the two encodings are drop-in equivalent but are
//! never mixed within one side-car file.

use std::fmt::Debug;

use super::Metadata;

/// Boxed error returned by codec implementations.
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Serializes and deserializes a [`Metadata`] record.
pub trait MetadataCodec: Debug + Send + Sync {
    /// Short name used in error messages and logs.
    fn name(&self) -> &'static str;

    /// Encodes the full record.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error.
    fn encode(&self, record: &Metadata) -> Result<Vec<u8>, CodecError>;

    /// Decodes a record previously produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns the deserializer's error for malformed input.
    fn decode(&self, bytes: &[u8]) -> Result<Metadata, CodecError>;
}

/// Compact binary encoding (bincode).
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl MetadataCodec for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn encode(&self, record: &Metadata) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(record)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Metadata, CodecError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Human-inspectable encoding (pretty-printed JSON, checksums as hex).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MetadataCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, record: &Metadata) -> Result<Vec<u8>, CodecError> {
        let mut bytes = serde_json::to_vec_pretty(record)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Metadata, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata {
            expected_full_checksum: vec![0xde, 0xad, 0xbe, 0xef],
            validator: "Wed, 21 Oct 2015 07:28:00 GMT".to_string(),
            resume_offset: 5 * 1024 * 1024,
            resume_digest: vec![0x01; 32],
        }
    }

    #[test]
    fn test_json_codec_writes_checksums_as_hex() {
        let bytes = JsonCodec.encode(&sample()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"deadbeef\""), "Expected hex checksum in: {text}");
        assert!(text.contains("\"resume_offset\": 5242880"), "got: {text}");
    }

    #[test]
    fn test_binary_codec_is_smaller_than_json() {
        let record = sample();
        let binary = BinaryCodec.encode(&record).unwrap();
        let json = JsonCodec.encode(&record).unwrap();
        assert!(binary.len() < json.len());
        assert_eq!(BinaryCodec.decode(&binary).unwrap(), record);
    }

    #[test]
    fn test_codecs_decode_empty_record() {
        let empty = Metadata::default();
        for codec in [&BinaryCodec as &dyn MetadataCodec, &JsonCodec] {
            let bytes = codec.encode(&empty).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), empty, "codec {}", codec.name());
        }
    }

    #[test]
    fn test_json_codec_rejects_bad_hex() {
        let raw = br#"{"expected_full_checksum":"zz","validator":"","resume_offset":0,"resume_digest":""}"#;
        assert!(JsonCodec.decode(raw).is_err());
    }

    #[test]
    fn test_binary_codec_rejects_truncated_input() {
        let bytes = BinaryCodec.encode(&sample()).unwrap();
        assert!(BinaryCodec.decode(&bytes[..bytes.len() / 2]).is_err());
    }
}
