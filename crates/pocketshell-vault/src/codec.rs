//! Base64 conversions for byte fields in durable records.
//!
//! Salts, IVs and ciphertexts are stored as standard (padded) base64 strings
//! inside JSON records. The [`b64`] submodule plugs these conversions into
//! serde via `#[serde(with = "crate::codec::b64")]`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{Result, VaultError};

/// Encode `bytes` as a standard base64 string.
pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a standard base64 string.
///
/// # Errors
///
/// Returns [`VaultError::Corrupt`] if `text` is not valid base64.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    BASE64.decode(text).map_err(|e| VaultError::Corrupt {
        reason: format!("invalid base64: {e}"),
    })
}

/// Serde adapter: `Vec<u8>` <-> base64 string.
pub mod b64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::decode(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        #[serde(with = "b64")]
        data: Vec<u8>,
    }

    #[test]
    fn encodes_standard_alphabet_with_padding() {
        assert_eq!(encode(&[0xfb, 0xff]), "+/8=");
        assert_eq!(decode("+/8=").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn empty_input() {
        assert_eq!(encode(&[]), "");
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn invalid_base64_is_corrupt() {
        assert!(matches!(decode("not base64!"), Err(VaultError::Corrupt { .. })));
    }

    #[test]
    fn serde_adapter_writes_strings() {
        let blob = Blob {
            data: vec![1, 2, 3],
        };
        let json = serde_json::to_string(&blob).unwrap();
        assert_eq!(json, r#"{"data":"AQID"}"#);

        let back: Blob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, blob);
    }

    #[test]
    fn serde_adapter_rejects_garbage() {
        let result: std::result::Result<Blob, _> = serde_json::from_str(r#"{"data":"%%%"}"#);
        assert!(result.is_err());
    }
}
