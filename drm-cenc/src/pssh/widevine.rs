//! Widevine `PSSH` data, the protobuf message carried inside Widevine boxes.

use crate::Result;
use prost::Message;

/// Decoded `WidevinePsshData` message. Fields not used by the player are
/// left undeclared and skipped by the decoder.
#[derive(Clone, PartialEq, Message)]
pub struct WidevinePsshData {
    #[prost(int32, optional, tag = "1")]
    pub algorithm: Option<i32>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub key_ids: Vec<Vec<u8>>,
    #[prost(string, optional, tag = "3")]
    pub provider: Option<String>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub content_id: Option<Vec<u8>>,
    #[prost(string, optional, tag = "6")]
    pub policy: Option<String>,
    #[prost(uint32, optional, tag = "7")]
    pub crypto_period_index: Option<u32>,
    #[prost(uint32, optional, tag = "9")]
    pub protection_scheme: Option<u32>,
}

pub fn parse(data: &[u8]) -> Result<WidevinePsshData> {
    Ok(WidevinePsshData::decode(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_ids() {
        let message = WidevinePsshData {
            algorithm: Some(1),
            key_ids: vec![vec![0xab; 16], vec![0xcd; 16]],
            provider: Some("example".to_owned()),
            content_id: Some(b"content".to_vec()),
            ..Default::default()
        };

        let decoded = parse(&message.encode_to_vec()).unwrap();
        assert_eq!(decoded.key_ids, vec![vec![0xab; 16], vec![0xcd; 16]]);
        assert_eq!(decoded.content_id.as_deref(), Some(&b"content"[..]));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse(&[0x12, 0x10, 0x01]).is_err());
    }
}
