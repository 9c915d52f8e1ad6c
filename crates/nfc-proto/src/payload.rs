//! The 16-byte tag payload: one control byte followed by 15 bytes of a
//! truncated MD5 digest of the action's logical name.

use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const PAYLOAD_LEN: usize = 16;

#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("payload is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("payload must be {PAYLOAD_LEN} bytes, got {0}")]
    Length(usize),
}

/// Action category selector stored in byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlByte {
    MusicFile,
    Stream,
    Pause,
}

impl ControlByte {
    pub fn byte(self) -> u8 {
        match self {
            Self::MusicFile => 0x11,
            Self::Stream => 0x12,
            Self::Pause => 0x13,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x11 => Some(Self::MusicFile),
            0x12 => Some(Self::Stream),
            0x13 => Some(Self::Pause),
            _ => None,
        }
    }
}

/// `control || md5(name)[1..16]`.
pub fn truncated_hash(control: ControlByte, name: &str) -> [u8; PAYLOAD_LEN] {
    let digest = Md5::digest(name.as_bytes());
    let mut out = [0u8; PAYLOAD_LEN];
    out.copy_from_slice(&digest);
    out[0] = control.byte();
    out
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Payload(pub [u8; PAYLOAD_LEN]);

impl Payload {
    pub fn for_action(control: ControlByte, name: &str) -> Self {
        Self(truncated_hash(control, name))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, PayloadError> {
        let arr: [u8; PAYLOAD_LEN] = bytes
            .try_into()
            .map_err(|_| PayloadError::Length(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Parse a hex string.  Case-insensitive; surrounding whitespace is ignored.
    pub fn from_hex(s: &str) -> Result<Self, PayloadError> {
        let bytes = hex::decode(s.trim())?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn control(&self) -> Option<ControlByte> {
        ControlByte::from_byte(self.0[0])
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    /// The four-byte chunk written to page `base + index`.
    pub fn page_chunk(&self, index: usize) -> [u8; 4] {
        let mut chunk = [0u8; 4];
        chunk.copy_from_slice(&self.0[index * 4..index * 4 + 4]);
        chunk
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({})", self.to_hex())
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Payload::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_hash_replaces_first_digest_byte() {
        // md5("trackX") = 998344410b0a75f2552475a0a68463e0
        let p = Payload::for_action(ControlByte::MusicFile, "trackX");
        assert_eq!(p.to_hex(), "118344410b0a75f2552475a0a68463e0");
        assert_eq!(p.control(), Some(ControlByte::MusicFile));

        // md5("pause") = ec1b81965109165de6b38cd92c1e39f9
        let p = Payload::for_action(ControlByte::Pause, "pause");
        assert_eq!(p.to_hex(), "131b81965109165de6b38cd92c1e39f9");
    }

    #[test]
    fn test_same_name_different_category() {
        let file = Payload::for_action(ControlByte::MusicFile, "trackX");
        let stream = Payload::for_action(ControlByte::Stream, "trackX");
        assert_ne!(file, stream);
        assert_eq!(file.0[1..], stream.0[1..]);
    }

    #[test]
    fn test_from_hex() {
        let p = Payload::from_hex(" 118344410B0A75F2552475A0A68463E0\n").unwrap();
        assert_eq!(p, Payload::for_action(ControlByte::MusicFile, "trackX"));

        assert_eq!(Payload::from_hex("1183"), Err(PayloadError::Length(2)));
        assert!(matches!(Payload::from_hex("zz"), Err(PayloadError::Hex(_))));
    }

    #[test]
    fn test_unknown_control_byte() {
        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[0] = 0x42;
        assert_eq!(Payload(bytes).control(), None);
        assert_eq!(Payload([0u8; PAYLOAD_LEN]).control(), None);
    }

    #[test]
    fn test_page_chunks_cover_payload() {
        let p = Payload::for_action(ControlByte::Stream, "Radio Mikro");
        let joined: Vec<u8> = (0..4).flat_map(|i| p.page_chunk(i)).collect();
        assert_eq!(joined, p.0);
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let p = Payload::for_action(ControlByte::Pause, "pause");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"131b81965109165de6b38cd92c1e39f9\"");
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
