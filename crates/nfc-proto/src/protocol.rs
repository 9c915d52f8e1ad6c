use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::catalog::ActionTable;
use crate::payload::{ControlByte, Payload};

/// Placeholder used by the JSON front end for an absent uid or payload.
pub const NONE_HEX: &str = "none";

/// Last tag seen by the poller.  Readers always get a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSnapshot {
    /// Four uid bytes plus the BCC checksum byte.
    #[serde(with = "hex_uid")]
    pub uid: [u8; 5],
    pub payload: Payload,
    pub seen_at: DateTime<Local>,
}

/// One row of `GET /json/musicfiles`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicFileEntry {
    pub name: String,
    pub hash: String,
    pub kind: ControlByte,
}

impl MusicFileEntry {
    pub fn listing(table: &ActionTable) -> Vec<Self> {
        table
            .iter()
            .map(|(payload, action)| Self {
                name: action.name().to_string(),
                hash: payload.to_hex(),
                kind: action.control(),
            })
            .collect()
    }
}

/// `GET /json/readnfc`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadNfcResponse {
    pub uid: String,
    pub data: String,
    pub description: String,
}

impl ReadNfcResponse {
    pub fn new(tag: Option<&TagSnapshot>, table: &ActionTable) -> Self {
        match tag {
            Some(tag) => Self {
                uid: hex::encode(tag.uid),
                data: tag.payload.to_hex(),
                description: table.describe(Some(&tag.payload)),
            },
            None => Self {
                uid: NONE_HEX.to_string(),
                data: NONE_HEX.to_string(),
                description: table.describe(None),
            },
        }
    }
}

/// Query string of `/actions/writenfc`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WriteQuery {
    pub data: Option<String>,
}

/// `/actions/writenfc` reply.  User errors are reported here, not through
/// the status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub message: String,
}

impl WriteResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `GET /json/state`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateResponse {
    pub current: Option<String>,
    pub previous: Option<String>,
    pub absent_cycles: u32,
    pub playing: bool,
    pub tag: Option<TagSnapshot>,
    pub actions: usize,
}

mod hex_uid {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(uid: &[u8; 5], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(uid))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 5], D::Error> {
        let s = String::deserialize(d)?;
        let mut uid = [0u8; 5];
        hex::decode_to_slice(&s, &mut uid).map_err(serde::de::Error::custom)?;
        Ok(uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Action, Track, TrackSource};

    fn table() -> ActionTable {
        let mut table = ActionTable::new();
        table.insert(Action::Play(Track {
            id: "trackX".to_string(),
            source: TrackSource::File("/music/trackX".into()),
        }));
        table.insert(Action::Pause);
        table
    }

    #[test]
    fn test_read_response_without_tag() {
        let r = ReadNfcResponse::new(None, &table());
        assert_eq!(r.uid, "none");
        assert_eq!(r.data, "none");
        assert_eq!(r.description, "No tag present");
    }

    #[test]
    fn test_read_response_with_tag() {
        let tag = TagSnapshot {
            uid: [0x04, 0xA1, 0xB2, 0xC3, 0x04 ^ 0xA1 ^ 0xB2 ^ 0xC3],
            payload: Payload::for_action(ControlByte::MusicFile, "trackX"),
            seen_at: Local::now(),
        };
        let r = ReadNfcResponse::new(Some(&tag), &table());
        assert_eq!(r.uid, "04a1b2c3d4");
        assert_eq!(r.data, "118344410b0a75f2552475a0a68463e0");
        assert_eq!(r.description, "Play music file trackX");
    }

    #[test]
    fn test_listing_follows_table_order() {
        let listing = MusicFileEntry::listing(&table());
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].name, "trackX");
        assert_eq!(listing[0].hash, "118344410b0a75f2552475a0a68463e0");
        assert_eq!(listing[0].kind, ControlByte::MusicFile);
        assert_eq!(listing[1].kind, ControlByte::Pause);

        let json = serde_json::to_value(&listing[1]).unwrap();
        assert_eq!(json["kind"], "pause");
    }

    #[test]
    fn test_snapshot_uid_is_hex_on_the_wire() {
        let tag = TagSnapshot {
            uid: [1, 2, 3, 4, 4],
            payload: Payload([0u8; 16]),
            seen_at: Local::now(),
        };
        let json = serde_json::to_value(&tag).unwrap();
        assert_eq!(json["uid"], "0102030404");
        let back: TagSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.uid, tag.uid);
    }
}
