//! Data model shared by the reader daemon and its JSON front end.

pub mod catalog;
pub mod config;
pub mod payload;
pub mod platform;
pub mod protocol;

pub use catalog::{Action, ActionTable, Track, TrackSource};
pub use payload::{ControlByte, Payload, PayloadError, PAYLOAD_LEN};
pub use protocol::TagSnapshot;
