//! Driver for the MFRC522 contactless reader IC.
//!
//! Three layers, leaf first:
//!
//! ```text
//!   RegisterIo   address byte + payload over a byte transport
//!       │
//!   Rc522::transceive / calculate_crc   FIFO load, command, bounded IRQ wait
//!       │
//!   request · anticoll · select_tag · card_auth · read · write · halt
//! ```
//!
//! Every operation returns a [`Result`]; nothing panics across the driver
//! boundary.  Busy-waits are bounded by wall-clock deadlines
//! ([`Timeouts`]), never by iteration counts.
//!
//! # Crate feature flags
//! - `sim`: [`sim::SimChip`], a register-level simulator with an emulated
//!   NTAG-style tag, for testing code built on the driver.
//! - `rpi`: [`rpi::RpiConnector`], rppal SPI/GPIO on a Raspberry Pi.

mod crc;
mod error;
mod mfrc522;
mod picc;
pub mod register;
mod transport;

#[cfg(feature = "rpi")]
pub mod rpi;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use crate::crc::crc_a;
pub use crate::error::{Error, ErrorKind, Result, TransportError, WritePhase};
pub use crate::mfrc522::{Command, LinkedReader, Rc522, Response, Timeouts, MAX_LEN};
pub use crate::picc::{AuthMode, Uid, BLOCK_LEN};
pub use crate::transport::{Connect, EnableLine, Link, RegisterIo, Transport};
