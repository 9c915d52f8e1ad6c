//! ISO 14443A / MIFARE tag operations layered on the transceive engine.

use tracing::debug;

use crate::error::{Error, Result, WritePhase};
use crate::mfrc522::{Command, Rc522};
use crate::register;
use crate::transport::Transport;

/// Bytes moved by one block read or write.
pub const BLOCK_LEN: usize = 16;

/// MIFARE key slot used for authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    KeyA,
    KeyB,
}

impl AuthMode {
    fn code(self) -> u8 {
        match self {
            AuthMode::KeyA => register::PICC_AUTH_A,
            AuthMode::KeyB => register::PICC_AUTH_B,
        }
    }
}

/// Tag UID as returned by cascade level 1 anticollision: four data bytes
/// followed by their XOR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid(pub [u8; 5]);

impl Uid {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 5] = bytes.try_into().map_err(|_| Error::ResponseLength {
            expected: 5,
            actual: bytes.len(),
        })?;
        let uid = Uid(raw);
        if !uid.is_valid() {
            return Err(Error::UidChecksum);
        }
        Ok(uid)
    }

    pub fn is_valid(&self) -> bool {
        self.0[..4].iter().fold(0u8, |acc, b| acc ^ b) == self.0[4]
    }

    pub fn data(&self) -> &[u8] {
        &self.0[..4]
    }

    pub fn as_bytes(&self) -> &[u8; 5] {
        &self.0
    }

    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl<T: Transport> Rc522<T> {
    /// REQA: ask any idle tag in the field to answer.  Returns the ATQA bits.
    pub fn request(&mut self) -> Result<usize> {
        self.request_mode(register::PICC_REQIDL)
    }

    /// WUPA: like [`Rc522::request`] but also wakes halted tags.
    pub fn wakeup(&mut self) -> Result<usize> {
        self.request_mode(register::PICC_REQALL)
    }

    fn request_mode(&mut self, mode: u8) -> Result<usize> {
        // Short frame: 7 bits.
        self.io.write(register::BIT_FRAMING, 0x07)?;
        let resp = self.transceive(Command::Transceive, &[mode])?;
        if resp.bits != 16 {
            return Err(Error::BitLength {
                expected: 16,
                actual: resp.bits,
            });
        }
        Ok(resp.bits)
    }

    /// Cascade level 1 anticollision.
    pub fn anticoll(&mut self) -> Result<Uid> {
        self.io.write(register::BIT_FRAMING, 0x00)?;
        let resp = self.transceive(
            Command::Transceive,
            &[register::PICC_ANTICOLL_CL1, register::PICC_NVB_ANTICOLL],
        )?;
        Uid::from_bytes(&resp.data)
    }

    /// SELECT the tag with `uid`.  Needed before auth/read/write on tags
    /// that went through anticollision only.
    pub fn select_tag(&mut self, uid: &Uid) -> Result<()> {
        let mut frame = vec![register::PICC_ANTICOLL_CL1, register::PICC_NVB_SELECT];
        frame.extend_from_slice(uid.as_bytes());
        let resp = self.transceive_with_crc(&frame)?;
        // SAK + CRC_A
        if resp.bits != 24 {
            return Err(Error::BitLength {
                expected: 24,
                actual: resp.bits,
            });
        }
        Ok(())
    }

    /// MIFARE Classic three-pass authentication for `block`.
    pub fn card_auth(&mut self, mode: AuthMode, block: u8, key: &[u8; 6], uid: &Uid) -> Result<()> {
        let mut buf = Vec::with_capacity(12);
        buf.push(mode.code());
        buf.push(block);
        buf.extend_from_slice(key);
        buf.extend_from_slice(uid.data());

        let result = self.transceive(Command::Authenticate, &buf);
        let crypto_on = self.io.read(register::STATUS2)? & register::MF_CRYPTO1_ON != 0;
        result?;
        if !crypto_on {
            return Err(Error::Authentication);
        }
        self.authed = true;
        Ok(())
    }

    /// Leave the Crypto1 session.
    pub fn stop_crypto(&mut self) -> Result<()> {
        self.io
            .clear_bitmask(register::STATUS2, register::MF_CRYPTO1_ON)?;
        self.authed = false;
        Ok(())
    }

    /// Put the tag into HALT.  A halted tag answers no REQA until it leaves
    /// the field.
    pub fn halt(&mut self) -> Result<()> {
        self.io
            .clear_bitmask(register::STATUS2, register::TEMP_SENS_CLEAR)?;
        // A halted tag does not answer; the outcome is irrelevant.
        let outcome = self.transceive_with_crc(&[register::PICC_HALT, 0]);
        debug!("rc522: halt sent ({:?})", outcome.map(|r| r.bits));
        self.stop_crypto()
    }

    /// Read one 16-byte block (a 4-page group on NTAG/Ultralight tags).
    pub fn read(&mut self, block: u8) -> Result<[u8; BLOCK_LEN]> {
        let resp = self.transceive_with_crc(&[register::PICC_READ, block])?;
        let data: [u8; BLOCK_LEN] =
            resp.data
                .as_slice()
                .try_into()
                .map_err(|_| Error::ResponseLength {
                    expected: BLOCK_LEN,
                    actual: resp.data.len(),
                })?;
        Ok(data)
    }

    /// Two-phase block write: address frame, then 16 data bytes.  The tag
    /// must ACK both.  NTAG/Ultralight tags keep only the first 4 bytes.
    pub fn write(&mut self, block: u8, data: &[u8; BLOCK_LEN]) -> Result<()> {
        let resp = self.transceive_with_crc(&[register::PICC_WRITE, block])?;
        check_ack(WritePhase::Address, &resp.data, resp.bits)?;

        let resp = self.transceive_with_crc(data)?;
        check_ack(WritePhase::Data, &resp.data, resp.bits)?;
        Ok(())
    }

    /// Close the session: drop any Crypto1 state and hand back the transport.
    pub fn cleanup(mut self) -> T {
        if self.authed {
            if let Err(e) = self.stop_crypto() {
                debug!("rc522: stop_crypto during cleanup failed: {}", e);
            }
        }
        self.io.into_transport()
    }
}

fn check_ack(phase: WritePhase, data: &[u8], bits: usize) -> Result<()> {
    let ack = data.first().map(|b| b & 0x0F).unwrap_or(0);
    if bits != 4 || ack != register::PICC_ACK {
        return Err(Error::WriteAck { phase, ack });
    }
    Ok(())
}
