//! MFRC522 register map and bit constants.
//!
//! Addresses follow §9 of the NXP MFRC522 datasheet.  Only the registers the
//! driver touches are listed.

// ── registers ─────────────────────────────────────────────────────────────────

pub const COMMAND: u8 = 0x01;
pub const COM_IEN: u8 = 0x02;
pub const DIV_IEN: u8 = 0x03;
pub const COM_IRQ: u8 = 0x04;
pub const DIV_IRQ: u8 = 0x05;
pub const ERROR: u8 = 0x06;
pub const STATUS2: u8 = 0x08;
pub const FIFO_DATA: u8 = 0x09;
pub const FIFO_LEVEL: u8 = 0x0A;
pub const CONTROL: u8 = 0x0C;
pub const BIT_FRAMING: u8 = 0x0D;
pub const MODE: u8 = 0x11;
pub const TX_CONTROL: u8 = 0x14;
pub const TX_AUTO: u8 = 0x15;
pub const CRC_RESULT_H: u8 = 0x21;
pub const CRC_RESULT_L: u8 = 0x22;
pub const T_MODE: u8 = 0x2A;
pub const T_PRESCALER: u8 = 0x2B;
pub const T_RELOAD_H: u8 = 0x2C;
pub const T_RELOAD_L: u8 = 0x2D;
pub const VERSION: u8 = 0x37;

// ── PCD command codes (CommandReg) ────────────────────────────────────────────

pub const PCD_IDLE: u8 = 0x00;
pub const PCD_CALC_CRC: u8 = 0x03;
pub const PCD_TRANSCEIVE: u8 = 0x0C;
pub const PCD_AUTHENTICATE: u8 = 0x0E;
pub const PCD_SOFT_RESET: u8 = 0x0F;

// ── bits ──────────────────────────────────────────────────────────────────────

/// ComIEnReg: IRQ pin is inverted (active low).
pub const IRQ_INV: u8 = 0x80;
/// ComIrqReg / DivIrqReg: writing with this bit clear clears the marked bits.
pub const IRQ_SET1: u8 = 0x80;
/// ComIrqReg: the chip timer ran out.
pub const TIMER_IRQ: u8 = 0x01;
/// DivIrqReg: CRC coprocessor finished.
pub const CRC_IRQ: u8 = 0x04;
/// FIFOLevelReg: flush the FIFO.
pub const FLUSH_BUFFER: u8 = 0x80;
/// FIFOLevelReg: number of bytes held.
pub const FIFO_LEVEL_MASK: u8 = 0x7F;
/// ControlReg: number of valid bits in the last received byte (0 = all 8).
pub const RX_LAST_BITS: u8 = 0x07;
/// BitFramingReg: start transmission of a Transceive command.
pub const START_SEND: u8 = 0x80;
/// Status2Reg: MIFARE Crypto1 unit is switched on.
pub const MF_CRYPTO1_ON: u8 = 0x08;
/// Status2Reg: clear to release the I2C-bus input filter settings.
pub const TEMP_SENS_CLEAR: u8 = 0x80;
/// TxControlReg: Tx1RFEn | Tx2RFEn.
pub const ANTENNA_ON: u8 = 0x03;

/// ErrorReg bits that fail an exchange: BufferOvfl | CollErr | ParityErr | ProtocolErr.
pub const ERROR_MASK: u8 = 0x1B;

// ── PICC commands (ISO 14443-3 / MIFARE) ──────────────────────────────────────

pub const PICC_REQIDL: u8 = 0x26;
pub const PICC_REQALL: u8 = 0x52;
pub const PICC_ANTICOLL_CL1: u8 = 0x93;
pub const PICC_NVB_ANTICOLL: u8 = 0x20;
pub const PICC_NVB_SELECT: u8 = 0x70;
pub const PICC_AUTH_A: u8 = 0x60;
pub const PICC_AUTH_B: u8 = 0x61;
pub const PICC_READ: u8 = 0x30;
pub const PICC_WRITE: u8 = 0xA0;
pub const PICC_HALT: u8 = 0x50;

/// 4-bit ACK returned by a tag after each write phase.
pub const PICC_ACK: u8 = 0x0A;
