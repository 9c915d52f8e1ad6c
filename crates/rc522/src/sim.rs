//! Register-level MFRC522 simulator.
//!
//! `SimChip` answers SPI frames the way the chip does for the registers the
//! driver uses: FIFO, IRQ, error, Status2, FIFO level, control and CRC
//! result.  Frames sent with Transceive/Authenticate are recorded and
//! answered from a queue of scripted [`Reply`] values, or, once the queue
//! is empty, by an emulated NTAG-style tag placed in the field.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::crc::crc_a;
use crate::error::TransportError;
use crate::register;
use crate::transport::{Connect, Link, Transport};

/// NTAG213 user memory plus header pages.
const TAG_PAGES: usize = 45;

/// Scripted answer to the next exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Frame received: bytes plus the valid-bit count of the last byte
    /// (0 = all eight, as in ControlReg).
    Data { data: Vec<u8>, last_bits: u8 },
    /// The chip timer fires: nothing answered.
    NoTag,
    /// ErrorReg flags raised.
    Error(u8),
    /// Authenticate outcome.
    Auth { accept: bool },
    /// No interrupt at all; the driver must give up on its own deadline.
    Silent,
}

impl Reply {
    pub fn bytes(data: &[u8]) -> Self {
        Reply::Data {
            data: data.to_vec(),
            last_bits: 0,
        }
    }

    pub fn bits(data: &[u8], last_bits: u8) -> Self {
        Reply::Data {
            data: data.to_vec(),
            last_bits: last_bits & register::RX_LAST_BITS,
        }
    }

    /// 4-bit write ACK.
    pub fn ack() -> Self {
        Reply::bits(&[register::PICC_ACK], 4)
    }

    /// Bit length the driver should compute for this reply.
    pub fn bit_len(&self) -> usize {
        match self {
            Reply::Data { data, last_bits } => {
                let n = data.len();
                if *last_bits != 0 {
                    n.saturating_sub(1) * 8 + *last_bits as usize
                } else {
                    n * 8
                }
            }
            _ => 0,
        }
    }
}

/// Emulated tag with 4-byte pages.  Reads return four consecutive pages;
/// writes keep only the first four bytes of the data frame.
#[derive(Debug, Clone)]
pub struct SimTag {
    pub uid: [u8; 4],
    pub pages: Vec<[u8; 4]>,
    halted: bool,
    pending_write: Option<u8>,
}

impl SimTag {
    pub fn new(uid: [u8; 4]) -> Self {
        Self {
            uid,
            pages: vec![[0; 4]; TAG_PAGES],
            halted: false,
            pending_write: None,
        }
    }

    /// Store 16 bytes across four pages starting at `page`.
    pub fn with_block(mut self, page: u8, data: &[u8; 16]) -> Self {
        for (i, chunk) in data.chunks(4).enumerate() {
            if let Some(slot) = self.pages.get_mut(page as usize + i) {
                slot.copy_from_slice(chunk);
            }
        }
        self
    }

    pub fn block(&self, page: u8) -> [u8; 16] {
        let mut out = [0u8; 16];
        for i in 0..4 {
            if let Some(p) = self.pages.get(page as usize + i) {
                out[i * 4..i * 4 + 4].copy_from_slice(p);
            }
        }
        out
    }

    fn uid_with_bcc(&self) -> [u8; 5] {
        let bcc = self.uid.iter().fold(0u8, |acc, b| acc ^ b);
        [self.uid[0], self.uid[1], self.uid[2], self.uid[3], bcc]
    }

    fn answer(&mut self, frame: &[u8]) -> Reply {
        if let Some(page) = self.pending_write.take() {
            if frame.len() == 18 {
                if let Some(slot) = self.pages.get_mut(page as usize) {
                    slot.copy_from_slice(&frame[..4]);
                    return Reply::ack();
                }
            }
            return Reply::bits(&[0x00], 4);
        }

        match frame {
            [register::PICC_REQIDL] if self.halted => Reply::NoTag,
            [register::PICC_REQIDL] | [register::PICC_REQALL] => {
                self.halted = false;
                Reply::bytes(&[0x44, 0x00])
            }
            [register::PICC_ANTICOLL_CL1, register::PICC_NVB_ANTICOLL] => {
                Reply::bytes(&self.uid_with_bcc())
            }
            [register::PICC_ANTICOLL_CL1, register::PICC_NVB_SELECT, ..] => {
                let sak = [0x00];
                let crc = crc_a(&sak);
                Reply::bytes(&[sak[0], crc[0], crc[1]])
            }
            [register::PICC_READ, page, ..] => Reply::bytes(&self.block(*page)),
            [register::PICC_WRITE, page, ..] if (*page as usize) < self.pages.len() => {
                self.pending_write = Some(*page);
                Reply::ack()
            }
            [register::PICC_WRITE, ..] => Reply::bits(&[0x00], 4),
            [register::PICC_HALT, 0x00, ..] => {
                self.halted = true;
                Reply::NoTag
            }
            _ => Reply::NoTag,
        }
    }
}

#[derive(Debug)]
struct Inner {
    regs: [u8; 64],
    fifo: VecDeque<u8>,
    com_irq: u8,
    div_irq: u8,
    error: u8,
    rx_last_bits: u8,
    replies: VecDeque<Reply>,
    frames: Vec<Vec<u8>>,
    tag: Option<SimTag>,
    connects: usize,
    fail_connects: usize,
    crc_stalled: bool,
}

impl Inner {
    fn new() -> Self {
        let mut regs = [0; 64];
        regs[register::VERSION as usize] = 0x92;
        Self {
            regs,
            fifo: VecDeque::new(),
            com_irq: 0,
            div_irq: 0,
            error: 0,
            rx_last_bits: 0,
            replies: VecDeque::new(),
            frames: Vec::new(),
            tag: None,
            connects: 0,
            fail_connects: 0,
            crc_stalled: false,
        }
    }

    fn read(&mut self, reg: u8) -> u8 {
        match reg {
            register::COM_IRQ => self.com_irq,
            register::DIV_IRQ => self.div_irq,
            register::ERROR => self.error,
            register::FIFO_DATA => self.fifo.pop_front().unwrap_or(0),
            register::FIFO_LEVEL => self.fifo.len().min(64) as u8,
            register::CONTROL => self.rx_last_bits,
            _ => self.regs[reg as usize],
        }
    }

    fn write(&mut self, reg: u8, value: u8) {
        match reg {
            register::COMMAND => {
                self.regs[reg as usize] = value;
                self.run_command(value & 0x0F);
            }
            register::COM_IRQ => set_or_clear(&mut self.com_irq, value),
            register::DIV_IRQ => set_or_clear(&mut self.div_irq, value),
            register::FIFO_DATA => self.fifo.push_back(value),
            register::FIFO_LEVEL => {
                if value & register::FLUSH_BUFFER != 0 {
                    self.fifo.clear();
                }
            }
            register::BIT_FRAMING => {
                let was = self.regs[reg as usize];
                self.regs[reg as usize] = value;
                let armed = self.regs[register::COMMAND as usize] & 0x0F == register::PCD_TRANSCEIVE;
                if armed && was & register::START_SEND == 0 && value & register::START_SEND != 0 {
                    self.exchange();
                }
            }
            _ => self.regs[reg as usize] = value,
        }
    }

    fn run_command(&mut self, command: u8) {
        match command {
            register::PCD_SOFT_RESET => {
                let tag = self.tag.take();
                let keep = (
                    std::mem::take(&mut self.replies),
                    std::mem::take(&mut self.frames),
                    self.connects,
                    self.fail_connects,
                    self.crc_stalled,
                );
                *self = Inner::new();
                self.tag = tag;
                (
                    self.replies,
                    self.frames,
                    self.connects,
                    self.fail_connects,
                    self.crc_stalled,
                ) = keep;
            }
            register::PCD_CALC_CRC if self.crc_stalled => self.fifo.clear(),
            register::PCD_CALC_CRC => {
                let data: Vec<u8> = self.fifo.drain(..).collect();
                let crc = crc_a(&data);
                self.regs[register::CRC_RESULT_L as usize] = crc[0];
                self.regs[register::CRC_RESULT_H as usize] = crc[1];
                self.div_irq |= register::CRC_IRQ;
            }
            register::PCD_AUTHENTICATE => self.authenticate(),
            _ => {}
        }
    }

    fn next_reply(&mut self, frame: &[u8]) -> Reply {
        if let Some(reply) = self.replies.pop_front() {
            return reply;
        }
        match self.tag.as_mut() {
            Some(tag) => tag.answer(frame),
            None => Reply::NoTag,
        }
    }

    fn exchange(&mut self) {
        let frame: Vec<u8> = self.fifo.drain(..).collect();
        let reply = self.next_reply(&frame);
        self.frames.push(frame);
        self.error = 0;
        self.rx_last_bits = 0;

        match reply {
            Reply::Data { data, last_bits } => {
                self.fifo.extend(data);
                self.rx_last_bits = last_bits;
                // TxIRq | RxIRq | IdleIRq
                self.com_irq |= 0x70;
            }
            Reply::Error(flags) => {
                self.error = flags;
                // TxIRq | IdleIRq | ErrIRq
                self.com_irq |= 0x52;
            }
            Reply::NoTag | Reply::Auth { .. } => {
                self.com_irq |= 0x40 | register::TIMER_IRQ;
            }
            Reply::Silent => {}
        }
    }

    fn authenticate(&mut self) {
        let frame: Vec<u8> = self.fifo.drain(..).collect();
        let reply = match self.replies.pop_front() {
            Some(reply) => reply,
            None => Reply::Auth {
                accept: self.tag.is_some(),
            },
        };
        self.frames.push(frame);
        self.error = 0;

        let status2 = &mut self.regs[register::STATUS2 as usize];
        match reply {
            Reply::Auth { accept } => {
                if accept {
                    *status2 |= register::MF_CRYPTO1_ON;
                } else {
                    *status2 &= !register::MF_CRYPTO1_ON;
                }
                self.com_irq |= 0x10;
            }
            Reply::Error(flags) => {
                self.error = flags;
                self.com_irq |= 0x12;
            }
            Reply::Silent => {}
            Reply::Data { .. } | Reply::NoTag => {
                self.com_irq |= register::TIMER_IRQ;
            }
        }
    }
}

fn set_or_clear(reg: &mut u8, value: u8) {
    if value & register::IRQ_SET1 != 0 {
        *reg |= value & !register::IRQ_SET1;
    } else {
        *reg &= !value;
    }
}

/// Shared handle to one simulated chip.  Clones talk to the same chip.
#[derive(Debug, Clone)]
pub struct SimChip {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SimChip {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChip {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the answer to the next exchange.  Queued replies take
    /// precedence over the emulated tag.
    pub fn push_reply(&self, reply: Reply) {
        self.lock().replies.push_back(reply);
    }

    pub fn place_tag(&self, tag: SimTag) {
        self.lock().tag = Some(tag);
    }

    pub fn remove_tag(&self) -> Option<SimTag> {
        self.lock().tag.take()
    }

    pub fn tag(&self) -> Option<SimTag> {
        self.lock().tag.clone()
    }

    /// Frames sent to the tag so far, CRC included where the driver added one.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    /// While set, CalcCRC never raises CRCIRq.
    pub fn stall_crc(&self, stalled: bool) {
        self.lock().crc_stalled = stalled;
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.lock().regs[reg as usize]
    }

    /// How many times a [`SimConnector`] opened this chip.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_connects(&self, n: usize) {
        self.lock().fail_connects = n;
    }

    pub fn connector(&self) -> SimConnector {
        SimConnector { chip: self.clone() }
    }
}

impl Transport for SimChip {
    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let Some((&mut addr, payload)) = buf.split_first_mut() else {
            return Ok(());
        };
        let reg = (addr >> 1) & 0x3F;
        let mut inner = self.lock();
        if addr & 0x80 != 0 {
            for b in payload.iter_mut() {
                *b = inner.read(reg);
            }
        } else {
            for &b in payload.iter() {
                inner.write(reg, b);
            }
        }
        Ok(())
    }
}

/// [`Connect`] implementation handing out clones of one [`SimChip`].
#[derive(Debug, Clone)]
pub struct SimConnector {
    chip: SimChip,
}

impl Connect for SimConnector {
    fn connect(&mut self) -> Result<Link, TransportError> {
        {
            let mut inner = self.chip.lock();
            if inner.fail_connects > 0 {
                inner.fail_connects -= 1;
                return Err(TransportError::new("simulated SPI open failure"));
            }
            inner.connects += 1;
        }
        Ok(Link::new(Box::new(self.chip.clone())))
    }
}
