use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Error, Result};
use crate::register;
use crate::transport::{Link, RegisterIo, Transport};

/// Largest frame the driver pulls out of the FIFO after a Transceive.
pub const MAX_LEN: usize = 16;

/// Wall-clock budgets for the two busy-wait loops in the driver.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Waiting for a Transceive/Authenticate completion interrupt.
    pub transceive: Duration,
    /// Waiting for the CRC coprocessor.
    pub crc: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            transceive: Duration::from_millis(40),
            crc: Duration::from_millis(5),
        }
    }
}

/// Chip command issued through [`Rc522::transceive`].  Each variant carries
/// the interrupt sources it enables and the ComIrqReg bits that mark it done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Idle,
    Authenticate,
    Transceive,
    CalculateCrc,
}

impl Command {
    pub fn code(self) -> u8 {
        match self {
            Command::Idle => register::PCD_IDLE,
            Command::Authenticate => register::PCD_AUTHENTICATE,
            Command::Transceive => register::PCD_TRANSCEIVE,
            Command::CalculateCrc => register::PCD_CALC_CRC,
        }
    }

    /// ComIEnReg sources enabled while the command runs.
    pub fn irq_enable(self) -> u8 {
        match self {
            // IdleIEn | ErrIEn
            Command::Authenticate => 0x12,
            // TxIEn | RxIEn | IdleIEn | LoAlertIEn | ErrIEn | TimerIEn
            Command::Transceive => 0x77,
            Command::Idle | Command::CalculateCrc => 0x00,
        }
    }

    /// ComIrqReg bits that signal completion.
    pub fn irq_wait(self) -> u8 {
        match self {
            // RxIRq | IdleIRq
            Command::Transceive => 0x30,
            // IdleIRq
            Command::Authenticate | Command::Idle | Command::CalculateCrc => 0x10,
        }
    }
}

/// Result of a successful [`Rc522::transceive`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
    /// Exact number of valid bits received.
    pub bits: usize,
}

/// Reader over a boxed transport, as opened through [`crate::Connect`].
pub type LinkedReader = Rc522<Box<dyn Transport + Send>>;

/// MFRC522 reader bound to one transport session.
pub struct Rc522<T> {
    pub(crate) io: RegisterIo<T>,
    pub(crate) authed: bool,
    pub(crate) timeouts: Timeouts,
}

impl LinkedReader {
    /// Bind a reader to a freshly opened link and initialise the chip.
    pub fn open(link: Link, timeouts: Timeouts) -> Result<Self> {
        let io = match link.enable {
            Some(enable) => RegisterIo::with_enable_line(link.transport, enable),
            None => RegisterIo::new(link.transport),
        };
        Self::with_io(io, timeouts)
    }
}

impl<T: Transport> Rc522<T> {
    /// Reset and configure the chip, then switch the antenna on.
    pub fn new(transport: T) -> Result<Self> {
        Self::with_io(RegisterIo::new(transport), Timeouts::default())
    }

    pub fn with_io(io: RegisterIo<T>, timeouts: Timeouts) -> Result<Self> {
        let mut rc = Self {
            io,
            authed: false,
            timeouts,
        };
        rc.init()?;
        Ok(rc)
    }

    fn init(&mut self) -> Result<()> {
        self.reset()?;
        // Timer starts automatically at the end of each transmission;
        // prescaler 0xD3E and reload 30 give roughly a 15 ms tag timeout.
        self.io.write(register::T_MODE, 0x8D)?;
        self.io.write(register::T_PRESCALER, 0x3E)?;
        self.io.write(register::T_RELOAD_L, 30)?;
        self.io.write(register::T_RELOAD_H, 0)?;
        // Force 100 % ASK modulation.
        self.io.write(register::TX_AUTO, 0x40)?;
        // CRC preset 0x6363.
        self.io.write(register::MODE, 0x3D)?;
        self.set_antenna(true)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.io.write(register::COMMAND, register::PCD_SOFT_RESET)?;
        Ok(())
    }

    pub fn set_antenna(&mut self, on: bool) -> Result<()> {
        if on {
            let current = self.io.read(register::TX_CONTROL)?;
            if current & register::ANTENNA_ON != register::ANTENNA_ON {
                self.io
                    .set_bitmask(register::TX_CONTROL, register::ANTENNA_ON)?;
            }
        } else {
            self.io
                .clear_bitmask(register::TX_CONTROL, register::ANTENNA_ON)?;
        }
        Ok(())
    }

    /// Chip firmware version (0x91 / 0x92 for genuine parts).
    pub fn version(&mut self) -> Result<u8> {
        Ok(self.io.read(register::VERSION)?)
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    /// Whether a Crypto1 session is established.
    pub fn is_authed(&self) -> bool {
        self.authed
    }

    /// Load `data` into the FIFO, run `command` and wait for it to finish.
    ///
    /// For [`Command::Transceive`] the received frame is pulled out of the
    /// FIFO (at most [`MAX_LEN`] bytes) along with its exact bit length.
    pub fn transceive(&mut self, command: Command, data: &[u8]) -> Result<Response> {
        let irq_en = command.irq_enable();
        let irq_wait = command.irq_wait();

        self.io.write(register::COM_IEN, irq_en | register::IRQ_INV)?;
        // Clear every pending interrupt request.
        self.io.write(register::COM_IRQ, !register::IRQ_SET1)?;
        self.io.flush_fifo()?;
        self.io.write(register::COMMAND, register::PCD_IDLE)?;

        for &b in data {
            self.io.write(register::FIFO_DATA, b)?;
        }
        self.io.write(register::COMMAND, command.code())?;

        if command == Command::Transceive {
            self.io
                .set_bitmask(register::BIT_FRAMING, register::START_SEND)?;
        }

        let deadline = Instant::now() + self.timeouts.transceive;
        let irq = loop {
            let n = self.io.read(register::COM_IRQ)?;
            if n & (register::TIMER_IRQ | irq_wait) != 0 {
                break Some(n);
            }
            if Instant::now() >= deadline {
                break None;
            }
        };

        self.io
            .clear_bitmask(register::BIT_FRAMING, register::START_SEND)?;

        let Some(irq) = irq else {
            debug!("rc522: {:?} timed out", command);
            return Err(Error::Timeout);
        };

        let errors = self.io.read(register::ERROR)? & register::ERROR_MASK;
        if errors != 0 {
            return Err(Error::ErrorFlags(errors));
        }

        if irq & irq_en & register::TIMER_IRQ != 0 {
            return Err(Error::NoTag);
        }

        let mut response = Response::default();
        if command == Command::Transceive {
            let n = (self.io.read(register::FIFO_LEVEL)? & register::FIFO_LEVEL_MASK) as usize;
            let last_bits = (self.io.read(register::CONTROL)? & register::RX_LAST_BITS) as usize;
            response.bits = if last_bits != 0 {
                n.saturating_sub(1) * 8 + last_bits
            } else {
                n * 8
            };

            let fetch = n.min(MAX_LEN);
            response.data.reserve(fetch);
            for _ in 0..fetch {
                response.data.push(self.io.read(register::FIFO_DATA)?);
            }
        }

        Ok(response)
    }

    /// Run the CRC_A coprocessor over `data`.  Returns `[low, high]`.
    pub fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2]> {
        self.io.write(register::COMMAND, register::PCD_IDLE)?;
        self.io.write(register::DIV_IRQ, register::CRC_IRQ)?;
        self.io.flush_fifo()?;

        for &b in data {
            self.io.write(register::FIFO_DATA, b)?;
        }
        self.io.write(register::COMMAND, register::PCD_CALC_CRC)?;

        let deadline = Instant::now() + self.timeouts.crc;
        loop {
            let n = self.io.read(register::DIV_IRQ)?;
            if n & register::CRC_IRQ != 0 {
                break;
            }
            if Instant::now() >= deadline {
                return Err(Error::CrcTimeout);
            }
        }

        Ok([
            self.io.read(register::CRC_RESULT_L)?,
            self.io.read(register::CRC_RESULT_H)?,
        ])
    }

    /// Send `frame` with its CRC_A appended.
    pub(crate) fn transceive_with_crc(&mut self, frame: &[u8]) -> Result<Response> {
        let crc = self.calculate_crc(frame)?;
        let mut buf = Vec::with_capacity(frame.len() + 2);
        buf.extend_from_slice(frame);
        buf.extend_from_slice(&crc);
        self.transceive(Command::Transceive, &buf)
    }
}
