//! RegisterIO: one register access framed as an address byte plus payload
//! over a full-duplex byte transport.

use crate::error::TransportError;
use crate::register;

/// Full-duplex byte transfer.  On return `buf` holds the bytes clocked in
/// while the outgoing contents were clocked out.
pub trait Transport {
    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        (**self).transfer(buf)
    }
}

/// Secondary chip-enable line, asserted (driven low) around each transfer.
pub trait EnableLine {
    fn assert(&mut self);
    fn deassert(&mut self);
}

/// An opened bus session: the transport plus the optional enable line.
pub struct Link {
    pub transport: Box<dyn Transport + Send>,
    pub enable: Option<Box<dyn EnableLine + Send>>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("enable", &self.enable.is_some())
            .finish_non_exhaustive()
    }
}

impl Link {
    pub fn new(transport: Box<dyn Transport + Send>) -> Self {
        Self {
            transport,
            enable: None,
        }
    }
}

/// Opens a fresh link.  The poller asks for a new one every cycle so that
/// no latent chip or bus state survives from the previous cycle.
pub trait Connect: Send {
    fn connect(&mut self) -> Result<Link, TransportError>;
}

/// Register-level access to the chip.
pub struct RegisterIo<T> {
    transport: T,
    enable: Option<Box<dyn EnableLine + Send>>,
}

impl<T: Transport> RegisterIo<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            enable: None,
        }
    }

    pub fn with_enable_line(transport: T, enable: Box<dyn EnableLine + Send>) -> Self {
        Self {
            transport,
            enable: Some(enable),
        }
    }

    pub fn write(&mut self, address: u8, value: u8) -> Result<(), TransportError> {
        let mut buf = [(address << 1) & 0x7E, value];
        self.transfer(&mut buf)
    }

    pub fn read(&mut self, address: u8) -> Result<u8, TransportError> {
        let mut buf = [((address << 1) & 0x7E) | 0x80, 0];
        self.transfer(&mut buf)?;
        Ok(buf[1])
    }

    pub fn set_bitmask(&mut self, address: u8, mask: u8) -> Result<(), TransportError> {
        let current = self.read(address)?;
        self.write(address, current | mask)
    }

    pub fn clear_bitmask(&mut self, address: u8, mask: u8) -> Result<(), TransportError> {
        let current = self.read(address)?;
        self.write(address, current & !mask)
    }

    /// Empty the chip FIFO.
    pub fn flush_fifo(&mut self) -> Result<(), TransportError> {
        self.write(register::FIFO_LEVEL, register::FLUSH_BUFFER)
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        match self.enable.as_mut() {
            Some(line) => {
                line.assert();
                let result = self.transport.transfer(buf);
                line.deassert();
                result
            }
            None => self.transport.transfer(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every frame clocked out and answers reads with a fixed byte.
    struct Recorder {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
        answer: u8,
    }

    impl Transport for Recorder {
        fn transfer(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
            self.frames.lock().unwrap().push(buf.to_vec());
            for b in buf.iter_mut().skip(1) {
                *b = self.answer;
            }
            Ok(())
        }
    }

    struct Line(Arc<Mutex<Vec<&'static str>>>);

    impl EnableLine for Line {
        fn assert(&mut self) {
            self.0.lock().unwrap().push("low");
        }
        fn deassert(&mut self) {
            self.0.lock().unwrap().push("high");
        }
    }

    fn recorder(answer: u8) -> (Recorder, Arc<Mutex<Vec<Vec<u8>>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        (
            Recorder {
                frames: frames.clone(),
                answer,
            },
            frames,
        )
    }

    #[test]
    fn test_write_frames_address() {
        let (rec, frames) = recorder(0);
        let mut io = RegisterIo::new(rec);
        io.write(register::BIT_FRAMING, 0x07).unwrap();
        assert_eq!(frames.lock().unwrap()[0], vec![0x1A, 0x07]);
    }

    #[test]
    fn test_read_sets_high_bit_and_returns_second_byte() {
        let (rec, frames) = recorder(0x92);
        let mut io = RegisterIo::new(rec);
        assert_eq!(io.read(register::VERSION).unwrap(), 0x92);
        assert_eq!(frames.lock().unwrap()[0], vec![0xEE, 0x00]);
    }

    #[test]
    fn test_address_masked_to_six_bits() {
        let (rec, frames) = recorder(0);
        let mut io = RegisterIo::new(rec);
        io.write(0x7F, 1).unwrap();
        assert_eq!(frames.lock().unwrap()[0][0], 0x7E);
    }

    #[test]
    fn test_enable_line_brackets_each_transfer() {
        let (rec, _) = recorder(0x01);
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut io = RegisterIo::with_enable_line(rec, Box::new(Line(events.clone())));
        io.set_bitmask(register::TX_CONTROL, 0x02).unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec!["low", "high", "low", "high"]
        );
    }

    #[test]
    fn test_clear_bitmask_read_modify_write() {
        let (rec, frames) = recorder(0xFF);
        let mut io = RegisterIo::new(rec);
        io.clear_bitmask(register::STATUS2, register::MF_CRYPTO1_ON)
            .unwrap();
        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], vec![0x10, 0xF7]);
    }
}
