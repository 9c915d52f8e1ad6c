//! Raspberry Pi link: rppal SPI for the bus, rppal GPIO for the reset and
//! optional enable lines.

use std::thread;
use std::time::Duration;

use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{Connect, EnableLine, Link, Transport};

/// Bus and pin parameters.  Pins use physical header numbering.
#[derive(Debug, Clone, Copy)]
pub struct RpiConfig {
    pub bus: u8,
    pub device: u8,
    pub clock_hz: u32,
    pub reset_pin: u8,
    /// 0 = no secondary enable line.
    pub enable_pin: u8,
}

/// Physical header pin to BCM GPIO number (40-pin header).
pub fn board_to_bcm(pin: u8) -> Option<u8> {
    let bcm = match pin {
        3 => 2,
        5 => 3,
        7 => 4,
        8 => 14,
        10 => 15,
        11 => 17,
        12 => 18,
        13 => 27,
        15 => 22,
        16 => 23,
        18 => 24,
        19 => 10,
        21 => 9,
        22 => 25,
        23 => 11,
        24 => 8,
        26 => 7,
        27 => 0,
        28 => 1,
        29 => 5,
        31 => 6,
        32 => 12,
        33 => 13,
        35 => 19,
        36 => 16,
        37 => 26,
        38 => 20,
        40 => 21,
        _ => return None,
    };
    Some(bcm)
}

fn bus(index: u8) -> Result<Bus, TransportError> {
    Ok(match index {
        0 => Bus::Spi0,
        1 => Bus::Spi1,
        2 => Bus::Spi2,
        3 => Bus::Spi3,
        4 => Bus::Spi4,
        5 => Bus::Spi5,
        6 => Bus::Spi6,
        other => return Err(TransportError::new(format!("no SPI bus {}", other))),
    })
}

fn slave_select(index: u8) -> Result<SlaveSelect, TransportError> {
    Ok(match index {
        0 => SlaveSelect::Ss0,
        1 => SlaveSelect::Ss1,
        2 => SlaveSelect::Ss2,
        other => return Err(TransportError::new(format!("no SPI device {}", other))),
    })
}

fn output_pin(board_pin: u8) -> Result<OutputPin, TransportError> {
    let bcm = board_to_bcm(board_pin)
        .ok_or_else(|| TransportError::new(format!("header pin {} is not a GPIO", board_pin)))?;
    let gpio = Gpio::new().map_err(|e| TransportError::new(e.to_string()))?;
    let pin = gpio
        .get(bcm)
        .map_err(|e| TransportError::new(e.to_string()))?;
    Ok(pin.into_output_high())
}

/// SPI transport.  Holds the reset line high for as long as it lives; the
/// pin is released when the session is dropped.
pub struct RpiSpi {
    spi: Spi,
    _reset: OutputPin,
}

impl Transport for RpiSpi {
    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let out = buf.to_vec();
        self.spi
            .transfer(buf, &out)
            .map_err(|e| TransportError::new(e.to_string()))?;
        Ok(())
    }
}

struct RpiEnable(OutputPin);

impl EnableLine for RpiEnable {
    fn assert(&mut self) {
        self.0.set_low();
    }

    fn deassert(&mut self) {
        self.0.set_high();
    }
}

/// Opens the SPI device and GPIO lines afresh on every [`Connect::connect`].
pub struct RpiConnector {
    config: RpiConfig,
}

impl RpiConnector {
    pub fn new(config: RpiConfig) -> Self {
        Self { config }
    }
}

impl Connect for RpiConnector {
    fn connect(&mut self) -> Result<Link, TransportError> {
        let cfg = self.config;
        let reset = output_pin(cfg.reset_pin)?;
        // Give the chip time to come out of hard power-down on first use.
        thread::sleep(Duration::from_micros(50));

        let spi = Spi::new(
            bus(cfg.bus)?,
            slave_select(cfg.device)?,
            cfg.clock_hz,
            Mode::Mode0,
        )
        .map_err(|e| TransportError::new(e.to_string()))?;

        let enable = if cfg.enable_pin != 0 {
            Some(Box::new(RpiEnable(output_pin(cfg.enable_pin)?)) as Box<dyn EnableLine + Send>)
        } else {
            None
        };

        debug!(
            "rc522: opened spi{}.{} at {} Hz",
            cfg.bus, cfg.device, cfg.clock_hz
        );

        Ok(Link {
            transport: Box::new(RpiSpi { spi, _reset: reset }),
            enable,
        })
    }
}
