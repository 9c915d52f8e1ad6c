//! Full reader sessions through `Connect`, the way the daemon drives them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rc522::sim::{Reply, SimChip, SimTag};
use rc522::{Connect, EnableLine, ErrorKind, Link, LinkedReader, Timeouts, TransportError};

#[derive(Clone, Default)]
struct CountingEnable {
    asserts: Arc<AtomicUsize>,
    deasserts: Arc<AtomicUsize>,
}

impl EnableLine for CountingEnable {
    fn assert(&mut self) {
        self.asserts.fetch_add(1, Ordering::Relaxed);
    }

    fn deassert(&mut self) {
        self.deasserts.fetch_add(1, Ordering::Relaxed);
    }
}

struct GatedConnector {
    chip: SimChip,
    enable: CountingEnable,
}

impl Connect for GatedConnector {
    fn connect(&mut self) -> Result<Link, TransportError> {
        Ok(Link {
            transport: Box::new(self.chip.clone()),
            enable: Some(Box::new(self.enable.clone())),
        })
    }
}

fn payload() -> [u8; 16] {
    let mut data = [0u8; 16];
    data[0] = 0x11;
    for (i, b) in data.iter_mut().enumerate().skip(1) {
        *b = i as u8 * 3;
    }
    data
}

#[test]
fn test_poll_style_read_through_connector() {
    let chip = SimChip::new();
    chip.place_tag(SimTag::new([0x04, 0x11, 0x22, 0x33]).with_block(10, &payload()));
    let mut connector = chip.connector();

    for _ in 0..3 {
        let link = connector.connect().unwrap();
        let mut reader = LinkedReader::open(link, Timeouts::default()).unwrap();
        reader.request().unwrap();
        let uid = reader.anticoll().unwrap();
        assert_eq!(uid.data(), &[0x04, 0x11, 0x22, 0x33]);
        assert_eq!(reader.read(10).unwrap(), payload());
        reader.cleanup();
    }
    assert_eq!(chip.connects(), 3);
}

#[test]
fn test_enable_line_brackets_every_transfer() {
    let chip = SimChip::new();
    chip.place_tag(SimTag::new([1, 2, 3, 4]));
    let enable = CountingEnable::default();
    let mut connector = GatedConnector {
        chip: chip.clone(),
        enable: enable.clone(),
    };

    let mut reader = LinkedReader::open(connector.connect().unwrap(), Timeouts::default()).unwrap();
    reader.request().unwrap();
    reader.cleanup();

    let asserts = enable.asserts.load(Ordering::Relaxed);
    assert!(asserts > 0);
    assert_eq!(asserts, enable.deasserts.load(Ordering::Relaxed));
}

#[test]
fn test_four_page_write_then_read_back() {
    let chip = SimChip::new();
    chip.place_tag(SimTag::new([1, 2, 3, 4]));
    let mut connector = chip.connector();

    let mut reader = LinkedReader::open(connector.connect().unwrap(), Timeouts::default()).unwrap();
    reader.request().unwrap();
    reader.anticoll().unwrap();
    let data = payload();
    for i in 0..4u8 {
        let mut block = [0u8; 16];
        block[..4].copy_from_slice(&data[i as usize * 4..i as usize * 4 + 4]);
        reader.write(10 + i, &block).unwrap();
    }
    reader.cleanup();

    let mut reader = LinkedReader::open(connector.connect().unwrap(), Timeouts::default()).unwrap();
    reader.request().unwrap();
    reader.anticoll().unwrap();
    assert_eq!(reader.read(10).unwrap(), data);
}

#[test]
fn test_failures_map_to_error_kinds() {
    let chip = SimChip::new();
    let mut connector = chip.connector();

    chip.fail_connects(1);
    let err = connector.connect().unwrap_err();
    assert_eq!(rc522::Error::from(err).kind(), ErrorKind::Transport);

    let mut reader = LinkedReader::open(connector.connect().unwrap(), Timeouts::default()).unwrap();
    assert_eq!(reader.request().unwrap_err().kind(), ErrorKind::Protocol);

    chip.place_tag(SimTag::new([1, 2, 3, 4]));
    reader.request().unwrap();
    reader.anticoll().unwrap();
    chip.push_reply(Reply::ack());
    chip.push_reply(Reply::bits(&[0x01], 4));
    let err = reader.write(10, &[0u8; 16]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteAck);
}
