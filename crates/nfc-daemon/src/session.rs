//! The reader session: one lock guarding the reader connection, the last
//! tag snapshot, the action table and the dispatcher.
//!
//! The poller and the HTTP handlers share a [`SharedSession`].  Every reader
//! exchange opens a fresh connection and initialises the chip, so error
//! state never leaks from one cycle to the next.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use nfc_proto::config::ReaderConfig;
use nfc_proto::protocol::StateResponse;
use nfc_proto::{ActionTable, Payload, TagSnapshot};
use rc522::{Connect, LinkedReader, Timeouts, Uid, BLOCK_LEN};
use tracing::{debug, info, warn};

use crate::dispatcher::{Decision, Dispatcher};

/// Pages a 16-byte payload spans on a tag with 4-byte pages.
const PAYLOAD_PAGES: u8 = 4;

pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

pub struct Session {
    connector: Box<dyn Connect>,
    timeouts: Timeouts,
    page: u8,
    snapshot: Option<TagSnapshot>,
    table: ActionTable,
    dispatcher: Dispatcher,
}

impl Session {
    pub fn new(
        connector: Box<dyn Connect>,
        reader: &ReaderConfig,
        table: ActionTable,
        dispatcher: Dispatcher,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            reader.page.checked_add(PAYLOAD_PAGES - 1).is_some(),
            "reader page {} leaves no room for a {}-page payload",
            reader.page,
            PAYLOAD_PAGES
        );
        Ok(Self {
            connector,
            timeouts: Timeouts {
                transceive: Duration::from_millis(reader.transceive_timeout_ms),
                crc: Duration::from_millis(reader.crc_timeout_ms),
            },
            page: reader.page,
            snapshot: None,
            table,
            dispatcher,
        })
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    fn open_reader(&mut self) -> rc522::Result<LinkedReader> {
        let link = self.connector.connect()?;
        LinkedReader::open(link, self.timeouts)
    }

    /// Open the reader once and read its firmware version.
    pub fn reader_version(&mut self) -> rc522::Result<u8> {
        let mut reader = self.open_reader()?;
        let version = reader.version();
        reader.cleanup();
        version
    }

    /// One poll cycle: read the tag, commit the snapshot, dispatch.
    ///
    /// Reader errors mean "no tag this cycle".
    pub fn poll_cycle(&mut self) -> Decision {
        self.snapshot = None;

        match self.read_tag() {
            Ok(tag) => {
                debug!("poll: uid {} payload {}", hex::encode(tag.uid), tag.payload);
                self.snapshot = Some(tag);
            }
            Err(e) => debug!("poll: no tag ({})", e),
        }

        let payload = self.snapshot.as_ref().map(|t| t.payload);
        self.dispatcher.dispatch(payload.as_ref(), &self.table)
    }

    fn read_tag(&mut self) -> rc522::Result<TagSnapshot> {
        let mut reader = self.open_reader()?;
        let result = read_page(&mut reader, self.page);
        // No halt: a halted tag would ignore the next cycle's REQA.
        reader.cleanup();
        let (uid, block) = result?;
        Ok(TagSnapshot {
            uid: *uid.as_bytes(),
            payload: Payload(block),
            seen_at: Local::now(),
        })
    }

    /// Write `payload` across four consecutive pages of the tag in the field.
    pub fn write_payload(&mut self, payload: &Payload) -> bool {
        let result = self.try_write(payload);
        match &result {
            Ok(()) => info!("write: stored {} at page {}", payload, self.page),
            Err(e) => warn!("write: {} failed: {}", payload, e),
        }
        result.is_ok()
    }

    fn try_write(&mut self, payload: &Payload) -> rc522::Result<()> {
        let mut reader = self.open_reader()?;
        let result = write_pages(&mut reader, self.page, payload);
        reader.cleanup();
        result
    }

    pub fn snapshot(&self) -> Option<TagSnapshot> {
        self.snapshot.clone()
    }

    pub fn table(&self) -> &ActionTable {
        &self.table
    }

    /// Replace the whole action table.
    pub fn install_table(&mut self, table: ActionTable) {
        info!("session: installed {} actions", table.len());
        self.table = table;
    }

    pub fn state(&self) -> StateResponse {
        let state = self.dispatcher.state();
        StateResponse {
            current: state.current.as_ref().map(|t| t.id.clone()),
            previous: state.previous.as_ref().map(|t| t.id.clone()),
            absent_cycles: state.absent_cycles,
            playing: self.dispatcher.is_playing(),
            tag: self.snapshot.clone(),
            actions: self.table.len(),
        }
    }

    pub fn stop_playback(&mut self) {
        self.dispatcher.stop();
    }
}

fn read_page(reader: &mut LinkedReader, page: u8) -> rc522::Result<(Uid, [u8; BLOCK_LEN])> {
    reader.request()?;
    let uid = reader.anticoll()?;
    let block = reader.read(page)?;
    Ok((uid, block))
}

fn write_pages(reader: &mut LinkedReader, page: u8, payload: &Payload) -> rc522::Result<()> {
    reader.request()?;
    reader.anticoll()?;
    for i in 0..PAYLOAD_PAGES {
        let target = page + i;
        // Some tags refuse a write to a page that was not read first.
        if let Err(e) = reader.read(target) {
            debug!("write: pre-read of page {} failed: {}", target, e);
        }
        let mut block = [0u8; BLOCK_LEN];
        block[..4].copy_from_slice(&payload.page_chunk(i as usize));
        reader.write(target, &block)?;
    }
    Ok(())
}
