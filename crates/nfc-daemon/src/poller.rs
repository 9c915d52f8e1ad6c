//! Background poll loop on a dedicated OS thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::session::SharedSession;

pub struct Poller {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Poller {
    pub fn spawn(session: SharedSession, interval: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = thread::Builder::new()
            .name("nfc-poller".to_string())
            .spawn(move || run(session, interval, flag))?;
        info!("poller: started, interval {:?}", interval);
        Ok(Self { stop, thread })
    }

    /// Ask the loop to finish its current cycle and wait for it.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.thread.join().is_err() {
            tracing::error!("poller: thread panicked");
        }
        info!("poller: stopped");
    }
}

fn run(session: SharedSession, interval: Duration, stop: Arc<AtomicBool>) {
    let mut cycles: u64 = 0;
    while !stop.load(Ordering::Relaxed) {
        {
            let mut session = session.blocking_lock();
            let decision = session.poll_cycle();
            debug!("poller: cycle {} -> {:?}", cycles, decision);
        }
        cycles += 1;
        // Outside the lock so HTTP requests get their turn.
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Dispatcher, Thresholds};
    use crate::playback::testing::{Call, RecordingPlayback};
    use crate::session::Session;
    use nfc_proto::config::ReaderConfig;
    use nfc_proto::{Action, ActionTable, ControlByte, Payload, Track, TrackSource};
    use rc522::sim::{SimChip, SimTag};
    use std::time::Instant;

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_poller_starts_and_stops_playback() {
        let chip = SimChip::new();
        let payload = Payload::for_action(ControlByte::Stream, "Radio Mikro");
        chip.place_tag(SimTag::new([5, 6, 7, 8]).with_block(10, &payload.0));

        let mut table = ActionTable::new();
        table.insert(Action::Play(Track {
            id: "Radio Mikro".to_string(),
            source: TrackSource::Url("https://example.org/mikro.mp3".to_string()),
        }));

        let rec = RecordingPlayback::default();
        let session = Session::new(
            Box::new(chip.connector()),
            &ReaderConfig::default(),
            table,
            Dispatcher::new(Box::new(rec.clone()), Thresholds::default()),
        )
        .unwrap()
        .shared();

        let poller = Poller::spawn(session.clone(), Duration::from_millis(2)).unwrap();
        assert!(wait_for(|| rec.starts() == 1));
        assert!(session.blocking_lock().snapshot().is_some());

        chip.remove_tag();
        assert!(wait_for(|| rec.calls().last() == Some(&Call::Stop)));
        poller.shutdown();

        assert_eq!(
            rec.calls(),
            vec![Call::Start("Radio Mikro".into()), Call::Stop]
        );
    }

    #[test]
    fn test_lock_is_free_between_cycles() {
        let chip = SimChip::new();
        let session = Session::new(
            Box::new(chip.connector()),
            &ReaderConfig::default(),
            ActionTable::new(),
            Dispatcher::new(Box::new(RecordingPlayback::default()), Thresholds::default()),
        )
        .unwrap()
        .shared();
        let poller = Poller::spawn(session.clone(), Duration::from_millis(500)).unwrap();

        assert!(wait_for(|| chip.connects() == 1));
        thread::sleep(Duration::from_millis(50));
        assert!(session.try_lock().is_ok());
        assert_eq!(chip.connects(), 1);
        poller.shutdown();
    }

    #[test]
    fn test_shutdown_is_prompt() {
        let chip = SimChip::new();
        let session = Session::new(
            Box::new(chip.connector()),
            &ReaderConfig::default(),
            ActionTable::new(),
            Dispatcher::new(Box::new(RecordingPlayback::default()), Thresholds::default()),
        )
        .unwrap()
        .shared();
        let poller = Poller::spawn(session, Duration::from_millis(20)).unwrap();
        assert!(wait_for(|| chip.connects() >= 2));
        let started = Instant::now();
        poller.shutdown();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
