//! Playback backend seen by the dispatcher, and its mpv implementation.
//!
//! The dispatcher runs on the poller thread while the session lock is held,
//! so every call here must return without waiting on audio I/O.
//! `MpvPlayback` queues commands to a player task that owns mpv.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nfc_proto::{Track, TrackSource};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mpv::{MpvDriver, MpvEvent, MpvHandle};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("music file {0} does not exist")]
    MissingFile(PathBuf),
    #[error("player task has exited")]
    PlayerGone,
}

pub trait Playback: Send {
    fn start(&mut self, track: &Track) -> Result<(), PlaybackError>;
    /// Idempotent.
    fn stop(&mut self) -> Result<(), PlaybackError>;
    fn is_playing(&self) -> bool;
}

#[derive(Debug)]
pub enum PlayerCommand {
    Load(String),
    Stop,
    Shutdown,
}

/// [`Playback`] over a channel to [`run_player`].  Clones share the task.
#[derive(Clone)]
pub struct MpvPlayback {
    tx: mpsc::UnboundedSender<PlayerCommand>,
    playing: Arc<AtomicBool>,
}

impl MpvPlayback {
    /// Spawn the player task on the current runtime.
    pub fn spawn() -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let playing = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_player(rx, playing.clone()));
        (Self { tx, playing }, task)
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(PlayerCommand::Shutdown);
    }

    fn send(&self, cmd: PlayerCommand) -> Result<(), PlaybackError> {
        self.tx.send(cmd).map_err(|_| PlaybackError::PlayerGone)
    }
}

impl Playback for MpvPlayback {
    fn start(&mut self, track: &Track) -> Result<(), PlaybackError> {
        let location = match &track.source {
            TrackSource::File(path) => {
                if !path.exists() {
                    return Err(PlaybackError::MissingFile(path.clone()));
                }
                path.to_string_lossy().into_owned()
            }
            TrackSource::Url(url) => url.clone(),
        };
        self.send(PlayerCommand::Load(location))?;
        self.playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::Stop)?;
        self.playing.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }
}

// ── player task ───────────────────────────────────────────────────────────────

struct Player {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    event_tx: mpsc::Sender<MpvEvent>,
    playing: Arc<AtomicBool>,
}

impl Player {
    async fn ensure_handle(&mut self) -> Option<MpvHandle> {
        if self.handle.is_some() && !self.driver.is_running() {
            warn!("player: mpv process died, dropping handle");
            self.handle = None;
            self.playing.store(false, Ordering::Relaxed);
        }

        if self.handle.is_none() {
            match self.driver.launch(self.event_tx.clone()).await {
                Ok(h) => self.handle = Some(h),
                Err(e) => {
                    warn!("player: failed to start mpv: {}", e);
                    return None;
                }
            }
        }

        self.handle.clone()
    }

    async fn handle_command(&mut self, cmd: PlayerCommand) {
        match cmd {
            PlayerCommand::Load(location) => {
                let Some(h) = self.ensure_handle().await else {
                    self.playing.store(false, Ordering::Relaxed);
                    return;
                };
                info!("player: loading {}", location);
                if let Err(e) = h.load(&location).await {
                    warn!("player: loadfile {} failed: {}", location, e);
                    self.playing.store(false, Ordering::Relaxed);
                }
            }
            PlayerCommand::Stop => {
                // Nothing to stop without a live process.
                if let Some(h) = &self.handle {
                    if let Err(e) = h.stop().await {
                        debug!("player: stop failed: {}", e);
                    }
                }
                self.playing.store(false, Ordering::Relaxed);
            }
            PlayerCommand::Shutdown => {}
        }
    }

    fn handle_event(&self, evt: MpvEvent) {
        match evt {
            MpvEvent::Idle(idle) => {
                debug!("player: idle-active={}", idle);
                self.playing.store(!idle, Ordering::Relaxed);
            }
            MpvEvent::EndFile { reason } => debug!("player: end-file ({})", reason),
            MpvEvent::Other(_) => {}
        }
    }
}

/// Owns the mpv process for the life of the daemon.
pub async fn run_player(mut rx: mpsc::UnboundedReceiver<PlayerCommand>, playing: Arc<AtomicBool>) {
    // One event channel for every connection; the sender clone held by
    // `Player` keeps it open across mpv restarts.
    let (event_tx, mut event_rx) = mpsc::channel::<MpvEvent>(64);
    let mut player = Player {
        driver: MpvDriver::new(),
        handle: None,
        event_tx,
        playing,
    };

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                None | Some(PlayerCommand::Shutdown) => break,
                Some(cmd) => player.handle_command(cmd).await,
            },
            Some(evt) = event_rx.recv() => player.handle_event(evt),
        }
    }

    player.driver.terminate().await;
    debug!("player: task exiting");
}

#[cfg(test)]
pub mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Start(String),
        Stop,
    }

    /// Records every call.  Clones share the log.
    #[derive(Clone, Default)]
    pub struct RecordingPlayback {
        pub calls: Arc<Mutex<Vec<Call>>>,
        pub fail_starts: bool,
        playing: Arc<AtomicBool>,
    }

    impl RecordingPlayback {
        /// Every `start` is recorded and then fails.
        pub fn failing() -> Self {
            Self {
                fail_starts: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn starts(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Start(_)))
                .count()
        }
    }

    impl Playback for RecordingPlayback {
        fn start(&mut self, track: &Track) -> Result<(), PlaybackError> {
            self.calls.lock().unwrap().push(Call::Start(track.id.clone()));
            if self.fail_starts {
                return Err(PlaybackError::PlayerGone);
            }
            self.playing.store(true, Ordering::Relaxed);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), PlaybackError> {
            self.calls.lock().unwrap().push(Call::Stop);
            self.playing.store(false, Ordering::Relaxed);
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::Relaxed)
        }
    }
}
