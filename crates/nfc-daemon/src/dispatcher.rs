//! Tag payload to playback decisions.
//!
//! [`decide`] is a pure transition over [`DispatchState`]; [`Dispatcher`]
//! applies the resulting [`Decision`] to a [`Playback`] backend.
//!
//! Two thresholds debounce a flaky antenna field:
//! - playback stops only after `stop_threshold` consecutive absent cycles;
//! - the track that was playing last may start again only after
//!   `replay_threshold` consecutive absent cycles.

use nfc_proto::config::PollerConfig;
use nfc_proto::{Action, ActionTable, Payload, Track};
use tracing::{debug, error, info};

use crate::playback::Playback;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub stop: u32,
    pub replay: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { stop: 3, replay: 3 }
    }
}

impl From<&PollerConfig> for Thresholds {
    fn from(cfg: &PollerConfig) -> Self {
        Self {
            stop: cfg.stop_threshold,
            replay: cfg.replay_threshold,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchState {
    pub current: Option<Track>,
    pub previous: Option<Track>,
    /// Consecutive cycles without a readable payload.
    pub absent_cycles: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Start(Track),
    Stop,
    /// Nothing to do.
    Keep,
    /// Control byte or hash not in the table.
    Unclassified,
    /// Same track as last time, tag not away for long enough.
    Suppressed,
}

pub fn decide(
    state: &DispatchState,
    payload: Option<&Payload>,
    table: &ActionTable,
    thresholds: Thresholds,
) -> (DispatchState, Decision) {
    let mut next = state.clone();

    let Some(payload) = payload else {
        next.absent_cycles = next.absent_cycles.saturating_add(1);
        if next.absent_cycles >= thresholds.stop && next.current.is_some() {
            next.current = None;
            return (next, Decision::Stop);
        }
        return (next, Decision::Keep);
    };

    let absent = state.absent_cycles;
    next.absent_cycles = 0;

    let decision = match table.get(payload) {
        None => Decision::Unclassified,
        Some(Action::Pause) => {
            // A later re-tap of the paused track is deliberate.
            next.previous = None;
            if next.current.take().is_some() {
                Decision::Stop
            } else {
                Decision::Keep
            }
        }
        Some(Action::Play(track)) => {
            if state.current.as_ref() == Some(track) {
                Decision::Keep
            } else if state.previous.as_ref() == Some(track) && absent < thresholds.replay {
                Decision::Suppressed
            } else {
                next.current = Some(track.clone());
                next.previous = Some(track.clone());
                Decision::Start(track.clone())
            }
        }
    };

    (next, decision)
}

/// Debounce state plus the backend it drives.
pub struct Dispatcher {
    state: DispatchState,
    thresholds: Thresholds,
    playback: Box<dyn Playback>,
}

impl Dispatcher {
    pub fn new(playback: Box<dyn Playback>, thresholds: Thresholds) -> Self {
        Self {
            state: DispatchState::default(),
            thresholds,
            playback,
        }
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    /// Run one cycle's payload through the debounce and act on it.
    pub fn dispatch(&mut self, payload: Option<&Payload>, table: &ActionTable) -> Decision {
        let (next, decision) = decide(&self.state, payload, table, self.thresholds);
        self.state = next;

        match &decision {
            Decision::Start(track) => {
                info!("dispatch: starting {}", track);
                // State already records the track; a broken one is not retried every cycle.
                if let Err(e) = self.playback.start(track) {
                    error!("dispatch: could not start {}: {}", track, e);
                }
            }
            Decision::Stop => {
                info!("dispatch: stopping playback");
                if let Err(e) = self.playback.stop() {
                    error!("dispatch: could not stop playback: {}", e);
                }
            }
            Decision::Unclassified => {
                if let Some(p) = payload {
                    debug!("dispatch: unclassified payload {}", p);
                }
            }
            Decision::Suppressed => {
                debug!(
                    "dispatch: not replaying after {} absent cycles",
                    self.state.absent_cycles
                );
            }
            Decision::Keep => {
                if payload.is_none() {
                    debug!("dispatch: no tag, absent cycles {}", self.state.absent_cycles);
                }
            }
        }

        decision
    }

    /// Stop unconditionally, for shutdown.
    pub fn stop(&mut self) {
        self.state.current = None;
        if let Err(e) = self.playback.stop() {
            error!("dispatch: could not stop playback: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::testing::{Call, RecordingPlayback};
    use nfc_proto::{ControlByte, TrackSource};

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            source: TrackSource::File(format!("/music/{}", id).into()),
        }
    }

    fn table() -> ActionTable {
        let mut table = ActionTable::new();
        table.insert(Action::Play(track("trackX")));
        table.insert(Action::Play(track("trackY")));
        table.insert(Action::Pause);
        table
    }

    fn payload(name: &str) -> Payload {
        Payload::for_action(ControlByte::MusicFile, name)
    }

    fn pause() -> Payload {
        Payload::for_action(ControlByte::Pause, nfc_proto::catalog::PAUSE_NAME)
    }

    /// Feed a sequence of cycles; returns the decisions.
    fn run(seq: &[Option<Payload>]) -> (RecordingPlayback, Vec<Decision>) {
        let rec = RecordingPlayback::default();
        let mut d = Dispatcher::new(Box::new(rec.clone()), Thresholds::default());
        let table = table();
        let decisions = seq.iter().map(|p| d.dispatch(p.as_ref(), &table)).collect();
        (rec, decisions)
    }

    #[test]
    fn test_single_dropout_does_not_glitch() {
        let a = Some(payload("trackX"));
        let (rec, _) = run(&[a, a, None, a]);
        assert_eq!(rec.calls(), vec![Call::Start("trackX".into())]);
    }

    #[test]
    fn test_replay_needs_enough_absent_cycles() {
        let a = Some(payload("trackX"));

        let (rec, decisions) = run(&[a, None, None, a]);
        assert_eq!(rec.starts(), 1);
        assert_eq!(decisions[3], Decision::Keep);

        // Three absent cycles: stop, then restart.
        let (rec, decisions) = run(&[a, None, None, None, a]);
        assert_eq!(
            rec.calls(),
            vec![
                Call::Start("trackX".into()),
                Call::Stop,
                Call::Start("trackX".into())
            ]
        );
        assert_eq!(decisions[4], Decision::Start(track("trackX")));
    }

    #[test]
    fn test_replay_suppressed_when_stop_came_first() {
        // stop=2 < replay=3: stopped, but the tag came back too soon.
        let rec = RecordingPlayback::default();
        let mut d = Dispatcher::new(Box::new(rec.clone()), Thresholds { stop: 2, replay: 3 });
        let table = table();
        let a = payload("trackX");
        d.dispatch(Some(&a), &table);
        d.dispatch(None, &table);
        assert_eq!(d.dispatch(None, &table), Decision::Stop);
        assert_eq!(d.dispatch(Some(&a), &table), Decision::Suppressed);
        assert_eq!(rec.calls(), vec![Call::Start("trackX".into()), Call::Stop]);
        assert_eq!(d.state().current, None);
        assert_eq!(d.state().absent_cycles, 0);
    }

    #[test]
    fn test_different_track_starts_immediately() {
        let (rec, _) = run(&[Some(payload("trackX")), None, Some(payload("trackY"))]);
        assert_eq!(
            rec.calls(),
            vec![Call::Start("trackX".into()), Call::Start("trackY".into())]
        );
    }

    #[test]
    fn test_unknown_hash_is_unclassified() {
        let a = Some(payload("trackX"));
        let unknown = Some(payload("not-on-device"));
        let (rec, decisions) = run(&[a, unknown, unknown]);
        assert_eq!(decisions[1], Decision::Unclassified);
        assert_eq!(rec.calls(), vec![Call::Start("trackX".into())]);

        let junk = Some(Payload([0xEE; 16]));
        let (rec, decisions) = run(&[junk]);
        assert_eq!(decisions[0], Decision::Unclassified);
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn test_unclassified_does_not_touch_playback_state() {
        let table = table();
        let state = DispatchState {
            current: Some(track("trackX")),
            previous: Some(track("trackX")),
            absent_cycles: 2,
        };
        let (next, decision) = decide(&state, Some(&payload("zzz")), &table, Thresholds::default());
        assert_eq!(decision, Decision::Unclassified);
        assert_eq!(next.current, state.current);
        assert_eq!(next.previous, state.previous);
        assert_eq!(next.absent_cycles, 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (rec, decisions) = run(&[None, None, None, None, None]);
        assert!(rec.calls().is_empty());
        assert!(decisions.iter().all(|d| *d == Decision::Keep));

        let a = Some(payload("trackX"));
        let (rec, _) = run(&[a, None, None, None, None, None, None]);
        assert_eq!(rec.calls(), vec![Call::Start("trackX".into()), Call::Stop]);
    }

    #[test]
    fn test_pause_stops_and_allows_retap() {
        let a = Some(payload("trackX"));
        let p = Some(pause());
        let (rec, decisions) = run(&[a, p, p, a]);
        assert_eq!(decisions[1], Decision::Stop);
        assert_eq!(decisions[2], Decision::Keep);
        assert_eq!(
            rec.calls(),
            vec![
                Call::Start("trackX".into()),
                Call::Stop,
                Call::Start("trackX".into())
            ]
        );
    }

    #[test]
    fn test_failed_start_still_updates_state() {
        let rec = RecordingPlayback::failing();
        let mut d = Dispatcher::new(Box::new(rec.clone()), Thresholds::default());
        let table = table();
        let a = payload("trackX");
        d.dispatch(Some(&a), &table);
        d.dispatch(Some(&a), &table);
        assert_eq!(rec.starts(), 1);
        assert_eq!(d.state().current, Some(track("trackX")));
    }

    #[test]
    fn test_end_to_end_track_x() {
        let mut bytes = [0u8; 16];
        bytes[0] = 0x11;
        bytes[1..].copy_from_slice(&[
            0x83, 0x44, 0x41, 0x0b, 0x0a, 0x75, 0xf2, 0x55, 0x24, 0x75, 0xa0, 0xa6, 0x84, 0x63,
            0xe0,
        ]);
        let synthetic = Some(Payload(bytes));
        let (rec, _) = run(&[synthetic; 10]);
        assert_eq!(rec.calls(), vec![Call::Start("trackX".into())]);
    }
}
