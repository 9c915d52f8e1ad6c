//! Action catalog: every payload a tag may carry, mapped to what it does.
//!
//! The table is rebuilt wholesale from the music directory and the
//! configured streams; callers install the result in one step.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LibraryConfig;
use crate::payload::{ControlByte, Payload};

/// Logical name hashed into the built-in pause payload.
pub const PAUSE_NAME: &str = "pause";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "location", rename_all = "snake_case")]
pub enum TrackSource {
    File(PathBuf),
    Url(String),
}

/// Something the playback backend can start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Logical id: file name for music files, configured name for streams.
    pub id: String,
    pub source: TrackSource,
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Play(Track),
    Pause,
}

impl Action {
    pub fn control(&self) -> ControlByte {
        match self {
            Action::Play(Track {
                source: TrackSource::File(_),
                ..
            }) => ControlByte::MusicFile,
            Action::Play(Track {
                source: TrackSource::Url(_),
                ..
            }) => ControlByte::Stream,
            Action::Pause => ControlByte::Pause,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Action::Play(track) => &track.id,
            Action::Pause => PAUSE_NAME,
        }
    }

    pub fn payload(&self) -> Payload {
        Payload::for_action(self.control(), self.name())
    }

    pub fn describe(&self) -> String {
        match self {
            Action::Play(track) => match track.source {
                TrackSource::File(_) => format!("Play music file {}", track.id),
                TrackSource::Url(_) => format!("Play stream {}", track.id),
            },
            Action::Pause => "Pause playback".to_string(),
        }
    }
}

/// Payload to action lookup.  Iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    actions: HashMap<Payload, Action>,
    order: Vec<Payload>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `action` under its own payload.  A duplicate payload replaces the
    /// earlier entry and keeps its position.
    pub fn insert(&mut self, action: Action) -> Payload {
        let payload = action.payload();
        if self.actions.insert(payload, action).is_none() {
            self.order.push(payload);
        }
        payload
    }

    pub fn get(&self, payload: &Payload) -> Option<&Action> {
        self.actions.get(payload)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Payload, &Action)> {
        self.order
            .iter()
            .filter_map(|p| self.actions.get(p).map(|a| (p, a)))
    }

    /// Human-readable meaning of a tag's contents against this table.
    pub fn describe(&self, payload: Option<&Payload>) -> String {
        let Some(payload) = payload else {
            return "No tag present".to_string();
        };
        if let Some(action) = self.get(payload) {
            return action.describe();
        }
        match payload.control() {
            Some(ControlByte::MusicFile) => {
                "Play a music file not currently present on the device".to_string()
            }
            Some(ControlByte::Stream) => {
                "Play a stream not currently configured on the device".to_string()
            }
            _ => "Unknown control byte or tag empty".to_string(),
        }
    }
}

/// Regular, non-hidden files directly under `root`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn scan_music_root(root: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("music root {} does not exist", root.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!("skipping non-UTF-8 file name {:?}", entry.file_name());
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        files.push((name, entry.path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Build the full table: music files, then streams, then pause.
pub fn build(library: &LibraryConfig) -> anyhow::Result<ActionTable> {
    let mut table = ActionTable::new();

    for (name, path) in scan_music_root(&library.music_root)? {
        table.insert(Action::Play(Track {
            id: name,
            source: TrackSource::File(path),
        }));
    }

    for stream in &library.streams {
        table.insert(Action::Play(Track {
            id: stream.name.clone(),
            source: TrackSource::Url(stream.url.clone()),
        }));
    }

    table.insert(Action::Pause);

    debug!("catalog: {} actions", table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamEntry;

    fn library(root: &Path) -> LibraryConfig {
        LibraryConfig {
            music_root: root.to_path_buf(),
            streams: vec![StreamEntry {
                name: "Radio Mikro".to_string(),
                url: "https://example.org/mikro.mp3".to_string(),
            }],
        }
    }

    #[test]
    fn test_build_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("a.ogg"), b"").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let table = build(&library(dir.path())).unwrap();
        let names: Vec<&str> = table.iter().map(|(_, a)| a.name()).collect();
        assert_eq!(names, vec!["a.ogg", "b.mp3", "Radio Mikro", "pause"]);

        let a = Payload::for_action(ControlByte::MusicFile, "a.ogg");
        assert_eq!(
            table.get(&a),
            Some(&Action::Play(Track {
                id: "a.ogg".to_string(),
                source: TrackSource::File(dir.path().join("a.ogg")),
            }))
        );

        let pause = Payload::for_action(ControlByte::Pause, PAUSE_NAME);
        assert_eq!(table.get(&pause), Some(&Action::Pause));
    }

    #[test]
    fn test_missing_music_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let table = build(&library(&dir.path().join("nope"))).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_describe() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("song.mp3"), b"").unwrap();
        let table = build(&library(dir.path())).unwrap();

        assert_eq!(table.describe(None), "No tag present");
        let song = Payload::for_action(ControlByte::MusicFile, "song.mp3");
        assert_eq!(table.describe(Some(&song)), "Play music file song.mp3");
        let stream = Payload::for_action(ControlByte::Stream, "Radio Mikro");
        assert_eq!(table.describe(Some(&stream)), "Play stream Radio Mikro");
        let pause = Payload::for_action(ControlByte::Pause, PAUSE_NAME);
        assert_eq!(table.describe(Some(&pause)), "Pause playback");

        let gone = Payload::for_action(ControlByte::MusicFile, "deleted.mp3");
        assert_eq!(
            table.describe(Some(&gone)),
            "Play a music file not currently present on the device"
        );
        assert_eq!(
            table.describe(Some(&Payload([0u8; 16]))),
            "Unknown control byte or tag empty"
        );
    }

    #[test]
    fn test_duplicate_insert_keeps_one_entry() {
        let mut table = ActionTable::new();
        table.insert(Action::Pause);
        table.insert(Action::Pause);
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().count(), 1);
    }
}
