use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub library: LibraryConfig,
}

/// Reader chip wiring and bus timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default)]
    pub bus: u8,
    #[serde(default)]
    pub device: u8,
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u32,
    /// Reset line, physical header numbering.
    #[serde(default = "default_reset_pin")]
    pub reset_pin: u8,
    /// Secondary enable line, physical header numbering.  0 disables it.
    #[serde(default)]
    pub enable_pin: u8,
    /// First tag page used for the 16-byte payload.
    #[serde(default = "default_page")]
    pub page: u8,
    #[serde(default = "default_transceive_timeout_ms")]
    pub transceive_timeout_ms: u64,
    #[serde(default = "default_crc_timeout_ms")]
    pub crc_timeout_ms: u64,
}

/// Poll cadence and debounce thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Consecutive tag-absent cycles before playback stops.
    #[serde(default = "default_threshold")]
    pub stop_threshold: u32,
    /// Consecutive tag-absent cycles before the last track may start again.
    #[serde(default = "default_threshold")]
    pub replay_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Where playable content comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_music_root")]
    pub music_root: PathBuf,
    #[serde(default)]
    pub streams: Vec<StreamEntry>,
}

/// A named stream URL that a tag can start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub name: String,
    pub url: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            bus: 0,
            device: 0,
            clock_hz: default_clock_hz(),
            reset_pin: default_reset_pin(),
            enable_pin: 0,
            page: default_page(),
            transceive_timeout_ms: default_transceive_timeout_ms(),
            crc_timeout_ms: default_crc_timeout_ms(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            stop_threshold: default_threshold(),
            replay_threshold: default_threshold(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            music_root: default_music_root(),
            streams: Vec::new(),
        }
    }
}

fn default_clock_hz() -> u32 {
    1_000_000
}

fn default_reset_pin() -> u8 {
    22
}

fn default_page() -> u8 {
    10
}

fn default_transceive_timeout_ms() -> u64 {
    40
}

fn default_crc_timeout_ms() -> u64 {
    5
}

fn default_interval_ms() -> u64 {
    500
}

fn default_threshold() -> u32 {
    3
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_music_root() -> PathBuf {
    PathBuf::from("/usr/local/nfcmusik/music")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        let mut config = if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            config
        } else {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Apply `NFCMUSIK_*` overrides.  Unparseable values are ignored.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("NFCMUSIK_SERVER_HOST") {
            self.http.bind_address = host;
        }
        if let Some(port) = var("NFCMUSIK_SERVER_PORT") {
            match port.parse() {
                Ok(port) => self.http.port = port,
                Err(_) => tracing::warn!("ignoring NFCMUSIK_SERVER_PORT={:?}", port),
            }
        }
        if let Some(root) = var("NFCMUSIK_AUDIO_FILE_ROOT") {
            self.library.music_root = PathBuf::from(root);
        }
    }
}
