mod dispatcher;
mod http;
mod mpv;
mod playback;
mod poller;
mod session;

use std::sync::Arc;
use std::time::Duration;

use nfc_proto::catalog;
use nfc_proto::config::{Config, ReaderConfig};
use rc522::Connect;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::dispatcher::{Dispatcher, Thresholds};
use crate::playback::MpvPlayback;
use crate::poller::Poller;
use crate::session::Session;

#[cfg(feature = "rpi")]
fn connector(cfg: &ReaderConfig) -> Box<dyn Connect> {
    use rc522::rpi::{RpiConfig, RpiConnector};
    Box::new(RpiConnector::new(RpiConfig {
        bus: cfg.bus,
        device: cfg.device,
        clock_hz: cfg.clock_hz,
        reset_pin: cfg.reset_pin,
        enable_pin: cfg.enable_pin,
    }))
}

#[cfg(not(feature = "rpi"))]
fn connector(_cfg: &ReaderConfig) -> Box<dyn Connect> {
    warn!("built without reader hardware support; every poll will find no tag");
    Box::new(NoReader)
}

/// Stand-in for builds without a hardware transport.
#[cfg(not(feature = "rpi"))]
struct NoReader;

#[cfg(not(feature = "rpi"))]
impl Connect for NoReader {
    fn connect(&mut self) -> Result<rc522::Link, rc522::TransportError> {
        Err(rc522::TransportError::new(
            "no reader transport compiled in (build with --features rpi)",
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging + stderr
    let data_dir = nfc_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nfc_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let table = catalog::build(&config.library)?;
    info!(
        "Catalog: {} actions from {}",
        table.len(),
        config.library.music_root.display()
    );

    let (playback, player_task) = MpvPlayback::spawn();
    let dispatcher = Dispatcher::new(
        Box::new(playback.clone()),
        Thresholds::from(&config.poller),
    );

    let session = Session::new(connector(&config.reader), &config.reader, table, dispatcher)?.shared();

    let probe = session.clone();
    match tokio::task::spawn_blocking(move || probe.blocking_lock().reader_version()).await? {
        Ok(version) => info!("Reader firmware version 0x{:02x}", version),
        Err(e) => warn!("Reader not answering at startup: {}", e),
    }

    let poller = Poller::spawn(
        session.clone(),
        Duration::from_millis(config.poller.interval_ms),
    )?;

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            http::HttpState {
                session: session.clone(),
                library: Arc::new(config.library.clone()),
            },
        );
    }

    info!("Daemon initialised, waiting for Ctrl-C");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    tokio::task::spawn_blocking(move || poller.shutdown()).await?;
    session.lock().await.stop_playback();
    playback.shutdown();
    if tokio::time::timeout(Duration::from_secs(3), player_task)
        .await
        .is_err()
    {
        warn!("player task did not exit in time");
    }

    Ok(())
}
