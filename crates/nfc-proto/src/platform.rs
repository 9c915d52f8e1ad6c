//! Where the daemon keeps its files and finds its helpers.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "nfcmusik";

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}

/// `~/.local/share/nfcmusik`, home of the log file.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| home().join(".local").join("share"))
        .join(APP_DIR)
}

/// `NFCMUSIK_CONFIG_DIR`, else `~/.config/nfcmusik`.
pub fn config_dir() -> PathBuf {
    match std::env::var_os("NFCMUSIK_CONFIG_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::config_dir()
            .unwrap_or_else(|| home().join(".config"))
            .join(APP_DIR),
    }
}

/// IPC socket handed to mpv with `--input-ipc-server`.
pub fn mpv_socket_path() -> PathBuf {
    std::env::temp_dir().join("nfcmusik-mpv.sock")
}

/// `MPV_PATH`, then next to our own executable, then `PATH`.
pub fn find_mpv_binary() -> Option<PathBuf> {
    if let Some(p) = std::env::var_os("MPV_PATH").map(PathBuf::from) {
        if p.is_file() {
            return Some(p);
        }
    }
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let path_dirs = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect::<Vec<_>>())
        .unwrap_or_default();

    beside_exe
        .into_iter()
        .chain(path_dirs)
        .map(|dir| dir.join("mpv"))
        .find(|candidate| candidate.is_file())
}
