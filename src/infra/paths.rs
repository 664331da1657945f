// src/infra/paths.rs — XDG-compliant path management
//
// All paths respect the TIPSTREAM_HOME environment variable for isolation.
// When TIPSTREAM_HOME is set, config and data live under that directory.
// When unset, config uses ~/.tipstream/ and data uses XDG_DATA_HOME/tipstream.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Returns the TIPSTREAM_HOME override, if set.
fn tipstream_home() -> Option<PathBuf> {
    std::env::var_os("TIPSTREAM_HOME").map(PathBuf::from)
}

/// Home directory, or the current directory when none can be determined
/// (containers running as a user without a passwd entry).
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $TIPSTREAM_HOME/ or ~/.tipstream/
pub fn config_dir() -> PathBuf {
    if let Some(home) = tipstream_home() {
        return home;
    }
    dirs_home().join(".tipstream")
}

/// Data directory: $TIPSTREAM_HOME/data/ or ~/.local/share/tipstream/
pub fn data_dir() -> PathBuf {
    if let Some(home) = tipstream_home() {
        return home.join("data");
    }
    ProjectDirs::from("", "", "tipstream")
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Tip log database path
pub fn db_path() -> PathBuf {
    data_dir().join("tips.db")
}

/// Directory holding one vector index file per stream
pub fn index_dir() -> PathBuf {
    data_dir().join("indexes")
}

/// Default index file for a stream
pub fn index_path(stream: &str) -> PathBuf {
    index_dir().join(format!("{stream}_tips.index"))
}

/// Ensure all required directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir(), index_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}
