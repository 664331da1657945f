// src/cli/status.rs — Stream and index status display

use crate::infra::config::Config;
use crate::infra::paths;
use crate::memory::persistence;
use crate::memory::store::Store;

/// Display configuration, database and per-stream index status.
pub async fn show_status(config: &Config) -> anyhow::Result<()> {
    let config_path = paths::config_file_path();
    let db_path = paths::db_path();

    println!("tipstream v{}", env!("CARGO_PKG_VERSION"));
    println!();

    if config_path.exists() {
        println!("  Config:     {} (loaded)", config_path.display());
    } else {
        println!("  Config:     (using defaults)");
    }

    let store = if db_path.exists() {
        let size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
        println!("  Database:   {} ({})", db_path.display(), format_bytes(size));
        Store::open(&db_path).ok()
    } else {
        println!("  Database:   (not initialized)");
        None
    };

    println!(
        "  Models:     {} / {}",
        config.provider.chat_model, config.provider.embedding_model
    );
    println!();
    println!("  Streams:");

    for name in config.streams().keys() {
        let Some(stream) = config.resolve_stream(name) else {
            continue;
        };
        let index = match persistence::read_header(&stream.index_path) {
            Ok((dim, count)) => format!("{count} vectors, dim {dim}"),
            Err(_) if !stream.index_path.exists() => "no index".to_string(),
            Err(e) => format!("unreadable ({e})"),
        };
        let logged = store
            .as_ref()
            .and_then(|s| Some((s.count_tips(name).ok()?, s.count_similar(name).ok()?)))
            .map(|(tips, similar)| format!(", {tips} logged, {similar} near-duplicates"))
            .unwrap_or_default();
        let channel = if std::env::var(&stream.channel_env).is_ok() {
            "set"
        } else {
            "missing"
        };
        println!(
            "    {:<12} threshold {:.2}  {index}{logged}  [{} {channel}]",
            name, stream.similarity_threshold, stream.channel_env
        );
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
