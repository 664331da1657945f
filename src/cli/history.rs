// src/cli/history.rs — Recently accepted tips

use crate::infra::config::Config;
use crate::infra::paths;
use crate::memory::store::Store;
use crate::util::truncate_str;

use super::send::resolve;

pub async fn show_history(config: &Config, name: &str, limit: u32) -> anyhow::Result<()> {
    resolve(config, name)?;
    let db_path = paths::db_path();
    if !db_path.exists() {
        println!("No tips logged yet.");
        return Ok(());
    }

    let store = Store::open(&db_path)?;
    let tips = store.recent_tips(name, limit)?;
    if tips.is_empty() {
        println!("No tips logged for '{name}'.");
        return Ok(());
    }

    for tip in tips {
        let id = tip
            .index_id
            .map(|i| format!("#{i}"))
            .unwrap_or_else(|| "unchecked".into());
        let sent = if tip.delivered { "sent" } else { "not sent" };
        let first_line = tip.text.lines().next().unwrap_or_default();
        println!(
            "{}  {:<9} {:<8} {}",
            tip.created_at,
            id,
            sent,
            truncate_str(first_line, 70)
        );
    }
    Ok(())
}
