//! List recordings command handler

use crate::config::Config;
use crate::state::SharedState;

pub async fn cmd_list_records(config: Config, stream: &str) -> anyhow::Result<()> {
    let state = SharedState::new(config)?;
    let records = state.records.list_records(stream).await?;

    if records.is_empty() {
        println!("No recordings stored for '{stream}'.");
        return Ok(());
    }

    println!("Recordings of {} ({} total)", stream, records.len());
    println!("{:-<70}", "");

    for record in records {
        let when = record.recorded_at.as_deref().unwrap_or("unknown time");
        println!("• {} [{}]", record.file_name, format_size(record.file_size));
        println!("  Recorded: {} | Player: {}", when, record.player_url);
    }

    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
