//! One-shot retention pass

use crate::config::Config;
use crate::state::SharedState;

pub async fn cmd_sweep(config: Config) -> anyhow::Result<()> {
    let state = SharedState::new(config)?;
    let report = state.retention.enforce().await?;

    println!(
        "Scanned {} recordings ({} bytes incl. covers)",
        report.scanned, report.total_bytes
    );

    if report.evicted.is_empty() {
        println!("Nothing to evict.");
    } else {
        println!("Evicted {} ({} bytes freed):", report.evicted.len(), report.freed_bytes);
        for name in &report.evicted {
            println!("  - {name}");
        }
    }

    if !report.failed.is_empty() {
        println!("Failed to evict {}:", report.failed.len());
        for name in &report.failed {
            println!("  ! {name}");
        }
    }

    Ok(())
}
