//! Silo recovery tool
//!
//! Loads a silo and replays every rename or move left unfinished in its
//! intent journal, e.g. after the app was killed mid-rename.
//!
//! # Usage
//!
//! ```bash
//! # Recover the silo at $MDSILO_ROOT (default: ~/mdsilo)
//! cargo run --bin silo-recover
//!
//! # More detail
//! RUST_LOG=mdsilo_core=debug cargo run --bin silo-recover
//! ```

use anyhow::{anyhow, Context};
use mdsilo_core::{LocalFileSystem, NoteService, SiloConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SiloConfig::from_env().map_err(|e| anyhow!(e))?;
    let fs = LocalFileSystem::with_layout(config.data_dir.clone(), config.snapshot_file.clone());
    let root = config.root_dir.clone();
    tracing::debug!(
        "Opening silo {} (snapshot {}, journal {})",
        root,
        config.snapshot_path(),
        config.journal_path()
    );

    let service = NoteService::open(config, Arc::new(fs))
        .await
        .with_context(|| format!("Failed to open silo {}", root))?;

    let pending = service.pending_intents().await;
    if pending.is_empty() {
        tracing::info!("Nothing to recover in {}", root);
        return Ok(());
    }

    tracing::info!("Replaying {} pending intents", pending.len());
    let reports = service.resume_pending().await?;
    for report in &reports {
        tracing::info!(
            "{} {} -> {} ({} notes rewritten)",
            report.kind,
            report.old_id,
            report.new_id,
            report.rewritten.len()
        );
    }

    Ok(())
}
