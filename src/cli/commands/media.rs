//! Media management commands: prune, reset, report.

use console::style;

use crate::config::{parse_bytes, Settings};
use crate::media::prune::{prune, PruneMode};
use crate::media::storage::backend_from_settings;
use crate::repository::Database;

fn require_backend(
    settings: &Settings,
) -> anyhow::Result<std::sync::Arc<dyn crate::media::StorageBackend>> {
    backend_from_settings(&settings.media)?
        .ok_or_else(|| anyhow::anyhow!("MEDIA_MODE=none; configure a storage backend first"))
}

/// Delete assets largest-first until the target bytes are freed.
pub async fn cmd_prune(
    settings: &Settings,
    target: Option<&str>,
    mode: Option<PruneMode>,
) -> anyhow::Result<()> {
    let backend = require_backend(settings)?;
    let db = Database::open(&settings.database_path)?;

    let target_bytes = match target {
        Some(raw) => parse_bytes(raw),
        None => settings.prune.target_free_bytes,
    };
    let mode = mode
        .or_else(|| PruneMode::from_str(&settings.prune.mode))
        .unwrap_or_default();

    let summary = prune(&db.media(), backend, target_bytes, mode).await?;
    println!(
        "{} Pruned {} assets, freed {} bytes ({} failed)",
        style("✓").green(),
        summary.deleted,
        summary.freed_bytes,
        summary.failed
    );
    Ok(())
}

/// Drop every asset record for the configured provider. Remote objects are
/// left in place; the next import re-records them through the existence
/// pre-flight.
pub async fn cmd_reset(settings: &Settings, confirm: bool) -> anyhow::Result<()> {
    if !confirm {
        anyhow::bail!("media reset requires --confirm");
    }
    let backend = require_backend(settings)?;
    let db = Database::open(&settings.database_path)?;
    let removed = db.media().delete_by_provider(backend.provider()).await?;
    println!(
        "{} Removed {} asset records for provider {}",
        style("✓").green(),
        removed,
        backend.provider()
    );
    Ok(())
}

/// Summarize stored assets.
pub async fn cmd_report(settings: &Settings) -> anyhow::Result<()> {
    let backend = require_backend(settings)?;
    let db = Database::open(&settings.database_path)?;
    let assets = db.media().list_by_provider(backend.provider()).await?;

    let total_bytes: i64 = assets.iter().filter_map(|a| a.bytes).sum();
    let videos = assets.iter().filter(|a| a.is_video()).count();
    let unknown = assets.iter().filter(|a| a.bytes.is_none()).count();

    println!(
        "{} {} assets on {} ({} bytes tracked, {} videos, {} with unknown size)",
        style("✓").green(),
        assets.len(),
        backend.provider(),
        total_bytes,
        videos,
        unknown
    );
    for asset in assets.iter().take(20) {
        println!(
            "  {:>12}  {}",
            asset
                .bytes
                .map(|b| b.to_string())
                .unwrap_or_else(|| "?".to_string()),
            asset.key
        );
    }
    if assets.len() > 20 {
        println!("  ... and {} more", assets.len() - 20);
    }
    Ok(())
}
