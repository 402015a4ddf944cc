//! Import command.

use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::import::{write_reports, Importer};
use crate::media::resolver::{MediaResolver, UrlResolver};
use crate::media::storage::backend_from_settings;
use crate::repository::Database;

/// Import every legacy page and post, migrating embedded media.
pub async fn cmd_import(settings: &Settings, no_media: bool) -> anyhow::Result<()> {
    let db = Database::open(&settings.database_path)?;

    let resolver: Option<Arc<dyn UrlResolver>> = if no_media {
        println!("{} Media migration disabled by --no-media", style("!").yellow());
        None
    } else {
        match backend_from_settings(&settings.media)? {
            Some(backend) => Some(Arc::new(MediaResolver::new(
                backend,
                db.media(),
                settings.media.s3_key_prefix.clone(),
            )?)),
            None => {
                println!(
                    "{} MEDIA_MODE=none, importing with original media URLs",
                    style("!").yellow()
                );
                None
            }
        }
    };

    let importer = Importer::new(settings, db, resolver)?;
    let (summary, media_map) = importer.import_all().await?;
    write_reports(&settings.reports_dir, &summary, &media_map)?;

    println!(
        "{} Imported {} pages and {} posts",
        style("✓").green(),
        summary.pages_fetched,
        summary.posts_fetched
    );
    println!(
        "  created: {}  updated: {}  skipped: {}  failed: {}",
        summary.created, summary.updated, summary.skipped, summary.failed
    );
    println!(
        "  media mapped: {}  body classes missing: {}",
        summary.media_mapped, summary.body_class_missing
    );

    if summary.failed > 0 {
        anyhow::bail!("{} items failed to import", summary.failed);
    }
    Ok(())
}
