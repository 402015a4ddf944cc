//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::repository::Database;

/// Create the content database and its schema.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    Database::open(&settings.database_path)?;
    std::fs::create_dir_all(&settings.reports_dir)?;

    println!(
        "{} Initialized siteport database at {}",
        style("✓").green(),
        settings.database_path.display()
    );
    println!("  Legacy site: {}{}", settings.legacy_base_url, settings.blog_prefix);
    Ok(())
}
