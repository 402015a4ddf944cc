//! Discover command.

use console::style;

use crate::config::{DiscoveryMode, Settings};
use crate::discovery;

/// Discover legacy URLs and persist the payload for the parity runner.
pub async fn cmd_discover(
    settings: &Settings,
    mode: Option<DiscoveryMode>,
    no_validate: bool,
) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    if let Some(mode) = mode {
        settings.discovery.mode = mode;
    }
    if no_validate {
        settings.discovery.validate = false;
    }

    let payload = discovery::run(&settings).await?;

    println!(
        "{} Discovered {} URLs via {} -> {}",
        style("✓").green(),
        payload.urls.len(),
        payload.discovery.mode,
        settings.discovery.out_file.display()
    );
    if let Some(validation) = &payload.validation {
        println!(
            "  validated: {} ok, {} unreachable of {}",
            validation.ok, validation.non_ok, validation.total
        );
    }
    Ok(())
}
