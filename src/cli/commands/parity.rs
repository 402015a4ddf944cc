//! Parity command.

use console::style;

use crate::config::Settings;
use crate::parity;

/// Run the screenshot comparison suite. Exits non-zero when any comparison
/// fails.
pub async fn cmd_parity(
    settings: &Settings,
    workers: Option<usize>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    if let Some(workers) = workers {
        settings.parity.workers = workers;
    }
    if let Some(limit) = limit {
        settings.parity.url_limit = Some(limit);
    }

    let report = parity::run(&settings).await?;
    parity::runner::write_report(&settings.reports_dir, &report)?;

    for outcome in &report.outcomes {
        if !outcome.passed {
            let detail = match (&outcome.diff_ratio, &outcome.error) {
                (Some(ratio), _) => format!("diff ratio {ratio:.5}"),
                (None, Some(error)) => error.clone(),
                (None, None) => "failed".to_string(),
            };
            println!(
                "  {} {} [{}]: {}",
                style("✗").red(),
                outcome.path,
                outcome.viewport,
                detail
            );
        }
    }

    if report.failed > 0 {
        println!(
            "{} {} of {} comparisons failed (artifacts in {})",
            style("✗").red(),
            report.failed,
            report.passed + report.failed,
            settings.parity.artifacts_dir.display()
        );
        anyhow::bail!("{} parity comparisons failed", report.failed);
    }
    println!(
        "{} All {} comparisons passed",
        style("✓").green(),
        report.passed
    );
    Ok(())
}
