//! Concurrent reachability validation of discovered URLs.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::models::ValidationSummary;

/// Fetch every candidate through a bounded worker pool and retain only
/// those answering with a success status. `urls` holds site-relative paths;
/// order is preserved for the survivors.
pub async fn validate(
    client: &reqwest::Client,
    base_url: &str,
    urls: &mut Vec<String>,
    concurrency: usize,
) -> Result<ValidationSummary> {
    let total = urls.len();
    let checks = stream::iter(urls.iter().cloned().enumerate())
        .map(|(index, path)| {
            let client = client.clone();
            let url = format!("{base_url}{path}");
            async move {
                let ok = match client.get(&url).send().await {
                    Ok(response) => response.status().is_success(),
                    Err(e) => {
                        warn!(url, error = %e, "validation fetch failed");
                        false
                    }
                };
                (index, ok)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut keep = vec![false; total];
    for (index, ok) in checks {
        keep[index] = ok;
    }
    let mut index = 0;
    urls.retain(|_| {
        let kept = keep[index];
        index += 1;
        kept
    });

    let ok = urls.len();
    let summary = ValidationSummary {
        total,
        ok,
        non_ok: total - ok,
    };
    info!(total, ok, non_ok = summary.non_ok, "validation complete");
    Ok(summary)
}
