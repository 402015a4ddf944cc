//! Legacy URL discovery: sitemap conventions first, breadth-first crawl as
//! fallback, optional concurrent reachability validation, persisted as a
//! point-in-time JSON payload for the parity runner.

pub mod crawl;
pub mod sitemap;
pub mod validate;

use anyhow::{Context, Result};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::{DiscoveryMode, Settings};
use crate::models::{DiscoveryPayload, DiscoveryReport};
use crate::utils::http;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no sitemap produced any URLs under {0}")]
    NoSitemap(String),
    #[error("crawl starting at {0} produced no URLs")]
    EmptyCrawl(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Path prefixes and extensions that are never content pages.
const EXCLUDED_PATH_PARTS: [&str; 3] = ["/wp-content/", "/wp-includes/", "/wp-json/"];
const EXCLUDED_EXTENSIONS: [&str; 15] = [
    ".xml", ".json", ".txt", ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg",
    ".mp4", ".mov", ".webm", ".pdf",
];

/// Normalize an absolute candidate URL into a site-relative path, or reject
/// it. Rules: same origin as `base`, under the blog prefix, not asset-like,
/// hash stripped, trailing slash added to extensionless paths to match the
/// new site's routing.
pub fn normalize_candidate(raw: &str, base: &Url, prefix: &str) -> Option<String> {
    let url = base.join(raw).ok()?;
    if url.scheme() != base.scheme() || url.host_str() != base.host_str() {
        return None;
    }
    let mut path = url.path().to_string();
    if !(path == prefix || path.starts_with(&format!("{prefix}/"))) {
        return None;
    }
    let lower = path.to_lowercase();
    if EXCLUDED_PATH_PARTS.iter().any(|p| lower.contains(p)) {
        return None;
    }
    if EXCLUDED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return None;
    }
    // Extensionless paths get the trailing-slash form.
    let last_segment = path.rsplit('/').next().unwrap_or("");
    if !path.ends_with('/') && !last_segment.contains('.') {
        path.push('/');
    }
    match url.query() {
        Some(q) => Some(format!("{path}?{q}")),
        None => Some(path),
    }
}

/// Run discovery per the configured mode and persist the payload.
pub async fn run(settings: &Settings) -> Result<DiscoveryPayload> {
    let client = http::client()?;
    let base = Url::parse(&settings.legacy_base_url).context("parsing legacy base URL")?;
    let prefix = settings.blog_prefix.as_str();

    let (report, mut urls) = match settings.discovery.mode {
        DiscoveryMode::Sitemap => sitemap_phase(&client, &base, prefix).await?,
        DiscoveryMode::Crawl => crawl_phase(&client, &base, prefix, settings).await?,
        DiscoveryMode::Auto => match sitemap_phase(&client, &base, prefix).await {
            Ok(found) => found,
            Err(DiscoveryError::NoSitemap(at)) => {
                info!(tried = at, "no usable sitemap, falling back to crawl");
                crawl_phase(&client, &base, prefix, settings).await?
            }
            Err(e) => return Err(e.into()),
        },
    };

    urls.sort();
    urls.dedup();

    let validation = if settings.discovery.validate {
        let summary = validate::validate(
            &client,
            &settings.legacy_base_url,
            &mut urls,
            settings.discovery.validate_concurrency,
        )
        .await?;
        Some(summary)
    } else {
        None
    };

    let payload = DiscoveryPayload {
        generated_at: Utc::now(),
        base_url: settings.legacy_base_url.clone(),
        blog_prefix: settings.blog_prefix.clone(),
        discovery: report,
        validation,
        urls,
    };

    let out = &settings.discovery.out_file;
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    std::fs::write(out, serde_json::to_string_pretty(&payload)?)
        .with_context(|| format!("writing {}", out.display()))?;
    info!(urls = payload.urls.len(), file = %out.display(), "discovery payload written");
    Ok(payload)
}

async fn sitemap_phase(
    client: &reqwest::Client,
    base: &Url,
    prefix: &str,
) -> Result<(DiscoveryReport, Vec<String>), DiscoveryError> {
    let (sitemap_url, raw) = sitemap::discover(client, base, prefix).await?;
    let urls: Vec<String> = raw
        .iter()
        .filter_map(|u| normalize_candidate(u, base, prefix))
        .collect();
    if urls.is_empty() {
        warn!(sitemap = sitemap_url, "sitemap parsed but no usable page URLs survived filtering");
        return Err(DiscoveryError::NoSitemap(base.to_string()));
    }
    let report = DiscoveryReport {
        mode: "sitemap".into(),
        sitemap_url: Some(sitemap_url),
        start_url: None,
        urls: urls.len(),
    };
    Ok((report, urls))
}

async fn crawl_phase(
    client: &reqwest::Client,
    base: &Url,
    prefix: &str,
    settings: &Settings,
) -> Result<(DiscoveryReport, Vec<String>), DiscoveryError> {
    let start = format!("{}{}/", settings.legacy_base_url, prefix);
    let urls = crawl::crawl(client, base, prefix, &start, settings.discovery.crawl_max).await?;
    if urls.is_empty() {
        return Err(DiscoveryError::EmptyCrawl(start));
    }
    let report = DiscoveryReport {
        mode: "crawl".into(),
        sitemap_url: None,
        start_url: Some(start),
        urls: urls.len(),
    };
    Ok((report, urls))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://legacy.example.com").unwrap()
    }

    #[test]
    fn test_normalize_keeps_prefixed_pages() {
        assert_eq!(
            normalize_candidate("https://legacy.example.com/blog/about", &base(), "/blog"),
            Some("/blog/about/".to_string())
        );
        assert_eq!(
            normalize_candidate("/blog/post/#comments", &base(), "/blog"),
            Some("/blog/post/".to_string())
        );
    }

    #[test]
    fn test_normalize_rejects_foreign_origin() {
        assert_eq!(
            normalize_candidate("https://other.example.com/blog/about/", &base(), "/blog"),
            None
        );
    }

    #[test]
    fn test_normalize_rejects_paths_outside_prefix() {
        assert_eq!(
            normalize_candidate("https://legacy.example.com/shop/", &base(), "/blog"),
            None
        );
        // "/blogging" must not pass a "/blog" prefix check.
        assert_eq!(
            normalize_candidate("https://legacy.example.com/blogging/", &base(), "/blog"),
            None
        );
    }

    #[test]
    fn test_normalize_rejects_asset_paths() {
        for asset in [
            "/blog/wp-content/uploads/photo.jpg",
            "/blog/feed.xml",
            "/blog/style.css",
            "/blog/clip.mp4",
            "/blog/paper.pdf",
            "/blog/wp-json/wp/v2/pages",
        ] {
            assert_eq!(normalize_candidate(asset, &base(), "/blog"), None, "{asset}");
        }
    }

    #[test]
    fn test_normalize_preserves_query_and_file_paths() {
        assert_eq!(
            normalize_candidate("/blog/search?q=x", &base(), "/blog"),
            Some("/blog/search/?q=x".to_string())
        );
        // Dotted final segments are kept slash-free.
        assert_eq!(
            normalize_candidate("/blog/page.html", &base(), "/blog"),
            Some("/blog/page.html".to_string())
        );
    }
}
