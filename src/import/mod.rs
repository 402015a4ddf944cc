//! WordPress REST import: fetch pages and posts, derive target paths,
//! rewrite body media references, upsert by path, and emit audit reports.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::config::Settings;
use crate::html::rewrite_uploads;
use crate::media::resolver::UrlResolver;
use crate::models::{ContentBlock, ContentStatus, ContentType, MediaMapEntry};
use crate::repository::{ContentUpsert, Database};
use crate::utils::http;

const PER_PAGE: u32 = 100;
// Runaway-pagination guard; the REST API signals the real end itself.
const MAX_PAGES: u32 = 200;

fn home_discovery_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"wp-json/wp/v2/pages/(\d+)").unwrap())
}

fn body_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)<body[^>]*class="([^"]*)""#).unwrap())
}

#[derive(Debug, Deserialize)]
struct WpRendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpSeo {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WpItem {
    id: i64,
    link: String,
    status: String,
    #[serde(default = "empty_rendered")]
    title: WpRendered,
    #[serde(default = "empty_rendered")]
    content: WpRendered,
    yoast_head_json: Option<WpSeo>,
}

fn empty_rendered() -> WpRendered {
    WpRendered {
        rendered: String::new(),
    }
}

/// Why a best-effort lookup produced nothing. Callers get the distinction
/// structurally instead of a swallowed failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skipped {
    /// The page could not be fetched.
    Fetch,
    /// Fetched fine, but the body carries no class attribute.
    NoBodyClass,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub pages_fetched: usize,
    pub posts_fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub body_class_missing: usize,
    pub media_mapped: usize,
}

pub struct Importer {
    client: reqwest::Client,
    db: Database,
    resolver: Option<Arc<dyn UrlResolver>>,
    legacy_base: String,
    blog_prefix: String,
    import_body_class: bool,
}

impl Importer {
    pub fn new(
        settings: &Settings,
        db: Database,
        resolver: Option<Arc<dyn UrlResolver>>,
    ) -> Result<Self> {
        Ok(Self {
            client: http::client()?,
            db,
            resolver,
            legacy_base: settings.legacy_base_url.clone(),
            blog_prefix: settings.blog_prefix.clone(),
            import_body_class: settings.import_body_class,
        })
    }

    fn wp_base(&self) -> String {
        format!("{}{}", self.legacy_base, self.blog_prefix)
    }

    /// Fetch a whole REST collection. An empty page or HTTP 400 ends the
    /// collection.
    async fn fetch_collection(&self, kind: &str) -> Result<Vec<WpItem>> {
        let mut items = Vec::new();
        for page in 1..MAX_PAGES {
            let url = format!(
                "{}/wp-json/wp/v2/{kind}?per_page={PER_PAGE}&page={page}",
                self.wp_base()
            );
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("fetching {url}"))?;
            if response.status() == reqwest::StatusCode::BAD_REQUEST {
                break;
            }
            if !response.status().is_success() {
                anyhow::bail!("{url} returned {}", response.status());
            }
            let batch: Vec<WpItem> = response
                .json()
                .await
                .with_context(|| format!("decoding {url}"))?;
            if batch.is_empty() {
                break;
            }
            items.extend(batch);
        }
        Ok(items)
    }

    /// The WordPress page designated as the site home, found through the
    /// REST discovery link embedded in the legacy root HTML.
    async fn detect_home_page_id(&self) -> Result<Option<i64>> {
        let root = format!("{}/", self.wp_base());
        let Some(html) = http::fetch_text(&self.client, &root).await? else {
            return Ok(None);
        };
        Ok(home_discovery_re()
            .captures(&html)
            .and_then(|c| c[1].parse().ok()))
    }

    /// Target path for an item: its link with the blog prefix stripped.
    /// The home page maps to the empty path. `None` means the link lives
    /// outside the blog prefix and the item is skipped.
    fn derive_path(&self, item: &WpItem, home_id: Option<i64>) -> Option<String> {
        if Some(item.id) == home_id {
            return Some(String::new());
        }
        let link = Url::parse(&item.link).ok()?;
        let path = link.path();
        let rest = if path == self.blog_prefix {
            ""
        } else {
            path.strip_prefix(&format!("{}/", self.blog_prefix))?
        };
        Some(rest.trim_matches('/').to_string())
    }

    /// Best-effort copy of the legacy page's body class attribute.
    async fn fetch_body_class(&self, link: &str) -> std::result::Result<String, Skipped> {
        let html = match http::fetch_text(&self.client, link).await {
            Ok(Some(html)) => html,
            _ => return Err(Skipped::Fetch),
        };
        body_class_re()
            .captures(&html)
            .map(|c| c[1].to_string())
            .ok_or(Skipped::NoBodyClass)
    }

    async fn import_item(
        &self,
        item: &WpItem,
        content_type: ContentType,
        home_id: Option<i64>,
        summary: &mut ImportSummary,
        media_map: &mut BTreeMap<String, (String, Vec<String>)>,
    ) -> Result<()> {
        let Some(path) = self.derive_path(item, home_id) else {
            warn!(link = item.link, "link outside the blog prefix, skipping");
            summary.skipped += 1;
            return Ok(());
        };

        // Absolute legacy blog URLs become prefix-relative so internal
        // links survive the origin change.
        let mut html = item
            .content
            .rendered
            .replace(&self.wp_base(), &self.blog_prefix);

        if let Some(resolver) = &self.resolver {
            let outcome = rewrite_uploads(
                &html,
                &self.legacy_base,
                &self.blog_prefix,
                resolver.as_ref(),
            )
            .await;
            html = outcome.html;
            for (source, resolved) in outcome.mapped {
                let entry = media_map
                    .entry(source)
                    .or_insert_with(|| (resolved, Vec::new()));
                if !entry.1.contains(&path) {
                    entry.1.push(path.clone());
                }
            }
        }

        let legacy_body_class = if self.import_body_class {
            match self.fetch_body_class(&item.link).await {
                Ok(class) => Some(class),
                Err(reason) => {
                    summary.body_class_missing += 1;
                    warn!(link = item.link, ?reason, "body class unavailable");
                    None
                }
            }
        } else {
            None
        };

        let status = if item.status == "publish" {
            ContentStatus::Published
        } else {
            ContentStatus::Draft
        };

        let upsert = ContentUpsert {
            content_type,
            path,
            title: item.title.rendered.clone(),
            status,
            blocks: vec![ContentBlock::Html { html }],
            legacy_wp_id: Some(item.id),
            legacy_body_class,
            seo_title: item.yoast_head_json.as_ref().and_then(|s| s.title.clone()),
            seo_desc: item
                .yoast_head_json
                .as_ref()
                .and_then(|s| s.description.clone()),
        };
        let (_, created) = self.db.content().upsert(upsert).await?;
        if created {
            summary.created += 1;
        } else {
            summary.updated += 1;
        }
        Ok(())
    }

    /// Import every page and post. Per-item failures are counted, never
    /// fatal.
    pub async fn import_all(&self) -> Result<(ImportSummary, Vec<MediaMapEntry>)> {
        let mut summary = ImportSummary::default();
        let mut media_map = BTreeMap::new();

        let home_id = self.detect_home_page_id().await?;
        info!(?home_id, "detected home page");

        let pages = self.fetch_collection("pages").await?;
        let posts = self.fetch_collection("posts").await?;
        summary.pages_fetched = pages.len();
        summary.posts_fetched = posts.len();

        let progress = ProgressBar::new((pages.len() + posts.len()) as u64);
        progress.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for (items, content_type) in [(pages, ContentType::Page), (posts, ContentType::Post)] {
            for item in &items {
                if let Err(e) = self
                    .import_item(item, content_type, home_id, &mut summary, &mut media_map)
                    .await
                {
                    warn!(link = item.link, error = %e, "import failed for item");
                    summary.failed += 1;
                }
                progress.inc(1);
            }
        }
        progress.finish_and_clear();

        summary.media_mapped = media_map.len();
        let entries = media_map
            .into_iter()
            .map(|(source_url, (resolved_url, used_by))| MediaMapEntry {
                source_url,
                resolved_url,
                used_by,
            })
            .collect();
        Ok((summary, entries))
    }
}

/// Write the import summary and media map reports.
pub fn write_reports(
    reports_dir: &std::path::Path,
    summary: &ImportSummary,
    media_map: &[MediaMapEntry],
) -> Result<()> {
    std::fs::create_dir_all(reports_dir)
        .with_context(|| format!("creating {}", reports_dir.display()))?;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Report<'a> {
        generated_at: chrono::DateTime<Utc>,
        #[serde(flatten)]
        summary: &'a ImportSummary,
    }
    let summary_path = reports_dir.join("import-summary.json");
    std::fs::write(
        &summary_path,
        serde_json::to_string_pretty(&Report {
            generated_at: Utc::now(),
            summary,
        })?,
    )
    .with_context(|| format!("writing {}", summary_path.display()))?;

    let map_path = reports_dir.join("media-map.json");
    std::fs::write(&map_path, serde_json::to_string_pretty(media_map)?)
        .with_context(|| format!("writing {}", map_path.display()))?;
    info!(
        summary = %summary_path.display(),
        media_map = %map_path.display(),
        "reports written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;

    fn importer() -> Importer {
        let settings = test_settings();
        Importer::new(&settings, Database::open_in_memory().unwrap(), None).unwrap()
    }

    fn test_settings() -> Settings {
        // Only base/prefix matter for the pure helpers under test.
        let mut settings = Settings::from_env().unwrap();
        settings.legacy_base_url = "https://legacy.example.com".into();
        settings.blog_prefix = "/blog".into();
        settings
    }

    fn item(id: i64, link: &str, status: &str) -> WpItem {
        WpItem {
            id,
            link: link.to_string(),
            status: status.to_string(),
            title: WpRendered {
                rendered: "About".into(),
            },
            content: WpRendered {
                rendered: "<p>hello</p>".into(),
            },
            yoast_head_json: None,
        }
    }

    #[test]
    fn test_derive_path_strips_blog_prefix() {
        let imp = importer();
        let about = item(2, "https://legacy.example.com/blog/about/", "publish");
        assert_eq!(imp.derive_path(&about, None), Some("about".to_string()));
    }

    #[test]
    fn test_derive_path_home_special_case() {
        let imp = importer();
        let home = item(7, "https://legacy.example.com/blog/welcome/", "publish");
        assert_eq!(imp.derive_path(&home, Some(7)), Some(String::new()));
    }

    #[test]
    fn test_derive_path_rejects_links_outside_prefix() {
        let imp = importer();
        let outside = item(3, "https://legacy.example.com/shop/cart/", "publish");
        assert_eq!(imp.derive_path(&outside, None), None);
    }

    #[test]
    fn test_derive_path_blog_root_without_home_id() {
        let imp = importer();
        let root = item(4, "https://legacy.example.com/blog", "publish");
        assert_eq!(imp.derive_path(&root, None), Some(String::new()));
    }

    #[test]
    fn test_home_discovery_regex() {
        let html = r#"<link rel="alternate" href="https://x/wp-json/wp/v2/pages/17">"#;
        let id: i64 = home_discovery_re().captures(html).unwrap()[1].parse().unwrap();
        assert_eq!(id, 17);
    }

    #[test]
    fn test_body_class_regex() {
        let html = r#"<html><body id="top" class="home page-id-17 wp-theme">x</body></html>"#;
        assert_eq!(
            &body_class_re().captures(html).unwrap()[1],
            "home page-id-17 wp-theme"
        );
        assert!(body_class_re().captures("<body>x</body>").is_none());
    }
}
