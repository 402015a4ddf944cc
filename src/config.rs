//! Environment-driven configuration for siteport.
//!
//! All knobs come from the process environment (optionally seeded from a
//! `.env` file in `main`). Configuration is immutable once loaded; callers
//! go through [`settings`], which loads exactly once for the process
//! lifetime.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use url::Url;

/// Default maximum diff ratio accepted by the parity runner.
pub const DEFAULT_MAX_DIFF_PIXEL_RATIO: f64 = 0.005;

/// Default perceptual threshold for the per-pixel comparison.
pub const DEFAULT_PIXEL_THRESHOLD: f32 = 0.1;

/// Which object storage backend media is migrated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMode {
    /// Single-shot PUT blob store.
    Blob,
    /// Multipart S3-style uploads.
    S3,
    /// Media migration disabled; HTML is imported with its original URLs.
    None,
}

impl MediaMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(Self::Blob),
            "s3" => Some(Self::S3),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// URL discovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DiscoveryMode {
    /// Sitemap conventions only.
    Sitemap,
    /// Breadth-first same-origin crawl only.
    Crawl,
    /// Sitemap first, crawl as fallback.
    #[default]
    Auto,
}

/// A named browser viewport for parity screenshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewport {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Blob / S3 storage configuration.
#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub mode: MediaMode,
    pub blob_endpoint: Option<String>,
    pub blob_token: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_key_prefix: String,
    pub public_base_url: Option<String>,
}

/// URL discovery configuration.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub mode: DiscoveryMode,
    pub validate: bool,
    pub validate_concurrency: usize,
    pub crawl_max: usize,
    pub out_file: PathBuf,
}

/// Parity runner configuration.
#[derive(Debug, Clone)]
pub struct ParitySettings {
    pub new_base_url: String,
    pub urls_file: PathBuf,
    pub viewports: Vec<Viewport>,
    pub max_diff_pixel_ratio: f64,
    pub pixel_threshold: f32,
    pub settle_ms: u64,
    pub mask_media: bool,
    pub workers: usize,
    pub url_allow: Option<String>,
    pub url_deny: Option<String>,
    pub url_limit: Option<usize>,
    pub artifacts_dir: PathBuf,
}

/// Blob pruner configuration.
#[derive(Debug, Clone)]
pub struct PruneSettings {
    pub target_free_bytes: u64,
    pub mode: String,
}

/// Process-wide settings, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Legacy site origin, no path, no trailing slash.
    pub legacy_base_url: String,
    /// Blog path prefix with leading slash, no trailing slash (e.g. "/blog").
    pub blog_prefix: String,
    pub database_path: PathBuf,
    pub reports_dir: PathBuf,
    pub import_body_class: bool,
    pub media: MediaSettings,
    pub discovery: DiscoverySettings,
    pub parity: ParitySettings,
    pub prune: PruneSettings,
}

impl Settings {
    /// Absolute base URL of the legacy blog (origin + prefix).
    pub fn wp_base_url(&self) -> String {
        format!("{}{}", self.legacy_base_url, self.blog_prefix)
    }

    /// Load settings from the environment.
    pub fn from_env() -> Result<Self> {
        let legacy_base_url = normalize_base_url(
            &env_string("LEGACY_BASE_URL").unwrap_or_else(|| "https://example.com".to_string()),
        )?;
        let blog_prefix =
            normalize_prefix(&env_string("LEGACY_BLOG_PREFIX").unwrap_or_else(|| "/blog".into()));

        let media = MediaSettings {
            mode: match env_string("MEDIA_MODE").as_deref() {
                Some(raw) => match MediaMode::from_str(raw) {
                    Some(m) => m,
                    None => bail!("MEDIA_MODE must be one of: blob, s3, none (got {raw:?})"),
                },
                None => MediaMode::None,
            },
            blob_endpoint: env_string("BLOB_ENDPOINT").map(|s| s.trim_end_matches('/').to_string()),
            blob_token: env_string("BLOB_READ_WRITE_TOKEN"),
            s3_bucket: env_string("S3_BUCKET"),
            s3_region: env_string("AWS_REGION"),
            s3_key_prefix: env_string("S3_KEY_PREFIX")
                .map(|s| s.trim_matches('/').to_string())
                .unwrap_or_else(|| "blog".to_string()),
            public_base_url: env_string("MEDIA_PUBLIC_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string()),
        };

        let discovery = DiscoverySettings {
            mode: match env_string("URL_DISCOVERY_MODE").as_deref() {
                Some("sitemap") => DiscoveryMode::Sitemap,
                Some("crawl") => DiscoveryMode::Crawl,
                Some("auto") | None => DiscoveryMode::Auto,
                Some(other) => bail!("URL_DISCOVERY_MODE must be sitemap, crawl or auto (got {other:?})"),
            },
            validate: env_bool("URL_VALIDATE", true),
            validate_concurrency: env_usize("URL_VALIDATE_CONCURRENCY", 6),
            crawl_max: env_usize("URL_CRAWL_MAX", 4000),
            out_file: env_string("URLS_OUT_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("reports/legacy-urls.json")),
        };

        let parity = ParitySettings {
            new_base_url: normalize_base_url(
                &env_string("NEW_BASE_URL").unwrap_or_else(|| "http://127.0.0.1:3100".into()),
            )?,
            urls_file: env_string("PARITY_URLS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| discovery.out_file.clone()),
            viewports: parse_viewports(
                &env_string("PARITY_VIEWPORTS")
                    .unwrap_or_else(|| "desktop=1366x900,tablet=768x1024,mobile=390x844".into()),
            )?,
            max_diff_pixel_ratio: env_f64("PARITY_MAX_DIFF_PIXEL_RATIO", DEFAULT_MAX_DIFF_PIXEL_RATIO),
            pixel_threshold: env_f64("PARITY_PIXELMATCH_THRESHOLD", DEFAULT_PIXEL_THRESHOLD as f64)
                as f32,
            settle_ms: env_u64("PARITY_SETTLE_MS", 250),
            mask_media: env_bool("PARITY_MASK_MEDIA", true),
            workers: env_usize("PARITY_WORKERS", 4),
            url_allow: env_string("PARITY_URL_ALLOW"),
            url_deny: env_string("PARITY_URL_DENY"),
            url_limit: env_string("PARITY_URL_LIMIT").and_then(|s| s.parse().ok()),
            artifacts_dir: env_string("PARITY_ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("reports/parity-artifacts")),
        };

        let prune = PruneSettings {
            target_free_bytes: parse_bytes(
                &env_string("PRUNE_TARGET_FREE").unwrap_or_else(|| "64mb".into()),
            ),
            mode: env_string("PRUNE_MODE").unwrap_or_else(|| "videos".into()),
        };

        Ok(Self {
            legacy_base_url,
            blog_prefix,
            database_path: env_string("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("siteport.db")),
            reports_dir: env_string("REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("reports")),
            import_body_class: env_bool("IMPORT_BODY_CLASS", true),
            media,
            discovery,
            parity,
            prune,
        })
    }
}

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Process-wide settings accessor. Loads from the environment on first
/// call; later calls return the same instance.
pub fn settings() -> Result<&'static Settings> {
    if let Some(s) = SETTINGS.get() {
        return Ok(s);
    }
    let loaded = Settings::from_env()?;
    Ok(SETTINGS.get_or_init(|| loaded))
}

fn env_string(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) => {
            let v = v.trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        }
        Err(_) => None,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_string(key).as_deref() {
        Some("0") | Some("false") | Some("no") => false,
        Some(_) => true,
        None => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env_string(key)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_string(key)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_string(key)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Reduce a URL to its origin: scheme + host (+ port), no path/query/hash.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw).with_context(|| format!("invalid base URL: {raw}"))?;
    url.set_path("");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string().trim_end_matches('/').to_string())
}

/// Normalize a path prefix to leading-slash, no-trailing-slash form.
pub fn normalize_prefix(raw: &str) -> String {
    let p = raw.trim();
    if p.is_empty() {
        return "/blog".to_string();
    }
    let mut p = if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{p}")
    };
    while p.ends_with('/') {
        p.pop();
    }
    p
}

/// Parse a size like "64mb", "1.5gb" or a plain byte count.
pub fn parse_bytes(input: &str) -> u64 {
    let raw = input.trim().to_lowercase();
    if raw.is_empty() {
        return 0;
    }
    let (number, unit) = match raw.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) => raw.split_at(idx),
        None => (raw.as_str(), ""),
    };
    let n: f64 = match number.trim().parse() {
        Ok(n) => n,
        Err(_) => return 0,
    };
    let factor = match unit.trim() {
        "kb" | "k" => 1024.0,
        "mb" | "m" => 1024.0 * 1024.0,
        "gb" | "g" => 1024.0 * 1024.0 * 1024.0,
        "" | "b" => 1.0,
        _ => return 0,
    };
    (n * factor).round() as u64
}

/// Parse "name=WxH,name=WxH" viewport lists.
pub fn parse_viewports(raw: &str) -> Result<Vec<Viewport>> {
    let mut out = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, dims) = match part.split_once('=') {
            Some((n, d)) => (n.trim().to_string(), d.trim()),
            None => (format!("viewport{}", out.len() + 1), part),
        };
        let (w, h) = dims
            .split_once('x')
            .with_context(|| format!("viewport {part:?} must look like name=WxH"))?;
        out.push(Viewport {
            name,
            width: w.trim().parse().with_context(|| format!("bad viewport width in {part:?}"))?,
            height: h
                .trim()
                .parse()
                .with_context(|| format!("bad viewport height in {part:?}"))?,
        });
    }
    if out.is_empty() {
        bail!("no viewports configured");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bytes_units() {
        assert_eq!(parse_bytes("64mb"), 64 * 1024 * 1024);
        assert_eq!(parse_bytes("1.5kb"), 1536);
        assert_eq!(parse_bytes("2gb"), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_bytes("12345"), 12345);
        assert_eq!(parse_bytes(""), 0);
        assert_eq!(parse_bytes("nonsense"), 0);
    }

    #[test]
    fn test_normalize_base_url_strips_path() {
        assert_eq!(
            normalize_base_url("https://example.com/blog/?x=1#frag").unwrap(),
            "https://example.com"
        );
        assert_eq!(
            normalize_base_url("http://127.0.0.1:3100").unwrap(),
            "http://127.0.0.1:3100"
        );
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("blog"), "/blog");
        assert_eq!(normalize_prefix("/blog/"), "/blog");
        assert_eq!(normalize_prefix(""), "/blog");
    }

    #[test]
    fn test_parse_viewports() {
        let vps = parse_viewports("desktop=1366x900, mobile=390x844").unwrap();
        assert_eq!(vps.len(), 2);
        assert_eq!(vps[0].name, "desktop");
        assert_eq!(vps[0].width, 1366);
        assert_eq!(vps[1].height, 844);
    }

    #[test]
    fn test_parse_viewports_unnamed() {
        let vps = parse_viewports("800x600").unwrap();
        assert_eq!(vps[0].name, "viewport1");
        assert_eq!(vps[0].width, 800);
    }

    #[test]
    fn test_parse_viewports_rejects_garbage() {
        assert!(parse_viewports("desktop=wide").is_err());
        assert!(parse_viewports("").is_err());
    }
}
