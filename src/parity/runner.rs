//! The parity runner: renders each discovered URL on both origins at every
//! configured viewport, stabilizes rendering, screenshots a consistent root
//! region, and compares pixel-wise. Comparisons are independent; one failing
//! URL never blocks the rest of the pool.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::Settings;
use crate::models::DiscoveryPayload;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonOutcome {
    pub path: String,
    pub viewport: String,
    pub diff_ratio: Option<f64>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParityReport {
    pub passed: usize,
    pub failed: usize,
    pub outcomes: Vec<ComparisonOutcome>,
}

/// Load the discovery payload and apply allow/deny/limit filtering.
pub fn load_urls(settings: &Settings) -> Result<Vec<String>> {
    let parity = &settings.parity;
    let raw = std::fs::read_to_string(&parity.urls_file)
        .with_context(|| format!("reading {}", parity.urls_file.display()))?;
    let payload: DiscoveryPayload = serde_json::from_str(&raw)
        .with_context(|| format!("decoding {}", parity.urls_file.display()))?;

    let allow = parity
        .url_allow
        .as_deref()
        .map(regex::Regex::new)
        .transpose()
        .context("PARITY_URL_ALLOW is not a valid pattern")?;
    let deny = parity
        .url_deny
        .as_deref()
        .map(regex::Regex::new)
        .transpose()
        .context("PARITY_URL_DENY is not a valid pattern")?;

    let mut urls: Vec<String> = payload
        .urls
        .into_iter()
        .filter(|u| allow.as_ref().map_or(true, |re| re.is_match(u)))
        .filter(|u| deny.as_ref().map_or(true, |re| !re.is_match(u)))
        .collect();
    if let Some(limit) = parity.url_limit {
        urls.truncate(limit);
    }
    Ok(urls)
}

/// Filesystem-safe artifact slug for a URL path.
fn slug(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_dash = true;
    for c in path.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "home".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn write_report(reports_dir: &Path, report: &ParityReport) -> Result<()> {
    std::fs::create_dir_all(reports_dir)
        .with_context(|| format!("creating {}", reports_dir.display()))?;
    let path = reports_dir.join("parity-report.json");
    std::fs::write(&path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(feature = "browser")]
mod browser {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{anyhow, Context, Result};
    use indicatif::{ProgressBar, ProgressStyle};
    use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
    use chromiumoxide::cdp::browser_protocol::network::{
        EnableParams as NetworkEnableParams, SetBlockedUrLsParams,
    };
    use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
    use chromiumoxide::cdp::browser_protocol::target::{
        CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
    };
    use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
    use chromiumoxide::page::ScreenshotParams;
    use chromiumoxide::{Browser, BrowserConfig};
    use futures::StreamExt;
    use image::RgbaImage;
    use tokio::time::timeout;
    use tracing::{info, warn};

    use crate::config::{Settings, Viewport};
    use crate::parity::compare::compare;

    use super::{load_urls, slug, ComparisonOutcome, ParityReport};

    const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);

    /// Resource patterns blocked in mask mode.
    const MASK_PATTERNS: [&str; 10] = [
        "*.jpg*", "*.jpeg*", "*.png*", "*.gif*", "*.webp*", "*.avif*", "*.svg*", "*.mp4*",
        "*.webm*", "*.mov*",
    ];

    const STABILIZE_JS: &str = r#"
(async () => {
  const style = document.createElement('style');
  style.textContent = '*,*::before,*::after{animation:none !important;' +
    'transition:none !important;caret-color:transparent !important;}' +
    'html{scroll-behavior:auto !important;}' +
    (__MASK__ ? 'img,video,iframe{visibility:hidden !important;}' : '');
  document.head.appendChild(style);
  if (document.fonts && document.fonts.ready) {
    try { await document.fonts.ready; } catch (e) {}
  }
  if (!__MASK__) {
    const deadline = Date.now() + 5000;
    const images = Array.from(document.images);
    while (Date.now() < deadline && images.some((i) => !i.complete)) {
      await new Promise((r) => setTimeout(r, 100));
    }
  }
  return true;
})()
"#;

    const CHROME_PATHS: &[&str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    fn find_chrome() -> Result<std::path::PathBuf> {
        for path in CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                return Ok(p.to_path_buf());
            }
        }
        for cmd in &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }
        Err(anyhow!("Chrome/Chromium not found; install it or run with --features browser disabled"))
    }

    async fn launch() -> Result<Arc<Browser>> {
        let config = BrowserConfig::builder()
            .chrome_executable(find_chrome()?)
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .build()
            .map_err(|e| anyhow!("building browser config: {e}"))?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launching browser")?;
        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });
        Ok(Arc::new(browser))
    }

    /// Render one URL in a throwaway incognito context and screenshot the
    /// root region. Each capture gets its own context so cache and cookies
    /// from one origin never leak into the other's load.
    async fn capture(
        browser: &Browser,
        url: &str,
        viewport: &Viewport,
        mask_media: bool,
        settle_ms: u64,
    ) -> Result<(Vec<u8>, RgbaImage)> {
        let context_id = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .context("creating browser context")?
            .result
            .browser_context_id;
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(|e| anyhow!("building target params: {e}"))?;
        let page = browser.new_page(target).await?;
        let result = capture_on(&page, url, viewport, mask_media, settle_ms).await;
        // The page and its context must go away even when capture fails.
        let _ = page.close().await;
        let _ = browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await;
        result
    }

    async fn capture_on(
        page: &chromiumoxide::Page,
        url: &str,
        viewport: &Viewport,
        mask_media: bool,
        settle_ms: u64,
    ) -> Result<(Vec<u8>, RgbaImage)> {
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        ))
        .await?;

        if mask_media {
            page.execute(NetworkEnableParams::default()).await?;
            page.execute(SetBlockedUrLsParams::new(
                MASK_PATTERNS.iter().map(|p| p.to_string()).collect(),
            ))
            .await?;
        }

        timeout(NAVIGATION_TIMEOUT, page.goto(url))
            .await
            .map_err(|_| anyhow!("navigation to {url} timed out"))??;
        let _ = timeout(NAVIGATION_TIMEOUT, page.wait_for_navigation()).await;

        let stabilize = STABILIZE_JS.replace("__MASK__", if mask_media { "true" } else { "false" });
        page.evaluate(
            EvaluateParams::builder()
                .expression(stabilize)
                .await_promise(true)
                .build()
                .map_err(|e| anyhow!("building stabilize script: {e}"))?,
        )
        .await?;
        tokio::time::sleep(Duration::from_millis(settle_ms)).await;

        // Prefer the layout container so chrome like cookie bars outside it
        // cannot skew the comparison; fall back to the full page.
        let png = match page.find_element("#page").await {
            Ok(element) => element.screenshot(CaptureScreenshotFormat::Png).await?,
            Err(_) => {
                page.screenshot(
                    ScreenshotParams::builder()
                        .format(CaptureScreenshotFormat::Png)
                        .full_page(true)
                        .build(),
                )
                .await?
            }
        };

        let decoded = image::load_from_memory(&png)
            .with_context(|| format!("decoding screenshot of {url}"))?
            .to_rgba8();
        Ok((png, decoded))
    }

    struct Job {
        path: String,
        viewport: Viewport,
    }

    async fn run_job(browser: &Browser, settings: &Settings, job: &Job) -> ComparisonOutcome {
        let parity = &settings.parity;
        let legacy_url = format!("{}{}", settings.legacy_base_url, job.path);
        let new_url = format!("{}{}", parity.new_base_url, job.path);

        let result = async {
            let (legacy_png, legacy) = capture(
                browser,
                &legacy_url,
                &job.viewport,
                parity.mask_media,
                parity.settle_ms,
            )
            .await?;
            let (new_png, new) = capture(
                browser,
                &new_url,
                &job.viewport,
                parity.mask_media,
                parity.settle_ms,
            )
            .await?;

            let diff = compare(&legacy, &new, parity.pixel_threshold);
            let passed = diff.ratio <= parity.max_diff_pixel_ratio;
            if !passed {
                let base = parity
                    .artifacts_dir
                    .join(format!("{}-{}", slug(&job.path), job.viewport.name));
                std::fs::create_dir_all(&parity.artifacts_dir)
                    .with_context(|| format!("creating {}", parity.artifacts_dir.display()))?;
                std::fs::write(base.with_extension("legacy.png"), &legacy_png)?;
                std::fs::write(base.with_extension("new.png"), &new_png)?;
                diff.diff_image
                    .save(base.with_extension("diff.png"))
                    .context("saving diff image")?;
            }
            Ok::<_, anyhow::Error>((diff.ratio, passed))
        }
        .await;

        match result {
            Ok((ratio, passed)) => {
                if passed {
                    info!(path = job.path, viewport = job.viewport.name, ratio, "parity ok");
                } else {
                    warn!(
                        path = job.path,
                        viewport = job.viewport.name,
                        ratio,
                        max = parity.max_diff_pixel_ratio,
                        "parity FAILED"
                    );
                }
                ComparisonOutcome {
                    path: job.path.clone(),
                    viewport: job.viewport.name.clone(),
                    diff_ratio: Some(ratio),
                    passed,
                    error: None,
                }
            }
            Err(e) => {
                warn!(path = job.path, viewport = job.viewport.name, error = %e, "comparison errored");
                ComparisonOutcome {
                    path: job.path.clone(),
                    viewport: job.viewport.name.clone(),
                    diff_ratio: None,
                    passed: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Compare every discovered URL at every viewport through a bounded
    /// worker pool.
    pub async fn run(settings: &Settings) -> Result<ParityReport> {
        let urls = load_urls(settings)?;
        if urls.is_empty() {
            anyhow::bail!(
                "no URLs to compare; run discovery first or check {}",
                settings.parity.urls_file.display()
            );
        }

        let jobs: Arc<Vec<Job>> = Arc::new(
            urls.iter()
                .flat_map(|path| {
                    settings.parity.viewports.iter().map(move |v| Job {
                        path: path.clone(),
                        viewport: v.clone(),
                    })
                })
                .collect(),
        );
        info!(
            urls = urls.len(),
            viewports = settings.parity.viewports.len(),
            comparisons = jobs.len(),
            "starting parity run"
        );

        let browser = launch().await?;
        let next = Arc::new(AtomicUsize::new(0));
        let settings = Arc::new(settings.clone());
        let workers = settings.parity.workers.max(1).min(jobs.len());

        let progress = ProgressBar::new(jobs.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let jobs = jobs.clone();
            let next = next.clone();
            let browser = browser.clone();
            let settings = settings.clone();
            let progress = progress.clone();
            handles.push(tokio::spawn(async move {
                let mut outcomes = Vec::new();
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(job) = jobs.get(index) else {
                        break;
                    };
                    progress.set_message(format!("{} [{}]", job.path, job.viewport.name));
                    outcomes.push(run_job(&browser, &settings, job).await);
                    progress.inc(1);
                }
                outcomes
            }));
        }

        let mut report = ParityReport::default();
        for handle in handles {
            for outcome in handle.await.context("parity worker panicked")? {
                if outcome.passed {
                    report.passed += 1;
                } else {
                    report.failed += 1;
                }
                report.outcomes.push(outcome);
            }
        }
        progress.finish_and_clear();
        report
            .outcomes
            .sort_by(|a, b| (&a.path, &a.viewport).cmp(&(&b.path, &b.viewport)));
        Ok(report)
    }
}

#[cfg(feature = "browser")]
pub use browser::run;

#[cfg(not(feature = "browser"))]
pub async fn run(_settings: &Settings) -> Result<ParityReport> {
    Err(anyhow::anyhow!(
        "Browser support not compiled. Rebuild with: cargo build --features browser"
    ))
}
