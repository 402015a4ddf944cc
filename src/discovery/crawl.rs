//! Breadth-first same-origin crawl, used when no sitemap is available.

use std::collections::{HashSet, VecDeque};

use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::utils::http;

use super::{normalize_candidate, DiscoveryError};

/// Collect raw href values from a page. Parsing happens synchronously in
/// one scope; `Html` is not `Send` and must never be held across an await.
fn extract_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").unwrap();
    document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .map(String::from)
        .collect()
}

/// BFS from `start`, following only same-origin links under the blog
/// prefix, fetching at most `max_pages` pages. Returns the normalized paths
/// of pages that answered successfully.
pub async fn crawl(
    client: &reqwest::Client,
    base: &Url,
    prefix: &str,
    start: &str,
    max_pages: usize,
) -> Result<Vec<String>, DiscoveryError> {
    let mut frontier: VecDeque<String> = VecDeque::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut pages: Vec<String> = Vec::new();

    let Some(start_path) = normalize_candidate(start, base, prefix) else {
        return Err(DiscoveryError::EmptyCrawl(start.to_string()));
    };
    seen.insert(start_path.clone());
    frontier.push_back(start_path);

    let mut fetched = 0usize;
    while let Some(path) = frontier.pop_front() {
        if fetched >= max_pages {
            info!(max_pages, "crawl page cap reached");
            break;
        }
        fetched += 1;

        let url = match base.join(&path) {
            Ok(u) => u,
            Err(_) => continue,
        };
        let Some(body) = http::fetch_text(client, url.as_str()).await? else {
            debug!(%url, "page unreachable, dropping from crawl");
            continue;
        };
        pages.push(path);

        for href in extract_hrefs(&body) {
            // Relative links resolve against the page they were found on.
            let absolute = match url.join(&href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            };
            if let Some(candidate) = normalize_candidate(&absolute, base, prefix) {
                if seen.insert(candidate.clone()) {
                    frontier.push_back(candidate);
                }
            }
        }
    }

    pages.sort();
    pages.dedup();
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_hrefs() {
        let html = r#"
            <html><body>
              <a href="/blog/a/">a</a>
              <a href="https://legacy.example.com/blog/b/">b</a>
              <a name="anchor-without-href">skip</a>
              <a href="../c/">relative</a>
            </body></html>"#;
        assert_eq!(
            extract_hrefs(html),
            vec!["/blog/a/", "https://legacy.example.com/blog/b/", "../c/"]
        );
    }
}
