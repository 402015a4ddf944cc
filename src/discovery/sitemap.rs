//! Sitemap discovery: try the conventional locations, flatten sitemap
//! indexes, and collect `<loc>` entries.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};
use url::Url;

use crate::utils::http;

use super::DiscoveryError;

// Indexes nesting deeper than this are not worth chasing.
const MAX_SITEMAP_FETCHES: usize = 50;

fn candidate_locations(base: &Url, prefix: &str) -> Vec<String> {
    let base = base.as_str().trim_end_matches('/');
    vec![
        format!("{base}{prefix}/sitemap_index.xml"),
        format!("{base}{prefix}/sitemap.xml"),
        format!("{base}/sitemap_index.xml"),
        format!("{base}/sitemap.xml"),
    ]
}

/// Pull the text content of every `<loc>` element.
pub fn extract_locs(xml: &str) -> Vec<String> {
    let mut locs = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<loc>") {
        rest = &rest[start + "<loc>".len()..];
        let Some(end) = rest.find("</loc>") else {
            break;
        };
        let loc = unescape_entities(rest[..end].trim());
        if !loc.is_empty() {
            locs.push(loc);
        }
        rest = &rest[end + "</loc>".len()..];
    }
    locs
}

fn is_sitemap_index(xml: &str) -> bool {
    xml.contains("<sitemapindex")
}

fn unescape_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
}

/// Try the conventional sitemap locations; on the first that yields page
/// URLs, return it with the flattened URL list. Indexes are followed
/// breadth-first. Absence, malformedness and unreachability all end in
/// `NoSitemap` (logged distinctly), so callers can fall back to crawling.
pub async fn discover(
    client: &reqwest::Client,
    base: &Url,
    prefix: &str,
) -> Result<(String, Vec<String>), DiscoveryError> {
    for candidate in candidate_locations(base, prefix) {
        let root = match http::fetch_text(client, &candidate).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                debug!(url = candidate, "no sitemap at this location");
                continue;
            }
            Err(e) => {
                warn!(url = candidate, error = %e, "sitemap candidate unreachable");
                continue;
            }
        };

        let mut urls = Vec::new();
        let mut queue: VecDeque<(String, String)> = VecDeque::new();
        let mut fetched: HashSet<String> = HashSet::new();
        queue.push_back((candidate.clone(), root));
        fetched.insert(candidate.clone());

        while let Some((source, xml)) = queue.pop_front() {
            let locs = extract_locs(&xml);
            if locs.is_empty() {
                warn!(url = source, "sitemap fetched but contains no <loc> entries");
                continue;
            }
            if is_sitemap_index(&xml) {
                for child in locs {
                    if fetched.len() >= MAX_SITEMAP_FETCHES || !fetched.insert(child.clone()) {
                        continue;
                    }
                    match http::fetch_text(client, &child).await {
                        Ok(Some(body)) => queue.push_back((child, body)),
                        Ok(None) => debug!(url = child, "child sitemap unavailable"),
                        Err(e) => warn!(url = child, error = %e, "child sitemap unreachable"),
                    }
                }
            } else {
                urls.extend(locs);
            }
        }

        if !urls.is_empty() {
            return Ok((candidate, urls));
        }
    }
    Err(DiscoveryError::NoSitemap(base.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_locs() {
        let xml = r#"<?xml version="1.0"?>
            <urlset>
              <url><loc>https://x.example/blog/a/</loc></url>
              <url><loc> https://x.example/blog/b/?p=1&amp;q=2 </loc></url>
            </urlset>"#;
        assert_eq!(
            extract_locs(xml),
            vec![
                "https://x.example/blog/a/",
                "https://x.example/blog/b/?p=1&q=2"
            ]
        );
    }

    #[test]
    fn test_extract_locs_tolerates_truncation() {
        assert_eq!(extract_locs("<urlset><loc>https://x/a"), Vec::<String>::new());
        assert!(extract_locs("no xml here").is_empty());
    }

    #[test]
    fn test_index_detection() {
        assert!(is_sitemap_index(
            r#"<sitemapindex><sitemap><loc>https://x/s1.xml</loc></sitemap></sitemapindex>"#
        ));
        assert!(!is_sitemap_index("<urlset></urlset>"));
    }

    #[tokio::test]
    async fn test_unreachable_origin_ends_in_no_sitemap() {
        let client = http::client().unwrap();
        // Nothing listens on port 1; every candidate fails at the transport
        // layer, which must read as "no sitemap", not a fatal error, so the
        // auto mode can fall back to crawling.
        let base = Url::parse("http://127.0.0.1:1").unwrap();
        let err = discover(&client, &base, "/blog").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NoSitemap(_)));
    }

    #[test]
    fn test_candidate_order_prefers_blog_prefix() {
        let base = Url::parse("https://legacy.example.com").unwrap();
        let candidates = candidate_locations(&base, "/blog");
        assert_eq!(
            candidates,
            vec![
                "https://legacy.example.com/blog/sitemap_index.xml",
                "https://legacy.example.com/blog/sitemap.xml",
                "https://legacy.example.com/sitemap_index.xml",
                "https://legacy.example.com/sitemap.xml",
            ]
        );
    }
}
