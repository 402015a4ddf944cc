//! Attribute-scoped rewriting of upload references in HTML.
//!
//! Only `src`, `href` and `srcset` attribute values are touched, never bare
//! text, so unrelated substrings elsewhere in the markup survive untouched.
//! Rewriting is two-phase: a scan pass collects every distinct canonical
//! upload URL, each is resolved exactly once, then a replace pass applies
//! the resolutions. Unresolvable references are left byte-identical to the
//! input.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::media::canonical::canonicalize;
use crate::media::resolver::UrlResolver;

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Quote style is captured so replacements preserve it.
    RE.get_or_init(|| Regex::new(r#"(?i)\b(src|href)=(?:"([^"]*)"|'([^']*)')"#).unwrap())
}

fn srcset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\bsrcset=(?:"([^"]*)"|'([^']*)')"#).unwrap())
}

fn is_upload_url(url: &str) -> bool {
    url.contains("/wp-content/uploads/")
}

/// Expand the relative reference forms WordPress markup carries into
/// absolute legacy URLs: protocol-relative, prefix-relative (what the
/// importer's base-URL replacement produces) and root-relative.
fn absolutize(raw: &str, legacy_base: &str, blog_prefix: &str) -> String {
    if raw.starts_with("//") {
        format!("https:{raw}")
    } else if raw.starts_with(&format!("{blog_prefix}/")) {
        format!("{legacy_base}{raw}")
    } else if raw.starts_with('/') {
        format!("{legacy_base}{blog_prefix}{raw}")
    } else {
        raw.to_string()
    }
}

fn capture_value<'a>(caps: &'a Captures<'a>, first: usize) -> (&'a str, char) {
    match caps.get(first) {
        Some(m) => (m.as_str(), '"'),
        None => (
            caps.get(first + 1).map(|m| m.as_str()).unwrap_or(""),
            '\'',
        ),
    }
}

/// Split one srcset candidate into URL and optional descriptor.
fn split_candidate(candidate: &str) -> (&str, Option<&str>) {
    let trimmed = candidate.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((url, descriptor)) => (url, Some(descriptor.trim())),
        None => (trimmed, None),
    }
}

#[derive(Debug)]
pub struct RewriteOutcome {
    pub html: String,
    /// Distinct `(canonical source, resolved)` pairs actually applied.
    pub mapped: Vec<(String, String)>,
}

/// Rewrite upload references in `html` through `resolver`. Each distinct
/// canonical URL is resolved at most once per document, including a cached
/// "unresolvable" outcome.
pub async fn rewrite_uploads(
    html: &str,
    legacy_base: &str,
    blog_prefix: &str,
    resolver: &dyn UrlResolver,
) -> RewriteOutcome {
    // Scan pass: every distinct canonical upload URL in document order.
    let mut canonicals: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut note = |raw: &str| {
        let absolute = absolutize(raw, legacy_base, blog_prefix);
        if !is_upload_url(&absolute) {
            return;
        }
        let canonical = canonicalize(&absolute);
        if seen.insert(canonical.clone()) {
            canonicals.push(canonical);
        }
    };
    for caps in attr_re().captures_iter(html) {
        let (value, _) = capture_value(&caps, 2);
        note(value);
    }
    for caps in srcset_re().captures_iter(html) {
        let (value, _) = capture_value(&caps, 1);
        for candidate in value.split(',') {
            let (url, _) = split_candidate(candidate);
            if !url.is_empty() {
                note(url);
            }
        }
    }

    // Resolve pass: once per canonical, negative outcomes cached too.
    let mut resolutions: HashMap<String, Option<String>> = HashMap::new();
    let mut mapped = Vec::new();
    for canonical in canonicals {
        let resolved = resolver.resolve(&canonical).await;
        if let Some(target) = &resolved {
            mapped.push((canonical.clone(), target.clone()));
        }
        resolutions.insert(canonical, resolved);
    }

    let lookup = |raw: &str| -> Option<&str> {
        let absolute = absolutize(raw, legacy_base, blog_prefix);
        if !is_upload_url(&absolute) {
            return None;
        }
        resolutions
            .get(&canonicalize(&absolute))
            .and_then(|r| r.as_deref())
    };

    // Replace pass: unresolved attributes keep their original bytes.
    let rewritten = attr_re().replace_all(html, |caps: &Captures<'_>| {
        let attr = &caps[1];
        let (value, quote) = capture_value(caps, 2);
        match lookup(value) {
            Some(target) => format!("{attr}={quote}{target}{quote}"),
            None => caps[0].to_string(),
        }
    });
    let rewritten = srcset_re().replace_all(&rewritten, |caps: &Captures<'_>| {
        let (value, quote) = capture_value(caps, 1);
        let mut any = false;
        let candidates: Vec<String> = value
            .split(',')
            .filter(|c| !c.trim().is_empty())
            .map(|candidate| {
                let (url, descriptor) = split_candidate(candidate);
                let target = match lookup(url) {
                    Some(t) => {
                        any = true;
                        t
                    }
                    None => url,
                };
                match descriptor {
                    Some(d) => format!("{target} {d}"),
                    None => target.to_string(),
                }
            })
            .collect();
        if any {
            format!("srcset={quote}{}{quote}", candidates.join(", "))
        } else {
            caps[0].to_string()
        }
    });

    RewriteOutcome {
        html: rewritten.into_owned(),
        mapped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeResolver {
        map: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl FakeResolver {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                map: pairs
                    .iter()
                    .map(|(a, b)| (a.to_string(), b.to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UrlResolver for FakeResolver {
        async fn resolve(&self, source_url: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.map.get(source_url).cloned()
        }
    }

    const BASE: &str = "https://legacy.example.com";
    const PREFIX: &str = "/blog";
    const UPLOAD: &str = "https://legacy.example.com/wp-content/uploads/2020/photo.jpg";
    const TARGET: &str = "https://cdn.example.com/blog/2020/photo.jpg";

    async fn rewrite(html: &str, resolver: &FakeResolver) -> RewriteOutcome {
        rewrite_uploads(html, BASE, PREFIX, resolver).await
    }

    #[tokio::test]
    async fn test_rewrites_src_and_href() {
        let resolver = FakeResolver::new(&[(UPLOAD, TARGET)]);
        let html = format!(r#"<img src="{UPLOAD}"><a href="{UPLOAD}">download</a>"#);
        let out = rewrite(&html, &resolver).await;
        assert_eq!(
            out.html,
            format!(r#"<img src="{TARGET}"><a href="{TARGET}">download</a>"#)
        );
        assert_eq!(out.mapped, vec![(UPLOAD.to_string(), TARGET.to_string())]);
    }

    #[tokio::test]
    async fn test_unresolvable_reference_is_byte_identical() {
        let resolver = FakeResolver::new(&[]);
        let html = format!(r#"<img src="{UPLOAD}?v=broken">"#);
        let out = rewrite(&html, &resolver).await;
        assert_eq!(out.html, html);
        assert!(out.mapped.is_empty());
    }

    #[tokio::test]
    async fn test_same_upload_resolved_once_per_document() {
        let resolver = FakeResolver::new(&[(UPLOAD, TARGET)]);
        let variant_a = "https://legacy.example.com/wp-content/uploads/2020/photo-300x200.jpg";
        let variant_b = "https://legacy.example.com/wp-content/uploads/2020/photo-1024x768.jpg";
        let html = format!(
            r#"<img src="{UPLOAD}" srcset="{variant_a} 300w, {variant_b} 1024w">"#
        );
        let out = rewrite(&html, &resolver).await;
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            out.html,
            format!(r#"<img src="{TARGET}" srcset="{TARGET} 300w, {TARGET} 1024w">"#)
        );
    }

    #[tokio::test]
    async fn test_srcset_descriptors_preserved() {
        let resolver = FakeResolver::new(&[(UPLOAD, TARGET)]);
        let html = format!(r#"<source srcset="{UPLOAD} 2x">"#);
        let out = rewrite(&html, &resolver).await;
        assert_eq!(out.html, format!(r#"<source srcset="{TARGET} 2x">"#));
    }

    #[tokio::test]
    async fn test_non_upload_urls_left_alone() {
        let resolver = FakeResolver::new(&[(UPLOAD, TARGET)]);
        let html = r#"<a href="https://legacy.example.com/about/">about</a>"#;
        let out = rewrite(html, &resolver).await;
        assert_eq!(out.html, html);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_quoted_attributes_keep_quote_style() {
        let resolver = FakeResolver::new(&[(UPLOAD, TARGET)]);
        let html = format!(r#"<img src='{UPLOAD}'>"#);
        let out = rewrite(&html, &resolver).await;
        assert_eq!(out.html, format!(r#"<img src='{TARGET}'>"#));
    }

    #[tokio::test]
    async fn test_relative_upload_references_are_absolutized() {
        let resolver = FakeResolver::new(&[
            (
                "https://legacy.example.com/blog/wp-content/uploads/2020/photo.jpg",
                TARGET,
            ),
            (UPLOAD, TARGET),
        ]);
        // The importer's base replacement leaves prefix-relative uploads.
        let html = r#"<img src="/blog/wp-content/uploads/2020/photo-300x200.jpg">"#;
        let out = rewrite(html, &resolver).await;
        assert_eq!(out.html, format!(r#"<img src="{TARGET}">"#));

        let protocol_relative =
            r#"<img src="//legacy.example.com/wp-content/uploads/2020/photo.jpg">"#;
        let out = rewrite(protocol_relative, &resolver).await;
        assert_eq!(out.html, format!(r#"<img src="{TARGET}">"#));
    }

    #[tokio::test]
    async fn test_plain_text_mention_is_not_rewritten() {
        let resolver = FakeResolver::new(&[(UPLOAD, TARGET)]);
        let html = format!("<p>See {UPLOAD} for the file.</p>");
        let out = rewrite(&html, &resolver).await;
        assert_eq!(out.html, html);
    }
}
