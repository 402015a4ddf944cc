//! Point-in-time artifacts: the discovery payload consumed by the parity
//! runner and the import audit reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the URL list was produced, recorded in the payload for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    /// "sitemap" or "crawl".
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sitemap_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    /// URL count before validation.
    pub urls: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total: usize,
    pub ok: usize,
    pub non_ok: usize,
}

/// The persisted discovery output. Regenerated per run, never treated as a
/// live entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryPayload {
    pub generated_at: DateTime<Utc>,
    pub base_url: String,
    pub blog_prefix: String,
    pub discovery: DiscoveryReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSummary>,
    pub urls: Vec<String>,
}

/// One row of the media audit map: which pages reference a migrated asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMapEntry {
    pub source_url: String,
    pub resolved_url: String,
    pub used_by: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_field_names_are_camel_case() {
        let payload = DiscoveryPayload {
            generated_at: Utc::now(),
            base_url: "https://example.com".into(),
            blog_prefix: "/blog".into(),
            discovery: DiscoveryReport {
                mode: "sitemap".into(),
                sitemap_url: Some("https://example.com/blog/sitemap.xml".into()),
                start_url: None,
                urls: 2,
            },
            validation: Some(ValidationSummary {
                total: 2,
                ok: 2,
                non_ok: 0,
            }),
            urls: vec!["/blog/".into(), "/blog/about/".into()],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("generatedAt").is_some());
        assert!(json.get("baseUrl").is_some());
        assert_eq!(json["validation"]["nonOk"], 0);
        assert_eq!(json["discovery"]["sitemapUrl"], "https://example.com/blog/sitemap.xml");
        assert!(json["discovery"].get("startUrl").is_none());

        // The parity runner reads the same file back.
        let decoded: DiscoveryPayload = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.urls, payload.urls);
        assert_eq!(decoded.discovery.mode, "sitemap");
        assert!(decoded.discovery.start_url.is_none());
    }
}
