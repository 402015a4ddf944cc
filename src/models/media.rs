//! Media asset records: one row per migrated binary resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage backend a media asset lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Blob,
    S3,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Blob => "blob",
            Provider::S3 => "s3",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(Provider::Blob),
            "s3" => Some(Provider::S3),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One migrated binary resource.
///
/// `source_url` is always the canonical legacy URL, so size variants of the
/// same image collapse onto a single row. At most one row exists per
/// `(source_url, provider)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: i64,
    /// Canonical legacy URL (dedup key).
    pub source_url: String,
    pub provider: Provider,
    /// Storage-internal object path.
    pub key: String,
    /// Public-facing URL.
    pub url: String,
    pub filename: String,
    pub mime_type: Option<String>,
    /// Size in bytes, if known.
    pub bytes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl MediaAsset {
    /// Heuristic video check used by the pruner, by MIME type first and
    /// filename extension as fallback.
    pub fn is_video(&self) -> bool {
        if let Some(mime) = &self.mime_type {
            if mime.starts_with("video/") {
                return true;
            }
        }
        let name = self.filename.to_lowercase();
        [".mp4", ".mov", ".webm", ".avi", ".mkv", ".m4v"]
            .iter()
            .any(|ext| name.ends_with(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_roundtrip() {
        for p in [Provider::Blob, Provider::S3] {
            assert_eq!(Provider::from_str(p.as_str()), Some(p));
        }
        assert_eq!(Provider::from_str("gcs"), None);
    }

    #[test]
    fn test_is_video() {
        let mut asset = MediaAsset {
            id: 1,
            source_url: "https://example.com/wp-content/uploads/clip.mp4".into(),
            provider: Provider::Blob,
            key: "blog/clip.mp4".into(),
            url: "https://cdn.example.com/blog/clip.mp4".into(),
            filename: "clip.mp4".into(),
            mime_type: None,
            bytes: Some(1024),
            created_at: Utc::now(),
        };
        assert!(asset.is_video());
        asset.filename = "photo.jpg".into();
        assert!(!asset.is_video());
        asset.mime_type = Some("video/quicktime".into());
        assert!(asset.is_video());
    }
}
