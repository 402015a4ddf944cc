//! Storage space reclamation: delete assets largest-first until a target
//! number of bytes has been freed.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::media::canonical::canonicalize;
use crate::media::storage::{StorageBackend, StorageError};
use crate::models::MediaAsset;
use crate::repository::MediaRepository;
use crate::utils::retry::{retry, RATE_LIMIT_BACKOFF};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PruneMode {
    /// Video assets, by MIME type or filename extension.
    #[default]
    Videos,
    /// Rows whose stored source URL is not in canonical form (size-variant
    /// leftovers from before dedup).
    Variants,
    /// Everything, biggest first.
    Largest,
}

impl PruneMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "videos" => Some(Self::Videos),
            "variants" => Some(Self::Variants),
            "largest" => Some(Self::Largest),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct PruneSummary {
    pub deleted: usize,
    pub failed: usize,
    pub freed_bytes: u64,
}

fn select_candidates(assets: Vec<MediaAsset>, mode: PruneMode) -> Vec<MediaAsset> {
    match mode {
        PruneMode::Videos => assets.into_iter().filter(|a| a.is_video()).collect(),
        PruneMode::Variants => assets
            .into_iter()
            .filter(|a| canonicalize(&a.source_url) != a.source_url)
            .collect(),
        PruneMode::Largest => assets,
    }
}

/// Delete candidates until `target_free_bytes` have been reclaimed or the
/// candidate set is exhausted. Deletions run sequentially; a failed deletion
/// skips to the next candidate.
pub async fn prune(
    repo: &MediaRepository,
    backend: Arc<dyn StorageBackend>,
    target_free_bytes: u64,
    mode: PruneMode,
) -> Result<PruneSummary> {
    let assets = repo.list_by_provider(backend.provider()).await?;
    let candidates = select_candidates(assets, mode);
    info!(
        candidates = candidates.len(),
        target_free_bytes, "starting prune"
    );

    let mut summary = PruneSummary::default();
    for asset in candidates {
        if summary.freed_bytes >= target_free_bytes {
            break;
        }

        let deleted = retry(
            &RATE_LIMIT_BACKOFF,
            |e: &StorageError| matches!(e, StorageError::RateLimited),
            || backend.delete(&asset.key),
        )
        .await;

        match deleted {
            // Already gone remotely; the row is stale either way.
            Ok(()) | Err(StorageError::NotFound) => {
                repo.delete(asset.id).await?;
                summary.deleted += 1;
                summary.freed_bytes += asset.bytes.unwrap_or(0).max(0) as u64;
                info!(key = asset.key, freed = summary.freed_bytes, "pruned");
            }
            Err(e) => {
                warn!(key = asset.key, error = %e, "delete failed, skipping candidate");
                summary.failed += 1;
            }
        }
    }

    info!(
        deleted = summary.deleted,
        failed = summary.failed,
        freed_bytes = summary.freed_bytes,
        "prune complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;
    use chrono::Utc;

    fn asset(source: &str, filename: &str, mime: Option<&str>, bytes: i64) -> MediaAsset {
        MediaAsset {
            id: 0,
            source_url: source.to_string(),
            provider: Provider::Blob,
            key: format!("blog/{filename}"),
            url: format!("https://cdn.example.com/blog/{filename}"),
            filename: filename.to_string(),
            mime_type: mime.map(String::from),
            bytes: Some(bytes),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_videos_mode_selects_by_mime_and_extension() {
        let assets = vec![
            asset("https://x/clip.mp4", "clip.mp4", None, 100),
            asset("https://x/photo.jpg", "photo.jpg", Some("image/jpeg"), 50),
            asset("https://x/talk.bin", "talk.bin", Some("video/webm"), 80),
        ];
        let picked = select_candidates(assets, PruneMode::Videos);
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|a| a.filename != "photo.jpg"));
    }

    #[test]
    fn test_variants_mode_selects_non_canonical_sources() {
        let assets = vec![
            asset("https://x/img-300x200.jpg", "img-300x200.jpg", None, 10),
            asset("https://x/img.jpg", "img.jpg", None, 10),
        ];
        let picked = select_candidates(assets, PruneMode::Variants);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].filename, "img-300x200.jpg");
    }

    #[test]
    fn test_largest_mode_keeps_everything() {
        let assets = vec![
            asset("https://x/a.jpg", "a.jpg", None, 10),
            asset("https://x/b.jpg", "b.jpg", None, 20),
        ];
        assert_eq!(select_candidates(assets, PruneMode::Largest).len(), 2);
    }
}
