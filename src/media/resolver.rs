//! The media resolver: canonical source URL in, durable public URL out.
//!
//! Resolution is idempotent and self-healing. An existing record pointing at
//! the current backend is returned as-is; a record pointing at a foreign
//! domain (left over from a provider migration) is re-resolved. Every
//! failure path yields `None` so a broken asset never aborts the import of
//! the page referencing it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::media::canonical::{canonicalize, upload_relative_path};
use crate::media::storage::StorageBackend;
use crate::repository::{MediaRepository, MediaUpsert};
use crate::utils::http;

/// Resolution strategy seam. The HTML rewriter only depends on this.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    /// Map a legacy URL to its migrated URL, or `None` to leave the original
    /// reference in place.
    async fn resolve(&self, source_url: &str) -> Option<String>;
}

pub struct MediaResolver {
    client: reqwest::Client,
    backend: Arc<dyn StorageBackend>,
    repo: MediaRepository,
    key_prefix: String,
}

impl MediaResolver {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        repo: MediaRepository,
        key_prefix: impl Into<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::client()?,
            backend,
            repo,
            key_prefix: key_prefix.into().trim_matches('/').to_string(),
        })
    }

    fn key_for(&self, relative: &str) -> String {
        if self.key_prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{relative}", self.key_prefix)
        }
    }

    async fn resolve_inner(&self, source_url: &str) -> anyhow::Result<Option<String>> {
        let canonical = canonicalize(source_url);
        let provider = self.backend.provider();

        if let Some(existing) = self.repo.find_by_source(&canonical, provider).await? {
            if self.backend.owns_url(&existing.url) {
                return Ok(Some(existing.url));
            }
            debug!(
                source = canonical,
                stale = existing.url,
                "record points at a foreign domain, re-resolving"
            );
        }

        let Some(relative) = upload_relative_path(&canonical) else {
            debug!(url = canonical, "not an uploads URL, skipping");
            return Ok(None);
        };
        let key = self.key_for(&relative);
        let filename = relative
            .rsplit('/')
            .next()
            .unwrap_or(relative.as_str())
            .to_string();

        // The object may survive a lost database record; re-record instead
        // of re-uploading.
        if self.backend.exists(&key).await? {
            let url = self.backend.public_url(&key);
            self.repo
                .upsert(MediaUpsert {
                    source_url: canonical.clone(),
                    provider,
                    key,
                    url: url.clone(),
                    filename,
                    mime_type: None,
                    bytes: None,
                })
                .await?;
            return Ok(Some(url));
        }

        let Some(body) = http::fetch_bytes(&self.client, &canonical).await? else {
            // Non-success status; fetch_bytes already logged it.
            return Ok(None);
        };
        let size = body.bytes.len() as i64;
        let url = self
            .backend
            .put(&key, body.bytes, body.content_type.as_deref())
            .await?;

        self.repo
            .upsert(MediaUpsert {
                source_url: canonical,
                provider,
                key,
                url: url.clone(),
                filename,
                mime_type: body.content_type,
                bytes: Some(size),
            })
            .await?;
        Ok(Some(url))
    }
}

#[async_trait]
impl UrlResolver for MediaResolver {
    async fn resolve(&self, source_url: &str) -> Option<String> {
        match self.resolve_inner(source_url).await {
            Ok(result) => result,
            Err(e) => {
                warn!(url = source_url, error = %e, "media resolution failed, keeping original URL");
                None
            }
        }
    }
}
