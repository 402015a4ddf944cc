//! Object storage backends.
//!
//! Two interchangeable implementations behind one trait: a token-based blob
//! store (single-shot PUT) and an S3-style store (multipart upload with a
//! head pre-flight). The resolver and pruner only see the trait.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, ObjectStore, PutMultipartOptions, PutOptions, PutPayload,
    WriteMultipart,
};
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::MediaSettings;
use crate::models::Provider;

/// Multipart part size for the S3-style backend.
const PART_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("rate limited by storage provider")]
    RateLimited,
    #[error("object not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn provider(&self) -> Provider;

    /// Public URL an object at `key` is served from.
    fn public_url(&self, key: &str) -> String;

    /// Whether `url` points at this backend. Records failing this check are
    /// stale leftovers from a previous provider and get re-resolved.
    fn owns_url(&self, url: &str) -> bool;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Store `bytes` at `key` and return the public URL.
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<String, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Build the configured backend. `None` when media migration is disabled.
/// Missing credentials for an enabled backend are a setup failure.
pub fn backend_from_settings(media: &MediaSettings) -> Result<Option<Arc<dyn StorageBackend>>> {
    match media.mode {
        crate::config::MediaMode::None => Ok(None),
        crate::config::MediaMode::Blob => {
            let endpoint = media
                .blob_endpoint
                .clone()
                .context("MEDIA_MODE=blob requires BLOB_ENDPOINT")?;
            let token = media
                .blob_token
                .clone()
                .context("MEDIA_MODE=blob requires BLOB_READ_WRITE_TOKEN")?;
            Ok(Some(Arc::new(BlobStorage::new(
                endpoint,
                token,
                media.public_base_url.clone(),
            )?)))
        }
        crate::config::MediaMode::S3 => {
            let bucket = media
                .s3_bucket
                .clone()
                .context("MEDIA_MODE=s3 requires S3_BUCKET")?;
            Ok(Some(Arc::new(S3Storage::new(
                bucket,
                media.s3_region.clone(),
                media.public_base_url.clone(),
            )?)))
        }
    }
}

/// Token-authenticated blob store over plain HTTP verbs.
pub struct BlobStorage {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    public_base: String,
}

impl BlobStorage {
    pub fn new(endpoint: String, token: String, public_base: Option<String>) -> Result<Self> {
        let public_base = public_base.unwrap_or_else(|| endpoint.clone());
        Ok(Self {
            client: crate::utils::http::client()?,
            endpoint,
            token,
            public_base,
        })
    }

    fn object_endpoint(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, key.trim_start_matches('/'))
    }

    fn map_status(status: StatusCode) -> StorageError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => StorageError::RateLimited,
            StatusCode::NOT_FOUND => StorageError::NotFound,
            other => StorageError::Other(anyhow!("blob store returned {other}")),
        }
    }
}

#[async_trait]
impl StorageBackend for BlobStorage {
    fn provider(&self) -> Provider {
        Provider::Blob
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key.trim_start_matches('/'))
    }

    fn owns_url(&self, url: &str) -> bool {
        url.starts_with(&self.public_base) || url.starts_with(&self.endpoint)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let response = self
            .client
            .head(self.public_url(key))
            .send()
            .await
            .map_err(|e| StorageError::Other(anyhow!(e)))?;
        Ok(response.status().is_success())
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        let mut request = self
            .client
            .put(self.object_endpoint(key))
            .bearer_auth(&self.token)
            .body(bytes);
        if let Some(ct) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, ct);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Other(anyhow!(e)))?;
        if !response.status().is_success() {
            return Err(Self::map_status(response.status()));
        }
        // The store may answer with its own URL for the object; fall back to
        // the computed public URL otherwise.
        #[derive(serde::Deserialize)]
        struct PutResponse {
            url: Option<String>,
        }
        let url = response
            .json::<PutResponse>()
            .await
            .ok()
            .and_then(|r| r.url)
            .unwrap_or_else(|| self.public_url(key));
        Ok(url)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .delete(self.object_endpoint(key))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| StorageError::Other(anyhow!(e)))?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::map_status(response.status()))
    }
}

/// S3-style backend with multipart uploads for large objects.
pub struct S3Storage {
    store: AmazonS3,
    public_base: String,
}

impl S3Storage {
    pub fn new(bucket: String, region: Option<String>, public_base: Option<String>) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&bucket);
        if let Some(region) = &region {
            builder = builder.with_region(region);
        }
        let store = builder.build().context("configuring S3 storage")?;
        let public_base = public_base.unwrap_or_else(|| {
            let region = region.unwrap_or_else(|| "us-east-1".to_string());
            format!("https://{bucket}.s3.{region}.amazonaws.com")
        });
        Ok(Self { store, public_base })
    }

    fn attributes(content_type: Option<&str>) -> Attributes {
        let mut attributes = Attributes::new();
        if let Some(ct) = content_type {
            attributes.insert(Attribute::ContentType, ct.to_string().into());
        }
        attributes
    }

    fn map_error(e: object_store::Error) -> StorageError {
        match e {
            object_store::Error::NotFound { .. } => StorageError::NotFound,
            other => StorageError::Other(anyhow!(other)),
        }
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn provider(&self) -> Provider {
        Provider::S3
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key.trim_start_matches('/'))
    }

    fn owns_url(&self, url: &str) -> bool {
        url.starts_with(&self.public_base)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.store.head(&ObjectPath::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(Self::map_error(e)),
        }
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        let path = ObjectPath::from(key);
        let attributes = Self::attributes(content_type);
        if bytes.len() <= PART_SIZE {
            let opts = PutOptions {
                attributes,
                ..Default::default()
            };
            self.store
                .put_opts(&path, PutPayload::from(bytes), opts)
                .await
                .map_err(Self::map_error)?;
        } else {
            let opts = PutMultipartOptions {
                attributes,
                ..Default::default()
            };
            let upload = self
                .store
                .put_multipart_opts(&path, opts)
                .await
                .map_err(Self::map_error)?;
            let mut writer = WriteMultipart::new_with_chunk_size(upload, PART_SIZE);
            writer.write(&bytes);
            writer
                .finish()
                .await
                .map_err(Self::map_error)?;
        }
        Ok(self.public_url(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.store
            .delete(&ObjectPath::from(key))
            .await
            .map_err(Self::map_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_public_url_and_ownership() {
        let storage = BlobStorage::new(
            "https://blob.example.com/store".into(),
            "token".into(),
            Some("https://cdn.example.com".into()),
        )
        .unwrap();
        assert_eq!(
            storage.public_url("blog/2020/photo.jpg"),
            "https://cdn.example.com/blog/2020/photo.jpg"
        );
        assert!(storage.owns_url("https://cdn.example.com/blog/2020/photo.jpg"));
        assert!(!storage.owns_url("https://legacy.example.com/wp-content/uploads/photo.jpg"));
    }

    #[test]
    fn test_blob_status_mapping() {
        assert!(matches!(
            BlobStorage::map_status(StatusCode::TOO_MANY_REQUESTS),
            StorageError::RateLimited
        ));
        assert!(matches!(
            BlobStorage::map_status(StatusCode::NOT_FOUND),
            StorageError::NotFound
        ));
        assert!(matches!(
            BlobStorage::map_status(StatusCode::INTERNAL_SERVER_ERROR),
            StorageError::Other(_)
        ));
    }
}
