//! Media asset rows, keyed by canonical source URL + provider.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::models::{MediaAsset, Provider};

use super::{format_ts, parse_ts};

/// Fields written on a resolve. Identity and timestamps are managed here.
#[derive(Debug, Clone)]
pub struct MediaUpsert {
    pub source_url: String,
    pub provider: Provider,
    pub key: String,
    pub url: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Option<i64>,
}

pub struct MediaRepository {
    conn: Arc<Mutex<Connection>>,
}

// Raw row before timestamp/enum decoding.
struct Row {
    id: i64,
    source_url: String,
    provider: String,
    key: String,
    url: String,
    filename: String,
    mime_type: Option<String>,
    bytes: Option<i64>,
    created_at: String,
}

impl Row {
    fn decode(self) -> Result<MediaAsset> {
        Ok(MediaAsset {
            id: self.id,
            provider: Provider::from_str(&self.provider)
                .with_context(|| format!("unknown provider in database: {}", self.provider))?,
            source_url: self.source_url,
            key: self.key,
            url: self.url,
            filename: self.filename,
            mime_type: self.mime_type,
            bytes: self.bytes,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

const COLUMNS: &str = "id, source_url, provider, key, url, filename, mime_type, bytes, created_at";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        source_url: row.get(1)?,
        provider: row.get(2)?,
        key: row.get(3)?,
        url: row.get(4)?,
        filename: row.get(5)?,
        mime_type: row.get(6)?,
        bytes: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl MediaRepository {
    pub(super) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub async fn find_by_source(
        &self,
        source_url: &str,
        provider: Provider,
    ) -> Result<Option<MediaAsset>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM media_assets WHERE source_url = ?1 AND provider = ?2"
                ),
                params![source_url, provider.as_str()],
                map_row,
            )
            .optional()
            .context("querying media asset")?;
        row.map(Row::decode).transpose()
    }

    /// Insert or update the `(source_url, provider)` row. `created_at` is
    /// preserved on update.
    pub async fn upsert(&self, input: MediaUpsert) -> Result<MediaAsset> {
        let now = format_ts(Utc::now());
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO media_assets \
             (source_url, provider, key, url, filename, mime_type, bytes, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(source_url, provider) DO UPDATE SET \
             key = excluded.key, url = excluded.url, filename = excluded.filename, \
             mime_type = excluded.mime_type, bytes = excluded.bytes",
            params![
                input.source_url,
                input.provider.as_str(),
                input.key,
                input.url,
                input.filename,
                input.mime_type,
                input.bytes,
                now,
            ],
        )
        .context("upserting media asset")?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM media_assets WHERE source_url = ?1 AND provider = ?2"
                ),
                params![input.source_url, input.provider.as_str()],
                map_row,
            )
            .context("reading back media asset")?;
        row.decode()
    }

    /// All assets for one provider, largest first. Unknown sizes sort last.
    pub async fn list_by_provider(&self, provider: Provider) -> Result<Vec<MediaAsset>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM media_assets WHERE provider = ?1 \
             ORDER BY bytes IS NULL, bytes DESC"
        ))?;
        let rows = stmt
            .query_map(params![provider.as_str()], map_row)
            .context("listing media assets")?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Row::decode).collect()
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM media_assets WHERE id = ?1", params![id])
            .context("deleting media asset")?;
        Ok(())
    }

    /// Wipe all rows for a provider. Returns the number removed.
    pub async fn delete_by_provider(&self, provider: Provider) -> Result<usize> {
        let conn = self.conn.lock().await;
        let n = conn
            .execute(
                "DELETE FROM media_assets WHERE provider = ?1",
                params![provider.as_str()],
            )
            .context("resetting media assets")?;
        Ok(n)
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM media_assets", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;

    fn sample(source: &str, bytes: Option<i64>) -> MediaUpsert {
        MediaUpsert {
            source_url: source.to_string(),
            provider: Provider::Blob,
            key: "blog/photo.jpg".into(),
            url: "https://cdn.example.com/blog/photo.jpg".into(),
            filename: "photo.jpg".into(),
            mime_type: Some("image/jpeg".into()),
            bytes,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_source_and_provider() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.media();
        let src = "https://example.com/wp-content/uploads/photo.jpg";

        let first = repo.upsert(sample(src, None)).await.unwrap();
        let second = repo.upsert(sample(src, Some(2048))).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.bytes, Some(2048));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_source_different_provider_are_distinct_rows() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.media();
        let src = "https://example.com/wp-content/uploads/photo.jpg";

        repo.upsert(sample(src, None)).await.unwrap();
        let mut s3 = sample(src, None);
        s3.provider = Provider::S3;
        repo.upsert(s3).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
        assert!(repo.find_by_source(src, Provider::S3).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_by_provider_sorts_largest_first() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.media();
        repo.upsert(sample("https://x/a.jpg", Some(10))).await.unwrap();
        repo.upsert(sample("https://x/b.jpg", Some(300))).await.unwrap();
        repo.upsert(sample("https://x/c.jpg", None)).await.unwrap();

        let all = repo.list_by_provider(Provider::Blob).await.unwrap();
        assert_eq!(all[0].source_url, "https://x/b.jpg");
        assert_eq!(all[1].source_url, "https://x/a.jpg");
        assert_eq!(all[2].bytes, None);
    }
}
