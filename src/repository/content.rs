//! Content item rows, upserted by path.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::models::{ContentBlock, ContentItem, ContentStatus, ContentType};

use super::{format_ts, parse_ts};

/// Fields an import run writes. Timestamps and the publish transition are
/// handled by the repository.
#[derive(Debug, Clone)]
pub struct ContentUpsert {
    pub content_type: ContentType,
    pub path: String,
    pub title: String,
    pub status: ContentStatus,
    pub blocks: Vec<ContentBlock>,
    pub legacy_wp_id: Option<i64>,
    pub legacy_body_class: Option<String>,
    pub seo_title: Option<String>,
    pub seo_desc: Option<String>,
}

pub struct ContentRepository {
    conn: Arc<Mutex<Connection>>,
}

struct Row {
    id: i64,
    content_type: String,
    path: String,
    title: String,
    status: String,
    blocks: String,
    legacy_wp_id: Option<i64>,
    legacy_body_class: Option<String>,
    seo_title: Option<String>,
    seo_desc: Option<String>,
    published_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl Row {
    fn decode(self) -> Result<ContentItem> {
        Ok(ContentItem {
            id: self.id,
            content_type: ContentType::from_str(&self.content_type)
                .with_context(|| format!("unknown content type: {}", self.content_type))?,
            path: self.path,
            title: self.title,
            status: ContentStatus::from_str(&self.status)
                .with_context(|| format!("unknown content status: {}", self.status))?,
            blocks: serde_json::from_str(&self.blocks).context("decoding content blocks")?,
            legacy_wp_id: self.legacy_wp_id,
            legacy_body_class: self.legacy_body_class,
            seo_title: self.seo_title,
            seo_desc: self.seo_desc,
            published_at: self.published_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

const COLUMNS: &str = "id, type, path, title, status, blocks, legacy_wp_id, \
                       legacy_body_class, seo_title, seo_desc, published_at, \
                       created_at, updated_at";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        content_type: row.get(1)?,
        path: row.get(2)?,
        title: row.get(3)?,
        status: row.get(4)?,
        blocks: row.get(5)?,
        legacy_wp_id: row.get(6)?,
        legacy_body_class: row.get(7)?,
        seo_title: row.get(8)?,
        seo_desc: row.get(9)?,
        published_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl ContentRepository {
    pub(super) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub async fn find_by_path(&self, path: &str) -> Result<Option<ContentItem>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM content_items WHERE path = ?1"),
                params![path],
                map_row,
            )
            .optional()
            .context("querying content item")?;
        row.map(Row::decode).transpose()
    }

    /// Upsert by path. Returns the stored item and whether it was created.
    ///
    /// `published_at` is stamped only when the row transitions into
    /// PUBLISHED; reimports of an already-published item keep the first
    /// publish time.
    pub async fn upsert(&self, input: ContentUpsert) -> Result<(ContentItem, bool)> {
        let now = Utc::now();
        let blocks = serde_json::to_string(&input.blocks).context("encoding content blocks")?;
        let conn = self.conn.lock().await;

        let existing = conn
            .query_row(
                "SELECT id, status, published_at FROM content_items WHERE path = ?1",
                params![input.path],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()
            .context("querying content item")?;

        let created = existing.is_none();
        match existing {
            Some((id, old_status, old_published_at)) => {
                let newly_published = input.status == ContentStatus::Published
                    && old_status != ContentStatus::Published.as_str();
                let published_at = if newly_published {
                    Some(format_ts(now))
                } else {
                    old_published_at
                };
                conn.execute(
                    "UPDATE content_items SET type = ?1, title = ?2, status = ?3, \
                     blocks = ?4, legacy_wp_id = ?5, legacy_body_class = ?6, \
                     seo_title = ?7, seo_desc = ?8, published_at = ?9, updated_at = ?10 \
                     WHERE id = ?11",
                    params![
                        input.content_type.as_str(),
                        input.title,
                        input.status.as_str(),
                        blocks,
                        input.legacy_wp_id,
                        input.legacy_body_class,
                        input.seo_title,
                        input.seo_desc,
                        published_at,
                        format_ts(now),
                        id,
                    ],
                )
                .context("updating content item")?;
            }
            None => {
                let published_at = (input.status == ContentStatus::Published)
                    .then(|| format_ts(now));
                conn.execute(
                    "INSERT INTO content_items \
                     (type, path, title, status, blocks, legacy_wp_id, legacy_body_class, \
                      seo_title, seo_desc, published_at, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        input.content_type.as_str(),
                        input.path,
                        input.title,
                        input.status.as_str(),
                        blocks,
                        input.legacy_wp_id,
                        input.legacy_body_class,
                        input.seo_title,
                        input.seo_desc,
                        published_at,
                        format_ts(now),
                        format_ts(now),
                    ],
                )
                .context("inserting content item")?;
            }
        }

        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM content_items WHERE path = ?1"),
                params![input.path],
                map_row,
            )
            .context("reading back content item")?;
        Ok((row.decode()?, created))
    }

    pub async fn list(&self) -> Result<Vec<ContentItem>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {COLUMNS} FROM content_items ORDER BY path"))?;
        let rows = stmt
            .query_map([], map_row)
            .context("listing content items")?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Row::decode).collect()
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM content_items", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;

    fn sample(path: &str, status: ContentStatus) -> ContentUpsert {
        ContentUpsert {
            content_type: ContentType::Page,
            path: path.to_string(),
            title: "About".into(),
            status,
            blocks: vec![ContentBlock::Html {
                html: "<p>hello</p>".into(),
            }],
            legacy_wp_id: Some(42),
            legacy_body_class: None,
            seo_title: None,
            seo_desc: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_by_path_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.content();

        let (first, created) = repo.upsert(sample("about", ContentStatus::Draft)).await.unwrap();
        assert!(created);

        let mut second = sample("about", ContentStatus::Draft);
        second.title = "About Us".into();
        let (updated, created) = repo.upsert(second).await.unwrap();
        assert!(!created);
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.title, "About Us");
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_published_at_set_only_on_transition() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.content();

        let (draft, _) = repo.upsert(sample("post", ContentStatus::Draft)).await.unwrap();
        assert!(draft.published_at.is_none());

        let (published, _) = repo
            .upsert(sample("post", ContentStatus::Published))
            .await
            .unwrap();
        let stamp = published.published_at.expect("publish transition stamps time");

        // Reimporting an already-published item keeps the original stamp.
        let (again, _) = repo
            .upsert(sample("post", ContentStatus::Published))
            .await
            .unwrap();
        assert_eq!(again.published_at, Some(stamp));
    }

    #[tokio::test]
    async fn test_empty_path_is_a_valid_home_row() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.content();
        repo.upsert(sample("", ContentStatus::Published)).await.unwrap();
        assert!(repo.find_by_path("").await.unwrap().is_some());
    }
}
