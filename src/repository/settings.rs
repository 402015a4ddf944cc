//! Key/value site settings (header/footer/CSS fragments), layered in front
//! of static fallback files by the rendering side.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::format_ts;

pub struct SettingsRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SettingsRepository {
    pub(super) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT value FROM site_settings WHERE key = ?1",
            params![key],
            |r| r.get(0),
        )
        .optional()
        .context("querying site setting")
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO site_settings (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
             updated_at = excluded.updated_at",
            params![key, value, format_ts(Utc::now())],
        )
        .context("writing site setting")?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let n = conn
            .execute("DELETE FROM site_settings WHERE key = ?1", params![key])
            .context("deleting site setting")?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::Database;

    #[tokio::test]
    async fn test_set_overwrites() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.settings();
        repo.set("header", "<nav>old</nav>").await.unwrap();
        repo.set("header", "<nav>new</nav>").await.unwrap();
        assert_eq!(
            repo.get("header").await.unwrap().as_deref(),
            Some("<nav>new</nav>")
        );
        assert!(repo.delete("header").await.unwrap());
        assert!(repo.get("header").await.unwrap().is_none());
    }
}
