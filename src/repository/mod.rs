//! SQLite persistence for media assets, content items and site settings.
//!
//! One connection wrapped in an async mutex; every write is an upsert keyed
//! by natural identity (path, or source URL + provider), so concurrent or
//! repeated runs converge instead of diverging.

pub mod content;
pub mod media;
pub mod settings;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

pub use content::{ContentRepository, ContentUpsert};
pub use media::{MediaRepository, MediaUpsert};
pub use settings::SettingsRepository;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS media_assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_url TEXT NOT NULL,
    provider TEXT NOT NULL,
    key TEXT NOT NULL,
    url TEXT NOT NULL,
    filename TEXT NOT NULL,
    mime_type TEXT,
    bytes INTEGER,
    created_at TEXT NOT NULL,
    UNIQUE(source_url, provider)
);

CREATE TABLE IF NOT EXISTS content_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    status TEXT NOT NULL,
    blocks TEXT NOT NULL,
    legacy_wp_id INTEGER,
    legacy_body_class TEXT,
    seo_title TEXT,
    seo_desc TEXT,
    published_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS site_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Shared database handle. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database at {}", path.display()))?;
        conn.execute_batch(SCHEMA).context("applying schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        conn.execute_batch(SCHEMA).context("applying schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn media(&self) -> MediaRepository {
        MediaRepository::new(self.conn.clone())
    }

    pub fn content(&self) -> ContentRepository {
        ContentRepository::new(self.conn.clone())
    }

    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.conn.clone())
    }
}

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp in database: {raw}"))?
        .with_timezone(&Utc))
}
