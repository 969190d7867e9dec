//! Database connection management

use crate::error::{Error, Result};
use crate::models::SiteId;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

const OWNER_SITE_KEY: &str = "owner_site";

/// Database wrapper for libSQL connections
pub struct Database {
    // Owns the underlying handle; the connection is only valid while it lives.
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        Self::open_with(&path_str).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_with(":memory:").await
    }

    async fn open_with(location: &str) -> Result<Self> {
        let db = Builder::new_local(location)
            .build()
            .await
            .map_err(|error| Error::CouldNotOpenStore(format!("{location}: {error}")))?;
        let conn = db
            .connect()
            .map_err(|error| Error::CouldNotOpenStore(format!("{location}: {error}")))?;

        let database = Self { _db: db, conn };
        database
            .configure()
            .await
            .map_err(|error| Error::CouldNotOpenStore(format!("{location}: {error}")))?;
        database
            .migrate()
            .await
            .map_err(|error| Error::CouldNotOpenStore(format!("migration failed: {error}")))?;
        Ok(database)
    }

    /// Configure `SQLite` for optimal performance
    async fn configure(&self) -> Result<()> {
        // journal_mode is a no-op for in-memory databases
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// The site that owns this store, assigned on first call and stable afterwards
    pub async fn owner_site(&self) -> Result<SiteId> {
        if let Some(site) = self.stored_owner_site().await? {
            return Ok(site);
        }

        let site = SiteId::new();
        self.conn
            .execute(
                "INSERT OR IGNORE INTO store_meta (key, value) VALUES (?, ?)",
                libsql::params![OWNER_SITE_KEY, site.as_str()],
            )
            .await?;
        // Another opener may have raced us to it
        let site = self
            .stored_owner_site()
            .await?
            .ok_or_else(|| Error::Internal("owner site was not persisted".into()))?;
        tracing::info!("Assigned site id {site} to this store");
        Ok(site)
    }

    /// Pin the owning site, e.g. when restoring an installation identity
    pub async fn set_owner_site(&self, site: SiteId) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO store_meta (key, value) VALUES (?, ?)",
                libsql::params![OWNER_SITE_KEY, site.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn stored_owner_site(&self) -> Result<Option<SiteId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM store_meta WHERE key = ?",
                [OWNER_SITE_KEY],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let value: String = row.get(0)?;
        value
            .parse()
            .map(Some)
            .map_err(|_| Error::Internal(format!("corrupt owner site id: {value}")))
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        let mut rows = db.connection().query("SELECT 1", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_owner_site_is_stable() {
        let db = Database::open_in_memory().await.unwrap();
        let first = db.owner_site().await.unwrap();
        let second = db.owner_site().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_owner_site_survives_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("spirits.db");

        let site = {
            let db = Database::open(&path).await.unwrap();
            db.owner_site().await.unwrap()
        };

        let db = Database::open(&path).await.unwrap();
        assert_eq!(db.owner_site().await.unwrap(), site);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_owner_site_overrides() {
        let db = Database::open_in_memory().await.unwrap();
        db.owner_site().await.unwrap();

        let pinned = SiteId::new();
        db.set_owner_site(pinned).await.unwrap();
        assert_eq!(db.owner_site().await.unwrap(), pinned);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_rejects_non_database_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("garbage.db");
        std::fs::write(&path, b"definitely not sqlite, just some bytes padded out to look like a header......").unwrap();

        let result = Database::open(&path).await;
        assert!(matches!(result, Err(Error::CouldNotOpenStore(_))));
    }
}
