//! Database migrations

use crate::error::{Error, Result};
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;
    if version > CURRENT_VERSION {
        return Err(Error::CouldNotOpenStore(format!(
            "schema version {version} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Apply a batch of statements atomically
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            libsql::params![i64::from(version)],
        )
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: clocks, operation log, and check-in records
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Owner site and the store-global Lamport clock
        "CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        // Next operation index to allocate, per site
        "CREATE TABLE IF NOT EXISTS site_indices (
            site_id TEXT PRIMARY KEY,
            next_index INTEGER NOT NULL
        )",
        // Operation log: (site, index) produced the record (target_site, target_index)
        "CREATE TABLE IF NOT EXISTS operations (
            site_id TEXT NOT NULL,
            operation_index INTEGER NOT NULL,
            target_site TEXT NOT NULL,
            target_index INTEGER NOT NULL,
            PRIMARY KEY (site_id, operation_index)
        )",
        "CREATE TABLE IF NOT EXISTS checkins (
            site_id TEXT NOT NULL,
            operation_index INTEGER NOT NULL,
            lamport INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            checkin_time INTEGER NOT NULL,
            drink_name TEXT,
            drink_style TEXT NOT NULL,
            drink_abv REAL NOT NULL,
            drink_price REAL,
            drink_volume_ml REAL NOT NULL,
            external_id INTEGER,
            external_approved INTEGER NOT NULL DEFAULT 0,
            last_op_site TEXT NOT NULL,
            last_op_index INTEGER NOT NULL,
            PRIMARY KEY (site_id, operation_index)
        )",
        "CREATE INDEX IF NOT EXISTS idx_checkins_time ON checkins(checkin_time)",
        "CREATE INDEX IF NOT EXISTS idx_checkins_created ON checkins(created_at DESC)",
        // External-id lookups and staged imports
        "CREATE INDEX IF NOT EXISTS idx_checkins_external ON checkins(external_id)
         WHERE external_id IS NOT NULL",
        "CREATE INDEX IF NOT EXISTS idx_checkins_pending ON checkins(external_approved, is_deleted)
         WHERE external_id IS NOT NULL",
    ];

    apply(conn, 1, &statements).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn schema_object_exists(conn: &Connection, kind: &str, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = ? AND name = ?
                )",
                [kind, name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_newer_schema_is_refused() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            libsql::params![i64::from(CURRENT_VERSION + 1)],
        )
        .await
        .unwrap();

        assert!(matches!(
            run(&conn).await,
            Err(Error::CouldNotOpenStore(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_creates_store_tables() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in ["store_meta", "site_indices", "operations", "checkins"] {
            assert!(
                schema_object_exists(&conn, "table", table).await,
                "missing table {table}"
            );
        }
        for index in ["idx_checkins_time", "idx_checkins_external", "idx_checkins_pending"] {
            assert!(
                schema_object_exists(&conn, "index", index).await,
                "missing index {index}"
            );
        }
    }
}
