pub mod comments;
pub mod feed;
pub mod images;
pub mod likes;
pub mod models;
pub mod posts;
pub mod tags;
pub mod users;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::state::DbPool;

pub const SCHEMA: &str = include_str!("../../migrations/schema.sql");

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Foreign keys are per-connection in SQLite, so every pooled connection
    // gets the pragmas.
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )
    });
    let pool = Pool::builder().max_size(8).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;

    Ok(pool)
}

/// Drop every table and recreate the schema. Destroys all data.
pub fn init_schema(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;
    tracing::info!("Database schema initialized");
    Ok(())
}

/// Create the schema only when the database is empty.
pub fn ensure_schema(pool: &DbPool) -> anyhow::Result<()> {
    let exists: bool = {
        let conn = pool.get()?;
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'user'",
            [],
            |row| row.get(0),
        )?
    };

    if !exists {
        init_schema(pool)?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn create_pool_creates_db_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sub/dir/test.db");
        let pool = create_pool(&db_path).unwrap();
        assert!(db_path.exists());
        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn every_connection_enforces_foreign_keys() {
        let (_tmp, pool) = test_pool();
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        for conn in [&a, &b] {
            let on: bool = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .unwrap();
            assert!(on);
        }
    }

    #[test]
    fn schema_creates_expected_tables() {
        let (_tmp, pool) = test_pool();
        let conn = pool.get().unwrap();
        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap()
        };
        for table in [
            "comments", "images", "likes", "post", "post_tag", "sessions", "tags", "user",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn init_schema_wipes_existing_data() {
        let (_tmp, pool) = test_pool();
        {
            let conn = pool.get().unwrap();
            let uid = insert_user(&conn, "alice");
            insert_post(&conn, uid, "t", "b");
        }

        init_schema(&pool).unwrap();

        let conn = pool.get().unwrap();
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM user", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 0);
    }

    #[test]
    fn ensure_schema_keeps_existing_data() {
        let (_tmp, pool) = test_pool();
        {
            let conn = pool.get().unwrap();
            insert_user(&conn, "alice");
        }

        ensure_schema(&pool).unwrap();

        let conn = pool.get().unwrap();
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM user", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 1);
    }

    #[test]
    fn foreign_keys_enforced() {
        let (_tmp, pool) = test_pool();
        let conn = pool.get().unwrap();
        let result = conn.execute(
            "INSERT INTO post (title, body, author_id) VALUES ('t', 'b', 999)",
            [],
        );
        assert!(result.is_err());
    }
}
