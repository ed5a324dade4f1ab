//! # Reprocess Database
//!
//! Connection pooling and record lookups for the relational cache backend.
//!
//! The cache table holds one row per record:
//!
//! ```sql
//! CREATE TABLE source_cache (
//!     id      TEXT PRIMARY KEY,
//!     "type"  TEXT,
//!     source  TEXT,
//!     payload TEXT
//! );
//! ```
//!
//! The table name comes from configuration and is validated there as a plain
//! SQL identifier before it ever reaches a query string.

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::time::Duration;

/// Database connection pool type
pub type DbPool = Pool<Postgres>;

/// One cache row; every column may be NULL
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CacheRow {
    pub id: String,
    pub record_type: Option<String>,
    pub source: Option<String>,
    pub payload: Option<String>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

/// Create a PostgreSQL connection pool
pub async fn create_pool(db_config: &DbConfig) -> sqlx::Result<DbPool> {
    let options = PgConnectOptions::new()
        .host(&db_config.host)
        .port(db_config.port)
        .database(&db_config.database)
        .username(&db_config.username)
        .password(&db_config.password);

    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .acquire_timeout(db_config.acquire_timeout)
        .test_before_acquire(true) // Test connections before returning from pool
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Which of the given ids have a row in the table (distinct, unordered)
pub async fn existing_ids(pool: &DbPool, table: &str, ids: &[String]) -> sqlx::Result<Vec<String>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!("SELECT DISTINCT id FROM {} WHERE id = ANY($1)", table);
    sqlx::query_scalar::<_, String>(&sql)
        .bind(ids)
        .fetch_all(pool)
        .await
}

/// Fetch the rows for the given ids; ids without a row are simply absent
pub async fn fetch_rows(pool: &DbPool, table: &str, ids: &[String]) -> sqlx::Result<Vec<CacheRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        r#"SELECT id, "type" AS record_type, source, payload FROM {} WHERE id = ANY($1)"#,
        table
    );
    sqlx::query_as::<_, CacheRow>(&sql)
        .bind(ids)
        .fetch_all(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running PostgreSQL instance
    // Run with: docker run -d -p 5432:5432 -e POSTGRES_PASSWORD=postgres postgres:16

    fn local_config() -> DbConfig {
        DbConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            max_connections: 2,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    #[ignore] // Requires PostgreSQL
    async fn test_lookup_roundtrip() -> sqlx::Result<()> {
        let pool = create_pool(&local_config()).await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS db_test_cache (id TEXT PRIMARY KEY, "type" TEXT, source TEXT, payload TEXT)"#,
        )
        .execute(&pool)
        .await?;
        sqlx::query("TRUNCATE db_test_cache").execute(&pool).await?;
        sqlx::query(r#"INSERT INTO db_test_cache (id, "type", source, payload) VALUES ('u1', 'marc', 'sirsi', '<xml/>'), ('u2', 'marc', NULL, 'x')"#)
            .execute(&pool)
            .await?;

        let ids = vec!["u1".to_string(), "u2".to_string(), "u3".to_string()];

        let mut found = existing_ids(&pool, "db_test_cache", &ids).await?;
        found.sort();
        assert_eq!(found, vec!["u1".to_string(), "u2".to_string()]);

        let mut rows = fetch_rows(&pool, "db_test_cache", &ids).await?;
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record_type.as_deref(), Some("marc"));
        assert_eq!(rows[1].source, None);

        sqlx::query("DROP TABLE db_test_cache").execute(&pool).await?;

        Ok(())
    }
}
