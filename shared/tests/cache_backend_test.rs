// Cache proxy backends against live services.
//
// Redis:      REDIS_URL       (default redis://127.0.0.1:6379, database 15)
// PostgreSQL: DATABASE_HOST / DATABASE_PORT / DATABASE_USER / DATABASE_PASSWORD
//             DATABASE_NAME   (default localhost:5432 postgres/postgres)

use reprocess_config::{CacheBackendKind, CacheConfig, CacheCredentials, SecureString};
use reprocess_error::ReprocessError;
use reprocess_redis::RedisClient;
use reprocess_shared::cache_proxy::{CacheProxy, PostgresCacheProxy, RedisCacheProxy};
use reprocess_types::{Identifier, IdentifierShape};
use serial_test::serial;
use std::env;
use std::time::Duration;

const TEST_REDIS_DB: &str = "15";
const TEST_TABLE: &str = "cache_reprocess_test";

fn ids(raw: &[&str]) -> Vec<Identifier> {
    raw.iter()
        .map(|r| Identifier::parse(r, IdentifierShape::default()).unwrap())
        .collect()
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

// ============================================================================
// Redis
// ============================================================================

fn redis_config() -> CacheConfig {
    CacheConfig {
        backend: CacheBackendKind::Redis,
        host: env_or("REDIS_HOST", "127.0.0.1"),
        port: env_or("REDIS_PORT", "6379").parse().unwrap(),
        credentials: CacheCredentials {
            username: None,
            password: SecureString::from(env_or("REDIS_PASSWORD", "")),
        },
        database: TEST_REDIS_DB.to_string(),
        table: None,
        timeout: Duration::from_secs(5),
        slow_request_threshold: Duration::from_millis(100),
    }
}

async fn seeded_redis() -> RedisCacheProxy {
    let config = redis_config();
    let url = format!(
        "redis://{}:{}/{}",
        config.host, config.port, TEST_REDIS_DB
    );
    let mut client = RedisClient::connect(&url).await.unwrap();

    client.del(&["u100", "u101", "u102", "u103"]).await.unwrap();
    for id in ["u100", "u101"] {
        client
            .hset_multiple(
                id,
                &[
                    ("type", b"marc".as_slice()),
                    ("source", b"sirsi".as_slice()),
                    ("payload", b"<record/>".as_slice()),
                ],
            )
            .await
            .unwrap();
    }
    // No payload field
    client
        .hset_multiple("u102", &[("type", b"marc".as_slice()), ("source", b"sirsi".as_slice())])
        .await
        .unwrap();

    RedisCacheProxy::from_client(client, &config)
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_redis_exists_reports_missing_keys() {
    let cache = seeded_redis().await;

    cache.exists(&ids(&["u100", "u101", "u102"])).await.unwrap();

    match cache.exists(&ids(&["u100", "u103"])).await {
        Err(ReprocessError::NotInCache { missing }) => assert_eq!(missing, vec!["u103"]),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_redis_get_drops_incomplete_entries() {
    let cache = seeded_redis().await;

    let messages = cache.get(&ids(&["u100", "u102", "u103", "u101"])).await.unwrap();
    let got: Vec<&str> = messages.iter().filter_map(|m| m.record_id()).collect();
    assert_eq!(got, vec!["u100", "u101"]);
    assert_eq!(messages[0].payload().as_ref(), b"<record/>");
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_redis_get_collapses_duplicate_ids() {
    let cache = seeded_redis().await;

    let messages = cache.get(&ids(&["u101", "u100", "u101", "u101"])).await.unwrap();
    let got: Vec<&str> = messages.iter().filter_map(|m| m.record_id()).collect();
    assert_eq!(got, vec!["u101", "u100"]);
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn test_redis_connect_via_config() {
    let cache = RedisCacheProxy::connect(&redis_config()).await.unwrap();
    assert_eq!(cache.backend(), "redis");
}

// ============================================================================
// PostgreSQL
// ============================================================================

fn postgres_config() -> CacheConfig {
    CacheConfig {
        backend: CacheBackendKind::Postgres,
        host: env_or("DATABASE_HOST", "localhost"),
        port: env_or("DATABASE_PORT", "5432").parse().unwrap(),
        credentials: CacheCredentials {
            username: Some(env_or("DATABASE_USER", "postgres")),
            password: SecureString::from(env_or("DATABASE_PASSWORD", "postgres")),
        },
        database: env_or("DATABASE_NAME", "postgres"),
        table: Some(TEST_TABLE.to_string()),
        timeout: Duration::from_secs(5),
        slow_request_threshold: Duration::from_millis(100),
    }
}

async fn seeded_postgres() -> PostgresCacheProxy {
    let config = postgres_config();
    let cache = PostgresCacheProxy::connect(&config, 2).await.unwrap();
    let pool = cache.pool();

    sqlx::query(&format!("DROP TABLE IF EXISTS {TEST_TABLE}"))
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(&format!(
        "CREATE TABLE {TEST_TABLE} (id TEXT PRIMARY KEY, type TEXT, source TEXT, payload TEXT)"
    ))
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(&format!(
        "INSERT INTO {TEST_TABLE} (id, type, source, payload) VALUES \
         ('u200', 'marc', 'sirsi', '<a/>'), \
         ('u201', 'marc', 'sirsi', '<b/>'), \
         ('u202', 'marc', NULL, '<c/>')"
    ))
    .execute(pool)
    .await
    .unwrap();

    cache
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn test_postgres_exists_is_set_difference() {
    let cache = seeded_postgres().await;

    cache.exists(&ids(&["u200", "u201", "u202"])).await.unwrap();

    match cache.exists(&ids(&["u200", "u299", "u298"])).await {
        Err(ReprocessError::NotInCache { mut missing }) => {
            missing.sort();
            assert_eq!(missing, vec!["u298", "u299"]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn test_postgres_get_keeps_request_order() {
    let cache = seeded_postgres().await;

    let messages = cache.get(&ids(&["u201", "u202", "u200"])).await.unwrap();
    let got: Vec<&str> = messages.iter().filter_map(|m| m.record_id()).collect();
    assert_eq!(got, vec!["u201", "u200"]);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn test_postgres_get_collapses_duplicate_ids() {
    let cache = seeded_postgres().await;

    let messages = cache.get(&ids(&["u201", "u200", "u201", "u201"])).await.unwrap();
    let got: Vec<&str> = messages.iter().filter_map(|m| m.record_id()).collect();
    assert_eq!(got, vec!["u201", "u200"]);
}
