//! Database operations for Mirrorcast

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{DbError, Result};

/// One posting attempt against a destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostRecord {
    pub id: Option<i64>,
    pub source_id: String,
    pub destination: String,
    pub destination_post_id: Option<String>,
    pub posted_at: i64,
    pub success: bool,
    pub error_message: Option<String>,
}

impl PostRecord {
    pub fn success(source_id: &str, destination: &str, destination_post_id: String) -> Self {
        Self {
            id: None,
            source_id: source_id.to_string(),
            destination: destination.to_string(),
            destination_post_id: Some(destination_post_id),
            posted_at: chrono::Utc::now().timestamp(),
            success: true,
            error_message: None,
        }
    }

    pub fn failure(source_id: &str, destination: &str, error: String) -> Self {
        Self {
            id: None,
            source_id: source_id.to_string(),
            destination: destination.to_string(),
            destination_post_id: None,
            posted_at: chrono::Utc::now().timestamp(),
            success: false,
            error_message: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database and run migrations
    ///
    /// `":memory:"` opens a private in-memory database on a single connection.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(DbError::SqlxError)?;
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options)
                .await
                .map_err(DbError::SqlxError)?
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);
            SqlitePool::connect_with(options)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Whether `item_id` is already recorded under `namespace`
    pub async fn is_seen(&self, namespace: &str, item_id: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM seen_items WHERE namespace = ? AND item_id = ?
            "#,
        )
        .bind(namespace)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.is_some())
    }

    /// Record `item_id` under `namespace`; repeated calls are harmless
    pub async fn mark_seen(&self, namespace: &str, item_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO seen_items (namespace, item_id, seen_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(namespace)
        .bind(item_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn seen_count(&self, namespace: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM seen_items WHERE namespace = ?
            "#,
        )
        .bind(namespace)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.get("count"))
    }

    /// Store a posting attempt
    pub async fn record_attempt(&self, record: &PostRecord) -> Result<()> {
        let success = if record.success { 1 } else { 0 };

        sqlx::query(
            r#"
            INSERT INTO post_records (source_id, destination, destination_post_id, posted_at, success, error_message)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.source_id)
        .bind(&record.destination)
        .bind(&record.destination_post_id)
        .bind(record.posted_at)
        .bind(success)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// All attempts for a source item, oldest first
    pub async fn records_for(&self, source_id: &str) -> Result<Vec<PostRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_id, destination, destination_post_id, posted_at, success, error_message
            FROM post_records
            WHERE source_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .into_iter()
            .map(|r| PostRecord {
                id: r.get("id"),
                source_id: r.get("source_id"),
                destination: r.get("destination"),
                destination_post_id: r.get("destination_post_id"),
                posted_at: r.get("posted_at"),
                success: r.get::<i64, _>("success") != 0,
                error_message: r.get("error_message"),
            })
            .collect())
    }
}
