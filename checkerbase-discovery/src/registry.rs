use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::{DiscoveryError, Result};
use crate::model::{Security, ServerConfig, Source, UsernameFormat};

fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<ServerConfig> {
    let hostname: String = row.try_get("hostname")?;
    let port: i64 = row.try_get("port")?;
    let security_raw: String = row.try_get("security")?;
    let username_format_raw: String = row.try_get("username_format")?;
    let source_raw: String = row.try_get("source")?;
    let priority: i64 = row.try_get("priority")?;

    let security = Security::from_db_str(&security_raw)
        .ok_or_else(|| DiscoveryError::InvalidData(format!("unknown security value: {security_raw}")))?;
    let username_format = UsernameFormat::from_db_str(&username_format_raw)
        .ok_or_else(|| DiscoveryError::InvalidData(format!("unknown username format value: {username_format_raw}")))?;
    let source = Source::from_db_str(&source_raw)
        .ok_or_else(|| DiscoveryError::InvalidData(format!("unknown source value: {source_raw}")))?;

    Ok(ServerConfig {
        hostname,
        port: port as u16,
        security,
        username_format,
        source,
        priority: priority as i32,
    })
}

/// Persistent cache of verified and candidate mail server configurations,
/// backed by a single-connection SQLite pool in WAL mode.
pub struct ServerRegistry {
    pool: SqlitePool,
}

impl ServerRegistry {
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

        let registry = Self { pool };
        registry.init_schema().await?;
        Ok(registry)
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
        let registry = Self { pool };
        registry.init_schema().await?;
        Ok(registry)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS verified_configs (
                domain TEXT PRIMARY KEY,
                hostname TEXT NOT NULL,
                port INTEGER NOT NULL,
                security TEXT NOT NULL,
                username_format TEXT NOT NULL,
                source TEXT NOT NULL,
                priority INTEGER NOT NULL,
                expires_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_verified_configs_expires_at ON verified_configs(expires_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS server_candidates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                hostname TEXT NOT NULL,
                port INTEGER NOT NULL,
                security TEXT NOT NULL,
                username_format TEXT NOT NULL,
                source TEXT NOT NULL,
                priority INTEGER NOT NULL,
                expires_at TEXT NOT NULL,
                UNIQUE(domain, hostname, port)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_server_candidates_domain ON server_candidates(domain)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_server_candidates_expires_at ON server_candidates(expires_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_verified(&self, domain: &str) -> Result<Option<ServerConfig>> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            "SELECT hostname, port, security, username_format, source, priority
             FROM verified_configs WHERE domain = ?1 AND expires_at > ?2",
        )
        .bind(domain)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_config).transpose()
    }

    pub async fn set_verified(&self, domain: &str, config: &ServerConfig, ttl: Duration) -> Result<()> {
        let expires_at = (Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default()).to_rfc3339();
        sqlx::query(
            "INSERT INTO verified_configs (domain, hostname, port, security, username_format, source, priority, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(domain) DO UPDATE SET
                hostname = excluded.hostname,
                port = excluded.port,
                security = excluded.security,
                username_format = excluded.username_format,
                source = excluded.source,
                priority = excluded.priority,
                expires_at = excluded.expires_at",
        )
        .bind(domain)
        .bind(&config.hostname)
        .bind(config.port as i64)
        .bind(config.security.as_db_str())
        .bind(config.username_format.as_db_str())
        .bind(config.source.as_db_str())
        .bind(config.priority)
        .bind(&expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Unexpired candidates for `domain`, most authoritative (lowest
    /// priority number) first.
    pub async fn get_candidates(&self, domain: &str) -> Result<Vec<ServerConfig>> {
        let now = Utc::now().to_rfc3339();
        let rows = sqlx::query(
            "SELECT hostname, port, security, username_format, source, priority
             FROM server_candidates WHERE domain = ?1 AND expires_at > ?2
             ORDER BY priority ASC",
        )
        .bind(domain)
        .bind(&now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_config).collect()
    }

    /// Replaces all cached candidates for `domain`. Tolerant of duplicate
    /// `(hostname, port)` pairs within `configs`: the first one wins.
    pub async fn set_candidates(&self, domain: &str, configs: &[ServerConfig], ttl: Duration) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM server_candidates WHERE domain = ?1")
            .bind(domain)
            .execute(&mut *tx)
            .await?;

        let expires_at = (Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default()).to_rfc3339();
        for config in configs {
            sqlx::query(
                "INSERT INTO server_candidates
                    (domain, hostname, port, security, username_format, source, priority, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(domain, hostname, port) DO NOTHING",
            )
            .bind(domain)
            .bind(&config.hostname)
            .bind(config.port as i64)
            .bind(config.security.as_db_str())
            .bind(config.username_format.as_db_str())
            .bind(config.source.as_db_str())
            .bind(config.priority)
            .bind(&expires_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn clean_expired(&self) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("DELETE FROM verified_configs WHERE expires_at <= ?1")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM server_candidates WHERE expires_at <= ?1")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
