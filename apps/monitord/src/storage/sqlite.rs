use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::params;

use super::Storage;
use super::migrations::run_migrations;
use super::pool::{LibsqlManager, LibsqlPool};
use crate::monitor::{CheckStatus, HealthCheck};

const TAG_SEPARATOR: &str = ",";

/// SQLite store for health checks, backed by a pool of libsql connections
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    /// Open (or create) the database at `path` and bring its schema up to date
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create database directory {}", parent.display()))?;
        }

        let database = libsql::Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("failed to open database {}", path.display()))?;
        let pool = deadpool::managed::Pool::builder(LibsqlManager::new(database)).build()?;
        let store = Self { pool };

        let conn = store.get_conn().await?;
        run_migrations(&conn).await?;

        Ok(store)
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    /// Most recent checks for `url`, newest first
    pub async fn recent_checks(&self, url: &str, limit: usize) -> Result<Vec<HealthCheck>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT name, url, status, status_code, response_time, timestamp, error, tags FROM health_checks WHERE url = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
                params![url, limit as i64],
            )
            .await?;

        let mut checks = Vec::new();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(2)?;
            let timestamp: String = row.get(5)?;
            let tags: Option<String> = row.get(7)?;

            checks.push(HealthCheck {
                name: row.get(0)?,
                url: row.get(1)?,
                status: status.parse::<CheckStatus>().map_err(anyhow::Error::msg)?,
                status_code: row.get::<Option<i64>>(3)?.map(u16::try_from).transpose()?,
                response_time_ms: row.get::<Option<i64>>(4)?.map(u64::try_from).transpose()?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)?.with_timezone(&Utc),
                error_message: row.get(6)?,
                tags: tags
                    .map(|tags| {
                        tags.split(TAG_SEPARATOR)
                            .filter(|tag| !tag.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            });
        }

        Ok(checks)
    }
}

#[async_trait]
impl Storage for LibsqlStore {
    async fn save_check(&self, check: &HealthCheck) -> Result<()> {
        let conn = self.get_conn().await?;
        let tags = (!check.tags.is_empty()).then(|| check.tags.join(TAG_SEPARATOR));
        let response_time = check.response_time_ms.map(i64::try_from).transpose()?;

        conn.execute(
            "INSERT INTO health_checks (name, url, status, status_code, response_time, timestamp, error, tags) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                check.name.clone(),
                check.url.clone(),
                check.status.as_str(),
                check.status_code.map(i64::from),
                response_time,
                check.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                check.error_message.clone(),
                tags
            ],
        )
        .await
        .with_context(|| format!("failed to save check for {}", check.url))?;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close();
        Ok(())
    }
}
