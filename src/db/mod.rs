use std::path::Path;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio_rusqlite::Connection;

use crate::core::{IngestionActionRecord, IngestionProfile, Registry};

pub mod actions;
pub mod profiles;

pub async fn init(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .await
        .map_err(|e| anyhow!("Failed to open database {}: {}", path.display(), e))?;

    conn.call(|conn| {
        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;

        // Make every append durable before the call returns.
        conn.pragma_update(None, "synchronous", "FULL")?;

        Ok::<(), tokio_rusqlite::rusqlite::Error>(())
    })
    .await
    .map_err(|e| anyhow!("Failed to initialise database schema: {}", e))?;

    Ok(conn)
}

/// Registry backed by a SQLite database file.
#[derive(Clone)]
pub struct SqliteRegistry {
    conn: Connection,
}

impl SqliteRegistry {
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: init(path).await?,
        })
    }
}

#[async_trait]
impl Registry for SqliteRegistry {
    async fn profiles(&self) -> Result<Vec<IngestionProfile>> {
        profiles::list(&self.conn).await
    }

    async fn profile_exists(&self, serial: &str) -> Result<bool> {
        profiles::exists(&self.conn, serial.to_string()).await
    }

    async fn register(&self, profile: IngestionProfile) -> Result<()> {
        profiles::create(&self.conn, profile).await
    }

    async fn append_action(&self, record: IngestionActionRecord) -> Result<()> {
        actions::append(&self.conn, record).await
    }

    async fn actions(&self, serial: Option<&str>) -> Result<Vec<IngestionActionRecord>> {
        actions::list(&self.conn, serial.map(str::to_string)).await
    }
}
