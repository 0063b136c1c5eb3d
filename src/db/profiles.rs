use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tokio_rusqlite::{Connection, params, rusqlite};

use crate::core::IngestionProfile;

/// Profile as stored: list and drive snapshot columns hold JSON.
struct ProfileRow {
    id: String,
    serial: String,
    copy_to: String,
    allowed_extensions: Option<String>,
    copy_on_attach: Option<bool>,
    device_details: String,
    created_at: String,
    updated_at: String,
}

impl ProfileRow {
    fn into_profile(self) -> Result<IngestionProfile> {
        let allowed_extensions = self
            .allowed_extensions
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .context("Invalid allowed_extensions column")?;

        Ok(IngestionProfile {
            id: self.id,
            serial: self.serial,
            copy_to: PathBuf::from(self.copy_to),
            allowed_extensions,
            copy_on_attach: self.copy_on_attach,
            device_details: serde_json::from_str(&self.device_details)
                .context("Invalid device_details column")?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp {}", value))?
        .with_timezone(&Utc))
}

pub async fn create(conn: &Connection, profile: IngestionProfile) -> Result<()> {
    let allowed_extensions = profile
        .allowed_extensions
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let device_details = serde_json::to_string(&profile.device_details)?;
    let serial = profile.serial.clone();

    conn.call(move |c| {
        c.execute(
            "INSERT INTO ingestion_profiles
                (id, serial, copy_to, allowed_extensions, copy_on_attach,
                 device_details, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &profile.id,
                &profile.serial,
                profile.copy_to.to_string_lossy().into_owned(),
                allowed_extensions,
                profile.copy_on_attach,
                device_details,
                profile.created_at.to_rfc3339(),
                profile.updated_at.to_rfc3339(),
            ],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await
    .map_err(|e| anyhow!("Failed to register profile for {}: {}", serial, e))
}

pub async fn list(conn: &Connection) -> Result<Vec<IngestionProfile>> {
    let rows = conn
        .call(|c| {
            let mut stmt = c.prepare(
                "SELECT id, serial, copy_to, allowed_extensions, copy_on_attach,
                        device_details, created_at, updated_at
                 FROM ingestion_profiles
                 ORDER BY created_at",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(ProfileRow {
                        id: row.get(0)?,
                        serial: row.get(1)?,
                        copy_to: row.get(2)?,
                        allowed_extensions: row.get(3)?,
                        copy_on_attach: row.get(4)?,
                        device_details: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok::<_, rusqlite::Error>(rows)
        })
        .await
        .map_err(|e| anyhow!("Failed to list profiles: {}", e))?;

    rows.into_iter().map(ProfileRow::into_profile).collect()
}

pub async fn exists(conn: &Connection, serial: String) -> Result<bool> {
    conn.call(move |c| {
        let count: i64 = c.query_row(
            "SELECT COUNT(*) FROM ingestion_profiles WHERE serial = ?1",
            params![serial],
            |row| row.get(0),
        )?;
        Ok::<_, rusqlite::Error>(count > 0)
    })
    .await
    .map_err(|e| anyhow!("Failed to look up profile: {}", e))
}
