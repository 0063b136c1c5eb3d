use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tokio_rusqlite::{Connection, params, rusqlite};

use crate::core::IngestionActionRecord;

pub async fn append(conn: &Connection, record: IngestionActionRecord) -> Result<()> {
    conn.call(move |c| {
        c.execute(
            "INSERT INTO ingestion_actions (device_serial, filename, file_size, checksum)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &record.device_serial,
                record.filename.to_string_lossy().into_owned(),
                record.file_size as i64,
                &record.checksum,
            ],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await
    .map_err(|e| anyhow!("Failed to append ingestion action: {}", e))
}

/// Audit records in append order.
pub async fn list(conn: &Connection, serial: Option<String>) -> Result<Vec<IngestionActionRecord>> {
    conn.call(move |c| {
        let mut stmt = c.prepare(
            "SELECT device_serial, filename, file_size, checksum
             FROM ingestion_actions
             WHERE ?1 IS NULL OR device_serial = ?1
             ORDER BY id",
        )?;

        let records = stmt
            .query_map(params![serial], |row| {
                let filename: String = row.get(1)?;
                let file_size: i64 = row.get(2)?;
                Ok(IngestionActionRecord {
                    device_serial: row.get(0)?,
                    filename: PathBuf::from(filename),
                    file_size: file_size as u64,
                    checksum: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok::<_, rusqlite::Error>(records)
    })
    .await
    .map_err(|e| anyhow!("Failed to list ingestion actions: {}", e))
}
