//! File format repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use ebridge_core::models::{FileFormat, SignatureClass, TransferDirection};

const FORMAT_COLUMNS: &str = "id, connection_id, name, direction, order_type, suffix, \
     processor_key, signature_class, created_at, updated_at";

#[derive(Clone)]
pub struct FileFormatRepository {
    pool: PgPool,
}

impl FileFormatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        connection_id: Uuid,
        name: &str,
        direction: TransferDirection,
        order_type: &str,
        suffix: &str,
        processor_key: Option<&str>,
        signature_class: Option<SignatureClass>,
    ) -> Result<FileFormat> {
        let now = Utc::now();
        let format = sqlx::query_as::<Postgres, FileFormat>(&format!(
            r#"
            INSERT INTO file_formats (
                connection_id, name, direction, order_type, suffix,
                processor_key, signature_class, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {FORMAT_COLUMNS}
            "#
        ))
        .bind(connection_id)
        .bind(name)
        .bind(direction)
        .bind(order_type)
        .bind(suffix)
        .bind(processor_key)
        .bind(signature_class)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create file format")?;
        Ok(format)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<FileFormat>> {
        let format = sqlx::query_as::<Postgres, FileFormat>(&format!(
            "SELECT {FORMAT_COLUMNS} FROM file_formats WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get file format")?;
        Ok(format)
    }

    pub async fn list_for_connection(&self, connection_id: Uuid) -> Result<Vec<FileFormat>> {
        let rows = sqlx::query_as::<Postgres, FileFormat>(&format!(
            "SELECT {FORMAT_COLUMNS} FROM file_formats \
             WHERE connection_id = $1 ORDER BY direction, name ASC"
        ))
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list file formats")?;
        Ok(rows)
    }

    /// Download formats for a connection, the set swept by a batch run.
    pub async fn list_downloads(&self, connection_id: Uuid) -> Result<Vec<FileFormat>> {
        let rows = sqlx::query_as::<Postgres, FileFormat>(&format!(
            "SELECT {FORMAT_COLUMNS} FROM file_formats \
             WHERE connection_id = $1 AND direction = $2 ORDER BY name ASC"
        ))
        .bind(connection_id)
        .bind(TransferDirection::Down)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list download formats")?;
        Ok(rows)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM file_formats WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete file format")?;
        Ok(result.rows_affected() > 0)
    }
}
