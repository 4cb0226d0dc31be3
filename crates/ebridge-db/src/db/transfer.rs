//! File transfer repository

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use ebridge_core::models::{FileTransfer, TransferDirection, TransferState};

const TRANSFER_COLUMNS: &str = "id, connection_id, identity_id, format_id, direction, name, \
     payload, date_from, date_to, state, note, process_note, created_record_ids, \
     created_at, updated_at";

#[derive(Clone)]
pub struct TransferRepository {
    pool: PgPool,
}

impl TransferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a transfer record. The unique constraint on
    /// (connection, format, name) refuses re-importing the same file.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        connection_id: Uuid,
        identity_id: Uuid,
        format_id: Uuid,
        direction: TransferDirection,
        name: &str,
        payload: &[u8],
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
        state: TransferState,
        note: &str,
    ) -> Result<FileTransfer> {
        let now = Utc::now();
        let transfer = sqlx::query_as::<Postgres, FileTransfer>(&format!(
            r#"
            INSERT INTO file_transfers (
                connection_id, identity_id, format_id, direction, name,
                payload, date_from, date_to, state, note,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING {TRANSFER_COLUMNS}
            "#
        ))
        .bind(connection_id)
        .bind(identity_id)
        .bind(format_id)
        .bind(direction)
        .bind(name)
        .bind(payload)
        .bind(date_from)
        .bind(date_to)
        .bind(state)
        .bind(note)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create file transfer")?;
        Ok(transfer)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<FileTransfer>> {
        let transfer = sqlx::query_as::<Postgres, FileTransfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM file_transfers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get file transfer")?;
        Ok(transfer)
    }

    /// Persist state, notes and created-record links after a transition.
    pub async fn update(&self, transfer: &FileTransfer) -> Result<FileTransfer> {
        let updated = sqlx::query_as::<Postgres, FileTransfer>(&format!(
            r#"
            UPDATE file_transfers
            SET state = $2, note = $3, process_note = $4,
                created_record_ids = $5, updated_at = $6
            WHERE id = $1
            RETURNING {TRANSFER_COLUMNS}
            "#
        ))
        .bind(transfer.id)
        .bind(transfer.state)
        .bind(&transfer.note)
        .bind(&transfer.process_note)
        .bind(&transfer.created_record_ids)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to update file transfer")?;
        Ok(updated)
    }

    /// Transfers are the audit record: deletion is refused once done.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let Some(transfer) = self.get(id).await? else {
            bail!("file transfer {} not found", id);
        };
        if !transfer.can_delete() {
            bail!("file transfers in state 'done' cannot be removed");
        }
        sqlx::query("DELETE FROM file_transfers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete file transfer")?;
        Ok(())
    }

    pub async fn add_to_run(&self, run_id: Uuid, transfer_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO batch_run_transfers (run_id, transfer_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(run_id)
        .bind(transfer_id)
        .execute(&self.pool)
        .await
        .context("Failed to attach transfer to batch run")?;
        Ok(())
    }

    /// All transfers of a run in creation order (the reprocess sweep order).
    pub async fn list_for_run(&self, run_id: Uuid) -> Result<Vec<FileTransfer>> {
        let rows = sqlx::query_as::<Postgres, FileTransfer>(&format!(
            r#"
            SELECT {TRANSFER_COLUMNS}
            FROM file_transfers
            WHERE id IN (SELECT transfer_id FROM batch_run_transfers WHERE run_id = $1)
            ORDER BY created_at ASC
            "#
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transfers for batch run")?;
        Ok(rows)
    }

    pub async fn any_draft_for_run(&self, run_id: Uuid) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM file_transfers
                WHERE state = 'draft'
                  AND id IN (SELECT transfer_id FROM batch_run_transfers WHERE run_id = $1)
            )
            "#,
        )
        .bind(run_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check for draft transfers in batch run")?;
        Ok(row.0)
    }
}
