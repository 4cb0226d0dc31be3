//! Upload submission.
//!
//! Composes the provider upload with record keeping: the payload goes to
//! the bank first, and only a protocol-level acceptance produces a stored
//! transfer. The record is created directly in `done` with the bank's
//! order id on its note; a rejected submission persists nothing and the
//! error goes back to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use ebridge_core::models::{FileFormat, FileTransfer, TransferDirection, TransferState};
use ebridge_core::AppError;
use ebridge_db::{
    ConnectionRepository, FileFormatRepository, IdentityRepository, TransferRepository,
};
use ebridge_services::{ConnectionLocks, TransferService, UploadReceipt};

pub struct UploadService {
    connections: ConnectionRepository,
    identities: IdentityRepository,
    formats: FileFormatRepository,
    transfers: TransferRepository,
    transfer_service: Arc<TransferService>,
    locks: ConnectionLocks,
}

impl UploadService {
    pub fn new(
        pool: PgPool,
        transfer_service: Arc<TransferService>,
        locks: ConnectionLocks,
    ) -> Self {
        Self {
            connections: ConnectionRepository::new(pool.clone()),
            identities: IdentityRepository::new(pool.clone()),
            formats: FileFormatRepository::new(pool.clone()),
            transfers: TransferRepository::new(pool),
            transfer_service,
            locks,
        }
    }

    /// Submit one payload over a connection and store the accepted upload.
    #[tracing::instrument(skip(self, payload))]
    pub async fn submit(
        &self,
        connection_id: Uuid,
        identity_id: Uuid,
        format_id: Uuid,
        payload: &[u8],
    ) -> Result<FileTransfer, AppError> {
        let connection = self
            .connections
            .get(connection_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("connection {}", connection_id)))?;
        let identity = self
            .identities
            .get(identity_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("identity {}", identity_id)))?;
        let format = self
            .formats
            .get(format_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file format {}", format_id)))?;

        let lock = self.locks.for_connection(connection.id);
        let _guard = lock.lock().await;

        // Validation and the provider call; on rejection nothing is stored.
        let receipt = self
            .transfer_service
            .upload(&connection, &identity, &format, payload)
            .await?;

        let (name, note) = upload_record(&format, &connection.host_id, &receipt, Utc::now());
        let transfer = self
            .transfers
            .create(
                connection.id,
                identity.id,
                format.id,
                TransferDirection::Up,
                &name,
                payload,
                None,
                None,
                TransferState::Done,
                &note,
            )
            .await?;
        tracing::info!(transfer = %transfer.name, order_id = %receipt.order_id, "upload stored");
        Ok(transfer)
    }
}

/// Display name and note for an accepted upload.
fn upload_record(
    format: &FileFormat,
    host_id: &str,
    receipt: &UploadReceipt,
    at: DateTime<Utc>,
) -> (String, String) {
    (
        format.transfer_name(host_id, at),
        TransferService::upload_note(receipt),
    )
}
