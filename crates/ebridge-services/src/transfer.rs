//! File transfer service.
//!
//! Three operations: upload a payload to the bank, download pending files,
//! and run the registered processor over a downloaded file. Upload and
//! download validate the connection, identity and format before any
//! provider call; a rejected request returns an error and nothing is
//! persisted. Processing is model-level and infallible from the caller's
//! point of view: a processor failure is recorded on the transfer, which
//! stays in `draft`, and only a missing processor registration surfaces as
//! an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};

use ebridge_core::config::ProviderConfig;
use ebridge_core::models::{
    Connection, ConnectionState, FileFormat, FileTransfer, TransferDirection, UserIdentity,
};
use ebridge_core::AppError;

use crate::processor::ProcessorRegistry;
use crate::provider::{bounded, KeyProvider, RawFile, UploadReceipt};

/// A downloaded file paired with the display name it will be stored under.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub name: String,
    pub data: Vec<u8>,
}

pub struct TransferService {
    provider: Arc<dyn KeyProvider>,
    registry: Arc<ProcessorRegistry>,
    call_timeout: Duration,
}

impl TransferService {
    pub fn new(
        provider: Arc<dyn KeyProvider>,
        registry: Arc<ProcessorRegistry>,
        config: &ProviderConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            call_timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    /// Submit one payload to the bank. On acceptance the returned receipt's
    /// order id is for the caller to record on the stored transfer; on any
    /// rejection nothing must be persisted.
    #[tracing::instrument(skip_all, fields(connection = %connection.host_id, format = %format.name))]
    pub async fn upload(
        &self,
        connection: &Connection,
        identity: &UserIdentity,
        format: &FileFormat,
        payload: &[u8],
    ) -> Result<UploadReceipt, AppError> {
        Self::check_connection(connection)?;
        Self::check_identity(identity, TransferDirection::Up)?;
        if format.direction != TransferDirection::Up {
            return Err(AppError::InvalidInput(format!(
                "format '{}' is not an upload format",
                format.name
            )));
        }
        if payload.is_empty() {
            return Err(AppError::InvalidInput("upload payload is empty".into()));
        }

        let receipt = bounded(
            self.call_timeout,
            "upload",
            self.provider.upload(connection, identity, format, payload),
        )
        .await?;
        tracing::info!(order_id = %receipt.order_id, "upload accepted");
        Ok(receipt)
    }

    /// The note line recorded on a stored upload transfer.
    pub fn upload_note(receipt: &UploadReceipt) -> String {
        format!("EBICS OrderID: {}", receipt.order_id)
    }

    /// Fetch all pending files for one download format. Returns the files
    /// with generated display names; the caller stores each as a `draft`
    /// transfer. An empty result is a normal outcome.
    #[tracing::instrument(skip_all, fields(connection = %connection.host_id, format = %format.name))]
    pub async fn download(
        &self,
        connection: &Connection,
        identity: &UserIdentity,
        format: &FileFormat,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<Vec<DownloadedFile>, AppError> {
        Self::check_connection(connection)?;
        Self::check_identity(identity, TransferDirection::Down)?;
        if format.direction != TransferDirection::Down {
            return Err(AppError::InvalidInput(format!(
                "format '{}' is not a download format",
                format.name
            )));
        }

        let raw = bounded(
            self.call_timeout,
            "download",
            self.provider
                .download(connection, identity, format, date_from, date_to),
        )
        .await?;
        tracing::info!(files = raw.len(), "download complete");

        let files = raw
            .into_iter()
            .map(|RawFile { name, data }| DownloadedFile {
                name: name.unwrap_or_else(|| format.transfer_name(&connection.host_id, Utc::now())),
                data,
            })
            .collect();
        Ok(files)
    }

    /// Run the registered processor over a downloaded transfer. Returns
    /// `true` when processing succeeded and the transfer moved to `done`;
    /// `false` when the processor reported a failure, in which case the
    /// transfer stays in `draft` with the failure on its process note.
    #[tracing::instrument(skip_all, fields(transfer = %transfer.name))]
    pub async fn process(
        &self,
        transfer: &mut FileTransfer,
        format: &FileFormat,
    ) -> Result<bool, AppError> {
        if !transfer.can_process() {
            return Err(AppError::invalid_transition(transfer.state, "process"));
        }
        let key = format.processor_key.as_deref().ok_or_else(|| {
            AppError::Configuration(format!("format '{}' has no processor key", format.name))
        })?;
        let processor = self.registry.get(key)?;

        match processor.process(&transfer.name, &transfer.payload).await {
            Ok(outcome) => {
                transfer.record_process_success(outcome.created_record_ids, outcome.summary);
                tracing::info!("transfer processed");
                Ok(true)
            }
            Err(detail) => {
                tracing::warn!("processing failed: {}", detail);
                transfer.record_process_failure(detail);
                Ok(false)
            }
        }
    }

    fn check_connection(connection: &Connection) -> Result<(), AppError> {
        if connection.state != ConnectionState::Confirm {
            return Err(AppError::Configuration(format!(
                "connection '{}' is not confirmed for use",
                connection.name
            )));
        }
        Ok(())
    }

    fn check_identity(identity: &UserIdentity, direction: TransferDirection) -> Result<(), AppError> {
        if !identity.is_usable() {
            return Err(AppError::Configuration(format!(
                "identity '{}' is not active with a stored passphrase",
                identity.name
            )));
        }
        let allowed = match direction {
            TransferDirection::Up => identity.transaction_rights.allows_upload(),
            TransferDirection::Down => identity.transaction_rights.allows_download(),
        };
        if !allowed {
            return Err(AppError::Unauthorized(format!(
                "identity '{}' has no {} right",
                identity.name,
                match direction {
                    TransferDirection::Up => "upload",
                    TransferDirection::Down => "download",
                }
            )));
        }
        Ok(())
    }
}
