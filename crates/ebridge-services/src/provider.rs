//! Key provider seam.
//!
//! Everything cryptographic or protocol-level happens behind [`KeyProvider`]:
//! key generation, INI/HIA submission, bank key retrieval, passphrase
//! rotation and the actual up/down transfers. The lifecycle and transfer
//! services never touch key material themselves; they orchestrate state and
//! persistence around these calls. Tests substitute a mock implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::future::Future;
use std::time::Duration;

use ebridge_core::models::{Artifact, Connection, FileFormat, UserIdentity};
use ebridge_core::AppError;

/// Classification of a provider failure, mirroring the protocol layer's own
/// split between business-level and transport-level errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Bank-side business return code (order rejected, no data, ...).
    Functional,
    /// Protocol-level failure (authentication, recovery, segmentation).
    Technical,
    /// Could not reach or talk to the endpoint at all.
    Transport,
    /// Local key material or bank key verification failed.
    Verification,
}

/// A structured failure from the protocol layer. `code` carries the bank's
/// return code (or a stable local code) and survives verbatim into
/// connection logs and transfer notes.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        kind: ProviderErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn functional(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Functional, code, message)
    }

    pub fn technical(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Technical, code, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, "TRANSPORT", message)
    }

    pub fn verification(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Verification, "VERIFICATION", message)
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::provider(err.code, err.message)
    }
}

/// One file fetched from the bank. The bank does not always name files; the
/// caller derives a display name from the format when `name` is absent.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: Option<String>,
    pub data: Vec<u8>,
}

/// Acknowledgement of an accepted upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// Order id assigned to the submission, recorded on the transfer note.
    pub order_id: String,
}

/// The protocol adapter. One implementation per protocol library; all
/// methods take the owning [`Connection`] so the adapter can resolve host,
/// endpoint and version parameters per call.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Generate a fresh key set for `identity` in the provider's keystore,
    /// protected by the identity's stored passphrase.
    async fn generate_keys(
        &self,
        connection: &Connection,
        identity: &UserIdentity,
    ) -> Result<(), ProviderError>;

    /// Submit the public keys to the bank (INI + HIA) and render the
    /// initialization letter the operator mails in for activation.
    async fn send_public_keys(
        &self,
        connection: &Connection,
        identity: &UserIdentity,
    ) -> Result<Artifact, ProviderError>;

    /// Download and verify the bank's public keys (HPB). The returned
    /// artifact holds the printable fingerprint sheet.
    async fn fetch_bank_keys(
        &self,
        connection: &Connection,
        identity: &UserIdentity,
    ) -> Result<Artifact, ProviderError>;

    /// Re-encrypt the identity's key material under a new passphrase.
    async fn rotate_passphrase(
        &self,
        connection: &Connection,
        identity: &UserIdentity,
        new_passphrase: &str,
    ) -> Result<(), ProviderError>;

    /// Fetch all pending files for a download order type over the given
    /// window. An empty result is not an error.
    async fn download(
        &self,
        connection: &Connection,
        identity: &UserIdentity,
        format: &FileFormat,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<Vec<RawFile>, ProviderError>;

    /// Submit one payload under an upload order type.
    async fn upload(
        &self,
        connection: &Connection,
        identity: &UserIdentity,
        format: &FileFormat,
        payload: &[u8],
    ) -> Result<UploadReceipt, ProviderError>;
}

/// Run one provider call under a timeout. A timeout is reported as a
/// provider error with a stable local code; services mutate their entities
/// only after this returns `Ok`, so a timed-out call changes nothing.
pub(crate) async fn bounded<T, F>(limit: Duration, op: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            tracing::warn!(code = %err.code, "provider call '{}' failed: {}", op, err.message);
            Err(err.into())
        }
        Err(_) => Err(AppError::provider(
            "TIMEOUT",
            format!("provider call '{}' timed out after {}s", op, limit.as_secs()),
        )),
    }
}
