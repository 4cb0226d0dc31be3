//! Shared test fixtures: a scriptable provider and model builders.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use ebridge_core::models::{
    Artifact, Connection, ConnectionState, FileFormat, IdentityState, KeyVersion,
    ProtocolVersion, SignatureClass, TransactionRights, TransferDirection, UserIdentity,
};
use ebridge_services::{KeyProvider, ProviderError, RawFile, UploadReceipt};

/// Provider stand-in. Failures are scripted per method; counters let tests
/// assert how often the bank was actually contacted.
#[derive(Default)]
pub struct MockProvider {
    pub fail_generate: bool,
    pub fail_send: bool,
    pub fail_fetch: bool,
    pub fail_download: bool,
    pub fail_upload: bool,
    /// When set, `fetch_bank_keys` never completes (timeout tests).
    pub hang_fetch: bool,
    /// Files returned by every `download` call.
    pub files: Vec<RawFile>,
    pub letters_issued: AtomicUsize,
    pub rotations: AtomicUsize,
}

#[async_trait]
impl KeyProvider for MockProvider {
    async fn generate_keys(
        &self,
        _connection: &Connection,
        _identity: &UserIdentity,
    ) -> Result<(), ProviderError> {
        if self.fail_generate {
            return Err(ProviderError::verification("keystore write failed"));
        }
        Ok(())
    }

    async fn send_public_keys(
        &self,
        _connection: &Connection,
        _identity: &UserIdentity,
    ) -> Result<Artifact, ProviderError> {
        if self.fail_send {
            return Err(ProviderError::technical(
                "EBICS_AUTHENTICATION_FAILED",
                "bank rejected the INI order",
            ));
        }
        let n = self.letters_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Artifact {
            name: format!("ini_letter_{}.pdf", n),
            data: format!("INI letter #{}", n).into_bytes(),
        })
    }

    async fn fetch_bank_keys(
        &self,
        _connection: &Connection,
        _identity: &UserIdentity,
    ) -> Result<Artifact, ProviderError> {
        if self.hang_fetch {
            std::future::pending::<()>().await;
        }
        if self.fail_fetch {
            return Err(ProviderError::transport("connection refused"));
        }
        Ok(Artifact {
            name: "bank_keys.pdf".into(),
            data: b"fingerprint sheet".to_vec(),
        })
    }

    async fn rotate_passphrase(
        &self,
        _connection: &Connection,
        _identity: &UserIdentity,
        _new_passphrase: &str,
    ) -> Result<(), ProviderError> {
        self.rotations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn download(
        &self,
        _connection: &Connection,
        _identity: &UserIdentity,
        _format: &FileFormat,
        _date_from: Option<NaiveDate>,
        _date_to: Option<NaiveDate>,
    ) -> Result<Vec<RawFile>, ProviderError> {
        if self.fail_download {
            return Err(ProviderError::technical(
                "EBICS_PROCESSING_ERROR",
                "order could not be processed",
            ));
        }
        Ok(self
            .files
            .iter()
            .map(|f| RawFile {
                name: f.name.clone(),
                data: f.data.clone(),
            })
            .collect())
    }

    async fn upload(
        &self,
        _connection: &Connection,
        _identity: &UserIdentity,
        _format: &FileFormat,
        _payload: &[u8],
    ) -> Result<UploadReceipt, ProviderError> {
        if self.fail_upload {
            return Err(ProviderError::functional(
                "EBICS_INVALID_ORDER_DATA_FORMAT",
                "payload rejected",
            ));
        }
        Ok(UploadReceipt {
            order_id: "A042".into(),
        })
    }
}

pub fn connection(state: ConnectionState) -> Connection {
    Connection {
        id: Uuid::new_v4(),
        name: "Main bank".into(),
        host_id: "EBIXHOST".into(),
        url: "https://ebics.example-bank.test/ebicsweb".into(),
        partner_id: "PARTNER1".into(),
        protocol_version: ProtocolVersion::H004,
        key_version: KeyVersion::A006,
        key_bitlength: 2048,
        order_number: "A000".into(),
        state,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn identity(state: IdentityState, rights: TransactionRights) -> UserIdentity {
    UserIdentity {
        id: Uuid::new_v4(),
        connection_id: Uuid::new_v4(),
        name: "USER1".into(),
        signature_class: SignatureClass::T,
        passphrase: Some("correct horse battery".into()),
        keys_present: state != IdentityState::Draft,
        state,
        transaction_rights: rights,
        active: true,
        ini_letter: None,
        ini_letter_name: None,
        bank_keys: None,
        bank_keys_name: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn format(direction: TransferDirection, processor_key: Option<&str>) -> FileFormat {
    let down = direction == TransferDirection::Down;
    FileFormat {
        id: Uuid::new_v4(),
        connection_id: Uuid::new_v4(),
        name: if down { "camt.053" } else { "pain.001" }.into(),
        direction,
        order_type: if down { "C53" } else { "CCT" }.into(),
        suffix: if down { "camt.053.xml" } else { "pain.001.xml" }.into(),
        processor_key: processor_key.map(str::to_string),
        signature_class: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn provider_config(timeout_seconds: u64) -> ebridge_core::config::ProviderConfig {
    ebridge_core::config::ProviderConfig {
        license_user: None,
        license_key: None,
        timeout_seconds,
    }
}
