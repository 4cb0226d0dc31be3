//! Upload, download and processing against a scripted provider.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use ebridge_core::models::{
    ConnectionState, FileTransfer, IdentityState, TransactionRights, TransferDirection,
    TransferState,
};
use ebridge_core::AppError;
use ebridge_services::{
    FileProcessor, ProcessOutcome, ProcessorRegistry, RawFile, TransferService,
};

use common::{connection, format, identity, provider_config, MockProvider};

/// Fails the first `failures` attempts, then succeeds with fresh record ids.
struct ScriptedProcessor {
    failures: usize,
    attempts: AtomicUsize,
}

impl ScriptedProcessor {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FileProcessor for ScriptedProcessor {
    async fn process(&self, _name: &str, _payload: &[u8]) -> Result<ProcessOutcome, String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err("statement parser: unbalanced entries".into());
        }
        Ok(ProcessOutcome {
            created_record_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            summary: "2 statements created".into(),
        })
    }
}

fn service(provider: MockProvider, registry: ProcessorRegistry) -> TransferService {
    TransferService::new(Arc::new(provider), Arc::new(registry), &provider_config(120))
}

fn draft_transfer(name: &str) -> FileTransfer {
    FileTransfer {
        id: Uuid::new_v4(),
        connection_id: Uuid::new_v4(),
        identity_id: Uuid::new_v4(),
        format_id: Uuid::new_v4(),
        direction: TransferDirection::Down,
        name: name.into(),
        payload: b"<Document/>".to_vec(),
        date_from: None,
        date_to: None,
        state: TransferState::Draft,
        note: String::new(),
        process_note: String::new(),
        created_record_ids: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn download_names_files_the_bank_left_unnamed() {
    let provider = MockProvider {
        files: vec![
            RawFile {
                name: Some("statement_20260301.xml".into()),
                data: b"one".to_vec(),
            },
            RawFile {
                name: None,
                data: b"two".to_vec(),
            },
        ],
        ..Default::default()
    };
    let svc = service(provider, ProcessorRegistry::new());
    let conn = connection(ConnectionState::Confirm);
    let id = identity(IdentityState::ActiveKeys, TransactionRights::Both);
    let fmt = format(TransferDirection::Down, Some("camt.053"));

    let files = svc.download(&conn, &id, &fmt, None, None).await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "statement_20260301.xml");
    assert!(files[1].name.starts_with("EBIXHOST_C53_"));
    assert!(files[1].name.ends_with(".camt.053.xml"));
}

#[tokio::test]
async fn download_with_no_pending_files_is_not_an_error() {
    let svc = service(MockProvider::default(), ProcessorRegistry::new());
    let conn = connection(ConnectionState::Confirm);
    let id = identity(IdentityState::ActiveKeys, TransactionRights::Both);
    let fmt = format(TransferDirection::Down, Some("camt.053"));

    let files = svc.download(&conn, &id, &fmt, None, None).await.unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn download_requires_download_rights_and_a_confirmed_connection() {
    let svc = service(MockProvider::default(), ProcessorRegistry::new());
    let fmt = format(TransferDirection::Down, Some("camt.053"));

    let conn = connection(ConnectionState::Confirm);
    let id = identity(IdentityState::ActiveKeys, TransactionRights::UploadOnly);
    let err = svc.download(&conn, &id, &fmt, None, None).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let conn = connection(ConnectionState::Draft);
    let id = identity(IdentityState::ActiveKeys, TransactionRights::Both);
    let err = svc.download(&conn, &id, &fmt, None, None).await.unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));

    // Not yet through the initialization path.
    let conn = connection(ConnectionState::Confirm);
    let id = identity(IdentityState::ToVerify, TransactionRights::Both);
    let err = svc.download(&conn, &id, &fmt, None, None).await.unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));
}

#[tokio::test]
async fn upload_returns_the_order_id_for_the_note() {
    let svc = service(MockProvider::default(), ProcessorRegistry::new());
    let conn = connection(ConnectionState::Confirm);
    let id = identity(IdentityState::ActiveKeys, TransactionRights::Both);
    let fmt = format(TransferDirection::Up, None);

    let receipt = svc.upload(&conn, &id, &fmt, b"<Document/>").await.unwrap();
    assert_eq!(receipt.order_id, "A042");
    assert_eq!(TransferService::upload_note(&receipt), "EBICS OrderID: A042");
}

#[tokio::test]
async fn upload_rejections_happen_before_the_provider_is_involved() {
    let svc = service(MockProvider::default(), ProcessorRegistry::new());
    let conn = connection(ConnectionState::Confirm);
    let id = identity(IdentityState::ActiveKeys, TransactionRights::Both);

    let err = svc
        .upload(&conn, &id, &format(TransferDirection::Up, None), b"")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = svc
        .upload(
            &conn,
            &id,
            &format(TransferDirection::Down, Some("camt.053")),
            b"<Document/>",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let download_only = identity(IdentityState::ActiveKeys, TransactionRights::DownloadOnly);
    let err = svc
        .upload(
            &conn,
            &download_only,
            &format(TransferDirection::Up, None),
            b"<Document/>",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn bank_rejection_surfaces_as_a_provider_error() {
    let svc = service(
        MockProvider {
            fail_upload: true,
            ..Default::default()
        },
        ProcessorRegistry::new(),
    );
    let conn = connection(ConnectionState::Confirm);
    let id = identity(IdentityState::ActiveKeys, TransactionRights::Both);

    let err = svc
        .upload(&conn, &id, &format(TransferDirection::Up, None), b"<Document/>")
        .await
        .unwrap_err();
    match err {
        AppError::Provider { code, .. } => assert_eq!(code, "EBICS_INVALID_ORDER_DATA_FORMAT"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn processing_success_moves_the_transfer_to_done() {
    let mut registry = ProcessorRegistry::new();
    registry.register("camt.053", Arc::new(ScriptedProcessor::new(0)));
    let svc = service(MockProvider::default(), registry);

    let fmt = format(TransferDirection::Down, Some("camt.053"));
    let mut transfer = draft_transfer("EBIXHOST_C53_20260301083000.camt.053.xml");

    assert!(svc.process(&mut transfer, &fmt).await.unwrap());
    assert_eq!(transfer.state, TransferState::Done);
    assert_eq!(transfer.created_record_ids.len(), 2);
    assert_eq!(transfer.process_note, "2 statements created");
}

#[tokio::test]
async fn processing_failure_keeps_the_transfer_reprocessable() {
    let mut registry = ProcessorRegistry::new();
    registry.register("camt.053", Arc::new(ScriptedProcessor::new(1)));
    let svc = service(MockProvider::default(), registry);

    let fmt = format(TransferDirection::Down, Some("camt.053"));
    let mut transfer = draft_transfer("EBIXHOST_C53_20260301083000.camt.053.xml");

    // First attempt fails: state stays draft, the note records the failure.
    assert!(!svc.process(&mut transfer, &fmt).await.unwrap());
    assert_eq!(transfer.state, TransferState::Draft);
    assert_eq!(transfer.process_note, "statement parser: unbalanced entries");
    assert!(transfer.created_record_ids.is_empty());

    // Second attempt succeeds and supersedes the failure note.
    assert!(svc.process(&mut transfer, &fmt).await.unwrap());
    assert_eq!(transfer.state, TransferState::Done);
    assert_eq!(transfer.process_note, "2 statements created");
    assert_eq!(transfer.created_record_ids.len(), 2);
}

#[tokio::test]
async fn processing_requires_a_registered_processor() {
    let svc = service(MockProvider::default(), ProcessorRegistry::new());
    let mut transfer = draft_transfer("EBIXHOST_C53_20260301083000.camt.053.xml");

    // Format with no processor key at all.
    let fmt = format(TransferDirection::Down, None);
    let err = svc.process(&mut transfer, &fmt).await.unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));

    // Key present but nothing registered under it.
    let fmt = format(TransferDirection::Down, Some("camt.053"));
    let err = svc.process(&mut transfer, &fmt).await.unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));

    // Either way the transfer is untouched.
    assert_eq!(transfer.state, TransferState::Draft);
    assert!(transfer.process_note.is_empty());
}

#[tokio::test]
async fn processing_refused_for_uploads_and_done_transfers() {
    let mut registry = ProcessorRegistry::new();
    registry.register("camt.053", Arc::new(ScriptedProcessor::new(0)));
    let svc = service(MockProvider::default(), registry);
    let fmt = format(TransferDirection::Down, Some("camt.053"));

    let mut upload = draft_transfer("EBIXHOST_CCT_20260301083000.pain.001.xml");
    upload.direction = TransferDirection::Up;
    assert!(svc.process(&mut upload, &fmt).await.is_err());

    let mut done = draft_transfer("EBIXHOST_C53_20260301083000.camt.053.xml");
    done.state = TransferState::Done;
    assert!(svc.process(&mut done, &fmt).await.is_err());
}
