//! Unattended batch execution.
//!
//! One run sweeps every in-scope connection: pick an identity, download all
//! pending files per download format, store each as a transfer and run its
//! processor. Connections are isolated from each other; any failure is
//! recorded on that connection's log and the sweep continues. The run state
//! is derived from the per-connection outcomes and the produced transfers
//! by [`BatchState::rollup`], never set directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use ebridge_core::config::BatchConfig;
use ebridge_core::models::{
    BatchRunLog, BatchState, Connection, ConnectionState, FileFormat, Privilege, SignatureClass,
    TransferDirection, TransferState, UserIdentity,
};
use ebridge_core::AppError;
use ebridge_db::{
    BatchLogRepository, ConnectionRepository, FileFormatRepository, IdentityRepository,
    TransferRepository,
};
use ebridge_services::{ConnectionLocks, TransferService};

pub struct BatchRunner {
    connections: ConnectionRepository,
    identities: IdentityRepository,
    formats: FileFormatRepository,
    transfers: TransferRepository,
    logs: BatchLogRepository,
    transfer_service: Arc<TransferService>,
    locks: ConnectionLocks,
    window_days: i64,
    cancelled: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(
        pool: PgPool,
        transfer_service: Arc<TransferService>,
        locks: ConnectionLocks,
        config: &BatchConfig,
    ) -> Self {
        Self {
            connections: ConnectionRepository::new(pool.clone()),
            identities: IdentityRepository::new(pool.clone()),
            formats: FileFormatRepository::new(pool.clone()),
            transfers: TransferRepository::new(pool.clone()),
            logs: BatchLogRepository::new(pool),
            transfer_service,
            locks,
            window_days: config.window_days,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared cancellation flag. When set, the current run finishes the
    /// connection in flight, skips the rest and finalizes normally.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Execute one run over `scope` (or every confirmed connection when
    /// `None`). Always returns the finalized run log; individual connection
    /// failures are recorded, not propagated.
    #[tracing::instrument(skip(self, scope))]
    pub async fn run(
        &self,
        scope: Option<&[Uuid]>,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<BatchRunLog, AppError> {
        let connections = self.resolve_scope(scope).await?;

        // Default window when the trigger passes no dates.
        let today = Utc::now().date_naive();
        let date_to = date_to.or(Some(today));
        let date_from = date_from.or_else(|| Some(today - Duration::days(self.window_days)));

        let ids: Vec<Uuid> = connections.iter().map(|c| c.id).collect();
        let run = self.logs.create_run(&ids, date_from, date_to).await?;
        tracing::info!(run_id = %run.id, connections = connections.len(), "batch run started");

        let mut transfer_count = 0;
        for connection in &connections {
            if self.cancelled.load(Ordering::SeqCst) {
                tracing::warn!(run_id = %run.id, "batch run cancelled, skipping remaining connections");
                break;
            }
            match self
                .sweep_connection(&run, connection, date_from, date_to)
                .await
            {
                Ok((created, errors)) => {
                    transfer_count += created;
                    let (state, note) = if errors.is_empty() {
                        (BatchState::Done, format!("{} new files", created))
                    } else {
                        (BatchState::Error, errors.join("\n"))
                    };
                    self.logs
                        .create_connection_log(
                            run.id,
                            connection.id,
                            state,
                            errors.len() as i32,
                            &note,
                        )
                        .await?;
                }
                Err(err) => {
                    tracing::error!(connection = %connection.name, "connection sweep failed: {}", err);
                    self.logs
                        .create_connection_log(
                            run.id,
                            connection.id,
                            BatchState::Error,
                            1,
                            &err.to_string(),
                        )
                        .await?;
                }
            }
        }

        let run = self.finalize(run.id, transfer_count).await?;
        tracing::info!(run_id = %run.id, state = %run.state, transfers = run.transfer_count, "batch run finished");
        Ok(run)
    }

    /// Retry every still-draft transfer of a run, in creation order,
    /// continuing past failures. Appends a fresh connection log per
    /// connection touched and re-derives the run state.
    #[tracing::instrument(skip(self))]
    pub async fn reprocess(&self, run_id: Uuid) -> Result<BatchRunLog, AppError> {
        let run = self
            .logs
            .get_run(run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("batch run log {}", run_id)))?;
        if !run.can_reprocess() {
            return Err(AppError::invalid_transition(run.state, "reprocess"));
        }

        // connection id -> (attempted, failure notes)
        let mut touched: Vec<(Uuid, Vec<String>)> = Vec::new();
        for mut transfer in self.transfers.list_for_run(run_id).await? {
            if !transfer.can_process() {
                continue;
            }
            let Some(format) = self.formats.get(transfer.format_id).await? else {
                continue;
            };
            if format.processor_key.is_none() {
                continue;
            }
            let idx = match touched
                .iter()
                .position(|(id, _)| *id == transfer.connection_id)
            {
                Some(idx) => idx,
                None => {
                    touched.push((transfer.connection_id, Vec::new()));
                    touched.len() - 1
                }
            };
            match self.transfer_service.process(&mut transfer, &format).await {
                Ok(true) => {
                    self.transfers.update(&transfer).await?;
                }
                Ok(false) => {
                    self.transfers.update(&transfer).await?;
                    touched[idx].1.push(format!(
                        "Error while processing file '{}': {}",
                        transfer.name, transfer.process_note
                    ));
                }
                Err(err) => {
                    touched[idx].1.push(format!(
                        "Error while processing file '{}': {}",
                        transfer.name, err
                    ));
                }
            }
        }

        for (connection_id, errors) in touched {
            let (state, note) = if errors.is_empty() {
                (BatchState::Done, "reprocessed".to_string())
            } else {
                (BatchState::Error, errors.join("\n"))
            };
            self.logs
                .create_connection_log(run_id, connection_id, state, errors.len() as i32, &note)
                .await?;
        }

        self.finalize(run_id, run.transfer_count).await
    }

    /// Operator override: force the run to `done`.
    pub async fn button_done(
        &self,
        run_id: Uuid,
        privilege: Privilege,
    ) -> Result<BatchRunLog, AppError> {
        let mut run = self
            .logs
            .get_run(run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("batch run log {}", run_id)))?;
        run.button_done(privilege)?;
        tracing::warn!(run_id = %run_id, "manual override: batch run set to done");
        Ok(self
            .logs
            .update_run(run.id, run.state, run.transfer_count)
            .await?)
    }

    /// Operator override: reopen the run.
    pub async fn button_draft(
        &self,
        run_id: Uuid,
        privilege: Privilege,
    ) -> Result<BatchRunLog, AppError> {
        let mut run = self
            .logs
            .get_run(run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("batch run log {}", run_id)))?;
        run.button_draft(privilege)?;
        tracing::warn!(run_id = %run_id, "manual override: batch run set to draft");
        Ok(self
            .logs
            .update_run(run.id, run.state, run.transfer_count)
            .await?)
    }

    async fn resolve_scope(&self, scope: Option<&[Uuid]>) -> Result<Vec<Connection>, AppError> {
        match scope {
            Some(ids) => {
                let mut connections = Vec::with_capacity(ids.len());
                for id in ids {
                    let conn = self
                        .connections
                        .get(*id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("connection {}", id)))?;
                    connections.push(conn);
                }
                Ok(connections)
            }
            None => Ok(self.connections.list_confirmed().await?),
        }
    }

    /// Sweep one connection under its lock. Returns the number of stored
    /// transfers and the collected failure notes.
    async fn sweep_connection(
        &self,
        run: &BatchRunLog,
        connection: &Connection,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<(i32, Vec<String>), AppError> {
        let lock = self.locks.for_connection(connection.id);
        let _guard = lock.lock().await;

        if connection.state != ConnectionState::Confirm {
            return Err(AppError::Configuration(format!(
                "connection '{}' is not confirmed for use",
                connection.name
            )));
        }
        let identities = self.identities.list_for_connection(connection.id).await?;
        let identity = pick_identity(&identities).ok_or_else(|| {
            AppError::Configuration(format!(
                "connection '{}' has no active identity with download rights and a stored passphrase",
                connection.name
            ))
        })?;

        let mut created = 0;
        let mut errors = Vec::new();
        for format in self.formats.list_downloads(connection.id).await? {
            match self
                .transfer_service
                .download(connection, identity, &format, date_from, date_to)
                .await
            {
                Ok(files) => {
                    for file in files {
                        match self
                            .store_and_process(run, connection, identity, &format, file)
                            .await
                        {
                            Ok(failure) => {
                                created += 1;
                                errors.extend(failure);
                            }
                            Err(err) => errors.push(err),
                        }
                    }
                }
                Err(err) => errors.push(format!(
                    "Error while downloading format '{}': {}",
                    format.name, err
                )),
            }
        }
        Ok((created, errors))
    }

    /// Store one downloaded file and, when the format has a processor, run
    /// it immediately. `Ok(Some(_))` is a processing failure note; the
    /// transfer stays stored in draft. `Err` means the file was not stored.
    async fn store_and_process(
        &self,
        run: &BatchRunLog,
        connection: &Connection,
        identity: &UserIdentity,
        format: &FileFormat,
        file: ebridge_services::DownloadedFile,
    ) -> Result<Option<String>, String> {
        let mut transfer = self
            .transfers
            .create(
                connection.id,
                identity.id,
                format.id,
                TransferDirection::Down,
                &file.name,
                &file.data,
                run.date_from,
                run.date_to,
                TransferState::Draft,
                "",
            )
            .await
            .map_err(|e| format!("Error while storing file '{}': {}", file.name, e))?;
        self.transfers
            .add_to_run(run.id, transfer.id)
            .await
            .map_err(|e| format!("Error while storing file '{}': {}", file.name, e))?;

        if format.processor_key.is_none() {
            return Ok(None);
        }
        let failure = match self.transfer_service.process(&mut transfer, format).await {
            Ok(true) => None,
            Ok(false) => Some(format!(
                "Error while processing file '{}': {}",
                transfer.name, transfer.process_note
            )),
            Err(err) => Some(format!(
                "Error while processing file '{}': {}",
                transfer.name, err
            )),
        };
        self.transfers
            .update(&transfer)
            .await
            .map_err(|e| format!("Error while storing file '{}': {}", file.name, e))?;
        Ok(failure)
    }

    /// Re-derive and persist the run state from the latest per-connection
    /// outcomes, the remaining draft transfers, and whether every scoped
    /// connection was actually attempted.
    async fn finalize(&self, run_id: Uuid, transfer_count: i32) -> Result<BatchRunLog, AppError> {
        let scoped = self.logs.run_connection_ids(run_id).await?;
        let logged = self.logs.logged_connection_ids(run_id).await?;
        let outcomes = self.logs.latest_connection_outcomes(run_id).await?;
        let any_draft = self.transfers.any_draft_for_run(run_id).await?;
        let state = derive_run_state(&outcomes, any_draft, all_attempted(&scoped, &logged));
        Ok(self.logs.update_run(run_id, state, transfer_count).await?)
    }
}

/// Every scoped connection has at least one log. False for a cancelled or
/// still-in-progress run.
fn all_attempted(scoped: &[Uuid], logged: &[Uuid]) -> bool {
    scoped.iter().all(|id| logged.contains(id))
}

/// An unattempted connection is pending work: the run may not roll up as
/// `done` until every scoped connection was swept. Errors still win.
fn derive_run_state(outcomes: &[BatchState], any_draft: bool, all_attempted: bool) -> BatchState {
    BatchState::rollup(outcomes, any_draft || !all_attempted)
}

/// Identity used for unattended transfers: active, fully initialized, with
/// a stored passphrase and download rights. Transport-signature identities
/// are preferred so unattended traffic never carries an authorising
/// signature by accident.
fn pick_identity(identities: &[UserIdentity]) -> Option<&UserIdentity> {
    let usable: Vec<&UserIdentity> = identities
        .iter()
        .filter(|i| i.is_usable() && i.transaction_rights.allows_download())
        .collect();
    usable
        .iter()
        .find(|i| i.signature_class == SignatureClass::T)
        .or_else(|| usable.first())
        .copied()
}
