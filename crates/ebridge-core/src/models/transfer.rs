//! File transfers and their processing state.
//!
//! One row per transferred file, inbound or outbound. A transfer is the
//! audit record of the exchange: it is never silently deleted, and every
//! state change goes through the explicit transitions here. A failed
//! processing attempt deliberately leaves the transfer in `draft` (with the
//! failure written to `process_note`) so it stays reprocessable; `error` is
//! reachable only through explicit manual marking and batch roll-up.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::file_format::TransferDirection;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "transfer_state", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Draft,
    Done,
    Error,
}

impl Display for TransferState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TransferState::Draft => write!(f, "draft"),
            TransferState::Done => write!(f, "done"),
            TransferState::Error => write!(f, "error"),
        }
    }
}

impl FromStr for TransferState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TransferState::Draft),
            "done" => Ok(TransferState::Done),
            "error" => Ok(TransferState::Error),
            _ => Err(anyhow::anyhow!("Invalid transfer state: {}", s)),
        }
    }
}

/// Caller privilege for manual overrides. The `set_to_done`/`set_to_draft`
/// escape valves require `Elevated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Standard,
    Elevated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FileTransfer {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub identity_id: Uuid,
    pub format_id: Uuid,
    pub direction: TransferDirection,
    pub name: String,
    pub payload: Vec<u8>,
    /// Download window as entered on the transfer request; downloads only.
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub state: TransferState,
    /// Free-text note (order ids, origin, override audit trail).
    pub note: String,
    /// Result of the latest processing attempt; superseded on re-run.
    pub process_note: String,
    /// Records created by the processor for this file.
    pub created_record_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileTransfer {
    /// Only downloaded files still in draft can be processed.
    pub fn can_process(&self) -> bool {
        self.state == TransferState::Draft && self.direction == TransferDirection::Down
    }

    /// Record a successful processing run. Replaces the previous
    /// created-record set, so re-running a fixed file never accumulates
    /// duplicate links.
    pub fn record_process_success(&mut self, created_record_ids: Vec<Uuid>, summary: String) {
        self.created_record_ids = created_record_ids;
        self.process_note = summary;
        self.state = TransferState::Done;
    }

    /// Record a failed processing run. State stays `draft` so the file
    /// remains reprocessable; the note supersedes any previous attempt.
    pub fn record_process_failure(&mut self, detail: String) {
        self.process_note = detail;
    }

    /// Operator override: skip processing. Requires elevated privilege.
    pub fn set_to_done(&mut self, privilege: Privilege) -> Result<(), AppError> {
        if privilege != Privilege::Elevated {
            return Err(AppError::Unauthorized(
                "set_to_done requires elevated privilege".into(),
            ));
        }
        if self.state != TransferState::Draft {
            return Err(AppError::invalid_transition(self.state, "set_to_done"));
        }
        self.state = TransferState::Done;
        self.append_note("manual override: set to done");
        Ok(())
    }

    /// Operator override: undo, allowing reprocessing or correction.
    /// Requires elevated privilege.
    pub fn set_to_draft(&mut self, privilege: Privilege) -> Result<(), AppError> {
        if privilege != Privilege::Elevated {
            return Err(AppError::Unauthorized(
                "set_to_draft requires elevated privilege".into(),
            ));
        }
        if !matches!(self.state, TransferState::Done | TransferState::Error) {
            return Err(AppError::invalid_transition(self.state, "set_to_draft"));
        }
        self.state = TransferState::Draft;
        self.append_note("manual override: set to draft");
        Ok(())
    }

    /// Operator override: mark a draft file as terminally failed.
    /// Requires elevated privilege.
    pub fn set_to_error(&mut self, privilege: Privilege) -> Result<(), AppError> {
        if privilege != Privilege::Elevated {
            return Err(AppError::Unauthorized(
                "set_to_error requires elevated privilege".into(),
            ));
        }
        if self.state != TransferState::Draft {
            return Err(AppError::invalid_transition(self.state, "set_to_error"));
        }
        self.state = TransferState::Error;
        self.append_note("manual override: set to error");
        Ok(())
    }

    /// Transfers in `done` are the audit record and cannot be removed.
    pub fn can_delete(&self) -> bool {
        self.state != TransferState::Done
    }

    pub fn append_note(&mut self, line: &str) {
        if !self.note.is_empty() {
            self.note.push('\n');
        }
        self.note.push_str(line);
    }
}
