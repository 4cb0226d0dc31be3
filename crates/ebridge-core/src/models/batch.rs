//! Batch run logs and roll-up rules.
//!
//! One `BatchRunLog` per unattended execution, owning one `ConnectionLog`
//! per connection processed (plus one per connection touched by a later
//! reprocess sweep). The run state is derived from the sub-logs and the
//! produced transfers via [`BatchState::rollup`]; it is never set
//! independently except through the operator override buttons.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::transfer::Privilege;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "batch_state", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Draft,
    Done,
    Error,
}

impl Display for BatchState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BatchState::Draft => write!(f, "draft"),
            BatchState::Done => write!(f, "done"),
            BatchState::Error => write!(f, "error"),
        }
    }
}

impl FromStr for BatchState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(BatchState::Draft),
            "done" => Ok(BatchState::Done),
            "error" => Ok(BatchState::Error),
            _ => Err(anyhow::anyhow!("Invalid batch state: {}", s)),
        }
    }
}

impl BatchState {
    /// Derive the run state from the current per-connection outcomes (the
    /// latest log per connection) and whether any produced transfer is
    /// still in draft.
    ///
    /// `error` wins over everything; otherwise the run stays `draft` while
    /// work remains; otherwise `done`.
    pub fn rollup(connection_outcomes: &[BatchState], any_draft_transfers: bool) -> BatchState {
        if connection_outcomes.contains(&BatchState::Error) {
            BatchState::Error
        } else if any_draft_transfers || connection_outcomes.contains(&BatchState::Draft) {
            BatchState::Draft
        } else {
            BatchState::Done
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BatchRunLog {
    pub id: Uuid,
    pub state: BatchState,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Number of file transfers produced by this run.
    pub transfer_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchRunLog {
    /// Operator override: force the run to `done` (failures resolved out of
    /// band). Reversible via [`BatchRunLog::button_draft`].
    pub fn button_done(&mut self, privilege: Privilege) -> Result<(), AppError> {
        if privilege != Privilege::Elevated {
            return Err(AppError::Unauthorized(
                "button_done requires elevated privilege".into(),
            ));
        }
        self.state = BatchState::Done;
        Ok(())
    }

    pub fn button_draft(&mut self, privilege: Privilege) -> Result<(), AppError> {
        if privilege != Privilege::Elevated {
            return Err(AppError::Unauthorized(
                "button_draft requires elevated privilege".into(),
            ));
        }
        self.state = BatchState::Draft;
        Ok(())
    }

    /// Reprocessing is pointless once the run is done.
    pub fn can_reprocess(&self) -> bool {
        self.state != BatchState::Done
    }

    /// Only runs that never got anywhere may be removed.
    pub fn can_delete(&self) -> bool {
        self.state == BatchState::Draft
    }
}

/// Outcome of one connection within one run. "No data available" is a
/// non-error outcome and still produces a log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ConnectionLog {
    pub id: Uuid,
    pub run_id: Uuid,
    pub connection_id: Uuid,
    pub state: BatchState,
    pub error_count: i32,
    /// Error detail, verbatim provider messages included.
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_and_parse() {
        assert_eq!(BatchState::Draft.to_string(), "draft");
        assert_eq!("done".parse::<BatchState>().unwrap(), BatchState::Done);
        assert!("pending".parse::<BatchState>().is_err());
    }

    #[test]
    fn test_rollup_error_wins() {
        let outcomes = [BatchState::Done, BatchState::Error, BatchState::Done];
        assert_eq!(BatchState::rollup(&outcomes, false), BatchState::Error);
        // Even with drafts pending, error still wins.
        assert_eq!(BatchState::rollup(&outcomes, true), BatchState::Error);
    }

    #[test]
    fn test_rollup_draft_while_transfers_pending() {
        let outcomes = [BatchState::Done, BatchState::Done];
        assert_eq!(BatchState::rollup(&outcomes, true), BatchState::Draft);
        assert_eq!(BatchState::rollup(&outcomes, false), BatchState::Done);
    }

    #[test]
    fn test_rollup_draft_connection_log_keeps_run_open() {
        let outcomes = [BatchState::Done, BatchState::Draft];
        assert_eq!(BatchState::rollup(&outcomes, false), BatchState::Draft);
    }

    #[test]
    fn test_rollup_error_iff_some_connection_errored() {
        // No error outcome, no error roll-up.
        for outcomes in [
            vec![],
            vec![BatchState::Done],
            vec![BatchState::Done, BatchState::Draft],
        ] {
            assert_ne!(BatchState::rollup(&outcomes, false), BatchState::Error);
        }
        // Any error outcome, error roll-up.
        assert_eq!(
            BatchState::rollup(&[BatchState::Error], false),
            BatchState::Error
        );
    }

    #[test]
    fn test_button_done_and_draft_require_privilege() {
        let mut run = sample_run(BatchState::Error);
        assert!(run.button_done(Privilege::Standard).is_err());
        assert_eq!(run.state, BatchState::Error);

        run.button_done(Privilege::Elevated).unwrap();
        assert_eq!(run.state, BatchState::Done);

        run.button_draft(Privilege::Elevated).unwrap();
        assert_eq!(run.state, BatchState::Draft);
    }

    #[test]
    fn test_reprocess_unavailable_once_done() {
        assert!(sample_run(BatchState::Error).can_reprocess());
        assert!(sample_run(BatchState::Draft).can_reprocess());
        assert!(!sample_run(BatchState::Done).can_reprocess());
    }

    #[test]
    fn test_only_draft_runs_deletable() {
        assert!(sample_run(BatchState::Draft).can_delete());
        assert!(!sample_run(BatchState::Done).can_delete());
        assert!(!sample_run(BatchState::Error).can_delete());
    }

    fn sample_run(state: BatchState) -> BatchRunLog {
        BatchRunLog {
            id: Uuid::new_v4(),
            state,
            date_from: None,
            date_to: None,
            transfer_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
