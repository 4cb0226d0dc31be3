//! Batch run log and per-connection log repositories

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use ebridge_core::models::{BatchRunLog, BatchState, ConnectionLog};

const RUN_COLUMNS: &str =
    "id, state, date_from, date_to, transfer_count, created_at, updated_at";
const LOG_COLUMNS: &str = "id, run_id, connection_id, state, error_count, note, created_at";

#[derive(Clone)]
pub struct BatchLogRepository {
    pool: PgPool,
}

impl BatchLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a new run. Every invocation creates a fresh log; runs never
    /// merge into a prior one.
    pub async fn create_run(
        &self,
        connection_ids: &[Uuid],
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<BatchRunLog> {
        let now = Utc::now();
        let run = sqlx::query_as::<Postgres, BatchRunLog>(&format!(
            r#"
            INSERT INTO batch_run_logs (state, date_from, date_to, created_at, updated_at)
            VALUES ('draft', $1, $2, $3, $3)
            RETURNING {RUN_COLUMNS}
            "#
        ))
        .bind(date_from)
        .bind(date_to)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create batch run log")?;

        for connection_id in connection_ids {
            sqlx::query(
                "INSERT INTO batch_run_connections (run_id, connection_id) VALUES ($1, $2)",
            )
            .bind(run.id)
            .bind(connection_id)
            .execute(&self.pool)
            .await
            .context("Failed to attach connection to batch run")?;
        }
        Ok(run)
    }

    pub async fn get_run(&self, id: Uuid) -> Result<Option<BatchRunLog>> {
        let run = sqlx::query_as::<Postgres, BatchRunLog>(&format!(
            "SELECT {RUN_COLUMNS} FROM batch_run_logs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get batch run log")?;
        Ok(run)
    }

    pub async fn update_run(
        &self,
        run_id: Uuid,
        state: BatchState,
        transfer_count: i32,
    ) -> Result<BatchRunLog> {
        let run = sqlx::query_as::<Postgres, BatchRunLog>(&format!(
            r#"
            UPDATE batch_run_logs
            SET state = $2, transfer_count = $3, updated_at = $4
            WHERE id = $1
            RETURNING {RUN_COLUMNS}
            "#
        ))
        .bind(run_id)
        .bind(state)
        .bind(transfer_count)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to update batch run log")?;
        Ok(run)
    }

    /// Runs that made it past draft are kept as the audit trail.
    pub async fn delete_run(&self, run_id: Uuid) -> Result<()> {
        let Some(run) = self.get_run(run_id).await? else {
            bail!("batch run log {} not found", run_id);
        };
        if !run.can_delete() {
            bail!("only batch run logs in state 'draft' can be deleted");
        }
        sqlx::query("DELETE FROM batch_run_logs WHERE id = $1")
            .bind(run_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete batch run log")?;
        Ok(())
    }

    pub async fn run_connection_ids(&self, run_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT connection_id FROM batch_run_connections WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list batch run connections")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Connections that already have at least one log in this run, i.e.
    /// the attempted subset of [`Self::run_connection_ids`].
    pub async fn logged_connection_ids(&self, run_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT connection_id FROM connection_logs WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list logged batch run connections")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn create_connection_log(
        &self,
        run_id: Uuid,
        connection_id: Uuid,
        state: BatchState,
        error_count: i32,
        note: &str,
    ) -> Result<ConnectionLog> {
        let log = sqlx::query_as::<Postgres, ConnectionLog>(&format!(
            r#"
            INSERT INTO connection_logs (
                run_id, connection_id, state, error_count, note, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {LOG_COLUMNS}
            "#
        ))
        .bind(run_id)
        .bind(connection_id)
        .bind(state)
        .bind(error_count)
        .bind(note)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to create connection log")?;
        Ok(log)
    }

    pub async fn list_connection_logs(&self, run_id: Uuid) -> Result<Vec<ConnectionLog>> {
        let rows = sqlx::query_as::<Postgres, ConnectionLog>(&format!(
            "SELECT {LOG_COLUMNS} FROM connection_logs \
             WHERE run_id = $1 ORDER BY created_at ASC"
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list connection logs")?;
        Ok(rows)
    }

    /// Latest outcome per connection, the input to the roll-up rule. A
    /// reprocess sweep appends new logs; only the most recent one per
    /// connection reflects the current outcome.
    pub async fn latest_connection_outcomes(&self, run_id: Uuid) -> Result<Vec<BatchState>> {
        let rows: Vec<(BatchState,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (connection_id) state
            FROM connection_logs
            WHERE run_id = $1
            ORDER BY connection_id, created_at DESC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute latest connection outcomes")?;
        Ok(rows.into_iter().map(|(state,)| state).collect())
    }
}
