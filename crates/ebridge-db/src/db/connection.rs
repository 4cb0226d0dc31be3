//! Connection repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use ebridge_core::models::{Connection, ConnectionSettings, ConnectionState};

const CONNECTION_COLUMNS: &str = "id, name, host_id, url, partner_id, protocol_version, \
     key_version, key_bitlength, order_number, state, created_at, updated_at";

#[derive(Clone)]
pub struct ConnectionRepository {
    pool: PgPool,
}

impl ConnectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, settings: &ConnectionSettings) -> Result<Connection> {
        let now = Utc::now();
        let conn = sqlx::query_as::<Postgres, Connection>(&format!(
            r#"
            INSERT INTO connections (
                name, host_id, url, partner_id, protocol_version,
                key_version, key_bitlength, order_number, state,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'A000', 'draft', $8, $8)
            RETURNING {CONNECTION_COLUMNS}
            "#
        ))
        .bind(&settings.name)
        .bind(&settings.host_id)
        .bind(&settings.url)
        .bind(&settings.partner_id)
        .bind(settings.protocol_version)
        .bind(settings.key_version)
        .bind(settings.key_bitlength)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create connection")?;
        Ok(conn)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Connection>> {
        let conn = sqlx::query_as::<Postgres, Connection>(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get connection")?;
        Ok(conn)
    }

    pub async fn list(&self) -> Result<Vec<Connection>> {
        let rows = sqlx::query_as::<Postgres, Connection>(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list connections")?;
        Ok(rows)
    }

    /// Connections eligible for unattended batch runs.
    pub async fn list_confirmed(&self) -> Result<Vec<Connection>> {
        let rows = sqlx::query_as::<Postgres, Connection>(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections WHERE state = $1 ORDER BY name ASC"
        ))
        .bind(ConnectionState::Confirm)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list confirmed connections")?;
        Ok(rows)
    }

    /// Persist the full mutable state of a connection. The structural-edit
    /// guard lives on the model; callers mutate a loaded `Connection` and
    /// hand it back here.
    pub async fn update(&self, conn: &Connection) -> Result<Connection> {
        let updated = sqlx::query_as::<Postgres, Connection>(&format!(
            r#"
            UPDATE connections
            SET name = $2, host_id = $3, url = $4, partner_id = $5,
                protocol_version = $6, key_version = $7, key_bitlength = $8,
                order_number = $9, state = $10, updated_at = $11
            WHERE id = $1
            RETURNING {CONNECTION_COLUMNS}
            "#
        ))
        .bind(conn.id)
        .bind(&conn.name)
        .bind(&conn.host_id)
        .bind(&conn.url)
        .bind(&conn.partner_id)
        .bind(conn.protocol_version)
        .bind(conn.key_version)
        .bind(conn.key_bitlength)
        .bind(&conn.order_number)
        .bind(conn.state)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to update connection")?;
        Ok(updated)
    }
}
