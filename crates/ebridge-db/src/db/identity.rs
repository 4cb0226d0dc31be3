//! User identity repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use ebridge_core::models::{SignatureClass, TransactionRights, UserIdentity};

const IDENTITY_COLUMNS: &str = "id, connection_id, name, signature_class, passphrase, \
     keys_present, state, transaction_rights, active, ini_letter, ini_letter_name, \
     bank_keys, bank_keys_name, created_at, updated_at";

#[derive(Clone)]
pub struct IdentityRepository {
    pool: PgPool,
}

impl IdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        connection_id: Uuid,
        name: &str,
        signature_class: SignatureClass,
        transaction_rights: TransactionRights,
    ) -> Result<UserIdentity> {
        let now = Utc::now();
        let identity = sqlx::query_as::<Postgres, UserIdentity>(&format!(
            r#"
            INSERT INTO user_identities (
                connection_id, name, signature_class, transaction_rights,
                state, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'draft', $5, $5)
            RETURNING {IDENTITY_COLUMNS}
            "#
        ))
        .bind(connection_id)
        .bind(name)
        .bind(signature_class)
        .bind(transaction_rights)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create user identity")?;
        Ok(identity)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<UserIdentity>> {
        let identity = sqlx::query_as::<Postgres, UserIdentity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM user_identities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user identity")?;
        Ok(identity)
    }

    pub async fn list_for_connection(&self, connection_id: Uuid) -> Result<Vec<UserIdentity>> {
        let rows = sqlx::query_as::<Postgres, UserIdentity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM user_identities \
             WHERE connection_id = $1 ORDER BY name ASC"
        ))
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list user identities")?;
        Ok(rows)
    }

    pub async fn count_for_connection(&self, connection_id: Uuid) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM user_identities WHERE connection_id = $1")
                .bind(connection_id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to count user identities")?;
        Ok(count.0)
    }

    /// Persist the full mutable state of an identity, artifacts included.
    /// State legality is the model's business; this is a plain write.
    pub async fn update(&self, identity: &UserIdentity) -> Result<UserIdentity> {
        let updated = sqlx::query_as::<Postgres, UserIdentity>(&format!(
            r#"
            UPDATE user_identities
            SET name = $2, signature_class = $3, passphrase = $4,
                keys_present = $5, state = $6, transaction_rights = $7,
                active = $8, ini_letter = $9, ini_letter_name = $10,
                bank_keys = $11, bank_keys_name = $12, updated_at = $13
            WHERE id = $1
            RETURNING {IDENTITY_COLUMNS}
            "#
        ))
        .bind(identity.id)
        .bind(&identity.name)
        .bind(identity.signature_class)
        .bind(&identity.passphrase)
        .bind(identity.keys_present)
        .bind(identity.state)
        .bind(identity.transaction_rights)
        .bind(identity.active)
        .bind(&identity.ini_letter)
        .bind(&identity.ini_letter_name)
        .bind(&identity.bank_keys)
        .bind(&identity.bank_keys_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to update user identity")?;
        Ok(updated)
    }
}
