//! Database access layer for ebridge.
//!
//! One repository per entity; each owns a `PgPool` clone and exposes the
//! queries the services need. Schema lives in `migrations/`.

pub mod db;

pub use db::{
    BatchLogRepository, ConnectionRepository, FileFormatRepository, IdentityRepository,
    TransferRepository,
};

/// Run pending migrations. Call once at startup.
pub async fn run_migrations(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))
}
