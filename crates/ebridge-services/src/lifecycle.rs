//! Identity lifecycle service.
//!
//! Drives a [`UserIdentity`] along its initialization path by combining the
//! transition table in `ebridge-core` with the provider calls each step
//! needs. Every operation validates the transition first, then calls the
//! provider, and mutates the identity only after the call succeeded: a
//! failed or timed-out call leaves state and artifacts exactly as they were.
//! Callers persist the mutated identity afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ebridge_core::config::ProviderConfig;
use ebridge_core::models::{Connection, IdentityTransition, UserIdentity, MIN_PASSPHRASE_LEN};
use ebridge_core::AppError;

use crate::provider::{self, KeyProvider, ProviderError};

pub struct IdentityLifecycle {
    provider: Arc<dyn KeyProvider>,
    call_timeout: Duration,
}

impl IdentityLifecycle {
    pub fn new(provider: Arc<dyn KeyProvider>, config: &ProviderConfig) -> Self {
        Self {
            provider,
            call_timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    /// Generate local keys, submit the public parts to the bank and store
    /// the initialization letter. Moves `draft` to `init`.
    #[tracing::instrument(skip(self, connection, identity), fields(connection = %connection.host_id, identity = %identity.name))]
    pub async fn begin_initialization(
        &self,
        connection: &Connection,
        identity: &mut UserIdentity,
    ) -> Result<(), AppError> {
        let target = identity
            .state
            .apply(IdentityTransition::BeginInitialization)?;
        if !identity.has_stored_passphrase() {
            return Err(AppError::Configuration(
                "identity has no stored passphrase".into(),
            ));
        }

        self.bounded("generate_keys", self.provider.generate_keys(connection, identity))
            .await?;
        let letter = self
            .bounded(
                "send_public_keys",
                self.provider.send_public_keys(connection, identity),
            )
            .await?;

        identity.keys_present = true;
        identity.ini_letter = Some(letter.data);
        identity.ini_letter_name = Some(letter.name);
        identity.state = target;
        tracing::info!("identity initialized, letter stored");
        Ok(())
    }

    /// The operator confirms the bank activated the submitted keys. No
    /// provider call; moves `init` to `get_bank_keys`.
    pub fn confirm_activation(&self, identity: &mut UserIdentity) -> Result<(), AppError> {
        identity.state = identity.state.apply(IdentityTransition::ConfirmActivation)?;
        Ok(())
    }

    /// Download the bank's public keys and store the fingerprint sheet for
    /// out-of-band verification. Moves `get_bank_keys` to `to_verify`.
    #[tracing::instrument(skip(self, connection, identity), fields(connection = %connection.host_id, identity = %identity.name))]
    pub async fn retrieve_bank_keys(
        &self,
        connection: &Connection,
        identity: &mut UserIdentity,
    ) -> Result<(), AppError> {
        let target = identity.state.apply(IdentityTransition::RetrieveBankKeys)?;
        let keys = self
            .bounded(
                "fetch_bank_keys",
                self.provider.fetch_bank_keys(connection, identity),
            )
            .await?;

        identity.bank_keys = Some(keys.data);
        identity.bank_keys_name = Some(keys.name);
        identity.state = target;
        tracing::info!("bank keys retrieved, awaiting verification");
        Ok(())
    }

    /// The operator confirms the bank key fingerprints. No provider call;
    /// moves `to_verify` to `active_keys`.
    pub fn confirm_verified(&self, identity: &mut UserIdentity) -> Result<(), AppError> {
        identity.state = identity.state.apply(IdentityTransition::ConfirmVerified)?;
        Ok(())
    }

    /// Re-encrypt the key material under a new passphrase. Only legal on a
    /// fully active identity; the stored passphrase changes only after the
    /// provider accepted the rotation.
    #[tracing::instrument(skip_all, fields(connection = %connection.host_id, identity = %identity.name))]
    pub async fn rotate_passphrase(
        &self,
        connection: &Connection,
        identity: &mut UserIdentity,
        current: &str,
        new: &str,
        confirm: &str,
    ) -> Result<(), AppError> {
        identity.state.apply(IdentityTransition::RotatePassphrase)?;
        if identity.passphrase.as_deref() != Some(current) {
            return Err(AppError::InvalidInput(
                "current passphrase does not match".into(),
            ));
        }
        if new != confirm {
            return Err(AppError::InvalidInput(
                "new passphrase and confirmation differ".into(),
            ));
        }
        if new == current {
            return Err(AppError::InvalidInput(
                "new passphrase must differ from the current one".into(),
            ));
        }
        if new.len() < MIN_PASSPHRASE_LEN {
            return Err(AppError::InvalidInput(format!(
                "the passphrase must be at least {} characters long",
                MIN_PASSPHRASE_LEN
            )));
        }

        self.bounded(
            "rotate_passphrase",
            self.provider.rotate_passphrase(connection, identity, new),
        )
        .await?;
        identity.set_passphrase(new)?;
        tracing::info!("passphrase rotated");
        Ok(())
    }

    /// Discard the initialization: clears both stored artifacts and returns
    /// to `draft` so the full path can be walked again. Local key material
    /// is regenerated on the next initialization.
    pub fn reset(&self, identity: &mut UserIdentity) -> Result<(), AppError> {
        let target = identity.state.apply(IdentityTransition::Reset)?;
        identity.ini_letter = None;
        identity.ini_letter_name = None;
        identity.bank_keys = None;
        identity.bank_keys_name = None;
        identity.keys_present = false;
        identity.state = target;
        tracing::info!(identity = %identity.name, "identity reset to draft");
        Ok(())
    }

    /// Send the identity back to `get_bank_keys` after the bank rotated its
    /// keys. The stale bank keys stay stored until re-retrieved.
    pub fn force_renew_bank_keys(&self, identity: &mut UserIdentity) -> Result<(), AppError> {
        identity.state = identity
            .state
            .apply(IdentityTransition::ForceRenewBankKeys)?;
        tracing::info!(identity = %identity.name, "bank key renewal requested");
        Ok(())
    }

    /// Operator override: mark an identity active without walking the
    /// initialization path (keys already exchanged out of band).
    pub fn force_active(&self, identity: &mut UserIdentity) -> Result<(), AppError> {
        identity.state = identity.state.apply(IdentityTransition::ForceActive)?;
        tracing::warn!(identity = %identity.name, "manual override: identity forced active");
        Ok(())
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        provider::bounded(self.call_timeout, op, fut).await
    }
}
