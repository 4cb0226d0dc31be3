//! User identity and its lifecycle state machine.
//!
//! One identity is one cryptographic credential bound to a connection. The
//! transition table in [`IdentityState::apply`] is the single source of
//! truth for which operation is legal in which state; services and
//! presentation layers both query it instead of encoding their own rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

pub const MIN_PASSPHRASE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "identity_state", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum IdentityState {
    /// Created, no key material yet.
    Draft,
    /// Keys generated and sent; awaiting bank-side operator activation.
    Init,
    /// Activated by the bank; ready to retrieve the bank's public keys.
    GetBankKeys,
    /// Bank keys downloaded, awaiting out-of-band fingerprint verification.
    ToVerify,
    /// Fully usable for protocol operations.
    ActiveKeys,
}

impl Display for IdentityState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            IdentityState::Draft => write!(f, "draft"),
            IdentityState::Init => write!(f, "init"),
            IdentityState::GetBankKeys => write!(f, "get_bank_keys"),
            IdentityState::ToVerify => write!(f, "to_verify"),
            IdentityState::ActiveKeys => write!(f, "active_keys"),
        }
    }
}

impl FromStr for IdentityState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(IdentityState::Draft),
            "init" => Ok(IdentityState::Init),
            "get_bank_keys" => Ok(IdentityState::GetBankKeys),
            "to_verify" => Ok(IdentityState::ToVerify),
            "active_keys" => Ok(IdentityState::ActiveKeys),
            _ => Err(anyhow::anyhow!("Invalid identity state: {}", s)),
        }
    }
}

/// Lifecycle operations. `ForceActive` is an operator override and is
/// logged distinctly from automated transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdentityTransition {
    BeginInitialization,
    ConfirmActivation,
    RetrieveBankKeys,
    ConfirmVerified,
    RotatePassphrase,
    Reset,
    ForceRenewBankKeys,
    ForceActive,
}

impl Display for IdentityTransition {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            IdentityTransition::BeginInitialization => write!(f, "begin_initialization"),
            IdentityTransition::ConfirmActivation => write!(f, "confirm_activation"),
            IdentityTransition::RetrieveBankKeys => write!(f, "retrieve_bank_keys"),
            IdentityTransition::ConfirmVerified => write!(f, "confirm_verified"),
            IdentityTransition::RotatePassphrase => write!(f, "rotate_passphrase"),
            IdentityTransition::Reset => write!(f, "reset"),
            IdentityTransition::ForceRenewBankKeys => write!(f, "force_renew_bank_keys"),
            IdentityTransition::ForceActive => write!(f, "force_active"),
        }
    }
}

impl IdentityTransition {
    /// Operator overrides bypass the normal path and must be logged as such.
    pub fn is_override(&self) -> bool {
        matches!(self, IdentityTransition::ForceActive)
    }
}

impl IdentityState {
    /// The transition table. Returns the target state, or an
    /// [`AppError::InvalidTransition`] leaving the caller's state untouched.
    pub fn apply(self, transition: IdentityTransition) -> Result<IdentityState, AppError> {
        use IdentityState::*;
        use IdentityTransition::*;
        match (self, transition) {
            (Draft, BeginInitialization) => Ok(Init),
            (Draft, ForceActive) => Ok(ActiveKeys),
            (Init, ConfirmActivation) => Ok(GetBankKeys),
            (GetBankKeys, RetrieveBankKeys) => Ok(ToVerify),
            (ToVerify, ConfirmVerified) => Ok(ActiveKeys),
            (ActiveKeys, RotatePassphrase) => Ok(ActiveKeys),
            (ActiveKeys, Reset) => Ok(Draft),
            (ActiveKeys, ForceRenewBankKeys) => Ok(GetBankKeys),
            (from, action) => Err(AppError::invalid_transition(from, action)),
        }
    }

    /// Presentation-layer query: is `transition` legal from this state?
    pub fn can_apply(self, transition: IdentityTransition) -> bool {
        self.apply(transition).is_ok()
    }
}

/// EBICS signature class. Class T identities only transport data; class E
/// identities can authorise orders on their own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text"))]
pub enum SignatureClass {
    /// Single signature.
    E,
    /// Transport signature.
    T,
}

impl Display for SignatureClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SignatureClass::E => write!(f, "E"),
            SignatureClass::T => write!(f, "T"),
        }
    }
}

impl FromStr for SignatureClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "E" => Ok(SignatureClass::E),
            "T" => Ok(SignatureClass::T),
            _ => Err(anyhow::anyhow!("Invalid signature class: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "transaction_rights", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionRights {
    Both,
    DownloadOnly,
    UploadOnly,
}

impl TransactionRights {
    pub fn allows_download(&self) -> bool {
        matches!(self, TransactionRights::Both | TransactionRights::DownloadOnly)
    }

    pub fn allows_upload(&self) -> bool {
        matches!(self, TransactionRights::Both | TransactionRights::UploadOnly)
    }
}

/// An artifact produced as a side effect of a lifecycle transition
/// (INI letter, downloaded bank keys). Not independently settable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UserIdentity {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub name: String,
    pub signature_class: SignatureClass,
    /// Write-only secret protecting the local key material. Never rendered
    /// back out once set.
    #[serde(skip_serializing, default)]
    pub passphrase: Option<String>,
    /// Local key material exists (in the provider's keystore).
    pub keys_present: bool,
    pub state: IdentityState,
    pub transaction_rights: TransactionRights,
    pub active: bool,
    pub ini_letter: Option<Vec<u8>>,
    pub ini_letter_name: Option<String>,
    pub bank_keys: Option<Vec<u8>>,
    pub bank_keys_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserIdentity {
    pub fn has_stored_passphrase(&self) -> bool {
        self.passphrase.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Usable for unattended protocol operations.
    pub fn is_usable(&self) -> bool {
        self.active && self.state == IdentityState::ActiveKeys && self.has_stored_passphrase()
    }

    pub fn set_passphrase(&mut self, passphrase: &str) -> Result<(), AppError> {
        if passphrase.len() < MIN_PASSPHRASE_LEN {
            return Err(AppError::InvalidInput(format!(
                "the passphrase must be at least {} characters long",
                MIN_PASSPHRASE_LEN
            )));
        }
        self.passphrase = Some(passphrase.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_roundtrip() {
        for state in [
            IdentityState::Draft,
            IdentityState::Init,
            IdentityState::GetBankKeys,
            IdentityState::ToVerify,
            IdentityState::ActiveKeys,
        ] {
            assert_eq!(state.to_string().parse::<IdentityState>().unwrap(), state);
        }
        assert!("unknown".parse::<IdentityState>().is_err());
    }

    #[test]
    fn test_nominal_path_is_the_only_path_to_active_keys() {
        use IdentityTransition::*;
        let mut state = IdentityState::Draft;
        for t in [
            BeginInitialization,
            ConfirmActivation,
            RetrieveBankKeys,
            ConfirmVerified,
        ] {
            state = state.apply(t).unwrap();
        }
        assert_eq!(state, IdentityState::ActiveKeys);

        // No other transition reaches active_keys except the explicit bypass.
        let all = [
            BeginInitialization,
            ConfirmActivation,
            RetrieveBankKeys,
            ConfirmVerified,
            RotatePassphrase,
            Reset,
            ForceRenewBankKeys,
            ForceActive,
        ];
        for from in [
            IdentityState::Draft,
            IdentityState::Init,
            IdentityState::GetBankKeys,
            IdentityState::ToVerify,
        ] {
            for t in all {
                if let Ok(IdentityState::ActiveKeys) = from.apply(t) {
                    let bypass = from == IdentityState::Draft && t == ForceActive;
                    let nominal = from == IdentityState::ToVerify && t == ConfirmVerified;
                    assert!(bypass || nominal, "unexpected path: {} + {}", from, t);
                }
            }
        }
    }

    #[test]
    fn test_force_active_bypass_from_draft_only() {
        assert_eq!(
            IdentityState::Draft
                .apply(IdentityTransition::ForceActive)
                .unwrap(),
            IdentityState::ActiveKeys
        );
        assert!(IdentityState::Init
            .apply(IdentityTransition::ForceActive)
            .is_err());
        assert!(IdentityState::ToVerify
            .apply(IdentityTransition::ForceActive)
            .is_err());
    }

    #[test]
    fn test_confirm_verified_from_draft_rejected() {
        let err = IdentityState::Draft
            .apply(IdentityTransition::ConfirmVerified)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[test]
    fn test_active_keys_reentrant_transitions() {
        let active = IdentityState::ActiveKeys;
        assert_eq!(
            active.apply(IdentityTransition::RotatePassphrase).unwrap(),
            IdentityState::ActiveKeys
        );
        assert_eq!(
            active.apply(IdentityTransition::Reset).unwrap(),
            IdentityState::Draft
        );
        assert_eq!(
            active.apply(IdentityTransition::ForceRenewBankKeys).unwrap(),
            IdentityState::GetBankKeys
        );
    }

    #[test]
    fn test_rotate_passphrase_requires_active_keys() {
        for from in [
            IdentityState::Draft,
            IdentityState::Init,
            IdentityState::GetBankKeys,
            IdentityState::ToVerify,
        ] {
            assert!(!from.can_apply(IdentityTransition::RotatePassphrase));
        }
    }

    #[test]
    fn test_only_force_active_is_an_override() {
        assert!(IdentityTransition::ForceActive.is_override());
        assert!(!IdentityTransition::Reset.is_override());
        assert!(!IdentityTransition::ConfirmVerified.is_override());
    }

    #[test]
    fn test_transaction_rights() {
        assert!(TransactionRights::Both.allows_download());
        assert!(TransactionRights::Both.allows_upload());
        assert!(TransactionRights::DownloadOnly.allows_download());
        assert!(!TransactionRights::DownloadOnly.allows_upload());
        assert!(!TransactionRights::UploadOnly.allows_download());
    }

    #[test]
    fn test_passphrase_is_write_only_across_serialization() {
        let mut identity = sample_identity();
        identity.passphrase = Some("correct horse battery".into());

        let json = serde_json::to_string(&identity).unwrap();
        assert!(!json.contains("passphrase"));
        assert!(!json.contains("correct horse battery"));

        // The omitted field must not break deserialization of our own output.
        let back: UserIdentity = serde_json::from_str(&json).unwrap();
        assert!(back.passphrase.is_none());
        assert_eq!(back.name, identity.name);
    }

    #[test]
    fn test_passphrase_minimum_length() {
        let mut identity = sample_identity();
        assert!(identity.set_passphrase("short").is_err());
        assert!(identity.set_passphrase("long enough secret").is_ok());
        assert!(identity.has_stored_passphrase());
    }

    #[test]
    fn test_is_usable() {
        let mut identity = sample_identity();
        identity.state = IdentityState::ActiveKeys;
        identity.passphrase = Some("correct horse battery".into());
        assert!(identity.is_usable());
        identity.active = false;
        assert!(!identity.is_usable());
        identity.active = true;
        identity.state = IdentityState::ToVerify;
        assert!(!identity.is_usable());
    }

    fn sample_identity() -> UserIdentity {
        UserIdentity {
            id: Uuid::new_v4(),
            connection_id: Uuid::new_v4(),
            name: "USER1".into(),
            signature_class: SignatureClass::T,
            passphrase: None,
            keys_present: false,
            state: IdentityState::Draft,
            transaction_rights: TransactionRights::Both,
            active: true,
            ini_letter: None,
            ini_letter_name: None,
            bank_keys: None,
            bank_keys_name: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
