//! Bank connection configuration.
//!
//! A connection identifies one bank relationship: host, endpoint URL,
//! partner id and protocol/key versions. Structural parameters are mutable
//! only while the connection is in `draft`; once confirmed for use they are
//! read-only until an operator re-opens the configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

pub const MIN_KEY_BITLENGTH: i32 = 1536;
pub const MAX_KEY_BITLENGTH: i32 = 4096;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "connection_state", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Draft,
    Confirm,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ConnectionState::Draft => write!(f, "draft"),
            ConnectionState::Confirm => write!(f, "confirm"),
        }
    }
}

impl FromStr for ConnectionState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ConnectionState::Draft),
            "confirm" => Ok(ConnectionState::Confirm),
            _ => Err(anyhow::anyhow!("Invalid connection state: {}", s)),
        }
    }
}

/// EBICS protocol version spoken with the bank host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text"))]
pub enum ProtocolVersion {
    H003,
    H004,
    H005,
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProtocolVersion::H003 => write!(f, "H003"),
            ProtocolVersion::H004 => write!(f, "H004"),
            ProtocolVersion::H005 => write!(f, "H005"),
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "H003" => Ok(ProtocolVersion::H003),
            "H004" => Ok(ProtocolVersion::H004),
            "H005" => Ok(ProtocolVersion::H005),
            _ => Err(anyhow::anyhow!("Invalid protocol version: {}", s)),
        }
    }
}

/// Electronic signature key version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text"))]
pub enum KeyVersion {
    /// RSASSA-PKCS1-v1_5
    A005,
    /// RSASSA-PSS
    A006,
}

impl Display for KeyVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            KeyVersion::A005 => write!(f, "A005"),
            KeyVersion::A006 => write!(f, "A006"),
        }
    }
}

impl FromStr for KeyVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A005" => Ok(KeyVersion::A005),
            "A006" => Ok(KeyVersion::A006),
            _ => Err(anyhow::anyhow!("Invalid key version: {}", s)),
        }
    }
}

/// Structural parameters, editable only while the connection is `draft`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub name: String,
    pub host_id: String,
    pub url: String,
    pub partner_id: String,
    pub protocol_version: ProtocolVersion,
    pub key_version: KeyVersion,
    pub key_bitlength: i32,
}

impl ConnectionSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.host_id.trim().is_empty() {
            return Err(AppError::InvalidInput("host id must not be empty".into()));
        }
        if self.partner_id.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "partner id must not be empty".into(),
            ));
        }
        if !(MIN_KEY_BITLENGTH..=MAX_KEY_BITLENGTH).contains(&self.key_bitlength) {
            return Err(AppError::InvalidInput(format!(
                "key bitlength must be between {} and {}",
                MIN_KEY_BITLENGTH, MAX_KEY_BITLENGTH
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Connection {
    pub id: Uuid,
    pub name: String,
    pub host_id: String,
    pub url: String,
    pub partner_id: String,
    pub protocol_version: ProtocolVersion,
    pub key_version: KeyVersion,
    pub key_bitlength: i32,
    /// H003 requires client-side order number generation ('A000'..'ZZZZ',
    /// unique per partner). Unused for H004/H005.
    pub order_number: String,
    pub state: ConnectionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    pub fn is_editable(&self) -> bool {
        self.state == ConnectionState::Draft
    }

    /// Apply new structural settings. Rejected once the connection is
    /// confirmed for use.
    pub fn apply_settings(&mut self, settings: ConnectionSettings) -> Result<(), AppError> {
        if !self.is_editable() {
            return Err(AppError::invalid_transition(self.state, "apply_settings"));
        }
        settings.validate()?;
        self.name = settings.name;
        self.host_id = settings.host_id;
        self.url = settings.url;
        self.partner_id = settings.partner_id;
        self.protocol_version = settings.protocol_version;
        self.key_version = settings.key_version;
        self.key_bitlength = settings.key_bitlength;
        Ok(())
    }

    /// Confirm the connection for use. Requires at least one user identity.
    pub fn set_to_confirm(&mut self, identity_count: usize) -> Result<(), AppError> {
        if self.state != ConnectionState::Draft {
            return Err(AppError::invalid_transition(self.state, "set_to_confirm"));
        }
        if identity_count == 0 {
            return Err(AppError::InvalidInput(
                "cannot confirm a connection without a user identity".into(),
            ));
        }
        self.state = ConnectionState::Confirm;
        Ok(())
    }

    /// Re-open the configuration. Always available; identities and file
    /// history are untouched.
    pub fn set_to_draft(&mut self) {
        self.state = ConnectionState::Draft;
    }

    /// Next H003 order id, advancing the per-partner counter. The id is a
    /// base-26 string between 'A000' and 'ZZZZ'.
    pub fn next_order_number(&mut self) -> String {
        let current = self.order_number.clone();
        self.order_number = increment_order_number(&current);
        current
    }
}

fn increment_order_number(current: &str) -> String {
    let chars: Vec<char> = current.chars().collect();
    let well_formed = chars.len() == 4
        && chars[0].is_ascii_uppercase()
        && chars[1..]
            .iter()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase());
    if !well_formed {
        return "A000".to_string();
    }
    let mut digits: Vec<u32> = chars
        .iter()
        .map(|c| {
            if c.is_ascii_digit() {
                c.to_digit(10).unwrap_or(0)
            } else {
                10 + (*c as u32).saturating_sub('A' as u32)
            }
        })
        .collect();
    // First position is A-Z only, the rest 0-9A-Z.
    for i in (0..4).rev() {
        digits[i] += 1;
        let base = if i == 0 { 26 } else { 36 };
        let offset = if i == 0 { digits[i] - 10 } else { digits[i] };
        if offset < base {
            break;
        }
        digits[i] = if i == 0 { 10 } else { 0 };
        if i == 0 {
            // Wrapped past 'ZZZZ'.
            return "A000".to_string();
        }
    }
    digits
        .iter()
        .map(|&d| {
            if d < 10 {
                char::from_digit(d, 10).unwrap_or('0')
            } else {
                char::from_u32('A' as u32 + d - 10).unwrap_or('A')
            }
        })
        .collect()
}
