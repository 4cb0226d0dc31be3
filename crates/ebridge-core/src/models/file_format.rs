//! File formats recognised on a connection.
//!
//! A format declares how one order/message type is framed: direction,
//! order type, filename suffix and, for downloads, the processor key used
//! to dispatch the imported file. Read mostly; edited only while the owning
//! connection is in draft.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::identity::SignatureClass;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "transfer_direction", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Up,
    Down,
}

impl Display for TransferDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TransferDirection::Up => write!(f, "up"),
            TransferDirection::Down => write!(f, "down"),
        }
    }
}

impl FromStr for TransferDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(TransferDirection::Up),
            "down" => Ok(TransferDirection::Down),
            _ => Err(anyhow::anyhow!("Invalid transfer direction: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FileFormat {
    pub id: Uuid,
    pub connection_id: Uuid,
    /// Request type, e.g. "camt.053" or "pain.001.001.03.sct".
    pub name: String,
    pub direction: TransferDirection,
    /// Protocol order type (FUL/FDL for format-neutral French banks,
    /// C53/Z53/CCT/... elsewhere).
    pub order_type: String,
    /// Filename suffix for generated transfer names, e.g. "camt.053.xml".
    pub suffix: String,
    /// Registry key of the import routine; downloads only.
    pub processor_key: Option<String>,
    /// Overrides the identity's default signature class when set.
    pub signature_class: Option<SignatureClass>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileFormat {
    pub fn is_download(&self) -> bool {
        self.direction == TransferDirection::Down
    }

    /// Transfer display name: "<host>_<order type>_<timestamp>.<suffix>".
    pub fn transfer_name(&self, host_id: &str, at: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}.{}",
            host_id,
            self.order_type,
            at.format("%Y%m%d%H%M%S"),
            self.suffix
        )
    }
}
