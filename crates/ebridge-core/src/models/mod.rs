pub mod batch;
pub mod connection;
pub mod file_format;
pub mod identity;
pub mod transfer;

pub use batch::{BatchRunLog, BatchState, ConnectionLog};
pub use connection::{Connection, ConnectionSettings, ConnectionState, KeyVersion, ProtocolVersion};
pub use file_format::{FileFormat, TransferDirection};
pub use identity::{
    Artifact, IdentityState, IdentityTransition, SignatureClass, TransactionRights, UserIdentity,
    MIN_PASSPHRASE_LEN,
};
pub use transfer::{FileTransfer, Privilege, TransferState};
