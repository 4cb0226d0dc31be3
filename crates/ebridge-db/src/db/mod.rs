//! Database repositories for the data access layer.
//!
//! One repository per entity. Connection-related repositories (connection,
//! identity, file format) back the registry and the identity lifecycle;
//! transfer and batch-log repositories back the processing pipeline.

pub mod batch;
pub mod connection;
pub mod file_format;
pub mod identity;
pub mod transfer;

pub use batch::BatchLogRepository;
pub use connection::ConnectionRepository;
pub use file_format::FileFormatRepository;
pub use identity::IdentityRepository;
pub use transfer::TransferRepository;
