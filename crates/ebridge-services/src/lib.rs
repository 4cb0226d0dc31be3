pub mod lifecycle;
pub mod locks;
pub mod processor;
pub mod provider;
pub mod transfer;

pub use lifecycle::IdentityLifecycle;
pub use locks::ConnectionLocks;
pub use processor::{FileProcessor, ProcessOutcome, ProcessorRegistry};
pub use provider::{KeyProvider, ProviderError, ProviderErrorKind, RawFile, UploadReceipt};
pub use transfer::{DownloadedFile, TransferService};
