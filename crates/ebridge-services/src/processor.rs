//! File processor registry.
//!
//! Downloaded files are dispatched to an import routine by the format's
//! `processor_key`. Processors are registered at startup; an unknown key at
//! processing time is a configuration error, not a processing failure, and
//! leaves the transfer untouched.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use ebridge_core::AppError;

/// Result of a successful import: the records the processor created and a
/// human-readable summary written to the transfer's process note.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub created_record_ids: Vec<Uuid>,
    pub summary: String,
}

/// An import routine for one file format family. Implementations parse the
/// payload and create whatever downstream records apply; a returned error
/// message is recorded on the transfer, which stays reprocessable.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    async fn process(&self, name: &str, payload: &[u8]) -> Result<ProcessOutcome, String>;
}

impl std::fmt::Debug for dyn FileProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileProcessor")
    }
}

#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn FileProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, processor: Arc<dyn FileProcessor>) {
        self.processors.insert(key.into(), processor);
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn FileProcessor>, AppError> {
        self.processors.get(key).cloned().ok_or_else(|| {
            AppError::Configuration(format!("no processor registered for '{}'", key))
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.processors.contains_key(key)
    }
}
