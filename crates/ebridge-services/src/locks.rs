//! Per-connection serialization.
//!
//! At most one protocol conversation per connection at a time: manual
//! operations and the batch runner both take the connection's lock before
//! calling the provider. Locks are created lazily and shared by id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct ConnectionLocks {
    inner: Arc<StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl ConnectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for one connection. Hold the returned mutex across the
    /// whole provider conversation; other callers for the same connection
    /// queue behind it while different connections proceed in parallel.
    pub fn for_connection(&self, connection_id: Uuid) -> Arc<Mutex<()>> {
        let mut map = match self.inner.lock() {
            Ok(guard) => guard,
            // A poisoned map only means another thread panicked while
            // inserting; the map itself is still usable.
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(connection_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
