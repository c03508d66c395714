//! # kad-store
//!
//! The peer's local value store: an in-memory `key -> value` map with no
//! replication, eviction, or TTL. Created at peer start and discarded at
//! shutdown -- persistence beyond that is out of scope.

use std::collections::HashMap;

use thiserror::Error;

/// Maximum size, in bytes, of a single stored value.
pub const MAX_VALUE_SIZE: usize = 65536;

/// Errors raised by value-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The value exceeds [`MAX_VALUE_SIZE`].
    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },
}

/// In-memory key/value store. Keys and values are opaque strings at this
/// interface; placement (which peers a key routes to) is the lookup
/// engine's concern, not the store's.
#[derive(Default)]
pub struct ValueStore {
    data: HashMap<String, String>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Store `value` under `key`. Idempotent -- a repeated `put` simply
    /// overwrites the prior value. Rejects values over [`MAX_VALUE_SIZE`]
    /// so a single STORE_VALUE request can't grow the in-memory map
    /// without bound.
    pub fn put(&mut self, key: String, value: String) -> Result<(), StoreError> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(StoreError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        tracing::debug!(key = %key, "value stored locally");
        self.data.insert(key, value);
        Ok(())
    }

    /// Look up `key`.
    pub fn get(&self, key: &str) -> Option<&String> {
        self.data.get(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
