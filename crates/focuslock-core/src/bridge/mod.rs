//! Shared state bridge between the main process and the monitor process.
//!
//! The two processes share no memory and never call each other. Everything
//! the monitor needs is written here by the main process as one blob per
//! key, replaced atomically on every write. Readers see the last complete
//! write; there is no acknowledgement and no multi-key transaction.

mod memory;
mod sqlite;

pub use memory::MemoryBridge;
pub use sqlite::SqliteBridge;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::BridgeError;

/// Keys written to the bridge.
pub mod keys {
    /// Snapshot table for every enabled schedule, keyed by schedule name.
    pub const SCHEDULE_SNAPSHOTS: &str = "schedule.snapshots";
    /// Bounded FIFO of monitor diagnostic entries.
    pub const MONITOR_LOG: &str = "monitor.log";
    /// Recurring windows registered with the local trigger service.
    pub const TRIGGER_REGISTRY: &str = "triggers.registered";
    /// Activity names the local trigger service currently considers inside
    /// their interval.
    pub const TRIGGER_ACTIVE: &str = "triggers.active";
}

pub trait SharedStateBridge: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BridgeError>;

    /// Replace the value under `key` in one atomic write.
    fn write(&self, key: &str, value: &[u8]) -> Result<(), BridgeError>;

    fn remove(&self, key: &str) -> Result<(), BridgeError>;
}

/// Read and decode a JSON value.
pub fn read_json<T: DeserializeOwned>(
    bridge: &dyn SharedStateBridge,
    key: &str,
) -> Result<Option<T>, BridgeError> {
    match bridge.read(key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| BridgeError::Decode {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub fn write_json<T: Serialize + ?Sized>(
    bridge: &dyn SharedStateBridge,
    key: &str,
    value: &T,
) -> Result<(), BridgeError> {
    let bytes = serde_json::to_vec(value).map_err(|e| BridgeError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    bridge.write(key, &bytes)
}
