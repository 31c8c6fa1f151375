use std::collections::HashMap;
use std::sync::Mutex;

use super::SharedStateBridge;
use crate::error::BridgeError;
use crate::lock;

/// In-process bridge for tests. Clones of the `Arc` holding it play the
/// role of the two processes.
#[derive(Debug, Default)]
pub struct MemoryBridge {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.entries).keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl SharedStateBridge for MemoryBridge {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BridgeError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), BridgeError> {
        lock(&self.entries).insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BridgeError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}
