//! Bounded diagnostic log written by the monitor process.
//!
//! The monitor has no console, so every callback leaves an entry in the
//! shared state bridge for the main process to display. Oldest entries are
//! dropped first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::bridge::{keys, read_json, write_json, SharedStateBridge};
use crate::error::BridgeError;

/// Hard upper bound regardless of configuration.
pub const MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEntry {
    pub timestamp: DateTime<Utc>,
    pub activity: String,
    pub event: String,
    pub outcome: String,
}

/// Append `entry`, keeping at most `cap` entries.
pub fn append(bridge: &dyn SharedStateBridge, cap: usize, entry: DiagnosticEntry) -> Result<(), BridgeError> {
    let cap = cap.clamp(1, MAX_ENTRIES);
    let mut log: VecDeque<DiagnosticEntry> = match read_json(bridge, keys::MONITOR_LOG) {
        Ok(log) => log.unwrap_or_default(),
        // An unreadable log is replaced rather than blocking new entries.
        Err(BridgeError::Decode { .. }) => VecDeque::new(),
        Err(e) => return Err(e),
    };
    log.push_back(entry);
    while log.len() > cap {
        log.pop_front();
    }
    write_json(bridge, keys::MONITOR_LOG, &log)
}

/// Entries, oldest first.
pub fn read(bridge: &dyn SharedStateBridge) -> Result<Vec<DiagnosticEntry>, BridgeError> {
    Ok(read_json(bridge, keys::MONITOR_LOG)?.unwrap_or_default())
}

pub fn clear(bridge: &dyn SharedStateBridge) -> Result<(), BridgeError> {
    bridge.remove(keys::MONITOR_LOG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryBridge;

    fn entry(n: usize) -> DiagnosticEntry {
        DiagnosticEntry {
            timestamp: Utc::now(),
            activity: format!("a{n}"),
            event: "intervalDidStart".into(),
            outcome: "applied".into(),
        }
    }

    #[test]
    fn log_is_bounded_fifo() {
        let bridge = MemoryBridge::new();
        for n in 0..150 {
            append(&bridge, 500, entry(n)).unwrap();
        }
        let log = read(&bridge).unwrap();
        assert_eq!(log.len(), MAX_ENTRIES);
        assert_eq!(log[0].activity, "a50");
        assert_eq!(log[99].activity, "a149");

        clear(&bridge).unwrap();
        assert!(read(&bridge).unwrap().is_empty());
    }

    #[test]
    fn corrupt_log_is_replaced() {
        let bridge = MemoryBridge::new();
        bridge.write(keys::MONITOR_LOG, b"garbage").unwrap();
        append(&bridge, 10, entry(1)).unwrap();
        assert_eq!(read(&bridge).unwrap().len(), 1);
    }
}
