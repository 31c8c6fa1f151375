//! Schedule snapshots: the minimal projection of a schedule the monitor
//! process needs to apply it.
//!
//! The table is one JSON object keyed by schedule name. Each entry is decoded
//! on its own so a single unreadable entry does not hide the others.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Schedule;
use crate::bridge::{keys, read_json, write_json, SharedStateBridge};
use crate::error::{BridgeError, CoreError};
use crate::policy::{AppToken, CategoryToken, RestrictionSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSnapshot {
    pub schedule_id: String,
    pub schedule_name: String,
    pub is_strict_mode: bool,
    /// Base64 of the JSON-encoded app token list.
    pub app_tokens: String,
    /// Base64 of the JSON-encoded category token list.
    pub category_tokens: String,
    pub domains: Vec<String>,
}

impl ScheduleSnapshot {
    pub fn from_schedule(schedule: &Schedule) -> Result<Self, CoreError> {
        let apps: Vec<&AppToken> = schedule.restrictions.apps.iter().collect();
        let categories: Vec<&CategoryToken> = schedule.restrictions.categories.iter().collect();
        Ok(Self {
            schedule_id: schedule.id.clone(),
            schedule_name: schedule.name.clone(),
            is_strict_mode: schedule.is_strict_mode,
            app_tokens: STANDARD.encode(serde_json::to_vec(&apps)?),
            category_tokens: STANDARD.encode(serde_json::to_vec(&categories)?),
            domains: schedule.restrictions.domains.iter().cloned().collect(),
        })
    }

    /// Decode the token blobs back into a restriction set.
    pub fn restriction_set(&self) -> Result<RestrictionSet, String> {
        let apps: Vec<AppToken> = decode_blob(&self.app_tokens).map_err(|e| format!("app tokens: {e}"))?;
        let categories: Vec<CategoryToken> =
            decode_blob(&self.category_tokens).map_err(|e| format!("category tokens: {e}"))?;
        Ok(RestrictionSet {
            apps: apps.into_iter().collect(),
            categories: categories.into_iter().collect(),
            domains: self.domains.iter().cloned().collect(),
        })
    }
}

fn decode_blob<T: serde::de::DeserializeOwned>(blob: &str) -> Result<T, String> {
    let bytes = STANDARD.decode(blob).map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

pub type SnapshotTable = BTreeMap<String, ScheduleSnapshot>;

/// Build the table for every enabled schedule.
pub fn build_table<'a, I>(schedules: I) -> Result<SnapshotTable, CoreError>
where
    I: IntoIterator<Item = &'a Schedule>,
{
    let mut table = SnapshotTable::new();
    for schedule in schedules.into_iter().filter(|s| s.is_enabled) {
        table.insert(schedule.name.clone(), ScheduleSnapshot::from_schedule(schedule)?);
    }
    Ok(table)
}

/// Replace the published table.
pub fn publish_table(bridge: &dyn SharedStateBridge, table: &SnapshotTable) -> Result<(), BridgeError> {
    write_json(bridge, keys::SCHEDULE_SNAPSHOTS, table)
}

/// Result of looking up one activity in the published table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLookup {
    Found(ScheduleSnapshot),
    Missing,
    Unreadable(String),
}

/// Look up the snapshot for `activity` without failing on unrelated entries.
pub fn lookup(bridge: &dyn SharedStateBridge, activity: &str) -> SnapshotLookup {
    let table: BTreeMap<String, serde_json::Value> = match read_json(bridge, keys::SCHEDULE_SNAPSHOTS) {
        Ok(Some(table)) => table,
        Ok(None) => return SnapshotLookup::Missing,
        Err(e) => return SnapshotLookup::Unreadable(e.to_string()),
    };
    match table.get(activity) {
        None => SnapshotLookup::Missing,
        Some(value) => match serde_json::from_value::<ScheduleSnapshot>(value.clone()) {
            Ok(snapshot) => SnapshotLookup::Found(snapshot),
            Err(e) => SnapshotLookup::Unreadable(e.to_string()),
        },
    }
}

/// Read the full published table, skipping undecodable entries.
pub fn load_table(bridge: &dyn SharedStateBridge) -> Result<SnapshotTable, BridgeError> {
    let raw: BTreeMap<String, serde_json::Value> =
        read_json(bridge, keys::SCHEDULE_SNAPSHOTS)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(name, value)| match serde_json::from_value(value) {
            Ok(snapshot) => Some((name, snapshot)),
            Err(e) => {
                tracing::warn!(activity = %name, "skipping unreadable snapshot: {e}");
                None
            }
        })
        .collect())
}
