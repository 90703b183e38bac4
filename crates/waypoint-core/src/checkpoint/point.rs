//! Window-local recovery points and the eviction policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who asked for a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotType {
    Auto,
    Manual,
}

impl SnapshotType {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotType::Auto => "auto",
            SnapshotType::Manual => "manual",
        }
    }
}

impl std::str::FromStr for SnapshotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(SnapshotType::Auto),
            "manual" => Ok(SnapshotType::Manual),
            other => Err(format!("unknown snapshot type '{other}'")),
        }
    }
}

/// An immutable pointer to a persisted snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    /// Store key of the snapshot payload.
    pub state_key: String,
    pub snapshot_type: SnapshotType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_context: Option<Value>,
}

/// Drops points until `points.len() <= max`.
///
/// Each round removes the oldest auto point, or the oldest manual point once
/// no auto point is left. Returns the evicted points in eviction order.
pub fn enforce_limit(points: &mut Vec<RecoveryPoint>, max: usize) -> Vec<RecoveryPoint> {
    let mut evicted = Vec::new();
    while points.len() > max {
        let victim = oldest_index(points, SnapshotType::Auto)
            .or_else(|| oldest_index(points, SnapshotType::Manual));
        match victim {
            Some(index) => evicted.push(points.remove(index)),
            None => break,
        }
    }
    evicted
}

fn oldest_index(points: &[RecoveryPoint], kind: SnapshotType) -> Option<usize> {
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.snapshot_type == kind)
        .min_by_key(|(_, p)| p.timestamp)
        .map(|(i, _)| i)
}

/// Inserts `point` keeping timestamp order. Returns `false` if its id is
/// already held.
pub fn merge_point(points: &mut Vec<RecoveryPoint>, point: RecoveryPoint) -> bool {
    if points.iter().any(|p| p.id == point.id) {
        return false;
    }
    let at = points.partition_point(|p| p.timestamp <= point.timestamp);
    points.insert(at, point);
    true
}

/// Newest-first view, optionally filtered by type.
pub fn recent(points: &[RecoveryPoint], filter: Option<SnapshotType>, max: usize) -> Vec<&RecoveryPoint> {
    let mut selected: Vec<&RecoveryPoint> = points
        .iter()
        .filter(|p| filter.is_none_or(|kind| p.snapshot_type == kind))
        .collect();
    selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    selected.truncate(max);
    selected
}
