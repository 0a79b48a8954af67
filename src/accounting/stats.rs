use serde::{Deserialize, Serialize};

use super::clock::HISTORY_DAYS;

/// Today's total plus the previous week, oldest day first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub today: f64,
    pub history: [f64; HISTORY_DAYS],
}

impl DailyStats {
    pub fn local_only(local_count: f64) -> Self {
        Self {
            today: local_count,
            history: [0.0; HISTORY_DAYS],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synced: usize,
    pub errors: usize,
}
