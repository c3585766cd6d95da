//! One blocked app reaching the foreground during a running mission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub id: Option<i64>,
    pub session_id: String,
    /// Catalog entry charged with the attempt.
    pub app_id: String,
    /// Package the platform reported.
    pub package: String,
    pub occurred_at: DateTime<Utc>,
}
