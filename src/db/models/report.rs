//! Mission history models for the weekly report view.

use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Attempt count for one catalog entry within a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopAttemptedApp {
    pub app_id: String,
    pub display_name: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session: Session,
    pub focused_secs: u64,
    pub completion_percent: f64,
    pub total_attempts: u32,
    pub top_apps: Vec<TopAttemptedApp>,
}

impl SessionReport {
    pub fn new(session: Session, total_attempts: u32, top_apps: Vec<TopAttemptedApp>) -> Self {
        Self {
            focused_secs: session.elapsed_secs(),
            completion_percent: session.progress_percent(),
            session,
            total_attempts,
            top_apps,
        }
    }
}
