use serde::Serialize;

use crate::session::{OverlaySignal, SessionSnapshot};

/// Everything the engine publishes to presenters and UIs.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    Overlay(OverlaySignal),
    StateChanged(SessionSnapshot),
    #[serde(rename_all = "camelCase")]
    AttemptRecorded {
        session_id: Option<String>,
        app_id: String,
        package: String,
        count: u32,
    },
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        session_id: Option<String>,
        remaining_secs: u64,
    },
    Completed(SessionSnapshot),
}
