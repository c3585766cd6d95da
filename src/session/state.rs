use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Completed,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Running => "Running",
            SessionState::Paused => "Paused",
            SessionState::Completed => "Completed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Idle" => Ok(SessionState::Idle),
            "Running" => Ok(SessionState::Running),
            "Paused" => Ok(SessionState::Paused),
            "Completed" => Ok(SessionState::Completed),
            other => Err(anyhow!("unknown session state '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Assigned on every fresh start; kept through pause, completion and reset.
    pub id: Option<String>,
    pub state: SessionState,
    pub total_duration_secs: u64,
    pub remaining_secs: u64,
    pub active_foreground_app_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(total_duration_secs: u64) -> Self {
        Self {
            id: None,
            state: SessionState::Idle,
            total_duration_secs,
            remaining_secs: total_duration_secs,
            active_foreground_app_id: None,
            started_at: None,
            updated_at: None,
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.total_duration_secs.saturating_sub(self.remaining_secs)
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_duration_secs == 0 {
            return 0.0;
        }
        self.elapsed_secs() as f64 / self.total_duration_secs as f64 * 100.0
    }

    pub(crate) fn begin(&mut self, id: String, now: DateTime<Utc>) {
        self.id = Some(id);
        self.state = SessionState::Running;
        self.remaining_secs = self.total_duration_secs;
        self.started_at = Some(now);
        self.updated_at = Some(now);
    }

    pub(crate) fn rewind(&mut self, now: DateTime<Utc>) {
        self.state = SessionState::Idle;
        self.remaining_secs = self.total_duration_secs;
        self.updated_at = Some(now);
    }
}
