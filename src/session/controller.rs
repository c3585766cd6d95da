//! Mission lifecycle and overlay decisions.
//!
//! ```text
//! Idle -> Running -> (Paused | Completed)
//! Paused -> Running
//! any -> Idle (reset)
//! ```
//!
//! The controller owns no threads. The engine runtime feeds it ticks and
//! foreground samples one at a time.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::{BlockListStore, BlockableApp};

use super::{OverlaySignal, Session, SessionAction, SessionState, TransitionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    /// Entered from Idle; attempt counters were cleared.
    Fresh,
    /// Resumed from Paused.
    Resumed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Ignored,
    Advanced { remaining_secs: u64 },
    Completed { signal: OverlaySignal },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Catalog entry charged with the attempt.
    pub app_id: String,
    /// Package that was actually foregrounded.
    pub package: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOutcome {
    pub signal: OverlaySignal,
    pub attempt: Option<Attempt>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session: Session,
    pub progress_percent: f64,
    pub blocked_count: usize,
}

#[derive(Debug, Clone)]
pub struct SessionController {
    store: BlockListStore,
    session: Session,
}

impl SessionController {
    pub fn new(store: BlockListStore, total_duration_secs: u64) -> Self {
        Self {
            store,
            session: Session::new(total_duration_secs),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn store(&self) -> &BlockListStore {
        &self.store
    }

    pub fn apps(&self) -> &[BlockableApp] {
        self.store.get_all()
    }

    pub fn set_blocked(&mut self, app_id: &str, blocked: bool) {
        self.store.set_blocked(app_id, blocked);
    }

    pub fn set_all_blocked(&mut self, blocked: bool) {
        self.store.set_all_blocked(blocked);
    }

    /// Changes the mission length. Only an idle mission can be reconfigured.
    pub fn set_total_duration(&mut self, secs: u64) -> Result<(), TransitionError> {
        if self.session.state != SessionState::Idle {
            return Err(TransitionError::invalid(
                self.session.state,
                SessionAction::Configure,
                "mission is in progress",
            ));
        }
        self.session.total_duration_secs = secs;
        self.session.remaining_secs = secs;
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.clone(),
            progress_percent: self.session.progress_percent(),
            blocked_count: self.store.blocked_count(),
        }
    }

    pub fn start(&mut self) -> Result<StartKind, TransitionError> {
        let from = self.session.state;
        let kind = match from {
            SessionState::Idle => StartKind::Fresh,
            SessionState::Paused => StartKind::Resumed,
            SessionState::Running => {
                return Err(TransitionError::invalid(
                    from,
                    SessionAction::Start,
                    "mission is already running",
                ))
            }
            SessionState::Completed => {
                return Err(TransitionError::invalid(
                    from,
                    SessionAction::Start,
                    "reset the mission first",
                ))
            }
        };

        if self.store.blocked_count() == 0 {
            return Err(TransitionError::invalid(
                from,
                SessionAction::Start,
                "no apps are blocked",
            ));
        }

        let now = Utc::now();
        match kind {
            StartKind::Fresh => {
                if self.session.total_duration_secs == 0 {
                    return Err(TransitionError::invalid(
                        from,
                        SessionAction::Start,
                        "mission has no time remaining",
                    ));
                }
                self.store.reset_attempts();
                self.session.begin(Uuid::new_v4().to_string(), now);
            }
            StartKind::Resumed => {
                if self.session.remaining_secs == 0 {
                    return Err(TransitionError::invalid(
                        from,
                        SessionAction::Start,
                        "mission has no time remaining",
                    ));
                }
                self.session.state = SessionState::Running;
                self.session.updated_at = Some(now);
            }
        }

        Ok(kind)
    }

    pub fn pause(&mut self) -> Result<(), TransitionError> {
        if self.session.state != SessionState::Running {
            return Err(TransitionError::invalid(
                self.session.state,
                SessionAction::Pause,
                "mission is not running",
            ));
        }
        self.session.state = SessionState::Paused;
        self.session.updated_at = Some(Utc::now());
        Ok(())
    }

    /// Rewinds the clock. Attempt counts stay visible until the next fresh start.
    pub fn reset(&mut self) {
        self.session.rewind(Utc::now());
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.session.state != SessionState::Running {
            return TickOutcome::Ignored;
        }

        self.session.remaining_secs = self.session.remaining_secs.saturating_sub(1);
        self.session.updated_at = Some(Utc::now());

        if self.session.remaining_secs == 0 {
            self.session.state = SessionState::Completed;
            TickOutcome::Completed {
                signal: OverlaySignal::hide(),
            }
        } else {
            TickOutcome::Advanced {
                remaining_secs: self.session.remaining_secs,
            }
        }
    }

    /// Applies one foreground observation.
    ///
    /// Attempts are edge-triggered: a blocked app is charged once per visit,
    /// however many consecutive samples report it.
    pub fn on_foreground_sample(&mut self, app_id: Option<&str>) -> SampleOutcome {
        let app_id = app_id.filter(|id| !id.is_empty());
        let is_edge = self.session.active_foreground_app_id.as_deref() != app_id;
        self.session.active_foreground_app_id = app_id.map(str::to_owned);

        let hide = SampleOutcome {
            signal: OverlaySignal::hide(),
            attempt: None,
        };

        let Some(package) = app_id else {
            return hide;
        };
        if self.session.state != SessionState::Running {
            return hide;
        }
        let Some(entry_id) = self
            .store
            .resolve(package)
            .filter(|app| app.is_blocked)
            .map(|app| app.id.clone())
        else {
            return hide;
        };

        let attempt = if is_edge {
            self.store.record_attempt(&entry_id).map(|count| Attempt {
                app_id: entry_id,
                package: package.to_string(),
                count,
            })
        } else {
            None
        };

        SampleOutcome {
            signal: OverlaySignal::show(package),
            attempt,
        }
    }

    /// Reinstates a checkpointed session after a restart.
    ///
    /// A session that was running comes back paused so the clock does not
    /// jump while the process was down.
    pub fn restore(&mut self, mut session: Session) {
        session.remaining_secs = session.remaining_secs.min(session.total_duration_secs);
        session.state = match session.state {
            SessionState::Running | SessionState::Paused if session.remaining_secs == 0 => {
                SessionState::Completed
            }
            SessionState::Running => SessionState::Paused,
            other => other,
        };
        session.active_foreground_app_id = None;
        self.session = session;
    }
}
