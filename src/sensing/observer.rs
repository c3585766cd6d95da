use std::{
    collections::VecDeque,
    sync::{Mutex, RwLock},
    time::{Duration, Instant},
};

/// Reports which application is in the foreground.
///
/// `None` means no answer is available: the home screen, a missing
/// permission, or an event source that is not ready. Implementations must
/// not panic; the sampling loop may call them from a blocking worker.
pub trait ForegroundAppObserver: Send + Sync {
    fn sample(&self) -> Option<String>;
}

#[derive(Debug, Default)]
struct PushState {
    ready: bool,
    current: Option<String>,
}

/// Observer fed by platform window-change events.
///
/// The platform calls [`PushObserver::report`] whenever a window comes to
/// the front; `sample` returns the most recent report.
#[derive(Debug, Default)]
pub struct PushObserver {
    state: RwLock<PushState>,
}

impl PushObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, package: impl Into<String>) {
        let package = package.into();
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        guard.ready = true;
        guard.current = (!package.is_empty()).then_some(package);
    }

    /// The foreground is something the platform cannot name (home screen, lock screen).
    pub fn clear(&self) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        guard.ready = true;
        guard.current = None;
    }

    /// The event source went away, e.g. the accessibility permission was revoked.
    pub fn disconnect(&self) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        *guard = PushState::default();
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().map(|guard| guard.ready).unwrap_or(false)
    }
}

impl ForegroundAppObserver for PushObserver {
    fn sample(&self) -> Option<String> {
        let guard = self.state.read().ok()?;
        if !guard.ready {
            return None;
        }
        guard.current.clone()
    }
}

/// Always reports the same package.
#[derive(Debug, Clone)]
pub struct FixedObserver(pub Option<String>);

impl ForegroundAppObserver for FixedObserver {
    fn sample(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Lookback used when querying usage events.
pub const DEFAULT_USAGE_WINDOW: Duration = Duration::from_secs(5);

/// Observer backed by a usage-events log rather than window callbacks.
///
/// The platform records every activity-resumed style event; `sample` returns
/// the package of the newest event inside the lookback window, or `None`
/// when nothing moved to the front recently.
#[derive(Debug)]
pub struct UsageWindowObserver {
    window: Duration,
    events: Mutex<VecDeque<(Instant, String)>>,
}

impl UsageWindowObserver {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn record(&self, package: impl Into<String>) {
        self.record_at(package, Instant::now());
    }

    pub fn record_at(&self, package: impl Into<String>, at: Instant) {
        let package = package.into();
        if package.is_empty() {
            return;
        }
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push_back((at, package));
    }

    fn newest_within(&self, now: Instant) -> Option<String> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cutoff) = now.checked_sub(self.window) {
            events.retain(|(at, _)| *at >= cutoff);
        }
        events
            .iter()
            .filter(|(at, _)| *at <= now)
            .max_by_key(|(at, _)| *at)
            .map(|(_, package)| package.clone())
    }
}

impl Default for UsageWindowObserver {
    fn default() -> Self {
        Self::new(DEFAULT_USAGE_WINDOW)
    }
}

impl ForegroundAppObserver for UsageWindowObserver {
    fn sample(&self) -> Option<String> {
        self.newest_within(Instant::now())
    }
}
