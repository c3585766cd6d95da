//! Blocking surface driven by the engine's overlay signals.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use log::{error, info, warn};
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{engine::EngineEvent, session::OverlaySignal};

/// Platform surface that covers a blocked app.
pub trait OverlayPresenter: Send + 'static {
    /// Whether the platform currently allows drawing over other apps.
    fn can_draw(&self) -> bool {
        true
    }

    /// Covers the screen. Called again with a new id when a different blocked
    /// app comes to the front while the overlay is up.
    fn attach(&mut self, app_id: &str) -> Result<()>;

    fn detach(&mut self) -> Result<()>;
}

/// Presenter for headless runs: the overlay is a log line.
#[derive(Debug, Default)]
pub struct LogOverlayPresenter;

impl OverlayPresenter for LogOverlayPresenter {
    fn attach(&mut self, app_id: &str) -> Result<()> {
        info!("[overlay] blocking {app_id}");
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        info!("[overlay] hidden");
        Ok(())
    }
}

/// Applies signals to a presenter, keeping attach/detach idempotent.
pub struct OverlayDispatcher<P: OverlayPresenter> {
    presenter: P,
    shown_for: Option<String>,
    enabled: Arc<AtomicBool>,
    warned_permission: bool,
}

impl<P: OverlayPresenter> OverlayDispatcher<P> {
    pub fn new(presenter: P, enabled: Arc<AtomicBool>) -> Self {
        Self {
            presenter,
            shown_for: None,
            enabled,
            warned_permission: false,
        }
    }

    pub fn shown_for(&self) -> Option<&str> {
        self.shown_for.as_deref()
    }

    pub fn apply(&mut self, signal: &OverlaySignal) -> Result<()> {
        match (signal.show, signal.app_id.as_deref()) {
            (true, Some(app_id)) => self.show(app_id),
            _ => self.hide(),
        }
    }

    fn show(&mut self, app_id: &str) -> Result<()> {
        if !self.enabled.load(Ordering::Relaxed) {
            return self.hide();
        }
        if self.shown_for.as_deref() == Some(app_id) {
            return Ok(());
        }
        if !self.presenter.can_draw() {
            if !self.warned_permission {
                warn!("Overlay permission missing; {app_id} stays visible");
                self.warned_permission = true;
            }
            return Ok(());
        }

        self.warned_permission = false;
        self.presenter.attach(app_id)?;
        self.shown_for = Some(app_id.to_string());
        Ok(())
    }

    fn hide(&mut self) -> Result<()> {
        if self.shown_for.is_none() {
            return Ok(());
        }
        self.presenter.detach()?;
        self.shown_for = None;
        Ok(())
    }
}

/// Feeds overlay events from the engine bus into the dispatcher until the
/// engine goes away.
pub fn spawn_overlay_worker<P: OverlayPresenter>(
    mut events: broadcast::Receiver<EngineEvent>,
    mut dispatcher: OverlayDispatcher<P>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::Overlay(signal)) => {
                    if let Err(err) = dispatcher.apply(&signal) {
                        error!("Failed to apply overlay signal: {err:#}");
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Overlay worker lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        if let Err(err) = dispatcher.apply(&OverlaySignal::hide()) {
            error!("Failed to hide overlay on shutdown: {err:#}");
        }
    })
}
