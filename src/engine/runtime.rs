//! Single-writer runtime around the [`SessionController`].
//!
//! Clock ticks, foreground samples and UI commands all travel through one
//! bounded channel into one task, so "time ran out" and "blocked app
//! appeared" can never interleave. The ticker is respawned on every entry
//! into Running; each tick carries the generation it was spawned under and
//! ticks from an older generation are dropped.

use chrono::Utc;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    catalog::BlockableApp,
    db::{AppRepository, AttemptRecord, AttemptRepository, Database, SessionRepository},
    session::{
        Attempt, OverlaySignal, SessionController, SessionSnapshot, SessionState, StartKind,
        TickOutcome, TransitionError,
    },
};

use super::{EngineConfig, EngineError, EngineEvent};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Command {
    Start(Reply<Result<SessionSnapshot, TransitionError>>),
    Pause(Reply<Result<SessionSnapshot, TransitionError>>),
    Reset(Reply<SessionSnapshot>),
    SetDuration(u64, Reply<Result<SessionSnapshot, TransitionError>>),
    SetBlocked {
        app_id: String,
        blocked: bool,
        reply: Reply<()>,
    },
    SetAllBlocked(bool, Reply<()>),
    Snapshot(Reply<SessionSnapshot>),
    Apps(Reply<Vec<BlockableApp>>),
    Tick { generation: u64 },
    ForegroundSample(Option<String>),
    Shutdown,
}

/// Cloneable front door to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn start(&self) -> Result<SessionSnapshot, EngineError> {
        Ok(self.request(Command::Start).await??)
    }

    pub async fn pause(&self) -> Result<SessionSnapshot, EngineError> {
        Ok(self.request(Command::Pause).await??)
    }

    pub async fn reset(&self) -> Result<SessionSnapshot, EngineError> {
        self.request(Command::Reset).await
    }

    pub async fn set_duration(&self, secs: u64) -> Result<SessionSnapshot, EngineError> {
        Ok(self
            .request(|reply| Command::SetDuration(secs, reply))
            .await??)
    }

    pub async fn set_blocked(&self, app_id: &str, blocked: bool) -> Result<(), EngineError> {
        let app_id = app_id.to_string();
        self.request(|reply| Command::SetBlocked {
            app_id,
            blocked,
            reply,
        })
        .await
    }

    pub async fn set_all_blocked(&self, blocked: bool) -> Result<(), EngineError> {
        self.request(|reply| Command::SetAllBlocked(blocked, reply))
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, EngineError> {
        self.request(Command::Snapshot).await
    }

    pub async fn apps(&self) -> Result<Vec<BlockableApp>, EngineError> {
        self.request(Command::Apps).await
    }

    /// Delivers one observer sample. Samples queue behind earlier commands.
    pub async fn foreground_sample(&self, app_id: Option<String>) -> Result<(), EngineError> {
        self.send(Command::ForegroundSample(app_id)).await
    }

    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Stopped)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx.await.map_err(|_| EngineError::Stopped)
    }

    #[cfg(test)]
    pub(crate) async fn send_raw(&self, command: Command) -> Result<(), EngineError> {
        self.send(command).await
    }
}

pub struct Engine;

impl Engine {
    /// Spawns the engine task. Must be called inside a tokio runtime.
    pub fn spawn(
        controller: SessionController,
        db: Option<Database>,
        config: EngineConfig,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));

        let actor = EngineActor {
            controller,
            db,
            events: event_tx.clone(),
            commands: command_tx.downgrade(),
            ticker: None,
            generation: 0,
            ticks_since_heartbeat: 0,
            last_overlay: None,
            config,
        };

        let handle = tokio::spawn(actor.run(command_rx));

        (
            EngineHandle {
                commands: command_tx,
                events: event_tx,
            },
            handle,
        )
    }
}

struct EngineActor {
    controller: SessionController,
    db: Option<Database>,
    events: broadcast::Sender<EngineEvent>,
    commands: mpsc::WeakSender<Command>,
    ticker: Option<CancellationToken>,
    generation: u64,
    ticks_since_heartbeat: u32,
    last_overlay: Option<OverlaySignal>,
    config: EngineConfig,
}

impl EngineActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        log_info!(
            "engine started in state {}",
            self.controller.state().as_str()
        );

        while let Some(command) = commands.recv().await {
            match command {
                Command::Start(reply) => {
                    let _ = reply.send(self.handle_start());
                }
                Command::Pause(reply) => {
                    let _ = reply.send(self.handle_pause());
                }
                Command::Reset(reply) => {
                    let _ = reply.send(self.handle_reset());
                }
                Command::SetDuration(secs, reply) => {
                    let _ = reply.send(self.handle_set_duration(secs));
                }
                Command::SetBlocked {
                    app_id,
                    blocked,
                    reply,
                } => {
                    self.handle_set_blocked(&app_id, blocked);
                    let _ = reply.send(());
                }
                Command::SetAllBlocked(blocked, reply) => {
                    self.handle_set_all_blocked(blocked);
                    let _ = reply.send(());
                }
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.controller.snapshot());
                }
                Command::Apps(reply) => {
                    let _ = reply.send(self.controller.apps().to_vec());
                }
                Command::Tick { generation } => self.handle_tick(generation),
                Command::ForegroundSample(app_id) => self.handle_sample(app_id),
                Command::Shutdown => break,
            }
        }

        self.stop_ticker();
        log_info!("engine stopped");
    }

    fn handle_start(&mut self) -> Result<SessionSnapshot, TransitionError> {
        let kind = self.controller.start().map_err(|err| {
            log_info!("start refused: {err}");
            err
        })?;

        if kind == StartKind::Fresh {
            if let Some(db) = &self.db {
                db.submit("reset attempt counts", |conn| {
                    AppRepository::new(conn).reset_attempt_counts()
                });
            }
        }
        self.checkpoint_session("save session on start");
        self.spawn_ticker();

        let snapshot = self.controller.snapshot();
        log_info!(
            "mission {} {} with {}s remaining",
            snapshot.session.id.as_deref().unwrap_or("-"),
            if kind == StartKind::Fresh { "started" } else { "resumed" },
            snapshot.session.remaining_secs
        );
        self.publish(EngineEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    fn handle_pause(&mut self) -> Result<SessionSnapshot, TransitionError> {
        self.controller.pause()?;
        self.stop_ticker();
        self.checkpoint_session("save session on pause");
        self.publish_overlay(OverlaySignal::hide());

        let snapshot = self.controller.snapshot();
        log_info!(
            "mission paused with {}s remaining",
            snapshot.session.remaining_secs
        );
        self.publish(EngineEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    fn handle_reset(&mut self) -> SessionSnapshot {
        let previous = self.controller.session().clone();
        self.controller.reset();
        self.stop_ticker();

        // A completed mission stays completed in the history.
        if matches!(previous.state, SessionState::Running | SessionState::Paused) {
            if let (Some(db), Some(id)) = (&self.db, previous.id) {
                let now = Utc::now();
                db.submit("mark session reset", move |conn| {
                    SessionRepository::new(conn).mark_status(&id, SessionState::Idle, now)
                });
            }
        }
        self.publish_overlay(OverlaySignal::hide());

        let snapshot = self.controller.snapshot();
        log_info!("mission reset");
        self.publish(EngineEvent::StateChanged(snapshot.clone()));
        snapshot
    }

    fn handle_set_duration(&mut self, secs: u64) -> Result<SessionSnapshot, TransitionError> {
        self.controller.set_total_duration(secs)?;
        let snapshot = self.controller.snapshot();
        self.publish(EngineEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    fn handle_set_blocked(&mut self, app_id: &str, blocked: bool) {
        if self.controller.store().get(app_id).is_none() {
            log_debug!("ignoring block toggle for unknown app {app_id}");
            return;
        }
        self.controller.set_blocked(app_id, blocked);

        if let Some(db) = &self.db {
            let app_id = app_id.to_string();
            db.submit("save block flag", move |conn| {
                AppRepository::new(conn).set_blocked(&app_id, blocked)
            });
        }
        self.publish(EngineEvent::StateChanged(self.controller.snapshot()));
    }

    fn handle_set_all_blocked(&mut self, blocked: bool) {
        self.controller.set_all_blocked(blocked);
        if let Some(db) = &self.db {
            db.submit("save block flags", move |conn| {
                AppRepository::new(conn).set_all_blocked(blocked)
            });
        }
        self.publish(EngineEvent::StateChanged(self.controller.snapshot()));
    }

    fn handle_tick(&mut self, generation: u64) {
        if generation != self.generation {
            log_debug!(
                "dropping stale tick from generation {generation} (current {})",
                self.generation
            );
            return;
        }

        match self.controller.tick() {
            TickOutcome::Ignored => {}
            TickOutcome::Advanced { remaining_secs } => {
                self.ticks_since_heartbeat += 1;
                if self.ticks_since_heartbeat >= self.config.heartbeat_every_ticks.max(1) {
                    self.ticks_since_heartbeat = 0;
                    self.heartbeat(remaining_secs);
                }
            }
            TickOutcome::Completed { signal } => {
                self.stop_ticker();
                self.checkpoint_session("save session on completion");
                self.publish_overlay(signal);

                let snapshot = self.controller.snapshot();
                log_info!(
                    "mission {} completed",
                    snapshot.session.id.as_deref().unwrap_or("-")
                );
                self.publish(EngineEvent::StateChanged(snapshot.clone()));
                self.publish(EngineEvent::Completed(snapshot));
            }
        }
    }

    fn handle_sample(&mut self, app_id: Option<String>) {
        let outcome = self.controller.on_foreground_sample(app_id.as_deref());
        if let Some(attempt) = outcome.attempt {
            self.record_attempt(attempt);
        }
        self.publish_overlay(outcome.signal);
    }

    fn record_attempt(&mut self, attempt: Attempt) {
        let session_id = self.controller.session().id.clone();
        log_info!(
            "blocked {} ({}), attempt #{}",
            attempt.package,
            attempt.app_id,
            attempt.count
        );

        if let (Some(db), Some(session_id)) = (&self.db, session_id.clone()) {
            let record = AttemptRecord {
                id: None,
                session_id,
                app_id: attempt.app_id.clone(),
                package: attempt.package.clone(),
                occurred_at: Utc::now(),
            };
            let count = attempt.count;
            db.submit("record attempt", move |conn| {
                AttemptRepository::new(conn).insert(&record)?;
                AppRepository::new(conn).set_attempt_count(&record.app_id, count)
            });
        }

        self.publish(EngineEvent::AttemptRecorded {
            session_id,
            app_id: attempt.app_id,
            package: attempt.package,
            count: attempt.count,
        });
    }

    fn heartbeat(&self, remaining_secs: u64) {
        let session_id = self.controller.session().id.clone();
        if let (Some(db), Some(id)) = (&self.db, session_id.clone()) {
            let now = Utc::now();
            db.submit("save session progress", move |conn| {
                SessionRepository::new(conn).update_progress(&id, remaining_secs, now)
            });
        }
        self.publish(EngineEvent::Heartbeat {
            session_id,
            remaining_secs,
        });
    }

    fn checkpoint_session(&self, label: &'static str) {
        let Some(db) = &self.db else {
            return;
        };
        let session = self.controller.session().clone();
        if session.id.is_none() {
            return;
        }
        db.submit(label, move |conn| SessionRepository::new(conn).save(&session));
    }

    fn spawn_ticker(&mut self) {
        self.stop_ticker();
        self.ticks_since_heartbeat = 0;

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let commands = self.commands.clone();
        let generation = self.generation;
        let period = self.config.tick_interval;

        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(sender) = commands.upgrade() else {
                            break;
                        };
                        if sender.send(Command::Tick { generation }).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        self.ticker = Some(token);
    }

    /// Cancels the ticker and retires its generation, so ticks already queued are ignored.
    fn stop_ticker(&mut self) {
        if let Some(token) = self.ticker.take() {
            token.cancel();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Every `show` goes out so a presenter that could not draw earlier gets
    /// another chance; consecutive `hide`s collapse into one.
    fn publish_overlay(&mut self, signal: OverlaySignal) {
        if !signal.show && self.last_overlay.as_ref() == Some(&signal) {
            return;
        }
        self.last_overlay = Some(signal.clone());
        self.publish(EngineEvent::Overlay(signal));
    }

    fn publish(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            log_debug!("no event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::catalog::{AppCategory, BlockListStore};
    use tempfile::TempDir;

    fn controller(total: u64) -> SessionController {
        let store = BlockListStore::from_apps(vec![
            BlockableApp::new("yt", "YouTube", AppCategory::Entertainment, true),
            BlockableApp::new("wa", "WhatsApp", AppCategory::Communication, false),
        ]);
        SessionController::new(store, total)
    }

    fn config(tick: Duration) -> EngineConfig {
        EngineConfig {
            tick_interval: tick,
            ..EngineConfig::default()
        }
    }

    fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn clock_completes_mission_exactly_once() {
        let (engine, _task) = Engine::spawn(controller(5), None, config(Duration::from_secs(1)));
        let mut events = engine.subscribe();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(7_500)).await;

        let snapshot = engine.snapshot().await.unwrap();
        assert_eq!(snapshot.session.state, SessionState::Completed);
        assert_eq!(snapshot.session.remaining_secs, 0);

        let completions = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::Completed(_)))
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_the_clock() {
        let (engine, _task) = Engine::spawn(controller(100), None, config(Duration::from_secs(1)));
        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let paused = engine.pause().await.unwrap();
        assert_eq!(paused.session.remaining_secs, 97);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(engine.snapshot().await.unwrap().session.remaining_secs, 97);

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(engine.snapshot().await.unwrap().session.remaining_secs, 95);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_ticks_are_dropped() {
        let (engine, _task) = Engine::spawn(controller(100), None, config(Duration::from_secs(3600)));
        engine.start().await.unwrap();
        engine.pause().await.unwrap();
        engine.start().await.unwrap();

        // First ticker ran under generation 1; the pause retired it.
        for stale in [0, 1, 2] {
            engine.send_raw(Command::Tick { generation: stale }).await.unwrap();
        }
        assert_eq!(engine.snapshot().await.unwrap().session.remaining_secs, 100);

        engine.send_raw(Command::Tick { generation: 3 }).await.unwrap();
        assert_eq!(engine.snapshot().await.unwrap().session.remaining_secs, 99);
    }

    #[tokio::test]
    async fn blocked_app_counts_once_per_visit_but_keeps_showing() {
        let (engine, _task) = Engine::spawn(controller(100), None, config(Duration::from_secs(3600)));
        let mut events = engine.subscribe();
        engine.start().await.unwrap();

        for _ in 0..3 {
            engine.foreground_sample(Some("yt".into())).await.unwrap();
        }
        engine.foreground_sample(Some("wa".into())).await.unwrap();
        engine.foreground_sample(None).await.unwrap();

        let apps = engine.apps().await.unwrap();
        assert_eq!(apps[0].attempt_count, 1);
        assert_eq!(apps[1].attempt_count, 0);

        let events = drain(&mut events);
        let overlays: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Overlay(signal) => Some(signal.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            overlays,
            vec![
                OverlaySignal::show("yt"),
                OverlaySignal::show("yt"),
                OverlaySignal::show("yt"),
                OverlaySignal::hide(),
            ]
        );
        let attempts = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::AttemptRecorded { .. }))
            .count();
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn empty_block_list_is_refused() {
        let (engine, _task) = Engine::spawn(controller(100), None, config(Duration::from_secs(3600)));
        engine.set_all_blocked(false).await.unwrap();

        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, EngineError::Transition(_)));
        assert_eq!(
            engine.snapshot().await.unwrap().session.state,
            SessionState::Idle
        );
    }

    #[tokio::test]
    async fn unknown_app_toggle_is_ignored() {
        let (engine, _task) = Engine::spawn(controller(100), None, config(Duration::from_secs(3600)));
        engine.set_blocked("nope", true).await.unwrap();
        engine.set_blocked("wa", true).await.unwrap();
        assert_eq!(engine.snapshot().await.unwrap().blocked_count, 2);
    }

    #[tokio::test]
    async fn shutdown_stops_the_engine() {
        let (engine, task) = Engine::spawn(controller(100), None, config(Duration::from_secs(3600)));
        engine.shutdown().await.unwrap();
        task.await.unwrap();
        assert_eq!(engine.snapshot().await.unwrap_err(), EngineError::Stopped);
    }

    #[tokio::test]
    async fn transitions_are_checkpointed() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("detox.sqlite3")).unwrap();
        let store = BlockListStore::from_apps(db.load_catalog().await.unwrap());
        let controller = SessionController::new(store, 100);

        let (engine, _task) =
            Engine::spawn(controller, Some(db.clone()), config(Duration::from_secs(3600)));
        let started = engine.start().await.unwrap();
        let session_id = started.session.id.clone().unwrap();

        engine
            .foreground_sample(Some("com.google.android.youtube".into()))
            .await
            .unwrap();
        engine.pause().await.unwrap();

        let saved = db.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(saved.state, SessionState::Paused);

        let top = db.top_attempted_apps(&session_id, 3).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].attempts, 1);

        let apps = db.get_apps().await.unwrap();
        let youtube = apps
            .iter()
            .find(|a| a.id == "com.google.android.youtube")
            .unwrap();
        assert_eq!(youtube.attempt_count, 1);

        engine.reset().await.unwrap();
        let saved = db.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(saved.state, SessionState::Idle);
        assert!(db.recover_incomplete_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_keeps_completed_missions_in_history() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("detox.sqlite3")).unwrap();
        let store = BlockListStore::from_apps(db.load_catalog().await.unwrap());

        let (engine, _task) = Engine::spawn(
            SessionController::new(store, 2),
            Some(db.clone()),
            config(Duration::from_millis(10)),
        );
        let mut events = engine.subscribe();
        let started = engine.start().await.unwrap();
        let session_id = started.session.id.clone().unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(EngineEvent::Completed(_)) = events.recv().await {
                    break;
                }
            }
        })
        .await
        .unwrap();

        let stored = db.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::Completed);

        let reset = engine.reset().await.unwrap();
        assert_eq!(reset.session.state, SessionState::Idle);

        let stored = db.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::Completed);
        assert_eq!(stored.remaining_secs, 0);
    }
}
