//! Line-oriented command surface standing in for the mission screens.

use std::{
    fmt::Write as _,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    db::Database,
    engine::EngineHandle,
    sensing::{ForegroundAppObserver, PushObserver, UsageWindowObserver},
    session::SessionSnapshot,
    settings::{MissionSettings, OverlaySettings, SettingsStore},
};

const REPORT_SESSIONS: usize = 5;
const REPORT_TOP_APPS: usize = 3;

const HELP: &str = "commands: start | pause | reset | status | apps | block <id> | unblock <id> | \
block-all | unblock-all | fg <package> | fg-clear | report | duration <minutes> | \
overlay on|off | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Pause,
    Reset,
    Status,
    Apps,
    Block(String),
    Unblock(String),
    BlockAll,
    UnblockAll,
    Foreground(String),
    ForegroundClear,
    Report,
    Duration { minutes: u64 },
    Overlay(bool),
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();
    if parts.next().is_some() {
        bail!("too many arguments for '{verb}'");
    }

    let verb = verb.to_ascii_lowercase();
    let command = match (verb.as_str(), arg) {
        ("start", None) => ConsoleCommand::Start,
        ("pause", None) => ConsoleCommand::Pause,
        ("reset", None) => ConsoleCommand::Reset,
        ("status", None) => ConsoleCommand::Status,
        ("apps", None) => ConsoleCommand::Apps,
        ("block", Some(id)) => ConsoleCommand::Block(id.to_string()),
        ("unblock", Some(id)) => ConsoleCommand::Unblock(id.to_string()),
        ("block-all", None) => ConsoleCommand::BlockAll,
        ("unblock-all", None) => ConsoleCommand::UnblockAll,
        ("fg", Some(package)) => ConsoleCommand::Foreground(package.to_string()),
        ("fg-clear", None) => ConsoleCommand::ForegroundClear,
        ("report", None) => ConsoleCommand::Report,
        ("duration", Some(minutes)) => {
            let minutes: u64 = minutes
                .parse()
                .with_context(|| format!("'{minutes}' is not a number of minutes"))?;
            if minutes == 0 {
                bail!("duration must be at least one minute");
            }
            ConsoleCommand::Duration { minutes }
        }
        ("overlay", Some("on")) => ConsoleCommand::Overlay(true),
        ("overlay", Some("off")) => ConsoleCommand::Overlay(false),
        ("help", None) => ConsoleCommand::Help,
        ("quit" | "exit", None) => ConsoleCommand::Quit,
        ("block" | "unblock" | "fg" | "duration" | "overlay", _) => {
            bail!("usage: {verb} <{}>", usage_arg(&verb))
        }
        (_, Some(_)) if is_known(&verb) => bail!("'{verb}' takes no arguments"),
        _ => bail!("unknown command '{verb}'"),
    };
    Ok(Some(command))
}

fn usage_arg(verb: &str) -> &'static str {
    match verb {
        "fg" => "package",
        "duration" => "minutes",
        "overlay" => "on|off",
        _ => "id",
    }
}

fn is_known(verb: &str) -> bool {
    matches!(
        verb,
        "start"
            | "pause"
            | "reset"
            | "status"
            | "apps"
            | "block-all"
            | "unblock-all"
            | "fg-clear"
            | "report"
            | "help"
            | "quit"
            | "exit"
    )
}

/// Observer that `fg` lines stand in for platform events on.
#[derive(Clone)]
pub enum ForegroundFeed {
    Window(Arc<PushObserver>),
    Usage(Arc<UsageWindowObserver>),
}

impl ForegroundFeed {
    pub fn observer(&self) -> Arc<dyn ForegroundAppObserver> {
        match self {
            ForegroundFeed::Window(observer) => observer.clone(),
            ForegroundFeed::Usage(observer) => observer.clone(),
        }
    }

    fn report(&self, package: &str) {
        match self {
            ForegroundFeed::Window(observer) => observer.report(package),
            ForegroundFeed::Usage(observer) => observer.record(package),
        }
    }

    /// Usage events have no "nothing in front" record; they age out of the window.
    fn clear(&self) {
        if let ForegroundFeed::Window(observer) = self {
            observer.clear();
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ConsoleReply {
    Output(String),
    Quit,
}

pub struct Console {
    engine: EngineHandle,
    feed: ForegroundFeed,
    db: Database,
    settings: Arc<SettingsStore>,
    overlay_enabled: Arc<AtomicBool>,
}

impl Console {
    pub fn new(
        engine: EngineHandle,
        feed: ForegroundFeed,
        db: Database,
        settings: Arc<SettingsStore>,
        overlay_enabled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            engine,
            feed,
            db,
            settings,
            overlay_enabled,
        }
    }

    pub async fn execute(&self, command: ConsoleCommand) -> Result<ConsoleReply> {
        let output = match command {
            ConsoleCommand::Start => format_status(&self.engine.start().await?),
            ConsoleCommand::Pause => format_status(&self.engine.pause().await?),
            ConsoleCommand::Reset => format_status(&self.engine.reset().await?),
            ConsoleCommand::Status => format_status(&self.engine.snapshot().await?),
            ConsoleCommand::Apps => self.format_apps().await?,
            ConsoleCommand::Block(id) => self.toggle(&id, true).await?,
            ConsoleCommand::Unblock(id) => self.toggle(&id, false).await?,
            ConsoleCommand::BlockAll => {
                self.engine.set_all_blocked(true).await?;
                format_status(&self.engine.snapshot().await?)
            }
            ConsoleCommand::UnblockAll => {
                self.engine.set_all_blocked(false).await?;
                format_status(&self.engine.snapshot().await?)
            }
            ConsoleCommand::Foreground(package) => {
                self.feed.report(&package);
                format!("foreground: {package}")
            }
            ConsoleCommand::ForegroundClear => {
                self.feed.clear();
                "foreground: none".to_string()
            }
            ConsoleCommand::Report => self.format_report().await?,
            ConsoleCommand::Duration { minutes } => self.set_duration(minutes).await?,
            ConsoleCommand::Overlay(enabled) => {
                self.settings.update_overlay(OverlaySettings { enabled })?;
                self.overlay_enabled.store(enabled, Ordering::Relaxed);
                format!("overlay {}", if enabled { "on" } else { "off" })
            }
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => return Ok(ConsoleReply::Quit),
        };
        Ok(ConsoleReply::Output(output))
    }

    /// Applies the new length to the engine and settings together; a failed
    /// settings write puts the engine back on the old length.
    async fn set_duration(&self, minutes: u64) -> Result<String> {
        let secs = minutes.saturating_mul(60);
        let previous = self.settings.mission();
        let snapshot = self.engine.set_duration(secs).await?;

        let persisted = self.settings.update_mission(MissionSettings {
            total_duration_secs: secs,
            ..previous.clone()
        });
        if let Err(err) = persisted {
            self.engine
                .set_duration(previous.total_duration_secs)
                .await
                .context("failed to restore mission length")?;
            return Err(err);
        }
        Ok(format_status(&snapshot))
    }

    async fn toggle(&self, id: &str, blocked: bool) -> Result<String> {
        let known = self.engine.apps().await?.iter().any(|app| app.id == id);
        if !known {
            return Ok(format!("unknown app '{id}'"));
        }
        self.engine.set_blocked(id, blocked).await?;
        Ok(format!(
            "{id} {}",
            if blocked { "blocked" } else { "allowed" }
        ))
    }

    async fn format_apps(&self) -> Result<String> {
        let apps = self.engine.apps().await?;
        let mut out = String::new();
        for app in apps {
            let _ = writeln!(
                out,
                "[{}] {:<36} {:<16} {:<14} attempts={}",
                if app.is_blocked { "x" } else { " " },
                app.id,
                app.display_name,
                app.category.as_str(),
                app.attempt_count
            );
        }
        Ok(out.trim_end().to_string())
    }

    async fn format_report(&self) -> Result<String> {
        let reports = self
            .db
            .session_reports(REPORT_SESSIONS, REPORT_TOP_APPS)
            .await?;
        if reports.is_empty() {
            return Ok("no missions yet".to_string());
        }

        let mut out = String::new();
        for report in reports {
            let _ = writeln!(
                out,
                "{} {:<9} focused {} ({:.0}%), {} attempts",
                report.session.id.as_deref().unwrap_or("-"),
                report.session.state.as_str(),
                format_clock(report.focused_secs),
                report.completion_percent,
                report.total_attempts
            );
            for top in report.top_apps {
                let _ = writeln!(
                    out,
                    "    {:<24} {}",
                    top.display_name.as_deref().unwrap_or(&top.app_id),
                    top.attempts
                );
            }
        }
        Ok(out.trim_end().to_string())
    }
}

fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn format_status(snapshot: &SessionSnapshot) -> String {
    let session = &snapshot.session;
    format!(
        "{} {} / {} ({:.0}%), {} apps blocked",
        session.state.as_str(),
        format_clock(session.remaining_secs),
        format_clock(session.total_duration_secs),
        snapshot.progress_percent,
        snapshot.blocked_count
    )
}

/// Reads commands from stdin until `quit` or end of input.
pub async fn run_console(console: Console) -> Result<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        match console.execute(command).await {
            Ok(ConsoleReply::Output(output)) => println!("{output}"),
            Ok(ConsoleReply::Quit) => break,
            Err(err) => println!("error: {err:#}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::BlockListStore,
        engine::{Engine, EngineConfig},
        session::{SessionController, SessionState},
    };
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn parses_every_verb() {
        let cases = [
            ("start", ConsoleCommand::Start),
            ("  PAUSE ", ConsoleCommand::Pause),
            ("block com.whatsapp", ConsoleCommand::Block("com.whatsapp".into())),
            ("unblock com.whatsapp", ConsoleCommand::Unblock("com.whatsapp".into())),
            ("block-all", ConsoleCommand::BlockAll),
            ("fg com.games.chess", ConsoleCommand::Foreground("com.games.chess".into())),
            ("fg-clear", ConsoleCommand::ForegroundClear),
            ("duration 25", ConsoleCommand::Duration { minutes: 25 }),
            ("overlay off", ConsoleCommand::Overlay(false)),
            ("exit", ConsoleCommand::Quit),
        ];
        for (line, expected) in cases {
            assert_eq!(parse_command(line).unwrap(), Some(expected), "{line}");
        }
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn rejects_malformed_lines() {
        for line in [
            "block",
            "duration soon",
            "duration 0",
            "overlay maybe",
            "start now",
            "launch",
            "fg a b",
        ] {
            assert!(parse_command(line).is_err(), "{line}");
        }
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(7200), "02:00:00");
        assert_eq!(format_clock(3599), "00:59:59");
    }

    async fn console(dir: &TempDir) -> (Console, Arc<PushObserver>, Arc<AtomicBool>) {
        console_with_settings(dir, dir.path().join("settings.json")).await
    }

    async fn console_with_settings(
        dir: &TempDir,
        settings_path: std::path::PathBuf,
    ) -> (Console, Arc<PushObserver>, Arc<AtomicBool>) {
        let db = Database::new(dir.path().join("detox.sqlite3")).unwrap();
        let settings = Arc::new(SettingsStore::new(settings_path).unwrap());
        let store = BlockListStore::from_apps(db.load_catalog().await.unwrap());
        let config = EngineConfig {
            tick_interval: Duration::from_secs(3600),
            ..EngineConfig::default()
        };
        let (engine, _task) =
            Engine::spawn(SessionController::new(store, 600), Some(db.clone()), config);
        let observer = Arc::new(PushObserver::new());
        let overlay = Arc::new(AtomicBool::new(true));
        let feed = ForegroundFeed::Window(observer.clone());
        (
            Console::new(engine, feed, db, settings, overlay.clone()),
            observer,
            overlay,
        )
    }

    #[tokio::test]
    async fn drives_a_mission() {
        let dir = TempDir::new().unwrap();
        let (console, observer, _) = console(&dir).await;

        let reply = console.execute(ConsoleCommand::Start).await.unwrap();
        assert!(matches!(reply, ConsoleReply::Output(ref s) if s.starts_with("Running")));

        console
            .execute(ConsoleCommand::Foreground("com.games.chess".into()))
            .await
            .unwrap();
        assert!(observer.is_ready());

        let reply = console.execute(ConsoleCommand::Pause).await.unwrap();
        assert!(matches!(reply, ConsoleReply::Output(ref s) if s.starts_with("Paused")));

        assert_eq!(
            console.execute(ConsoleCommand::Quit).await.unwrap(),
            ConsoleReply::Quit
        );
    }

    #[tokio::test]
    async fn duration_and_overlay_are_persisted() {
        let dir = TempDir::new().unwrap();
        let (console, _, overlay) = console(&dir).await;

        console
            .execute(ConsoleCommand::Duration { minutes: 25 })
            .await
            .unwrap();
        console.execute(ConsoleCommand::Overlay(false)).await.unwrap();
        assert!(!overlay.load(Ordering::Relaxed));

        let snapshot = console.engine.snapshot().await.unwrap();
        assert_eq!(snapshot.session.state, SessionState::Idle);
        assert_eq!(snapshot.session.remaining_secs, 1500);

        let reopened = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(reopened.mission().total_duration_secs, 1500);
        assert!(!reopened.overlay().enabled);
    }

    #[tokio::test]
    async fn unknown_app_is_reported_not_toggled() {
        let dir = TempDir::new().unwrap();
        let (console, _, _) = console(&dir).await;

        let reply = console
            .execute(ConsoleCommand::Block("com.example.none".into()))
            .await
            .unwrap();
        assert_eq!(
            reply,
            ConsoleReply::Output("unknown app 'com.example.none'".into())
        );
    }

    #[tokio::test]
    async fn refused_start_surfaces_as_error() {
        let dir = TempDir::new().unwrap();
        let (console, _, _) = console(&dir).await;

        console.execute(ConsoleCommand::UnblockAll).await.unwrap();
        assert!(console.execute(ConsoleCommand::Start).await.is_err());
    }

    #[tokio::test]
    async fn failed_settings_write_keeps_old_duration() {
        let dir = TempDir::new().unwrap();
        let unwritable = dir.path().join("missing").join("settings.json");
        let (console, _, _) = console_with_settings(&dir, unwritable).await;

        let result = console.execute(ConsoleCommand::Duration { minutes: 25 }).await;
        assert!(result.is_err());

        let snapshot = console.engine.snapshot().await.unwrap();
        assert_eq!(snapshot.session.total_duration_secs, 600);
        assert_eq!(snapshot.session.remaining_secs, 600);
    }

    #[tokio::test]
    async fn report_lists_missions_with_their_attempts() {
        let dir = TempDir::new().unwrap();
        let (console, _, _) = console(&dir).await;

        assert_eq!(
            console.execute(ConsoleCommand::Report).await.unwrap(),
            ConsoleReply::Output("no missions yet".into())
        );

        console.execute(ConsoleCommand::Start).await.unwrap();
        console
            .engine
            .foreground_sample(Some("com.games.chess".into()))
            .await
            .unwrap();
        console.engine.foreground_sample(None).await.unwrap();
        console
            .engine
            .foreground_sample(Some("com.games.puzzle".into()))
            .await
            .unwrap();
        console.execute(ConsoleCommand::Pause).await.unwrap();

        let ConsoleReply::Output(report) = console.execute(ConsoleCommand::Report).await.unwrap()
        else {
            panic!("report should print");
        };
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 2, "{report}");
        assert!(lines[0].contains("Paused"), "{report}");
        assert!(lines[0].ends_with("2 attempts"), "{report}");
        assert!(lines[1].trim_start().starts_with("Mobile Games"), "{report}");
        assert!(lines[1].trim_end().ends_with('2'), "{report}");
    }

    #[tokio::test]
    async fn usage_feed_records_foreground_events() {
        let observer = Arc::new(UsageWindowObserver::default());
        let feed = ForegroundFeed::Usage(observer.clone());

        feed.report("com.whatsapp");
        feed.clear();
        assert_eq!(feed.observer().sample().as_deref(), Some("com.whatsapp"));
    }
}
