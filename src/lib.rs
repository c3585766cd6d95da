mod utils;

pub mod catalog;
pub mod console;
pub mod db;
pub mod engine;
pub mod overlay;
pub mod sensing;
pub mod session;
pub mod settings;

use std::{
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};

use console::{run_console, Console, ForegroundFeed};
use db::Database;
use engine::{Engine, EngineConfig};
use overlay::{spawn_overlay_worker, LogOverlayPresenter, OverlayDispatcher};
use sensing::{PushObserver, SamplingController, UsageWindowObserver};
use settings::{ForegroundSource, SettingsStore};

const DATA_DIR_ENV: &str = "DETOX_DATA_DIR";

/// `DETOX_DATA_DIR` when set, otherwise the platform's local data directory.
pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_local_dir()
        .map(|dir| dir.join("detox"))
        .ok_or_else(|| anyhow!("no local data directory; set {DATA_DIR_ENV}"))
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("Detox starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(serve()) {
        error!("Detox stopped: {err:#}");
        std::process::exit(1);
    }
}

async fn serve() -> Result<()> {
    let data_dir = resolve_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings = Arc::new(SettingsStore::new(data_dir.join("settings.json"))?);
    let mission = settings.mission();
    let database = Database::new(data_dir.join("detox.sqlite3"))?;

    // Bring back the catalog and any mission interrupted by the last exit.
    let controller = engine::load_controller(&database, &mission).await?;
    let (engine, engine_task) = Engine::spawn(
        controller,
        Some(database.clone()),
        EngineConfig::from_settings(&mission),
    );

    let overlay_enabled = Arc::new(AtomicBool::new(settings.overlay().enabled));
    let overlay_task = spawn_overlay_worker(
        engine.subscribe(),
        OverlayDispatcher::new(LogOverlayPresenter, overlay_enabled.clone()),
    );

    let sensing = settings.sensing();
    let feed = match sensing.source {
        ForegroundSource::WindowEvents => ForegroundFeed::Window(Arc::new(PushObserver::new())),
        ForegroundSource::UsageEvents => ForegroundFeed::Usage(Arc::new(
            UsageWindowObserver::new(sensing.usage_window()),
        )),
    };
    info!("Foreground source: {:?}", sensing.source);

    let mut sampler = SamplingController::new();
    sampler.start(
        feed.observer(),
        engine.clone(),
        mission.sample_interval(),
        mission.sample_timeout(),
    )?;

    let console = Console::new(
        engine.clone(),
        feed,
        database,
        settings,
        overlay_enabled,
    );
    let console_result = run_console(console).await;

    sampler.stop().await?;
    if engine.shutdown().await.is_err() {
        warn!("Engine already stopped");
    }
    engine_task.await.context("engine task failed to join")?;
    drop(engine);
    overlay_task.await.context("overlay worker failed to join")?;

    info!("Detox shut down");
    console_result
}
