use anyhow::Result;
use log::warn;

use crate::{
    catalog::BlockListStore,
    db::{Database, SessionRepository},
    session::SessionController,
    settings::MissionSettings,
};

/// Builds the controller from persisted state: the catalog with its block
/// flags and attempt counts, plus the last unfinished mission if any.
///
/// A mission that was running when the process died is restored paused and
/// the downgrade is written back before the engine starts.
pub async fn load_controller(db: &Database, settings: &MissionSettings) -> Result<SessionController> {
    let apps = db.load_catalog().await?;
    let store = BlockListStore::from_apps(apps);
    let mut controller = SessionController::new(store, settings.total_duration_secs);

    let Some(session) = db.recover_incomplete_session().await? else {
        return Ok(controller);
    };

    let was = session.state;
    controller.restore(session);
    let restored = controller.session().clone();
    warn!(
        "Recovered mission {} ({} -> {}, {}s remaining)",
        restored.id.as_deref().unwrap_or("-"),
        was.as_str(),
        restored.state.as_str(),
        restored.remaining_secs
    );

    if restored.state != was {
        db.execute(move |conn| SessionRepository::new(conn).save(&restored))
            .await?;
    }

    Ok(controller)
}
