use std::time::Duration;

use crate::settings::MissionSettings;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tick_interval: Duration,
    /// Progress is checkpointed and a heartbeat published every N ticks.
    pub heartbeat_every_ticks: u32,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            heartbeat_every_ticks: 10,
            command_buffer: 64,
            event_buffer: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &MissionSettings) -> Self {
        let debug_mode = std::env::var("DETOX_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            tick_interval: settings.tick_interval(),
            heartbeat_every_ticks: if debug_mode { 1 } else { 10 },
            ..Self::default()
        }
    }
}
