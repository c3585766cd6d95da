use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MissionSettings {
    pub total_duration_secs: u64,
    pub tick_interval_ms: u64,
    pub sample_interval_ms: u64,
    pub sample_timeout_ms: u64,
}

impl Default for MissionSettings {
    fn default() -> Self {
        Self {
            total_duration_secs: 7200,
            tick_interval_ms: 1000,
            sample_interval_ms: 1000,
            sample_timeout_ms: 2000,
        }
    }
}

impl MissionSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.total_duration_secs == 0 {
            bail!("mission duration must be at least one second");
        }
        if self.tick_interval_ms == 0 || self.sample_interval_ms == 0 {
            bail!("tick and sample intervals must be non-zero");
        }
        if self.sample_timeout_ms == 0 {
            bail!("sample timeout must be non-zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlaySettings {
    pub enabled: bool,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Where foreground samples come from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForegroundSource {
    /// Window-change callbacks pushed by the platform.
    #[default]
    WindowEvents,
    /// Usage-events log queried over a lookback window.
    UsageEvents,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SensingSettings {
    pub source: ForegroundSource,
    pub usage_window_ms: u64,
}

impl Default for SensingSettings {
    fn default() -> Self {
        Self {
            source: ForegroundSource::default(),
            usage_window_ms: 5000,
        }
    }
}

impl SensingSettings {
    pub fn usage_window(&self) -> Duration {
        Duration::from_millis(self.usage_window_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    mission: MissionSettings,
    overlay: OverlaySettings,
    sensing: SensingSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str::<UserSettings>(&contents) {
                Ok(data) if data.mission.validate().is_ok() => data,
                Ok(_) | Err(_) => {
                    log::warn!(
                        "Settings at {} are invalid; using defaults",
                        path.display()
                    );
                    UserSettings::default()
                }
            }
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn mission(&self) -> MissionSettings {
        self.data.read().unwrap().mission.clone()
    }

    pub fn overlay(&self) -> OverlaySettings {
        self.data.read().unwrap().overlay.clone()
    }

    pub fn sensing(&self) -> SensingSettings {
        self.data.read().unwrap().sensing.clone()
    }

    pub fn update_mission(&self, settings: MissionSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.data.write().unwrap();
        let mut next = guard.clone();
        next.mission = settings;
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    pub fn update_overlay(&self, settings: OverlaySettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        let mut next = guard.clone();
        next.overlay = settings;
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
