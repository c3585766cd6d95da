use serde::{Deserialize, Serialize};

/// Instruction for the overlay presenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySignal {
    pub show: bool,
    pub app_id: Option<String>,
}

impl OverlaySignal {
    pub fn show(app_id: impl Into<String>) -> Self {
        Self {
            show: true,
            app_id: Some(app_id.into()),
        }
    }

    pub fn hide() -> Self {
        Self {
            show: false,
            app_id: None,
        }
    }
}
