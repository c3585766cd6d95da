use serde::{Deserialize, Serialize};

/// Suffix marking a catalog id as a package-family pattern (`com.games.*`).
pub const FAMILY_SUFFIX: &str = ".*";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum AppCategory {
    Social,
    Entertainment,
    Communication,
    Shopping,
    Gaming,
    Productivity,
    Navigation,
}

impl AppCategory {
    pub const ALL: [AppCategory; 7] = [
        AppCategory::Social,
        AppCategory::Entertainment,
        AppCategory::Communication,
        AppCategory::Shopping,
        AppCategory::Gaming,
        AppCategory::Productivity,
        AppCategory::Navigation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppCategory::Social => "Social",
            AppCategory::Entertainment => "Entertainment",
            AppCategory::Communication => "Communication",
            AppCategory::Shopping => "Shopping",
            AppCategory::Gaming => "Gaming",
            AppCategory::Productivity => "Productivity",
            AppCategory::Navigation => "Navigation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

/// An application the user can block during a mission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockableApp {
    /// Platform package name, or a family pattern ending in `.*`.
    pub id: String,
    pub display_name: String,
    pub category: AppCategory,
    pub is_blocked: bool,
    pub attempt_count: u32,
}

impl BlockableApp {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        category: AppCategory,
        is_blocked: bool,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            category,
            is_blocked,
            attempt_count: 0,
        }
    }

    /// Prefix shared by every package in the family, including the trailing dot.
    pub fn family_prefix(&self) -> Option<&str> {
        self.id
            .strip_suffix(FAMILY_SUFFIX)
            .map(|stem| &self.id[..stem.len() + 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_str() {
        for category in AppCategory::ALL {
            assert_eq!(AppCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(AppCategory::parse("Sports"), None);
    }

    #[test]
    fn family_prefix_keeps_trailing_dot() {
        let games = BlockableApp::new("com.games.*", "Games", AppCategory::Gaming, true);
        assert_eq!(games.family_prefix(), Some("com.games."));

        let youtube = BlockableApp::new(
            "com.google.android.youtube",
            "YouTube",
            AppCategory::Entertainment,
            true,
        );
        assert_eq!(youtube.family_prefix(), None);
    }
}
