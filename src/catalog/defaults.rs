//! Starter catalog seeded into an empty database.

use super::{AppCategory, BlockableApp};

pub fn default_catalog() -> Vec<BlockableApp> {
    use AppCategory::*;

    [
        ("com.instagram.android", "Instagram", Social, true),
        ("com.snapchat.android", "Snapchat", Social, false),
        ("com.google.android.youtube", "YouTube", Entertainment, true),
        ("com.zhiliaoapp.musically", "TikTok", Entertainment, true),
        ("com.spotify.music", "Spotify", Entertainment, false),
        ("com.whatsapp", "WhatsApp", Communication, false),
        ("com.amazon.mShop.android.shopping", "Amazon", Shopping, false),
        ("com.games.*", "Mobile Games", Gaming, true),
        ("com.android.chrome", "Chrome Browser", Productivity, false),
        ("com.google.android.gm", "Gmail", Productivity, false),
        ("com.google.android.calendar", "Calendar", Productivity, false),
        ("com.google.android.apps.maps", "Google Maps", Navigation, false),
    ]
    .into_iter()
    .map(|(id, name, category, blocked)| BlockableApp::new(id, name, category, blocked))
    .collect()
}
