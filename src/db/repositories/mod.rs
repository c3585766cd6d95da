pub mod apps;
pub mod attempts;
pub mod sessions;

pub use apps::AppRepository;
pub use attempts::AttemptRepository;
pub use sessions::SessionRepository;
