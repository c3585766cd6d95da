mod connection;
pub mod helpers;
mod migrations;
pub mod models;
pub mod repositories;

pub use connection::Database;
pub use models::{AttemptRecord, SessionReport, TopAttemptedApp};
pub use repositories::{AppRepository, AttemptRepository, SessionRepository};
