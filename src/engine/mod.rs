mod config;
mod error;
mod events;
mod recovery;
mod runtime;

pub use config::EngineConfig;
pub use error::EngineError;
pub use events::EngineEvent;
pub use recovery::load_controller;
pub use runtime::{Engine, EngineHandle};
