pub mod controller;
pub mod error;
pub mod signal;
pub mod state;

pub use controller::{
    Attempt, SampleOutcome, SessionController, SessionSnapshot, StartKind, TickOutcome,
};
pub use error::{SessionAction, TransitionError};
pub use signal::OverlaySignal;
pub use state::{Session, SessionState};
