use thiserror::Error;

use crate::session::TransitionError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("engine is not running")]
    Stopped,
}
