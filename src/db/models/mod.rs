pub mod attempt;
pub mod report;

pub use attempt::AttemptRecord;
pub use report::{SessionReport, TopAttemptedApp};
