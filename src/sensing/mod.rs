mod controller;
mod loop_worker;
mod observer;

pub use controller::SamplingController;
pub use observer::{
    FixedObserver, ForegroundAppObserver, PushObserver, UsageWindowObserver, DEFAULT_USAGE_WINDOW,
};
