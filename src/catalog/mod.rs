pub mod app;
pub mod defaults;
pub mod store;

pub use app::{AppCategory, BlockableApp};
pub use store::BlockListStore;
