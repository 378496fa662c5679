//! 缓存协调

pub mod coordinator;

pub use coordinator::{CacheCoordinator, RefreshPolicy};
