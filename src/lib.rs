pub mod cache;
pub mod config;
pub mod hierarchy;
pub mod lru;
pub mod trace;

pub use cache::{AccessResult, Cache, CacheStats};
pub use config::{CacheConfig, Config, ConfigError};
pub use hierarchy::{Hierarchy, Op};
