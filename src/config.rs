use serde::Deserialize;
use thiserror::Error;

use crate::hierarchy::Hierarchy;

pub const L2_SIZE: usize = 16 * 1024;
pub const L2_WAYS: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{cache}: {field} must be a non-zero power of two, got {value}")]
    NotPowerOfTwo {
        cache: String,
        field: &'static str,
        value: usize,
    },
    #[error("{cache}: block size {block_size} is larger than the cache ({size} bytes)")]
    BlockLargerThanCache {
        cache: String,
        block_size: usize,
        size: usize,
    },
    #[error("{cache}: {ways} ways do not fit in {blocks} blocks")]
    TooManyWays {
        cache: String,
        ways: usize,
        blocks: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    pub size: usize,
    pub block_size: usize,
    pub ways: usize,
}

impl CacheConfig {
    /// Every parameter is a power of two and the ways fit in the block count,
    /// so the set count is a power of two as well.
    pub fn validate(&self, cache: &str) -> Result<(), ConfigError> {
        for (field, value) in [
            ("size", self.size),
            ("block size", self.block_size),
            ("associativity", self.ways),
        ] {
            if !value.is_power_of_two() {
                return Err(ConfigError::NotPowerOfTwo {
                    cache: cache.to_owned(),
                    field,
                    value,
                });
            }
        }

        if self.block_size > self.size {
            return Err(ConfigError::BlockLargerThanCache {
                cache: cache.to_owned(),
                block_size: self.block_size,
                size: self.size,
            });
        }

        let blocks = self.size / self.block_size;
        if self.ways > blocks {
            return Err(ConfigError::TooManyWays {
                cache: cache.to_owned(),
                ways: self.ways,
                blocks,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub icache: CacheConfig,
    pub dcache: CacheConfig,
    pub l2: CacheConfig,
}

impl Config {
    /// Both first-level caches share one geometry; the shared level keeps its
    /// own size and associativity and only borrows the block size.
    pub fn with_l1(size: usize, block_size: usize, ways: usize) -> Self {
        let l1 = CacheConfig {
            size,
            block_size,
            ways,
        };
        Config {
            icache: l1,
            dcache: l1,
            l2: CacheConfig {
                size: L2_SIZE,
                block_size,
                ways: L2_WAYS,
            },
        }
    }

    pub fn build(&self) -> Result<Hierarchy, ConfigError> {
        Hierarchy::new(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::with_l1(1024, 16, 2)
    }
}
