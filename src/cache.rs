use std::{fmt, iter, ops::Not, ops::Range};

use log::{debug, trace};
use serde::Serialize;

use crate::{
    config::{CacheConfig, ConfigError},
    lru::{self, LruClock},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr {
    pub offset: u64,
    pub set: usize,
    pub tag: u64,
}

#[derive(Debug)]
pub struct BitSection {
    shift: u32,
    mask: u64,
}

impl BitSection {
    fn apply(&self, num: u64) -> u64 {
        num.checked_shr(self.shift).unwrap_or(0) & self.mask
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    Hit,
    Miss,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub write_backs: u64,
    pub miss_rate: f64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        writeln!(f, "  Hits: {}", self.hits)?;
        writeln!(f, "  Misses: {}", self.misses)?;
        writeln!(f, "  Write-backs: {}", self.write_backs)?;
        write!(f, "  Miss rate: {:.2}%", self.miss_rate * 100.0)
    }
}

/// One line slot of a set.
#[derive(Debug, Default, Clone)]
pub struct Block {
    pub valid: bool,
    pub dirty: bool,
    pub tag: u64,
    pub last_used: u64,
}

impl Block {
    fn touch(&mut self, stamp: u64, write: bool) {
        self.dirty |= write;
        self.last_used = stamp;
    }

    fn fill(&mut self, tag: u64, write: bool, stamp: u64) {
        self.valid = true;
        self.tag = tag;
        self.dirty = write;
        self.last_used = stamp;
    }
}

/// A set-associative, write-back, write-allocate cache with LRU replacement.
///
/// Lines are stored row-major: set `s` owns `blocks[s * n_ways..(s + 1) * n_ways]`.
#[derive(Debug)]
pub struct Cache {
    name: String,
    blocks: Vec<Block>,
    size: usize,
    block_size: usize,
    n_ways: usize,
    n_sets: usize,
    offset_sec: BitSection,
    set_sec: BitSection,
    tag_sec: BitSection,
    clock: LruClock,
    hits: u64,
    misses: u64,
    write_backs: u64,
}

impl Cache {
    pub fn new(name: impl Into<String>, config: &CacheConfig) -> Result<Self, ConfigError> {
        let name = name.into();
        config.validate(&name)?;

        let block_size = config.block_size;
        let n_ways = config.ways;
        let n_sets = config.size / block_size / n_ways;

        let offset_sec = BitSection {
            shift: 0,
            mask: block_size as u64 - 1,
        };

        let set_shift = block_size.ilog2();
        let set_sec = BitSection {
            shift: set_shift,
            mask: n_sets as u64 - 1,
        };

        let tag_shift = n_sets.ilog2() + set_shift;
        let tag_sec = BitSection {
            shift: tag_shift,
            mask: 0u64.not(),
        };

        debug!(
            "{name}: {} sets x {n_ways} ways x {block_size}B | {} tag bits | {} index bits | {} offset bits |",
            n_sets,
            u64::BITS - tag_shift,
            tag_shift - set_shift,
            set_shift
        );

        Ok(Cache {
            name,
            blocks: iter::repeat_with(Block::default)
                .take(n_sets * n_ways)
                .collect(),
            size: config.size,
            block_size,
            n_ways,
            n_sets,
            offset_sec,
            set_sec,
            tag_sec,
            clock: LruClock::new(),
            hits: 0,
            misses: 0,
            write_backs: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn ways(&self) -> usize {
        self.n_ways
    }

    pub fn sets(&self) -> usize {
        self.n_sets
    }

    pub fn split_addr(&self, addr: u64) -> Addr {
        let offset = self.offset_sec.apply(addr);
        let set = self.set_sec.apply(addr) as usize;
        let tag = self.tag_sec.apply(addr);
        Addr { offset, set, tag }
    }

    fn get_set(&self, set: usize) -> Range<usize> {
        set * self.n_ways..(set + 1) * self.n_ways
    }

    /// Looks `addr` up, allocating it on a miss. A write marks the line dirty
    /// whether it hit or was just filled; evicting a dirty line counts one
    /// write-back.
    pub fn access(&mut self, addr: u64, write: bool) -> AccessResult {
        let addr = self.split_addr(addr);
        let stamp = self.stamp();
        let set_range = self.get_set(addr.set);
        let set_slice = &mut self.blocks[set_range];

        if let Some(block) = set_slice
            .iter_mut()
            .find(|b| b.valid && b.tag == addr.tag)
        {
            block.touch(stamp, write);
            self.hits += 1;
            return AccessResult::Hit;
        }

        self.misses += 1;
        let victim_way = lru::victim_way(set_slice);
        let victim = &mut set_slice[victim_way];
        if victim.valid {
            trace!(
                "{}: set {} way {} evicts tag {:#x}{}",
                self.name,
                addr.set,
                victim_way,
                victim.tag,
                if victim.dirty { " (dirty)" } else { "" }
            );
            if victim.dirty {
                self.write_backs += 1;
            }
        }
        victim.fill(addr.tag, write, stamp);

        AccessResult::Miss
    }

    fn stamp(&mut self) -> u64 {
        if self.clock.exhausted() {
            self.renormalise();
        }
        self.clock.tick()
    }

    fn renormalise(&mut self) {
        let mut top = 0;
        for set in self.blocks.chunks_mut(self.n_ways) {
            top = top.max(lru::rerank(set));
        }
        debug!("{}: recency clock wrapped, restarting at {top}", self.name);
        self.clock.restart(top);
    }

    pub fn valid_lines(&self) -> usize {
        self.blocks.iter().filter(|b| b.valid).count()
    }

    pub fn capacity(&self) -> usize {
        self.n_sets * self.n_ways
    }

    pub fn stats(&self) -> CacheStats {
        let total_access = self.hits + self.misses;
        let miss_rate = if total_access == 0 {
            0.0
        } else {
            self.misses as f64 / total_access as f64
        };

        CacheStats {
            name: self.name.clone(),
            hits: self.hits,
            misses: self.misses,
            write_backs: self.write_backs,
            miss_rate,
        }
    }
}
