use std::str::FromStr;

use log::info;

use crate::{
    cache::{AccessResult, Cache, CacheStats},
    config::{Config, ConfigError},
    trace::TraceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Fetch,
    Read,
    Write,
}

impl FromStr for Op {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch" => Ok(Op::Fetch),
            "read" => Ok(Op::Read),
            "write" => Ok(Op::Write),
            _ => Err(TraceError::UnknownOp(s.to_owned())),
        }
    }
}

/// Split first-level instruction and data caches in front of one shared
/// second level.
#[derive(Debug)]
pub struct Hierarchy {
    icache: Cache,
    dcache: Cache,
    l2: Cache,
    accesses: u64,
}

impl Hierarchy {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let hierarchy = Hierarchy {
            icache: Cache::new("L1 I-Cache", &config.icache)?,
            dcache: Cache::new("L1 D-Cache", &config.dcache)?,
            l2: Cache::new("L2 Cache", &config.l2)?,
            accesses: 0,
        };
        for cache in hierarchy.caches() {
            info!(
                "{}: {}B, {}B blocks, {}-way, {} sets",
                cache.name(),
                cache.size(),
                cache.block_size(),
                cache.ways(),
                cache.sets()
            );
        }
        Ok(hierarchy)
    }

    /// Fetches go to the instruction cache, reads and writes to the data
    /// cache. Only a first-level miss reaches the shared level. The returned
    /// result is the first-level outcome.
    pub fn process(&mut self, op: Op, addr: u64) -> AccessResult {
        self.accesses += 1;
        let write = op == Op::Write;
        let l1 = match op {
            Op::Fetch => &mut self.icache,
            Op::Read | Op::Write => &mut self.dcache,
        };

        let result = l1.access(addr, write);
        if result == AccessResult::Miss {
            self.l2.access(addr, write);
        }
        result
    }

    pub fn accesses(&self) -> u64 {
        self.accesses
    }

    pub fn caches(&self) -> [&Cache; 3] {
        [&self.icache, &self.dcache, &self.l2]
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        self.caches().iter().map(|c| c.stats()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(stats: &CacheStats) -> (u64, u64, u64) {
        (stats.hits, stats.misses, stats.write_backs)
    }

    #[test]
    fn op_keywords() {
        assert_eq!("fetch".parse::<Op>().unwrap(), Op::Fetch);
        assert_eq!("read".parse::<Op>().unwrap(), Op::Read);
        assert_eq!("write".parse::<Op>().unwrap(), Op::Write);
        assert!(matches!(
            "WRITE".parse::<Op>(),
            Err(TraceError::UnknownOp(op)) if op == "WRITE"
        ));
        assert_eq!(
            "load".parse::<Op>().unwrap_err().to_string(),
            "unknown operation `load`"
        );
    }

    #[test]
    fn fetch_goes_to_icache_only() {
        let mut h = Config::default().build().unwrap();
        assert_eq!(h.process(Op::Fetch, 0x400), AccessResult::Miss);
        assert_eq!(h.process(Op::Fetch, 0x400), AccessResult::Hit);

        let stats = h.stats();
        assert_eq!(counts(&stats[0]), (1, 1, 0));
        assert_eq!(counts(&stats[1]), (0, 0, 0));
        assert_eq!(counts(&stats[2]), (0, 1, 0));
    }

    #[test]
    fn data_ops_go_to_dcache() {
        let mut h = Config::default().build().unwrap();
        h.process(Op::Read, 0x1000);
        h.process(Op::Write, 0x1000);
        h.process(Op::Write, 0x2000);

        let stats = h.stats();
        assert_eq!(counts(&stats[0]), (0, 0, 0));
        assert_eq!(counts(&stats[1]), (1, 2, 0));
        assert_eq!(counts(&stats[2]), (0, 2, 0));
        assert_eq!(h.accesses(), 3);
    }

    #[test]
    fn l2_catches_l1_conflicts() {
        let mut h = Config::with_l1(64, 16, 1).build().unwrap();
        // same L1 set, different L2 sets
        for _ in 0..3 {
            h.process(Op::Read, 0x000);
            h.process(Op::Read, 0x040);
        }

        let stats = h.stats();
        assert_eq!(counts(&stats[1]), (0, 6, 0));
        assert_eq!(counts(&stats[2]), (4, 2, 0));
    }

    #[test]
    fn l1_write_back_stays_in_l1_counters() {
        let mut h = Config::with_l1(64, 16, 1).build().unwrap();
        h.process(Op::Write, 0x000);
        h.process(Op::Read, 0x040);

        let stats = h.stats();
        assert_eq!(counts(&stats[1]), (0, 2, 1));
        assert_eq!(stats[2].write_backs, 0);
    }

    #[test]
    fn split_caches_do_not_share_lines() {
        let mut h = Config::default().build().unwrap();
        h.process(Op::Write, 0x800);
        assert_eq!(h.process(Op::Fetch, 0x800), AccessResult::Miss);
        // the fetch hits in L2, which the write already filled
        assert_eq!(counts(&h.stats()[2]), (1, 1, 0));
    }

    #[test]
    fn names_in_report_order() {
        let h = Config::default().build().unwrap();
        let names: Vec<String> = h.stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["L1 I-Cache", "L1 D-Cache", "L2 Cache"]);
    }
}
