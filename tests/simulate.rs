use std::io::Cursor;

use cachesim::{
    trace::{self, Trace},
    AccessResult, Cache, CacheConfig, Config, Op,
};

fn random_addr(rng: &mut fastrand::Rng) -> u64 {
    // keep addresses in a small window so hits actually happen
    rng.u64(0..0x4000)
}

#[test]
fn counters_are_conserved() {
    let mut rng = fastrand::Rng::with_seed(7);
    for (size, block_size, ways) in [(1024, 16, 2), (256, 32, 1), (512, 16, 32), (4096, 64, 8)] {
        let mut cache = Cache::new(
            "random",
            &CacheConfig {
                size,
                block_size,
                ways,
            },
        )
        .unwrap();

        for n in 1..=5_000u64 {
            cache.access(random_addr(&mut rng), rng.bool());
            let stats = cache.stats();
            assert_eq!(stats.hits + stats.misses, n);
            assert!(stats.write_backs <= stats.misses);
            assert!(cache.valid_lines() <= cache.capacity());
        }
    }
}

#[test]
fn hierarchy_levels_stay_consistent() {
    let mut rng = fastrand::Rng::with_seed(42);
    let mut hierarchy = Config::default().build().unwrap();

    let mut l1_misses = 0;
    for _ in 0..20_000 {
        let op = match rng.u8(0..3) {
            0 => Op::Fetch,
            1 => Op::Read,
            _ => Op::Write,
        };
        if hierarchy.process(op, random_addr(&mut rng)) == AccessResult::Miss {
            l1_misses += 1;
        }
    }

    let stats = hierarchy.stats();
    let l1_total: u64 = stats[..2].iter().map(|s| s.hits + s.misses).sum();
    assert_eq!(l1_total, 20_000);
    assert_eq!(stats[0].misses + stats[1].misses, l1_misses);
    assert_eq!(stats[2].hits + stats[2].misses, l1_misses);
    assert_eq!(stats[0].write_backs, 0);
    for cache in hierarchy.caches() {
        assert!(cache.valid_lines() <= cache.capacity());
    }
}

#[test]
fn lru_worst_case_cycle() {
    for ways in [1, 2, 4, 8] {
        let mut cache = Cache::new(
            "cycle",
            &CacheConfig {
                size: 16 * 8 * ways,
                block_size: 16,
                ways,
            },
        )
        .unwrap();
        // stride of one full way keeps every address in set 0
        let stride = 16 * 8;
        let cycle: Vec<u64> = (0..=ways as u64).map(|i| i * stride).collect();

        for _ in 0..20 {
            for &addr in &cycle {
                assert_eq!(cache.access(addr, false), AccessResult::Miss);
            }
        }
        assert_eq!(cache.stats().hits, 0);
    }
}

#[test]
fn one_write_back_after_filling_a_dirty_set() {
    let mut cache = Cache::new(
        "dirty",
        &CacheConfig {
            size: 1024,
            block_size: 16,
            ways: 4,
        },
    )
    .unwrap();
    let stride = 16 * 16;
    for way in 0..4 {
        cache.access(way * stride, true);
    }
    assert_eq!(cache.stats().write_backs, 0);
    cache.access(4 * stride, false);
    assert_eq!(cache.stats().write_backs, 1);
}

#[test]
fn trace_drives_hierarchy() {
    let text = "\
fetch 400000
fetch 400004
read 7fff0000
write 7fff0000
read 7fff0010
fetch 400000
this line is junk
write 0x7fff0008
";
    let reader = Trace::from_reader(Cursor::new(text), 3, 2);
    let mut hierarchy = Config::default().build().unwrap();
    let mut skipped = 0;
    for block in reader.rec.iter() {
        skipped += trace::replay(&mut hierarchy, block).unwrap();
    }

    assert_eq!(skipped, 1);
    assert_eq!(hierarchy.accesses(), 7);

    let stats = hierarchy.stats();
    // 400000 and 400004 share a block
    assert_eq!((stats[0].hits, stats[0].misses), (2, 1));
    // 7fff0000 and 7fff0010 are adjacent blocks
    assert_eq!((stats[1].hits, stats[1].misses), (2, 2));
    assert_eq!((stats[2].hits, stats[2].misses), (0, 3));
}
