use crate::cache::Block;

/// Per-cache recency clock. Stamps start at 1 so a stamp of 0 means "never touched".
#[derive(Debug, Default)]
pub struct LruClock {
    now: u64,
}

impl LruClock {
    pub fn new() -> Self {
        LruClock { now: 0 }
    }

    #[cfg(test)]
    pub(crate) fn starting_at(now: u64) -> Self {
        LruClock { now }
    }

    /// The next tick would overflow; the owner must `restart` before ticking again.
    pub fn exhausted(&self) -> bool {
        self.now == u64::MAX
    }

    pub fn tick(&mut self) -> u64 {
        self.now += 1;
        self.now
    }

    pub fn restart(&mut self, now: u64) {
        self.now = now;
    }
}

/// First invalid way if there is one, otherwise the way with the oldest stamp.
/// Ties on the stamp go to the lowest way.
pub fn victim_way(set: &[Block]) -> usize {
    if let Some(vacant_way) = set.iter().position(|b| !b.valid) {
        return vacant_way;
    }
    set.iter()
        .enumerate()
        .min_by_key(|(_way, b)| b.last_used)
        .map(|(way, _b)| way)
        .unwrap_or(0)
}

/// Rewrites the stamps of one set to their rank (1 = oldest valid line),
/// keeping the relative order. Invalid lines drop back to 0. Returns the
/// highest rank handed out.
pub fn rerank(set: &mut [Block]) -> u64 {
    let mut order: Vec<usize> = (0..set.len()).filter(|&way| set[way].valid).collect();
    order.sort_by_key(|&way| set[way].last_used);

    for block in set.iter_mut().filter(|b| !b.valid) {
        block.last_used = 0;
    }
    for (rank, &way) in order.iter().enumerate() {
        set[way].last_used = rank as u64 + 1;
    }
    order.len() as u64
}
