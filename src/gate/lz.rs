use std::num::NonZeroUsize;

use lru::LruCache;

use super::EmissionGate;
use crate::config::LzGateConfig;

/// LZ-repetition gate (§4.2.1): passes (keeps growing) only while the
/// extended candidate has never been seen before; once a candidate repeats,
/// growth is free to continue past it.
pub struct LzGate {
    cache: LruCache<u32, u32>,
}

impl std::fmt::Debug for LzGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzGate")
            .field("len", &self.cache.len())
            .field("cap", &self.cache.cap())
            .finish()
    }
}

impl LzGate {
    pub fn new(config: &LzGateConfig) -> Self {
        let cap = NonZeroUsize::new(config.cache_max.max(1)).unwrap();
        Self {
            cache: LruCache::new(cap),
        }
    }
}

impl EmissionGate for LzGate {
    fn evaluate(&mut self, current_key: u32, _previous_key: u32) -> bool {
        let seen = self.cache.get(&current_key).copied().unwrap_or(0);
        self.cache.put(current_key, seen + 1);
        seen >= 1
    }

    fn reset(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> LzGate {
        LzGate::new(&LzGateConfig { cache_max: 64 })
    }

    #[test]
    fn unseen_key_fails() {
        let mut g = gate();
        assert!(!g.evaluate(1, 0));
    }

    #[test]
    fn seen_key_passes() {
        let mut g = gate();
        assert!(!g.evaluate(42, 0));
        assert!(g.evaluate(42, 0));
        assert!(g.evaluate(42, 0));
    }

    #[test]
    fn reset_clears_history() {
        let mut g = gate();
        g.evaluate(5, 0);
        assert!(g.evaluate(5, 0));
        g.reset();
        assert!(!g.evaluate(5, 0));
    }

    #[test]
    fn eviction_forgets_oldest_key() {
        let mut g = LzGate::new(&LzGateConfig { cache_max: 2 });
        g.evaluate(1, 0); // seen(1) = 1
        g.evaluate(2, 0); // seen(2) = 1, cache: {1,2}
        g.evaluate(3, 0); // evicts 1 (LRU), cache: {2,3}
        // 1 was evicted, so it looks unseen again.
        assert!(!g.evaluate(1, 0));
    }
}
