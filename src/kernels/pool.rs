use std::collections::HashMap;

/// What a pooled texture is used for inside one kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexturePurpose {
    Input,
    GrainOutput,
    BloomBright,
    BloomScratch,
    BloomOutput,
    LightLeakOutput,
    Readback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub purpose: TexturePurpose,
    pub width: u32,
    pub height: u32,
}

impl PoolKey {
    pub fn new(purpose: TexturePurpose, width: u32, height: u32) -> Self {
        Self { purpose, width, height }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub allocations: u64,
    pub pooled: usize,
}

/// Shape-keyed pool of reusable textures or buffers. Owned by a single kernel backend,
/// so it needs no locking; entries are only valid for one kernel call between
/// `acquire` and `release`.
pub struct TexturePool<T> {
    entries: HashMap<PoolKey, Vec<T>>,
    hits: u64,
    allocations: u64,
}

impl<T> Default for TexturePool<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            allocations: 0,
        }
    }
}

impl<T> TexturePool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a pooled entry of exactly this shape, or allocates one with `create`.
    pub fn acquire<F>(&mut self, key: PoolKey, create: F) -> T
    where
        F: FnOnce(&PoolKey) -> T,
    {
        if let Some(item) = self.entries.get_mut(&key).and_then(Vec::pop) {
            self.hits += 1;
            return item;
        }
        self.allocations += 1;
        tracing::trace!(purpose = ?key.purpose, width = key.width, height = key.height, "pool allocation");
        create(&key)
    }

    pub fn release(&mut self, key: PoolKey, item: T) {
        self.entries.entry(key).or_default().push(item);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits,
            allocations: self.allocations,
            pooled: self.entries.values().map(Vec::len).sum(),
        }
    }

    /// Drops every pooled entry, e.g. under memory pressure.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_matching_shapes_only() {
        let mut pool: TexturePool<Vec<f32>> = TexturePool::new();
        let key = PoolKey::new(TexturePurpose::GrainOutput, 4, 4);
        let buf = pool.acquire(key, |k| vec![0.0; (k.width * k.height * 4) as usize]);
        pool.release(key, buf);

        let again = pool.acquire(key, |_| unreachable!("should reuse"));
        assert_eq!(again.len(), 64);
        pool.release(key, again);

        let other = PoolKey::new(TexturePurpose::GrainOutput, 8, 4);
        let _ = pool.acquire(other, |k| vec![0.0; (k.width * k.height * 4) as usize]);

        let stats = pool.stats();
        assert_eq!((stats.hits, stats.allocations, stats.pooled), (1, 2, 1));
        pool.clear();
        assert_eq!(pool.stats().pooled, 0);
    }
}
