//! Memoized capacity figures for rows.
//!
//! [`LayoutCache`] stores `used_space` / `used_percentage` for the
//! no-candidate case, keyed by `(row_id, instance_count)`. Fit checks for a
//! candidate plant are never cached.
//!
//! # Invalidation
//!
//! The count in the key changes on add and remove, but a swap keeps the
//! count and changes positions, so a key can collide with stale data. Every
//! mutation of a row's instances must therefore call
//! [`LayoutCache::invalidate_all`] (or [`LayoutCache::invalidate`] for the
//! one row). The coordinator clears everything on each mutation.

use std::collections::HashMap;

use rowplan_db::models::Row;

use super::{used_percentage, used_space};

/// Cache key: row identity plus the number of instances in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub row_id: i64,
    pub instance_count: usize,
}

impl CacheKey {
    pub fn for_row(row: &Row) -> Self {
        Self {
            row_id: row.id,
            instance_count: row.plants.len(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedUsage {
    used_space: i32,
    percentage: u8,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Capacity cache owned by a single layout engine instance.
#[derive(Debug, Default)]
pub struct LayoutCache {
    entries: HashMap<CacheKey, CachedUsage>,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `used_space(row, None)`, computed at most once per key.
    pub fn used_space(&mut self, row: &Row) -> i32 {
        self.lookup(row).used_space
    }

    /// `used_percentage(row)`, computed at most once per key.
    pub fn used_percentage(&mut self, row: &Row) -> u8 {
        self.lookup(row).percentage
    }

    fn lookup(&mut self, row: &Row) -> CachedUsage {
        let key = CacheKey::for_row(row);
        if let Some(cached) = self.entries.get(&key) {
            self.hits += 1;
            return *cached;
        }

        self.misses += 1;
        let usage = CachedUsage {
            used_space: used_space(row, None),
            percentage: used_percentage(row),
        };
        self.entries.insert(key, usage);
        usage
    }

    /// Drop every entry belonging to `row_id`.
    pub fn invalidate(&mut self, row_id: i64) {
        self.invalidations += 1;
        self.entries.retain(|key, _| key.row_id != row_id);
    }

    /// Drop every entry.
    pub fn invalidate_all(&mut self) {
        self.invalidations += 1;
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            invalidations: self.invalidations,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
