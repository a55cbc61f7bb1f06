//! Caller-owned matrix cache.
//!
//! The builder is stateless; callers that analyse many companies in the same
//! sector can keep one of these around and decide when entries go stale.
//! Keys are `(sector, lbo_flag, as_of_date)` with the sector trimmed and
//! lower-cased, matching the builder's sector lookup.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::chain::builder::TransitionMatrixBuilder;
use crate::chain::matrix::TransitionMatrix;
use crate::chain::source::RatingMigrationSource;
use crate::error::ForecastError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub sector: String,
    pub lbo_flag: bool,
    pub as_of_date: NaiveDate,
}

impl CacheKey {
    pub fn new(sector: &str, lbo_flag: bool, as_of_date: NaiveDate) -> Self {
        Self {
            sector: sector.trim().to_lowercase(),
            lbo_flag,
            as_of_date,
        }
    }
}

#[derive(Debug, Default)]
pub struct MatrixCache {
    entries: HashMap<CacheKey, Arc<TransitionMatrix>>,
    hits: u64,
    misses: u64,
}

impl MatrixCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sector: &str, lbo_flag: bool, as_of_date: NaiveDate) -> Option<Arc<TransitionMatrix>> {
        self.entries
            .get(&CacheKey::new(sector, lbo_flag, as_of_date))
            .cloned()
    }

    /// Return the cached matrix or build, store, and return a new one.
    ///
    /// Build failures are not cached.
    pub fn get_or_build(
        &mut self,
        builder: &TransitionMatrixBuilder,
        source: &dyn RatingMigrationSource,
        sector: &str,
        lbo_flag: bool,
        as_of_date: NaiveDate,
    ) -> Result<Arc<TransitionMatrix>, ForecastError> {
        let key = CacheKey::new(sector, lbo_flag, as_of_date);
        if let Some(matrix) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(matrix));
        }
        self.misses += 1;
        let matrix = Arc::new(builder.build(source, sector, lbo_flag, as_of_date)?);
        debug!(sector = %key.sector, lbo_flag, %as_of_date, "cached transition matrix");
        self.entries.insert(key, Arc::clone(&matrix));
        Ok(matrix)
    }

    /// Drop every entry for `sector` (both LBO variants, all dates).
    pub fn invalidate(&mut self, sector: &str) -> usize {
        let sector = sector.trim().to_lowercase();
        let before = self.entries.len();
        self.entries.retain(|k, _| k.sector != sector);
        before - self.entries.len()
    }

    /// Drop entries whose as-of date is strictly before `date`.
    pub fn invalidate_before(&mut self, date: NaiveDate) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| k.as_of_date >= date);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::source::{StaticTableSource, UnavailableSource};
    use crate::chain::builder::TransitionMatrixBuilder;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn second_lookup_is_a_hit_and_shares_the_matrix() {
        let builder = TransitionMatrixBuilder::default();
        let source = StaticTableSource::default();
        let mut cache = MatrixCache::new();

        let a = cache.get_or_build(&builder, &source, "Retail", true, date(30)).unwrap();
        let b = cache.get_or_build(&builder, &source, "  retail ", true, date(30)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats(), (1, 1));

        // The LBO flag is part of the key.
        let c = cache.get_or_build(&builder, &source, "Retail", false, date(30)).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidation_by_sector_and_date() {
        let builder = TransitionMatrixBuilder::default();
        let source = StaticTableSource::default();
        let mut cache = MatrixCache::new();
        for d in [1, 15, 30] {
            cache.get_or_build(&builder, &source, "Energy", false, date(d)).unwrap();
        }
        cache.get_or_build(&builder, &source, "Utilities", false, date(30)).unwrap();

        assert_eq!(cache.invalidate_before(date(15)), 1);
        assert_eq!(cache.invalidate("ENERGY"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("utilities", false, date(30)).is_some());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn failed_builds_are_not_cached() {
        let builder = TransitionMatrixBuilder::default().with_fallback(None);
        let mut cache = MatrixCache::new();
        let err = cache
            .get_or_build(&builder, &UnavailableSource::default(), "Retail", false, date(30))
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(cache.is_empty());
    }
}
