//! In-memory cache implementation.

use chrono::{DateTime, NaiveDate, Utc};
use ingest_core::{DateRange, FeatureTable, Symbol};
use polars::prelude::DataType;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// Key for cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source: String,
    symbol: Symbol,
    start: NaiveDate,
    end: NaiveDate,
}

impl CacheKey {
    /// Creates a key for one source's fetch of `symbol` over `[start, end]`.
    #[must_use]
    pub fn new(source: &str, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            source: source.to_string(),
            symbol: symbol.clone(),
            start,
            end,
        }
    }

    /// Source name component.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A cached table with the metadata needed to judge its freshness.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    table: FeatureTable,
    source: String,
    symbol: Symbol,
    range: DateRange,
    checksum: String,
    cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Snapshots `table`, stamping it with the current time.
    #[must_use]
    pub fn new(source: &str, symbol: &Symbol, range: DateRange, table: &FeatureTable) -> Self {
        Self {
            checksum: checksum(table),
            table: table.clone(),
            source: source.to_string(),
            symbol: symbol.clone(),
            range,
            cached_at: Utc::now(),
        }
    }

    /// Overrides the creation time, e.g. when restoring a snapshot.
    #[must_use]
    pub const fn with_cached_at(mut self, cached_at: DateTime<Utc>) -> Self {
        self.cached_at = cached_at;
        self
    }

    /// Source that produced the table.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Symbol the table belongs to.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Requested date range.
    #[must_use]
    pub const fn range(&self) -> DateRange {
        self.range
    }

    /// Content checksum taken at insertion.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Insertion time.
    #[must_use]
    pub const fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// Borrow of the cached table.
    #[must_use]
    pub const fn table(&self) -> &FeatureTable {
        &self.table
    }

    fn key(&self) -> CacheKey {
        CacheKey::new(&self.source, &self.symbol, self.range.start, self.range.end)
    }

    /// Returns true once the entry is older than `ttl`.
    ///
    /// An entry exactly `ttl` old is still fresh.
    #[must_use]
    pub fn is_stale(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age > chrono::TimeDelta::from_std(ttl).unwrap_or(chrono::TimeDelta::MAX)
    }

    /// Returns true if the table still matches its checksum.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        checksum(&self.table) == self.checksum
    }
}

/// Footprint report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of entries.
    pub entries: usize,
    /// Approximate bytes held by cached tables.
    pub approx_bytes: usize,
    /// Entry count per source.
    pub entries_per_source: HashMap<String, usize>,
    /// Creation time of the oldest entry.
    pub oldest_entry: Option<DateTime<Utc>>,
}

/// TTL-bounded in-memory cache of feature tables.
///
/// Tables are cloned on the way in and on the way out, so callers never share
/// mutable state with the cache. Data is lost when the cache is dropped.
#[derive(Debug)]
pub struct FeatureCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl FeatureCache {
    /// Creates an empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Entry time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a copy of the cached table if it is fresh and intact.
    ///
    /// Stale or corrupted entries are evicted and reported as a miss.
    #[instrument(skip(self), fields(source = %source, symbol = %symbol))]
    pub async fn get(
        &self,
        source: &str,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<FeatureTable> {
        let key = CacheKey::new(source, symbol, start, end);

        {
            let cache = self.entries.read().await;
            match cache.get(&key) {
                None => {
                    debug!("Cache miss");
                    return None;
                }
                Some(entry) if !entry.is_stale(self.ttl) && entry.is_intact() => {
                    debug!(rows = entry.table.height(), "Cache hit");
                    return Some(entry.table.clone());
                }
                Some(entry) if !entry.is_intact() => {
                    warn!("Cached table failed checksum verification, evicting");
                }
                Some(_) => {
                    debug!("Cache entry expired, evicting");
                }
            }
        }

        // The entry may have been replaced since the read lock was released.
        let mut cache = self.entries.write().await;
        serve_or_evict(&mut cache, &key, self.ttl)
    }

    /// Stores a copy of `table`, replacing any previous entry for the key.
    #[instrument(skip(self, table), fields(source = %source, symbol = %symbol, rows = table.height()))]
    pub async fn put(
        &self,
        source: &str,
        symbol: &Symbol,
        range: DateRange,
        table: &FeatureTable,
    ) {
        self.insert_entry(CacheEntry::new(source, symbol, range, table))
            .await;
    }

    /// Stores a prepared entry.
    pub async fn insert_entry(&self, entry: CacheEntry) {
        let key = entry.key();
        self.entries.write().await.insert(key, entry);
        debug!("Cached feature table");
    }

    /// Removes entries of one source, or every entry when `source` is `None`.
    ///
    /// Returns the number of entries removed.
    #[instrument(skip(self))]
    pub async fn clear(&self, source: Option<&str>) -> usize {
        let mut cache = self.entries.write().await;
        let before = cache.len();
        match source {
            Some(name) => cache.retain(|key, _| key.source != name),
            None => cache.clear(),
        }
        let removed = before - cache.len();
        debug!(removed, "Cleared cache entries");
        removed
    }

    /// Removes every entry older than the TTL.
    ///
    /// Returns the number of entries removed.
    #[instrument(skip(self))]
    pub async fn clear_expired(&self) -> usize {
        let mut cache = self.entries.write().await;
        let before = cache.len();
        cache.retain(|_, entry| !entry.is_stale(self.ttl));
        let removed = before - cache.len();
        if removed > 0 {
            debug!("Invalidated {} stale cache entries", removed);
        }
        removed
    }

    /// Number of entries, fresh or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Footprint report.
    pub async fn stats(&self) -> CacheStats {
        let cache = self.entries.read().await;
        let mut stats = CacheStats {
            entries: cache.len(),
            ..CacheStats::default()
        };
        for entry in cache.values() {
            stats.approx_bytes += entry.table.approx_bytes();
            *stats
                .entries_per_source
                .entry(entry.source.clone())
                .or_default() += 1;
            stats.oldest_entry = Some(match stats.oldest_entry {
                Some(oldest) => oldest.min(entry.cached_at),
                None => entry.cached_at,
            });
        }
        stats
    }
}

/// Clones the entry under `key` if it is fresh and intact, removing it otherwise.
fn serve_or_evict(
    entries: &mut HashMap<CacheKey, CacheEntry>,
    key: &CacheKey,
    ttl: Duration,
) -> Option<FeatureTable> {
    match entries.get(key) {
        Some(entry) if !entry.is_stale(ttl) && entry.is_intact() => Some(entry.table.clone()),
        Some(_) => {
            entries.remove(key);
            None
        }
        None => None,
    }
}

/// Content checksum of a table (blake3, hex encoded).
///
/// Covers the index, column names, storage types and every cell's bit pattern.
#[must_use]
pub fn checksum(table: &FeatureTable) -> String {
    let mut hasher = blake3::Hasher::new();
    for column in table.as_dataframe().get_columns() {
        hasher.update(column.name().as_bytes());
        hasher.update(column.dtype().to_string().as_bytes());
        if let Ok(text) = column.str() {
            for cell in text {
                hash_cell(&mut hasher, cell.map(str::as_bytes));
            }
        } else if let Ok(physical) = column.to_physical_repr().cast(&DataType::Float64) {
            if let Ok(values) = physical.f64() {
                for cell in values {
                    let bits = cell.map(|v| v.to_bits().to_le_bytes());
                    hash_cell(&mut hasher, bits.as_ref().map(|b| b.as_slice()));
                }
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}

fn hash_cell(hasher: &mut blake3::Hasher, cell: Option<&[u8]>) {
    match cell {
        Some(bytes) => {
            hasher.update(&[1]);
            hasher.update(bytes);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use ingest_core::float_column;

    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn sample() -> FeatureTable {
        FeatureTable::from_columns(vec![d(2), d(3)], vec![("close", vec![100.0, 101.0])])
            .unwrap()
    }

    #[tokio::test]
    async fn test_cache_round_trip_returns_copy() {
        let cache = FeatureCache::new(Duration::from_secs(3600));
        let symbol = Symbol::new("AAPL");
        let range = DateRange::new(d(1), d(5)).unwrap();

        assert!(cache.get("prices", &symbol, d(1), d(5)).await.is_none());

        cache.put("prices", &symbol, range, &sample()).await;
        let hit = cache.get("prices", &symbol, d(1), d(5)).await.unwrap();
        assert_eq!(hit.get(d(3), "close"), Some(101.0));

        // Different range is a different key.
        assert!(cache.get("prices", &symbol, d(1), d(6)).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_entry_is_evicted_on_read() {
        let cache = FeatureCache::new(Duration::from_secs(3600));
        let symbol = Symbol::new("AAPL");
        let range = DateRange::new(d(1), d(5)).unwrap();
        let old = CacheEntry::new("prices", &symbol, range, &sample())
            .with_cached_at(Utc::now() - chrono::TimeDelta::hours(2));
        cache.insert_entry(old).await;

        assert_eq!(cache.len().await, 1);
        assert!(cache.get("prices", &symbol, d(1), d(5)).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_by_source_and_expired() {
        let cache = FeatureCache::new(Duration::from_secs(3600));
        let symbol = Symbol::new("AAPL");
        let range = DateRange::new(d(1), d(5)).unwrap();

        cache.put("prices", &symbol, range, &sample()).await;
        cache.put("indicators", &symbol, range, &sample()).await;
        cache
            .insert_entry(
                CacheEntry::new("calendar", &symbol, range, &sample())
                    .with_cached_at(Utc::now() - chrono::TimeDelta::days(2)),
            )
            .await;

        assert_eq!(cache.clear_expired().await, 1);
        assert_eq!(cache.clear(Some("prices")).await, 1);
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.entries_per_source.get("indicators"), Some(&1));
        assert!(stats.approx_bytes > 0);

        assert_eq!(cache.clear(None).await, 1);
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_checksum_tracks_content() {
        let a = sample();
        let mut b = sample();
        assert_eq!(checksum(&a), checksum(&b));
        b.insert(float_column("close", &[100.0, 102.0])).unwrap();
        assert_ne!(checksum(&a), checksum(&b));

        let mut c = sample();
        c.insert(float_column("close", &[100.0, f64::NAN])).unwrap();
        assert_ne!(checksum(&a), checksum(&c));
    }

    #[test]
    fn test_replaced_entry_survives_eviction() {
        let symbol = Symbol::new("AAPL");
        let range = DateRange::new(d(1), d(5)).unwrap();
        let ttl = Duration::from_secs(3600);
        let stale = CacheEntry::new("prices", &symbol, range, &sample())
            .with_cached_at(Utc::now() - chrono::TimeDelta::hours(2));
        let key = stale.key();
        let mut entries = HashMap::from([(key.clone(), stale)]);

        // A writer swaps in a fresh entry before eviction runs.
        entries.insert(
            key.clone(),
            CacheEntry::new("prices", &symbol, range, &sample()),
        );
        let served = serve_or_evict(&mut entries, &key, ttl).unwrap();
        assert_eq!(served.get(d(2), "close"), Some(100.0));
        assert_eq!(entries.len(), 1);

        entries.insert(
            key.clone(),
            CacheEntry::new("prices", &symbol, range, &sample())
                .with_cached_at(Utc::now() - chrono::TimeDelta::hours(2)),
        );
        assert!(serve_or_evict(&mut entries, &key, ttl).is_none());
        assert!(entries.is_empty());
    }
}
