use crate::error::PriceError;
use crate::record::{PriceRecord, normalize_rows};
use crate::store::SheetStore;
use chrono::{DateTime, Local};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

struct Snapshot {
    records: Arc<Vec<PriceRecord>>,
    fetched: Instant,
    loaded_at: DateTime<Local>,
}

/// Normalized price list, reloaded wholesale once it is older than the refresh interval.
///
/// Readers get a shared snapshot; a reload swaps in a new one and never
/// touches a snapshot already handed out.
pub struct PriceCache {
    store: Arc<dyn SheetStore>,
    table: String,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl PriceCache {
    pub fn new(store: Arc<dyn SheetStore>, table: &str, ttl: Duration) -> Self {
        PriceCache {
            store,
            table: table.to_string(),
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    pub fn records(&self) -> Result<Arc<Vec<PriceRecord>>, PriceError> {
        {
            let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(current) = snapshot.as_ref() {
                if current.fetched.elapsed() < self.ttl {
                    return Ok(Arc::clone(&current.records));
                }
            }
        }
        self.reload()
    }

    /// Load the table from the store now, replacing the cached snapshot.
    pub fn reload(&self) -> Result<Arc<Vec<PriceRecord>>, PriceError> {
        let rows = self.store.all_rows(&self.table)?;
        let records = Arc::new(normalize_rows(&rows));
        info!(
            "Loaded {} price records ({} rows) from table '{}'",
            records.len(),
            rows.len(),
            self.table
        );

        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        *snapshot = Some(Snapshot {
            records: Arc::clone(&records),
            fetched: Instant::now(),
            loaded_at: Local::now(),
        });
        Ok(records)
    }

    /// Drop the snapshot so the next read goes to the store.
    pub fn invalidate(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn loaded_at(&self) -> Option<DateTime<Local>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.loaded_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemorySheetStore, Table};

    fn price_store(specs: &[&str]) -> MemorySheetStore {
        let rows = specs
            .iter()
            .map(|spec| vec![spec.to_string(), "1,000".to_string()])
            .collect();
        MemorySheetStore::new().with_table("prices", Table::new(vec!["規格".into(), "經銷價".into()], rows))
    }

    #[test]
    fn test_snapshot_is_reused_within_ttl() {
        let store = Arc::new(price_store(&["A", "B"]));
        let cache = PriceCache::new(store.clone(), "prices", Duration::from_secs(600));

        let first = cache.records().unwrap();
        store
            .replace_table("prices", &["規格".to_string()], &[vec!["C".to_string()]])
            .unwrap();
        let second = cache.records().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 2);

        cache.invalidate();
        let third = cache.records().unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].spec, "C");
        // snapshots already handed out are untouched
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_expired_snapshot_reloads() {
        let store = Arc::new(price_store(&["A"]));
        let cache = PriceCache::new(store, "prices", Duration::ZERO);
        let first = cache.records().unwrap();
        let second = cache.records().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(cache.loaded_at().is_some());
    }

    #[test]
    fn test_missing_table_is_reported() {
        let cache = PriceCache::new(Arc::new(MemorySheetStore::new()), "prices", Duration::from_secs(60));
        assert!(matches!(cache.records(), Err(PriceError::TableNotFound(_))));
        assert!(cache.loaded_at().is_none());
    }
}
