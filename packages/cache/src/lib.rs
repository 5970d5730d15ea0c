#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Materialized street-info cache.
//!
//! The street-info view joins every property with every windowed crime and
//! ranks the result, which takes tens of seconds on the full dataset. The
//! cache holds the last computed result as an immutable, versioned
//! [`StreetInfoSnapshot`] behind an [`ArcSwap`]:
//!
//! - Reads are a pointer load and never wait on a refresh.
//! - [`AggregateCache::refresh`] recomputes from a fresh record snapshot
//!   and swaps the pointer once the new snapshot is complete, so a reader
//!   sees either the old rows or the new rows, never a mix.
//! - Nothing expires on its own. Rows reflect the last refresh until the
//!   next one, even if the underlying records have changed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use phillow_analytics::AnalyticsError;
use phillow_analytics::normalize::street_key;
use phillow_analytics::scoring::street_info;
use phillow_analytics_models::{ReportingWindow, StreetInfo};
use phillow_records::{RecordStore, RecordStoreError};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors that can occur while refreshing the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Loading the record snapshot failed.
    #[error(transparent)]
    Store(#[from] RecordStoreError),

    /// Computing the street info failed or was cancelled.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// The background computation task panicked or was aborted.
    #[error("Refresh task failed: {message}")]
    Join {
        /// Description of the task failure.
        message: String,
    },
}

/// One immutable generation of cached street info.
#[derive(Debug, Default)]
pub struct StreetInfoSnapshot {
    version: u64,
    refreshed_at: Option<DateTime<Utc>>,
    rows: Vec<StreetInfo>,
    /// (street key, zip) → position in `rows`.
    index: BTreeMap<(String, String), usize>,
}

impl StreetInfoSnapshot {
    fn build(version: u64, rows: Vec<StreetInfo>) -> Self {
        let index = rows
            .iter()
            .enumerate()
            .map(|(i, row)| ((row.street_name.to_uppercase(), row.zip_code.clone()), i))
            .collect();

        Self {
            version,
            refreshed_at: Some(Utc::now()),
            rows,
            index,
        }
    }

    /// Monotonic generation number; 0 means never refreshed.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub const fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Whether this snapshot came from a completed refresh.
    #[must_use]
    pub const fn is_populated(&self) -> bool {
        self.version > 0
    }

    /// Rows in home-finder score order.
    #[must_use]
    pub fn rows(&self) -> &[StreetInfo] {
        &self.rows
    }

    /// Looks up one street in one zip.
    ///
    /// `street` may be a street name or a full address; both resolve to
    /// the same normalized key.
    #[must_use]
    pub fn get(&self, street: &str, zip: &str) -> Option<&StreetInfo> {
        let zip = zip.trim().to_string();
        let exact = street
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();

        self.index
            .get(&(exact, zip.clone()))
            .or_else(|| self.index.get(&(street_key(street), zip)))
            .map(|&i| &self.rows[i])
    }
}

/// Street-info cache over a record store.
pub struct AggregateCache {
    store: Arc<dyn RecordStore>,
    window: ReportingWindow,
    current: ArcSwap<StreetInfoSnapshot>,
    refresh_lock: Mutex<()>,
}

impl AggregateCache {
    /// Creates an empty cache; nothing is computed until the first
    /// [`refresh`](Self::refresh).
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, window: ReportingWindow) -> Self {
        Self {
            store,
            window,
            current: ArcSwap::from_pointee(StreetInfoSnapshot::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// The snapshot currently being served.
    #[must_use]
    pub fn snapshot(&self) -> Arc<StreetInfoSnapshot> {
        self.current.load_full()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    #[must_use]
    pub const fn window(&self) -> ReportingWindow {
        self.window
    }

    /// Recomputes the street info from a fresh record snapshot and swaps
    /// it in.
    ///
    /// Concurrent refreshes are serialized. On failure the previous
    /// snapshot stays live.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if loading records or computing fails, or if
    /// `cancel` fires before the computation finishes.
    pub async fn refresh(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<StreetInfoSnapshot>, CacheError> {
        let _guard = self.refresh_lock.lock().await;
        let start = Instant::now();
        log::info!("Refreshing street info cache (version {})", self.version());

        let records = self.store.snapshot().await?;
        let window = self.window;
        let task_cancel = cancel.clone();
        let rows = tokio::task::spawn_blocking(move || street_info(&records, window, &task_cancel))
            .await
            .map_err(|e| CacheError::Join {
                message: e.to_string(),
            })??;

        let snapshot = Arc::new(StreetInfoSnapshot::build(self.version() + 1, rows));
        self.current.store(Arc::clone(&snapshot));

        log::info!(
            "Street info cache refreshed: version {}, {} rows in {:.2?}",
            snapshot.version,
            snapshot.rows.len(),
            start.elapsed()
        );
        Ok(snapshot)
    }

    /// Refreshes every `interval` until `cancel` fires.
    ///
    /// The first refresh runs immediately. A failed refresh is logged and
    /// the previous snapshot keeps serving.
    pub fn spawn_periodic_refresh(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh(&cancel).await {
                            log::error!("Street info cache refresh failed: {e}");
                        }
                    }
                }
            }

            log::info!("Periodic cache refresh stopped at version {}", self.version());
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use phillow_records::memory::MemoryStore;
    use phillow_records_models::{CrimeIncident, Property, RecordSet, ZipPopulation};

    use super::*;

    fn property(address: &str, market_value: f64) -> Property {
        Property {
            address: address.to_string(),
            zip_code: "19104".to_string(),
            market_value,
            sale_price: None,
            sale_date: None,
            category: Some("SINGLE FAMILY".to_string()),
            bathrooms: None,
            bedrooms: None,
            livable_area: None,
            total_area: None,
            year_built: None,
            stories: None,
        }
    }

    fn crime(id: &str, block: &str) -> CrimeIncident {
        CrimeIncident {
            object_id: id.to_string(),
            zip_code: "19104".to_string(),
            location_block: block.to_string(),
            crime_type: "Thefts".to_string(),
            dispatch_date: NaiveDate::from_ymd_opt(2018, 4, 1).unwrap(),
            dispatch_time: None,
            lat: None,
            lng: None,
        }
    }

    fn records(crimes: usize) -> RecordSet {
        let mut properties: Vec<Property> = (0..5)
            .map(|i| property(&format!("{} MARKET ST", 100 + i), 200_000.0))
            .collect();
        properties.extend((0..5).map(|i| property(&format!("{} Walnut St", 100 + i), 150_000.0)));

        RecordSet {
            properties,
            crime_incidents: (0..crimes)
                .map(|i| crime(&i.to_string(), "100 BLOCK MARKET ST"))
                .collect(),
            police_stations: vec![],
            zip_populations: vec![ZipPopulation {
                zip_code: "19104".to_string(),
                population: 1000,
            }],
        }
    }

    fn cache_over(store: &Arc<MemoryStore>) -> AggregateCache {
        AggregateCache::new(
            Arc::clone(store) as Arc<dyn RecordStore>,
            ReportingWindow::default(),
        )
    }

    #[tokio::test]
    async fn empty_until_first_refresh() {
        let store = Arc::new(MemoryStore::new(records(0)));
        let cache = cache_over(&store);

        let snapshot = cache.snapshot();
        assert!(!snapshot.is_populated());
        assert!(snapshot.rows().is_empty());
        assert_eq!(snapshot.refreshed_at(), None);
    }

    #[tokio::test]
    async fn refresh_matches_full_recomputation() {
        let store = Arc::new(MemoryStore::new(records(3)));
        let cache = cache_over(&store);

        let snapshot = cache.refresh(&CancellationToken::new()).await.unwrap();
        let records = store.snapshot().await.unwrap();
        let expected =
            street_info(&records, ReportingWindow::default(), &CancellationToken::new()).unwrap();

        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.rows(), expected.as_slice());
    }

    #[tokio::test]
    async fn serves_last_refresh_not_live_data() {
        let store = Arc::new(MemoryStore::new(records(1)));
        let cache = cache_over(&store);
        cache.refresh(&CancellationToken::new()).await.unwrap();

        store.replace(records(20));

        let stale = cache.snapshot();
        let market = stale.get("MARKET ST", "19104").unwrap();
        assert_eq!(market.total_crimes, 1);

        cache.refresh(&CancellationToken::new()).await.unwrap();
        let fresh = cache.snapshot();
        assert_eq!(fresh.version(), 2);
        assert_eq!(fresh.get("MARKET ST", "19104").unwrap().total_crimes, 20);

        // A reader holding the old generation keeps seeing it
        assert_eq!(stale.get("MARKET ST", "19104").unwrap().total_crimes, 1);
    }

    #[tokio::test]
    async fn lookup_accepts_addresses_and_any_case() {
        let store = Arc::new(MemoryStore::new(records(0)));
        let cache = cache_over(&store);
        let snapshot = cache.refresh(&CancellationToken::new()).await.unwrap();

        assert!(snapshot.get("walnut st", "19104").is_some());
        assert!(snapshot.get("4000 WALNUT ST", " 19104 ").is_some());
        assert!(snapshot.get("WALNUT ST", "19103").is_none());
    }

    #[tokio::test]
    async fn cancelled_refresh_keeps_previous_snapshot() {
        let store = Arc::new(MemoryStore::new(records(2)));
        let cache = cache_over(&store);
        cache.refresh(&CancellationToken::new()).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = cache.refresh(&cancel).await;

        assert!(matches!(
            result,
            Err(CacheError::Analytics(AnalyticsError::Cancelled))
        ));
        assert_eq!(cache.version(), 1);
    }

    #[tokio::test]
    async fn periodic_refresh_runs_until_cancelled() {
        let store = Arc::new(MemoryStore::new(records(0)));
        let cache = Arc::new(cache_over(&store));
        let cancel = CancellationToken::new();

        let handle = Arc::clone(&cache)
            .spawn_periodic_refresh(Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        let version = cache.version();
        assert!(version >= 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.version(), version);
    }
}
