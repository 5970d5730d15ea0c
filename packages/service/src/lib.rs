#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Request-scoped façade over the Phillow engine.
//!
//! [`InsightsService`] wires a [`RecordStore`], a [`Geocoder`], and the
//! street info [`AggregateCache`] together and exposes one method per
//! operation. Each call:
//!
//! 1. validates its parameters ([`ServiceError::InvalidRequest`] on a
//!    missing or malformed required field),
//! 2. takes an immutable record snapshot from the store,
//! 3. runs the computation on the blocking pool under
//!    `computation_timeout_secs`, cancelling it if the budget runs out.
//!
//! Requests share nothing but the cache, so they can run concurrently.

pub mod config;
pub mod error;

use std::sync::Arc;
use std::time::Instant;

use phillow_analytics::{AnalyticsError, aggregate, queries, scoring};
use phillow_analytics_models::{
    CrimeLocationCount, CrimePerCapita, InvestmentScore, LowestCrimeZip, LowestCrimeZipsParams,
    PopulatedZipPrice, PropertyFilter, SafePropertiesParams, SafeProperty, StreetInfo,
    StreetPattern, StreetSafetyScore, ZipAggregate, ZipAveragePrice,
};
use phillow_cache::{AggregateCache, StreetInfoSnapshot};
use phillow_geocoder::{GeocodedAddress, Geocoder};
use phillow_proximity::{NearbyCrime, NearbyStation};
use phillow_records::RecordStore;
use phillow_records_models::{Property, RecordSet};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use config::ServiceConfig;
pub use error::{ErrorKind, ServiceError};

/// Crimes and police stations around a geocoded address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyResult {
    pub address: GeocodedAddress,
    pub radius_km: f64,
    pub crimes: Vec<NearbyCrime>,
    pub stations: Vec<NearbyStation>,
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ServiceError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::invalid(format!("{name} is required")))
}

/// The Phillow insights engine.
pub struct InsightsService {
    store: Arc<dyn RecordStore>,
    geocoder: Arc<dyn Geocoder>,
    cache: Arc<AggregateCache>,
    config: ServiceConfig,
}

impl InsightsService {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        geocoder: Arc<dyn Geocoder>,
        config: ServiceConfig,
    ) -> Self {
        let cache = Arc::new(AggregateCache::new(
            Arc::clone(&store),
            config.crime_window,
        ));

        Self {
            store,
            geocoder,
            cache,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<AggregateCache> {
        &self.cache
    }

    /// Runs `compute` over a fresh record snapshot on the blocking pool,
    /// bounded by the computation timeout.
    async fn compute<T, F>(&self, operation: &'static str, compute: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&RecordSet, &CancellationToken) -> Result<T, AnalyticsError> + Send + 'static,
    {
        let start = Instant::now();
        let records = self.store.snapshot().await?;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::task::spawn_blocking(move || compute(&records, &task_cancel));

        match tokio::time::timeout(self.config.computation_timeout(), task).await {
            Ok(Ok(result)) => {
                log::debug!("{operation} finished in {:.2?}", start.elapsed());
                result.map_err(ServiceError::from)
            }
            Ok(Err(e)) => Err(ServiceError::Internal {
                message: format!("{operation} task failed: {e}"),
            }),
            Err(_) => {
                cancel.cancel();
                log::warn!(
                    "{operation} exceeded {:?}, cancelling",
                    self.config.computation_timeout()
                );
                Err(ServiceError::Timeout { operation })
            }
        }
    }

    /// Per-zip summary of property values, population, crimes, and
    /// stations.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the store fails or the computation
    /// times out.
    pub async fn zip_aggregates(&self) -> Result<Vec<ZipAggregate>, ServiceError> {
        self.compute("zip aggregates", aggregate::zip_aggregates)
            .await
    }

    /// Property and crime patterns per street.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the store fails or the computation
    /// times out.
    pub async fn street_patterns(&self) -> Result<Vec<StreetPattern>, ServiceError> {
        let window = self.config.crime_window;
        self.compute("street patterns", move |records, cancel| {
            aggregate::street_patterns(records, window, cancel)
        })
        .await
    }

    /// The cached street info.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the cache has never been
    /// refreshed.
    pub fn street_info(&self) -> Result<Arc<StreetInfoSnapshot>, ServiceError> {
        let snapshot = self.cache.snapshot();
        if !snapshot.is_populated() {
            return Err(ServiceError::not_found(
                "street info cache has not been refreshed",
            ));
        }
        Ok(snapshot)
    }

    /// Cached street info for one street in one zip.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] on a missing street or
    /// zip, [`ServiceError::NotFound`] if the cache holds no such row.
    pub fn street_info_for(
        &self,
        street: Option<&str>,
        zip: Option<&str>,
    ) -> Result<StreetInfo, ServiceError> {
        let street = required(street, "street")?;
        let zip = required(zip, "zip")?;
        let snapshot = self.street_info()?;

        snapshot
            .get(street, zip)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("no street info for {street} in {zip}")))
    }

    /// Recomputes the street info without touching the cache.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the store fails or the computation
    /// times out.
    pub async fn street_info_uncached(&self) -> Result<Vec<StreetInfo>, ServiceError> {
        let window = self.config.crime_window;
        self.compute("street info", move |records, cancel| {
            scoring::street_info(records, window, cancel)
        })
        .await
    }

    /// Refreshes the street info cache and returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Cache`] if the refresh fails or
    /// [`ServiceError::Timeout`] if it exceeds the computation timeout;
    /// the previous snapshot stays live either way.
    pub async fn refresh_cache(&self) -> Result<u64, ServiceError> {
        let cancel = CancellationToken::new();
        match tokio::time::timeout(self.config.computation_timeout(), self.cache.refresh(&cancel))
            .await
        {
            Ok(result) => Ok(result?.version()),
            Err(_) => {
                cancel.cancel();
                Err(ServiceError::Timeout {
                    operation: "cache refresh",
                })
            }
        }
    }

    /// Starts the periodic cache refresh if an interval is configured.
    #[must_use]
    pub fn spawn_cache_refresh(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let interval = self.config.cache_refresh_interval()?;
        log::info!("Refreshing street info cache every {interval:?}");
        Some(Arc::clone(&self.cache).spawn_periodic_refresh(interval, cancel))
    }

    /// Safety score for every street with enough properties.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the store fails or the computation
    /// times out.
    pub async fn street_safety_scores(&self) -> Result<Vec<StreetSafetyScore>, ServiceError> {
        let window = self.config.crime_window;
        self.compute("street safety scores", move |records, cancel| {
            scoring::street_safety_scores(records, window, cancel)
        })
        .await
    }

    /// Investment score per (zip, category).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the store fails or the computation
    /// times out.
    pub async fn investment_scores(&self) -> Result<Vec<InvestmentScore>, ServiceError> {
        let as_of = self.config.as_of_date();
        self.compute("investment scores", move |records, cancel| {
            scoring::investment_scores(records, as_of, cancel)
        })
        .await
    }

    /// High-value properties in zips free of one crime type.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] if either parameter is
    /// missing or invalid.
    pub async fn safe_high_value_properties(
        &self,
        params: SafePropertiesParams,
    ) -> Result<Vec<SafeProperty>, ServiceError> {
        let limit = self.config.safe_properties_limit;
        self.compute("safe properties", move |records, _| {
            queries::safe_high_value_properties(records, &params, limit)
        })
        .await
    }

    /// Crime per capita for every populated zip.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the store fails or the computation
    /// times out.
    pub async fn crime_per_capita(&self) -> Result<Vec<CrimePerCapita>, ServiceError> {
        self.compute("crime per capita", queries::crime_per_capita)
        .await
    }

    /// Crime per capita for one zip.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] on a missing zip and
    /// [`ServiceError::NotFound`] when the zip has no population data.
    pub async fn crime_per_capita_for_zip(
        &self,
        zip: Option<&str>,
    ) -> Result<CrimePerCapita, ServiceError> {
        let zip = required(zip, "zip")?.to_string();
        let lookup = zip.clone();
        self.compute("crime per capita", move |records, _| {
            queries::crime_per_capita_for_zip(records, &lookup)
        })
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("no population data for zip {zip}")))
    }

    /// Zips with the lowest per-capita rate of up to three crime types.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] if no crime type is given.
    pub async fn lowest_crime_zips(
        &self,
        params: LowestCrimeZipsParams,
    ) -> Result<Vec<LowestCrimeZip>, ServiceError> {
        let limit = self.config.lowest_crime_zips_limit;
        self.compute("lowest crime zips", move |records, cancel| {
            queries::lowest_crime_zips(records, &params, limit, cancel)
        })
        .await
    }

    /// Properties at an exact address.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] on a missing address and
    /// [`ServiceError::NotFound`] when nothing matches.
    pub async fn property_by_address(
        &self,
        address: Option<&str>,
    ) -> Result<Vec<Property>, ServiceError> {
        let address = required(address, "address")?.to_string();
        let lookup = address.clone();
        let found = self
            .compute("property lookup", move |records, _| {
                Ok(queries::property_by_address(records, &lookup))
            })
            .await?;

        if found.is_empty() {
            return Err(ServiceError::not_found(format!(
                "no property at {address}"
            )));
        }
        Ok(found)
    }

    /// Properties in a zip matching the filter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] if no zip is given.
    pub async fn properties_in_zip(
        &self,
        filter: PropertyFilter,
    ) -> Result<Vec<Property>, ServiceError> {
        self.compute("properties in zip", move |records, _| {
            queries::properties_in_zip(records, &filter)
        })
        .await
    }

    /// Crime coordinates and counts in one zip.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] if no zip is given.
    pub async fn crimes_in_zip(
        &self,
        zip: Option<&str>,
    ) -> Result<Vec<CrimeLocationCount>, ServiceError> {
        let zip = required(zip, "zip")?.to_string();
        self.compute("crimes in zip", move |records, _| {
            queries::crimes_in_zip(records, &zip)
        })
        .await
    }

    /// Police station addresses in one zip.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] if no zip is given.
    pub async fn police_stations_in_zip(
        &self,
        zip: Option<&str>,
    ) -> Result<Vec<String>, ServiceError> {
        let zip = required(zip, "zip")?.to_string();
        self.compute("police stations in zip", move |records, _| {
            queries::police_stations_in_zip(records, &zip)
        })
        .await
    }

    /// Average market value per zip, highest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the store fails or the computation
    /// times out.
    pub async fn average_house_price_per_zip(&self) -> Result<Vec<ZipAveragePrice>, ServiceError> {
        self.compute("average house price", queries::average_house_price_per_zip)
        .await
    }

    /// Average market value of one zip.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] on a missing zip and
    /// [`ServiceError::NotFound`] when the zip has no properties.
    pub async fn average_house_price_for_zip(
        &self,
        zip: Option<&str>,
    ) -> Result<ZipAveragePrice, ServiceError> {
        let zip = required(zip, "zip")?.to_string();
        let lookup = zip.clone();
        self.compute("average house price", move |records, _| {
            Ok(queries::average_house_price_for_zip(records, &lookup))
        })
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("no properties in zip {zip}")))
    }

    /// Average market value for zips above the population threshold.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the store fails or the computation
    /// times out.
    pub async fn average_price_for_populated_zips(
        &self,
    ) -> Result<Vec<PopulatedZipPrice>, ServiceError> {
        let threshold = self.config.populated_zip_threshold;
        self.compute("populated zip prices", move |records, cancel| {
            queries::average_price_for_populated_zips(records, threshold, cancel)
        })
        .await
    }

    /// Crimes and police stations within `radius_km` of an address.
    ///
    /// The geocoder lookup is bounded by `geocode_timeout_secs`; only the
    /// records inside the radius's bounding box are read from the store.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidRequest`] if the address or radius is
    ///   missing, or the radius is not a positive number.
    /// - [`ServiceError::NotFound`] if the address cannot be resolved.
    /// - [`ServiceError::Upstream`] if the geocoder fails, times out, or
    ///   answers with a point outside the valid coordinate range.
    pub async fn crimes_near_address(
        &self,
        address: Option<&str>,
        radius_km: Option<f64>,
    ) -> Result<NearbyResult, ServiceError> {
        let address = required(address, "address")?;
        let radius_km = radius_km.ok_or_else(|| ServiceError::invalid("radius_km is required"))?;
        phillow_proximity::validate_radius(radius_km)?;

        let geocoded = match tokio::time::timeout(
            self.config.geocode_timeout(),
            self.geocoder.geocode(address),
        )
        .await
        {
            Ok(Ok(Some(geocoded))) => geocoded,
            Ok(Ok(None)) => {
                log::debug!("Address not found: '{address}'");
                return Err(ServiceError::not_found(format!(
                    "address not found: {address}"
                )));
            }
            Ok(Err(e)) => {
                log::warn!("Geocoding '{address}' failed: {e}");
                return Err(ServiceError::Upstream(e));
            }
            Err(_) => {
                log::warn!("Geocoding '{address}' timed out");
                return Err(ServiceError::Upstream(
                    phillow_geocoder::GeocodeError::Timeout,
                ));
            }
        };

        let center = geocoded.point();
        let bounds = phillow_proximity::bounding_box(center, radius_km)?;
        let incidents = self.store.crime_incidents_within(bounds).await?;
        let stations = self.store.police_stations_within(bounds).await?;

        let found = phillow_proximity::search(center, radius_km, &incidents, &stations)?;

        Ok(NearbyResult {
            address: geocoded,
            radius_km,
            crimes: found.crimes,
            stations: found.stations,
        })
    }
}
