#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record store adapters for the Phillow reference tables.
//!
//! The aggregation core never reaches for a global connection: every
//! pipeline stage receives a [`RecordStore`] and asks it for a snapshot or
//! for a bounded scan around a point. Three adapters are provided:
//!
//! - [`memory::MemoryStore`]: an in-process snapshot with R-tree indexes
//!   for the bounded scans. Used by tests and by the CSV loader.
//! - [`csv_dir`]: loads a directory of CSV exports into a [`RecordSet`].
//! - [`postgres::PostgresStore`]: raw SQL over `switchy_database`.

pub mod csv_dir;
pub mod db;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use phillow_records_models::{
    BoundingBox, CrimeIncident, PoliceStation, Property, RecordSet, ZipPopulation,
};
use thiserror::Error;

/// Errors that can occur while reading reference records.
#[derive(Debug, Error)]
pub enum RecordStoreError {
    /// Database query failed.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be converted into a record.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Read-only access to the four reference tables.
///
/// Implementations must return a consistent view for the duration of a
/// single call; callers that need several tables at once should use
/// [`RecordStore::snapshot`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All property records.
    async fn properties(&self) -> Result<Vec<Property>, RecordStoreError>;

    /// All crime incidents.
    async fn crime_incidents(&self) -> Result<Vec<CrimeIncident>, RecordStoreError>;

    /// All police stations.
    async fn police_stations(&self) -> Result<Vec<PoliceStation>, RecordStoreError>;

    /// All zip population rows.
    async fn zip_populations(&self) -> Result<Vec<ZipPopulation>, RecordStoreError>;

    /// Crime incidents whose coordinates fall inside `bounds`.
    ///
    /// The default implementation scans every incident.
    async fn crime_incidents_within(
        &self,
        bounds: BoundingBox,
    ) -> Result<Vec<CrimeIncident>, RecordStoreError> {
        Ok(self
            .crime_incidents()
            .await?
            .into_iter()
            .filter(|c| c.location().is_some_and(|p| bounds.contains(p)))
            .collect())
    }

    /// Police stations inside `bounds`.
    async fn police_stations_within(
        &self,
        bounds: BoundingBox,
    ) -> Result<Vec<PoliceStation>, RecordStoreError> {
        Ok(self
            .police_stations()
            .await?
            .into_iter()
            .filter(|s| bounds.contains(s.point()))
            .collect())
    }

    /// Loads all four tables into one immutable snapshot.
    async fn snapshot(&self) -> Result<Arc<RecordSet>, RecordStoreError> {
        let records = RecordSet {
            properties: self.properties().await?,
            crime_incidents: self.crime_incidents().await?,
            police_stations: self.police_stations().await?,
            zip_populations: self.zip_populations().await?,
        };

        log::debug!(
            "Loaded snapshot: {} properties, {} incidents, {} stations, {} zips",
            records.properties.len(),
            records.crime_incidents.len(),
            records.police_stations.len(),
            records.zip_populations.len(),
        );

        Ok(Arc::new(records))
    }
}
