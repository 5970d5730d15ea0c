#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Address geocoding for proximity search.
//!
//! Converts a free-text address into latitude/longitude coordinates
//! behind the [`Geocoder`] trait:
//!
//! - [`nominatim::NominatimGeocoder`]: Nominatim / `OpenStreetMap` search,
//!   configured from the embedded `services/nominatim.toml`.
//! - [`FixedGeocoder`]: an in-memory address table for tests and
//!   offline runs.
//!
//! A geocoder reports "no match" as `Ok(None)`; errors are reserved for
//! transport and parsing failures.

pub mod config;
pub mod nominatim;

use std::collections::BTreeMap;

use async_trait::async_trait;
use phillow_records_models::GeoPoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A resolved address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedAddress {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// The canonical address returned by the geocoder.
    pub display_name: Option<String>,
}

impl GeocodedAddress {
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The service did not answer in time.
    #[error("Geocoding request timed out")]
    Timeout,
}

/// Resolves free-text addresses to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Geocodes `address`, returning `Ok(None)` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the lookup itself fails.
    async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>, GeocodeError>;
}

/// Geocoder backed by a fixed address table.
///
/// Lookups ignore case and surrounding whitespace.
#[derive(Debug, Clone, Default)]
pub struct FixedGeocoder {
    addresses: BTreeMap<String, GeocodedAddress>,
}

impl FixedGeocoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(address: &str) -> String {
        address.trim().to_uppercase()
    }

    /// Adds or replaces the coordinates of `address`.
    #[must_use]
    pub fn with(mut self, address: &str, latitude: f64, longitude: f64) -> Self {
        self.addresses.insert(
            Self::key(address),
            GeocodedAddress {
                latitude,
                longitude,
                display_name: Some(address.trim().to_string()),
            },
        );
        self
    }
}

#[async_trait]
impl Geocoder for FixedGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>, GeocodeError> {
        let found = self.addresses.get(&Self::key(address)).cloned();
        if found.is_none() {
            log::debug!("No fixed coordinates for '{address}'");
        }
        Ok(found)
    }
}
