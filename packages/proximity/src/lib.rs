#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Radius search over crime incidents and police stations.
//!
//! Distances are great-circle distances on a sphere of Earth's mean
//! radius. Crime incidents are collapsed into distinct (type, zip,
//! coordinate) locations with a count before any distance is computed, so
//! the result size is bounded by the number of distinct locations rather
//! than raw incidents.
//!
//! Callers usually narrow the candidate set first with a bounded scan over
//! [`bounding_box`], which is guaranteed to contain every point within the
//! radius.

use std::collections::BTreeMap;

use phillow_records_models::{BoundingBox, CrimeIncident, GeoPoint, PoliceStation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Slack added to every side of a search box, in degrees.
const BOX_SLACK_DEGREES: f64 = 1e-9;

/// Errors that can occur when validating a proximity query.
#[derive(Debug, Error)]
pub enum ProximityError {
    /// The radius is missing, non-positive, or not finite.
    #[error("Invalid radius: {radius_km} km (must be a finite value > 0)")]
    InvalidRadius {
        /// The rejected radius.
        radius_km: f64,
    },

    /// The center point is outside the valid latitude/longitude range.
    #[error("Invalid coordinate: ({latitude}, {longitude})")]
    InvalidCoordinate {
        /// The rejected latitude.
        latitude: f64,
        /// The rejected longitude.
        longitude: f64,
    },
}

/// Great-circle distance in kilometers between two points.
///
/// Uses the spherical law of cosines with the `acos` argument clamped to
/// `[-1, 1]`, so identical and antipodal points never produce `NaN`.
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let cos_angle = lat1
        .sin()
        .mul_add(lat2.sin(), lat1.cos() * lat2.cos() * delta_lng.cos())
        .clamp(-1.0, 1.0);

    EARTH_RADIUS_KM * cos_angle.acos()
}

/// Validates a search radius.
///
/// # Errors
///
/// Returns [`ProximityError::InvalidRadius`] unless `radius_km` is finite
/// and greater than zero.
pub fn validate_radius(radius_km: f64) -> Result<(), ProximityError> {
    if radius_km.is_finite() && radius_km > 0.0 {
        Ok(())
    } else {
        Err(ProximityError::InvalidRadius { radius_km })
    }
}

/// Validates a search center.
///
/// # Errors
///
/// Returns [`ProximityError::InvalidCoordinate`] if either component is
/// not finite or out of range.
pub fn validate_point(point: GeoPoint) -> Result<(), ProximityError> {
    let valid = point.latitude.is_finite()
        && point.longitude.is_finite()
        && (-90.0..=90.0).contains(&point.latitude)
        && (-180.0..=180.0).contains(&point.longitude);

    if valid {
        Ok(())
    } else {
        Err(ProximityError::InvalidCoordinate {
            latitude: point.latitude,
            longitude: point.longitude,
        })
    }
}

/// Latitude/longitude box containing every point within `radius_km` of
/// `center`.
///
/// The box is conservative: it may contain points farther away, never
/// the reverse. When the circle reaches a pole or crosses the
/// antimeridian the box spans all longitudes.
///
/// # Errors
///
/// Returns [`ProximityError`] if the center or radius is invalid.
pub fn bounding_box(center: GeoPoint, radius_km: f64) -> Result<BoundingBox, ProximityError> {
    validate_point(center)?;
    validate_radius(radius_km)?;

    let angular = radius_km / EARTH_RADIUS_KM;
    let delta_lat = angular.to_degrees() + BOX_SLACK_DEGREES;
    let min_lat = center.latitude - delta_lat;
    let max_lat = center.latitude + delta_lat;

    let full_span = BoundingBox {
        min_lat: min_lat.max(-90.0),
        max_lat: max_lat.min(90.0),
        min_lng: -180.0,
        max_lng: 180.0,
    };

    if min_lat <= -90.0 || max_lat >= 90.0 || angular >= std::f64::consts::FRAC_PI_2 {
        return Ok(full_span);
    }

    let ratio = angular.sin() / center.latitude.to_radians().cos();
    if ratio >= 1.0 {
        return Ok(full_span);
    }

    let delta_lng = ratio.asin().to_degrees() + BOX_SLACK_DEGREES;
    let min_lng = center.longitude - delta_lng;
    let max_lng = center.longitude + delta_lng;
    if min_lng < -180.0 || max_lng > 180.0 {
        return Ok(full_span);
    }

    Ok(BoundingBox {
        min_lat,
        max_lat,
        min_lng,
        max_lng,
    })
}

/// Incidents of one type in one zip at one exact coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeLocation {
    #[serde(rename = "text_general_code")]
    pub crime_type: String,
    pub zip_code: String,
    pub location: GeoPoint,
    pub count: u64,
}

/// Groups incidents by (type, zip, latitude, longitude) with a count.
///
/// Incidents without coordinates are skipped. Output is ordered by type,
/// zip, latitude, then longitude.
pub fn group_crime_locations<'a>(
    incidents: impl IntoIterator<Item = &'a CrimeIncident>,
) -> Vec<CrimeLocation> {
    let mut groups: BTreeMap<(&str, &str, u64, u64), (GeoPoint, u64)> = BTreeMap::new();
    let mut skipped = 0_u64;

    for incident in incidents {
        let Some(point) = incident.location() else {
            skipped += 1;
            continue;
        };
        let key = (
            incident.crime_type.as_str(),
            incident.zip_code.as_str(),
            point.latitude.to_bits(),
            point.longitude.to_bits(),
        );
        groups.entry(key).or_insert((point, 0)).1 += 1;
    }

    if skipped > 0 {
        log::debug!("Skipped {skipped} incidents without coordinates");
    }

    let mut locations: Vec<CrimeLocation> = groups
        .into_iter()
        .map(|((crime_type, zip_code, _, _), (location, count))| CrimeLocation {
            crime_type: crime_type.to_string(),
            zip_code: zip_code.to_string(),
            location,
            count,
        })
        .collect();

    locations.sort_by(|a, b| {
        a.crime_type
            .cmp(&b.crime_type)
            .then_with(|| a.zip_code.cmp(&b.zip_code))
            .then_with(|| a.location.latitude.total_cmp(&b.location.latitude))
            .then_with(|| a.location.longitude.total_cmp(&b.location.longitude))
    });
    locations
}

/// A crime location within the search radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyCrime {
    #[serde(rename = "text_general_code")]
    pub crime_type: String,
    pub zip_code: String,
    pub lat: f64,
    pub lng: f64,
    pub crime_count: u64,
    pub distance_km: f64,
}

/// A police station within the search radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyStation {
    pub location: String,
    pub zip_code: String,
    pub lat: f64,
    pub lng: f64,
    pub distance_km: f64,
}

/// Crimes and stations within a radius, each sorted ascending by
/// distance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProximityResult {
    pub crimes: Vec<NearbyCrime>,
    pub stations: Vec<NearbyStation>,
}

/// Returns every crime location and station within `radius_km` of
/// `center`.
///
/// Crimes at the same distance are ordered by (type, zip); stations at
/// the same distance by address. Distances are not rounded.
///
/// # Errors
///
/// Returns [`ProximityError`] if the center or radius is invalid.
pub fn search<'a>(
    center: GeoPoint,
    radius_km: f64,
    incidents: impl IntoIterator<Item = &'a CrimeIncident>,
    stations: impl IntoIterator<Item = &'a PoliceStation>,
) -> Result<ProximityResult, ProximityError> {
    validate_point(center)?;
    validate_radius(radius_km)?;

    let mut crimes: Vec<NearbyCrime> = group_crime_locations(incidents)
        .into_iter()
        .filter_map(|location| {
            let distance_km = haversine_km(center, location.location);
            (distance_km <= radius_km).then(|| NearbyCrime {
                lat: location.location.latitude,
                lng: location.location.longitude,
                crime_type: location.crime_type,
                zip_code: location.zip_code,
                crime_count: location.count,
                distance_km,
            })
        })
        .collect();
    crimes.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.crime_type.cmp(&b.crime_type))
            .then_with(|| a.zip_code.cmp(&b.zip_code))
    });

    let mut stations: Vec<NearbyStation> = stations
        .into_iter()
        .filter_map(|station| {
            let distance_km = haversine_km(center, station.point());
            (distance_km <= radius_km).then(|| NearbyStation {
                location: station.location.clone(),
                zip_code: station.zip_code.clone(),
                lat: station.lat,
                lng: station.lng,
                distance_km,
            })
        })
        .collect();
    stations.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.location.cmp(&b.location))
    });

    log::debug!(
        "Found {} crime locations and {} stations within {radius_km} km",
        crimes.len(),
        stations.len()
    );

    Ok(ProximityResult { crimes, stations })
}
