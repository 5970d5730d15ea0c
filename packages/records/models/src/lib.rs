#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reference record types shared across the Phillow toolchain.
//!
//! These are the read-only facts produced by the bulk ingest: property
//! transactions, crime incidents, police stations, and zip populations.
//! Field names serialize to the column names of the reference tables so
//! the same types round-trip through CSV exports and query results.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime, Timelike as _};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The four logical reference tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Table {
    /// Property transactions and assessments.
    Properties,
    /// Crime incident dispatch records.
    CrimeData,
    /// Police station locations.
    PoliceStations,
    /// Population per zip region.
    ZipcodePopulation,
}

impl Table {
    /// Returns all tables in load order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Properties,
            Self::CrimeData,
            Self::PoliceStations,
            Self::ZipcodePopulation,
        ]
    }

    /// File name used for this table in a CSV export directory.
    #[must_use]
    pub fn csv_file_name(self) -> String {
        format!("{}.csv", self.as_ref())
    }
}

/// A property record.
///
/// Addresses are not guaranteed globally unique but serve as the natural
/// key for lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Free-form street address (e.g. `"1234 MARKET ST"`).
    #[serde(rename = "location")]
    pub address: String,
    /// Zip region code.
    pub zip_code: String,
    /// Assessed market value.
    pub market_value: f64,
    /// Most recent sale price.
    #[serde(default)]
    pub sale_price: Option<f64>,
    /// Most recent sale date.
    #[serde(default)]
    pub sale_date: Option<NaiveDate>,
    /// Category description (e.g. `"SINGLE FAMILY"`).
    #[serde(rename = "category_code_description", default)]
    pub category: Option<String>,
    #[serde(rename = "number_of_bathrooms", default)]
    pub bathrooms: Option<f64>,
    #[serde(rename = "number_of_bedrooms", default)]
    pub bedrooms: Option<f64>,
    /// Livable area in square feet.
    #[serde(rename = "total_livable_area", default)]
    pub livable_area: Option<f64>,
    /// Total lot area in square feet.
    #[serde(default)]
    pub total_area: Option<f64>,
    #[serde(default)]
    pub year_built: Option<i32>,
    #[serde(rename = "number_stories", default)]
    pub stories: Option<f64>,
}

/// A single dispatched crime incident.
///
/// Several incidents may share coordinates and type; they are counted,
/// never deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeIncident {
    /// Opaque record identifier.
    pub object_id: String,
    /// Zip region code.
    pub zip_code: String,
    /// Block description (e.g. `"1200 BLOCK MARKET ST"`).
    pub location_block: String,
    /// General crime type code (e.g. `"Thefts"`).
    #[serde(rename = "text_general_code")]
    pub crime_type: String,
    pub dispatch_date: NaiveDate,
    #[serde(default)]
    pub dispatch_time: Option<NaiveTime>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl CrimeIncident {
    /// Hour of day the incident was dispatched, if known.
    #[must_use]
    pub fn dispatch_hour(&self) -> Option<u32> {
        self.dispatch_time.map(|t| t.hour())
    }

    /// Incident coordinates, if both are present and finite.
    #[must_use]
    pub fn location(&self) -> Option<GeoPoint> {
        Some(GeoPoint::new(self.lat?, self.lng?)).filter(|p| p.is_finite())
    }
}

/// A police station location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoliceStation {
    pub object_id: String,
    /// Station street address.
    pub location: String,
    pub zip_code: String,
    pub lat: f64,
    pub lng: f64,
}

impl PoliceStation {
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Population count for a zip region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipPopulation {
    pub zip_code: String,
    pub population: u64,
}

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `false` if either coordinate is `NaN` or infinite.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Axis-aligned latitude/longitude box, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Returns `true` if `point` lies inside the box (edges included).
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.latitude)
            && (self.min_lng..=self.max_lng).contains(&point.longitude)
    }
}

/// An immutable snapshot of all four reference tables.
///
/// Every aggregation runs against one of these; nothing in the toolchain
/// mutates a snapshot after it is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    pub properties: Vec<Property>,
    pub crime_incidents: Vec<CrimeIncident>,
    pub police_stations: Vec<PoliceStation>,
    pub zip_populations: Vec<ZipPopulation>,
}

impl RecordSet {
    /// Population per zip code, keeping only regions with a population
    /// greater than zero.
    ///
    /// A zip listed more than once keeps its last value.
    #[must_use]
    pub fn populations(&self) -> BTreeMap<&str, u64> {
        self.zip_populations
            .iter()
            .filter(|z| z.population > 0)
            .map(|z| (z.zip_code.as_str(), z.population))
            .collect()
    }

    /// Number of police stations per zip code.
    #[must_use]
    pub fn station_counts(&self) -> BTreeMap<&str, u64> {
        let mut counts = BTreeMap::new();
        for station in &self.police_stations {
            *counts.entry(station.zip_code.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Total number of records across all tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
            + self.crime_incidents.len()
            + self.police_stations.len()
            + self.zip_populations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_match_reference_tables() {
        assert_eq!(Table::Properties.as_ref(), "properties");
        assert_eq!(Table::CrimeData.as_ref(), "crime_data");
        assert_eq!(Table::ZipcodePopulation.csv_file_name(), "zipcode_population.csv");
        assert_eq!("police_stations".parse::<Table>().unwrap(), Table::PoliceStations);
    }

    #[test]
    fn populations_skip_zero() {
        let set = RecordSet {
            zip_populations: vec![
                ZipPopulation {
                    zip_code: "19104".to_string(),
                    population: 53_679,
                },
                ZipPopulation {
                    zip_code: "19112".to_string(),
                    population: 0,
                },
            ],
            ..RecordSet::default()
        };
        let pops = set.populations();
        assert_eq!(pops.get("19104"), Some(&53_679));
        assert!(!pops.contains_key("19112"));
    }

    #[test]
    fn deserializes_property_csv_row() {
        let data = "location,zip_code,market_value,sale_price,sale_date,category_code_description,number_of_bathrooms,number_of_bedrooms,total_livable_area,total_area,year_built,number_stories\n\
                    1234 MARKET ST,19104,250000,240000,2019-06-01,SINGLE FAMILY,1.5,3,1200,1600,1925,2\n\
                    10 ELM ST,19104,90000,,,,,,,,,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<Property> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].address, "1234 MARKET ST");
        assert_eq!(rows[0].bathrooms, Some(1.5));
        assert_eq!(rows[0].sale_date, NaiveDate::from_ymd_opt(2019, 6, 1));
        assert_eq!(rows[1].sale_price, None);
        assert_eq!(rows[1].year_built, None);
    }

    #[test]
    fn crime_hour_and_location() {
        let incident = CrimeIncident {
            object_id: "1".to_string(),
            zip_code: "19104".to_string(),
            location_block: "1200 BLOCK MARKET ST".to_string(),
            crime_type: "Thefts".to_string(),
            dispatch_date: NaiveDate::from_ymd_opt(2018, 3, 4).unwrap(),
            dispatch_time: NaiveTime::from_hms_opt(22, 15, 0),
            lat: Some(39.95),
            lng: None,
        };
        assert_eq!(incident.dispatch_hour(), Some(22));
        assert!(incident.location().is_none());

        let nan = CrimeIncident {
            lng: Some(f64::NAN),
            ..incident.clone()
        };
        assert!(nan.location().is_none());
        let placed = CrimeIncident {
            lng: Some(-75.19),
            ..incident
        };
        assert_eq!(placed.location(), Some(GeoPoint::new(39.95, -75.19)));
        assert!(!GeoPoint::new(f64::INFINITY, -75.19).is_finite());
    }

    #[test]
    fn bounding_box_contains_edges() {
        let bbox = BoundingBox {
            min_lat: 39.9,
            max_lat: 40.0,
            min_lng: -75.2,
            max_lng: -75.1,
        };
        assert!(bbox.contains(GeoPoint::new(39.9, -75.1)));
        assert!(!bbox.contains(GeoPoint::new(40.01, -75.15)));
    }
}
