#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result and parameter types for the Phillow analytics engine.
//!
//! Field names serialize in `snake_case` to match the column names the
//! insights front-end consumes. Monetary values and scores are rounded to
//! 2 decimals and per-capita rates to 4 before they are placed in these
//! types; nothing downstream rounds again.

use std::collections::BTreeMap;

use chrono::{Datelike as _, NaiveDate};
use serde::{Deserialize, Serialize};

/// Half-open date range `[start, end)` that crime-side aggregates are
/// restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingWindow {
    /// First day included.
    pub start: NaiveDate,
    /// First day excluded.
    pub end: NaiveDate,
}

impl ReportingWindow {
    /// The full calendar year `year`.
    ///
    /// Returns `None` if `year` is outside chrono's supported range.
    #[must_use]
    pub fn calendar_year(year: i32) -> Option<Self> {
        Some(Self {
            start: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year + 1, 1, 1)?,
        })
    }

    /// The year ending on (and excluding) `as_of`.
    #[must_use]
    pub fn year_before(as_of: NaiveDate) -> Self {
        let start = as_of
            .with_year(as_of.year() - 1)
            .unwrap_or_else(|| as_of - chrono::Days::new(365));
        Self { start, end: as_of }
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

impl Default for ReportingWindow {
    /// The 2018 calendar year, the window of the street-info view.
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or_default(),
        }
    }
}

/// Per-zip summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZipAggregate {
    pub zip_code: String,
    pub avg_market_value: f64,
    pub property_count: u64,
    pub population: u64,
    pub total_crimes: u64,
    pub police_stations: u64,
    pub crime_rate_per_capita: f64,
}

/// Property and crime patterns for one street across all zips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetPattern {
    pub street_name: String,
    pub num_properties: u64,
    pub avg_property_value: f64,
    /// Number of distinct property category descriptions.
    pub property_types: u64,
    pub newest_property: Option<i32>,
    pub oldest_property: Option<i32>,
    pub num_crimes: u64,
    /// Number of distinct crime types.
    pub crime_types: u64,
    pub avg_crime_hour: Option<f64>,
    pub months_with_crimes: u64,
    /// Absent when no month had a crime.
    pub crimes_per_month: Option<f64>,
    pub crimes_per_property: f64,
}

/// Street-level aggregate joined with zip context and home-finder ranking.
///
/// This is the row type materialized by the aggregate cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetInfo {
    pub street_name: String,
    pub zip_code: String,
    pub property_count: u64,
    pub avg_market_value: f64,
    pub avg_sale_price: Option<f64>,
    pub property_type_diversity: u64,
    /// Crimes inside the reporting window.
    pub total_crimes: u64,
    pub crime_type_distribution: BTreeMap<String, u64>,
    /// `None` when the zip has no population record.
    pub population: Option<u64>,
    pub police_station_count: u64,
    /// 1 = highest average market value.
    pub market_value_rank: u64,
    /// 1 = fewest crimes.
    pub crime_rank: u64,
    pub home_finder_score: f64,
}

/// Safety score for one street within its zip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetSafetyScore {
    pub zip_code: String,
    pub street_name: String,
    pub avg_property_value: f64,
    pub property_count: u64,
    pub crime_count: u64,
    pub months_with_crimes: u64,
    pub avg_crime_hour: Option<f64>,
    pub police_station_count: u64,
    pub safety_score: f64,
}

/// Investment score for one property category within a zip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentScore {
    pub zip_code: String,
    pub category_code_description: String,
    pub avg_price: f64,
    /// Spread between the highest and lowest yearly average sale price.
    pub price_volatility: f64,
    /// Correlation of sale year and yearly average sale price, if defined.
    pub price_trend: Option<f64>,
    pub total_new_construction: u64,
    pub police_stations: u64,
    pub crime_rate_per_1000: f64,
    pub investment_score: f64,
}

/// A high-value property in a zip free of one crime type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeProperty {
    pub address: String,
    pub zip_code: String,
    pub market_value: f64,
    pub total_livable_area: Option<f64>,
    pub year_built: Option<i32>,
}

/// Crime count relative to population for one zip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimePerCapita {
    pub zip_code: String,
    pub crime_count: u64,
    pub population: u64,
    pub crime_per_capita: f64,
}

/// Zip ranked by per-capita incidence of selected crime types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowestCrimeZip {
    pub zip_code: String,
    pub specific_crime_per_capita: f64,
    pub avg_price: f64,
}

/// Average market value for one zip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZipAveragePrice {
    pub zip_code: String,
    pub avg_house_price: f64,
}

/// Average market value for a zip above the population threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulatedZipPrice {
    pub zip_code: String,
    pub avg_market_value: f64,
    pub property_count: u64,
}

/// Number of incidents of one type at one coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeLocationCount {
    pub lat: f64,
    pub lng: f64,
    pub text_general_code: String,
    pub crime_count: u64,
}

/// Parameters for the safe high-value property search.
///
/// Both fields are required; they are optional here so a missing value
/// can be reported as an invalid request instead of failing to decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafePropertiesParams {
    pub min_market_value: Option<f64>,
    pub crime_type: Option<String>,
}

/// Up to three crime types for the lowest-crime zip ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowestCrimeZipsParams {
    pub crime_type1: Option<String>,
    pub crime_type2: Option<String>,
    pub crime_type3: Option<String>,
}

impl LowestCrimeZipsParams {
    /// The non-empty crime types, trimmed.
    #[must_use]
    pub fn crime_types(&self) -> Vec<&str> {
        [&self.crime_type1, &self.crime_type2, &self.crime_type3]
            .into_iter()
            .filter_map(|t| t.as_deref().map(str::trim))
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Filters for listing properties in one zip.
///
/// Unset bounds fall back to inclusive defaults: bathrooms and bedrooms
/// `[0, 100]`, livable area `[0, 100000]`, market value `[0, 1e9]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub zipcode: Option<String>,
    pub min_bathrooms: Option<f64>,
    pub max_bathrooms: Option<f64>,
    pub min_bedrooms: Option<f64>,
    pub max_bedrooms: Option<f64>,
    pub min_livable_area: Option<f64>,
    pub max_livable_area: Option<f64>,
    pub min_market_value: Option<f64>,
    pub max_market_value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_is_2018() {
        let window = ReportingWindow::default();
        assert_eq!(Some(window), ReportingWindow::calendar_year(2018));
        assert!(window.contains(NaiveDate::from_ymd_opt(2018, 12, 31).unwrap()));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2019, 1, 1).unwrap()));
    }

    #[test]
    fn year_before_handles_leap_day() {
        let as_of = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let window = ReportingWindow::year_before(as_of);
        assert!(window.start < as_of);
        assert!(!window.contains(as_of));
    }

    #[test]
    fn lowest_crime_params_skip_blank_types() {
        let params = LowestCrimeZipsParams {
            crime_type1: Some(" Thefts ".to_string()),
            crime_type2: Some(String::new()),
            crime_type3: None,
        };
        assert_eq!(params.crime_types(), vec!["Thefts"]);
    }

    #[test]
    fn street_pattern_serializes_absent_rate_as_null() {
        let row = StreetPattern {
            street_name: "MARKET ST".to_string(),
            num_properties: 5,
            avg_property_value: 100_000.0,
            property_types: 1,
            newest_property: None,
            oldest_property: None,
            num_crimes: 0,
            crime_types: 0,
            avg_crime_hour: None,
            months_with_crimes: 0,
            crimes_per_month: None,
            crimes_per_property: 0.0,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert!(json["crimes_per_month"].is_null());
        assert_eq!(json["crimes_per_property"], 0.0);
    }
}
