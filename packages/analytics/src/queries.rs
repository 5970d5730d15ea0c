//! Reference lookups over a record snapshot.
//!
//! These are the cheap, single-pass views: property lookups, per-zip
//! price averages, per-capita crime rates, and the safe high-value
//! property search.

use std::collections::{BTreeMap, BTreeSet};

use phillow_analytics_models::{
    CrimeLocationCount, CrimePerCapita, LowestCrimeZip, LowestCrimeZipsParams, PopulatedZipPrice,
    PropertyFilter, SafePropertiesParams, SafeProperty, ZipAveragePrice,
};
use phillow_records_models::{Property, RecordSet};
use tokio_util::sync::CancellationToken;

use crate::aggregate::{crime_counts_by_zip, property_groups_by_zip};
use crate::{AnalyticsError, as_f64, round2, round4};

const DEFAULT_BATHROOMS: (f64, f64) = (0.0, 100.0);
const DEFAULT_BEDROOMS: (f64, f64) = (0.0, 100.0);
const DEFAULT_LIVABLE_AREA: (f64, f64) = (0.0, 100_000.0);
const DEFAULT_MARKET_VALUE: (f64, f64) = (0.0, 1_000_000_000.0);

fn required_zip(zip: &str) -> Result<&str, AnalyticsError> {
    let zip = zip.trim();
    if zip.is_empty() {
        return Err(AnalyticsError::InvalidParameter {
            message: "zip code is required".to_string(),
        });
    }
    Ok(zip)
}

/// Properties whose address is exactly `address` (surrounding whitespace
/// ignored).
#[must_use]
pub fn property_by_address(records: &RecordSet, address: &str) -> Vec<Property> {
    let address = address.trim();
    records
        .properties
        .iter()
        .filter(|p| p.address == address)
        .cloned()
        .collect()
}

fn in_range(value: Option<f64>, min: Option<f64>, max: Option<f64>, default: (f64, f64)) -> bool {
    let min = min.unwrap_or(default.0);
    let max = max.unwrap_or(default.1);
    value.is_some_and(|v| v >= min && v <= max)
}

/// Properties in one zip matching every range of `filter`.
///
/// Bounds are inclusive; a property missing a filtered attribute never
/// matches.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidParameter`] if no zip code is given.
pub fn properties_in_zip(
    records: &RecordSet,
    filter: &PropertyFilter,
) -> Result<Vec<Property>, AnalyticsError> {
    let zip = required_zip(filter.zipcode.as_deref().unwrap_or_default())?;

    Ok(records
        .properties
        .iter()
        .filter(|p| p.zip_code == zip)
        .filter(|p| {
            in_range(p.bathrooms, filter.min_bathrooms, filter.max_bathrooms, DEFAULT_BATHROOMS)
                && in_range(p.bedrooms, filter.min_bedrooms, filter.max_bedrooms, DEFAULT_BEDROOMS)
                && in_range(
                    p.livable_area,
                    filter.min_livable_area,
                    filter.max_livable_area,
                    DEFAULT_LIVABLE_AREA,
                )
                && in_range(
                    Some(p.market_value),
                    filter.min_market_value,
                    filter.max_market_value,
                    DEFAULT_MARKET_VALUE,
                )
        })
        .cloned()
        .collect())
}

/// Crime coordinates in one zip with a count per (location, type).
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidParameter`] on an empty zip code.
pub fn crimes_in_zip(
    records: &RecordSet,
    zip: &str,
) -> Result<Vec<CrimeLocationCount>, AnalyticsError> {
    let zip = required_zip(zip)?;
    let incidents = records.crime_incidents.iter().filter(|c| c.zip_code == zip);

    Ok(phillow_proximity::group_crime_locations(incidents)
        .into_iter()
        .map(|location| CrimeLocationCount {
            lat: location.location.latitude,
            lng: location.location.longitude,
            text_general_code: location.crime_type,
            crime_count: location.count,
        })
        .collect())
}

/// Addresses of the police stations in one zip.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidParameter`] on an empty zip code.
pub fn police_stations_in_zip(records: &RecordSet, zip: &str) -> Result<Vec<String>, AnalyticsError> {
    let zip = required_zip(zip)?;
    Ok(records
        .police_stations
        .iter()
        .filter(|s| s.zip_code == zip)
        .map(|s| s.location.clone())
        .collect())
}

/// Average market value per zip, highest first.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn average_house_price_per_zip(
    records: &RecordSet,
    cancel: &CancellationToken,
) -> Result<Vec<ZipAveragePrice>, AnalyticsError> {
    let mut rows: Vec<ZipAveragePrice> = property_groups_by_zip(&records.properties, cancel)?
        .into_iter()
        .map(|(zip, group)| ZipAveragePrice {
            zip_code: zip.to_string(),
            avg_house_price: round2(group.avg_market_value()),
        })
        .collect();

    rows.sort_by(|a, b| b.avg_house_price.total_cmp(&a.avg_house_price));
    Ok(rows)
}

/// Average market value of one zip, `None` when it has no properties.
#[must_use]
pub fn average_house_price_for_zip(records: &RecordSet, zip: &str) -> Option<ZipAveragePrice> {
    let zip = zip.trim();
    let properties: Vec<&Property> = records
        .properties
        .iter()
        .filter(|p| p.zip_code == zip)
        .collect();
    if properties.is_empty() {
        return None;
    }

    let sum: f64 = properties.iter().map(|p| p.market_value).sum();
    Some(ZipAveragePrice {
        zip_code: zip.to_string(),
        avg_house_price: round2(sum / as_f64(properties.len() as u64)),
    })
}

/// Average market value and property count for zips with a population
/// strictly above `min_population`, in zip order.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn average_price_for_populated_zips(
    records: &RecordSet,
    min_population: u64,
    cancel: &CancellationToken,
) -> Result<Vec<PopulatedZipPrice>, AnalyticsError> {
    let populations = records.populations();

    Ok(property_groups_by_zip(&records.properties, cancel)?
        .into_iter()
        .filter(|(zip, _)| populations.get(zip).is_some_and(|&p| p > min_population))
        .map(|(zip, group)| PopulatedZipPrice {
            zip_code: zip.to_string(),
            avg_market_value: round2(group.avg_market_value()),
            property_count: group.count,
        })
        .collect())
}

/// Crime per capita for every zip with a population, highest first.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn crime_per_capita(
    records: &RecordSet,
    cancel: &CancellationToken,
) -> Result<Vec<CrimePerCapita>, AnalyticsError> {
    let crimes = crime_counts_by_zip(&records.crime_incidents, None, cancel)?;

    let mut rows: Vec<CrimePerCapita> = records
        .populations()
        .into_iter()
        .map(|(zip, population)| {
            let crime_count = crimes.get(zip).copied().unwrap_or(0);
            CrimePerCapita {
                zip_code: zip.to_string(),
                crime_count,
                population,
                crime_per_capita: round4(as_f64(crime_count) / as_f64(population)),
            }
        })
        .collect();

    rows.sort_by(|a, b| b.crime_per_capita.total_cmp(&a.crime_per_capita));
    Ok(rows)
}

/// Crime per capita for one zip.
///
/// Returns `Ok(None)` when the zip has no population record or a
/// population of zero; the rate is undefined there.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidParameter`] on an empty zip code.
pub fn crime_per_capita_for_zip(
    records: &RecordSet,
    zip: &str,
) -> Result<Option<CrimePerCapita>, AnalyticsError> {
    let zip = required_zip(zip)?;
    let Some(&population) = records.populations().get(zip) else {
        log::debug!("No population for zip {zip}");
        return Ok(None);
    };

    let crime_count = records
        .crime_incidents
        .iter()
        .filter(|c| c.zip_code == zip)
        .count() as u64;

    Ok(Some(CrimePerCapita {
        zip_code: zip.to_string(),
        crime_count,
        population,
        crime_per_capita: round4(as_f64(crime_count) / as_f64(population)),
    }))
}

/// Properties worth more than `min_market_value` in zips without a single
/// recorded incident of `crime_type`.
///
/// The crime type matches case-insensitively. Sorted ascending by market
/// value and capped at `limit` rows.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidParameter`] if the minimum value is
/// missing or not positive, or the crime type is missing or blank.
pub fn safe_high_value_properties(
    records: &RecordSet,
    params: &SafePropertiesParams,
    limit: usize,
) -> Result<Vec<SafeProperty>, AnalyticsError> {
    let min_market_value = params
        .min_market_value
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| AnalyticsError::InvalidParameter {
            message: "min_market_value is required and must be > 0".to_string(),
        })?;
    let crime_type = params
        .crime_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AnalyticsError::InvalidParameter {
            message: "crime_type is required".to_string(),
        })?;

    let unsafe_zips: BTreeSet<&str> = records
        .crime_incidents
        .iter()
        .filter(|c| c.crime_type.trim().eq_ignore_ascii_case(crime_type))
        .map(|c| c.zip_code.as_str())
        .collect();

    let mut rows: Vec<SafeProperty> = records
        .properties
        .iter()
        .filter(|p| p.market_value > min_market_value)
        .filter(|p| !unsafe_zips.contains(p.zip_code.as_str()))
        .map(|p| SafeProperty {
            address: p.address.clone(),
            zip_code: p.zip_code.clone(),
            market_value: p.market_value,
            total_livable_area: p.livable_area,
            year_built: p.year_built,
        })
        .collect();

    rows.sort_by(|a, b| a.market_value.total_cmp(&b.market_value));
    rows.truncate(limit);
    Ok(rows)
}

/// Zips with the lowest per-capita rate of the selected crime types,
/// with their average property price.
///
/// Only zips with a population, at least one matching incident, and at
/// least one property are ranked. Ascending by rate, capped at `limit`.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidParameter`] if no crime type is given
/// and [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn lowest_crime_zips(
    records: &RecordSet,
    params: &LowestCrimeZipsParams,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<Vec<LowestCrimeZip>, AnalyticsError> {
    let crime_types = params.crime_types();
    if crime_types.is_empty() {
        return Err(AnalyticsError::InvalidParameter {
            message: "at least one crime type is required".to_string(),
        });
    }

    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for incident in &records.crime_incidents {
        let kind = incident.crime_type.trim();
        if crime_types.iter().any(|t| kind.eq_ignore_ascii_case(t)) {
            *counts.entry(incident.zip_code.as_str()).or_insert(0) += 1;
        }
    }

    let populations = records.populations();
    let prices = property_groups_by_zip(&records.properties, cancel)?;

    let mut rows: Vec<LowestCrimeZip> = counts
        .into_iter()
        .filter_map(|(zip, count)| {
            let population = *populations.get(zip)?;
            let group = prices.get(zip)?;
            Some(LowestCrimeZip {
                zip_code: zip.to_string(),
                specific_crime_per_capita: round4(as_f64(count) / as_f64(population)),
                avg_price: round2(group.avg_market_value()),
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        a.specific_crime_per_capita
            .total_cmp(&b.specific_crime_per_capita)
    });
    rows.truncate(limit);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{crime, population, property, station};

    fn never() -> CancellationToken {
        CancellationToken::new()
    }

    fn records() -> RecordSet {
        RecordSet {
            properties: vec![
                property("1 A ST", "19104", 100_000.0),
                property("2 A ST", "19104", 300_000.0),
                property("1 B ST", "19103", 500_000.0),
                property("2 B ST", "19103", 700_000.0),
                property("1 C ST", "19139", 50_000.0),
            ],
            crime_incidents: vec![
                crime("1 BLOCK A ST", "19104", "Thefts", (2018, 1, 1)),
                crime("1 BLOCK A ST", "19104", "Thefts", (2018, 1, 2)),
                crime("1 BLOCK A ST", "19104", "Burglary Residential", (2018, 1, 3)),
                crime("1 BLOCK B ST", "19103", "Fraud", (2018, 1, 3)),
                crime("1 BLOCK C ST", "19139", "Thefts", (2018, 1, 3)),
            ],
            police_stations: vec![station("1 POLICE PLZ", "19104")],
            zip_populations: vec![
                population("19104", 20_000),
                population("19103", 5_000),
                population("19139", 0),
            ],
        }
    }

    #[test]
    fn finds_property_by_exact_address() {
        let records = records();
        assert_eq!(property_by_address(&records, " 1 A ST ").len(), 1);
        assert!(property_by_address(&records, "1 A STREET").is_empty());
    }

    #[test]
    fn properties_in_zip_applies_ranges() {
        let mut records = records();
        records.properties[0].bedrooms = Some(5.0);
        records.properties[1].bathrooms = None;

        let all = properties_in_zip(
            &records,
            &PropertyFilter {
                zipcode: Some("19104".to_string()),
                ..PropertyFilter::default()
            },
        )
        .unwrap();
        // Missing bathrooms never match
        assert_eq!(all.len(), 1);

        let filtered = properties_in_zip(
            &records,
            &PropertyFilter {
                zipcode: Some("19104".to_string()),
                max_bedrooms: Some(4.0),
                ..PropertyFilter::default()
            },
        )
        .unwrap();
        assert!(filtered.is_empty());

        assert!(matches!(
            properties_in_zip(&records, &PropertyFilter::default()),
            Err(AnalyticsError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn crimes_in_zip_groups_by_location_and_type() {
        let rows = crimes_in_zip(&records(), "19104").unwrap();
        assert_eq!(rows.len(), 2);
        let thefts = rows.iter().find(|r| r.text_general_code == "Thefts").unwrap();
        assert_eq!(thefts.crime_count, 2);
        assert!(crimes_in_zip(&records(), " ").is_err());
    }

    #[test]
    fn stations_in_zip() {
        assert_eq!(
            police_stations_in_zip(&records(), "19104").unwrap(),
            vec!["1 POLICE PLZ".to_string()]
        );
        assert!(police_stations_in_zip(&records(), "19103").unwrap().is_empty());
    }

    #[test]
    fn average_prices() {
        let records = records();
        let rows = average_house_price_per_zip(&records, &never()).unwrap();
        assert_eq!(rows[0].zip_code, "19103");
        assert!((rows[0].avg_house_price - 600_000.0).abs() < 1e-9);
        assert_eq!(rows.last().unwrap().zip_code, "19139");

        let one = average_house_price_for_zip(&records, "19104").unwrap();
        assert!((one.avg_house_price - 200_000.0).abs() < 1e-9);
        assert!(average_house_price_for_zip(&records, "00000").is_none());
    }

    #[test]
    fn populated_zip_threshold_is_exclusive() {
        let rows = average_price_for_populated_zips(&records(), 10_000, &never()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].zip_code, "19104");
        assert_eq!(rows[0].property_count, 2);

        let rows = average_price_for_populated_zips(&records(), 20_000, &never()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn crime_per_capita_matches_ratio() {
        let rows = crime_per_capita(&records(), &never()).unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert!(row.crime_per_capita >= 0.0);
            let expected = round4(as_f64(row.crime_count) / as_f64(row.population));
            assert!((row.crime_per_capita - expected).abs() < 1e-12);
        }
        assert!(rows.iter().all(|r| r.zip_code != "19139"));
    }

    #[test]
    fn crime_per_capita_scenario() {
        let crimes = (0..5778)
            .map(|i| crime("1 BLOCK A ST", "19104", "Thefts", (2018, 1, 1 + i % 28)))
            .collect();
        let records = RecordSet {
            crime_incidents: crimes,
            zip_populations: vec![population("19104", 53_679)],
            ..RecordSet::default()
        };

        let row = crime_per_capita_for_zip(&records, "19104").unwrap().unwrap();
        assert_eq!(row.crime_count, 5778);
        assert_eq!(row.population, 53_679);
        assert!((row.crime_per_capita - 0.1076).abs() < 1e-12);
    }

    #[test]
    fn crime_per_capita_for_unpopulated_zip_is_none() {
        let records = records();
        assert_eq!(crime_per_capita_for_zip(&records, "19139").unwrap(), None);
        assert_eq!(crime_per_capita_for_zip(&records, "99999").unwrap(), None);
        assert!(crime_per_capita_for_zip(&records, "").is_err());
    }

    #[test]
    fn safe_properties_exclude_zips_with_the_crime() {
        let rows = safe_high_value_properties(
            &records(),
            &SafePropertiesParams {
                min_market_value: Some(40_000.0),
                crime_type: Some("thefts".to_string()),
            },
            100,
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.zip_code == "19103"));
        assert!(rows.iter().all(|r| r.market_value > 40_000.0));
        assert!(rows[0].market_value <= rows[1].market_value);
    }

    #[test]
    fn safe_properties_value_is_strict_and_capped() {
        let rows = safe_high_value_properties(
            &records(),
            &SafePropertiesParams {
                min_market_value: Some(500_000.0),
                crime_type: Some("Arson".to_string()),
            },
            100,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].market_value - 700_000.0).abs() < f64::EPSILON);

        let capped = safe_high_value_properties(
            &records(),
            &SafePropertiesParams {
                min_market_value: Some(1.0),
                crime_type: Some("Arson".to_string()),
            },
            3,
        )
        .unwrap();
        assert_eq!(capped.len(), 3);
    }

    #[test]
    fn safe_properties_require_parameters() {
        let records = records();
        for params in [
            SafePropertiesParams {
                min_market_value: None,
                crime_type: Some("Thefts".to_string()),
            },
            SafePropertiesParams {
                min_market_value: Some(0.0),
                crime_type: Some("Thefts".to_string()),
            },
            SafePropertiesParams {
                min_market_value: Some(1.0),
                crime_type: Some("  ".to_string()),
            },
        ] {
            assert!(matches!(
                safe_high_value_properties(&records, &params, 100),
                Err(AnalyticsError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn lowest_crime_zips_rank_ascending() {
        let params = LowestCrimeZipsParams {
            crime_type1: Some("Thefts".to_string()),
            crime_type2: Some("Fraud".to_string()),
            crime_type3: None,
        };
        let rows = lowest_crime_zips(&records(), &params, 10, &never()).unwrap();

        // 19139 has no population and is dropped
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].zip_code, "19104");
        assert!((rows[0].specific_crime_per_capita - 0.0001).abs() < 1e-12);
        assert_eq!(rows[1].zip_code, "19103");
        assert!((rows[1].specific_crime_per_capita - 0.0002).abs() < 1e-12);
        assert!((rows[1].avg_price - 600_000.0).abs() < 1e-9);

        assert!(
            lowest_crime_zips(&records(), &LowestCrimeZipsParams::default(), 10, &never()).is_err()
        );
    }
}
