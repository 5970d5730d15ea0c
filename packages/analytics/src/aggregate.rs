//! Per-street and per-zip aggregation of property and crime facts.
//!
//! Properties and crimes are grouped on the normalized street key (and
//! zip, where the view is zip-scoped), then property groups are left
//! joined with crime groups so streets without crimes keep a zero count.
//! Streets with fewer than [`MIN_STREET_PROPERTIES`] properties are
//! dropped from every street-level view.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Datelike as _;
use phillow_analytics_models::{ReportingWindow, StreetPattern, ZipAggregate};
use phillow_records_models::{CrimeIncident, Property, RecordSet};
use tokio_util::sync::CancellationToken;

use crate::normalize::normalize_street;
use crate::{AnalyticsError, as_f64, check_cancelled, check_every, round2, round4, round_to};

/// Streets with fewer properties than this are excluded from street-level
/// output.
pub const MIN_STREET_PROPERTIES: u64 = 5;

/// Property facts accumulated for one group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyGroup {
    pub count: u64,
    market_value_sum: f64,
    sale_price_sum: f64,
    sale_price_count: u64,
    categories: BTreeSet<String>,
    pub newest_year_built: Option<i32>,
    pub oldest_year_built: Option<i32>,
}

impl PropertyGroup {
    fn add(&mut self, property: &Property) {
        self.count += 1;
        self.market_value_sum += property.market_value;

        if let Some(price) = property.sale_price {
            self.sale_price_sum += price;
            self.sale_price_count += 1;
        }

        if let Some(category) = property.category.as_deref().map(str::trim)
            && !category.is_empty()
        {
            self.categories.insert(category.to_string());
        }

        // Unknown construction years are recorded as 0 in the assessment data
        if let Some(year) = property.year_built.filter(|y| *y > 0) {
            self.newest_year_built = Some(self.newest_year_built.map_or(year, |y| y.max(year)));
            self.oldest_year_built = Some(self.oldest_year_built.map_or(year, |y| y.min(year)));
        }
    }

    #[must_use]
    pub fn avg_market_value(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.market_value_sum / as_f64(self.count)
    }

    #[must_use]
    pub fn avg_sale_price(&self) -> Option<f64> {
        (self.sale_price_count > 0).then(|| self.sale_price_sum / as_f64(self.sale_price_count))
    }

    /// Number of distinct category descriptions.
    #[must_use]
    pub fn category_count(&self) -> u64 {
        self.categories.len() as u64
    }
}

/// Crime facts accumulated for one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrimeGroup {
    pub count: u64,
    /// Crime type → number of incidents.
    pub distribution: BTreeMap<String, u64>,
    hour_sum: u64,
    hour_count: u64,
    months: BTreeSet<(i32, u32)>,
}

impl CrimeGroup {
    fn add(&mut self, incident: &CrimeIncident) {
        self.count += 1;
        *self
            .distribution
            .entry(incident.crime_type.clone())
            .or_insert(0) += 1;

        if let Some(hour) = incident.dispatch_hour() {
            self.hour_sum += u64::from(hour);
            self.hour_count += 1;
        }

        self.months.insert((
            incident.dispatch_date.year(),
            incident.dispatch_date.month(),
        ));
    }

    /// Number of distinct crime types.
    #[must_use]
    pub fn crime_type_count(&self) -> u64 {
        self.distribution.len() as u64
    }

    /// Mean hour of day, rounded to 1 decimal.
    #[must_use]
    pub fn avg_hour(&self) -> Option<f64> {
        (self.hour_count > 0).then(|| round_to(as_f64(self.hour_sum) / as_f64(self.hour_count), 1))
    }

    /// Number of distinct calendar months with at least one incident.
    #[must_use]
    pub fn months_with_crimes(&self) -> u64 {
        self.months.len() as u64
    }

    /// Incidents per month with crimes; undefined when there are none.
    #[must_use]
    pub fn crimes_per_month(&self) -> Option<f64> {
        let months = self.months_with_crimes();
        (months > 0).then(|| round2(as_f64(self.count) / as_f64(months)))
    }
}

/// Groups properties by a key derived from the normalized street name.
///
/// Each group carries the first display spelling seen for it.
fn group_properties<K: Ord>(
    properties: &[Property],
    key: impl Fn(&str, &Property) -> K,
    cancel: &CancellationToken,
) -> Result<BTreeMap<K, (String, PropertyGroup)>, AnalyticsError> {
    let mut groups: BTreeMap<K, (String, PropertyGroup)> = BTreeMap::new();

    for (i, property) in properties.iter().enumerate() {
        check_every(i, cancel)?;
        let name = normalize_street(&property.address);
        let entry = groups
            .entry(key(&name.to_uppercase(), property))
            .or_insert_with(|| (name, PropertyGroup::default()));
        entry.1.add(property);
    }

    Ok(groups)
}

/// Groups the crimes inside `window` by a key derived from the normalized
/// block street name.
fn group_crimes<K: Ord>(
    crimes: &[CrimeIncident],
    window: ReportingWindow,
    key: impl Fn(&str, &CrimeIncident) -> K,
    cancel: &CancellationToken,
) -> Result<BTreeMap<K, CrimeGroup>, AnalyticsError> {
    let mut groups: BTreeMap<K, CrimeGroup> = BTreeMap::new();

    for (i, incident) in crimes.iter().enumerate() {
        check_every(i, cancel)?;
        if !window.contains(incident.dispatch_date) {
            continue;
        }
        let street = normalize_street(&incident.location_block).to_uppercase();
        groups
            .entry(key(&street, incident))
            .or_default()
            .add(incident);
    }

    Ok(groups)
}

/// One (street, zip) pair that cleared the property threshold, left
/// joined with its windowed crimes.
#[derive(Debug, Clone, PartialEq)]
pub struct StreetRow {
    pub street_name: String,
    pub zip_code: String,
    pub properties: PropertyGroup,
    /// Empty when no crime matched the street.
    pub crimes: CrimeGroup,
}

/// Builds the (street, zip) rows shared by the street-info and safety
/// views, in ascending (street key, zip) order.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn street_rows(
    records: &RecordSet,
    window: ReportingWindow,
    cancel: &CancellationToken,
) -> Result<Vec<StreetRow>, AnalyticsError> {
    let properties = group_properties(
        &records.properties,
        |street, p| (street.to_string(), p.zip_code.clone()),
        cancel,
    )?;
    let mut crimes = group_crimes(
        &records.crime_incidents,
        window,
        |street, c| (street.to_string(), c.zip_code.clone()),
        cancel,
    )?;
    check_cancelled(cancel)?;

    let rows: Vec<StreetRow> = properties
        .into_iter()
        .filter(|(_, (_, group))| group.count >= MIN_STREET_PROPERTIES)
        .map(|(key, (street_name, group))| {
            let crimes = crimes.remove(&key).unwrap_or_default();
            StreetRow {
                street_name,
                zip_code: key.1,
                properties: group,
                crimes,
            }
        })
        .collect();

    log::debug!("Built {} street rows", rows.len());
    Ok(rows)
}

/// Property and crime patterns per street, across all zips.
///
/// Sorted descending by crime count; equal counts keep street-key order.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn street_patterns(
    records: &RecordSet,
    window: ReportingWindow,
    cancel: &CancellationToken,
) -> Result<Vec<StreetPattern>, AnalyticsError> {
    let properties = group_properties(&records.properties, |street, _| street.to_string(), cancel)?;
    let crimes = group_crimes(
        &records.crime_incidents,
        window,
        |street, _| street.to_string(),
        cancel,
    )?;
    check_cancelled(cancel)?;

    let empty = CrimeGroup::default();
    let mut patterns: Vec<StreetPattern> = properties
        .iter()
        .filter(|(_, (_, group))| group.count >= MIN_STREET_PROPERTIES)
        .map(|(key, (street_name, group))| {
            let crime = crimes.get(key).unwrap_or(&empty);
            StreetPattern {
                street_name: street_name.clone(),
                num_properties: group.count,
                avg_property_value: round2(group.avg_market_value()),
                property_types: group.category_count(),
                newest_property: group.newest_year_built,
                oldest_property: group.oldest_year_built,
                num_crimes: crime.count,
                crime_types: crime.crime_type_count(),
                avg_crime_hour: crime.avg_hour(),
                months_with_crimes: crime.months_with_crimes(),
                crimes_per_month: crime.crimes_per_month(),
                crimes_per_property: round2(as_f64(crime.count) / as_f64(group.count)),
            }
        })
        .collect();

    patterns.sort_by(|a, b| b.num_crimes.cmp(&a.num_crimes));
    Ok(patterns)
}

/// Property counts and value sums per zip.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn property_groups_by_zip<'a>(
    properties: &'a [Property],
    cancel: &CancellationToken,
) -> Result<BTreeMap<&'a str, PropertyGroup>, AnalyticsError> {
    let mut groups: BTreeMap<&str, PropertyGroup> = BTreeMap::new();
    for (i, property) in properties.iter().enumerate() {
        check_every(i, cancel)?;
        groups
            .entry(property.zip_code.as_str())
            .or_default()
            .add(property);
    }
    Ok(groups)
}

/// Number of incidents per zip, optionally restricted to a window.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn crime_counts_by_zip<'a>(
    crimes: &'a [CrimeIncident],
    window: Option<ReportingWindow>,
    cancel: &CancellationToken,
) -> Result<BTreeMap<&'a str, u64>, AnalyticsError> {
    let mut counts = BTreeMap::new();
    for (i, incident) in crimes.iter().enumerate() {
        check_every(i, cancel)?;
        if window.is_some_and(|w| !w.contains(incident.dispatch_date)) {
            continue;
        }
        *counts.entry(incident.zip_code.as_str()).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Per-zip summary for every zip with a population and at least one
/// property.
///
/// Sorted descending by total crimes, ties by zip code.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn zip_aggregates(
    records: &RecordSet,
    cancel: &CancellationToken,
) -> Result<Vec<ZipAggregate>, AnalyticsError> {
    let populations = records.populations();
    let properties = property_groups_by_zip(&records.properties, cancel)?;
    let crimes = crime_counts_by_zip(&records.crime_incidents, None, cancel)?;
    let stations = records.station_counts();
    check_cancelled(cancel)?;

    let mut rows: Vec<ZipAggregate> = populations
        .iter()
        .filter_map(|(zip, &population)| {
            let Some(group) = properties.get(zip) else {
                log::debug!("Skipping zip {zip}: no properties");
                return None;
            };
            let total_crimes = crimes.get(zip).copied().unwrap_or(0);

            Some(ZipAggregate {
                zip_code: (*zip).to_string(),
                avg_market_value: round2(group.avg_market_value()),
                property_count: group.count,
                population,
                total_crimes,
                police_stations: stations.get(zip).copied().unwrap_or(0),
                crime_rate_per_capita: round4(as_f64(total_crimes) / as_f64(population)),
            })
        })
        .collect();

    rows.sort_by(|a, b| b.total_crimes.cmp(&a.total_crimes));
    Ok(rows)
}
