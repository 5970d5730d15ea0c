//! Composite street and zip scores.
//!
//! The weights and bucket thresholds below are fixed ranking policy.
//! Changing any of them changes every published ranking.

use std::collections::BTreeMap;

use chrono::{Datelike as _, NaiveDate};
use phillow_analytics_models::{InvestmentScore, ReportingWindow, StreetInfo, StreetSafetyScore};
use phillow_records_models::RecordSet;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{crime_counts_by_zip, property_groups_by_zip, street_rows};
use crate::{AnalyticsError, as_f64, check_cancelled, check_every, round2, round_to};

pub const HOME_FINDER_VALUE_WEIGHT: f64 = 0.4;
pub const HOME_FINDER_CRIME_WEIGHT: f64 = 0.4;
pub const HOME_FINDER_STATION_WEIGHT: f64 = 0.2;

pub const SAFETY_VALUE_WEIGHT: f64 = 0.3;
pub const SAFETY_CRIME_WEIGHT: f64 = 0.4;
pub const SAFETY_STATION_BONUS: f64 = 0.3;

/// Years of sales history considered by the investment score.
pub const INVESTMENT_SALES_YEARS: i32 = 5;
/// Properties built this many years before the reference date or later
/// count as new construction.
pub const NEW_CONSTRUCTION_YEARS: i32 = 10;
/// Minimum distinct sale years for a (zip, category) to be scored.
pub const MIN_SALE_YEARS: usize = 3;

/// Street-level info with market-value and crime ranks and the
/// home-finder score.
///
/// Market value rank 1 is the highest average value; crime rank 1 is the
/// fewest crimes in `window`. Ties keep (street, zip) order. Output is
/// ascending by score, lowest (best) first.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn street_info(
    records: &RecordSet,
    window: ReportingWindow,
    cancel: &CancellationToken,
) -> Result<Vec<StreetInfo>, AnalyticsError> {
    let rows = street_rows(records, window, cancel)?;
    let populations: BTreeMap<&str, u64> = records
        .zip_populations
        .iter()
        .map(|z| (z.zip_code.as_str(), z.population))
        .collect();
    let stations = records.station_counts();

    let mut by_value: Vec<usize> = (0..rows.len()).collect();
    by_value.sort_by(|&a, &b| {
        rows[b]
            .properties
            .avg_market_value()
            .total_cmp(&rows[a].properties.avg_market_value())
    });
    let mut by_crime: Vec<usize> = (0..rows.len()).collect();
    by_crime.sort_by_key(|&i| rows[i].crimes.count);

    let mut value_rank = vec![0_u64; rows.len()];
    for (rank, &i) in by_value.iter().enumerate() {
        value_rank[i] = rank as u64 + 1;
    }
    let mut crime_rank = vec![0_u64; rows.len()];
    for (rank, &i) in by_crime.iter().enumerate() {
        crime_rank[i] = rank as u64 + 1;
    }
    check_cancelled(cancel)?;

    let mut info: Vec<StreetInfo> = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let police_station_count = stations.get(row.zip_code.as_str()).copied().unwrap_or(0);
            let score = HOME_FINDER_VALUE_WEIGHT * as_f64(value_rank[i])
                + HOME_FINDER_CRIME_WEIGHT * as_f64(crime_rank[i])
                - HOME_FINDER_STATION_WEIGHT * as_f64(police_station_count);

            StreetInfo {
                population: populations.get(row.zip_code.as_str()).copied(),
                police_station_count,
                property_count: row.properties.count,
                avg_market_value: round2(row.properties.avg_market_value()),
                avg_sale_price: row.properties.avg_sale_price().map(round2),
                property_type_diversity: row.properties.category_count(),
                total_crimes: row.crimes.count,
                crime_type_distribution: row.crimes.distribution,
                market_value_rank: value_rank[i],
                crime_rank: crime_rank[i],
                home_finder_score: round2(score),
                street_name: row.street_name,
                zip_code: row.zip_code,
            }
        })
        .collect();

    info.sort_by(|a, b| a.home_finder_score.total_cmp(&b.home_finder_score));
    log::debug!("Computed street info for {} streets", info.len());
    Ok(info)
}

/// Crime-frequency band used by the safety score.
#[must_use]
pub const fn crime_band(crime_count: u64) -> f64 {
    match crime_count {
        0 => 1.0,
        1..10 => 0.8,
        10..50 => 0.5,
        _ => 0.2,
    }
}

/// Safety score (0–100 scale) for every street row whose zip has a
/// population and a non-zero average market value.
///
/// Sorted descending by score.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn street_safety_scores(
    records: &RecordSet,
    window: ReportingWindow,
    cancel: &CancellationToken,
) -> Result<Vec<StreetSafetyScore>, AnalyticsError> {
    let rows = street_rows(records, window, cancel)?;
    let populations = records.populations();
    let zip_groups = property_groups_by_zip(&records.properties, cancel)?;
    let stations = records.station_counts();

    let mut scores = Vec::with_capacity(rows.len());
    for row in rows {
        if !populations.contains_key(row.zip_code.as_str()) {
            log::debug!("Skipping {} ({}): no population", row.street_name, row.zip_code);
            continue;
        }
        let zip_avg = zip_groups
            .get(row.zip_code.as_str())
            .map_or(0.0, |g| g.avg_market_value());
        if zip_avg <= 0.0 {
            log::debug!("Skipping {} ({}): zip average value is 0", row.street_name, row.zip_code);
            continue;
        }

        let police_station_count = stations.get(row.zip_code.as_str()).copied().unwrap_or(0);
        let avg_value = row.properties.avg_market_value();
        let station_bonus = if police_station_count > 0 {
            SAFETY_STATION_BONUS
        } else {
            0.0
        };
        let score = (avg_value / zip_avg).mul_add(
            SAFETY_VALUE_WEIGHT,
            crime_band(row.crimes.count).mul_add(SAFETY_CRIME_WEIGHT, station_bonus),
        ) * 100.0;

        scores.push(StreetSafetyScore {
            avg_property_value: round2(avg_value),
            property_count: row.properties.count,
            crime_count: row.crimes.count,
            months_with_crimes: row.crimes.months_with_crimes(),
            avg_crime_hour: row.crimes.avg_hour(),
            police_station_count,
            safety_score: round2(score),
            zip_code: row.zip_code,
            street_name: row.street_name,
        });
    }

    scores.sort_by(|a, b| b.safety_score.total_cmp(&a.safety_score));
    Ok(scores)
}

/// Pearson correlation coefficient of two equally long series.
///
/// `None` when fewer than two points are given or either series is
/// constant.
#[must_use]
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = as_f64(xs.len() as u64);
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

#[derive(Debug, Default)]
struct YearSales {
    price_sum: f64,
    count: u64,
    new_construction: u64,
}

fn years_before(as_of: NaiveDate, years: i32) -> NaiveDate {
    as_of
        .with_year(as_of.year() - years)
        .unwrap_or_else(|| as_of - chrono::Days::new(365 * u64::from(years.unsigned_abs())))
}

fn trend_points(trend: Option<f64>) -> f64 {
    match trend {
        Some(t) if t > 0.7 => 30.0,
        Some(t) if t > 0.3 => 20.0,
        _ => 10.0,
    }
}

const fn construction_points(new_construction: u64) -> f64 {
    match new_construction {
        0..=5 => 0.0,
        6..=10 => 10.0,
        _ => 20.0,
    }
}

fn crime_rate_points(rate_per_1000: f64) -> f64 {
    if rate_per_1000 < 50.0 {
        30.0
    } else if rate_per_1000 < 100.0 {
        15.0
    } else {
        0.0
    }
}

/// Investment score per (zip, category) from the sales of the five years
/// up to `as_of`.
///
/// Sorted descending by score.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] if `cancel` fires mid-scan.
pub fn investment_scores(
    records: &RecordSet,
    as_of: NaiveDate,
    cancel: &CancellationToken,
) -> Result<Vec<InvestmentScore>, AnalyticsError> {
    let sales_start = years_before(as_of, INVESTMENT_SALES_YEARS);
    let new_since = as_of.year() - NEW_CONSTRUCTION_YEARS;

    let mut groups: BTreeMap<(&str, &str), BTreeMap<i32, YearSales>> = BTreeMap::new();
    for (i, property) in records.properties.iter().enumerate() {
        check_every(i, cancel)?;
        let (Some(date), Some(price)) = (property.sale_date, property.sale_price) else {
            continue;
        };
        if price <= 0.0 || date < sales_start || date > as_of {
            continue;
        }
        let Some(category) = property
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            continue;
        };

        let year = groups
            .entry((property.zip_code.as_str(), category))
            .or_default()
            .entry(date.year())
            .or_default();
        year.price_sum += price;
        year.count += 1;
        if property.year_built.is_some_and(|y| y >= new_since) {
            year.new_construction += 1;
        }
    }
    check_cancelled(cancel)?;

    let populations = records.populations();
    let stations = records.station_counts();
    let crimes = crime_counts_by_zip(
        &records.crime_incidents,
        Some(ReportingWindow::year_before(as_of)),
        cancel,
    )?;

    let mut scores = Vec::new();
    for ((zip, category), years) in groups {
        if years.len() < MIN_SALE_YEARS {
            continue;
        }
        let Some(&population) = populations.get(zip) else {
            log::debug!("Skipping {zip}/{category}: no population");
            continue;
        };

        let (sale_years, averages): (Vec<f64>, Vec<f64>) = years
            .iter()
            .map(|(year, sales)| (f64::from(*year), sales.price_sum / as_f64(sales.count)))
            .unzip();
        let avg_price = averages.iter().sum::<f64>() / as_f64(averages.len() as u64);
        if avg_price <= 0.0 {
            continue;
        }
        let max = averages.iter().copied().fold(f64::MIN, f64::max);
        let min = averages.iter().copied().fold(f64::MAX, f64::min);
        let price_trend = pearson(&sale_years, &averages);
        let total_new_construction: u64 = years.values().map(|s| s.new_construction).sum();
        let police_stations = stations.get(zip).copied().unwrap_or(0);
        let crime_rate = as_f64(crimes.get(zip).copied().unwrap_or(0)) / as_f64(population) * 1000.0;

        let station_points = if police_stations > 0 { 20.0 } else { 0.0 };
        let score = trend_points(price_trend)
            + construction_points(total_new_construction)
            + crime_rate_points(crime_rate)
            + station_points;

        scores.push(InvestmentScore {
            zip_code: zip.to_string(),
            category_code_description: category.to_string(),
            avg_price: round2(avg_price),
            price_volatility: round2(max - min),
            price_trend: price_trend.map(|t| round_to(t, 3)),
            total_new_construction,
            police_stations,
            crime_rate_per_1000: round2(crime_rate),
            investment_score: round2(score),
        });
    }

    scores.sort_by(|a, b| b.investment_score.total_cmp(&a.investment_score));
    log::debug!("Computed {} investment scores", scores.len());
    Ok(scores)
}
