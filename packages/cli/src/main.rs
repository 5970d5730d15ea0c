#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front-end for the Phillow insights engine.
//!
//! Every subcommand maps to one [`InsightsService`] operation and prints
//! its result as JSON on stdout. Records come from a directory of CSV
//! exports (`--data-dir`) or, when no directory is given, from Postgres
//! via `DATABASE_URL`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use phillow_analytics_models::{LowestCrimeZipsParams, PropertyFilter, SafePropertiesParams};
use phillow_geocoder::config::NominatimConfig;
use phillow_geocoder::nominatim::NominatimGeocoder;
use phillow_records::RecordStore;
use phillow_records::memory::MemoryStore;
use phillow_records::postgres::PostgresStore;
use phillow_records::{csv_dir, db};
use phillow_service::{InsightsService, ServiceConfig};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Property and crime insights for Philadelphia zip codes.
#[derive(Parser)]
#[command(name = "phillow")]
#[command(about = "Property and crime insights for Philadelphia zip codes")]
struct Cli {
    /// Path to a TOML configuration file (falls back to `PHILLOW_CONFIG`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of CSV table exports. Uses `DATABASE_URL` when omitted.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-zip property, population, crime, and station summary.
    ZipAggregates,

    /// Property and crime patterns per street.
    StreetPatterns,

    /// Street info with home-finder scores.
    StreetInfo {
        /// Street name or address to look up.
        #[arg(long, requires = "zip")]
        street: Option<String>,

        #[arg(long, requires = "street")]
        zip: Option<String>,
    },

    /// Safety score per street.
    StreetSafety,

    /// Investment score per zip and property category.
    Investment,

    /// High-value properties in zips with no incidents of a crime type.
    SafeProperties {
        #[arg(long)]
        min_market_value: Option<f64>,

        #[arg(long)]
        crime_type: Option<String>,
    },

    /// Crime per capita for every zip, or for one.
    CrimePerCapita {
        #[arg(long)]
        zip: Option<String>,
    },

    /// Zips with the lowest per-capita rate of up to three crime types.
    LowestCrimeZips {
        /// Crime type to count; repeat up to three times.
        #[arg(long = "crime-type")]
        crime_types: Vec<String>,
    },

    /// Properties at an exact address.
    Property {
        #[arg(long)]
        address: Option<String>,
    },

    /// Properties in a zip, filtered by inclusive ranges.
    PropertiesInZip {
        #[arg(long)]
        zip: Option<String>,
        #[arg(long)]
        min_bathrooms: Option<f64>,
        #[arg(long)]
        max_bathrooms: Option<f64>,
        #[arg(long)]
        min_bedrooms: Option<f64>,
        #[arg(long)]
        max_bedrooms: Option<f64>,
        #[arg(long)]
        min_livable_area: Option<f64>,
        #[arg(long)]
        max_livable_area: Option<f64>,
        #[arg(long)]
        min_market_value: Option<f64>,
        #[arg(long)]
        max_market_value: Option<f64>,
    },

    /// Crime coordinates and counts in a zip.
    CrimesInZip {
        #[arg(long)]
        zip: Option<String>,
    },

    /// Police station addresses in a zip.
    StationsInZip {
        #[arg(long)]
        zip: Option<String>,
    },

    /// Average house price for every zip, or for one.
    AveragePrice {
        #[arg(long)]
        zip: Option<String>,
    },

    /// Average house price for zips above the population threshold.
    PopulatedZipPrices,

    /// Crimes and police stations near an address.
    Nearby {
        #[arg(long)]
        address: Option<String>,

        /// Search radius in kilometers.
        #[arg(long)]
        radius_km: Option<f64>,
    },

    /// Refreshes the street info cache on its interval until interrupted,
    /// printing one JSON line per new cache version.
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let config = ServiceConfig::load(cli.config.as_deref())?;

    let store: Arc<dyn RecordStore> = if let Some(dir) = &cli.data_dir {
        log::info!("Loading records from {}", dir.display());
        Arc::new(MemoryStore::new(csv_dir::load_dir(dir)?))
    } else {
        log::info!("Connecting to database...");
        Arc::new(PostgresStore::new(db::connect_from_env().await?))
    };

    let geocoder = NominatimGeocoder::new(
        NominatimConfig::embedded().with_timeout(config.geocode_timeout()),
    )?;
    let service = InsightsService::new(store, Arc::new(geocoder), config);

    run(&service, cli.command).await
}

async fn run(
    service: &InsightsService,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::ZipAggregates => print_json(&service.zip_aggregates().await?),
        Commands::StreetPatterns => print_json(&service.street_patterns().await?),
        Commands::StreetInfo { street, zip } => {
            service.refresh_cache().await?;
            if street.is_some() || zip.is_some() {
                print_json(&service.street_info_for(street.as_deref(), zip.as_deref())?)
            } else {
                print_json(&service.street_info()?.rows())
            }
        }
        Commands::StreetSafety => print_json(&service.street_safety_scores().await?),
        Commands::Investment => print_json(&service.investment_scores().await?),
        Commands::SafeProperties {
            min_market_value,
            crime_type,
        } => print_json(
            &service
                .safe_high_value_properties(SafePropertiesParams {
                    min_market_value,
                    crime_type,
                })
                .await?,
        ),
        Commands::CrimePerCapita { zip: Some(zip) } => {
            print_json(&service.crime_per_capita_for_zip(Some(&zip)).await?)
        }
        Commands::CrimePerCapita { zip: None } => print_json(&service.crime_per_capita().await?),
        Commands::LowestCrimeZips { crime_types } => {
            if crime_types.len() > 3 {
                return Err("at most three --crime-type values are allowed".into());
            }
            let mut types = crime_types.into_iter();
            let params = LowestCrimeZipsParams {
                crime_type1: types.next(),
                crime_type2: types.next(),
                crime_type3: types.next(),
            };
            print_json(&service.lowest_crime_zips(params).await?)
        }
        Commands::Property { address } => {
            print_json(&service.property_by_address(address.as_deref()).await?)
        }
        Commands::PropertiesInZip {
            zip,
            min_bathrooms,
            max_bathrooms,
            min_bedrooms,
            max_bedrooms,
            min_livable_area,
            max_livable_area,
            min_market_value,
            max_market_value,
        } => print_json(
            &service
                .properties_in_zip(PropertyFilter {
                    zipcode: zip,
                    min_bathrooms,
                    max_bathrooms,
                    min_bedrooms,
                    max_bedrooms,
                    min_livable_area,
                    max_livable_area,
                    min_market_value,
                    max_market_value,
                })
                .await?,
        ),
        Commands::CrimesInZip { zip } => {
            print_json(&service.crimes_in_zip(zip.as_deref()).await?)
        }
        Commands::StationsInZip { zip } => {
            print_json(&service.police_stations_in_zip(zip.as_deref()).await?)
        }
        Commands::AveragePrice { zip: Some(zip) } => {
            print_json(&service.average_house_price_for_zip(Some(&zip)).await?)
        }
        Commands::AveragePrice { zip: None } => {
            print_json(&service.average_house_price_per_zip().await?)
        }
        Commands::PopulatedZipPrices => {
            print_json(&service.average_price_for_populated_zips().await?)
        }
        Commands::Nearby { address, radius_km } => print_json(
            &service
                .crimes_near_address(address.as_deref(), radius_km)
                .await?,
        ),
        Commands::Serve => serve(service).await,
    }
}

/// One line of `serve` output.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheVersion {
    version: u64,
    refreshed_at: Option<String>,
    streets: usize,
}

fn print_cache_version(service: &InsightsService) -> Result<u64, Box<dyn std::error::Error>> {
    let snapshot = service.cache().snapshot();
    let line = CacheVersion {
        version: snapshot.version(),
        refreshed_at: snapshot.refreshed_at().map(|t| t.to_rfc3339()),
        streets: snapshot.rows().len(),
    };
    println!("{}", serde_json::to_string(&line)?);
    Ok(line.version)
}

async fn serve(service: &InsightsService) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();

    let Some(handle) = service.spawn_cache_refresh(cancel.clone()) else {
        log::warn!("cache_refresh_interval_secs is not set, refreshing once");
        service.refresh_cache().await?;
        print_cache_version(service)?;
        return Ok(());
    };

    let mut seen = 0;
    let mut poll = tokio::time::interval(std::time::Duration::from_millis(250));
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = poll.tick() => {
                if service.cache().version() != seen {
                    seen = print_cache_version(service)?;
                }
            }
        }
    }

    log::info!("Shutting down...");
    cancel.cancel();
    handle.await?;

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use phillow_geocoder::FixedGeocoder;
    use phillow_records_models::RecordSet;

    use super::*;

    #[tokio::test]
    async fn cache_version_line_tracks_refreshes() {
        let service = InsightsService::new(
            Arc::new(MemoryStore::new(RecordSet::default())),
            Arc::new(FixedGeocoder::new()),
            ServiceConfig::default(),
        );
        assert_eq!(print_cache_version(&service).unwrap(), 0);

        service.refresh_cache().await.unwrap();
        assert_eq!(print_cache_version(&service).unwrap(), 1);

        let line = serde_json::to_value(CacheVersion {
            version: 1,
            refreshed_at: None,
            streets: 0,
        })
        .unwrap();
        assert_eq!(
            line,
            serde_json::json!({ "version": 1, "refreshedAt": null, "streets": 0 })
        );
    }
}
