//! Record store over the Postgres reference tables.
//!
//! Uses raw SQL via `query_raw_params()`; column casts are done in SQL so
//! every row decodes into a fixed set of primitive types regardless of how
//! the bulk ingest typed the columns.

use async_trait::async_trait;
use moosicbox_json_utils::database::ToValue as _;
use phillow_records_models::{
    BoundingBox, CrimeIncident, PoliceStation, Property, Table, ZipPopulation,
};
use switchy_database::{Database, DatabaseValue, Row};

use crate::{RecordStore, RecordStoreError};

const PROPERTY_COLUMNS: &str = "location,
    zip_code::text AS zip_code,
    market_value::float8 AS market_value,
    sale_price::float8 AS sale_price,
    sale_date::timestamp AS sale_date,
    category_code_description,
    number_of_bathrooms::float8 AS number_of_bathrooms,
    number_of_bedrooms::float8 AS number_of_bedrooms,
    total_livable_area::float8 AS total_livable_area,
    total_area::float8 AS total_area,
    year_built::int4 AS year_built,
    number_stories::float8 AS number_stories";

const CRIME_COLUMNS: &str = "object_id::text AS object_id,
    zip_code::text AS zip_code,
    location_block,
    text_general_code,
    dispatch_date::timestamp AS dispatch_date,
    dispatch_time::text AS dispatch_time,
    lat::float8 AS lat,
    lng::float8 AS lng";

const STATION_COLUMNS: &str = "object_id::text AS object_id,
    location,
    zip_code::text AS zip_code,
    lat::float8 AS lat,
    lng::float8 AS lng";

fn conversion(column: &str, e: impl std::fmt::Display) -> RecordStoreError {
    RecordStoreError::Conversion {
        message: format!("Failed to read column '{column}': {e}"),
    }
}

fn property_from_row(row: &Row) -> Result<Property, RecordStoreError> {
    let sale_date: Option<chrono::NaiveDateTime> = row.to_value("sale_date").unwrap_or(None);

    Ok(Property {
        address: row
            .to_value("location")
            .map_err(|e| conversion("location", e))?,
        zip_code: row
            .to_value("zip_code")
            .map_err(|e| conversion("zip_code", e))?,
        market_value: row.to_value("market_value").unwrap_or(0.0),
        sale_price: row.to_value("sale_price").unwrap_or(None),
        sale_date: sale_date.map(|dt| dt.date()),
        category: row.to_value("category_code_description").unwrap_or(None),
        bathrooms: row.to_value("number_of_bathrooms").unwrap_or(None),
        bedrooms: row.to_value("number_of_bedrooms").unwrap_or(None),
        livable_area: row.to_value("total_livable_area").unwrap_or(None),
        total_area: row.to_value("total_area").unwrap_or(None),
        year_built: row.to_value("year_built").unwrap_or(None),
        stories: row.to_value("number_stories").unwrap_or(None),
    })
}

fn crime_from_row(row: &Row) -> Result<CrimeIncident, RecordStoreError> {
    let dispatch_date: chrono::NaiveDateTime = row
        .to_value("dispatch_date")
        .map_err(|e| conversion("dispatch_date", e))?;
    let dispatch_time: Option<String> = row.to_value("dispatch_time").unwrap_or(None);

    Ok(CrimeIncident {
        object_id: row
            .to_value("object_id")
            .map_err(|e| conversion("object_id", e))?,
        zip_code: row
            .to_value("zip_code")
            .map_err(|e| conversion("zip_code", e))?,
        location_block: row.to_value("location_block").unwrap_or_default(),
        crime_type: row.to_value("text_general_code").unwrap_or_default(),
        dispatch_date: dispatch_date.date(),
        dispatch_time: dispatch_time
            .as_deref()
            .and_then(|t| chrono::NaiveTime::parse_from_str(t, "%H:%M:%S").ok()),
        lat: row.to_value("lat").unwrap_or(None),
        lng: row.to_value("lng").unwrap_or(None),
    })
}

fn station_from_row(row: &Row) -> Result<PoliceStation, RecordStoreError> {
    Ok(PoliceStation {
        object_id: row
            .to_value("object_id")
            .map_err(|e| conversion("object_id", e))?,
        location: row.to_value("location").unwrap_or_default(),
        zip_code: row
            .to_value("zip_code")
            .map_err(|e| conversion("zip_code", e))?,
        lat: row.to_value("lat").map_err(|e| conversion("lat", e))?,
        lng: row.to_value("lng").map_err(|e| conversion("lng", e))?,
    })
}

fn population_from_row(row: &Row) -> Result<ZipPopulation, RecordStoreError> {
    let population: i64 = row
        .to_value("population")
        .map_err(|e| conversion("population", e))?;

    Ok(ZipPopulation {
        zip_code: row
            .to_value("zip_code")
            .map_err(|e| conversion("zip_code", e))?,
        population: u64::try_from(population).map_err(|e| conversion("population", e))?,
    })
}

fn bounds_params(bounds: BoundingBox) -> [DatabaseValue; 4] {
    [
        DatabaseValue::Real64(bounds.min_lat),
        DatabaseValue::Real64(bounds.max_lat),
        DatabaseValue::Real64(bounds.min_lng),
        DatabaseValue::Real64(bounds.max_lng),
    ]
}

/// Record store reading the reference tables from Postgres.
pub struct PostgresStore {
    db: Box<dyn Database>,
}

impl PostgresStore {
    #[must_use]
    pub fn new(db: Box<dyn Database>) -> Self {
        Self { db }
    }

    async fn select<T>(
        &self,
        sql: &str,
        params: &[DatabaseValue],
        convert: fn(&Row) -> Result<T, RecordStoreError>,
    ) -> Result<Vec<T>, RecordStoreError> {
        let rows = self.db.query_raw_params(sql, params).await?;
        rows.iter().map(convert).collect()
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn properties(&self) -> Result<Vec<Property>, RecordStoreError> {
        let sql = format!(
            "SELECT {PROPERTY_COLUMNS} FROM {}",
            Table::Properties.as_ref()
        );
        self.select(&sql, &[], property_from_row).await
    }

    async fn crime_incidents(&self) -> Result<Vec<CrimeIncident>, RecordStoreError> {
        let sql = format!("SELECT {CRIME_COLUMNS} FROM {}", Table::CrimeData.as_ref());
        self.select(&sql, &[], crime_from_row).await
    }

    async fn police_stations(&self) -> Result<Vec<PoliceStation>, RecordStoreError> {
        let sql = format!(
            "SELECT {STATION_COLUMNS} FROM {}",
            Table::PoliceStations.as_ref()
        );
        self.select(&sql, &[], station_from_row).await
    }

    async fn zip_populations(&self) -> Result<Vec<ZipPopulation>, RecordStoreError> {
        let sql = format!(
            "SELECT zip_code::text AS zip_code, population::int8 AS population FROM {}",
            Table::ZipcodePopulation.as_ref()
        );
        self.select(&sql, &[], population_from_row).await
    }

    async fn crime_incidents_within(
        &self,
        bounds: BoundingBox,
    ) -> Result<Vec<CrimeIncident>, RecordStoreError> {
        let sql = format!(
            "SELECT {CRIME_COLUMNS} FROM {}
             WHERE lat BETWEEN $1 AND $2 AND lng BETWEEN $3 AND $4",
            Table::CrimeData.as_ref()
        );
        self.select(&sql, &bounds_params(bounds), crime_from_row)
            .await
    }

    async fn police_stations_within(
        &self,
        bounds: BoundingBox,
    ) -> Result<Vec<PoliceStation>, RecordStoreError> {
        let sql = format!(
            "SELECT {STATION_COLUMNS} FROM {}
             WHERE lat BETWEEN $1 AND $2 AND lng BETWEEN $3 AND $4",
            Table::PoliceStations.as_ref()
        );
        self.select(&sql, &bounds_params(bounds), station_from_row)
            .await
    }
}
