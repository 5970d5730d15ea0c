//! Loads a directory of CSV table exports into a [`RecordSet`].
//!
//! The directory must contain one file per [`Table`], named after the
//! table (`properties.csv`, `crime_data.csv`, `police_stations.csv`,
//! `zipcode_population.csv`) with a header row of column names. Empty
//! cells load as missing values.

use std::io::Read;
use std::path::Path;

use phillow_records_models::{RecordSet, Table};
use serde::de::DeserializeOwned;

use crate::RecordStoreError;

/// Reads every row of one CSV table.
///
/// # Errors
///
/// Returns [`RecordStoreError::Csv`] if a row fails to parse; the error
/// carries the row position.
pub fn read_table<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>, RecordStoreError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    Ok(rows)
}

fn load_table<T: DeserializeOwned>(dir: &Path, table: Table) -> Result<Vec<T>, RecordStoreError> {
    let path = dir.join(table.csv_file_name());
    let file = std::fs::File::open(&path)
        .inspect_err(|e| log::error!("Failed to open {}: {e}", path.display()))?;
    let rows: Vec<T> = read_table(file)?;
    log::info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Loads all four tables from `dir`.
///
/// # Errors
///
/// Returns [`RecordStoreError`] if any file is missing or malformed.
pub fn load_dir(dir: &Path) -> Result<RecordSet, RecordStoreError> {
    Ok(RecordSet {
        properties: load_table(dir, Table::Properties)?,
        crime_incidents: load_table(dir, Table::CrimeData)?,
        police_stations: load_table(dir, Table::PoliceStations)?,
        zip_populations: load_table(dir, Table::ZipcodePopulation)?,
    })
}
