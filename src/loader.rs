//! Adapters for the cleaned input tables and the report output
//!
//! The tables are expected to be cleaned already: snake_case headers
//! matching the record fields, numeric volumes and quotes, ISO dates.
//! Nothing is re-cleaned here; a malformed row is an error.

use crate::error::Result;
use crate::model::{Position, PriceObservation};
use crate::VarReport;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

fn read_rows<T, R>(reader: R) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Parse the positions table from CSV
pub fn read_positions<R: Read>(reader: R) -> Result<Vec<Position>> {
    read_rows(reader)
}

/// Parse the prices table from CSV
pub fn read_prices<R: Read>(reader: R) -> Result<Vec<PriceObservation>> {
    read_rows(reader)
}

/// Load the positions table from a CSV file
pub fn load_positions(path: &Path) -> Result<Vec<Position>> {
    let positions = read_positions(std::fs::File::open(path)?)?;
    info!("Loaded {} positions from {:?}", positions.len(), path);
    Ok(positions)
}

/// Load the prices table from a CSV file
pub fn load_prices(path: &Path) -> Result<Vec<PriceObservation>> {
    let prices = read_prices(std::fs::File::open(path)?)?;
    info!("Loaded {} prices from {:?}", prices.len(), path);
    Ok(prices)
}

/// Write a report as pretty-printed JSON
pub fn write_report_json<W: Write>(report: &VarReport, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report).map_err(std::io::Error::from)?;
    writeln!(writer)?;
    Ok(())
}
