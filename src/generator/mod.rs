// Synthetic benchmark data
pub mod census;
pub mod ecommerce;

pub use census::{CensusGenerator, CensusRecord};
pub use ecommerce::{EcommerceGenerator, Product};

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::utils::error::BenchResult;

/// Write records as a header-bearing CSV file
pub fn write_csv<T: Serialize>(path: &Path, records: &[T]) -> BenchResult<()> {
    let mut writer = csv::Writer::from_path(path).map_err(std::io::Error::from)?;
    for record in records {
        writer.serialize(record).map_err(std::io::Error::from)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write items as one JSON array
pub fn write_json_array<T: Serialize>(path: &Path, items: &[T]) -> BenchResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, items).map_err(std::io::Error::from)?;
    writer.flush()?;
    Ok(())
}

/// Write items as newline-delimited JSON
pub fn write_json_lines<T: Serialize>(path: &Path, items: &[T]) -> BenchResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut writer, item).map_err(std::io::Error::from)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
