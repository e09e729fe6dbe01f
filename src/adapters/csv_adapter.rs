//! CSV instrument list adapter.
//!
//! Reads a `code,name,market` file with a header row. Used to seed the
//! universe without upstream access.

use crate::domain::error::SyncError;
use crate::domain::instrument::Instrument;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Deserialize)]
struct InstrumentRow {
    code: String,
    #[serde(default)]
    name: String,
    market: String,
}

pub struct CsvInstrumentAdapter {
    path: PathBuf,
}

impl CsvInstrumentAdapter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<Vec<Instrument>, SyncError> {
        let file = std::fs::File::open(&self.path)?;
        read_instruments(file)
    }
}

/// Parse instrument rows. Blank codes are skipped; a repeated code keeps its first row.
pub fn read_instruments<R: Read>(reader: R) -> Result<Vec<Instrument>, SyncError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut seen = HashSet::new();
    let mut instruments = Vec::new();

    for (line, result) in rdr.deserialize::<InstrumentRow>().enumerate() {
        let row = result.map_err(std::io::Error::from)?;
        if row.code.is_empty() {
            warn!(line = line + 2, "skipping row without code");
            continue;
        }
        if !seen.insert(row.code.clone()) {
            warn!(code = %row.code, "duplicate code in instrument file");
            continue;
        }
        instruments.push(Instrument::new(row.code, row.name, row.market));
    }

    Ok(instruments)
}
