//! CSV loading into untyped [`RawTable`]s.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::schema::RawTable;

/// Loads a CSV file with a header row.
///
/// # Errors
///
/// `Io` if the file cannot be opened, `Csv` if it is malformed.
pub fn load_csv(path: &Path) -> Result<RawTable> {
    let file = File::open(path).map_err(|e| {
        AnalysisError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot open \"{}\": {e}", path.display()),
        ))
    })?;
    let table = read_csv(file)?;
    debug!(path = %path.display(), rows = table.len(), "loaded CSV table");
    Ok(table)
}

/// Reads CSV from any reader. Cells are trimmed; rows may vary in width,
/// which the validator reports against the mapped table.
///
/// # Errors
///
/// `Csv` if the input is not valid CSV.
pub fn read_csv(reader: impl Read) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut table = RawTable::with_headers(&headers);
    for record in rdr.records() {
        let record = record?;
        table.push_row(record.iter().map(str::to_string).collect());
    }
    Ok(table)
}
