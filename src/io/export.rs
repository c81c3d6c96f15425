//! CSV export of per-iteration Monte Carlo results.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::aep::{IterationRecord, MonteCarloAepResultSet};

/// Column header of the per-iteration export.
const HEADER: &str = "iteration,seed,source,regression_form,status,aep_mwh,\
                      availability_loss_fraction,curtailment_loss_fraction,\
                      r_squared,observations,error";

/// Exports per-iteration results to a CSV file at the given path.
///
/// Writes a header row followed by one row per iteration in index order,
/// including failed and cancelled iterations. Produces deterministic output
/// for identical inputs.
///
/// # Arguments
///
/// * `results` - Result set of a Monte Carlo run
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(results: &MonteCarloAepResultSet, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(results.records(), buf)
}

/// Writes per-iteration records as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(records: &[IterationRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in records {
        let metrics = match r.result() {
            Some(res) => [
                format!("{:.3}", res.aep_mwh),
                format!("{:.6}", res.availability_loss_fraction),
                format!("{:.6}", res.curtailment_loss_fraction),
                format!("{:.6}", res.r_squared),
                res.observations.to_string(),
            ],
            None => Default::default(),
        };
        let [aep, availability, curtailment, r_squared, observations] = metrics;
        wtr.write_record(&[
            r.index.to_string(),
            r.seed.to_string(),
            r.source.clone().unwrap_or_default(),
            r.regression_form
                .map(|f| f.as_str().to_string())
                .unwrap_or_default(),
            r.outcome.status().to_string(),
            aep,
            availability,
            curtailment,
            r_squared,
            observations,
            r.error()
                .map(|e| format!("{}: {e}", e.kind()))
                .unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
