//! JSON report adapter implementing ReportPort, plus an equity-curve CSV writer.

use std::fs;
use std::path::Path;

use crate::domain::error::DcabotError;
use crate::domain::optimizer::SearchResult;
use crate::domain::simulation::{EquityPoint, SimulationResult};
use crate::ports::report_port::ReportPort;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        JsonReportAdapter
    }

    fn write_json<T: serde::Serialize>(value: &T, output_path: &str) -> Result<(), DcabotError> {
        let json = serde_json::to_string_pretty(value)?;
        write_file(Path::new(output_path), json.as_bytes())
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), DcabotError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(DcabotError::Io)?;
    }
    fs::write(path, contents).map_err(DcabotError::Io)?;
    Ok(())
}

/// `timestamp,equity` rows, RFC 3339 timestamps.
pub fn write_equity_csv(curve: &[EquityPoint], output_path: &str) -> Result<(), DcabotError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    let to_io = |e: csv::Error| DcabotError::Io(std::io::Error::other(e));
    wtr.write_record(["timestamp", "equity"]).map_err(to_io)?;
    for point in curve {
        wtr.write_record([point.timestamp.to_rfc3339(), format!("{:.8}", point.equity)])
            .map_err(to_io)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| DcabotError::Io(std::io::Error::other(e.to_string())))?;
    write_file(Path::new(output_path), &bytes)
}

impl ReportPort for JsonReportAdapter {
    fn write_simulation(
        &self,
        result: &SimulationResult,
        output_path: &str,
    ) -> Result<(), DcabotError> {
        Self::write_json(result, output_path)
    }

    fn write_search(&self, result: &SearchResult, output_path: &str) -> Result<(), DcabotError> {
        Self::write_json(result, output_path)
    }
}
