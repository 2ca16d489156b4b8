//! Result writer port.

use crate::domain::error::DcabotError;
use crate::domain::optimizer::SearchResult;
use crate::domain::simulation::SimulationResult;

pub trait ReportPort {
    fn write_simulation(
        &self,
        result: &SimulationResult,
        output_path: &str,
    ) -> Result<(), DcabotError>;

    fn write_search(&self, result: &SearchResult, output_path: &str) -> Result<(), DcabotError>;
}
