//! Report generation port trait.

use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::BarsimError;
use crate::domain::metrics::Metrics;
use crate::domain::strategy::Strategy;

/// Port for writing backtest reports into an output directory.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        strategy: &Strategy,
        output_dir: &Path,
    ) -> Result<(), BarsimError>;
}
