//! Loudness measurement (analysis pass only)

use crate::error::{AssemblyError, AssemblyResult};
use crate::models::{AudioAsset, LoudnessMeasurement, NormalizationTarget};
use crate::tool::AudioTool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Measures integrated loudness, true peak and loudness range
#[derive(Clone)]
pub struct LoudnessMeasurer {
    tool: Arc<dyn AudioTool>,
}

impl LoudnessMeasurer {
    pub fn new(tool: Arc<dyn AudioTool>) -> Self {
        Self { tool }
    }

    /// Measure `asset`
    ///
    /// `target` only parameterizes the analysis filter; the reported input
    /// values do not depend on it. Failures are not retried.
    pub async fn measure(
        &self,
        asset: &AudioAsset,
        target: &NormalizationTarget,
        cancel: &CancellationToken,
    ) -> AssemblyResult<LoudnessMeasurement> {
        let measurement = self
            .tool
            .measure_loudness(&asset.path, target, cancel)
            .await
            .map_err(|e| AssemblyError::measurement(&asset.id, e))?;

        debug!(
            asset = %asset.id,
            lufs = measurement.integrated_lufs,
            true_peak = measurement.true_peak_db,
            lra = measurement.loudness_range_lu,
            "Loudness measured"
        );

        Ok(measurement)
    }
}
