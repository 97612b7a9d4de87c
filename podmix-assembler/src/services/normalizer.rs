//! Loudness normalization
//!
//! Two-pass correction: measure, then re-encode with the measured values fed
//! back into the filter. Inputs already within tolerance of the target are
//! copied through untouched.

use crate::config::AssemblyConfig;
use crate::error::{AssemblyError, AssemblyResult};
use crate::models::{
    id_from_path, AudioAsset, AudioFormat, LoudnessMeasurement, NormalizationTarget,
};
use crate::services::LoudnessMeasurer;
use crate::tool::{AudioTool, OutputEncoding};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Result of one normalization
#[derive(Debug, Clone)]
pub struct NormalizationOutcome {
    /// Asset at the requested output path
    pub asset: AudioAsset,
    /// True when the input was copied through without re-encoding
    pub skipped: bool,
    /// Loudness of the input before correction
    pub measured: LoudnessMeasurement,
}

/// Normalizes assets to a loudness target
#[derive(Clone)]
pub struct Normalizer {
    tool: Arc<dyn AudioTool>,
    measurer: LoudnessMeasurer,
    config: Arc<AssemblyConfig>,
}

impl Normalizer {
    pub fn new(tool: Arc<dyn AudioTool>, config: Arc<AssemblyConfig>) -> Self {
        Self {
            measurer: LoudnessMeasurer::new(tool.clone()),
            tool,
            config,
        }
    }

    /// Measure and correct, skipping when already within tolerance
    pub async fn normalize(
        &self,
        asset: &AudioAsset,
        target: &NormalizationTarget,
        output: &Path,
        cancel: &CancellationToken,
    ) -> AssemblyResult<NormalizationOutcome> {
        let measured = self.measurer.measure(asset, target, cancel).await?;
        self.apply(asset, &measured, target, output, cancel).await
    }

    /// Measure and always correct
    pub async fn normalize_forced(
        &self,
        asset: &AudioAsset,
        target: &NormalizationTarget,
        output: &Path,
        cancel: &CancellationToken,
    ) -> AssemblyResult<NormalizationOutcome> {
        let measured = self.measurer.measure(asset, target, cancel).await?;
        self.apply_forced(asset, &measured, target, output, cancel)
            .await
    }

    /// Correction step for an asset measured earlier
    pub async fn apply(
        &self,
        asset: &AudioAsset,
        measured: &LoudnessMeasurement,
        target: &NormalizationTarget,
        output: &Path,
        cancel: &CancellationToken,
    ) -> AssemblyResult<NormalizationOutcome> {
        let in_tolerance = target.is_satisfied_by(measured, self.config.skip_tolerance_lu);
        let same_codec = asset.format.codec == self.config.output_codec_name();
        if in_tolerance && !same_codec {
            debug!(
                asset = %asset.id,
                level = %target.level,
                codec = %asset.format.codec,
                output_codec = %self.config.output_codec,
                "Within tolerance but in another codec, re-encoding"
            );
        }

        if in_tolerance && same_codec {
            info!(
                asset = %asset.id,
                level = %target.level,
                lufs = measured.integrated_lufs,
                target = target.lufs,
                "Within tolerance, skipping normalization"
            );

            tokio::fs::copy(&asset.path, output)
                .await
                .map_err(|e| AssemblyError::Normalization {
                    asset: asset.id.clone(),
                    reason: format!("copy to {}: {}", output.display(), e),
                })?;

            return Ok(NormalizationOutcome {
                asset: asset.relocated(output).with_loudness(*measured),
                skipped: true,
                measured: *measured,
            });
        }

        self.apply_forced(asset, measured, target, output, cancel)
            .await
    }

    /// Correction step, never skipped
    pub async fn apply_forced(
        &self,
        asset: &AudioAsset,
        measured: &LoudnessMeasurement,
        target: &NormalizationTarget,
        output: &Path,
        cancel: &CancellationToken,
    ) -> AssemblyResult<NormalizationOutcome> {
        let encoding = self.config.encoding_for(&asset.format);
        self.correct(asset, measured, target, output, &encoding, cancel)
            .await
    }

    /// Measure and correct, re-encoding to `format` even when within tolerance
    pub async fn conform(
        &self,
        asset: &AudioAsset,
        target: &NormalizationTarget,
        output: &Path,
        format: &AudioFormat,
        cancel: &CancellationToken,
    ) -> AssemblyResult<NormalizationOutcome> {
        let measured = self.measurer.measure(asset, target, cancel).await?;
        let encoding = self.config.encoding_for(format);
        self.correct(asset, &measured, target, output, &encoding, cancel)
            .await
    }

    /// Single-pass correction without a prior measurement
    ///
    /// Less accurate than the two-pass path; the result is not measured.
    pub async fn quick_normalize(
        &self,
        asset: &AudioAsset,
        target: &NormalizationTarget,
        output: &Path,
        cancel: &CancellationToken,
    ) -> AssemblyResult<AudioAsset> {
        let encoding = self.config.encoding_for(&asset.format);
        self.tool
            .normalize_single_pass(&asset.path, output, target, &encoding, cancel)
            .await
            .map_err(|e| AssemblyError::normalization(&asset.id, e))?;

        self.describe_output(asset, output, cancel).await
    }

    async fn correct(
        &self,
        asset: &AudioAsset,
        measured: &LoudnessMeasurement,
        target: &NormalizationTarget,
        output: &Path,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> AssemblyResult<NormalizationOutcome> {
        debug!(
            asset = %asset.id,
            level = %target.level,
            lufs = measured.integrated_lufs,
            target = target.lufs,
            "Applying loudness correction"
        );

        self.tool
            .normalize_two_pass(&asset.path, output, target, measured, encoding, cancel)
            .await
            .map_err(|e| AssemblyError::normalization(&asset.id, e))?;

        Ok(NormalizationOutcome {
            asset: self.describe_output(asset, output, cancel).await?,
            skipped: false,
            measured: *measured,
        })
    }

    /// Probe a freshly encoded output so its duration is the encoded one
    async fn describe_output(
        &self,
        source: &AudioAsset,
        output: &Path,
        cancel: &CancellationToken,
    ) -> AssemblyResult<AudioAsset> {
        let info = self
            .tool
            .probe(output, cancel)
            .await
            .map_err(|e| AssemblyError::normalization(&source.id, e))?;

        Ok(AudioAsset::new(
            id_from_path(output),
            output,
            info.duration_seconds,
            info.format,
        ))
    }
}
