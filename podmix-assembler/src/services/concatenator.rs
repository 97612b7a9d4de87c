//! Order-preserving concatenation

use crate::error::{AssemblyError, AssemblyResult};
use crate::models::{id_from_path, AudioAsset};
use crate::services::temp_assets::{AssetPurpose, TemporaryAssetManager};
use crate::tool::AudioTool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Joins compatible assets by stream copy
#[derive(Clone)]
pub struct Concatenator {
    tool: Arc<dyn AudioTool>,
}

impl Concatenator {
    pub fn new(tool: Arc<dyn AudioTool>) -> Self {
        Self { tool }
    }

    /// Join `assets` in the given order into `output`
    ///
    /// A single asset is copied through. Every asset must match the first
    /// one's codec, sample rate and channel count.
    pub async fn concatenate(
        &self,
        assets: &[AudioAsset],
        output: &Path,
        scratch: &TemporaryAssetManager,
        cancel: &CancellationToken,
    ) -> AssemblyResult<AudioAsset> {
        let output_id = id_from_path(output);
        let first = assets.first().ok_or_else(|| AssemblyError::Concatenation {
            asset: output_id.clone(),
            reason: "nothing to concatenate".to_string(),
        })?;

        if assets.len() == 1 {
            tokio::fs::copy(&first.path, output)
                .await
                .map_err(|e| AssemblyError::Concatenation {
                    asset: first.id.clone(),
                    reason: format!("copy to {}: {}", output.display(), e),
                })?;
            return Ok(first.relocated(output));
        }

        for asset in &assets[1..] {
            if let Some(mismatch) = first.format.mismatch(&asset.format) {
                return Err(AssemblyError::Concatenation {
                    asset: asset.id.clone(),
                    reason: format!("incompatible with {}: {}", first.id, mismatch),
                });
            }
        }

        let inputs: Vec<PathBuf> = assets.iter().map(|a| a.path.clone()).collect();
        let list_path = scratch.allocate(AssetPurpose::ConcatList, "txt");

        debug!(
            output = %output_id,
            inputs = inputs.len(),
            "Concatenating"
        );

        let joined = self.tool.concat(&inputs, &list_path, output, cancel).await;
        // The list is only needed for the one invocation
        scratch.discard(&list_path).await;
        joined.map_err(|e| AssemblyError::concatenation(&output_id, e))?;

        let info = self
            .tool
            .probe(output, cancel)
            .await
            .map_err(|e| AssemblyError::concatenation(&output_id, e))?;

        Ok(AudioAsset::new(
            output_id,
            output,
            info.duration_seconds,
            info.format,
        ))
    }
}
