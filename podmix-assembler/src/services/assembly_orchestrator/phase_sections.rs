//! Level 2: sections

use super::{EpisodeAssembler, RunContext};
use crate::error::AssemblyResult;
use crate::models::{AudioAsset, NormalizationLevel};
use crate::services::temp_assets::AssetPurpose;

impl EpisodeAssembler {
    /// CONCATENATING_SECTIONS: join each section's normalized chunks, in order
    ///
    /// Normalized chunks are released once their section exists.
    pub(super) async fn phase_concatenating_sections(
        &self,
        ctx: &mut RunContext<'_>,
        chunks: Vec<AudioAsset>,
    ) -> AssemblyResult<Vec<AudioAsset>> {
        let mut sections = Vec::with_capacity(ctx.sections.len());

        for (index, range) in ctx.sections.iter().enumerate() {
            let output = ctx
                .scratch
                .allocate(AssetPurpose::Section, &self.config.output_extension);
            let section = self
                .concatenator
                .concatenate(&chunks[range.clone()], &output, &ctx.scratch, ctx.cancel)
                .await?;

            tracing::debug!(
                run_id = %ctx.run.run_id,
                section = index,
                chunks = range.len(),
                duration = section.duration_seconds,
                "Section concatenated"
            );
            sections.push(section);
        }

        for chunk in &chunks {
            ctx.scratch.discard(&chunk.path).await;
        }

        Ok(sections)
    }

    /// NORMALIZING_SECTIONS: correct each section to the section target
    pub(super) async fn phase_normalizing_sections(
        &self,
        ctx: &mut RunContext<'_>,
        sections: Vec<AudioAsset>,
    ) -> AssemblyResult<Vec<AudioAsset>> {
        let target = self.config.target(NormalizationLevel::Section);
        let mut normalized = Vec::with_capacity(sections.len());
        let mut skipped = 0;

        for (index, section) in sections.iter().enumerate() {
            let output = ctx
                .scratch
                .allocate(AssetPurpose::NormalizedSection, &self.config.output_extension);
            let outcome = self
                .normalizer
                .normalize(section, &target, &output, ctx.cancel)
                .await?;

            if outcome.skipped {
                skipped += 1;
            }
            tracing::info!(
                run_id = %ctx.run.run_id,
                section = index,
                lufs = outcome.measured.integrated_lufs,
                target = target.lufs,
                skipped = outcome.skipped,
                "Section normalized"
            );

            ctx.scratch.discard(&section.path).await;
            normalized.push(outcome.asset);
        }

        ctx.run.statistics.sections_total = sections.len();
        ctx.run.statistics.sections_skipped = skipped;

        Ok(normalized)
    }
}
