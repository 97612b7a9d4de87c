//! Level 1: chunks
//!
//! Every chunk is measured, then corrected to the chunk target, with up to
//! `max_concurrency` tool invocations in flight. Workers finish in any order;
//! results are put back in chunk order before anything downstream sees them.

use super::{EpisodeAssembler, RunContext};
use crate::error::AssemblyResult;
use crate::models::{AssemblyState, AudioAsset, LoudnessMeasurement, NormalizationLevel};
use crate::services::temp_assets::AssetPurpose;
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use podmix_common::events::AssemblyEvent;
use std::sync::atomic::{AtomicUsize, Ordering};

impl EpisodeAssembler {
    /// MEASURING_CHUNKS: loudness of every raw chunk, in chunk order
    pub(super) async fn phase_measuring_chunks(
        &self,
        ctx: &mut RunContext<'_>,
    ) -> AssemblyResult<Vec<LoudnessMeasurement>> {
        let run_id = ctx.run.run_id;
        let chunks = &ctx.request.chunks;
        let total = chunks.len();
        let target = self.config.target(NormalizationLevel::Chunk);
        let completed = AtomicUsize::new(0);
        let cancel = ctx.cancel;

        tracing::info!(
            run_id = %run_id,
            chunks = total,
            workers = self.config.max_concurrency,
            "Measuring chunks"
        );

        let mut measured: Vec<(usize, LoudnessMeasurement)> = stream::iter(chunks.iter().enumerate())
            .map(|(index, chunk)| {
                let completed = &completed;
                let target = &target;
                async move {
                    let measurement = self.measurer.measure(chunk, target, cancel).await?;
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    self.report_chunk_progress(run_id, AssemblyState::MeasuringChunks, done, total);
                    Ok::<_, crate::error::AssemblyError>((index, measurement))
                }
            })
            .buffer_unordered(self.config.max_concurrency)
            .try_collect()
            .await?;

        measured.sort_by_key(|(index, _)| *index);
        Ok(measured.into_iter().map(|(_, m)| m).collect())
    }

    /// NORMALIZING_CHUNKS: correct every chunk to the chunk target, in chunk order
    pub(super) async fn phase_normalizing_chunks(
        &self,
        ctx: &mut RunContext<'_>,
        measurements: Vec<LoudnessMeasurement>,
    ) -> AssemblyResult<Vec<AudioAsset>> {
        let run_id = ctx.run.run_id;
        let chunks = &ctx.request.chunks;
        let total = chunks.len();
        let target = self.config.target(NormalizationLevel::Chunk);
        let completed = AtomicUsize::new(0);
        let cancel = ctx.cancel;

        // Outputs are allocated up front so each worker owns a distinct path
        let outputs: Vec<_> = (0..total)
            .map(|_| {
                ctx.scratch
                    .allocate(AssetPurpose::NormalizedChunk, &self.config.output_extension)
            })
            .collect();

        let mut normalized: Vec<(usize, AudioAsset, bool)> =
            stream::iter(chunks.iter().zip(measurements.iter()).zip(outputs.iter()).enumerate())
                .map(|(index, ((chunk, measured), output))| {
                    let completed = &completed;
                    let target = &target;
                    async move {
                        let outcome = self
                            .normalizer
                            .apply(chunk, measured, target, output, cancel)
                            .await?;
                        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                        self.report_chunk_progress(
                            run_id,
                            AssemblyState::NormalizingChunks,
                            done,
                            total,
                        );
                        tracing::debug!(
                            run_id = %run_id,
                            chunk = index,
                            asset = %chunk.id,
                            skipped = outcome.skipped,
                            "Chunk normalized"
                        );
                        Ok::<_, crate::error::AssemblyError>((index, outcome.asset, outcome.skipped))
                    }
                })
                .buffer_unordered(self.config.max_concurrency)
                .try_collect()
                .await?;

        normalized.sort_by_key(|(index, _, _)| *index);

        let skipped = normalized.iter().filter(|(_, _, skipped)| *skipped).count();
        ctx.run.statistics.chunks_total = total;
        ctx.run.statistics.chunks_skipped = skipped;

        tracing::info!(
            run_id = %run_id,
            chunks = total,
            skipped,
            "Chunks normalized"
        );

        Ok(normalized.into_iter().map(|(_, asset, _)| asset).collect())
    }

    fn report_chunk_progress(
        &self,
        run_id: uuid::Uuid,
        state: AssemblyState,
        completed: usize,
        total: usize,
    ) {
        self.event_bus.emit_lossy(AssemblyEvent::ChunkProgress {
            run_id,
            state,
            completed,
            total,
            timestamp: Utc::now(),
        });
    }
}
