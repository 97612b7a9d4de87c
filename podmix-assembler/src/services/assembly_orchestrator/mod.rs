//! Episode assembly orchestrator
//!
//! Drives one run through every state:
//!
//! IDLE → MEASURING_CHUNKS → NORMALIZING_CHUNKS → CONCATENATING_SECTIONS →
//! NORMALIZING_SECTIONS → ASSEMBLING_EPISODE → NORMALIZING_EPISODE → DONE
//!
//! Each state is handled by a `phase_*` method in its own module:
//!
//! - **phase_chunks**: level 1, per-chunk measure + correct under bounded concurrency
//! - **phase_sections**: section concatenation and level 2 correction
//! - **phase_episode**: music, layout, timing map, level 3 correction, delivery
//!
//! Any hard error moves the run to FAILED. Scratch cleanup runs on every exit
//! path before the result is returned, and only DONE surfaces an episode.

use crate::config::AssemblyConfig;
use crate::error::{AssemblyError, AssemblyResult};
use crate::models::{AssembledEpisode, AssemblyRun, AssemblyState, EpisodeRequest};
use crate::services::section_planner::plan_sections;
use crate::services::temp_assets::{ReleaseReport, TemporaryAssetManager};
use crate::services::{Concatenator, LoudnessMeasurer, MusicPreparer, MusicStore, Normalizer};
use crate::tool::AudioTool;
use chrono::Utc;
use podmix_common::events::{AssemblyEvent, EventBus};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

mod phase_chunks;
mod phase_episode;
mod phase_sections;

/// State carried through the phases of one run
struct RunContext<'a> {
    run: AssemblyRun,
    scratch: TemporaryAssetManager,
    request: &'a EpisodeRequest,
    sections: Vec<Range<usize>>,
    output: &'a Path,
    cancel: &'a CancellationToken,
}

/// Builds finished episodes from rendered speech chunks and optional music
pub struct EpisodeAssembler {
    tool: Arc<dyn AudioTool>,
    config: Arc<AssemblyConfig>,
    measurer: LoudnessMeasurer,
    normalizer: Normalizer,
    concatenator: Concatenator,
    music: MusicPreparer,
    event_bus: EventBus,
    scratch_root: PathBuf,
}

impl EpisodeAssembler {
    pub fn new(
        tool: Arc<dyn AudioTool>,
        config: AssemblyConfig,
        music_store: Arc<dyn MusicStore>,
        scratch_root: impl Into<PathBuf>,
        event_bus: EventBus,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            measurer: LoudnessMeasurer::new(tool.clone()),
            normalizer: Normalizer::new(tool.clone(), config.clone()),
            concatenator: Concatenator::new(tool.clone()),
            music: MusicPreparer::new(tool.clone(), music_store, config.clone()),
            tool,
            config,
            event_bus,
            scratch_root: scratch_root.into(),
        }
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Assemble `request` into `output` under a fresh run id
    pub async fn assemble(
        &self,
        request: &EpisodeRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> AssemblyResult<AssembledEpisode> {
        self.assemble_with_run_id(Uuid::new_v4(), request, output, cancel)
            .await
    }

    /// Assemble with a caller-chosen run id
    ///
    /// Requests that fail validation are rejected before any scratch space is
    /// created. Every later failure is tagged with the state it occurred in.
    pub async fn assemble_with_run_id(
        &self,
        run_id: Uuid,
        request: &EpisodeRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> AssemblyResult<AssembledEpisode> {
        let sections = validate_request(request)?;

        let scratch = TemporaryAssetManager::create(&self.scratch_root, run_id).await?;
        if self.config.consume_chunk_inputs {
            for chunk in &request.chunks {
                scratch.adopt(&chunk.path);
            }
        }

        tracing::info!(
            run_id = %run_id,
            chunks = request.chunks.len(),
            sections = sections.len(),
            output = %output.display(),
            "Assembly run started"
        );
        self.event_bus.emit_lossy(AssemblyEvent::RunStarted {
            run_id,
            chunk_count: request.chunks.len(),
            section_count: sections.len(),
            timestamp: Utc::now(),
        });

        let mut ctx = RunContext {
            run: AssemblyRun::new(run_id),
            scratch,
            request,
            sections,
            output,
            cancel,
        };

        let result = match self.run_pipeline(&mut ctx).await {
            Ok(episode) => self
                .advance(&mut ctx, AssemblyState::Done)
                .map(|_| episode),
            Err(e) => Err(e),
        };

        match result {
            Ok(episode) => {
                self.cleanup(&ctx).await;

                tracing::info!(
                    run_id = %run_id,
                    duration_seconds = episode.duration_seconds,
                    file_size_bytes = episode.file_size_bytes,
                    music_segments = episode.music_segments_used,
                    skipped_normalizations = episode.skipped_normalizations,
                    elapsed_seconds = ctx.run.elapsed_seconds(),
                    "Assembly run completed"
                );
                self.event_bus.emit_lossy(AssemblyEvent::RunCompleted {
                    run_id,
                    duration_seconds: episode.duration_seconds,
                    file_size_bytes: episode.file_size_bytes,
                    music_segments_used: episode.music_segments_used,
                    timestamp: Utc::now(),
                });
                Ok(episode)
            }
            Err(error) => {
                let stage = ctx.run.state;
                self.fail(&mut ctx);
                self.cleanup(&ctx).await;

                if error.is_cancelled() {
                    tracing::warn!(run_id = %run_id, stage = %stage, "Assembly run cancelled");
                } else {
                    tracing::error!(run_id = %run_id, stage = %stage, error = %error, "Assembly run failed");
                }
                self.event_bus.emit_lossy(AssemblyEvent::RunFailed {
                    run_id,
                    stage,
                    error: error.to_string(),
                    timestamp: Utc::now(),
                });

                Err(AssemblyError::Stage {
                    run_id,
                    stage,
                    source: Box::new(error),
                })
            }
        }
    }

    async fn run_pipeline(&self, ctx: &mut RunContext<'_>) -> AssemblyResult<AssembledEpisode> {
        self.advance(ctx, AssemblyState::MeasuringChunks)?;
        let measurements = self.phase_measuring_chunks(ctx).await?;

        self.advance(ctx, AssemblyState::NormalizingChunks)?;
        let chunks = self.phase_normalizing_chunks(ctx, measurements).await?;

        self.advance(ctx, AssemblyState::ConcatenatingSections)?;
        let sections = self.phase_concatenating_sections(ctx, chunks).await?;

        self.advance(ctx, AssemblyState::NormalizingSections)?;
        let sections = self.phase_normalizing_sections(ctx, sections).await?;

        self.advance(ctx, AssemblyState::AssemblingEpisode)?;
        let layout = self.phase_assembling_episode(ctx, sections).await?;

        self.advance(ctx, AssemblyState::NormalizingEpisode)?;
        self.phase_normalizing_episode(ctx, layout).await
    }

    /// Move to `state`, refusing to start new work once cancelled
    fn advance(&self, ctx: &mut RunContext<'_>, state: AssemblyState) -> AssemblyResult<()> {
        if state != AssemblyState::Done && ctx.cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }

        let transition = ctx.run.transition_to(state).ok_or_else(|| {
            AssemblyError::InvalidRequest(format!(
                "illegal state transition {} -> {}",
                ctx.run.state, state
            ))
        })?;

        tracing::info!(
            run_id = %transition.run_id,
            old_state = %transition.old_state,
            new_state = %transition.new_state,
            "Assembly state changed"
        );
        self.event_bus.emit_lossy(AssemblyEvent::StateChanged {
            run_id: transition.run_id,
            old_state: transition.old_state,
            new_state: transition.new_state,
            timestamp: transition.transitioned_at,
        });
        Ok(())
    }

    fn fail(&self, ctx: &mut RunContext<'_>) {
        if let Some(transition) = ctx.run.transition_to(AssemblyState::Failed) {
            self.event_bus.emit_lossy(AssemblyEvent::StateChanged {
                run_id: transition.run_id,
                old_state: transition.old_state,
                new_state: transition.new_state,
                timestamp: transition.transitioned_at,
            });
        }
    }

    async fn cleanup(&self, ctx: &RunContext<'_>) -> ReleaseReport {
        let report = ctx.scratch.release_all().await;
        if report.failed > 0 {
            tracing::warn!(
                run_id = %ctx.run.run_id,
                removed = report.removed,
                failed = report.failed,
                "Scratch cleanup incomplete"
            );
        }
        self.event_bus.emit_lossy(AssemblyEvent::CleanupCompleted {
            run_id: ctx.run.run_id,
            removed: report.removed,
            failed: report.failed,
            timestamp: Utc::now(),
        });
        report
    }
}

/// Section ranges for a well-formed request
fn validate_request(request: &EpisodeRequest) -> AssemblyResult<Vec<Range<usize>>> {
    if request.chunks.is_empty() {
        return Err(AssemblyError::InvalidRequest(
            "episode has no speech chunks".to_string(),
        ));
    }

    let sections = plan_sections(request.chunks.len(), &request.boundaries)?;
    if request.sections.len() != sections.len() {
        return Err(AssemblyError::InvalidRequest(format!(
            "{} section descriptions for {} sections",
            request.sections.len(),
            sections.len()
        )));
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AudioAsset, AudioFormat, SectionInfo};

    fn chunks(n: usize) -> Vec<AudioAsset> {
        (0..n)
            .map(|i| {
                AudioAsset::new(
                    format!("c{i}"),
                    format!("/tts/c{i}.mp3"),
                    1.0,
                    AudioFormat::new("mp3", 24000, 1),
                )
            })
            .collect()
    }

    #[test]
    fn test_validate_flat_request() {
        let request = EpisodeRequest::from_flat(chunks(7), vec![2, 5]);
        let sections = validate_request(&request).unwrap();
        assert_eq!(sections, vec![0..2, 2..5, 5..7]);
    }

    #[test]
    fn test_validate_rejects_empty() {
        let request = EpisodeRequest::from_flat(Vec::new(), Vec::new());
        assert!(matches!(
            validate_request(&request),
            Err(AssemblyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_info_mismatch() {
        let request = EpisodeRequest::from_flat(chunks(4), vec![2])
            .with_section_info(vec![SectionInfo::default()]);
        assert!(matches!(
            validate_request(&request),
            Err(AssemblyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_boundaries() {
        let request = EpisodeRequest::from_flat(chunks(4), vec![3, 1]);
        assert!(matches!(
            validate_request(&request),
            Err(AssemblyError::InvalidBoundaries(_))
        ));
    }
}
