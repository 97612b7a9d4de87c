//! Level 3: episode
//!
//! Lays out `[intro], section[0], ([transition], section[i])*, [outro]`,
//! records the timing map while doing so, joins everything, then applies the
//! final correction to the base target and delivers the file.

use super::{EpisodeAssembler, RunContext};
use crate::error::{AssemblyError, AssemblyResult};
use crate::models::{
    AssembledEpisode, AssemblyPlan, AudioAsset, AudioFormat, MusicAsset, MusicKey,
    NormalizationLevel, PlannedSegment, SectionTiming,
};
use crate::services::temp_assets::AssetPurpose;
use crate::services::timeline::{drift_seconds, TimelineBuilder};
use crate::tool::MixSpec;
use chrono::Utc;
use podmix_common::events::AssemblyEvent;
use podmix_common::human_time::format_duration;
use std::collections::HashMap;

/// Laid-out drift worth a warning (seconds)
const DRIFT_WARN_SECONDS: f64 = 0.5;

/// Final-loudness deviation worth a warning (LU)
const VERIFY_WARN_LU: f64 = 0.5;

/// Joined but not yet normalized episode
pub(super) struct EpisodeLayout {
    raw: AudioAsset,
    timings: Vec<SectionTiming>,
    laid_out_seconds: f64,
    music_segments_used: usize,
}

impl EpisodeAssembler {
    /// ASSEMBLING_EPISODE: prepare music, lay out segments, build timing map, join
    pub(super) async fn phase_assembling_episode(
        &self,
        ctx: &mut RunContext<'_>,
        sections: Vec<AudioAsset>,
    ) -> AssemblyResult<EpisodeLayout> {
        let speech_format = sections
            .first()
            .map(|s| s.format.clone())
            .ok_or_else(|| AssemblyError::Assembly {
                asset: "episode".to_string(),
                reason: "no sections to assemble".to_string(),
            })?;

        let plan = self.plan_episode(ctx, sections, &speech_format).await?;

        let mut timeline = TimelineBuilder::new();
        let mut parts: Vec<AudioAsset> = Vec::new();
        // A failed duck drops its bed
        let mut music_used = plan.music_segments_used();

        for segment in plan.segments() {
            match segment {
                PlannedSegment::Music { asset, .. } => {
                    timeline.push_music(asset.duration_seconds);
                    parts.push(asset);
                }
                PlannedSegment::Section { index, asset } => {
                    timeline.push_section(index, &ctx.request.sections[index], asset.duration_seconds);
                    parts.push(asset);
                }
                PlannedSegment::DuckedSection {
                    index,
                    voice,
                    key,
                    bed,
                } => {
                    let asset = match self.duck(ctx, &voice, key, &bed).await? {
                        Some(mixed) => mixed,
                        None => {
                            music_used = music_used.saturating_sub(1);
                            voice
                        }
                    };
                    timeline.push_section(index, &ctx.request.sections[index], asset.duration_seconds);
                    parts.push(asset);
                }
            }
        }

        let laid_out_seconds = timeline.elapsed();
        let music_seconds = timeline.music_seconds();
        let timings = timeline.finish()?;

        let output = ctx
            .scratch
            .allocate(AssetPurpose::Episode, &self.config.output_extension);
        let raw = self
            .concatenator
            .concatenate(&parts, &output, &ctx.scratch, ctx.cancel)
            .await?;

        for part in &parts {
            ctx.scratch.discard(&part.path).await;
        }

        ctx.run.statistics.music_segments_used = music_used;

        tracing::info!(
            run_id = %ctx.run.run_id,
            segments = parts.len(),
            sections = timings.len(),
            music_segments = music_used,
            music_seconds,
            duration = %format_duration(raw.duration_seconds),
            "Episode assembled"
        );

        Ok(EpisodeLayout {
            raw,
            timings,
            laid_out_seconds,
            music_segments_used: music_used,
        })
    }

    /// NORMALIZING_EPISODE: final correction, verification, delivery
    pub(super) async fn phase_normalizing_episode(
        &self,
        ctx: &mut RunContext<'_>,
        layout: EpisodeLayout,
    ) -> AssemblyResult<AssembledEpisode> {
        let run_id = ctx.run.run_id;
        let target = self.config.target(NormalizationLevel::Episode);
        let output = ctx
            .scratch
            .allocate(AssetPurpose::NormalizedEpisode, &self.config.output_extension);

        let outcome = self
            .normalizer
            .normalize_forced(&layout.raw, &target, &output, ctx.cancel)
            .await?;
        ctx.scratch.discard(&layout.raw.path).await;
        let episode = outcome.asset;

        let drift = drift_seconds(layout.laid_out_seconds, episode.duration_seconds);
        if drift.abs() > DRIFT_WARN_SECONDS {
            tracing::warn!(
                run_id = %run_id,
                laid_out = layout.laid_out_seconds,
                probed = episode.duration_seconds,
                drift,
                "Timing map drifts from encoded duration"
            );
        } else {
            tracing::debug!(run_id = %run_id, drift, "Timing map matches encoded duration");
        }

        let final_loudness = if self.config.verify_output {
            match self.measurer.measure(&episode, &target, ctx.cancel).await {
                Ok(measured) => {
                    if measured.deviation_from(target.lufs) > VERIFY_WARN_LU
                        || measured.true_peak_db > target.max_true_peak_db
                    {
                        tracing::warn!(
                            run_id = %run_id,
                            lufs = measured.integrated_lufs,
                            true_peak = measured.true_peak_db,
                            target = target.lufs,
                            "Episode loudness outside target"
                        );
                    }
                    Some(measured)
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "Episode verification skipped");
                    None
                }
            }
        } else {
            None
        };

        ctx.scratch
            .persist(&episode.path, ctx.output)
            .await
            .map_err(|e| AssemblyError::Assembly {
                asset: episode.id.clone(),
                reason: format!("deliver to {}: {}", ctx.output.display(), e),
            })?;
        let file_size_bytes = tokio::fs::metadata(ctx.output).await?.len();

        let mut asset = episode.relocated(ctx.output);
        asset.loudness = final_loudness;

        Ok(AssembledEpisode {
            run_id,
            duration_seconds: asset.duration_seconds,
            asset,
            file_size_bytes,
            sections: layout.timings,
            music_segments_used: layout.music_segments_used,
            final_loudness,
            skipped_normalizations: ctx.run.statistics.skipped_normalizations(),
        })
    }

    /// Resolve and prepare every music slot
    ///
    /// Transitions served by the same stored file are prepared once.
    async fn plan_episode(
        &self,
        ctx: &mut RunContext<'_>,
        sections: Vec<AudioAsset>,
        speech_format: &AudioFormat,
    ) -> AssemblyResult<AssemblyPlan> {
        let intro = self
            .music
            .prepare(MusicKey::Intro, speech_format, &ctx.scratch, ctx.cancel)
            .await?;
        self.note_music(ctx, &intro);

        let mut prepared: HashMap<String, AudioAsset> = HashMap::new();
        let mut transitions = Vec::with_capacity(sections.len().saturating_sub(1));
        for n in 1..sections.len() {
            let key = MusicKey::Transition(n);
            let slot = match self.music.resolve(key).await {
                Err(reason) => MusicAsset::Absent { key, reason },
                Ok(store_key) => match prepared.get(&store_key) {
                    Some(asset) => MusicAsset::Present {
                        key,
                        asset: asset.clone(),
                    },
                    None => {
                        let slot = self
                            .music
                            .prepare_resolved(key, &store_key, speech_format, &ctx.scratch, ctx.cancel)
                            .await?;
                        if let MusicAsset::Present { asset, .. } = &slot {
                            prepared.insert(store_key, asset.clone());
                        }
                        slot
                    }
                },
            };
            self.note_music(ctx, &slot);
            transitions.push(slot);
        }

        let outro = self
            .music
            .prepare(MusicKey::Outro, speech_format, &ctx.scratch, ctx.cancel)
            .await?;
        self.note_music(ctx, &outro);

        let music = &self.config.music;
        Ok(AssemblyPlan {
            sections,
            intro,
            transitions,
            outro,
            intro_fade_in_seconds: music.intro_fade_in_seconds,
            outro_fade_out_seconds: music.outro_fade_out_seconds,
            transition_seconds: music.transition_seconds,
            transition_style: music.transition_style,
        })
    }

    /// Mix transition music under the start of a section
    ///
    /// `None` when mixing fails; the section is then used without music.
    async fn duck(
        &self,
        ctx: &mut RunContext<'_>,
        voice: &AudioAsset,
        key: MusicKey,
        bed: &AudioAsset,
    ) -> AssemblyResult<Option<AudioAsset>> {
        let output = ctx
            .scratch
            .allocate(AssetPurpose::Mix, &self.config.output_extension);
        let mix = MixSpec {
            bed_gain_db: self.config.music.duck_bed_gain_db,
            duck: true,
        };
        let encoding = self.config.encoding_for(&voice.format);

        let mixed = match self
            .tool
            .mix(&voice.path, &bed.path, &output, &mix, &encoding, ctx.cancel)
            .await
        {
            Ok(()) => self.tool.probe(&output, ctx.cancel).await,
            Err(e) => Err(e),
        };

        match mixed {
            Ok(info) => Ok(Some(AudioAsset::new(
                crate::models::id_from_path(&output),
                output,
                info.duration_seconds,
                info.format,
            ))),
            Err(e) => {
                let error = AssemblyError::assembly(key.label(), e);
                if error.is_cancelled() {
                    return Err(error);
                }
                tracing::warn!(
                    run_id = %ctx.run.run_id,
                    key = %key,
                    error = %error,
                    "Ducked transition failed, using section without music"
                );
                ctx.scratch.discard(&output).await;
                self.note_music(
                    ctx,
                    &MusicAsset::Absent {
                        key,
                        reason: error.to_string(),
                    },
                );
                Ok(None)
            }
        }
    }

    /// Count and announce omitted music
    fn note_music(&self, ctx: &mut RunContext<'_>, slot: &MusicAsset) {
        if let MusicAsset::Absent { key, reason } = slot {
            ctx.run.statistics.music_segments_skipped += 1;
            self.event_bus.emit_lossy(AssemblyEvent::MusicSkipped {
                run_id: ctx.run.run_id,
                key: key.label(),
                reason: reason.clone(),
                timestamp: Utc::now(),
            });
        }
    }
}
