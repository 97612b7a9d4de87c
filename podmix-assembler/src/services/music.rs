//! Music lookup and preparation
//!
//! Music is optional. A missing file, an unreadable file or a failed
//! preparation step turns into [`MusicAsset::Absent`] with a reason; only
//! cancellation escapes as an error.

use crate::config::AssemblyConfig;
use crate::error::{AssemblyError, AssemblyResult};
use crate::models::{id_from_path, AudioAsset, AudioFormat, MusicAsset, MusicKey, NormalizationLevel};
use crate::services::temp_assets::{AssetPurpose, TemporaryAssetManager};
use crate::services::Normalizer;
use crate::tool::{AudioTool, FadeSpec};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Audio extensions probed by [`DirectoryMusicStore`], in preference order
const MUSIC_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "ogg", "opus", "flac", "wav"];

/// Raw music file as stored
#[derive(Debug, Clone)]
pub struct MusicTrack {
    pub bytes: Vec<u8>,
    /// Container extension hint, without the dot
    pub extension: String,
}

/// Source of music files, addressed by key (`intro`, `transition-2`, ...)
#[async_trait]
pub trait MusicStore: Send + Sync {
    async fn exists(&self, key: &str) -> bool;

    async fn fetch(&self, key: &str) -> std::io::Result<MusicTrack>;
}

/// Music files in one folder, named by key (`intro.mp3`, `outro.wav`, ...)
#[derive(Debug, Clone)]
pub struct DirectoryMusicStore {
    dir: PathBuf,
}

impl DirectoryMusicStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn find(&self, key: &str) -> Option<(PathBuf, &'static str)> {
        for ext in MUSIC_EXTENSIONS {
            let candidate = self.dir.join(format!("{}.{}", key, ext));
            if tokio::fs::metadata(&candidate)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                return Some((candidate, ext));
            }
        }
        None
    }
}

#[async_trait]
impl MusicStore for DirectoryMusicStore {
    async fn exists(&self, key: &str) -> bool {
        self.find(key).await.is_some()
    }

    async fn fetch(&self, key: &str) -> std::io::Result<MusicTrack> {
        let (path, ext) = self.find(key).await.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no music file for {} in {}", key, self.dir.display()),
            )
        })?;
        Ok(MusicTrack {
            bytes: tokio::fs::read(&path).await?,
            extension: ext.to_string(),
        })
    }
}

/// Store for speech-only episodes
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMusic;

#[async_trait]
impl MusicStore for NoMusic {
    async fn exists(&self, _key: &str) -> bool {
        false
    }

    async fn fetch(&self, key: &str) -> std::io::Result<MusicTrack> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no music configured ({})", key),
        ))
    }
}

/// Turns stored music into episode-ready segments
///
/// Normalizes to the music target in the speech format, then fades the
/// intro in, fades the outro out and trims transitions.
#[derive(Clone)]
pub struct MusicPreparer {
    tool: Arc<dyn AudioTool>,
    normalizer: Normalizer,
    store: Arc<dyn MusicStore>,
    config: Arc<AssemblyConfig>,
}

impl MusicPreparer {
    pub fn new(
        tool: Arc<dyn AudioTool>,
        store: Arc<dyn MusicStore>,
        config: Arc<AssemblyConfig>,
    ) -> Self {
        Self {
            normalizer: Normalizer::new(tool.clone(), config.clone()),
            tool,
            store,
            config,
        }
    }

    /// Store key that will serve `key`, or why there is none
    pub async fn resolve(&self, key: MusicKey) -> Result<String, String> {
        if !self.config.music.enabled {
            return Err("music disabled".to_string());
        }
        for candidate in key.lookup_keys() {
            if self.store.exists(&candidate).await {
                return Ok(candidate);
            }
        }
        Err(format!("no music stored for {}", key.lookup_keys().join(" / ")))
    }

    /// Resolve and prepare one slot
    pub async fn prepare(
        &self,
        key: MusicKey,
        speech_format: &AudioFormat,
        scratch: &TemporaryAssetManager,
        cancel: &CancellationToken,
    ) -> AssemblyResult<MusicAsset> {
        match self.resolve(key).await {
            Ok(store_key) => {
                self.prepare_resolved(key, &store_key, speech_format, scratch, cancel)
                    .await
            }
            Err(reason) => {
                info!(key = %key, reason = %reason, "Music segment omitted");
                Ok(MusicAsset::Absent { key, reason })
            }
        }
    }

    /// Prepare a slot from a known store key
    pub async fn prepare_resolved(
        &self,
        key: MusicKey,
        store_key: &str,
        speech_format: &AudioFormat,
        scratch: &TemporaryAssetManager,
        cancel: &CancellationToken,
    ) -> AssemblyResult<MusicAsset> {
        match self
            .build(key, store_key, speech_format, scratch, cancel)
            .await
        {
            Ok(asset) => {
                debug!(
                    key = %key,
                    store_key,
                    duration = asset.duration_seconds,
                    "Music segment prepared"
                );
                Ok(MusicAsset::Present { key, asset })
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(key = %key, store_key, error = %e, "Music segment unusable, omitting");
                Ok(MusicAsset::Absent {
                    key,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn build(
        &self,
        key: MusicKey,
        store_key: &str,
        speech_format: &AudioFormat,
        scratch: &TemporaryAssetManager,
        cancel: &CancellationToken,
    ) -> AssemblyResult<AudioAsset> {
        let track = self
            .store
            .fetch(store_key)
            .await
            .map_err(|e| AssemblyError::Assembly {
                asset: store_key.to_string(),
                reason: format!("fetch failed: {}", e),
            })?;

        let raw_path = scratch.allocate(AssetPurpose::Music, &track.extension);
        tokio::fs::write(&raw_path, &track.bytes).await?;

        let info = self
            .tool
            .probe(&raw_path, cancel)
            .await
            .map_err(|e| AssemblyError::assembly(store_key, e))?;
        let raw = AudioAsset::new(store_key, &raw_path, info.duration_seconds, info.format);

        let target = self.config.target(NormalizationLevel::Music);
        let normalized_path = scratch.allocate(AssetPurpose::Music, &self.config.output_extension);
        let normalized = if raw.format.is_compatible_with(speech_format) {
            self.normalizer
                .normalize(&raw, &target, &normalized_path, cancel)
                .await?
        } else {
            debug!(
                key = %key,
                from = %raw.format,
                to = %speech_format,
                "Conforming music to speech format"
            );
            self.normalizer
                .conform(&raw, &target, &normalized_path, speech_format, cancel)
                .await?
        };
        scratch.discard(&raw_path).await;

        let shaped = self
            .shape(key, &normalized.asset, speech_format, scratch, cancel)
            .await?;
        if shaped.path != normalized.asset.path {
            scratch.discard(&normalized.asset.path).await;
        }
        Ok(shaped)
    }

    /// Intro fade-in, outro fade-out, transition trim
    async fn shape(
        &self,
        key: MusicKey,
        asset: &AudioAsset,
        speech_format: &AudioFormat,
        scratch: &TemporaryAssetManager,
        cancel: &CancellationToken,
    ) -> AssemblyResult<AudioAsset> {
        let music = &self.config.music;
        let encoding = self.config.encoding_for(speech_format);
        let output = scratch.allocate(AssetPurpose::Music, &self.config.output_extension);

        let shaped = match key {
            MusicKey::Intro | MusicKey::Outro => {
                let fade = FadeSpec {
                    fade_in_seconds: if key == MusicKey::Intro {
                        music.intro_fade_in_seconds
                    } else {
                        0.0
                    },
                    fade_out_seconds: if key == MusicKey::Outro {
                        music.outro_fade_out_seconds
                    } else {
                        0.0
                    },
                    duration_seconds: asset.duration_seconds,
                    curve: music.fade_curve,
                };
                if fade.fade_in_seconds <= 0.0 && fade.fade_out_seconds <= 0.0 {
                    scratch.discard(&output).await;
                    return Ok(asset.clone());
                }
                self.tool
                    .fade(&asset.path, &output, &fade, &encoding, cancel)
                    .await
            }
            MusicKey::Transition(_) => {
                if music.transition_seconds <= 0.0
                    || asset.duration_seconds <= music.transition_seconds
                {
                    scratch.discard(&output).await;
                    return Ok(asset.clone());
                }
                self.tool
                    .trim(&asset.path, &output, music.transition_seconds, &encoding, cancel)
                    .await
            }
        };
        shaped.map_err(|e| AssemblyError::assembly(key.label(), e))?;

        let info = self
            .tool
            .probe(&output, cancel)
            .await
            .map_err(|e| AssemblyError::assembly(key.label(), e))?;
        Ok(AudioAsset::new(
            id_from_path(&output),
            output,
            info.duration_seconds,
            info.format,
        ))
    }
}

/// Folder store when a music directory is configured, otherwise [`NoMusic`]
pub fn store_for(music_dir: Option<&Path>) -> Arc<dyn MusicStore> {
    match music_dir {
        Some(dir) => Arc::new(DirectoryMusicStore::new(dir)),
        None => Arc::new(NoMusic),
    }
}
