//! Assembly configuration
//!
//! One immutable [`AssemblyConfig`] is built at startup and handed to the
//! assembler. Values come from the `[assembly]` table of the podmix TOML file;
//! anything omitted falls back to the built-in defaults below.

use crate::error::{AssemblyError, AssemblyResult};
use crate::models::{AudioFormat, NormalizationLevel, NormalizationTarget, TransitionStyle};
use crate::tool::OutputEncoding;
use podmix_common::FadeCurve;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Loudness, tooling and output settings for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Episode loudness target (LUFS)
    pub base_target_lufs: f64,
    /// Chunk target offset from base (LU)
    pub chunk_offset_lu: f64,
    /// Section target offset from base (LU)
    pub section_offset_lu: f64,
    /// Music target offset from base (LU, negative puts music under voice)
    pub music_offset_lu: f64,
    /// Maximum true peak for every pass (dBTP)
    pub max_true_peak_db: f64,
    /// Loudness range handed to the correction filter (LU)
    pub loudness_range_lu: f64,
    /// Skip the correction pass when already this close to target (LU)
    pub skip_tolerance_lu: f64,

    /// Concurrent chunk operations
    pub max_concurrency: usize,
    /// Per-invocation tool timeout (seconds)
    pub tool_timeout_seconds: u64,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,

    /// Encoder used for every re-encoded asset
    pub output_codec: String,
    /// Encoder bitrate, e.g. "128k" (None lets the encoder choose)
    pub output_bitrate: Option<String>,
    /// File extension of re-encoded assets
    pub output_extension: String,

    /// Delete the raw input chunks once the run ends
    pub consume_chunk_inputs: bool,
    /// Measure the delivered episode and log any deviation from target
    pub verify_output: bool,

    pub music: MusicConfig,
}

/// Music integration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    pub enabled: bool,
    pub intro_fade_in_seconds: f64,
    pub outro_fade_out_seconds: f64,
    /// Transitions are cut to this length
    pub transition_seconds: f64,
    pub transition_style: TransitionStyle,
    pub fade_curve: FadeCurve,
    /// Extra gain applied to a ducked transition bed (dB)
    pub duck_bed_gain_db: f64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            base_target_lufs: -16.0,
            chunk_offset_lu: 2.0,
            section_offset_lu: 1.0,
            music_offset_lu: -4.0,
            max_true_peak_db: -1.0,
            loudness_range_lu: 11.0,
            skip_tolerance_lu: 1.0,
            max_concurrency: default_concurrency(),
            tool_timeout_seconds: 300,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            output_codec: "libmp3lame".to_string(),
            output_bitrate: Some("128k".to_string()),
            output_extension: "mp3".to_string(),
            consume_chunk_inputs: false,
            verify_output: true,
            music: MusicConfig::default(),
        }
    }
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            intro_fade_in_seconds: 2.0,
            outro_fade_out_seconds: 3.0,
            transition_seconds: 1.5,
            transition_style: TransitionStyle::HardCut,
            fade_curve: FadeCurve::Linear,
            duck_bed_gain_db: -6.0,
        }
    }
}

/// Available cores, capped at 4 (each worker is a whole encoder process)
fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(2)
}

impl AssemblyConfig {
    /// Interpret the raw `[assembly]` table of the TOML config
    pub fn from_toml_table(table: &toml::Table) -> AssemblyResult<Self> {
        let config: AssemblyConfig = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e| AssemblyError::Config(format!("Invalid [assembly] table: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> AssemblyResult<()> {
        let loudness_values = [
            ("base_target_lufs", self.base_target_lufs),
            ("max_true_peak_db", self.max_true_peak_db),
        ];
        for (name, value) in loudness_values {
            if !value.is_finite() || value >= 0.0 {
                return Err(AssemblyError::Config(format!(
                    "{} must be a negative number, got {}",
                    name, value
                )));
            }
        }

        for level in [
            NormalizationLevel::Chunk,
            NormalizationLevel::Section,
            NormalizationLevel::Music,
        ] {
            let target = self.target(level).lufs;
            if !target.is_finite() || target >= 0.0 {
                return Err(AssemblyError::Config(format!(
                    "{} target resolves to {} LUFS, which is not below full scale",
                    level, target
                )));
            }
        }

        if !(self.skip_tolerance_lu > 0.0) {
            return Err(AssemblyError::Config(
                "skip_tolerance_lu must be positive".to_string(),
            ));
        }
        if !(1.0..=50.0).contains(&self.loudness_range_lu) {
            return Err(AssemblyError::Config(format!(
                "loudness_range_lu must be within 1..=50, got {}",
                self.loudness_range_lu
            )));
        }
        if self.max_concurrency == 0 {
            return Err(AssemblyError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.tool_timeout_seconds == 0 {
            return Err(AssemblyError::Config(
                "tool_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.output_codec.trim().is_empty() || self.output_extension.trim().is_empty() {
            return Err(AssemblyError::Config(
                "output_codec and output_extension must be set".to_string(),
            ));
        }

        let music = &self.music;
        for (name, value) in [
            ("intro_fade_in_seconds", music.intro_fade_in_seconds),
            ("outro_fade_out_seconds", music.outro_fade_out_seconds),
            ("transition_seconds", music.transition_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AssemblyError::Config(format!(
                    "music.{} must be zero or positive, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }

    /// Target for one pipeline level
    pub fn target(&self, level: NormalizationLevel) -> NormalizationTarget {
        let lufs = match level {
            NormalizationLevel::Chunk => self.base_target_lufs + self.chunk_offset_lu,
            NormalizationLevel::Section => self.base_target_lufs + self.section_offset_lu,
            NormalizationLevel::Episode => self.base_target_lufs,
            NormalizationLevel::Music => self.base_target_lufs + self.music_offset_lu,
        };

        NormalizationTarget {
            lufs,
            max_true_peak_db: self.max_true_peak_db,
            loudness_range_lu: self.loudness_range_lu,
            level,
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_seconds)
    }

    /// Encoder settings that keep `format`'s sample rate and channel layout
    pub fn encoding_for(&self, format: &AudioFormat) -> OutputEncoding {
        OutputEncoding {
            codec: self.output_codec.clone(),
            bitrate: self.output_bitrate.clone(),
            sample_rate: format.sample_rate,
            channels: format.channels,
        }
    }

    /// Codec name a probe reports for files written by `output_codec`
    pub fn output_codec_name(&self) -> &str {
        match self.output_codec.as_str() {
            "libmp3lame" | "libshine" => "mp3",
            "libopus" => "opus",
            "libvorbis" => "vorbis",
            "libfdk_aac" => "aac",
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targets() {
        let config = AssemblyConfig::default();
        assert_eq!(config.target(NormalizationLevel::Chunk).lufs, -14.0);
        assert_eq!(config.target(NormalizationLevel::Section).lufs, -15.0);
        assert_eq!(config.target(NormalizationLevel::Episode).lufs, -16.0);
        assert_eq!(config.target(NormalizationLevel::Music).lufs, -20.0);
        assert_eq!(config.target(NormalizationLevel::Episode).max_true_peak_db, -1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_table_keeps_defaults() {
        let table: toml::Table = toml::from_str(
            r#"
            base_target_lufs = -19.0
            max_concurrency = 2

            [music]
            transition_style = "duck"
            fade_curve = "equal_power"
            "#,
        )
        .unwrap();

        let config = AssemblyConfig::from_toml_table(&table).unwrap();
        assert_eq!(config.base_target_lufs, -19.0);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.skip_tolerance_lu, 1.0);
        assert_eq!(config.music.transition_style, TransitionStyle::Duck);
        assert_eq!(config.music.fade_curve, FadeCurve::EqualPower);
        assert_eq!(config.music.intro_fade_in_seconds, 2.0);
    }

    #[test]
    fn test_empty_table_is_default() {
        let config = AssemblyConfig::from_toml_table(&toml::Table::new()).unwrap();
        assert_eq!(config, AssemblyConfig::default());
    }

    #[test]
    fn test_output_codec_name_follows_encoder() {
        let mut config = AssemblyConfig::default();
        assert_eq!(config.output_codec_name(), "mp3");

        config.output_codec = "libopus".to_string();
        assert_eq!(config.output_codec_name(), "opus");

        config.output_codec = "libfdk_aac".to_string();
        assert_eq!(config.output_codec_name(), "aac");

        config.output_codec = "flac".to_string();
        assert_eq!(config.output_codec_name(), "flac");
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let config = AssemblyConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AssemblyError::Config(_))));
    }

    #[test]
    fn test_rejects_positive_target() {
        let config = AssemblyConfig {
            base_target_lufs: 3.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_fade() {
        let mut config = AssemblyConfig::default();
        config.music.outro_fade_out_seconds = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_encoding_keeps_input_layout() {
        let config = AssemblyConfig::default();
        let encoding = config.encoding_for(&AudioFormat::new("pcm_s16le", 24000, 1));
        assert_eq!(encoding.codec, "libmp3lame");
        assert_eq!(encoding.sample_rate, 24000);
        assert_eq!(encoding.channels, 1);
    }
}
