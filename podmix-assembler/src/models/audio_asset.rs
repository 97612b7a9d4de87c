//! Audio assets produced and consumed at each pipeline stage

use crate::models::LoudnessMeasurement;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Stream layout of an audio asset, as reported by the probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Codec name as reported by the probe (e.g. "mp3", "aac")
    pub codec: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(codec: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            codec: codec.into(),
            sample_rate,
            channels,
        }
    }

    /// Whether two assets can be joined by stream copy
    pub fn is_compatible_with(&self, other: &AudioFormat) -> bool {
        self.codec.eq_ignore_ascii_case(&other.codec)
            && self.sample_rate == other.sample_rate
            && self.channels == other.channels
    }

    /// Describe the first mismatching attribute, if any
    pub fn mismatch(&self, other: &AudioFormat) -> Option<String> {
        if !self.codec.eq_ignore_ascii_case(&other.codec) {
            return Some(format!("codec {} differs from {}", other.codec, self.codec));
        }
        if self.sample_rate != other.sample_rate {
            return Some(format!(
                "sample rate {} Hz differs from {} Hz",
                other.sample_rate, self.sample_rate
            ));
        }
        if self.channels != other.channels {
            return Some(format!(
                "{} channel(s) differs from {} channel(s)",
                other.channels, self.channels
            ));
        }
        None
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}Hz {}ch", self.codec, self.sample_rate, self.channels)
    }
}

/// One audio file at some stage of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioAsset {
    /// Identifier used in logs and error messages
    pub id: String,
    /// Location on disk
    pub path: PathBuf,
    /// Duration in seconds
    pub duration_seconds: f64,
    /// Stream layout
    pub format: AudioFormat,
    /// Loudness, when it has been measured for this exact file
    pub loudness: Option<LoudnessMeasurement>,
}

impl AudioAsset {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        duration_seconds: f64,
        format: AudioFormat,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            duration_seconds,
            format,
            loudness: None,
        }
    }

    /// Attach a loudness measurement
    pub fn with_loudness(mut self, loudness: LoudnessMeasurement) -> Self {
        self.loudness = Some(loudness);
        self
    }

    /// Same audio relocated to `path`, identified by the new file stem
    pub fn relocated(&self, path: &Path) -> Self {
        Self {
            id: id_from_path(path),
            path: path.to_path_buf(),
            duration_seconds: self.duration_seconds,
            format: self.format.clone(),
            loudness: self.loudness,
        }
    }
}

/// Asset id derived from a file path (file stem, or the full path when there is none)
pub fn id_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
