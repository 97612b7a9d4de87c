//! Loudness measurements and normalization targets
//!
//! Targets are derived from one base loudness:
//! - chunk   = base + 2 LU (headroom for later passes)
//! - section = base + 1 LU
//! - episode = base
//! - music   = base + music offset (negative, so music sits under voice)

use serde::{Deserialize, Serialize};

/// Result of one loudness analysis pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessMeasurement {
    /// Integrated loudness (LUFS)
    pub integrated_lufs: f64,
    /// True peak (dBTP)
    pub true_peak_db: f64,
    /// Loudness range (LU)
    pub loudness_range_lu: f64,
    /// Gating threshold (LUFS)
    pub threshold_lufs: f64,
    /// Offset gain the correction filter should apply (LU)
    pub target_offset_lu: f64,
}

impl LoudnessMeasurement {
    /// Absolute distance from a target loudness
    pub fn deviation_from(&self, target_lufs: f64) -> f64 {
        (self.integrated_lufs - target_lufs).abs()
    }
}

/// Which pipeline level a target applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationLevel {
    Chunk,
    Section,
    Episode,
    Music,
}

impl NormalizationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationLevel::Chunk => "chunk",
            NormalizationLevel::Section => "section",
            NormalizationLevel::Episode => "episode",
            NormalizationLevel::Music => "music",
        }
    }
}

impl std::fmt::Display for NormalizationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loudness an asset should be corrected to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationTarget {
    /// Integrated loudness target (LUFS)
    pub lufs: f64,
    /// Maximum true peak (dBTP)
    pub max_true_peak_db: f64,
    /// Loudness range target (LU)
    pub loudness_range_lu: f64,
    /// Level tag
    pub level: NormalizationLevel,
}

impl NormalizationTarget {
    /// True when the measured loudness is strictly within `tolerance_lu` of target
    pub fn is_satisfied_by(&self, measured: &LoudnessMeasurement, tolerance_lu: f64) -> bool {
        measured.integrated_lufs.is_finite() && measured.deviation_from(self.lufs) < tolerance_lu
    }
}
