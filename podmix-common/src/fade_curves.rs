//! Fade curve selection for music fades
//!
//! The episode assembler fades intro music in and outro music out. The curve
//! shape is configurable; each variant maps onto a curve the audio tool's
//! fade filter understands.

use serde::{Deserialize, Serialize};

/// Fade curve types
///
/// - Linear: Constant rate of change (precise, predictable)
/// - Exponential: Slow start, fast finish
/// - Logarithmic: Fast start, slow finish
/// - SCurve: Smooth acceleration and deceleration
/// - EqualPower: Constant perceived loudness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// v(t) = t
    #[default]
    Linear,

    /// v(t) = t²
    Exponential,

    /// v(t) = (1-t)² for fade-out
    Logarithmic,

    /// v(t) = 0.5 × (1 - cos(π × t))
    #[serde(alias = "cosine", alias = "scurve", alias = "s-curve")]
    SCurve,

    /// v(t) = sin(t × π/2)
    #[serde(alias = "equalpower")]
    EqualPower,
}

impl FadeCurve {
    /// Curve name understood by ffmpeg's `afade` filter
    pub fn tool_curve_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "tri",
            FadeCurve::Exponential => "qua",
            FadeCurve::Logarithmic => "log",
            FadeCurve::SCurve => "hsin",
            FadeCurve::EqualPower => "qsin",
        }
    }
}
