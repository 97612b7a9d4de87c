//! External audio tool boundary
//!
//! Everything that knows about ffmpeg's command line or diagnostic text lives
//! under this module. The rest of the crate talks to [`AudioTool`] and gets
//! back typed values.

mod args;
mod ffmpeg;
mod loudnorm;
mod probe;

pub use args::concat_list;
pub use ffmpeg::FfmpegTool;
pub use loudnorm::parse_loudnorm_output;
pub use probe::parse_probe_output;

use crate::models::{AudioFormat, LoudnessMeasurement, NormalizationTarget};
use async_trait::async_trait;
use podmix_common::FadeCurve;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Tool invocation errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Binary missing or not executable
    #[error("{0} not found or not executable")]
    Unavailable(String),

    /// Process could not be started or awaited
    #[error("Failed to run audio tool: {0}")]
    Spawn(String),

    /// Non-zero exit (code -1 when killed by a signal)
    #[error("{program} exited with status {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },

    /// Invocation exceeded its time limit
    #[error("Timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Run cancellation fired while the tool was running
    #[error("Cancelled")]
    Cancelled,

    /// Tool output could not be interpreted
    #[error("Unexpected tool output: {0}")]
    Parse(String),

    /// Failed to prepare tool input files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Stream facts reported by the probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub duration_seconds: f64,
    pub format: AudioFormat,
}

/// Encoder settings for re-encoded output
#[derive(Debug, Clone, PartialEq)]
pub struct OutputEncoding {
    pub codec: String,
    pub bitrate: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Fade envelope applied to a music segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSpec {
    /// Fade-in length from the start (0 = none)
    pub fade_in_seconds: f64,
    /// Fade-out length ending at `duration_seconds` (0 = none)
    pub fade_out_seconds: f64,
    /// Duration of the input, needed to place the fade-out
    pub duration_seconds: f64,
    pub curve: FadeCurve,
}

/// Voice plus music bed mixing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixSpec {
    /// Gain applied to the bed before mixing (dB)
    pub bed_gain_db: f64,
    /// Compress the bed with the voice as sidechain
    pub duck: bool,
}

/// Audio processing operations needed by the assembler
///
/// Every operation honours `cancel` and the implementation's own per-call
/// timeout. Outputs are always written to a fresh path chosen by the caller.
#[async_trait]
pub trait AudioTool: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Duration and stream format of a file
    async fn probe(&self, path: &Path, cancel: &CancellationToken) -> ToolResult<ProbeInfo>;

    /// Analysis pass: integrated loudness, true peak, LRA, threshold, offset
    async fn measure_loudness(
        &self,
        path: &Path,
        target: &NormalizationTarget,
        cancel: &CancellationToken,
    ) -> ToolResult<LoudnessMeasurement>;

    /// Correction pass driven by a previous measurement
    async fn normalize_two_pass(
        &self,
        input: &Path,
        output: &Path,
        target: &NormalizationTarget,
        measured: &LoudnessMeasurement,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()>;

    /// Single-pass dynamic correction
    async fn normalize_single_pass(
        &self,
        input: &Path,
        output: &Path,
        target: &NormalizationTarget,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()>;

    /// Lossless join of compatible inputs, in order
    ///
    /// `list_path` is a scratch file the implementation may use for its input list.
    async fn concat(
        &self,
        inputs: &[PathBuf],
        list_path: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> ToolResult<()>;

    async fn fade(
        &self,
        input: &Path,
        output: &Path,
        fade: &FadeSpec,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()>;

    /// Keep only the first `seconds` of the input
    async fn trim(
        &self,
        input: &Path,
        output: &Path,
        seconds: f64,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()>;

    /// Mix `bed` under `voice`; the output lasts as long as the voice
    async fn mix(
        &self,
        voice: &Path,
        bed: &Path,
        output: &Path,
        mix: &MixSpec,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()>;
}
