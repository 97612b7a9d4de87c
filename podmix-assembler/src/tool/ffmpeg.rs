//! ffmpeg / ffprobe implementation of [`AudioTool`]

use super::args;
use super::{
    parse_loudnorm_output, parse_probe_output, AudioTool, FadeSpec, MixSpec, OutputEncoding,
    ProbeInfo, ToolError, ToolResult,
};
use crate::config::AssemblyConfig;
use crate::models::{LoudnessMeasurement, NormalizationTarget};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lines of stderr kept in a failure report
const STDERR_TAIL_LINES: usize = 8;

/// Runs ffmpeg and ffprobe as child processes
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Duration,
}

impl FfmpegTool {
    /// Verify both binaries respond to `-version`
    ///
    /// Called once per process; a missing binary fails here with
    /// [`ToolError::Unavailable`] instead of midway through a run.
    pub async fn locate(
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        timeout: Duration,
    ) -> ToolResult<Self> {
        let tool = Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            timeout,
        };

        let never = CancellationToken::new();
        for program in [&tool.ffmpeg, &tool.ffprobe] {
            let output = tool.run(program, vec!["-version".into()], &never).await?;
            let version = String::from_utf8_lossy(&output.stdout);
            debug!(
                program = %program.display(),
                version = version.lines().next().unwrap_or(""),
                "Audio tool located"
            );
        }

        Ok(tool)
    }

    pub async fn from_config(config: &AssemblyConfig) -> ToolResult<Self> {
        Self::locate(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
            config.tool_timeout(),
        )
        .await
    }

    /// Spawn, wait under timeout and cancellation, check exit status
    ///
    /// The child is killed when the wait future is dropped.
    async fn run(
        &self,
        program: &Path,
        args: Vec<OsString>,
        cancel: &CancellationToken,
    ) -> ToolResult<Output> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let program_name = program.display().to_string();
        debug!(program = %program_name, args = ?args, "Running audio tool");

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ToolError::Unavailable(program_name.clone())
                }
                _ => ToolError::Spawn(format!("{}: {}", program_name, e)),
            })?;

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::Cancelled),
            waited = tokio::time::timeout(self.timeout, child.wait_with_output()) => match waited {
                Err(_) => {
                    return Err(ToolError::Timeout {
                        seconds: self.timeout.as_secs(),
                    })
                }
                Ok(Err(e)) => return Err(ToolError::Spawn(format!("{}: {}", program_name, e))),
                Ok(Ok(output)) => output,
            },
        };

        if !output.status.success() {
            return Err(ToolError::Failed {
                program: program_name,
                code: output.status.code().unwrap_or(-1),
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(output)
    }

    async fn run_ffmpeg(&self, args: Vec<OsString>, cancel: &CancellationToken) -> ToolResult<Output> {
        self.run(&self.ffmpeg, args, cancel).await
    }
}

/// Last few non-empty stderr lines, joined
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

#[async_trait]
impl AudioTool for FfmpegTool {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path, cancel: &CancellationToken) -> ToolResult<ProbeInfo> {
        let output = self.run(&self.ffprobe, args::probe_args(path), cancel).await?;
        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn measure_loudness(
        &self,
        path: &Path,
        target: &NormalizationTarget,
        cancel: &CancellationToken,
    ) -> ToolResult<LoudnessMeasurement> {
        let output = self
            .run_ffmpeg(args::measure_args(path, target), cancel)
            .await?;
        parse_loudnorm_output(&String::from_utf8_lossy(&output.stderr))
    }

    async fn normalize_two_pass(
        &self,
        input: &Path,
        output: &Path,
        target: &NormalizationTarget,
        measured: &LoudnessMeasurement,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        let filter = args::apply_filter(target, measured);
        self.run_ffmpeg(args::filter_args(input, &filter, output, encoding), cancel)
            .await?;
        Ok(())
    }

    async fn normalize_single_pass(
        &self,
        input: &Path,
        output: &Path,
        target: &NormalizationTarget,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        let filter = args::single_pass_filter(target);
        self.run_ffmpeg(args::filter_args(input, &filter, output, encoding), cancel)
            .await?;
        Ok(())
    }

    async fn concat(
        &self,
        inputs: &[PathBuf],
        list_path: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        tokio::fs::write(list_path, args::concat_list(inputs)).await?;
        self.run_ffmpeg(args::concat_args(list_path, output), cancel)
            .await?;
        Ok(())
    }

    async fn fade(
        &self,
        input: &Path,
        output: &Path,
        fade: &FadeSpec,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        let filter = args::fade_filter(fade);
        self.run_ffmpeg(args::filter_args(input, &filter, output, encoding), cancel)
            .await?;
        Ok(())
    }

    async fn trim(
        &self,
        input: &Path,
        output: &Path,
        seconds: f64,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        let filter = args::trim_filter(seconds);
        self.run_ffmpeg(args::filter_args(input, &filter, output, encoding), cancel)
            .await?;
        Ok(())
    }

    async fn mix(
        &self,
        voice: &Path,
        bed: &Path,
        output: &Path,
        mix: &MixSpec,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        self.run_ffmpeg(args::mix_args(voice, bed, output, mix, encoding), cancel)
            .await?;
        Ok(())
    }
}
