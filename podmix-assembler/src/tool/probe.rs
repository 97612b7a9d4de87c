//! Parser for ffprobe's JSON report

use super::{ProbeInfo, ToolError, ToolResult};
use crate::models::AudioFormat;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Duration and format of the first audio stream
pub fn parse_probe_output(stdout: &str) -> ToolResult<ProbeInfo> {
    let report: ProbeReport = serde_json::from_str(stdout)
        .map_err(|e| ToolError::Parse(format!("probe report: {}", e)))?;

    let stream = report
        .streams
        .first()
        .ok_or_else(|| ToolError::Parse("no audio stream".to_string()))?;

    let codec = stream
        .codec_name
        .clone()
        .ok_or_else(|| ToolError::Parse("audio stream has no codec".to_string()))?;
    let sample_rate: u32 = stream
        .sample_rate
        .as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ToolError::Parse("audio stream has no sample rate".to_string()))?;
    let channels = stream
        .channels
        .ok_or_else(|| ToolError::Parse("audio stream has no channel count".to_string()))?;

    let duration_seconds: f64 = report
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse().ok())
        .filter(|d: &f64| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| ToolError::Parse("container has no duration".to_string()))?;

    Ok(ProbeInfo {
        duration_seconds,
        format: AudioFormat::new(codec, sample_rate, channels),
    })
}
