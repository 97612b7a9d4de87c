//! Parser for the loudnorm filter's JSON diagnostics
//!
//! ffmpeg writes the payload to stderr after a `[Parsed_loudnorm_N @ 0x...]`
//! banner, with every number encoded as a string.

use super::{ToolError, ToolResult};
use crate::models::LoudnessMeasurement;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawLoudnorm {
    input_i: String,
    input_tp: String,
    input_lra: String,
    input_thresh: String,
    target_offset: String,
}

/// Extract the measurement from the analysis pass's stderr
///
/// Non-finite values (`-inf` for silent input) are rejected.
pub fn parse_loudnorm_output(stderr: &str) -> ToolResult<LoudnessMeasurement> {
    let banner = stderr
        .rfind("[Parsed_loudnorm")
        .ok_or_else(|| ToolError::Parse("loudnorm diagnostics not found".to_string()))?;
    let tail = &stderr[banner..];

    let open = tail
        .find('{')
        .ok_or_else(|| ToolError::Parse("loudnorm payload has no opening brace".to_string()))?;
    let close = tail[open..]
        .find('}')
        .ok_or_else(|| ToolError::Parse("loudnorm payload is truncated".to_string()))?;
    let payload = &tail[open..open + close + 1];

    let raw: RawLoudnorm = serde_json::from_str(payload)
        .map_err(|e| ToolError::Parse(format!("loudnorm payload: {}", e)))?;

    Ok(LoudnessMeasurement {
        integrated_lufs: finite("input_i", &raw.input_i)?,
        true_peak_db: finite("input_tp", &raw.input_tp)?,
        loudness_range_lu: finite("input_lra", &raw.input_lra)?,
        threshold_lufs: finite("input_thresh", &raw.input_thresh)?,
        target_offset_lu: finite("target_offset", &raw.target_offset)?,
    })
}

fn finite(field: &str, value: &str) -> ToolResult<f64> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| ToolError::Parse(format!("{} is not a number: {:?}", field, value)))?;
    if !parsed.is_finite() {
        return Err(ToolError::Parse(format!(
            "{} is {} (silent or empty input?)",
            field, value
        )));
    }
    Ok(parsed)
}
