//! ffmpeg / ffprobe argument construction
//!
//! Pure functions so the exact command lines can be unit tested without
//! spawning anything.

use super::{FadeSpec, MixSpec, OutputEncoding};
use crate::models::{LoudnessMeasurement, NormalizationTarget};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Common prefix: quiet banner, never read stdin
fn base_args() -> Vec<OsString> {
    vec!["-hide_banner".into(), "-nostdin".into()]
}

pub(crate) fn probe_args(input: &Path) -> Vec<OsString> {
    vec![
        "-v".into(),
        "error".into(),
        "-select_streams".into(),
        "a:0".into(),
        "-show_entries".into(),
        "stream=codec_name,sample_rate,channels:format=duration".into(),
        "-of".into(),
        "json".into(),
        input.into(),
    ]
}

/// Analysis-only loudnorm filter with JSON diagnostics
pub(crate) fn measure_filter(target: &NormalizationTarget) -> String {
    format!(
        "loudnorm=I={:.1}:TP={:.1}:LRA={:.1}:print_format=json",
        target.lufs, target.max_true_peak_db, target.loudness_range_lu
    )
}

/// Second-pass loudnorm filter fed with first-pass values
pub(crate) fn apply_filter(target: &NormalizationTarget, measured: &LoudnessMeasurement) -> String {
    format!(
        "loudnorm=I={:.1}:TP={:.1}:LRA={:.1}:measured_I={:.2}:measured_TP={:.2}:measured_LRA={:.2}:measured_thresh={:.2}:offset={:.2}:linear=true:print_format=summary",
        target.lufs,
        target.max_true_peak_db,
        target.loudness_range_lu,
        measured.integrated_lufs,
        measured.true_peak_db,
        measured.loudness_range_lu,
        measured.threshold_lufs,
        measured.target_offset_lu,
    )
}

pub(crate) fn single_pass_filter(target: &NormalizationTarget) -> String {
    format!(
        "loudnorm=I={:.1}:TP={:.1}:LRA={:.1}",
        target.lufs, target.max_true_peak_db, target.loudness_range_lu
    )
}

/// Decode through the filter and discard the audio
pub(crate) fn measure_args(input: &Path, target: &NormalizationTarget) -> Vec<OsString> {
    let rest: [OsString; 7] = [
        "-i".into(),
        input.into(),
        "-af".into(),
        measure_filter(target).into(),
        "-f".into(),
        "null".into(),
        "-".into(),
    ];
    let mut args = base_args();
    args.extend(rest);
    args
}

fn encoding_args(encoding: &OutputEncoding) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-ar".into(),
        encoding.sample_rate.to_string().into(),
        "-ac".into(),
        encoding.channels.to_string().into(),
        "-c:a".into(),
        encoding.codec.clone().into(),
    ];
    if let Some(bitrate) = &encoding.bitrate {
        args.push("-b:a".into());
        args.push(bitrate.into());
    }
    args
}

/// Re-encode one input through an audio filter chain
pub(crate) fn filter_args(
    input: &Path,
    filter: &str,
    output: &Path,
    encoding: &OutputEncoding,
) -> Vec<OsString> {
    let rest: [OsString; 5] = ["-y".into(), "-i".into(), input.into(), "-af".into(), filter.into()];
    let mut args = base_args();
    args.extend(rest);
    args.extend(encoding_args(encoding));
    args.push(output.into());
    args
}

/// Stream-copy join through the concat demuxer
pub(crate) fn concat_args(list_path: &Path, output: &Path) -> Vec<OsString> {
    let rest: [OsString; 10] = [
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_path.into(),
        "-c".into(),
        "copy".into(),
        output.into(),
    ];
    let mut args = base_args();
    args.extend(rest);
    args
}

/// Concat demuxer list file, one `file '<path>'` line per input
///
/// Single quotes inside paths are closed, escaped and reopened.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// Fade-in and/or fade-out envelope; `anull` when neither applies
pub(crate) fn fade_filter(fade: &FadeSpec) -> String {
    let curve = fade.curve.tool_curve_name();
    let mut filters = Vec::new();

    if fade.fade_in_seconds > 0.0 {
        filters.push(format!(
            "afade=t=in:st=0:d={:.3}:curve={}",
            fade.fade_in_seconds, curve
        ));
    }
    if fade.fade_out_seconds > 0.0 {
        let fade_out = fade.fade_out_seconds.min(fade.duration_seconds);
        let start = (fade.duration_seconds - fade_out).max(0.0);
        filters.push(format!(
            "afade=t=out:st={:.3}:d={:.3}:curve={}",
            start, fade_out, curve
        ));
    }

    if filters.is_empty() {
        "anull".to_string()
    } else {
        filters.join(",")
    }
}

pub(crate) fn trim_filter(seconds: f64) -> String {
    format!("atrim=end={:.3},asetpts=PTS-STARTPTS", seconds)
}

/// Two-input graph: voice on input 0, bed on input 1
pub(crate) fn mix_graph(mix: &MixSpec) -> String {
    if mix.duck {
        format!(
            "[0:a]asplit=2[voice][sc];[1:a]volume={:.1}dB[bed];\
             [bed][sc]sidechaincompress=threshold=0.05:ratio=8:attack=20:release=400[ducked];\
             [voice][ducked]amix=inputs=2:duration=first:normalize=0[out]",
            mix.bed_gain_db
        )
    } else {
        format!(
            "[1:a]volume={:.1}dB[bed];[0:a][bed]amix=inputs=2:duration=first:normalize=0[out]",
            mix.bed_gain_db
        )
    }
}

pub(crate) fn mix_args(
    voice: &Path,
    bed: &Path,
    output: &Path,
    mix: &MixSpec,
    encoding: &OutputEncoding,
) -> Vec<OsString> {
    let rest: [OsString; 9] = [
        "-y".into(),
        "-i".into(),
        voice.into(),
        "-i".into(),
        bed.into(),
        "-filter_complex".into(),
        mix_graph(mix).into(),
        "-map".into(),
        "[out]".into(),
    ];
    let mut args = base_args();
    args.extend(rest);
    args.extend(encoding_args(encoding));
    args.push(output.into());
    args
}
